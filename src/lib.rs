pub mod error;
pub mod providers;
pub mod types;
pub mod functions;
pub mod agents;
pub mod data;
pub mod plot;
pub mod plugins;
pub mod report;
pub mod config;
pub mod dashboard;

pub use error::LLMError;
pub use providers::LLMProvider;
pub use types::{ChatMessage, CompletionRequest, CompletionResponse, MessageRole, TokenUsage};
pub use functions::{
    DynKernelFunction, FunctionCall, FunctionDefinition, FunctionParameter, FunctionRegistry,
    KernelFunction, Tool, ToolCall, ToolChoice,
};
pub use agents::{Agent, AgentError, AgentRun, ToolInvocation};
pub use data::{DataPoint, MetricsDatabase};
pub use plot::{PlotError, PlotOptions, Trendline};
pub use report::{Report, ReportError, ReportGenerator, ReportStatus, Visualization};
pub use config::{Config, ConfigError, Overrides, ProviderKind};
pub use schemars::JsonSchema;
