use thiserror::Error;

#[derive(Debug, Error)]
pub enum LLMError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("provider returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("missing API key: set the {0} environment variable")]
    MissingApiKey(&'static str),

    #[error("invalid value for {key}: {value}")]
    InvalidConfig { key: &'static str, value: String },

    #[error("invalid response from provider: {0}")]
    InvalidResponse(&'static str),

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("invalid function arguments: {0}")]
    InvalidFunctionArguments(String),

    #[error("tool execution failed ({function}): {message}")]
    FunctionExecution { function: String, message: String },
}

impl LLMError {
    pub fn function_execution(function: impl Into<String>, message: impl ToString) -> Self {
        LLMError::FunctionExecution {
            function: function.into(),
            message: message.to_string(),
        }
    }

    /// Errors raised while dispatching or running a tool, as opposed to
    /// talking to the provider.
    pub fn is_tool_error(&self) -> bool {
        matches!(
            self,
            LLMError::UnknownFunction(_)
                | LLMError::InvalidFunctionArguments(_)
                | LLMError::FunctionExecution { .. }
        )
    }
}
