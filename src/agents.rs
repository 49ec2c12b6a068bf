use std::{collections::BTreeSet, fmt, sync::Arc};

use futures_util::future::join_all;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::{
    functions::{FunctionRegistry, ToolChoice},
    types::{ChatMessage, CompletionRequest},
    LLMError, LLMProvider,
};

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("maximum tool rounds reached ({0})")]
    MaxToolRoundsReached(usize),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Provider(#[from] LLMError),
}

#[derive(Clone)]
pub struct Agent {
    name: String,
    instructions: String,
    functions: Arc<FunctionRegistry>,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    tool_choice: Option<ToolChoice>,
    max_tool_rounds: usize,
    return_direct: BTreeSet<String>,
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("has_functions", &!self.functions.is_empty())
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_tool_rounds", &self.max_tool_rounds)
            .field("return_direct", &self.return_direct)
            .finish()
    }
}

impl Agent {
    pub fn from_string(name: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            functions: Arc::new(FunctionRegistry::new()),
            model: DEFAULT_MODEL.to_string(),
            temperature: None,
            max_tokens: None,
            tool_choice: None,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            return_direct: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn with_function_registry(mut self, registry: Arc<FunctionRegistry>) -> Self {
        self.functions = registry;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = Some(tool_choice);
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    /// Ends the run as soon as `function` succeeds instead of sending its
    /// output back to the model.
    pub fn with_return_direct(mut self, function: impl Into<String>) -> Self {
        self.return_direct.insert(function.into());
        self
    }

    fn request(&self, transcript: &[ChatMessage]) -> CompletionRequest {
        let mut request = CompletionRequest::new(self.model.clone(), transcript.to_vec())
            .with_function_registry(&self.functions);

        if let Some(max_tokens) = self.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }

        if let Some(temperature) = self.temperature {
            request = request.with_temperature(temperature);
        }

        if let Some(tool_choice) = &self.tool_choice {
            request = request.with_tool_choice(tool_choice.clone());
        }

        request
    }

    /// Sends `prompt` and services tool calls until the model answers without
    /// one, or a return-direct tool succeeds.
    ///
    /// Tool failures are not fatal: the error is recorded in the run and
    /// reported to the model as `{"error": ...}` so it can correct itself.
    pub async fn run(
        &self,
        provider: &dyn LLMProvider,
        prompt: impl Into<String>,
    ) -> Result<AgentRun, AgentError> {
        let mut transcript = vec![
            ChatMessage::system(self.instructions.clone()),
            ChatMessage::user(prompt),
        ];
        let mut invocations: Vec<ToolInvocation> = Vec::new();
        let mut rounds = 0;

        loop {
            let response = provider.complete(self.request(&transcript)).await?;
            let message = response.message;
            transcript.push(message.clone());

            if message.tool_calls.is_empty() {
                info!(agent = %self.name, rounds, "agent finished");
                return Ok(AgentRun {
                    transcript,
                    invocations,
                    final_message: message.content,
                    rounds,
                });
            }

            if rounds == self.max_tool_rounds {
                return Err(AgentError::MaxToolRoundsReached(self.max_tool_rounds));
            }
            rounds += 1;

            // Calls run concurrently; replies keep the order the model asked in.
            let results = join_all(
                message
                    .tool_calls
                    .iter()
                    .map(|call| self.functions.invoke(&call.function)),
            )
            .await;

            let mut returned_directly = false;
            for (call, result) in message.tool_calls.iter().zip(results) {
                let name = call.function.name.clone();
                let output = match result {
                    Ok(value) => {
                        debug!(agent = %self.name, tool = %name, "tool call succeeded");
                        returned_directly |= self.return_direct.contains(&name);
                        transcript.push(ChatMessage::tool(call.reply_id(), serde_json::to_string(&value)?));
                        Ok(value)
                    }
                    Err(error) if error.is_tool_error() => {
                        warn!(agent = %self.name, tool = %name, %error, "tool call failed");
                        let payload = json!({ "error": error.to_string() });
                        transcript.push(ChatMessage::tool(call.reply_id(), payload.to_string()));
                        Err(error.to_string())
                    }
                    Err(error) => return Err(error.into()),
                };

                invocations.push(ToolInvocation {
                    call_id: call.reply_id(),
                    name,
                    arguments: call.function.arguments.clone(),
                    output,
                });
            }

            if returned_directly {
                info!(agent = %self.name, rounds, "agent returned tool output directly");
                return Ok(AgentRun {
                    transcript,
                    invocations,
                    final_message: message.content,
                    rounds,
                });
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub call_id: String,
    pub name: String,
    pub arguments: Value,
    pub output: Result<Value, String>,
}

#[derive(Debug, Clone)]
pub struct AgentRun {
    pub transcript: Vec<ChatMessage>,
    pub invocations: Vec<ToolInvocation>,
    pub final_message: Option<String>,
    pub rounds: usize,
}

impl AgentRun {
    /// The first successful output of the named tool.
    pub fn tool_output(&self, name: &str) -> Option<&Value> {
        self.invocations
            .iter()
            .filter(|invocation| invocation.name == name)
            .find_map(|invocation| invocation.output.as_ref().ok())
    }
}
