use async_trait::async_trait;
use serde_json::json;

use crate::{
    data::DataPoint,
    functions::{FunctionCall, ToolCall},
    plugins::plot::PLOT_FUNCTION_NAME,
    providers::LLMProvider,
    types::{ChatMessage, CompletionRequest, CompletionResponse, MessageRole},
    LLMError,
};

/// Offline provider that answers from a fixed script.
///
/// The reply is chosen by conversation position: a request that already
/// contains `n` assistant turns receives the `n`-th scripted message. The
/// provider holds no mutable state, so one instance can serve any number of
/// concurrent conversations.
#[derive(Debug, Clone, Default)]
pub struct ScriptedProvider {
    turns: Vec<ChatMessage>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, content: impl Into<String>) -> Self {
        self.turns.push(ChatMessage::assistant(content));
        self
    }

    pub fn with_tool_call(mut self, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        let id = format!("call_{}", self.turns.len());
        let call = ToolCall::new(FunctionCall::new(name, arguments)).with_id(id);
        self.turns.push(ChatMessage::assistant_tool_calls(vec![call]));
        self
    }

    /// The canonical offline session: plot `points`, then acknowledge.
    pub fn plot_session(points: &[DataPoint]) -> Self {
        Self::new()
            .with_tool_call(PLOT_FUNCTION_NAME, json!({ "data": points }))
            .with_text(format!(
                "Here is the scatter plot of the {} data points with a fitted trend line.",
                points.len()
            ))
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LLMError> {
        let position = request
            .messages
            .iter()
            .filter(|message| message.role == MessageRole::Assistant)
            .count();

        let message = self
            .turns
            .get(position)
            .cloned()
            .ok_or_else(|| LLMError::Provider("no more scripted responses".to_string()))?;

        Ok(CompletionResponse {
            message,
            usage: None,
        })
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::mock_points;

    fn request(messages: Vec<ChatMessage>) -> CompletionRequest {
        CompletionRequest::new("scripted", messages)
    }

    #[tokio::test]
    async fn replies_by_conversation_position() {
        let provider = ScriptedProvider::new().with_text("first").with_text("second");

        let first = provider
            .complete(request(vec![ChatMessage::user("hi")]))
            .await
            .expect("first turn");
        assert_eq!(first.message.text(), Some("first"));

        let second = provider
            .complete(request(vec![
                ChatMessage::user("hi"),
                first.message.clone(),
                ChatMessage::user("again"),
            ]))
            .await
            .expect("second turn");
        assert_eq!(second.message.text(), Some("second"));

        let replay = provider
            .complete(request(vec![ChatMessage::user("new conversation")]))
            .await
            .expect("replay");
        assert_eq!(replay.message.text(), Some("first"));
    }

    #[tokio::test]
    async fn errors_when_script_runs_out() {
        let provider = ScriptedProvider::new();
        let error = provider
            .complete(request(vec![ChatMessage::user("hi")]))
            .await
            .unwrap_err();
        assert!(matches!(error, LLMError::Provider(message) if message == "no more scripted responses"));
    }

    #[test]
    fn plot_session_calls_plot_tool_with_points() {
        let points = mock_points();
        let provider = ScriptedProvider::plot_session(&points);
        assert_eq!(provider.len(), 2);

        let call = &provider.turns[0].tool_calls[0];
        assert_eq!(call.id.as_deref(), Some("call_0"));
        assert_eq!(call.function.name, PLOT_FUNCTION_NAME);
        assert_eq!(call.function.arguments["data"].as_array().map(Vec::len), Some(points.len()));
        assert_eq!(call.function.arguments["data"][6]["y"], 25.0);
        assert!(provider.turns[1].text().unwrap_or_default().contains("7 data points"));
    }
}
