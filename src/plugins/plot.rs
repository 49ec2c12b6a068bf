use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::data::DataPoint;
use crate::functions::{
    json_schema_for, FunctionDefinition, FunctionParameter, FunctionRegistry, KernelFunction,
};
use crate::plot::{render_base64, PlotOptions};
use crate::{Agent, LLMError};

pub const PLOT_FUNCTION_NAME: &str = "generate_plot_base64";

#[derive(Debug, Deserialize)]
struct PlotArguments {
    data: Vec<DataPoint>,
    #[serde(default)]
    title: Option<String>,
}

/// Renders `{x, y}` points as a scatter plot with a trend line and hands the
/// PNG back as a base64 string.
#[derive(Debug, Clone, Default)]
pub struct PlotFunction {
    options: PlotOptions,
}

impl PlotFunction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: PlotOptions) -> Self {
        Self { options }
    }
}

fn data_schema() -> Value {
    json!({
        "type": "array",
        "minItems": 1,
        "items": {
            "type": "object",
            "properties": {
                "x": { "type": "number" },
                "y": { "type": "number" }
            },
            "required": ["x", "y"]
        }
    })
}

#[async_trait]
impl KernelFunction for PlotFunction {
    fn definition(&self) -> FunctionDefinition {
        FunctionDefinition::new(PLOT_FUNCTION_NAME)
            .with_description(
                "Generates a scatter plot with a trend line from a list of {x, y} points and returns it as a base64-encoded PNG.",
            )
            .with_parameter(
                FunctionParameter::new("data", data_schema())
                    .with_description("The points to plot, e.g. [{\"x\": 1, \"y\": 10}, {\"x\": 2, \"y\": 15}]."),
            )
            .with_parameter(
                FunctionParameter::new("title", json_schema_for::<String>())
                    .with_description("Optional chart title.")
                    .optional(),
            )
    }

    async fn invoke(&self, arguments: &Value) -> Result<Value, LLMError> {
        let PlotArguments { data, title } = serde_json::from_value(arguments.clone())
            .map_err(|error| LLMError::InvalidFunctionArguments(error.to_string()))?;

        let options = match title {
            Some(title) => self.options.clone().with_title(title),
            None => self.options.clone(),
        };

        let points = data.len();
        let encoded = tokio::task::spawn_blocking(move || render_base64(&data, &options))
            .await
            .map_err(|error| LLMError::function_execution(PLOT_FUNCTION_NAME, error))?
            .map_err(|error| LLMError::function_execution(PLOT_FUNCTION_NAME, error))?;

        tracing::debug!(points, bytes = encoded.len(), "rendered plot");
        Ok(Value::String(encoded))
    }
}

pub fn register_plot_functions(registry: &mut FunctionRegistry, options: PlotOptions) {
    registry.register(Arc::new(PlotFunction::with_options(options)));
}

/// An agent that owns the plotting tool and returns as soon as a plot exists,
/// so the image never travels back through the model.
pub fn plot_agent(name: &str, instructions: &str, options: PlotOptions) -> Agent {
    let mut registry = FunctionRegistry::new();
    register_plot_functions(&mut registry, options);

    Agent::from_string(name, instructions)
        .with_function_registry(Arc::new(registry))
        .with_return_direct(PLOT_FUNCTION_NAME)
}

#[cfg(test)]
mod tests {
    use base64::{engine::general_purpose::STANDARD, Engine};

    use super::*;
    use crate::data::mock_points;
    use crate::functions::FunctionCall;

    #[test]
    fn definition_requires_data_only() {
        let definition = PlotFunction::new().definition();
        assert_eq!(definition.name, PLOT_FUNCTION_NAME);
        assert_eq!(definition.parameters.required, vec!["data".to_string()]);
        assert_eq!(definition.parameters.properties["data"]["type"], "array");
        assert_eq!(definition.parameters.properties["title"]["type"], "string");
    }

    #[tokio::test]
    async fn invoke_returns_base64_png() {
        let arguments = json!({ "data": mock_points() });
        let output = PlotFunction::new().invoke(&arguments).await.expect("plot");

        let encoded = output.as_str().expect("string output");
        let bytes = STANDARD.decode(encoded).expect("base64");
        assert_eq!(&bytes[1..4], b"PNG");
    }

    #[tokio::test]
    async fn registry_rejects_point_without_y() {
        let mut registry = FunctionRegistry::new();
        register_plot_functions(&mut registry, PlotOptions::default());

        let call = FunctionCall::new(
            PLOT_FUNCTION_NAME,
            json!({ "data": [{ "x": 1, "y": 10 }, { "x": 2 }] }),
        );
        let error = registry.invoke(&call).await.unwrap_err();
        assert!(matches!(error, LLMError::InvalidFunctionArguments(_)));
    }

    #[tokio::test]
    async fn registry_rejects_empty_data() {
        let mut registry = FunctionRegistry::new();
        register_plot_functions(&mut registry, PlotOptions::default());

        let call = FunctionCall::new(PLOT_FUNCTION_NAME, json!({ "data": [] }));
        assert!(registry.invoke(&call).await.is_err());
    }

    #[tokio::test]
    async fn direct_invoke_reports_missing_key() {
        let error = PlotFunction::new()
            .invoke(&json!({ "data": [{ "x": 1 }] }))
            .await
            .unwrap_err();
        assert!(matches!(error, LLMError::InvalidFunctionArguments(message) if message.contains("missing field `y`")));
    }

    #[tokio::test]
    async fn overflowing_span_fails_without_rendering() {
        let arguments = json!({ "data": [{ "x": -1e308, "y": 1 }, { "x": 1e308, "y": 2 }] });
        let error = PlotFunction::new().invoke(&arguments).await.unwrap_err();
        assert!(matches!(
            error,
            LLMError::FunctionExecution { ref function, ref message }
                if function == PLOT_FUNCTION_NAME && message.contains("too large")
        ));
    }

    #[tokio::test]
    async fn accepts_custom_title() {
        let arguments = json!({ "data": [{ "x": 1, "y": 2 }, { "x": 2, "y": 3 }], "title": "Weekly signups" });
        let output = PlotFunction::new().invoke(&arguments).await.expect("plot");
        assert!(output.as_str().is_some_and(|encoded| !encoded.is_empty()));
    }
}
