use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    agents::{Agent, AgentError},
    data::{DataPoint, MetricsDatabase, DEFAULT_QUERY},
    plot::{Trendline, PNG_MIME_TYPE},
    plugins::plot::PLOT_FUNCTION_NAME,
    LLMProvider,
};

pub const TOOL_FAILURE_TEXT: &str = "Could not generate graph due to tool execution failure.";

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("query returned no data")]
    NoData,
    #[error(transparent)]
    Agent(#[from] AgentError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visualization {
    pub mime_type: String,
    pub encoding: String,
    pub data: String,
}

impl Visualization {
    pub fn png(data: impl Into<String>) -> Self {
        Self {
            mime_type: PNG_MIME_TYPE.to_string(),
            encoding: "base64".to_string(),
            data: data.into(),
        }
    }

    pub fn data_uri(&self) -> String {
        format!("data:{};{},{}", self.mime_type, self.encoding, self.data)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub status: ReportStatus,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visualization: Option<Visualization>,
    pub generated_at: DateTime<Utc>,
}

impl Report {
    pub fn success(text: impl Into<String>, visualization: Visualization) -> Self {
        Self {
            status: ReportStatus::Success,
            text: text.into(),
            visualization: Some(visualization),
            generated_at: Utc::now(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            status: ReportStatus::Error,
            text: text.into(),
            visualization: None,
            generated_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ReportStatus::Success
    }
}

/// Runs one report: query the mock database, let the agent plot the rows,
/// and package the image with a short analysis.
#[derive(Clone)]
pub struct ReportGenerator {
    provider: Arc<dyn LLMProvider>,
    agent: Agent,
    query: String,
}

impl ReportGenerator {
    pub fn new(provider: Arc<dyn LLMProvider>, agent: Agent) -> Self {
        Self {
            provider,
            agent,
            query: DEFAULT_QUERY.to_string(),
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// The database lives only for the duration of this call.
    pub fn load_points(&self) -> Result<Vec<DataPoint>, ReportError> {
        let database = MetricsDatabase::open()?;
        let points = database.query_points(&self.query)?;
        if points.is_empty() {
            return Err(ReportError::NoData);
        }
        Ok(points)
    }

    pub async fn generate(&self) -> Result<Report, ReportError> {
        let points = self.load_points()?;
        info!(query = %self.query, rows = points.len(), "loaded metrics");
        debug!(?points, "query result");

        let run = self
            .agent
            .run(self.provider.as_ref(), plot_prompt(&points))
            .await?;

        let encoded = match run.tool_output(PLOT_FUNCTION_NAME) {
            Some(Value::String(encoded)) => encoded.clone(),
            _ => {
                warn!(
                    provider = self.provider.name(),
                    invocations = run.invocations.len(),
                    "agent did not produce a plot"
                );
                return Ok(Report::error(TOOL_FAILURE_TEXT));
            }
        };

        info!(provider = self.provider.name(), bytes = encoded.len(), "report generated");
        Ok(Report::success(analysis_text(&points), Visualization::png(encoded)))
    }
}

pub fn plot_prompt(points: &[DataPoint]) -> String {
    // DataPoint serialization cannot fail.
    let data = serde_json::to_string(points).unwrap_or_default();
    format!("Use the plotting tool to generate a plot of the following data: {data}")
}

/// A short narrative over `points`. Callers guarantee at least one point.
pub fn analysis_text(points: &[DataPoint]) -> String {
    let slope = Trendline::fit(points).map(|trend| trend.slope).unwrap_or(0.0);
    let (correlation, direction) = if slope > 1e-9 {
        ("a generally positive correlation", "increasing")
    } else if slope < -1e-9 {
        ("a generally negative correlation", "decreasing")
    } else {
        ("no clear correlation", "flat")
    };

    let min = points.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
    let max = points.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);
    let average = points.iter().map(|p| p.y).sum::<f64>() / points.len() as f64;

    format!(
        "The agent analyzed the mock performance data. It shows {correlation} between \
         Metric X (Input/Time) and Metric Y (Output/Value). Metric Y's values are {direction}, \
         ranging from {} to {}, with an overall average of approximately {average:.2}. \
         The embedded plot provides the definitive visual trend.",
        format_value(min),
        format_value(max),
    )
}

fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}
