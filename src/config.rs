use std::{fmt, net::SocketAddr, path::Path, str::FromStr, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    agents::{Agent, DEFAULT_MAX_TOOL_ROUNDS, DEFAULT_MODEL},
    data::{MetricsDatabase, DEFAULT_QUERY},
    plot::PlotOptions,
    plugins::plot::plot_agent,
    providers::{openai::OpenAI, scripted::ScriptedProvider},
    report::ReportGenerator,
    LLMError, LLMProvider,
};

pub const DEFAULT_SYSTEM_INSTRUCTION: &str =
    "You are an assistant that can generate plots from data, using the generate_plot_base64 tool.";
pub const DEFAULT_BIND: &str = "127.0.0.1:5000";

const AGENT_NAME: &str = "Plotter";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
    #[error(transparent)]
    Provider(#[from] LLMError),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAI,
    Scripted,
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAI),
            "scripted" | "offline" => Ok(ProviderKind::Scripted),
            other => Err(format!("unknown provider '{other}'")),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::OpenAI => f.write_str("openai"),
            ProviderKind::Scripted => f.write_str("scripted"),
        }
    }
}

/// Values given on the command line; unset fields leave the config alone.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub offline: bool,
    pub model: Option<String>,
    pub query: Option<String>,
    pub bind: Option<SocketAddr>,
}

/// Runtime settings: defaults, then an optional YAML file, then `PLOTWERK_*`
/// environment variables. Binaries apply their CLI flags last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderKind,
    pub model: String,
    pub system_instruction: String,
    pub query: String,
    pub max_tool_rounds: usize,
    pub bind: SocketAddr,
    pub plot: PlotOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderKind::OpenAI,
            model: DEFAULT_MODEL.to_string(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            query: DEFAULT_QUERY.to_string(),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            bind: SocketAddr::from(([127, 0, 0, 1], 5000)),
            plot: PlotOptions::default(),
        }
    }
}

impl Config {
    /// Reads `path` when given and layers the process environment on top.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_yaml_str(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    pub fn from_yaml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(source)?)
    }

    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    pub fn apply_vars<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("PLOTWERK_PROVIDER") {
            self.provider = value.parse().map_err(|_| ConfigError::InvalidValue {
                key: "PLOTWERK_PROVIDER",
                value,
            })?;
        }

        if let Some(value) = lookup("PLOTWERK_MODEL") {
            self.model = value;
        }

        if let Some(value) = lookup("PLOTWERK_QUERY") {
            self.query = value;
        }

        if let Some(value) = lookup("PLOTWERK_MAX_TOOL_ROUNDS") {
            self.max_tool_rounds = value.parse().map_err(|_| ConfigError::InvalidValue {
                key: "PLOTWERK_MAX_TOOL_ROUNDS",
                value,
            })?;
        }

        if let Some(value) = lookup("PLOTWERK_BIND") {
            self.bind = value.parse().map_err(|_| ConfigError::InvalidValue {
                key: "PLOTWERK_BIND",
                value,
            })?;
        }

        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if overrides.offline {
            self.provider = ProviderKind::Scripted;
        }
        if let Some(model) = overrides.model {
            self.model = model;
        }
        if let Some(query) = overrides.query {
            self.query = query;
        }
        if let Some(bind) = overrides.bind {
            self.bind = bind;
        }
    }

    pub fn build_provider(&self) -> Result<Arc<dyn LLMProvider>, ConfigError> {
        match self.provider {
            ProviderKind::OpenAI => Ok(Arc::new(OpenAI::from_env()?)),
            ProviderKind::Scripted => {
                let points = MetricsDatabase::open()?.query_points(&self.query)?;
                Ok(Arc::new(ScriptedProvider::plot_session(&points)))
            }
        }
    }

    pub fn agent(&self) -> Agent {
        plot_agent(AGENT_NAME, &self.system_instruction, self.plot.clone())
            .with_model(self.model.clone())
            .with_max_tool_rounds(self.max_tool_rounds)
    }

    pub fn report_generator(&self) -> Result<ReportGenerator, ConfigError> {
        Ok(ReportGenerator::new(self.build_provider()?, self.agent()).with_query(self.query.clone()))
    }
}
