// Server Configuration Module
// Loads YAML or TOML configuration files and turns them into registry snapshots.

use crate::errors::ConfigError;
use crate::registry::{
    ModelProfile, RegistrySnapshot, TimeLimits, DEFAULT_MAX_STREAM_TIME_SECONDS,
    DEFAULT_MODEL_DESCRIPTION, DEFAULT_TOKENS_PER_SECOND,
};
use crate::scheduler::DEFAULT_TRUNCATION_MESSAGE;
use crate::selector::{AutoBands, CannedResponses, LengthPolicy, LengthTag};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub general: GeneralConfig,
    /// Model profiles keyed by model id
    #[serde(default)]
    pub models: BTreeMap<String, ModelConfig>,
    /// Canned body overrides keyed by length tag
    #[serde(default)]
    pub responses: BTreeMap<String, ResponseConfig>,
    /// Auto band overrides keyed by band name
    #[serde(default)]
    pub auto_response_length: BTreeMap<String, AutoBandConfig>,
}

impl Config {
    /// Load configuration from a file; `.toml` files are read as TOML,
    /// everything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        if is_toml {
            Self::from_toml(&content)
        } else {
            Self::from_yaml(&content)
        }
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Parse configuration from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Build a validated registry snapshot. Without a `models` section the
    /// built-in model table is used.
    pub fn to_snapshot(&self) -> Result<RegistrySnapshot, ConfigError> {
        let general = &self.general;
        let base = if self.models.is_empty() {
            RegistrySnapshot::builtin().with_default_rate(general.default_tokens_per_second)?
        } else {
            RegistrySnapshot::new(general.default_tokens_per_second)?
        };

        let mut snapshot = base
            .with_default_description(general.default_model_description.clone())
            .with_time_limits(TimeLimits {
                max_stream_time_seconds: general.max_stream_time_seconds,
                enforce: general.enforce_time_limit,
                truncation_message: general.truncation_message.clone(),
            })?
            .with_responses(self.canned_responses()?)
            .with_auto_bands(self.auto_bands()?)
            .with_default_length(self.default_length()?);

        for (id, model) in &self.models {
            snapshot = snapshot.with_model(model.to_profile(id))?;
        }
        Ok(snapshot)
    }

    fn canned_responses(&self) -> Result<CannedResponses, ConfigError> {
        let mut responses = CannedResponses::builtin();
        for (tag, body) in &self.responses {
            let tag: LengthTag = tag
                .parse()
                .map_err(|e| ConfigError::validation(format!("responses.{}: {}", tag, e)))?;
            responses = responses.with_body(tag, body.content.clone())?;
        }
        Ok(responses)
    }

    fn auto_bands(&self) -> Result<AutoBands, ConfigError> {
        let mut bands = AutoBands::default().bands().to_vec();
        for (name, overrides) in &self.auto_response_length {
            let band = bands
                .iter_mut()
                .find(|band| &band.name == name)
                .ok_or_else(|| {
                    ConfigError::validation(format!(
                        "auto_response_length.{}: unknown band; expected slow, medium, long or fast",
                        name
                    ))
                })?;
            if let Some(max) = overrides.max_tokens_per_second {
                band.max_tokens_per_second = max;
            }
            if let Some(length) = &overrides.response_length {
                band.response_length = length.parse().map_err(|e| {
                    ConfigError::validation(format!("auto_response_length.{}: {}", name, e))
                })?;
            }
        }
        AutoBands::new(bands)
    }

    fn default_length(&self) -> Result<LengthPolicy, ConfigError> {
        self.general
            .default_response_mode
            .parse()
            .map_err(|e| ConfigError::validation(format!("general.default_response_mode: {}", e)))
    }
}

/// Server network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    8000
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

/// Global pacing and time-limit settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_tokens_per_second")]
    pub default_tokens_per_second: f64,
    #[serde(default = "default_model_description")]
    pub default_model_description: String,
    #[serde(default = "default_max_stream_time")]
    pub max_stream_time_seconds: f64,
    #[serde(default)]
    pub enforce_time_limit: bool,
    #[serde(default = "default_truncation_message")]
    pub truncation_message: String,
    /// short, medium, long, very_long, random or auto
    #[serde(default = "default_response_mode")]
    pub default_response_mode: String,
}

fn default_tokens_per_second() -> f64 {
    DEFAULT_TOKENS_PER_SECOND
}

fn default_model_description() -> String {
    DEFAULT_MODEL_DESCRIPTION.to_string()
}

fn default_max_stream_time() -> f64 {
    DEFAULT_MAX_STREAM_TIME_SECONDS
}

fn default_truncation_message() -> String {
    DEFAULT_TRUNCATION_MESSAGE.to_string()
}

fn default_response_mode() -> String {
    "auto".to_string()
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_tokens_per_second: default_tokens_per_second(),
            default_model_description: default_model_description(),
            max_stream_time_seconds: default_max_stream_time(),
            enforce_time_limit: false,
            truncation_message: default_truncation_message(),
            default_response_mode: default_response_mode(),
        }
    }
}

/// One `models.<id>` entry
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModelConfig {
    pub tokens_per_second: Option<f64>,
    /// Parameter count in billions
    pub parameters: Option<f64>,
    pub max_stream_time_seconds: Option<f64>,
    pub description: Option<String>,
}

impl ModelConfig {
    fn to_profile(&self, id: &str) -> ModelProfile {
        let description = self
            .description
            .clone()
            .unwrap_or_else(|| format!("Model {}", id));
        ModelProfile {
            id: id.to_string(),
            tokens_per_second: self.tokens_per_second,
            parameters: self.parameters,
            max_stream_time_seconds: self.max_stream_time_seconds,
            description,
        }
    }
}

/// One `responses.<tag>` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseConfig {
    pub content: String,
}

/// One `auto_response_length.<band>` entry
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AutoBandConfig {
    pub max_tokens_per_second: Option<f64>,
    pub response_length: Option<String>,
}
