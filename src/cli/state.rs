// Application State Module

use super::config::Config;
use crate::clock::SharedClock;
use crate::errors::ConfigError;
use crate::registry::{Registry, RegistrySnapshot};
use crate::stats::SharedStats;
use std::path::PathBuf;

/// Shared application state
pub struct AppState {
    pub registry: Registry,
    pub stats: SharedStats,
    /// Clock driving every stream's pacing
    pub clock: SharedClock,
    /// File re-read by `POST /config/reload`; `None` reloads built-in defaults
    pub config_path: Option<PathBuf>,
}

impl AppState {
    pub fn new(snapshot: RegistrySnapshot, stats: SharedStats, clock: SharedClock) -> Self {
        Self {
            registry: Registry::new(snapshot),
            stats,
            clock,
            config_path: None,
        }
    }

    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Rebuild the registry from its source and publish it. On failure the
    /// current registry stays in effect.
    pub fn reload(&self) -> Result<u64, ConfigError> {
        let snapshot = match &self.config_path {
            Some(path) => Config::from_file(path)?.to_snapshot()?,
            None => RegistrySnapshot::builtin(),
        };
        let version = self.registry.replace(snapshot);
        tracing::info!(
            version,
            source = %self
                .config_path
                .as_deref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "built-in defaults".to_string()),
            "Configuration reloaded"
        );
        Ok(version)
    }
}
