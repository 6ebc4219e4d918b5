//! Layered configuration: defaults → optional TOML file → environment.
//!
//! Environment keys use the `PLANNER` prefix and `__` as the section
//! separator, e.g. `PLANNER__ENGINE__PROVIDER=openai` or
//! `PLANNER__ANALYZER__MAX_DISTANCE_FACTOR=6`.

use crate::error::Result;
use crate::types::{AnalyzerConfig, EngineConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub engine: EngineConfig,
    pub analyzer: AnalyzerConfig,
}

impl Settings {
    pub const ENV_PREFIX: &'static str = "PLANNER";

    /// Load settings; `path`, when given, must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(Self::ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );
        let settings: Settings = builder.build()?.try_deserialize()?;
        log::debug!(
            "Loaded settings (provider='{}', timeout={}s)",
            settings.engine.provider,
            settings.engine.request_timeout_secs
        );
        Ok(settings)
    }
}
