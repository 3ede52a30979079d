use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use anyhow::{bail, Context, Result};
use lms_host_traits::session::Namespace;
use serde::{Deserialize, Serialize};

pub const EXPECTED_LLM_ID: &str = "llama-3.2-1b-instruct";
pub const EXPECTED_VLM_ID: &str = "qwen2-vl-2b-instruct";
pub const TOOL_LLM_ID: &str = "qwen2.5-7b-instruct-1m";
pub const EXPECTED_EMBEDDING_ID: &str = "text-embedding-nomic-embed-text-v1.5";

pub const CONFIG_ENV: &str = "LMS_UNLOAD_CONFIG";
pub const HOST_ENV: &str = "LMS_HOST";
pub const LOG_LEVEL_ENV: &str = "LMS_LOG_LEVEL";

const CONFIG_FILE: &str = "unload.toml";

/// A model to unload and the namespace it is served through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelTarget {
    pub identifier: String,
    pub namespace: Namespace,
}

impl ModelTarget {
    pub fn llm(identifier: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            namespace: Namespace::Llm,
        }
    }

    pub fn embedding(identifier: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            namespace: Namespace::Embedding,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnloadConfig {
    pub host: String,
    pub timeout_secs: u64,
    pub log_level: String,
    pub models: Vec<ModelTarget>,
}

impl Default for UnloadConfig {
    fn default() -> Self {
        Self {
            host: "localhost:1234".to_string(),
            timeout_secs: 30,
            log_level: "info".to_string(),
            models: vec![
                ModelTarget::llm(EXPECTED_LLM_ID),
                ModelTarget::llm(EXPECTED_VLM_ID),
                ModelTarget::llm(TOOL_LLM_ID),
                ModelTarget::embedding(EXPECTED_EMBEDDING_ID),
            ],
        }
    }
}

impl UnloadConfig {
    /// Reads the config file (explicit path from `LMS_UNLOAD_CONFIG`, else the
    /// fixtures directory if it has one), then applies env overrides.
    pub fn load() -> Result<Self> {
        Self::load_with(|key| env::var(key).ok(), default_config_path())
    }

    /// `load` with the environment and the fallback config path supplied by the caller.
    pub fn load_with(
        lookup: impl Fn(&str) -> Option<String>,
        fallback: Option<PathBuf>,
    ) -> Result<Self> {
        let mut config = match lookup(CONFIG_ENV).filter(|p| !p.trim().is_empty()) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => match fallback {
                Some(path) if path.is_file() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };

        config.apply_overrides(lookup);
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: UnloadConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup(HOST_ENV).filter(|h| !h.trim().is_empty()) {
            self.host = host;
        }
        if let Some(level) = lookup(LOG_LEVEL_ENV).filter(|l| !l.trim().is_empty()) {
            self.log_level = level;
        }
    }

    /// Every identifier must be attempted exactly once.
    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            bail!("timeout_secs must be greater than zero");
        }

        let mut seen = HashSet::new();
        for model in &self.models {
            if model.identifier.trim().is_empty() {
                bail!("model identifier in the {} namespace is empty", model.namespace);
            }
            if !seen.insert((model.namespace, model.identifier.as_str())) {
                bail!(
                    "{} model '{}' is listed more than once",
                    model.namespace,
                    model.identifier
                );
            }
        }

        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_config_path() -> Option<PathBuf> {
    match lms_utils::paths::fixtures::default_fixtures_dir() {
        Ok(dir) => Some(dir.join(CONFIG_FILE)),
        Err(err) => {
            log::debug!("No fixtures directory: {}", err);
            None
        }
    }
}
