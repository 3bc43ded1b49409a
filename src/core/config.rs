//! Run configuration: `postedit.toml` plus environment overrides.
//!
//! Missing file = defaults (not an error). A file that exists but does not
//! parse is a [`PostEditError::ConfigError`].

use crate::core::error::PostEditError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "postedit.toml";

pub const ENV_SANDBOX: &str = "POSTEDIT_SANDBOX";
pub const ENV_LLM_PROVIDER: &str = "POSTEDIT_LLM_PROVIDER";
pub const ENV_LLM_MODEL: &str = "POSTEDIT_LLM_MODEL";
pub const ENV_LOG: &str = "POSTEDIT_LOG";
pub const ENV_DESIGN_DIRECTIVES: &str = "POSTEDIT_DESIGN_DIRECTIVES";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostEditConfig {
    /// Public domain of the site, used for the bootstrap head title
    pub domain: String,
    pub sandbox_dir: PathBuf,
    pub llm_provider: String,
    /// Explicit model; `None` resolves to the provider default
    pub llm_model: Option<String>,
    pub css_framework: String,
    /// Free-text design guidance appended to the css applier's style hints
    pub design_directives: Option<String>,
    pub log_level: String,
}

impl Default for PostEditConfig {
    fn default() -> Self {
        Self {
            domain: "example.com".to_string(),
            sandbox_dir: PathBuf::from("sandbox"),
            llm_provider: "openai".to_string(),
            llm_model: None,
            css_framework: "bootstrap".to_string(),
            design_directives: None,
            log_level: "info".to_string(),
        }
    }
}

pub fn default_model_for(provider: &str) -> &'static str {
    match provider.trim().to_lowercase().as_str() {
        "anthropic" => "claude-3-5-haiku-latest",
        "ollama" => "llama3.1",
        _ => "gpt-4.1-mini",
    }
}

impl PostEditConfig {
    pub fn resolved_model(&self) -> String {
        match &self.llm_model {
            Some(model) if !model.trim().is_empty() => model.clone(),
            _ => default_model_for(&self.llm_provider).to_string(),
        }
    }

    /// Parse a config document. Unknown keys are ignored.
    pub fn from_toml_str(content: &str) -> Result<Self, PostEditError> {
        toml::from_str(content).map_err(|e| PostEditError::ConfigError(e.to_string()))
    }

    /// Apply overrides from a variable lookup. Split from [`load_config`] so
    /// tests do not have to mutate the process environment.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_SANDBOX).filter(|v| !v.is_empty()) {
            self.sandbox_dir = PathBuf::from(dir);
        }
        if let Some(provider) = lookup(ENV_LLM_PROVIDER).filter(|v| !v.is_empty()) {
            self.llm_provider = provider;
        }
        if let Some(model) = lookup(ENV_LLM_MODEL).filter(|v| !v.is_empty()) {
            self.llm_model = Some(model);
        }
        if let Some(level) = lookup(ENV_LOG).filter(|v| !v.is_empty()) {
            self.log_level = level;
        }
        if let Some(directives) = lookup(ENV_DESIGN_DIRECTIVES) {
            self.design_directives = Some(directives);
        }
    }
}

/// Load `<dir>/postedit.toml` (if any) and apply environment overrides.
/// A relative `sandbox_dir` is resolved against `dir`.
pub fn load_config(dir: &Path) -> Result<PostEditConfig, PostEditError> {
    let config_path = dir.join(CONFIG_FILE_NAME);

    let mut config = if config_path.exists() {
        let content = fs::read_to_string(&config_path).map_err(PostEditError::IoError)?;
        PostEditConfig::from_toml_str(&content).map_err(|e| match e {
            PostEditError::ConfigError(msg) => {
                PostEditError::ConfigError(format!("{}: {}", config_path.display(), msg))
            }
            other => other,
        })?
    } else {
        PostEditConfig::default()
    };

    config.apply_overrides(|key| std::env::var(key).ok());

    if config.sandbox_dir.is_relative() {
        config.sandbox_dir = dir.join(&config.sandbox_dir);
    }
    Ok(config)
}
