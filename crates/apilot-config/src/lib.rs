//! Apilot Configuration
//!
//! TOML configuration loading for the keyword API plugin

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Token for the paid-tier alapi provider. Without it, categories that
    /// have a free-tier endpoint use that one and the paid-only categories
    /// reply with configuration guidance.
    #[serde(default)]
    pub alapi_token: Option<String>,
    /// Deliver the morning news digest as plain text instead of rendering
    /// it to an image.
    #[serde(default)]
    pub morning_news_text_enabled: bool,
}

impl Config {
    /// Load from a TOML file. A missing file is not an error: the plugin
    /// runs with defaults (no token, image digest).
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(token) = &self.alapi_token {
            if token.trim().is_empty() {
                anyhow::bail!("alapi_token cannot be blank when set");
            }
        }
        Ok(())
    }

    /// True when a usable paid-tier token is configured.
    pub fn has_token(&self) -> bool {
        self.alapi_token
            .as_deref()
            .map(|t| !t.trim().is_empty())
            .unwrap_or(false)
    }
}
