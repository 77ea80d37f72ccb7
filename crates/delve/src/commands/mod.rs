//! CLI command handlers.

use std::path::PathBuf;

use anyhow::Result;

pub mod config;
pub mod research;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    pub verbose: bool,
    /// Overrides the user config directory.
    pub config_dir: Option<PathBuf>,
}

impl Context {
    /// Discover config layers and surface their warnings.
    pub fn load_config(&self) -> Result<delve_config::LoadedConfig> {
        let loaded = delve_config::load_config_with_options(None, self.config_dir.as_deref())?;
        for warning in &loaded.warnings {
            tracing::warn!("{}", warning);
        }
        Ok(loaded)
    }

    /// The user config directory in effect.
    pub fn user_config_dir(&self) -> Option<PathBuf> {
        self.config_dir.clone().or_else(delve_config::xdg_config_dir)
    }
}
