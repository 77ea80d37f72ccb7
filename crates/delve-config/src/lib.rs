//! Configuration for Delve.
//!
//! TOML files layered from the user config directory and the project
//! directory, with:
//! - a default LLM (`[llm]`) plus named profiles (`[llm.reasoning]`, ...)
//! - research, search, and interaction-log settings
//! - API key lookup (env var → config file)

pub mod discovery;
pub mod error;
pub mod resolver;
pub mod secrets;
pub mod types;

pub use discovery::{
    CONFIG_DIR_ENV, ConfigSource, LoadedConfig, PROJECT_CONFIG_FILE, load_config,
    load_config_file, load_config_with_options, save_config, xdg_config_dir, xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use resolver::{
    ResolvedFrom, ResolvedLlm, ResolvedSearch, resolve_all_profiles, resolve_for_report,
    resolve_for_research, resolve_search,
};
pub use types::*;
