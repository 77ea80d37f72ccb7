//! Errors raised while loading, resolving or writing configuration.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot write {}: {source}", path.display())]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot render config as TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A `[research]` key names a profile that does not exist.
    #[error("LLM profile '{name}' not found (referenced by {context})")]
    LlmNotFound { name: String, context: String },

    #[error("no default LLM configured, add an [llm] section to your config")]
    NoDefaultLlm,

    #[error("{context} is missing '{field}'")]
    MissingField { field: String, context: String },

    #[error("API key not found for '{service}'. Set {env_var} or add api_key to the config file")]
    ApiKeyNotFound { service: String, env_var: String },

    #[error("unknown search provider '{0}', expected one of: exa, tavily, brave")]
    UnknownProvider(String),
}
