//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! [llm]                    # default LLM
//! [llm.reasoning]          # named LLM profiles
//! [research]               # depth, breadth, loop limits, profile bindings
//! [search]                 # web search provider
//! [logging.interactions]   # JSONL interaction log
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// Every section is optional so that partial layers (a project-local
/// `delve.toml` that only changes `[research]`, say) can be merged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DelveConfig {
    /// The bare `[llm]` section.
    pub llm: Option<LlmConfig>,
    /// Named profiles (`[llm.reasoning]`, `[llm.fast]`, ...).
    pub llm_profiles: HashMap<String, LlmConfig>,
    pub research: Option<ResearchConfig>,
    pub search: Option<SearchConfig>,
    pub logging: Option<LoggingConfig>,
}

impl DelveConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_toml(toml_str: &str) -> crate::Result<Self> {
        let raw: RawConfig = toml::from_str(toml_str)?;
        Ok(raw.into())
    }

    pub fn to_toml(&self) -> crate::Result<String> {
        let raw: RawConfig = self.clone().into();
        Ok(toml::to_string_pretty(&raw)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Sections are replaced whole; profiles are replaced by name.
    pub fn merge(&mut self, other: DelveConfig) {
        if other.llm.is_some() {
            self.llm = other.llm;
        }
        for (name, config) in other.llm_profiles {
            self.llm_profiles.insert(name, config);
        }
        if other.research.is_some() {
            self.research = other.research;
        }
        if other.search.is_some() {
            self.search = other.search;
        }
        if other.logging.is_some() {
            self.logging = other.logging;
        }
    }

    /// `[research]`, or its defaults when the section is absent.
    pub fn research(&self) -> ResearchConfig {
        self.research.clone().unwrap_or_default()
    }

    /// `[search]`, or its defaults when the section is absent.
    pub fn search(&self) -> SearchConfig {
        self.search.clone().unwrap_or_default()
    }

    pub fn interactions(&self) -> InteractionsConfig {
        self.logging
            .as_ref()
            .map(|l| l.interactions.clone())
            .unwrap_or_default()
    }

    /// Look up a named profile; `"default"` names the bare `[llm]` section.
    pub fn lookup_llm(&self, name: &str, context: &str) -> crate::Result<&LlmConfig> {
        let found = if name == "default" {
            self.llm.as_ref()
        } else {
            self.llm_profiles.get(name)
        };
        found.ok_or_else(|| crate::ConfigError::LlmNotFound {
            name: name.to_string(),
            context: context.to_string(),
        })
    }

    /// Names of every configured profile, sorted.
    pub fn llm_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.llm_profiles.keys().cloned().collect();
        if self.llm.is_some() {
            names.push("default".to_string());
        }
        names.sort();
        names
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Raw TOML structure (for serde)
// ─────────────────────────────────────────────────────────────────────────────

/// `[llm]` carries both direct keys and named sub-tables, which serde cannot
/// map onto two fields without this intermediate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct RawConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    llm: Option<RawLlmSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    research: Option<ResearchConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    search: Option<SearchConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct RawLlmSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    backend: Option<Backend>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_max: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_backoff_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,

    #[serde(flatten)]
    profiles: HashMap<String, LlmConfig>,
}

impl From<RawConfig> for DelveConfig {
    fn from(raw: RawConfig) -> Self {
        let (llm, llm_profiles) = match raw.llm {
            Some(section) => {
                let default = if section.backend.is_some() || section.model.is_some() {
                    Some(LlmConfig {
                        backend: section.backend,
                        model: section.model,
                        base_url: section.base_url,
                        api_key: section.api_key,
                        retry_max: section.retry_max,
                        retry_backoff_ms: section.retry_backoff_ms,
                        max_tokens: section.max_tokens,
                        temperature: section.temperature,
                    })
                } else {
                    None
                };
                (default, section.profiles)
            }
            None => (None, HashMap::new()),
        };

        DelveConfig {
            llm,
            llm_profiles,
            research: raw.research,
            search: raw.search,
            logging: raw.logging,
        }
    }
}

impl From<DelveConfig> for RawConfig {
    fn from(config: DelveConfig) -> Self {
        let llm = if config.llm.is_some() || !config.llm_profiles.is_empty() {
            let default = config.llm.unwrap_or_default();
            Some(RawLlmSection {
                backend: default.backend,
                model: default.model,
                base_url: default.base_url,
                api_key: default.api_key,
                retry_max: default.retry_max,
                retry_backoff_ms: default.retry_backoff_ms,
                max_tokens: default.max_tokens,
                temperature: default.temperature,
                profiles: config.llm_profiles,
            })
        } else {
            None
        };

        RawConfig {
            llm,
            research: config.research,
            search: config.search,
            logging: config.logging,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LLM Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// One LLM profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<Backend>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Override for the provider's API base URL. Required for `custom`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Plaintext key. Prefer the backend's environment variable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_max: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_backoff_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl LlmConfig {
    pub fn has_plaintext_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Anthropic,
    Openai,
    Groq,
    Ollama,
    /// Any OpenAI-compatible endpoint at `base_url`.
    Custom,
}

impl Backend {
    /// Environment variable holding this backend's API key.
    pub fn env_var(&self) -> &'static str {
        match self {
            Backend::Anthropic => "ANTHROPIC_API_KEY",
            Backend::Openai => "OPENAI_API_KEY",
            Backend::Groq => "GROQ_API_KEY",
            Backend::Ollama => "OLLAMA_API_KEY",
            Backend::Custom => "LLM_API_KEY",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Backend::Anthropic => "Anthropic",
            Backend::Openai => "OpenAI",
            Backend::Groq => "Groq",
            Backend::Ollama => "Ollama",
            Backend::Custom => "Custom",
        }
    }

    /// Local servers run without a key.
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Backend::Ollama | Backend::Custom)
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Research Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// `[research]`: recursion shape, loop limits, and which profiles to use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    pub depth: u32,
    pub breadth: usize,
    /// Generations allowed per search-and-evaluate loop.
    pub max_steps: u32,
    /// Extra searches allowed after an irrelevant verdict.
    pub max_requeries: u32,
    /// Reject exact URL duplicates without asking the model.
    pub strict_dedup: bool,
    pub on_failure: OnFailure,
    /// Profile for query, relevance, search and learning calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm: Option<String>,
    /// Profile for the final report. Falls back to `llm`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_llm: Option<String>,
    pub output: PathBuf,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            depth: 2,
            breadth: 2,
            max_steps: 5,
            max_requeries: 2,
            strict_dedup: true,
            on_failure: OnFailure::default(),
            llm: None,
            report_llm: None,
            output: PathBuf::from("report.md"),
        }
    }
}

/// What a failed query does to the rest of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnFailure {
    #[default]
    Continue,
    Abort,
}

impl std::fmt::Display for OnFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            OnFailure::Continue => "continue",
            OnFailure::Abort => "abort",
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Search Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub provider: SearchProviderKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub max_results: usize,
    /// Ask the provider to crawl pages live instead of serving its cache.
    pub live_crawl: bool,
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: SearchProviderKind::default(),
            api_key: None,
            base_url: None,
            max_results: 1,
            live_crawl: true,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchProviderKind {
    #[default]
    Exa,
    Tavily,
    Brave,
}

impl SearchProviderKind {
    pub fn env_var(&self) -> &'static str {
        match self {
            SearchProviderKind::Exa => "EXA_API_KEY",
            SearchProviderKind::Tavily => "TAVILY_API_KEY",
            SearchProviderKind::Brave => "BRAVE_API_KEY",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            SearchProviderKind::Exa => "Exa",
            SearchProviderKind::Tavily => "Tavily",
            SearchProviderKind::Brave => "Brave",
        }
    }
}

impl std::fmt::Display for SearchProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

impl std::str::FromStr for SearchProviderKind {
    type Err = crate::ConfigError;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "exa" => Ok(Self::Exa),
            "tavily" => Ok(Self::Tavily),
            "brave" => Ok(Self::Brave),
            other => Err(crate::ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub interactions: InteractionsConfig,
}

/// `[logging.interactions]`: one JSON line per LLM exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionsConfig {
    pub enabled: bool,
    /// Directory for the JSONL files. Defaults to `<config dir>/delve/interactions/`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub retention_days: u32,
}

impl Default for InteractionsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: None,
            retention_days: 30,
        }
    }
}
