//! Turns profile references into concrete, ready-to-build backend settings.
//!
//! Research calls and the final report may use different profiles:
//!
//! - research: `research.llm` → `[llm]`
//! - report: `research.report_llm` → `research.llm` → `[llm]`

use crate::secrets::{self, SecretSource};
use crate::{Backend, ConfigError, DelveConfig, LlmConfig, Result, SearchProviderKind};

/// A fully resolved LLM profile.
#[derive(Debug, Clone)]
pub struct ResolvedLlm {
    pub backend: Backend,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub api_key_source: Option<SecretSource>,
    pub resolved_from: ResolvedFrom,
    pub retry_max: Option<u32>,
    pub retry_backoff_ms: Option<u64>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl ResolvedLlm {
    /// The API key, or an error for backends that cannot run without one.
    pub fn require_api_key(&self) -> Result<Option<&str>> {
        match (&self.api_key, self.backend.requires_api_key()) {
            (Some(key), _) => Ok(Some(key.as_str())),
            (None, false) => Ok(None),
            (None, true) => Err(ConfigError::ApiKeyNotFound {
                service: self.backend.display_name().to_string(),
                env_var: self.backend.env_var().to_string(),
            }),
        }
    }
}

/// How a profile was chosen, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedFrom {
    /// Via a `[research]` key such as `report_llm`.
    Binding { key: String, profile: String },
    /// The bare `[llm]` section.
    GlobalDefault,
}

impl std::fmt::Display for ResolvedFrom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolvedFrom::Binding { key, profile } => {
                write!(f, "research.{} -> llm.{}", key, profile)
            }
            ResolvedFrom::GlobalDefault => write!(f, "[llm] (global default)"),
        }
    }
}

/// Profile for query generation, relevance, search and learning calls.
pub fn resolve_for_research(config: &DelveConfig) -> Result<ResolvedLlm> {
    let research = config.research();
    let bindings = [("llm", research.llm.as_deref())];
    resolve_with(config, &bindings)
}

/// Profile for report synthesis.
pub fn resolve_for_report(config: &DelveConfig) -> Result<ResolvedLlm> {
    let research = config.research();
    let bindings = [
        ("report_llm", research.report_llm.as_deref()),
        ("llm", research.llm.as_deref()),
    ];
    resolve_with(config, &bindings)
}

fn resolve_with(config: &DelveConfig, bindings: &[(&str, Option<&str>)]) -> Result<ResolvedLlm> {
    let (llm_config, resolved_from) = select(config, bindings)?;
    let context = || format!("LLM config (resolved via {})", resolved_from);

    let backend = llm_config.backend.ok_or_else(|| ConfigError::MissingField {
        field: "backend".to_string(),
        context: context(),
    })?;

    let model = llm_config
        .model
        .clone()
        .ok_or_else(|| ConfigError::MissingField {
            field: "model".to_string(),
            context: context(),
        })?;

    if backend == Backend::Custom && llm_config.base_url.is_none() {
        return Err(ConfigError::MissingField {
            field: "base_url".to_string(),
            context: context(),
        });
    }

    let (api_key, api_key_source) =
        match secrets::resolve_api_key(&backend, llm_config.api_key.as_deref()) {
            Some(s) => (Some(s.value), Some(s.source)),
            None => (None, None),
        };

    Ok(ResolvedLlm {
        backend,
        model,
        base_url: llm_config.base_url.clone(),
        api_key,
        api_key_source,
        resolved_from,
        retry_max: llm_config.retry_max,
        retry_backoff_ms: llm_config.retry_backoff_ms,
        max_tokens: llm_config.max_tokens,
        temperature: llm_config.temperature,
    })
}

fn select<'a>(
    config: &'a DelveConfig,
    bindings: &[(&str, Option<&str>)],
) -> Result<(&'a LlmConfig, ResolvedFrom)> {
    for (key, profile) in bindings {
        if let Some(profile) = profile {
            let llm = config.lookup_llm(profile, &format!("research.{}", key))?;
            return Ok((
                llm,
                ResolvedFrom::Binding {
                    key: key.to_string(),
                    profile: profile.to_string(),
                },
            ));
        }
    }

    let llm = config.llm.as_ref().ok_or(ConfigError::NoDefaultLlm)?;
    Ok((llm, ResolvedFrom::GlobalDefault))
}

/// Resolved `[search]` settings.
#[derive(Debug, Clone)]
pub struct ResolvedSearch {
    pub provider: SearchProviderKind,
    pub api_key: String,
    pub api_key_source: SecretSource,
    pub base_url: Option<String>,
    pub max_results: usize,
    pub live_crawl: bool,
    pub timeout_secs: u64,
}

/// Resolve `[search]`, optionally forcing a provider. Every provider needs a key.
pub fn resolve_search(
    config: &DelveConfig,
    provider_override: Option<SearchProviderKind>,
) -> Result<ResolvedSearch> {
    let search = config.search();
    let provider = provider_override.unwrap_or(search.provider);

    // A key written for another provider does not carry over.
    let config_key = if provider == search.provider {
        search.api_key.as_deref()
    } else {
        None
    };

    let secret = secrets::resolve_search_key(&provider, config_key).ok_or_else(|| {
        ConfigError::ApiKeyNotFound {
            service: provider.display_name().to_string(),
            env_var: provider.env_var().to_string(),
        }
    })?;

    Ok(ResolvedSearch {
        provider,
        api_key: secret.value,
        api_key_source: secret.source,
        base_url: search.base_url,
        max_results: search.max_results,
        live_crawl: search.live_crawl,
        timeout_secs: search.timeout_secs,
    })
}

/// `(name, backend, model)` for every complete profile, sorted by name.
pub fn resolve_all_profiles(config: &DelveConfig) -> Vec<(String, Backend, String)> {
    let mut profiles = Vec::new();

    if let Some(ref llm) = config.llm
        && let (Some(backend), Some(model)) = (llm.backend, &llm.model)
    {
        profiles.push(("default".to_string(), backend, model.clone()));
    }

    for (name, llm) in &config.llm_profiles {
        if let (Some(backend), Some(model)) = (llm.backend, &llm.model) {
            profiles.push((name.clone(), backend, model.clone()));
        }
    }

    profiles.sort_by(|a, b| a.0.cmp(&b.0));
    profiles
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> DelveConfig {
        DelveConfig::from_toml(
            r#"
[llm]
backend = "ollama"
model = "llama3.2"

[llm.reasoning]
backend = "ollama"
model = "deepseek-r1"
max_tokens = 8000

[llm.fast]
backend = "ollama"
model = "llama3.2:1b"
retry_max = 5
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_global_default() {
        let resolved = resolve_for_research(&test_config()).unwrap();
        assert_eq!(resolved.model, "llama3.2");
        assert_eq!(resolved.resolved_from, ResolvedFrom::GlobalDefault);
        assert_eq!(resolve_for_report(&test_config()).unwrap().model, "llama3.2");
    }

    #[test]
    fn test_report_binding() {
        let mut config = test_config();
        config.merge(DelveConfig::from_toml("[research]\nreport_llm = \"reasoning\"\n").unwrap());

        let report = resolve_for_report(&config).unwrap();
        assert_eq!(report.model, "deepseek-r1");
        assert_eq!(report.max_tokens, Some(8000));
        assert_eq!(report.resolved_from.to_string(), "research.report_llm -> llm.reasoning");

        assert_eq!(resolve_for_research(&config).unwrap().model, "llama3.2");
    }

    #[test]
    fn test_report_falls_back_to_research_profile() {
        let mut config = test_config();
        config.merge(DelveConfig::from_toml("[research]\nllm = \"fast\"\n").unwrap());

        let report = resolve_for_report(&config).unwrap();
        assert_eq!(report.model, "llama3.2:1b");
        assert_eq!(report.retry_max, Some(5));
        assert_eq!(
            report.resolved_from,
            ResolvedFrom::Binding {
                key: "llm".into(),
                profile: "fast".into()
            }
        );
    }

    #[test]
    fn test_missing_profile() {
        let mut config = test_config();
        config.merge(DelveConfig::from_toml("[research]\nllm = \"nope\"\n").unwrap());
        let err = resolve_for_research(&config).unwrap_err();
        assert!(matches!(err, ConfigError::LlmNotFound { ref name, .. } if name == "nope"));
    }

    #[test]
    fn test_no_default() {
        let err = resolve_for_research(&DelveConfig::new()).unwrap_err();
        assert!(matches!(err, ConfigError::NoDefaultLlm));
    }

    #[test]
    fn test_missing_model() {
        let config = DelveConfig::from_toml("[llm]\nbackend = \"ollama\"\n").unwrap();
        let err = resolve_for_research(&config).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { ref field, .. } if field == "model"));
    }

    #[test]
    fn test_custom_needs_base_url() {
        let config = DelveConfig::from_toml("[llm]\nbackend = \"custom\"\nmodel = \"m\"\n").unwrap();
        let err = resolve_for_research(&config).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { ref field, .. } if field == "base_url"));
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let resolved = resolve_for_research(&test_config()).unwrap();
        assert!(resolved.require_api_key().is_ok());
    }

    #[test]
    fn test_search_key_from_config() {
        let config = DelveConfig::from_toml(
            "[search]\nprovider = \"brave\"\napi_key = \"brave-key\"\nmax_results = 2\n",
        )
        .unwrap();
        // Only meaningful when the developer has no BRAVE_API_KEY exported.
        if std::env::var("BRAVE_API_KEY").is_err() {
            let search = resolve_search(&config, None).unwrap();
            assert_eq!(search.provider, SearchProviderKind::Brave);
            assert_eq!(search.api_key, "brave-key");
            assert_eq!(search.api_key_source, SecretSource::ConfigFile);
            assert_eq!(search.max_results, 2);
        }
    }

    #[test]
    fn test_search_override_drops_foreign_key() {
        let config =
            DelveConfig::from_toml("[search]\nprovider = \"brave\"\napi_key = \"brave-key\"\n").unwrap();
        if std::env::var("TAVILY_API_KEY").is_err() {
            let err = resolve_search(&config, Some(SearchProviderKind::Tavily)).unwrap_err();
            assert!(err.to_string().contains("TAVILY_API_KEY"));
        }
    }

    #[test]
    fn test_resolve_all_profiles() {
        let names: Vec<String> = resolve_all_profiles(&test_config())
            .into_iter()
            .map(|(name, _, _)| name)
            .collect();
        assert_eq!(names, vec!["default", "fast", "reasoning"]);
    }
}
