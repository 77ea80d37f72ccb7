//! Config file discovery and layered merging.
//!
//! Resolution order (later overrides earlier):
//! 1. `<config dir>/delve/config.toml` (user config, or `$DELVE_CONFIG_DIR/config.toml`)
//! 2. `./delve.toml` (project-local)
//! 3. CLI arguments (handled by the binary)

use std::path::{Path, PathBuf};

use crate::{ConfigError, DelveConfig, Result};

pub const PROJECT_CONFIG_FILE: &str = "delve.toml";

const USER_CONFIG_FILE: &str = "config.toml";

const APP_NAME: &str = "delve";

/// Overrides the platform config directory.
pub const CONFIG_DIR_ENV: &str = "DELVE_CONFIG_DIR";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSource {
    pub path: PathBuf,
    /// Whether the file was found and parsed.
    pub loaded: bool,
}

/// Result of config discovery and loading.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: DelveConfig,
    /// Every layer that was checked, lowest precedence first.
    pub sources: Vec<ConfigSource>,
    /// Malformed layers and plaintext secrets.
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter(|s| s.loaded)
            .map(|s| s.path.as_path())
            .collect()
    }
}

/// Discover and merge the user and project config layers.
pub fn load_config(project_dir: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with_options(project_dir, None)
}

/// Like [`load_config`], with `config_dir` overriding both `DELVE_CONFIG_DIR`
/// and the platform default.
pub fn load_config_with_options(
    project_dir: Option<&Path>,
    config_dir: Option<&Path>,
) -> Result<LoadedConfig> {
    let mut config = DelveConfig::new();
    let mut sources = Vec::new();
    let mut warnings = Vec::new();

    let user_config_path = match config_dir {
        Some(dir) => Some(dir.join(USER_CONFIG_FILE)),
        None => xdg_config_path(),
    };
    if let Some(path) = user_config_path {
        sources.push(load_layer(&mut config, &path, &mut warnings));
    }

    let project_path = project_dir
        .map(|d| d.join(PROJECT_CONFIG_FILE))
        .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_FILE));
    sources.push(load_layer(&mut config, &project_path, &mut warnings));

    check_plaintext_keys(&config, &mut warnings);

    Ok(LoadedConfig {
        config,
        sources,
        warnings,
    })
}

/// Load one file, no discovery.
pub fn load_config_file(path: &Path) -> Result<DelveConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    DelveConfig::from_toml(&contents)
}

/// Write `config` to `path`, creating parent directories.
pub fn save_config(config: &DelveConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteFile {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let contents = config.to_toml()?;
    std::fs::write(path, contents).map_err(|e| ConfigError::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })
}

pub fn xdg_config_path() -> Option<PathBuf> {
    xdg_config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

/// `$DELVE_CONFIG_DIR` if set, else the platform config dir plus `delve`.
pub fn xdg_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Merge `path` into `config` if it exists. A parse failure becomes a warning.
fn load_layer(config: &mut DelveConfig, path: &Path, warnings: &mut Vec<String>) -> ConfigSource {
    let mut source = ConfigSource {
        path: path.to_path_buf(),
        loaded: false,
    };
    if !path.is_file() {
        return source;
    }

    match load_config_file(path) {
        Ok(layer) => {
            config.merge(layer);
            source.loaded = true;
        }
        Err(e) => warnings.push(format!("Failed to load {}: {}", path.display(), e)),
    }
    source
}

fn check_plaintext_keys(config: &DelveConfig, warnings: &mut Vec<String>) {
    if let Some(ref llm) = config.llm
        && llm.has_plaintext_api_key()
    {
        warnings.push(plaintext_warning(
            "[llm]",
            llm.backend.map(|b| b.env_var()).unwrap_or("the backend env var"),
        ));
    }

    let mut names: Vec<&String> = config.llm_profiles.keys().collect();
    names.sort();
    for name in names {
        let llm = &config.llm_profiles[name];
        if llm.has_plaintext_api_key() {
            warnings.push(plaintext_warning(
                &format!("[llm.{}]", name),
                llm.backend.map(|b| b.env_var()).unwrap_or("the backend env var"),
            ));
        }
    }

    if let Some(ref search) = config.search
        && search.api_key.is_some()
    {
        warnings.push(plaintext_warning("[search]", search.provider.env_var()));
    }
}

fn plaintext_warning(section: &str, env_var: &str) -> String {
    format!(
        "API key stored in plaintext in {}. Consider setting {} instead.",
        section, env_var
    )
}
