//! Config command - configuration inspection and setup.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};

use delve_config::{Backend, PROJECT_CONFIG_FILE, SearchProviderKind};

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show resolved configuration and all LLM profiles
    Show,

    /// Show which config files are loaded and their precedence
    Which,

    /// Initialize a config file with defaults
    Init {
        /// Create project-local config (./delve.toml) instead of user config
        #[arg(long)]
        local: bool,
    },

    /// Show configuration file path
    Path,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Which => cmd_which(ctx),
        ConfigCommand::Init { local } => cmd_init(ctx, local),
        ConfigCommand::Path => cmd_path(ctx),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;
    let config = &loaded.config;

    println!("# Delve Configuration\n");

    let sources = loaded.loaded_from();
    if sources.is_empty() {
        println!("No config files loaded (using defaults)\n");
    } else {
        println!("Config files:");
        for source in &sources {
            println!("  {}", source.display());
        }
        println!();
    }

    let profiles = delve_config::resolve_all_profiles(config);
    if profiles.is_empty() {
        println!("No LLM profiles configured\n");
    } else {
        println!("LLM Profiles:");
        for (name, backend, model) in &profiles {
            println!("  {:<12} {} / {}  {}", name, backend, model, llm_key_status(backend));
        }
        println!();
    }

    let research = config.research();
    println!("Research:");
    println!("  depth: {}  breadth: {}", research.depth, research.breadth);
    println!(
        "  max_steps: {}  max_requeries: {}",
        research.max_steps, research.max_requeries
    );
    println!("  strict_dedup: {}  on_failure: {}", research.strict_dedup, research.on_failure);
    match delve_config::resolve_for_research(config) {
        Ok(llm) => println!("  llm: {} ({})", llm.model, llm.resolved_from),
        Err(e) => println!("  llm: unresolved ({})", e),
    }
    match delve_config::resolve_for_report(config) {
        Ok(llm) => println!("  report_llm: {} ({})", llm.model, llm.resolved_from),
        Err(e) => println!("  report_llm: unresolved ({})", e),
    }
    println!("  output: {}\n", research.output.display());

    let search = config.search();
    println!("Search:");
    println!(
        "  provider: {}  {}",
        search.provider,
        search_key_status(&search.provider, search.api_key.is_some())
    );
    println!(
        "  max_results: {}  live_crawl: {}  timeout: {}s\n",
        search.max_results, search.live_crawl, search.timeout_secs
    );

    if !loaded.warnings.is_empty() {
        println!("Warnings:");
        for w in &loaded.warnings {
            println!("  ⚠ {}", w);
        }
        println!();
    }

    if ctx.verbose {
        println!("---\nRaw config:\n");
        if let Ok(toml_str) = config.to_toml() {
            println!("{}", toml_str);
        }
    }

    Ok(())
}

fn cmd_which(ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;

    println!("Config file search order (later overrides earlier):\n");
    for source in &loaded.sources {
        let status = if source.loaded {
            "✓ loaded"
        } else {
            "· not found"
        };
        println!("  {} {}", status, source.path.display());
    }

    println!();
    let loaded_count = loaded.loaded_from().len();
    if loaded_count == 0 {
        println!("No config files found. Run 'delve config init' to create one.");
    } else {
        println!("{} config file(s) loaded.", loaded_count);
    }

    Ok(())
}

const TEMPLATE: &str = r#"# Delve Configuration
#
# API keys are read from the environment (or a .env file):
#   GROQ_API_KEY, OPENAI_API_KEY, ANTHROPIC_API_KEY, EXA_API_KEY, ...

# Model used for queries, relevance, search and learnings
[llm]
backend = "openai"
model = "gpt-4o-mini"

# A stronger model for the final report (uncomment and set report_llm)
# [llm.reasoning]
# backend = "openai"
# model = "o3-mini"

# [llm.local]
# backend = "ollama"
# model = "llama3.2"

[research]
depth = 2
breadth = 2
max_steps = 5
max_requeries = 2
strict_dedup = true
on_failure = "continue"
# report_llm = "reasoning"
output = "report.md"

[search]
provider = "exa"
max_results = 1
live_crawl = true
timeout_secs = 30

# [logging.interactions]
# enabled = true
# retention_days = 30
"#;

fn cmd_init(ctx: &Context, local: bool) -> Result<()> {
    let path = if local {
        PathBuf::from(PROJECT_CONFIG_FILE)
    } else {
        let dir = ctx
            .user_config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        std::fs::create_dir_all(&dir)?;
        dir.join("config.toml")
    };

    if path.exists() {
        println!("Config file already exists: {}", path.display());
        return Ok(());
    }

    std::fs::write(&path, TEMPLATE)?;
    println!("✓ Created config file: {}", path.display());
    println!();
    println!("Next steps:");
    println!("  export OPENAI_API_KEY=...   # or put it in .env");
    println!("  export EXA_API_KEY=...");
    println!("  delve config show           # verify configuration");

    Ok(())
}

fn cmd_path(ctx: &Context) -> Result<()> {
    match ctx.user_config_dir() {
        Some(dir) => println!("{}", dir.join("config.toml").display()),
        None => eprintln!("Could not determine config directory"),
    }
    Ok(())
}

fn llm_key_status(backend: &Backend) -> &'static str {
    if std::env::var(backend.env_var()).is_ok() {
        "(env var ✓)"
    } else if backend.requires_api_key() {
        "(no key in env)"
    } else {
        ""
    }
}

fn search_key_status(provider: &SearchProviderKind, in_config: bool) -> &'static str {
    if std::env::var(provider.env_var()).is_ok() {
        "(env var ✓)"
    } else if in_config {
        "(config file)"
    } else {
        "(no key)"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use delve_config::DelveConfig;

    #[test]
    fn test_template_parses_with_defaults() {
        let config = DelveConfig::from_toml(TEMPLATE).unwrap();
        assert_eq!(config.research(), delve_config::ResearchConfig::default());
        assert_eq!(config.search(), delve_config::SearchConfig::default());
        assert_eq!(config.llm.unwrap().backend, Some(Backend::Openai));
    }
}
