//! Research command - run a deep research session and write the report.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result, bail};
use clap::{Args, ValueEnum};

use delve_config::{
    Backend, DelveConfig, OnFailure, ResolvedLlm, ResolvedSearch, SearchProviderKind,
};
use delve_llm::{
    AnthropicBackend, AnthropicConfig, Generator, InteractionLogConfig, InteractionLogger,
    OpenAiBackend, OpenAiConfig, SharedBackend,
};
use delve_research::{
    BraveSearch, DeepResearch, ExaSearch, FailurePolicy, FileSink, LearningExtractor,
    QueryGenerator, RelevanceFilter, ReportSink, ReportSynthesizer, Research, SearchAndEvaluate,
    SearchOptions, SharedSearch, TavilySearch,
};

use super::Context;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderArg {
    Exa,
    Tavily,
    Brave,
}

impl From<ProviderArg> for SearchProviderKind {
    fn from(arg: ProviderArg) -> Self {
        match arg {
            ProviderArg::Exa => SearchProviderKind::Exa,
            ProviderArg::Tavily => SearchProviderKind::Tavily,
            ProviderArg::Brave => SearchProviderKind::Brave,
        }
    }
}

/// Arguments for the research command.
#[derive(Args, Debug)]
pub struct ResearchArgs {
    /// The question or topic to research
    #[arg(required = true)]
    pub prompt: String,

    /// Levels of follow-up research (default from config, else 2)
    #[arg(short, long)]
    pub depth: Option<u32>,

    /// Queries generated at the top level; halves at each level below (default 2)
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(0..=5))]
    pub breadth: Option<u64>,

    /// Model generations allowed per search loop (default 5)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_steps: Option<u32>,

    /// Where to write the report (default report.md)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Web search provider
    #[arg(long, value_enum)]
    pub provider: Option<ProviderArg>,

    /// Print the research record as JSON instead of a summary
    #[arg(long)]
    pub json: bool,
}

/// Everything a run needs once config and flags are combined.
#[derive(Debug, Clone)]
pub struct Plan {
    pub prompt: String,
    pub depth: u32,
    pub breadth: usize,
    pub max_steps: u32,
    pub max_requeries: u32,
    pub strict_dedup: bool,
    pub policy: FailurePolicy,
    pub search: SearchOptions,
    pub output: PathBuf,
}

impl Plan {
    /// CLI flags override `[research]` and `[search]`.
    pub fn new(args: &ResearchArgs, config: &DelveConfig) -> Result<Self> {
        let prompt = args.prompt.trim();
        if prompt.is_empty() {
            bail!("Research prompt must not be empty");
        }

        let research = config.research();
        let search = config.search();
        Ok(Self {
            prompt: prompt.to_string(),
            depth: args.depth.unwrap_or(research.depth),
            breadth: args.breadth.map(|b| b as usize).unwrap_or(research.breadth),
            max_steps: args.max_steps.unwrap_or(research.max_steps),
            max_requeries: research.max_requeries,
            strict_dedup: research.strict_dedup,
            policy: match research.on_failure {
                OnFailure::Continue => FailurePolicy::Continue,
                OnFailure::Abort => FailurePolicy::Abort,
            },
            search: SearchOptions {
                live_crawl: search.live_crawl,
                max_results: search.max_results,
            },
            output: args.output.clone().unwrap_or(research.output),
        })
    }
}

/// Collaborators for one run.
pub struct Services {
    pub research: Generator,
    pub report: Generator,
    pub search: SharedSearch,
    pub sink: Box<dyn ReportSink>,
}

/// Run the research command.
pub async fn run(args: ResearchArgs, ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;
    let config = &loaded.config;
    let plan = Plan::new(&args, config)?;

    let research_llm = delve_config::resolve_for_research(config)?;
    let report_llm = delve_config::resolve_for_report(config)?;
    let search = delve_config::resolve_search(config, args.provider.map(Into::into))?;

    let logger = interaction_logger(config)?;
    let services = Services {
        research: generator(&research_llm, logger.clone())?,
        report: generator(&report_llm, logger)?,
        search: build_search(&search)?,
        sink: Box::new(FileSink::new(&plan.output)),
    };

    if ctx.verbose {
        eprintln!(
            "research: {} / {} ({})",
            research_llm.backend, research_llm.model, research_llm.resolved_from
        );
        eprintln!(
            "report:   {} / {} ({})",
            report_llm.backend, report_llm.model, report_llm.resolved_from
        );
        eprintln!("search:   {} (key from {})", search.provider, search.api_key_source);
    }

    let research = execute(&plan, services).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&research)?);
    } else {
        let summary = research.summary();
        println!("Report written to {}", plan.output.display());
        println!("  queries completed:   {}", summary.completed_queries);
        println!("  sources:             {}", summary.unique_urls);
        println!("  learnings:           {}", summary.learnings);
        println!("  follow-up questions: {}", summary.follow_up_questions);
    }

    Ok(())
}

/// Research, then synthesize and persist the report.
pub async fn execute(plan: &Plan, services: Services) -> Result<Research> {
    let filter = RelevanceFilter::new(services.research.clone()).with_strict_dedup(plan.strict_dedup);
    let search = SearchAndEvaluate::new(services.research.clone(), services.search, filter)
        .with_options(plan.search)
        .with_max_steps(plan.max_steps)
        .with_max_requeries(plan.max_requeries);
    let driver = DeepResearch::new(
        QueryGenerator::new(services.research.clone()),
        search,
        LearningExtractor::new(services.research),
    )
    .with_failure_policy(plan.policy);

    tracing::info!(
        depth = plan.depth,
        breadth = plan.breadth,
        policy = %plan.policy,
        "Starting research: {}",
        plan.prompt
    );
    let research = driver
        .run(&plan.prompt, plan.depth, plan.breadth)
        .await
        .context("research failed")?;
    tracing::info!(summary = ?research.summary(), "Research completed!");

    tracing::info!("Generating report...");
    let report = ReportSynthesizer::new(services.report)
        .synthesize(&research)
        .await
        .context("report generation failed")?;
    services.sink.persist(&report).await?;
    tracing::info!(destination = %services.sink.describe(), "Report saved");

    Ok(research)
}

fn interaction_logger(config: &DelveConfig) -> Result<Option<Arc<InteractionLogger>>> {
    let interactions = config.interactions();
    if !interactions.enabled {
        return Ok(None);
    }
    let logger = InteractionLogger::new(InteractionLogConfig {
        enabled: true,
        path: interactions.path,
        retention_days: interactions.retention_days,
    })
    .context("failed to open interaction log")?;
    Ok(Some(Arc::new(logger)))
}

fn generator(resolved: &ResolvedLlm, logger: Option<Arc<InteractionLogger>>) -> Result<Generator> {
    let mut generator = Generator::new(build_backend(resolved)?, &resolved.model);
    if let Some(max_tokens) = resolved.max_tokens {
        generator = generator.with_max_tokens(max_tokens);
    }
    if let Some(temperature) = resolved.temperature {
        generator = generator.with_temperature(temperature);
    }
    if let Some(logger) = logger {
        generator = generator.with_interaction_log(logger);
    }
    Ok(generator)
}

fn build_backend(resolved: &ResolvedLlm) -> Result<SharedBackend> {
    let api_key = resolved.require_api_key()?.map(str::to_string);
    let retries = resolved.retry_max;
    let backoff = resolved.retry_backoff_ms.map(Duration::from_millis);

    if resolved.backend == Backend::Anthropic {
        let mut config = AnthropicConfig::new(api_key.unwrap_or_default());
        if let Some(ref url) = resolved.base_url {
            config = config.with_base_url(url);
        }
        if let Some(retries) = retries {
            config = config.with_max_retries(retries);
        }
        if let Some(backoff) = backoff {
            config = config.with_retry_backoff(backoff);
        }
        return Ok(Arc::new(AnthropicBackend::new(config)?));
    }

    let mut config = match resolved.backend {
        Backend::Openai => OpenAiConfig::openai(api_key.unwrap_or_default()),
        Backend::Groq => OpenAiConfig::groq(api_key.unwrap_or_default()),
        // local servers take a key only when one is configured
        Backend::Custom => OpenAiConfig {
            api_key,
            ..OpenAiConfig::ollama().with_name("custom")
        },
        _ => OpenAiConfig {
            api_key,
            ..OpenAiConfig::ollama()
        },
    };
    if let Some(ref url) = resolved.base_url {
        config = config.with_base_url(url);
    }
    if let Some(retries) = retries {
        config = config.with_max_retries(retries);
    }
    if let Some(backoff) = backoff {
        config = config.with_retry_backoff(backoff);
    }
    Ok(Arc::new(OpenAiBackend::new(config.with_model(&resolved.model))?))
}

fn build_search(resolved: &ResolvedSearch) -> Result<SharedSearch> {
    let timeout = Duration::from_secs(resolved.timeout_secs);
    let base_url = resolved.base_url.as_deref();

    let search: SharedSearch = match resolved.provider {
        SearchProviderKind::Exa => {
            let search = ExaSearch::new(&resolved.api_key, timeout)?;
            Arc::new(match base_url {
                Some(url) => search.with_base_url(url),
                None => search,
            })
        }
        SearchProviderKind::Tavily => {
            let search = TavilySearch::new(&resolved.api_key, timeout)?;
            Arc::new(match base_url {
                Some(url) => search.with_base_url(url),
                None => search,
            })
        }
        SearchProviderKind::Brave => {
            let search = BraveSearch::new(&resolved.api_key, timeout)?;
            Arc::new(match base_url {
                Some(url) => search.with_base_url(url),
                None => search,
            })
        }
    };
    Ok(search)
}
