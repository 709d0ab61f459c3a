use clap::{Parser, Subcommand};
use persona_harness::{
    BenchmarkRunner, DispatchClient, EvaluationOrchestrator, EvaluationRequest, HarnessConfig,
    LlmOracle, Oracle, PersonaCorpus, RequestShape, RunMode, SpecialistRegistry,
    StaticQuestionStore, TargetAddress,
};
use persona_model::{ModelProvider, OpenAiProvider};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "persona-harness")]
#[command(about = "Evaluate how faithfully a conversational agent stays in persona")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one live evaluation against a target agent
    Evaluate {
        /// Base URL of the target agent
        #[arg(long)]
        target_url: String,
        /// How questions are packed into messages
        #[arg(long, value_enum)]
        shape: Option<RequestShape>,
    },
    /// Run the static benchmark over a persona corpus
    Benchmark {
        /// Base URL of the target agent
        #[arg(long)]
        target_url: String,
        /// JSON array of persona descriptions
        #[arg(long)]
        corpus: Option<PathBuf>,
        /// Directory of per-persona question files
        #[arg(long)]
        questions_dir: Option<PathBuf>,
        /// Also write the JSON report here
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// How questions are packed into messages
        #[arg(long, value_enum)]
        shape: Option<RequestShape>,
    },
    /// Fetch the persona a target agent advertises
    Discover {
        /// Base URL of the target agent
        #[arg(long)]
        target_url: String,
    },
    /// List specialists, or show which one matches a persona
    Specialists {
        #[arg(long)]
        persona: Option<String>,
    },
    /// Check that the oracle model endpoint is reachable
    Health,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => HarnessConfig::load(path)?,
        None => HarnessConfig::default(),
    };

    match cli.command {
        Commands::Evaluate { target_url, shape } => {
            evaluate(&config, target_url, shape).await?;
        }
        Commands::Benchmark {
            target_url,
            corpus,
            questions_dir,
            output,
            shape,
        } => {
            let mut config = config;
            if let Some(corpus) = corpus {
                config = config.with_benchmark_corpus(corpus);
            }
            if let Some(dir) = questions_dir {
                config = config.with_benchmark_questions_dir(dir);
            }
            benchmark(&config, &target_url, shape, output).await?;
        }
        Commands::Discover { target_url } => {
            discover(&config, &target_url).await?;
        }
        Commands::Specialists { persona } => {
            list_specialists(&config, persona.as_deref());
        }
        Commands::Health => {
            health_check(&config).await?;
        }
    }

    Ok(())
}

fn build_provider(config: &HarnessConfig) -> Result<OpenAiProvider, Box<dyn std::error::Error>> {
    let provider_config = config.provider_config();
    if provider_config.api_key.is_none() {
        warn!(
            "{} is not set; oracle requests will be unauthenticated",
            config.oracle.api_key_env
        );
    }
    Ok(OpenAiProvider::new(provider_config)?)
}

fn build_oracle(config: &HarnessConfig) -> Result<Arc<dyn Oracle>, Box<dyn std::error::Error>> {
    let provider = build_provider(config)?;
    let oracle = LlmOracle::new(Arc::new(provider))
        .with_retry(config.retry_policy())
        .with_model(config.oracle.model.clone());
    Ok(Arc::new(oracle))
}

/// Token cancelled on Ctrl-C.
fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let handle = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; cancelling run");
            handle.cancel();
        }
    });
    token
}

async fn evaluate(
    config: &HarnessConfig,
    target_url: String,
    shape: Option<RequestShape>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut request = EvaluationRequest::new(target_url);
    request.shape = shape;
    let command = request.validate()?;

    let registry = Arc::new(SpecialistRegistry::load(&config.paths.specialists_dir));
    info!("Loaded {} specialists", registry.len());

    let oracle = build_oracle(config)?;
    let dispatch_config = config.dispatch_config_for(command.shape);
    let dispatch = DispatchClient::new(command.target, dispatch_config)?;

    let mut orchestrator = EvaluationOrchestrator::new(
        registry,
        oracle,
        dispatch,
        config.planner_config(),
        config.paths.rubrics_dir.clone(),
    )
    .with_cancellation(interrupt_token());

    let outcome = orchestrator.run(RunMode::Live).await;
    if !outcome.is_completed() {
        error!("Evaluation did not complete");
    }
    println!("{}", outcome);
    Ok(())
}

async fn benchmark(
    config: &HarnessConfig,
    target_url: &str,
    shape: Option<RequestShape>,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let target = TargetAddress::parse(target_url)?;
    let corpus = PersonaCorpus::load(&config.paths.benchmark_corpus)?;
    let store = StaticQuestionStore::new(config.paths.benchmark_questions_dir.clone());

    let oracle = build_oracle(config)?;
    let runner = BenchmarkRunner::new(oracle, store, config.paths.rubrics_dir.clone())
        .with_dispatch_config(config.dispatch_config_for(shape))
        .with_cancellation(interrupt_token());

    let report = runner.run(target, &corpus).await?;
    let json = report.to_json()?;

    if let Some(path) = output {
        std::fs::write(&path, &json)?;
        info!("Benchmark report written to {}", path.display());
    }
    println!("{}", json);
    Ok(())
}

async fn discover(
    config: &HarnessConfig,
    target_url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let target = TargetAddress::parse(target_url)?;
    let client = DispatchClient::new(target, config.dispatch_config())?;
    let persona = client.discover_persona().await?;
    println!("{}", persona);
    Ok(())
}

fn list_specialists(config: &HarnessConfig, persona: Option<&str>) {
    let registry = SpecialistRegistry::load(&config.paths.specialists_dir);

    match persona {
        Some(persona) => match registry.find(persona) {
            Some(profile) => println!("Matched specialist: {}", profile.domain_name),
            None => println!("No specialist matches; dynamic questions will be generated"),
        },
        None => {
            if registry.is_empty() {
                println!(
                    "No specialists found in {}",
                    config.paths.specialists_dir.display()
                );
                return;
            }
            println!("Specialists:");
            for profile in registry.profiles() {
                println!("  - {}: {}", profile.domain_name, profile.keywords.join(", "));
            }
        }
    }
}

async fn health_check(config: &HarnessConfig) -> Result<(), Box<dyn std::error::Error>> {
    let provider = build_provider(config)?;
    println!("Checking {} at {}...", provider.provider_name(), config.oracle.base_url);

    match provider.health_check().await {
        Ok(()) => {
            println!("✓ Oracle endpoint is healthy");
            Ok(())
        }
        Err(e) => {
            error!("Health check failed: {}", e);
            println!("✗ Oracle endpoint is unhealthy: {}", e);
            Err(e.into())
        }
    }
}
