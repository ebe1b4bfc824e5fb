//! Command-line entry point for listingflow.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use listingflow::cancellation::CancellationToken;
use listingflow::context::{RunContext, RunId, SearchTarget};
use listingflow::core::fields;
use listingflow::events::LoggingEventSink;
use listingflow::pipeline::{Orchestrator, RunOutcome, RunRequest};
use listingflow::registry::StepRegistry;
use listingflow::settings::Settings;
use listingflow::store::FileArtifactStore;

use cli::{Cli, RunArgs};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let (request, args) = cli.command.into_request();
    init_tracing(&args)?;

    let outcome = run(&request, &args).await?;
    std::process::exit(outcome.exit_code());
}

fn init_tracing(args: &RunArgs) -> Result<()> {
    let filter = EnvFilter::try_new(&args.log_level)
        .with_context(|| format!("invalid log level '{}'", args.log_level))?;

    let file_layer = match &args.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };
    let (json_layer, text_layer) = if args.log_json {
        (Some(fmt::layer().json().with_writer(std::io::stderr)), None)
    } else {
        (None, Some(fmt::layer().with_target(false).with_writer(std::io::stderr)))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .with(file_layer)
        .try_init()
        .context("tracing already initialised")
}

async fn run(request: &RunRequest, args: &RunArgs) -> Result<RunOutcome> {
    let settings = Settings::load(args.config.as_deref()).context("loading settings")?;
    let scope = settings.resolve_scope(args.country.as_deref(), args.org.as_deref())?;
    let clients = settings.build_clients().await.context("building clients")?;

    let mut options = settings
        .run
        .clone()
        .with_enrichment(args.enrich || settings.run.enrich_keywords)
        .with_timeout(args.timeout_secs.or(settings.run.timeout_seconds));
    if let Some(n) = args.number_of_results {
        options = options.with_max_results(n);
    }

    let target = if args.image {
        SearchTarget::Image(args.search.clone())
    } else {
        SearchTarget::infer(&args.search)
    };
    let token = Arc::new(CancellationToken::new());
    let mut ctx = RunContext::new(target, args.user.clone())
        .with_scope(scope)
        .with_options(options)
        .with_clients(clients)
        .with_token(Arc::clone(&token))
        .with_event_sink(Arc::new(LoggingEventSink::default()));
    if args.in_place {
        if let Some(run_id) = &args.from_run {
            ctx = ctx.with_run_id(RunId::new(run_id.clone()));
        }
    }

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            token.cancel("interrupted by operator");
        }
    });

    let output_dir = args.output_dir.clone().unwrap_or_else(|| settings.output_dir.clone());
    let store = Arc::new(FileArtifactStore::new(output_dir));
    let registry = Arc::new(StepRegistry::with_builtin_steps(&settings));
    let orchestrator =
        Orchestrator::new(registry, store.clone()).with_definition(settings.pipeline.clone());

    info!(run_id = %ctx.run_id(), "Run directory {}", store.run_dir(ctx.run_id().as_str()).display());
    let outcome = orchestrator.run(&ctx, request).await?;
    print_outcome(&outcome);
    Ok(outcome)
}

fn print_outcome(outcome: &RunOutcome) {
    println!("run {} {}", outcome.run_id, outcome.state);
    for entry in &outcome.entries {
        let partial = if entry.complete { "" } else { " (partial)" };
        println!("  {:>2}. {:<24} {}{partial}", entry.ordinal, entry.step_id, entry.summary);
    }
    if let Some(failure) = &outcome.failure {
        println!(
            "aborted at {}: [{}] {}",
            failure.step_id.as_deref().unwrap_or("-"),
            failure.code,
            failure.message
        );
        return;
    }
    for record in outcome.active_records().take(10) {
        match record.derived(fields::RANK) {
            Some(rank) => println!("  #{rank} {}", record.url()),
            None => println!("  {}", record.url()),
        }
    }
}
