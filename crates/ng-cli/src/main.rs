//! NavGuard CLI
//!
//! CLI tool for classifying URLs, checking them against the reputation
//! service, and replaying recorded tab events through the verdict engine.

mod console;
mod logging;
mod replay;

use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use ng_core::http::HttpReputationService;
use ng_core::reputation::RecordOutcome;
use ng_core::url::parse_navigation;
use ng_core::{GuardConfig, NavigationEvent, NavigationOutcome, ReputationClient, Verdict, VerdictEngine};

use console::{ConsoleBadge, ConsoleMessenger};

#[derive(Parser)]
#[command(name = "ng-cli")]
#[command(about = "NavGuard navigation classifier and tools")]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Reputation service base URL (overrides config)
    #[arg(long, global = true)]
    service_url: Option<String>,

    /// Reputation request timeout in milliseconds (overrides config)
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Log level or filter, used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the local heuristics on URLs without contacting the service
    Classify {
        /// URLs to classify
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Run one navigation through the full pipeline
    Check {
        /// URL to check
        url: String,

        /// Tab id to report against
        #[arg(short, long, default_value_t = 1)]
        tab: i32,

        /// Request an in-depth check if the page is not approved
        #[arg(long)]
        lookup: bool,
    },

    /// Replay JSON-lines tab events through the engine
    Replay {
        /// Event file, or '-' for stdin
        #[arg(short, long, default_value = "-")]
        input: String,
    },

    /// Dump the reputation index
    Index {
        /// List every indexed domain
        #[arg(short, long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init_logging(&cli.log_level) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    let result = match load_config(&cli) {
        Ok(config) => match cli.command {
            Commands::Classify { urls } => cmd_classify(&config, &urls),
            Commands::Check { url, tab, lookup } => cmd_check(config, &url, tab, lookup).await,
            Commands::Replay { input } => cmd_replay(config, &input).await,
            Commands::Index { all } => cmd_index(&config, all).await,
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<GuardConfig, String> {
    let mut config = match &cli.config {
        Some(path) => GuardConfig::load(path).map_err(|e| format!("Failed to load config: {}", e))?,
        None => GuardConfig::default(),
    };

    if let Some(url) = &cli.service_url {
        config.service_url = url.clone();
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.request_timeout_ms = timeout_ms;
    }

    config.validate().map_err(|e| format!("Invalid config: {}", e))?;
    Ok(config)
}

fn cmd_classify(config: &GuardConfig, urls: &[String]) -> Result<(), String> {
    let rules = config.rule_set().map_err(|e| format!("Invalid config: {}", e))?;

    for url in urls {
        match parse_navigation(url, &config.internal_schemes) {
            Ok(parsed) => {
                let evaluation = rules.evaluate(&parsed);
                let next = if evaluation.requires_confirmation() {
                    "needs reputation check"
                } else {
                    "safe"
                };
                println!("{}", url);
                println!("  Host:     {}", parsed.hostname);
                println!("  Suffix:   {}", evaluation.tld.as_str());
                println!("  Flags:    {}", evaluation.describe().join(", "));
                println!("  Verdict:  {}", next);
            }
            Err(e) => {
                println!("{}", url);
                println!("  Skipped:  {}", e);
            }
        }
    }

    Ok(())
}

async fn cmd_check(config: GuardConfig, url: &str, tab: i32, lookup: bool) -> Result<(), String> {
    let service =
        HttpReputationService::from_config(&config).map_err(|e| format!("Failed to create service: {}", e))?;
    let engine = VerdictEngine::new(config, service, ConsoleBadge, ConsoleMessenger)
        .map_err(|e| format!("Invalid config: {}", e))?;

    let outcome = engine.handle(&NavigationEvent::complete(tab, url)).await;

    match &outcome {
        NavigationOutcome::Ignored => println!("Ignored"),
        NavigationOutcome::Dropped(failure) => println!("Skipped: {}", failure),
        NavigationOutcome::Resolved { verdict, via_reputation } => {
            let source = if *via_reputation { "reputation index" } else { "heuristics" };
            match verdict {
                Verdict::Safe => println!("Safe ({})", source),
                Verdict::Unsafe { .. } => println!("Not approved ({})", source),
            }
        }
        NavigationOutcome::Unresolved(e) => return Err(format!("Reputation check failed: {}", e)),
        NavigationOutcome::Superseded => println!("Superseded"),
    }

    if lookup && matches!(outcome.verdict(), Some(Verdict::Unsafe { .. })) {
        let Ok(parsed) = parse_navigation(url, &engine.config().internal_schemes) else {
            return Ok(());
        };
        match engine.check_in_depth(&parsed.hostname).await {
            RecordOutcome::Sent => println!("In-depth check requested for {}", parsed.hostname),
            RecordOutcome::DuplicateSuppressed => println!("In-depth check already pending"),
            RecordOutcome::Failed(e) => return Err(format!("In-depth check failed: {}", e)),
        }
    }

    Ok(())
}

async fn cmd_replay(config: GuardConfig, input: &str) -> Result<(), String> {
    let text = if input == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .map_err(|e| format!("Failed to read stdin: {}", e))?;
        text
    } else {
        fs::read_to_string(input).map_err(|e| format!("Failed to read '{}': {}", input, e))?
    };
    let events = replay::parse_events(&text)?;

    let service =
        HttpReputationService::from_config(&config).map_err(|e| format!("Failed to create service: {}", e))?;
    let engine = VerdictEngine::new(config, service, ConsoleBadge, ConsoleMessenger)
        .map_err(|e| format!("Invalid config: {}", e))?;

    let summary = replay::replay(Arc::new(engine), events).await;
    println!();
    println!("{}", summary);

    Ok(())
}

async fn cmd_index(config: &GuardConfig, all: bool) -> Result<(), String> {
    let service =
        HttpReputationService::from_config(config).map_err(|e| format!("Failed to create service: {}", e))?;
    let base = service.base().to_string();
    let client = ReputationClient::new(service);

    let index = client
        .query_index_status()
        .await
        .map_err(|e| format!("Failed to query index: {}", e))?;

    println!("Reputation index: {}", base);
    println!("  Entries:     {}", index.entry_count());
    println!("  Indexed:     {}", index.indexed_count());
    println!("  Skipped:     {}", index.skipped_count());

    if all {
        println!();
        for domain in index.indexed_domains() {
            println!("  {}", domain);
        }
    }

    Ok(())
}
