use std::io::{self, Read};

use anyhow::{bail, Result};
use is_terminal::IsTerminal;
use tracing_subscriber::EnvFilter;

use askdf::agent::{Agent, AgentSettings};
use askdf::cli::Cli;
use askdf::config::{Config, ModelTask};
use askdf::handlers;
use askdf::llm::LlmClient;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Cli::parse();

    // Load config
    let cfg = Config::load();

    let verbose = args.verbose || cfg.get_bool("VERBOSE");
    let default_filter = if verbose { "askdf=debug" } else { "askdf=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(io::stderr)
        .init();

    // Missing API key is the one fatal configuration error.
    if cfg.api_key().is_none() {
        bail!(
            "MISTRAL_API_KEY is not set. Export it, put it in a .env file, or add it to {}",
            cfg.config_path.display()
        );
    }

    // Resolve model profile: --fast/--reasoning pick a task, --model
    // overrides the model name within it.
    let task = if args.fast {
        ModelTask::Fast
    } else if args.reasoning {
        ModelTask::Reasoning
    } else {
        ModelTask::Default
    };
    let mut settings = AgentSettings::from_config(&cfg, task);
    if let Some(model) = args.model.clone() {
        settings.model.model = model;
    }

    let client = LlmClient::from_config(&cfg)?;
    let mut agent = Agent::new(client, settings);

    let markdown = if args.no_md {
        false
    } else if args.md {
        true
    } else {
        cfg.get_bool("PRETTIFY_MARKDOWN")
    };

    if let Some(path) = args.csv.as_deref() {
        let profile = agent.load(path)?;
        println!(
            "Loaded {}: {} rows x {} columns",
            path.display(),
            profile.rows,
            profile.cols
        );
    }

    // stdin handling (pipe support): a piped query behaves like a
    // positional one.
    let mut query = args.query.clone();
    if query.is_none() && !io::stdin().is_terminal() {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        if !buf.trim().is_empty() {
            query = Some(buf.trim().to_string());
        }
    }

    match query {
        Some(q) => handlers::query::run(&mut agent, &q, markdown).await,
        None => handlers::repl::run(&mut agent, markdown).await,
    }
}
