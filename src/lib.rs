//! Ask natural-language questions about a CSV dataset. An external model
//! proposes a data-manipulation pipeline; a restricted local sandbox runs
//! it against the in-memory table and the answer comes back with the
//! computed result attached.

pub mod agent;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod handlers;
pub mod history;
pub mod llm;
pub mod printer;
pub mod prompt;
pub mod sandbox;

use std::path::Path;

use anyhow::Result;

pub use agent::{Agent, AgentReply, AgentSettings};

/// One-shot programmatic entry point: load `csv_path`, run a single
/// instruction, and return the reply. Configuration comes from the
/// environment/rc file, same as the CLI.
pub async fn ask(instruction: &str, csv_path: impl AsRef<Path>) -> Result<AgentReply> {
    dotenv::dotenv().ok();
    let cfg = config::Config::load();
    let client = llm::LlmClient::from_config(&cfg)?;
    let settings = AgentSettings::from_config(&cfg, config::ModelTask::Default);
    let mut agent = Agent::new(client, settings);
    agent.load(csv_path.as_ref())?;
    Ok(agent.run(instruction).await)
}
