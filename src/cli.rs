use std::path::PathBuf;

use clap::{ArgGroup, Parser};

#[derive(Parser, Debug, Clone)]
#[command(name = "askdf", about = "Ask natural-language questions about a CSV dataset", version)]
#[command(group(ArgGroup::new("md_switch").args(["md", "no_md"]).multiple(false)))]
#[command(group(ArgGroup::new("model_task").args(["fast", "reasoning"]).multiple(false)))]
pub struct Cli {
    /// Question to ask about the data; omit to start an interactive session.
    #[arg(value_name = "QUERY")]
    pub query: Option<String>,

    /// Path to the CSV file to analyze.
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// Large language model to use (overrides the configured default).
    #[arg(long)]
    pub model: Option<String>,

    /// Use the fast model profile (smaller model, tighter token budget).
    #[arg(long)]
    pub fast: bool,

    /// Use the reasoning model profile (larger token budget).
    #[arg(long)]
    pub reasoning: bool,

    /// Prettify agent prose as Markdown.
    #[arg(long)]
    pub md: bool,
    /// Print agent prose verbatim.
    #[arg(long = "no-md")]
    pub no_md: bool,

    /// Verbose logging (state transitions, retries, sandbox rejections).
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
