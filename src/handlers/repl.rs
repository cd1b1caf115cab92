//! Interactive read-loop: one query at a time against the loaded dataset.

use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::Result;
use owo_colors::OwoColorize;

use crate::agent::Agent;
use crate::llm::LanguageModel;
use crate::printer::print_reply;

const HELP: &str = "\
Available commands:
  help           show this message
  clear          clear conversation history and start fresh
  load <path>    load a new CSV file
  quit/exit/q    exit

Example questions:
  What are the main characteristics of this dataset?
  Which product category has the highest total revenue?
  How many orders had a discount applied?
  Show the five most expensive orders.
";

pub async fn run<M: LanguageModel>(agent: &mut Agent<M>, markdown: bool) -> Result<()> {
    println!("Interactive mode. Type 'quit' or 'exit' to stop, 'help' for commands.");
    if let Some(path) = agent.dataset().path() {
        println!("CSV file: {}", path.display());
    } else {
        println!("No CSV loaded yet; use `load <path>`.");
    }
    println!();

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("{} ", "You:".magenta());
        io::stdout().flush()?;

        let line = match lines.next() {
            Some(line) => line?,
            None => {
                println!();
                break;
            }
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input.to_ascii_lowercase().as_str() {
            "quit" | "exit" | "q" => {
                println!("Goodbye!");
                break;
            }
            "help" => {
                println!("{}", HELP);
                continue;
            }
            "clear" => {
                agent.clear_history();
                println!("Conversation history cleared.");
                continue;
            }
            _ => {}
        }

        if let Some(rest) = input.strip_prefix("load ") {
            load_csv(agent, rest.trim());
            continue;
        }

        let reply = agent.run(input).await;
        print!("{} ", "Agent:".green());
        print_reply(&reply.response, reply.result.as_ref(), markdown);
        println!();
    }

    Ok(())
}

fn load_csv<M: LanguageModel>(agent: &mut Agent<M>, raw_path: &str) {
    let path = Path::new(raw_path);
    if path.extension().and_then(|e| e.to_str()).map(|e| e.eq_ignore_ascii_case("csv"))
        != Some(true)
    {
        println!("{}", format!("Warning: '{}' does not have a .csv extension.", raw_path).yellow());
    }
    match agent.load(path) {
        Ok(profile) => {
            println!("Loaded {}: {} rows x {} columns", raw_path, profile.rows, profile.cols);
        }
        Err(e) => println!("{}", format!("Load failed: {}", e).yellow()),
    }
}
