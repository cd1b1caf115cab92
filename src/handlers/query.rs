//! Single-query handler: ask once, print the reply, exit.

use anyhow::{bail, Result};

use crate::agent::Agent;
use crate::llm::LanguageModel;
use crate::printer::print_reply;

pub async fn run<M: LanguageModel>(
    agent: &mut Agent<M>,
    query: &str,
    markdown: bool,
) -> Result<()> {
    let reply = agent.run(query).await;
    print_reply(&reply.response, reply.result.as_ref(), markdown);
    if !reply.success {
        bail!("query did not complete");
    }
    Ok(())
}
