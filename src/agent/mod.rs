//! Prompt/response orchestration: build prompt, call model, extract the
//! plan, drive the sandbox, record the turn.

use std::path::Path;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::{Config, ModelProfile, ModelTask};
use crate::dataset::{DatasetHolder, DatasetProfile, LoadError, LoadOptions};
use crate::history::{ConversationLog, ConversationTurn, TurnResult};
use crate::llm::{ChatMessage, ChatOptions, LanguageModel, ModelError, Role};
use crate::prompt;
use crate::sandbox::{ExecutionOutcome, Sandbox};

/// Where the orchestration loop currently is. Logged on every transition;
/// `Responding` and `Failed` are the terminal phases of one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    BuildingPrompt,
    AwaitingModel,
    ParsingPlan,
    Executing,
    Retrying,
    Responding,
    Failed,
}

#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub max_iterations: usize,
    pub transport_retries: usize,
    pub history_length: usize,
    pub execution_timeout: Duration,
    pub load: LoadOptions,
    pub sample_rows: usize,
    pub model: ModelProfile,
}

impl AgentSettings {
    pub fn from_config(cfg: &Config, task: ModelTask) -> Self {
        Self {
            max_iterations: cfg.max_iterations(),
            transport_retries: cfg.transport_retries(),
            history_length: cfg.history_length(),
            execution_timeout: Duration::from_secs(cfg.execution_timeout_secs()),
            load: LoadOptions {
                max_size_mb: cfg.max_csv_size_mb(),
                ..LoadOptions::default()
            },
            sample_rows: cfg.sample_size(),
            model: cfg.model_for(task),
        }
    }
}

/// What one query produced: prose for the user, an optional computed
/// result, and whether the query succeeded.
#[derive(Debug, Clone)]
pub struct AgentReply {
    pub response: String,
    pub result: Option<TurnResult>,
    pub success: bool,
}

pub struct Agent<M> {
    backend: M,
    settings: AgentSettings,
    holder: DatasetHolder,
    log: ConversationLog,
    sandbox: Sandbox,
}

impl<M: LanguageModel> Agent<M> {
    pub fn new(backend: M, settings: AgentSettings) -> Self {
        let holder = DatasetHolder::new(settings.sample_rows);
        let sandbox = Sandbox::new(settings.execution_timeout);
        Self { backend, settings, holder, log: ConversationLog::new(), sandbox }
    }

    pub fn load(&mut self, path: &Path) -> Result<DatasetProfile, LoadError> {
        self.holder.load(path, &self.settings.load)
    }

    pub fn dataset(&self) -> &DatasetHolder {
        &self.holder
    }

    pub fn history(&self) -> &ConversationLog {
        &self.log
    }

    pub fn clear_history(&mut self) {
        self.log.clear();
    }

    /// Process one query start to finish. Always records exactly one user
    /// turn and one agent turn, and never returns an error: every failure
    /// mode ends in a user-facing reply.
    pub async fn run(&mut self, query: &str) -> AgentReply {
        self.log.append(ConversationTurn::user(query));

        // Correction messages accumulated across attempts for this query
        // only; they never enter the conversation log.
        let mut corrections: Vec<ChatMessage> = Vec::new();
        let max = self.settings.max_iterations;

        for attempt in 1..=max {
            trace_phase(Phase::BuildingPrompt, attempt);
            let messages = self.build_messages(&corrections);

            trace_phase(Phase::AwaitingModel, attempt);
            let reply = match self.complete_with_retry(messages).await {
                Ok(text) => text,
                Err(e) => {
                    trace_phase(Phase::Failed, attempt);
                    return self.respond_failure(format!(
                        "The model service could not be reached: {}",
                        e
                    ));
                }
            };

            trace_phase(Phase::ParsingPlan, attempt);
            match extract_plan(&reply) {
                Plan::Direct(text) => {
                    trace_phase(Phase::Responding, attempt);
                    return self.respond_success(text, None);
                }
                Plan::Pipeline { code, prose } => {
                    trace_phase(Phase::Executing, attempt);
                    let df = match self.holder.current() {
                        Ok(df) => df,
                        Err(e) => {
                            trace_phase(Phase::Failed, attempt);
                            return self.respond_failure(e.to_string());
                        }
                    };
                    match self.sandbox.execute(&code, df) {
                        Ok(outcome) => {
                            trace_phase(Phase::Responding, attempt);
                            return self.respond_with_outcome(prose, outcome);
                        }
                        Err(failure) => {
                            warn!(attempt, kind = ?failure.kind, "pipeline failed: {}", failure);
                            trace_phase(Phase::Retrying, attempt);
                            corrections.push(ChatMessage::new(Role::Assistant, reply.clone()));
                            corrections.push(ChatMessage::new(
                                Role::User,
                                prompt::correction_prompt(&failure.to_string()),
                            ));
                        }
                    }
                }
                Plan::Malformed(reason) => {
                    warn!(attempt, reason, "model output was not actionable");
                    trace_phase(Phase::Retrying, attempt);
                    corrections.push(ChatMessage::new(Role::Assistant, reply.clone()));
                    corrections.push(ChatMessage::new(
                        Role::User,
                        prompt::correction_prompt(&reason),
                    ));
                }
            }
        }

        trace_phase(Phase::Failed, max);
        self.respond_failure(format!(
            "I could not complete this request after {} attempts. Try rephrasing the question \
             or asking for something simpler.",
            max
        ))
    }

    fn build_messages(&self, corrections: &[ChatMessage]) -> Vec<ChatMessage> {
        let profile = self.holder.profile().ok();
        let mut messages =
            vec![ChatMessage::new(Role::System, prompt::system_prompt(profile.as_ref()))];
        for turn in self.log.history(self.settings.history_length) {
            let role = match turn.role {
                crate::history::TurnRole::User => Role::User,
                crate::history::TurnRole::Agent => Role::Assistant,
            };
            let mut text = turn.text.clone();
            if let Some(result) = &turn.result {
                text.push_str("\n\nResult:\n");
                text.push_str(clip(&result.rendered, 1200));
            }
            messages.push(ChatMessage::new(role, text));
        }
        messages.extend(corrections.iter().cloned());
        messages
    }

    async fn complete_with_retry(
        &self,
        messages: Vec<ChatMessage>,
    ) -> Result<String, ModelError> {
        let opts = ChatOptions {
            model: self.settings.model.model.clone(),
            temperature: self.settings.model.temperature,
            max_tokens: self.settings.model.max_tokens,
        };
        let mut delay = Duration::from_millis(500);
        let mut retries = 0;
        loop {
            match self.backend.complete(messages.clone(), &opts).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && retries < self.settings.transport_retries => {
                    retries += 1;
                    warn!(retries, error = %e, "model call failed; backing off");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn respond_success(&mut self, response: String, result: Option<TurnResult>) -> AgentReply {
        self.log.append(ConversationTurn::agent(response.clone(), result.clone()));
        AgentReply { response, result, success: true }
    }

    fn respond_failure(&mut self, response: String) -> AgentReply {
        self.log.append(ConversationTurn::agent(response.clone(), None));
        AgentReply { response, result: None, success: false }
    }

    fn respond_with_outcome(&mut self, prose: String, outcome: ExecutionOutcome) -> AgentReply {
        let (response, result) = match outcome {
            ExecutionOutcome::Table(df) => {
                let rendered = format!("{}", df);
                let result = TurnResult {
                    rendered,
                    rows: Some(df.height()),
                    cols: Some(df.width()),
                };
                let response = if prose.is_empty() {
                    format!("Computed a table with {} rows.", df.height())
                } else {
                    prose
                };
                (response, Some(result))
            }
            ExecutionOutcome::Scalar { name, value } => {
                let rendered = format!("{} = {}", name, value);
                let response = if prose.is_empty() { rendered.clone() } else { prose };
                (response, Some(TurnResult { rendered, rows: None, cols: None }))
            }
        };
        self.respond_success(response, result)
    }
}

fn trace_phase(phase: Phase, attempt: usize) {
    debug!(?phase, attempt, "orchestrator transition");
}

fn clip(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// What the model's reply amounts to.
#[derive(Debug, Clone, PartialEq)]
enum Plan {
    /// No code block: the reply itself is the answer.
    Direct(String),
    /// One pipeline to execute, plus any prose around the fence.
    Pipeline { code: String, prose: String },
    /// Nothing actionable; retry with the reason attached.
    Malformed(String),
}

fn extract_plan(reply: &str) -> Plan {
    let trimmed = reply.trim();
    if trimmed.is_empty() {
        return Plan::Malformed("the response was empty".to_string());
    }
    let Some(open) = trimmed.find("```") else {
        return Plan::Direct(trimmed.to_string());
    };
    let after_open = &trimmed[open + 3..];
    let Some(close) = after_open.find("```") else {
        return Plan::Malformed("the code block was never closed".to_string());
    };
    let code = strip_language_tag(&after_open[..close]).trim().to_string();
    if code.is_empty() {
        return Plan::Malformed("the code block was empty".to_string());
    }
    let mut prose = trimmed[..open].trim().to_string();
    let after_close = after_open[close + 3..].trim();
    if !after_close.is_empty() {
        if !prose.is_empty() {
            prose.push('\n');
        }
        prose.push_str(after_close);
    }
    Plan::Pipeline { code, prose }
}

/// Drop a language tag sharing the opening fence line (```text), but keep a
/// first line that is actually a pipeline stage.
fn strip_language_tag(inner: &str) -> &str {
    const VERBS: &[&str] = &[
        "select", "filter", "where", "groupby", "group_by", "agg", "aggregate", "sort",
        "sort_by", "head", "limit", "tail", "unique", "distinct", "drop_nulls", "dropna",
        "count",
    ];
    let Some((first, rest)) = inner.split_once('\n') else {
        return inner;
    };
    let first = first.trim();
    if !first.is_empty()
        && !first.contains(char::is_whitespace)
        && !VERBS.contains(&first.to_ascii_lowercase().as_str())
    {
        rest
    } else {
        inner
    }
}
