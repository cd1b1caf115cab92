//! End-to-end orchestration tests against a scripted model backend.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use askdf::agent::{Agent, AgentSettings};
use askdf::config::ModelProfile;
use askdf::dataset::LoadOptions;
use askdf::history::TurnRole;
use askdf::llm::{ChatMessage, ChatOptions, LanguageModel, ModelError};

/// Replays canned replies and records every request it sees.
struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedModel {
    fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|s| s.to_string()).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn push_replies(&self, replies: &[&str]) {
        let mut q = self.replies.lock().unwrap();
        q.extend(replies.iter().map(|s| s.to_string()));
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn last_request(&self) -> Vec<ChatMessage> {
        self.requests.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

impl LanguageModel for &ScriptedModel {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        _opts: &ChatOptions,
    ) -> Result<String, ModelError> {
        self.requests.lock().unwrap().push(messages);
        self.replies.lock().unwrap().pop_front().ok_or(ModelError::EmptyResponse)
    }
}

fn settings() -> AgentSettings {
    AgentSettings {
        max_iterations: 3,
        transport_retries: 0,
        history_length: 20,
        execution_timeout: Duration::from_secs(5),
        load: LoadOptions::default(),
        sample_rows: 5,
        model: ModelProfile { model: "scripted".into(), temperature: 0.0, max_tokens: 512 },
    }
}

fn people_csv() -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().expect("tempfile");
    f.write_all(
        b"name,age,salary,department\n\
          Alice,25,50000,Engineering\n\
          Bob,30,60000,Sales\n\
          Charlie,35,70000,Engineering\n\
          Diana,28,55000,Marketing\n",
    )
    .expect("write csv");
    f
}

fn turn_counts(agent: &Agent<&ScriptedModel>) -> (usize, usize) {
    let turns = agent.history().history(usize::MAX);
    let users = turns.iter().filter(|t| t.role == TurnRole::User).count();
    let agents = turns.iter().filter(|t| t.role == TurnRole::Agent).count();
    (users, agents)
}

#[tokio::test]
async fn direct_answer_is_returned_and_recorded() {
    let model = ScriptedModel::new(&["The dataset has 4 rows across 4 columns."]);
    let mut agent = Agent::new(&model, settings());
    let csv = people_csv();
    agent.load(csv.path()).expect("load");

    let reply = agent.run("give me an overview").await;
    assert!(reply.success);
    assert!(reply.response.contains("4 rows"));
    assert!(reply.result.is_none());
    assert_eq!(turn_counts(&agent), (1, 1));
    assert_eq!(model.calls(), 1);

    // The system prompt described the loaded dataset to the model.
    let request = model.last_request();
    assert!(request[0].content.contains("4 rows x 4 columns"));
    assert!(request[0].content.contains("salary"));
}

#[tokio::test]
async fn pipeline_reply_is_executed_against_the_dataset() {
    let model = ScriptedModel::new(&[
        "Average salary per department:\n```\ngroupby department agg mean(salary) as avg_salary | sort department\n```",
    ]);
    let mut agent = Agent::new(&model, settings());
    let csv = people_csv();
    agent.load(csv.path()).expect("load");

    let reply = agent.run("average salary by department").await;
    assert!(reply.success);
    let result = reply.result.expect("computed result");
    assert_eq!(result.rows, Some(3));
    assert_eq!(result.cols, Some(2));
    assert!(result.rendered.contains("avg_salary"));
}

#[tokio::test]
async fn scalar_results_stand_alone_as_the_answer() {
    let model = ScriptedModel::new(&["```\ncount\n```"]);
    let mut agent = Agent::new(&model, settings());
    let csv = people_csv();
    agent.load(csv.path()).expect("load");

    let reply = agent.run("how many rows are there?").await;
    assert!(reply.success);
    assert_eq!(reply.response, "count = 4");
}

#[tokio::test]
async fn three_malformed_replies_exhaust_the_attempt_budget() {
    let model = ScriptedModel::new(&["```\nselect name", "```\nselect name", "```\nselect name"]);
    let mut agent = Agent::new(&model, settings());
    let csv = people_csv();
    agent.load(csv.path()).expect("load");

    let reply = agent.run("show names").await;
    assert!(!reply.success);
    assert!(reply.response.contains("could not complete"));
    assert_eq!(model.calls(), 3);
    // the failure still lands in the conversation
    assert_eq!(turn_counts(&agent), (1, 1));
}

#[tokio::test]
async fn forbidden_snippet_is_corrected_and_the_session_continues() {
    let model = ScriptedModel::new(&[
        "```\nimport os\n```",
        "I cannot delete files. Here is the data instead:\n```\nselect name, age, salary, department\n```",
    ]);
    let mut agent = Agent::new(&model, settings());
    let csv = people_csv();
    agent.load(csv.path()).expect("load");

    let reply = agent.run("delete every file on disk").await;
    assert!(reply.success);
    assert_eq!(reply.result.as_ref().and_then(|r| r.rows), Some(4));
    assert_eq!(model.calls(), 2);

    // The retry prompt carried the sandbox's rejection to the model.
    let correction = model.last_request();
    let relayed = correction.iter().any(|m| m.content.contains("operation not allowed"));
    assert!(relayed, "correction prompt should quote the failure");

    // Next query on the same session still works.
    model.push_replies(&["All four employees are listed above."]);
    let reply = agent.run("thanks, anything else?").await;
    assert!(reply.success);
    assert_eq!(turn_counts(&agent), (2, 2));
}

#[tokio::test]
async fn pipeline_without_a_dataset_is_a_user_facing_failure() {
    let model = ScriptedModel::new(&["```\ncount\n```"]);
    let mut agent = Agent::new(&model, settings());

    let reply = agent.run("how many rows?").await;
    assert!(!reply.success);
    assert!(reply.response.contains("no dataset loaded"));
    assert_eq!(turn_counts(&agent), (1, 1));
}

#[tokio::test]
async fn model_outage_is_reported_not_propagated() {
    // Empty script: every call errors.
    let model = ScriptedModel::new(&[]);
    let mut agent = Agent::new(&model, settings());
    let csv = people_csv();
    agent.load(csv.path()).expect("load");

    let reply = agent.run("anything").await;
    assert!(!reply.success);
    assert!(reply.response.contains("could not be reached"));
    assert_eq!(turn_counts(&agent), (1, 1));
}

#[tokio::test]
async fn clear_resets_history_between_sessions() {
    let model = ScriptedModel::new(&["First answer.", "Second answer."]);
    let mut agent = Agent::new(&model, settings());
    let csv = people_csv();
    agent.load(csv.path()).expect("load");

    agent.run("first question").await;
    assert_eq!(agent.history().len(), 2);
    agent.clear_history();
    assert!(agent.history().is_empty());

    let reply = agent.run("second question").await;
    assert!(reply.success);
    assert_eq!(turn_counts(&agent), (1, 1));
}
