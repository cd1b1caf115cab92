//! Restricted execution sandbox.
//!
//! Model-suggested pipelines are untrusted input. Execution is allow-listed
//! (parser), runs against a snapshot of the dataset (eval), and is bounded
//! by a wall-clock timeout. Every request produces an `ExecutionResult`;
//! faults are caught and reported, never propagated.

pub mod eval;
pub mod parser;

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use polars::prelude::DataFrame;
use thiserror::Error;
use tracing::{debug, warn};

pub use eval::ExecutionOutcome;
pub use parser::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Forbidden,
    Timeout,
    Exec,
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ExecutionFailure {
    pub kind: FailureKind,
    pub message: String,
}

pub type ExecutionResult = Result<ExecutionOutcome, ExecutionFailure>;

#[derive(Debug, Clone)]
pub struct Sandbox {
    timeout: Duration,
}

enum WorkerFault {
    TimedOut,
    Died,
}

impl Sandbox {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn execute(&self, snippet: &str, df: &DataFrame) -> ExecutionResult {
        debug!(snippet, "executing pipeline");
        let plan = match parser::parse(snippet) {
            Ok(plan) => plan,
            Err(ParseError::Forbidden(what)) => {
                warn!(snippet, %what, "rejected forbidden pipeline");
                return Err(ExecutionFailure {
                    kind: FailureKind::Forbidden,
                    message: format!(
                        "operation not allowed: {}; only the documented pipeline stages may be used",
                        what
                    ),
                });
            }
            Err(ParseError::Syntax(msg)) => {
                return Err(ExecutionFailure {
                    kind: FailureKind::Exec,
                    message: format!("pipeline syntax error: {}", msg),
                });
            }
        };

        // Snapshot is a cheap clone (shared column buffers); the held frame
        // can never be touched from the worker.
        let snapshot = df.clone();
        match run_bounded(self.timeout, move || eval::evaluate(&plan, &snapshot)) {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(e)) => Err(ExecutionFailure { kind: FailureKind::Exec, message: e.to_string() }),
            Err(WorkerFault::TimedOut) => {
                warn!(timeout_secs = self.timeout.as_secs(), "pipeline timed out");
                Err(ExecutionFailure {
                    kind: FailureKind::Timeout,
                    message: format!(
                        "pipeline did not finish within {} seconds and was abandoned",
                        self.timeout.as_secs()
                    ),
                })
            }
            Err(WorkerFault::Died) => Err(ExecutionFailure {
                kind: FailureKind::Exec,
                message: "execution worker terminated unexpectedly".to_string(),
            }),
        }
    }
}

/// Run `task` on a dedicated thread, waiting at most `timeout`. On overrun
/// the worker is abandoned (it holds only its own snapshot). A panicking
/// worker drops its sender, which surfaces as `Died` rather than a crash.
fn run_bounded<T, F>(timeout: Duration, task: F) -> Result<T, WorkerFault>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let spawned = thread::Builder::new()
        .name("sandbox-eval".to_string())
        .spawn(move || {
            let _ = tx.send(task());
        });
    if spawned.is_err() {
        return Err(WorkerFault::Died);
    }
    match rx.recv_timeout(timeout) {
        Ok(value) => Ok(value),
        Err(RecvTimeoutError::Timeout) => Err(WorkerFault::TimedOut),
        Err(RecvTimeoutError::Disconnected) => Err(WorkerFault::Died),
    }
}
