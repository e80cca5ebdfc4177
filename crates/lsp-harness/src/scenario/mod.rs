//! Scenario driver: ordered send/expect steps against a supervised server.
//!
//! A [`Scenario`] is a list of [`Step`]s executed strictly in order by
//! [`ScenarioRunner`]. `Send` steps go through [`Supervisor::send`]; `Expect`
//! steps pull exactly one message with [`Supervisor::receive`] and evaluate an
//! [`Expectation`] against it. Whatever happens, the runner finishes by
//! shutting the server down and returns a [`ScenarioReport`] covering every
//! step.
//!
//! # Example
//!
//! ```no_run
//! use lsp_harness::message::Message;
//! use lsp_harness::scenario::{Expectation, Scenario, ScenarioRunner};
//! use lsp_harness::transport::ServerCommand;
//!
//! # async fn demo() -> Result<(), lsp_harness::error::TransportError> {
//! let scenario = Scenario::new("init")
//!     .send(Message::request(1, "initialize", serde_json::json!({})))
//!     .expect(Expectation::response_to(1));
//! let report = ScenarioRunner::default()
//!     .run(&ServerCommand::new("./vscript").arg("--lsp"), &scenario)
//!     .await?;
//! assert!(report.passed());
//! # Ok(())
//! # }
//! ```

pub mod builtin;
pub mod file;
mod report;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::error::TransportError;
use crate::message::Message;
use crate::supervisor::{Supervisor, SupervisorOptions};
use crate::transport::ServerLauncher;

pub use report::{ScenarioReport, StepOutcome, StepReport};

/// Default per-expectation receive deadline.
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default shutdown grace period.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(1);

type Predicate = Arc<dyn Fn(&Message) -> bool + Send + Sync>;

/// A named predicate over the next decoded message.
#[derive(Clone)]
pub struct Expectation {
    description: String,
    predicate: Predicate,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for Expectation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Expectation")
            .field("description", &self.description)
            .field("predicate", &"<fn>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Expectation {
    /// An expectation satisfied when `predicate` returns `true`.
    pub fn matching<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            predicate: Arc::new(predicate),
            timeout: None,
        }
    }

    /// Any message at all.
    pub fn any() -> Self {
        Self::matching("any message", |_| true)
    }

    /// A response (no `method`) whose `id` equals `id`.
    pub fn response_to(id: impl Into<Value>) -> Self {
        let id = id.into();
        Self::matching(format!("response to id {id}"), move |m| m.is_response_to(&id))
    }

    /// A message whose `method` equals `method`.
    pub fn notification(method: impl Into<String>) -> Self {
        let method = method.into();
        Self::matching(format!("message with method `{method}`"), move |m| {
            m.method() == Some(method.as_str())
        })
    }

    /// Both `self` and `other` must hold.
    pub fn and(self, other: Expectation) -> Self {
        let (left, right) = (self.predicate, other.predicate);
        Self {
            description: format!("{} and {}", self.description, other.description),
            predicate: Arc::new(move |m| left(m) && right(m)),
            timeout: self.timeout.or(other.timeout),
        }
    }

    /// Override the receive deadline for this step.
    pub fn within(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Human-readable statement of what is expected.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Step-specific deadline, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Evaluate the predicate.
    pub fn check(&self, message: &Message) -> bool {
        (self.predicate)(message)
    }
}

/// One unit of a scenario.
#[derive(Debug, Clone)]
pub enum Step {
    /// Transmit a message.
    Send(Message),
    /// Receive one message and check it.
    Expect(Expectation),
}

impl Step {
    /// Short description used in reports.
    pub fn describe(&self) -> String {
        match self {
            Self::Send(msg) => match (msg.method(), &msg.id) {
                (Some(method), Some(id)) => format!("send {method} (id {id})"),
                (Some(method), None) => format!("send {method}"),
                (None, Some(id)) => format!("send response (id {id})"),
                (None, None) => "send message".to_string(),
            },
            Self::Expect(exp) => format!("expect {}", exp.description()),
        }
    }
}

/// A named, ordered list of steps.
#[derive(Debug, Clone, Default)]
pub struct Scenario {
    name: String,
    steps: Vec<Step>,
}

impl Scenario {
    /// An empty scenario.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Append a `Send` step.
    pub fn send(mut self, message: Message) -> Self {
        self.steps.push(Step::Send(message));
        self
    }

    /// Append an `Expect` step.
    pub fn expect(mut self, expectation: Expectation) -> Self {
        self.steps.push(Step::Expect(expectation));
        self
    }

    /// Append an arbitrary step.
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Scenario name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Steps in execution order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

/// Timing and failure policy for a scenario run.
#[derive(Debug, Clone)]
pub struct ScenarioOptions {
    /// Deadline for `Expect` steps without their own.
    pub receive_timeout: Duration,
    /// Grace period handed to [`Supervisor::shutdown`].
    pub grace_period: Duration,
    /// Skip the remaining steps after the first failure.
    pub stop_on_first_failure: bool,
}

impl Default for ScenarioOptions {
    fn default() -> Self {
        Self {
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            grace_period: DEFAULT_GRACE_PERIOD,
            stop_on_first_failure: true,
        }
    }
}

/// Executes scenarios.
#[derive(Debug, Clone, Default)]
pub struct ScenarioRunner {
    options: ScenarioOptions,
    supervisor_options: SupervisorOptions,
}

impl ScenarioRunner {
    /// A runner with explicit options.
    pub fn new(options: ScenarioOptions, supervisor_options: SupervisorOptions) -> Self {
        Self {
            options,
            supervisor_options,
        }
    }

    /// Launch a server, run `scenario` against it, and shut it down.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::SpawnFailure`] if the server cannot be
    /// started; no steps run in that case. Every other fault is recorded in
    /// the report.
    pub async fn run(
        &self,
        launcher: &dyn ServerLauncher,
        scenario: &Scenario,
    ) -> Result<ScenarioReport, TransportError> {
        let mut supervisor =
            Supervisor::start_with(launcher, self.supervisor_options.clone()).await?;
        Ok(self.run_on(&mut supervisor, scenario).await)
    }

    /// Run `scenario` against an already started supervisor, then shut it down.
    pub async fn run_on(&self, supervisor: &mut Supervisor, scenario: &Scenario) -> ScenarioReport {
        tracing::info!(scenario = %scenario.name(), steps = scenario.steps().len(), "running scenario");

        let mut steps = Vec::with_capacity(scenario.steps().len());
        let mut aborted = false;

        for (index, step) in scenario.steps().iter().enumerate() {
            let description = step.describe();
            if aborted {
                steps.push(StepReport {
                    index,
                    description,
                    outcome: StepOutcome::Skipped,
                });
                continue;
            }

            let outcome = self.execute(supervisor, step).await;
            if outcome.is_failure() {
                tracing::warn!(step = index + 1, %description, "step failed: {outcome}");
                if self.options.stop_on_first_failure {
                    aborted = true;
                }
            } else {
                tracing::debug!(step = index + 1, %description, "step passed");
            }
            steps.push(StepReport {
                index,
                description,
                outcome,
            });
        }

        let shutdown = supervisor.shutdown(self.options.grace_period).await;
        let diagnostic_lines = supervisor.diagnostics().total_lines();

        ScenarioReport {
            name: scenario.name().to_string(),
            steps,
            shutdown,
            aborted,
            diagnostic_lines,
        }
    }

    async fn execute(&self, supervisor: &mut Supervisor, step: &Step) -> StepOutcome {
        match step {
            Step::Send(message) => match supervisor.send(message).await {
                Ok(()) => StepOutcome::Passed { received: None },
                Err(e) => StepOutcome::Transport(e),
            },
            Step::Expect(expectation) => {
                let timeout = expectation
                    .timeout()
                    .unwrap_or(self.options.receive_timeout);
                match supervisor.receive(timeout).await {
                    Ok(Some(message)) if expectation.check(&message) => StepOutcome::Passed {
                        received: Some(message),
                    },
                    Ok(Some(message)) => StepOutcome::Mismatch {
                        expected: expectation.description().to_string(),
                        actual: message,
                    },
                    Ok(None) => StepOutcome::EndOfStream {
                        expected: expectation.description().to_string(),
                    },
                    Err(e) => StepOutcome::Transport(e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn response_to_ignores_requests_with_same_id() {
        let exp = Expectation::response_to(1);
        let mut resp = Message {
            id: Some(json!(1)),
            result: Some(json!({})),
            ..Default::default()
        };
        assert!(exp.check(&resp));
        resp.method = Some("initialize".to_string());
        assert!(!exp.check(&resp));
        assert_eq!(exp.description(), "response to id 1");
    }

    #[test]
    fn and_combines_predicates_and_descriptions() {
        let exp = Expectation::notification("textDocument/publishDiagnostics")
            .and(Expectation::matching("non-empty params", |m| m.params.is_some()))
            .within(Duration::from_millis(250));
        assert_eq!(exp.timeout(), Some(Duration::from_millis(250)));
        assert!(exp.description().contains("publishDiagnostics"));
        assert!(exp.description().contains("non-empty params"));
        let bare = Message {
            method: Some("textDocument/publishDiagnostics".to_string()),
            ..Default::default()
        };
        assert!(!exp.check(&bare));
        assert!(exp.check(&Message::notification(
            "textDocument/publishDiagnostics",
            json!({"diagnostics": []})
        )));
    }

    #[test]
    fn step_descriptions() {
        let send = Step::Send(Message::request(1, "initialize", json!({})));
        assert_eq!(send.describe(), "send initialize (id 1)");
        let notify = Step::Send(Message::notification("initialized", json!({})));
        assert_eq!(notify.describe(), "send initialized");
        let expect = Step::Expect(Expectation::any());
        assert_eq!(expect.describe(), "expect any message");
    }

    #[test]
    fn scenario_builder_preserves_order() {
        let scenario = Scenario::new("order")
            .send(Message::request(1, "a", json!({})))
            .expect(Expectation::response_to(1))
            .send(Message::notification("b", json!({})));
        let kinds: Vec<bool> = scenario
            .steps()
            .iter()
            .map(|s| matches!(s, Step::Send(_)))
            .collect();
        assert_eq!(kinds, vec![true, false, true]);
        assert_eq!(scenario.name(), "order");
    }
}
