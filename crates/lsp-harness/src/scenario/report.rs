//! Scenario run results.

use std::fmt;

use crate::error::TransportError;
use crate::message::Message;
use crate::supervisor::ShutdownOutcome;

/// Result of a single step.
#[derive(Debug)]
pub enum StepOutcome {
    /// The step succeeded. `received` holds the matched message for `Expect`.
    Passed { received: Option<Message> },
    /// A message arrived but did not satisfy the expectation.
    Mismatch { expected: String, actual: Message },
    /// The server closed its output before the expected message arrived.
    EndOfStream { expected: String },
    /// A transport or framing fault.
    Transport(TransportError),
    /// Not executed because an earlier step failed.
    Skipped,
}

impl StepOutcome {
    /// `true` for every outcome except `Passed` and `Skipped`.
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::Passed { .. } | Self::Skipped)
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed { .. } => write!(f, "ok"),
            Self::Mismatch { expected, actual } => {
                write!(f, "MISMATCH: expected {expected}, got {actual}")
            }
            Self::EndOfStream { expected } => {
                write!(f, "END OF STREAM: expected {expected}")
            }
            Self::Transport(e) => write!(f, "TRANSPORT ERROR: {e}"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// One line of a [`ScenarioReport`].
#[derive(Debug)]
pub struct StepReport {
    /// Zero-based position in the scenario.
    pub index: usize,
    /// What the step does.
    pub description: String,
    /// How it went.
    pub outcome: StepOutcome,
}

/// Outcome of a whole scenario run, including shutdown.
#[derive(Debug)]
pub struct ScenarioReport {
    /// Scenario name.
    pub name: String,
    /// Every step, in order, including skipped ones.
    pub steps: Vec<StepReport>,
    /// How the server was stopped.
    pub shutdown: ShutdownOutcome,
    /// Whether the run stopped early on a failure.
    pub aborted: bool,
    /// Lines drained from the server's diagnostic stream.
    pub diagnostic_lines: u64,
}

impl ScenarioReport {
    /// `true` when every step passed. A forced shutdown is a warning, not a
    /// failure.
    pub fn passed(&self) -> bool {
        self.steps
            .iter()
            .all(|s| matches!(s.outcome, StepOutcome::Passed { .. }))
    }

    /// Steps that failed.
    pub fn failures(&self) -> impl Iterator<Item = &StepReport> {
        self.steps.iter().filter(|s| s.outcome.is_failure())
    }

    /// Warnings to surface alongside the verdict.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.shutdown.is_forced() {
            warnings.push(
                "language server ignored graceful termination and was forcibly killed"
                    .to_string(),
            );
        }
        warnings
    }
}

impl fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let passed = self
            .steps
            .iter()
            .filter(|s| matches!(s.outcome, StepOutcome::Passed { .. }))
            .count();
        writeln!(
            f,
            "scenario `{}`: {} ({passed}/{} steps passed)",
            self.name,
            if self.passed() { "PASSED" } else { "FAILED" },
            self.steps.len()
        )?;
        for step in &self.steps {
            writeln!(
                f,
                "  [{}] {} ... {}",
                step.index + 1,
                step.description,
                step.outcome
            )?;
        }
        writeln!(f, "  shutdown: {}", self.shutdown)?;
        writeln!(f, "  diagnostic lines drained: {}", self.diagnostic_lines)?;
        for warning in self.warnings() {
            writeln!(f, "  warning: {warning}")?;
        }
        Ok(())
    }
}
