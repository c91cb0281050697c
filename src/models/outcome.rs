use std::fmt;

/// Summary line applied to the display log after a successful run.
pub const SUCCESS_SUMMARY: &str = "Compilation completed successfully.";

/// Sequence number of a launched request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId(pub u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Final status of one task request. Produced exactly once per launched run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalOutcome {
    Success,
    Failure(String),
}

impl TerminalOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TerminalOutcome::Success)
    }

    /// The line the dispatcher appends to the display log for this outcome.
    pub fn summary_line(&self) -> String {
        match self {
            TerminalOutcome::Success => SUCCESS_SUMMARY.to_string(),
            TerminalOutcome::Failure(detail) => format!("Compilation failed: {}", detail),
        }
    }
}
