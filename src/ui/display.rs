use crate::models::{RunId, TerminalOutcome};
use crate::task::LaunchError;
use crate::task::channel::Notification;
use std::thread::{self, ThreadId};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DisplayError {
    /// A mutation was attempted from a thread other than the owner
    #[error("display log owned by thread {owner:?} was mutated from thread {actual:?}")]
    WrongThread { owner: ThreadId, actual: ThreadId },

    #[error("display is unavailable: {0}")]
    Unavailable(String),
}

/// The visible output area of a front end.
///
/// Implementations are only ever driven from the display-owning thread; the
/// dispatchers guarantee that.
pub trait DisplaySurface {
    fn append_line(&mut self, line: &str) -> Result<(), DisplayError>;

    fn clear(&mut self) -> Result<(), DisplayError>;

    /// Prepare the display for a newly launched run.
    fn begin_run(&mut self, run_id: RunId) -> Result<(), DisplayError> {
        let _ = run_id;
        self.clear()
    }

    /// Apply the run's terminal outcome.
    fn finish_run(&mut self, outcome: &TerminalOutcome) -> Result<(), DisplayError> {
        self.append_line(&outcome.summary_line())
    }
}

/// Apply one notification to a display surface.
///
/// Returns the outcome when the notification was the end-of-stream marker.
pub fn apply_notification<S>(
    surface: &mut S,
    notification: Notification,
) -> Result<Option<TerminalOutcome>, DisplayError>
where
    S: DisplaySurface + ?Sized,
{
    match notification {
        Notification::Progress(line) => {
            surface.append_line(&line)?;
            Ok(None)
        }
        Notification::Finished(outcome) => {
            surface.finish_run(&outcome)?;
            Ok(Some(outcome))
        }
    }
}

/// Show a rejected launch on a display surface.
///
/// A missing project path clears the output first; a busy rejection keeps the
/// running job's output.
pub fn show_launch_error<S>(surface: &mut S, error: &LaunchError) -> Result<(), DisplayError>
where
    S: DisplaySurface + ?Sized,
{
    if matches!(error, LaunchError::MissingProjectPath) {
        surface.clear()?;
    }
    surface.append_line(&format!("Error: {}", error))
}

/// Append-only text log bound to the thread that created it
///
/// Every mutation checks the calling thread against the owner and fails with
/// [`DisplayError::WrongThread`] otherwise, so a stray mutation from a worker
/// shows up as an error instead of silently corrupting the log.
#[derive(Debug)]
pub struct DisplayLog {
    owner: ThreadId,
    lines: Vec<String>,
    current_run: Option<RunId>,
    outcome: Option<TerminalOutcome>,
    mutation_count: u64,
    generation: u64,
}

impl DisplayLog {
    /// Create a log owned by the calling thread.
    pub fn new() -> Self {
        Self {
            owner: thread::current().id(),
            lines: Vec::new(),
            current_run: None,
            outcome: None,
            mutation_count: 0,
            generation: 0,
        }
    }

    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    pub fn last_line(&self) -> Option<&str> {
        self.lines.last().map(String::as_str)
    }

    /// Run whose output the log currently shows.
    pub fn current_run(&self) -> Option<RunId> {
        self.current_run
    }

    /// Outcome of the current run, once applied.
    pub fn outcome(&self) -> Option<&TerminalOutcome> {
        self.outcome.as_ref()
    }

    /// Number of successful mutations; all of them happened on the owner thread.
    pub fn mutation_count(&self) -> u64 {
        self.mutation_count
    }

    /// Incremented on every clear.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn check_thread(&mut self) -> Result<(), DisplayError> {
        let actual = thread::current().id();
        if actual != self.owner {
            tracing::error!(
                "Display log mutation from {:?}, owner is {:?}",
                actual,
                self.owner
            );
            return Err(DisplayError::WrongThread {
                owner: self.owner,
                actual,
            });
        }
        self.mutation_count += 1;
        Ok(())
    }
}

impl Default for DisplayLog {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplaySurface for DisplayLog {
    fn append_line(&mut self, line: &str) -> Result<(), DisplayError> {
        self.check_thread()?;
        self.lines.push(line.to_string());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        self.check_thread()?;
        self.lines.clear();
        self.generation += 1;
        Ok(())
    }

    fn begin_run(&mut self, run_id: RunId) -> Result<(), DisplayError> {
        self.clear()?;
        self.current_run = Some(run_id);
        self.outcome = None;
        Ok(())
    }

    fn finish_run(&mut self, outcome: &TerminalOutcome) -> Result<(), DisplayError> {
        self.append_line(&outcome.summary_line())?;
        self.outcome = Some(outcome.clone());
        Ok(())
    }
}
