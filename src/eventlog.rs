//! Nested stage/step progress output.
//!
//! ```text
//! Started deleting deployment
//! Started deleting deployment > Deleting VM 'vm-1'... done. (00:00:04)
//! Done deleting deployment
//!
//! ```

use crate::ui::Ui;
use agentclient::Clock;
use std::time::{Duration, Instant};

/// How a step finished when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Done,
    Skipped(String),
}

/// Writes stages and their steps to a [`Ui`].
pub struct EventLogger<'a> {
    ui: &'a dyn Ui,
    clock: &'a dyn Clock,
}

impl<'a> EventLogger<'a> {
    pub fn new(ui: &'a dyn Ui, clock: &'a dyn Clock) -> Self {
        Self { ui, clock }
    }

    /// Run `f` as a named stage.
    ///
    /// `Done <name>` and a blank line are printed only when `f` succeeds.
    pub fn stage<T, E>(
        &self,
        name: &str,
        f: impl FnOnce(&Stage<'_>) -> Result<T, E>,
    ) -> Result<T, E> {
        self.ui.print_line(&format!("Started {}", name));
        let stage = Stage {
            name,
            ui: self.ui,
            clock: self.clock,
        };
        let value = f(&stage)?;
        self.ui.print_line(&format!("Done {}", name));
        self.ui.print_line("");
        Ok(value)
    }
}

/// A running stage.
pub struct Stage<'a> {
    name: &'a str,
    ui: &'a dyn Ui,
    clock: &'a dyn Clock,
}

impl Stage<'_> {
    /// Run one step; it is reported done on `Ok` and failed on `Err`.
    pub fn perform<T, E>(&self, step: &str, f: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
        let start = self.begin(step);
        let result = f();
        self.finish(start, result.as_ref().ok().map(|_| &Completion::Done));
        result
    }

    /// Run one step that may decide to report itself skipped.
    pub fn perform_step<E>(
        &self,
        step: &str,
        f: impl FnOnce() -> Result<Completion, E>,
    ) -> Result<Completion, E> {
        let start = self.begin(step);
        let result = f();
        self.finish(start, result.as_ref().ok());
        result
    }

    fn begin(&self, step: &str) -> Instant {
        self.ui
            .begin_line(&format!("Started {} > {}...", self.name, step));
        self.clock.now()
    }

    /// `None` means the step failed.
    fn finish(&self, start: Instant, completion: Option<&Completion>) {
        let elapsed = format_duration(self.clock.now().saturating_duration_since(start));
        match completion {
            Some(Completion::Done) => self.ui.end_line(&format!(" done. ({})", elapsed)),
            Some(Completion::Skipped(reason)) => {
                self.ui.end_line(&format!(" skipped ({})", reason));
            }
            None => self.ui.end_line(&format!(" failed ({})", elapsed)),
        }
    }
}

/// `HH:MM:SS`, hours not capped at 24.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}
