//! The seam between the dispatch loop and whatever actually draws.

use std::collections::HashSet;
use std::time::Instant;

use renderlink_protocol::{Command, CommandCode};

/// A backend refused a command. The payload was already consumed, so the
/// connection stays in step.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    #[error("{command} rejected: {reason}")]
    Rejected {
        command: CommandCode,
        reason: String,
    },

    #[error("{0} is not supported by this backend")]
    Unsupported(CommandCode),
}

/// Executes decoded commands on the render side.
///
/// Called synchronously from the dispatch loop, one command at a time, in
/// wire order.
pub trait RenderBackend {
    fn execute(&mut self, command: &Command) -> Result<(), BackendError>;

    /// Server clock in seconds. Used for `getSecs`, flush acknowledgements
    /// and profiling stamps, so it must not go backwards.
    fn seconds(&mut self) -> f64;
}

impl<B: RenderBackend + ?Sized> RenderBackend for &mut B {
    fn execute(&mut self, command: &Command) -> Result<(), BackendError> {
        (**self).execute(command)
    }

    fn seconds(&mut self) -> f64 {
        (**self).seconds()
    }
}

impl<B: RenderBackend + ?Sized> RenderBackend for Box<B> {
    fn execute(&mut self, command: &Command) -> Result<(), BackendError> {
        (**self).execute(command)
    }

    fn seconds(&mut self) -> f64 {
        (**self).seconds()
    }
}

/// Backend that keeps every command it was handed.
///
/// Useful as a stand-in renderer: it accepts everything unless told to reject
/// particular codes, and its clock is monotonic from construction.
#[derive(Debug)]
pub struct RecordingBackend {
    executed: Vec<Command>,
    rejecting: HashSet<CommandCode>,
    started: Instant,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self {
            executed: Vec::new(),
            rejecting: HashSet::new(),
            started: Instant::now(),
        }
    }

    /// Reject every future command with this code.
    pub fn rejecting(mut self, code: CommandCode) -> Self {
        self.rejecting.insert(code);
        self
    }

    /// Commands accepted so far, in execution order.
    pub fn executed(&self) -> &[Command] {
        &self.executed
    }

    pub fn executed_codes(&self) -> Vec<CommandCode> {
        self.executed.iter().map(Command::code).collect()
    }
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderBackend for RecordingBackend {
    fn execute(&mut self, command: &Command) -> Result<(), BackendError> {
        let code = command.code();
        if self.rejecting.contains(&code) {
            return Err(BackendError::Rejected {
                command: code,
                reason: "rejected by configuration".to_string(),
            });
        }
        self.executed.push(command.clone());
        Ok(())
    }

    fn seconds(&mut self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}
