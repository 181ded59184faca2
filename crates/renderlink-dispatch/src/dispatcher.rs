use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use renderlink_protocol::{
    try_read_command_code, try_write, Command, CommandCode, DecodeLimits, ProtocolError,
    ReplyShape,
};
use renderlink_transport::{Communicator, TransportError};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::backend::{BackendError, RenderBackend};
use crate::error::{DispatchError, Result};

/// Where the loop is within the current command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchPhase {
    /// Waiting for the next command code.
    #[default]
    Idle,
    /// A code was read and its payload is being handled.
    Processing(CommandCode),
}

/// Observable dispatch state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchState {
    pub phase: DispatchPhase,
    /// Set by `blocking`, cleared by `nonblocking`. A blocking server waits
    /// for commands instead of servicing its own events between them.
    pub blocking: bool,
    /// Set by `profileOn`, cleared by `profileOff`.
    pub profiling: bool,
}

/// Dispatch loop configuration.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub limits: DecodeLimits,
    /// Close the connection when framing is lost (unknown code, size
    /// overflow, short transfer). When false the loop returns to idle and
    /// keeps reading.
    pub close_on_desync: bool,
    /// Upper bound on commands handled by one `run_frame`. `None` drains
    /// until a frame-ending command or an empty socket.
    pub max_commands_per_frame: Option<usize>,
    /// Sleep between polls while `serve` has nothing to read.
    pub idle_poll: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            limits: DecodeLimits::default(),
            close_on_desync: false,
            max_commands_per_frame: None,
            idle_poll: Duration::from_millis(1),
        }
    }
}

/// Counters accumulated over the dispatcher's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub connections: u64,
    pub frames: u64,
    /// Commands fully decoded, whether or not the backend accepted them.
    pub commands: u64,
    pub rejected: u64,
    pub unknown: u64,
    pub protocol_errors: u64,
    pub replies: u64,
}

/// What the backend made of a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Executed,
    Rejected(BackendError),
}

/// One command taken off the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Handled {
    pub code: CommandCode,
    pub outcome: Outcome,
    /// Value written back for commands that reply.
    pub reply: Option<f64>,
    /// Profiling stamp written after the reply.
    pub profile_stamp: Option<f64>,
}

/// Result of one `run_frame` pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameSummary {
    pub commands: usize,
    pub rejected: usize,
    pub errors: usize,
    /// The frame-ending command that stopped the pass, if any.
    pub ended_by: Option<CommandCode>,
}

impl FrameSummary {
    pub fn is_empty(&self) -> bool {
        self.commands == 0 && self.errors == 0
    }
}

/// Render-server command loop.
///
/// Single-threaded: one command is read, decoded, executed and answered
/// before the communicator is polled again, so execution order is wire order.
pub struct Dispatcher<C, B> {
    communicator: C,
    backend: B,
    config: DispatchConfig,
    state: DispatchState,
    stats: DispatchStats,
}

impl<C: Communicator, B: RenderBackend> Dispatcher<C, B> {
    pub fn new(communicator: C, backend: B) -> Self {
        Self::with_config(communicator, backend, DispatchConfig::default())
    }

    pub fn with_config(communicator: C, backend: B, config: DispatchConfig) -> Self {
        Self {
            communicator,
            backend,
            config,
            state: DispatchState::default(),
            stats: DispatchStats::default(),
        }
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn communicator(&self) -> &C {
        &self.communicator
    }

    pub fn communicator_mut(&mut self) -> &mut C {
        &mut self.communicator
    }

    pub fn into_parts(self) -> (C, B) {
        (self.communicator, self.backend)
    }

    /// Handle at most one command.
    ///
    /// Returns `Ok(None)` without blocking when nothing is waiting. Whatever
    /// happens, the phase is back to idle when this returns.
    pub fn step(&mut self) -> Result<Option<Handled>> {
        if !self.communicator.is_open() {
            return Err(TransportError::NotConnected.into());
        }
        if !self.communicator.data_waiting() {
            return Ok(None);
        }

        let result = self.handle_next();
        self.state.phase = DispatchPhase::Idle;
        match result {
            Ok(handled) => Ok(Some(handled)),
            Err(err) => {
                self.record_failure(&err);
                Err(err)
            }
        }
    }

    /// Drain waiting commands up to the end of the current frame.
    ///
    /// Stops after `flush`, `fullscreen` or `windowed`, when nothing more is
    /// waiting, or at the configured per-frame cap. Decode errors that leave
    /// the connection open are counted and skipped.
    pub fn run_frame(&mut self) -> Result<FrameSummary> {
        let mut summary = FrameSummary::default();
        loop {
            if self
                .config
                .max_commands_per_frame
                .is_some_and(|max| summary.commands >= max)
            {
                break;
            }
            match self.step() {
                Ok(None) => break,
                Ok(Some(handled)) => {
                    summary.commands += 1;
                    if matches!(handled.outcome, Outcome::Rejected(_)) {
                        summary.rejected += 1;
                    }
                    if handled.code.ends_frame() {
                        summary.ended_by = Some(handled.code);
                        break;
                    }
                }
                Err(DispatchError::Protocol(_)) if self.communicator.is_open() => {
                    summary.errors += 1;
                }
                Err(err) => return Err(err),
            }
        }
        if !summary.is_empty() {
            self.stats.frames += 1;
        }
        Ok(summary)
    }

    /// Accept connections on `identifier` and run frames until `running`
    /// clears. A connection that fails is dropped and a new one accepted.
    ///
    /// Commands already waiting when `running` clears are still handled
    /// before the connection is closed. Only errors that prevent listening
    /// at all are returned.
    pub fn serve(&mut self, identifier: &str, running: &AtomicBool) -> Result<()> {
        while running.load(Ordering::SeqCst) {
            if !self.communicator.is_open() {
                match self.communicator.open(identifier) {
                    Ok(()) => {
                        self.stats.connections += 1;
                        self.state = DispatchState::default();
                        info!(
                            identifier,
                            transport = self.communicator.transport_name(),
                            "client connected"
                        );
                    }
                    Err(TransportError::Accept(err)) => {
                        debug!(error = %err, "no client accepted");
                        thread::sleep(self.config.idle_poll);
                        continue;
                    }
                    Err(err) => return Err(err.into()),
                }
            }

            match self.run_frame() {
                Ok(summary) if summary.is_empty() => thread::sleep(self.config.idle_poll),
                Ok(summary) => debug!(
                    commands = summary.commands,
                    rejected = summary.rejected,
                    errors = summary.errors,
                    ended_by = ?summary.ended_by,
                    "frame done"
                ),
                Err(err) if !self.communicator.is_open() => {
                    info!(error = %err, "client disconnected");
                }
                Err(err) => {
                    warn!(error = %err, "dropping connection");
                    self.communicator.close();
                }
            }
        }

        self.drain_waiting();
        self.communicator.close();
        info!(stats = ?self.stats, "dispatch stopped");
        Ok(())
    }

    /// Run frames until nothing is waiting or the connection goes away.
    fn drain_waiting(&mut self) {
        while self.communicator.is_open() && self.communicator.data_waiting() {
            match self.run_frame() {
                Ok(summary) if summary.is_empty() => break,
                Ok(summary) => debug!(commands = summary.commands, "drained frame"),
                Err(err) => {
                    debug!(error = %err, "stopped draining");
                    break;
                }
            }
        }
    }

    fn handle_next(&mut self) -> Result<Handled> {
        let code = try_read_command_code(self.communicator.reader()?)?;
        self.state.phase = DispatchPhase::Processing(code);

        let command =
            Command::decode_payload(code, self.communicator.reader()?, &self.config.limits)?;
        self.stats.commands += 1;
        debug!(command = %code, "command received");

        match code {
            CommandCode::ProfileOn => self.state.profiling = true,
            CommandCode::ProfileOff => self.state.profiling = false,
            CommandCode::Blocking => self.state.blocking = true,
            CommandCode::Nonblocking => self.state.blocking = false,
            _ => {}
        }

        let outcome = match self.backend.execute(&command) {
            Ok(()) => Outcome::Executed,
            Err(err) => {
                self.stats.rejected += 1;
                warn!(command = %code, error = %err, "backend rejected command");
                Outcome::Rejected(err)
            }
        };

        let reply = match code.reply() {
            ReplyShape::Double => {
                let value = self.backend.seconds();
                self.write_reply(value)?;
                Some(value)
            }
            ReplyShape::None => None,
        };

        let profile_stamp = if self.state.profiling && code != CommandCode::Flush {
            let stamp = self.backend.seconds();
            self.write_reply(stamp)?;
            Some(stamp)
        } else {
            None
        };

        Ok(Handled {
            code,
            outcome,
            reply,
            profile_stamp,
        })
    }

    fn write_reply(&mut self, value: f64) -> Result<()> {
        try_write(self.communicator.writer()?, value)?;
        self.stats.replies += 1;
        Ok(())
    }

    fn record_failure(&mut self, err: &DispatchError) {
        match err {
            DispatchError::Protocol(ProtocolError::UnknownCommand(raw)) => {
                self.stats.unknown += 1;
                warn!(code = *raw, "unknown command code");
            }
            DispatchError::Protocol(err) => {
                self.stats.protocol_errors += 1;
                warn!(error = %err, "command decode failed");
            }
            other => warn!(error = %other, "command handling failed"),
        }

        if err.desynchronizes() && self.config.close_on_desync && self.communicator.is_open() {
            warn!("framing lost, closing connection");
            self.communicator.close();
        }
    }
}

impl<C: Communicator, B> std::fmt::Debug for Dispatcher<C, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("transport", &self.communicator.transport_name())
            .field("open", &self.communicator.is_open())
            .field("state", &self.state)
            .field("stats", &self.stats)
            .finish()
    }
}
