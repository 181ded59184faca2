use std::thread;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use renderlink_protocol::{read, Command, CommandCode, ProtocolError, ReplyShape, IDENTITY_4X4};
use renderlink_transport::{Communicator, TransportError};
use tracing::{debug, warn};

use crate::error::{DispatchError, Result};

/// How long `send` waits for reply bytes to show up before reading anyway.
pub const DEFAULT_REPLY_WAIT: Duration = Duration::from_secs(10);

const REPLY_POLL: Duration = Duration::from_micros(200);

/// Fields read back for one command.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Reply {
    /// The command's own reply (`getSecs`, `flush`).
    pub value: Option<f64>,
    /// Server time stamped after the command while profiling is on.
    pub profile_stamp: Option<f64>,
}

/// Host-side command sender.
///
/// Each command is staged whole and written in a single transfer, then its
/// reply fields are read in order. The sender follows `profileOn` and
/// `profileOff` so it knows when the server appends a profiling stamp.
pub struct Sender<C> {
    communicator: C,
    staging: BytesMut,
    profiling: bool,
    reply_wait: Duration,
}

impl<C: Communicator> Sender<C> {
    pub fn new(communicator: C) -> Self {
        Self {
            communicator,
            staging: BytesMut::with_capacity(256),
            profiling: false,
            reply_wait: DEFAULT_REPLY_WAIT,
        }
    }

    /// Override how long to wait for reply bytes.
    pub fn with_reply_wait(mut self, wait: Duration) -> Self {
        self.reply_wait = wait;
        self
    }

    /// Open the underlying communicator. Profiling state starts off.
    pub fn open(&mut self, identifier: &str) -> Result<()> {
        self.communicator.open(identifier)?;
        self.profiling = false;
        Ok(())
    }

    pub fn close(&mut self) {
        self.communicator.close();
    }

    pub fn is_open(&self) -> bool {
        self.communicator.is_open()
    }

    pub fn is_profiling(&self) -> bool {
        self.profiling
    }

    pub fn communicator(&self) -> &C {
        &self.communicator
    }

    pub fn communicator_mut(&mut self) -> &mut C {
        &mut self.communicator
    }

    pub fn into_inner(self) -> C {
        self.communicator
    }

    /// Send one command and read back whatever it owes.
    pub fn send(&mut self, command: &Command) -> Result<Reply> {
        if !self.communicator.is_open() {
            return Err(TransportError::NotConnected.into());
        }

        let code = command.code();
        self.staging.clear();
        command.encode(&mut self.staging)?;

        let expected = self.staging.len();
        let written = self.communicator.writer()?.write_bytes(&self.staging);
        if written != expected {
            warn!(command = %code, expected, written, "short command write");
            return Err(ProtocolError::ShortWrite {
                what: "command",
                expected,
                actual: written,
            }
            .into());
        }
        debug!(command = %code, bytes = written, "command sent");

        match code {
            CommandCode::ProfileOn => self.profiling = true,
            CommandCode::ProfileOff => self.profiling = false,
            _ => {}
        }

        let value = match code.reply() {
            ReplyShape::Double => Some(self.read_reply(code, "reply value")?),
            ReplyShape::None => None,
        };
        let profile_stamp = if self.profiling && code != CommandCode::Flush {
            Some(self.read_reply(code, "profile stamp")?)
        } else {
            None
        };

        Ok(Reply {
            value,
            profile_stamp,
        })
    }

    pub fn ping(&mut self) -> Result<Reply> {
        self.send(&Command::Ping)
    }

    /// Server clock in seconds.
    pub fn get_secs(&mut self) -> Result<f64> {
        self.expect_value(&Command::GetSecs)
    }

    /// Present the frame. Returns the server's acknowledgement time.
    pub fn flush(&mut self) -> Result<f64> {
        self.expect_value(&Command::Flush)
    }

    pub fn set_xform(&mut self, matrix: [f32; 16]) -> Result<()> {
        self.send(&Command::SetXform { matrix }).map(|_| ())
    }

    pub fn reset_xform(&mut self) -> Result<()> {
        self.set_xform(IDENTITY_4X4)
    }

    pub fn clear_screen(&mut self, color: [f32; 3]) -> Result<()> {
        self.send(&Command::ClearScreen { color }).map(|_| ())
    }

    pub fn create_texture(&mut self, width: u32, height: u32, pixels: Vec<f32>) -> Result<()> {
        self.send(&Command::CreateTexture {
            width,
            height,
            pixels,
        })
        .map(|_| ())
    }

    fn expect_value(&mut self, command: &Command) -> Result<f64> {
        self.send(command)?
            .value
            .ok_or_else(|| DispatchError::ReplyFailed {
                command: command.code(),
                what: "missing reply value",
            })
    }

    fn read_reply(&mut self, command: CommandCode, what: &'static str) -> Result<f64> {
        self.wait_for_reply();
        let value: f64 = read(self.communicator.reader()?);
        if value.is_nan() {
            warn!(%command, what, "reply read failed");
            return Err(DispatchError::ReplyFailed { command, what });
        }
        Ok(value)
    }

    /// Sockets block in the read itself; this covers communicators whose
    /// reads return early when nothing is buffered yet.
    fn wait_for_reply(&self) {
        let deadline = Instant::now() + self.reply_wait;
        while self.communicator.is_open()
            && !self.communicator.data_waiting()
            && Instant::now() < deadline
        {
            thread::sleep(REPLY_POLL);
        }
    }
}

impl<C: Communicator> std::fmt::Debug for Sender<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sender")
            .field("transport", &self.communicator.transport_name())
            .field("open", &self.communicator.is_open())
            .field("profiling", &self.profiling)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use renderlink_protocol::{try_read_array, DecodeLimits};
    use renderlink_transport::{ByteWriter, MemoryCommunicator};

    use super::*;

    fn sender() -> (Sender<MemoryCommunicator>, MemoryCommunicator) {
        let (host, render) = MemoryCommunicator::open_pair("test");
        (
            Sender::new(host).with_reply_wait(Duration::from_millis(20)),
            render,
        )
    }

    fn answer(render: &mut MemoryCommunicator, values: &[f64]) {
        let mut bytes = Vec::new();
        for value in values {
            bytes.extend_from_slice(&value.to_ne_bytes());
        }
        render.writer().unwrap().write_bytes(&bytes);
    }

    #[test]
    fn command_is_written_whole() {
        let (mut sender, mut render) = sender();
        sender.clear_screen([0.25, 0.5, 1.0]).unwrap();
        assert_eq!(render.pending(), 2 + 12);

        let decoded = Command::decode(render.reader().unwrap(), &DecodeLimits::default()).unwrap();
        assert_eq!(
            decoded,
            Command::ClearScreen {
                color: [0.25, 0.5, 1.0]
            }
        );
    }

    #[test]
    fn get_secs_reads_reply() {
        let (mut sender, mut render) = sender();
        answer(&mut render, &[12.5]);
        assert_eq!(sender.get_secs().unwrap(), 12.5);
        assert_eq!(render.pending(), 2);
    }

    #[test]
    fn missing_reply_fails_the_call_only() {
        let (mut sender, mut render) = sender();
        let err = sender.get_secs().unwrap_err();
        assert!(matches!(
            err,
            DispatchError::ReplyFailed {
                command: CommandCode::GetSecs,
                ..
            }
        ));
        assert!(sender.is_open());

        answer(&mut render, &[3.0]);
        assert_eq!(sender.flush().unwrap(), 3.0);
    }

    #[test]
    fn profiling_adds_stamps() {
        let (mut sender, mut render) = sender();
        answer(&mut render, &[1.0]);
        let on = sender.send(&Command::ProfileOn).unwrap();
        assert_eq!(on.profile_stamp, Some(1.0));
        assert!(sender.is_profiling());

        answer(&mut render, &[2.0, 2.5]);
        let secs = sender.send(&Command::GetSecs).unwrap();
        assert_eq!(secs.value, Some(2.0));
        assert_eq!(secs.profile_stamp, Some(2.5));

        answer(&mut render, &[3.0]);
        let flush = sender.send(&Command::Flush).unwrap();
        assert_eq!(flush.value, Some(3.0));
        assert_eq!(flush.profile_stamp, None);

        let off = sender.send(&Command::ProfileOff).unwrap();
        assert_eq!(off, Reply::default());
        assert!(!sender.is_profiling());
    }

    #[test]
    fn malformed_command_writes_nothing() {
        let (mut sender, render) = sender();
        let err = sender.create_texture(2, 2, vec![0.0; 3]).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Protocol(ProtocolError::MalformedPayload { .. })
        ));
        assert_eq!(render.pending(), 0);
    }

    #[test]
    fn closed_peer_is_short_write() {
        let (mut sender, mut render) = sender();
        render.close();
        let err = sender.ping().unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Protocol(ProtocolError::ShortWrite { actual: 0, .. })
        ));
    }

    #[test]
    fn closed_sender_is_not_connected() {
        let (mut sender, _render) = sender();
        sender.close();
        assert!(matches!(
            sender.ping(),
            Err(DispatchError::Transport(TransportError::NotConnected))
        ));
    }

    #[test]
    fn reset_xform_sends_identity() {
        let (mut sender, mut render) = sender();
        sender.reset_xform().unwrap();
        let code: CommandCode = read(render.reader().unwrap());
        assert_eq!(code, CommandCode::SetXform);
        let matrix: Vec<f32> = try_read_array(render.reader().unwrap(), 16).unwrap();
        assert_eq!(matrix, IDENTITY_4X4.to_vec());
    }
}
