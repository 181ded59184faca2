use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use renderlink_dispatch::Sender;
use renderlink_transport::{LocalSocketCommunicator, Role, SocketConfig, TransportError};

use crate::exit::{transport_error, CliError, CliResult, TIMEOUT};
use crate::output::OutputFormat;

pub mod commands;
pub mod info;
pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a render server that logs every command it receives.
    Serve(ServeArgs),
    /// Send a single command and print its reply.
    Send(SendArgs),
    /// Probe a render server: ping, clock and round-trip latency.
    Info(InfoArgs),
    /// List the command catalogue.
    Commands(CommandsArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Info(args) => info::run(args, format),
        Command::Commands(args) => commands::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Largest array a single command may carry, in bytes.
    #[arg(long, value_name = "BYTES")]
    pub max_payload: Option<usize>,
    /// Most commands handled per frame before polling again.
    #[arg(long, value_name = "N")]
    pub frame_cap: Option<usize>,
    /// Keep a connection open after an unknown command instead of dropping it.
    #[arg(long)]
    pub keep_desynced: bool,
    /// Socket file permissions (octal).
    #[arg(long, value_name = "MODE", default_value = "600")]
    pub socket_mode: String,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// Command name as listed by `renderlink commands` (e.g. getSecs).
    pub command: String,
    /// RGB color for clearScreen and dots.
    #[arg(long, value_delimiter = ',', num_args = 1)]
    pub color: Option<Vec<f32>>,
    /// Flat vertex floats for dots, line, quad, polygon and bltTexture.
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub vertices: Option<Vec<f32>>,
    /// Sixteen column-major floats for setXform. Default: identity.
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub matrix: Option<Vec<f32>>,
    /// Point size for dots.
    #[arg(long, default_value = "1")]
    pub point_size: f32,
    /// Draw round dots instead of squares.
    #[arg(long)]
    pub round: bool,
    /// Texture width for createTexture.
    #[arg(long, default_value = "1")]
    pub width: u32,
    /// Texture height for createTexture.
    #[arg(long, default_value = "1")]
    pub height: u32,
    /// RGBA fill for createTexture. Default: opaque white.
    #[arg(long, value_delimiter = ',')]
    pub fill: Option<Vec<f32>>,
    /// Phase for bltTexture.
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    pub phase: f32,
    /// Connect and reply timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// Connect and reply timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug, Default)]
pub struct CommandsArgs {}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::usage("duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::usage(format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::usage("duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

/// Connect a sender, retrying while the server is not listening yet.
pub fn connect_sender(
    path: &Path,
    timeout: Duration,
) -> CliResult<Sender<LocalSocketCommunicator>> {
    let config = SocketConfig {
        read_timeout: Some(timeout),
        write_timeout: Some(timeout),
        ..SocketConfig::default()
    };
    let identifier = path.to_string_lossy();
    let start = Instant::now();
    loop {
        let mut sender = Sender::new(LocalSocketCommunicator::with_config(
            Role::Client,
            config.clone(),
        ))
        .with_reply_wait(timeout);
        match sender.open(&identifier) {
            Ok(()) => return Ok(sender),
            Err(renderlink_dispatch::DispatchError::Transport(err)) => {
                if !is_retryable_connect_error(&err) {
                    return Err(transport_error("connect failed", err));
                }
                if start.elapsed() >= timeout {
                    return Err(CliError::new(
                        TIMEOUT,
                        format!("connect timed out after {timeout:?}"),
                    ));
                }
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(err) => return Err(crate::exit::dispatch_error("connect failed", err)),
        }
    }
}

fn is_retryable_connect_error(err: &TransportError) -> bool {
    match err {
        TransportError::Connect { source, .. } => {
            source.kind() == std::io::ErrorKind::NotFound
                || source.kind() == std::io::ErrorKind::ConnectionRefused
        }
        _ => false,
    }
}
