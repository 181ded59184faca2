use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use renderlink_dispatch::{BackendError, DispatchConfig, DispatchStats, Dispatcher, RenderBackend};
use renderlink_protocol::{Command, CommandCode, DecodeLimits};
use renderlink_transport::{LocalSocketCommunicator, Role, SocketConfig};
use serde::Serialize;
use tracing::{debug, info};

use crate::cmd::ServeArgs;
use crate::exit::{dispatch_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_record, OutputFormat};

/// How often a server with no client rechecks the shutdown flag.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

#[derive(Serialize)]
struct ServeOutput {
    path: String,
    #[serde(flatten)]
    stats: DispatchStats,
    textures_created: u64,
    frames_presented: u64,
}

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let socket_mode = u32::from_str_radix(args.socket_mode.trim(), 8)
        .map_err(|_| CliError::usage(format!("invalid socket mode: {}", args.socket_mode)))?;

    let mut communicator = LocalSocketCommunicator::with_config(
        Role::Server,
        SocketConfig {
            socket_mode,
            accept_timeout: Some(ACCEPT_POLL),
            ..SocketConfig::default()
        },
    );
    communicator
        .bind(&args.path)
        .map_err(|err| transport_error("bind failed", err))?;
    info!(path = %args.path.display(), "render server listening");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let config = DispatchConfig {
        limits: DecodeLimits {
            max_payload_bytes: args
                .max_payload
                .unwrap_or(DecodeLimits::default().max_payload_bytes),
        },
        close_on_desync: !args.keep_desynced,
        max_commands_per_frame: args.frame_cap,
        ..DispatchConfig::default()
    };
    let mut dispatcher = Dispatcher::with_config(communicator, LoggingBackend::new(), config);
    dispatcher
        .serve(&args.path.to_string_lossy(), &running)
        .map_err(|err| dispatch_error("serve failed", err))?;

    let backend = dispatcher.backend();
    let out = ServeOutput {
        path: args.path.display().to_string(),
        stats: dispatcher.stats(),
        textures_created: backend.textures_created,
        frames_presented: backend.frames_presented,
    };
    print_record(
        &out,
        &[
            ("path", out.path.clone()),
            ("connections", out.stats.connections.to_string()),
            ("commands", out.stats.commands.to_string()),
            ("rejected", out.stats.rejected.to_string()),
            ("unknown", out.stats.unknown.to_string()),
            ("textures_created", out.textures_created.to_string()),
            ("frames_presented", out.frames_presented.to_string()),
        ],
        format,
    );
    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

/// Stand-in renderer: logs what it would draw and keeps a monotonic clock.
struct LoggingBackend {
    started: Instant,
    texture: Option<(u32, u32)>,
    textures_created: u64,
    frames_presented: u64,
}

impl LoggingBackend {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            texture: None,
            textures_created: 0,
            frames_presented: 0,
        }
    }
}

impl RenderBackend for LoggingBackend {
    fn execute(&mut self, command: &Command) -> Result<(), BackendError> {
        let code = command.code();
        match command {
            Command::ClearScreen { color } => debug!(command = %code, ?color, "clear color set"),
            Command::Dots {
                point_size,
                round,
                vertices,
                ..
            } => debug!(
                command = %code,
                point_size,
                round,
                vertices = vertices.vertex_count(),
                "draw"
            ),
            Command::Line { vertices }
            | Command::Quad { vertices }
            | Command::Polygon { vertices } => {
                debug!(command = %code, vertices = vertices.vertex_count(), "draw");
            }
            Command::SetXform { matrix } => debug!(command = %code, ?matrix, "transform set"),
            Command::CreateTexture { width, height, .. } => {
                self.texture = Some((*width, *height));
                self.textures_created += 1;
                info!(width, height, "texture created");
            }
            Command::BltTexture { vertices, phase } => {
                let Some((width, height)) = self.texture else {
                    return Err(BackendError::Rejected {
                        command: CommandCode::BltTexture,
                        reason: "no texture has been created".to_string(),
                    });
                };
                debug!(
                    width,
                    height,
                    phase,
                    vertices = vertices.vertex_count(),
                    "texture drawn"
                );
            }
            Command::Flush => {
                self.frames_presented += 1;
                debug!(frame = self.frames_presented, "frame presented");
            }
            other => info!(command = %other.code(), "command received"),
        }
        Ok(())
    }

    fn seconds(&mut self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use renderlink_protocol::{Vertices, TEXTURED_VERTEX_FLOATS};

    use super::*;

    fn blt() -> Command {
        Command::BltTexture {
            vertices: Vertices::new(TEXTURED_VERTEX_FLOATS, vec![0.0; 10]).unwrap(),
            phase: 0.0,
        }
    }

    #[test]
    fn blt_needs_a_texture() {
        let mut backend = LoggingBackend::new();
        assert!(backend.execute(&blt()).is_err());

        backend
            .execute(&Command::CreateTexture {
                width: 1,
                height: 1,
                pixels: vec![1.0; 4],
            })
            .unwrap();
        assert!(backend.execute(&blt()).is_ok());
        assert_eq!(backend.textures_created, 1);
    }

    #[test]
    fn counts_presented_frames() {
        let mut backend = LoggingBackend::new();
        backend.execute(&Command::Flush).unwrap();
        backend.execute(&Command::Ping).unwrap();
        backend.execute(&Command::Flush).unwrap();
        assert_eq!(backend.frames_presented, 2);
    }

    #[test]
    fn clock_never_goes_backwards() {
        let mut backend = LoggingBackend::new();
        let t1 = backend.seconds();
        let t2 = backend.seconds();
        assert!(t2 >= t1);
    }
}
