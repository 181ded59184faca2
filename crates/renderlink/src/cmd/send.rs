use renderlink_protocol::{
    Command, CommandCode, Vertices, COLORED_VERTEX_FLOATS, DOT_VERTEX_FLOATS, IDENTITY_4X4,
    TEXTURED_VERTEX_FLOATS,
};
use serde::Serialize;

use crate::cmd::{connect_sender, parse_duration, SendArgs};
use crate::exit::{dispatch_error, CliError, CliResult, SUCCESS};
use crate::output::{print_record, seconds_field, OutputFormat};

#[derive(Serialize)]
struct SendOutput {
    command: &'static str,
    code: u16,
    bytes: usize,
    reply: Option<f64>,
    profile_stamp: Option<f64>,
}

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let command = build_command(&args)?;

    let mut sender = connect_sender(&args.path, timeout)?;
    let reply = sender
        .send(&command)
        .map_err(|err| dispatch_error("send failed", err))?;
    sender.close();

    let code = command.code();
    let out = SendOutput {
        command: code.name(),
        code: code.to_wire(),
        bytes: command.encoded_len(),
        reply: reply.value,
        profile_stamp: reply.profile_stamp,
    };
    print_record(
        &out,
        &[
            ("command", out.command.to_string()),
            ("code", out.code.to_string()),
            ("bytes", out.bytes.to_string()),
            ("reply", seconds_field(out.reply)),
            ("profile_stamp", seconds_field(out.profile_stamp)),
        ],
        format,
    );
    Ok(SUCCESS)
}

fn build_command(args: &SendArgs) -> CliResult<Command> {
    let code = CommandCode::from_name(&args.command).ok_or_else(|| {
        CliError::usage(format!(
            "unknown command '{}' (see `renderlink commands`)",
            args.command
        ))
    })?;
    if let Some(command) = Command::bare(code) {
        return Ok(command);
    }

    let command = match code {
        CommandCode::ClearScreen => Command::ClearScreen {
            color: fixed(args.color.as_deref(), [0.0; 3], "--color")?,
        },
        CommandCode::Dots => Command::Dots {
            point_size: args.point_size,
            color: fixed(args.color.as_deref(), [1.0; 3], "--color")?,
            round: args.round,
            vertices: vertices(args, DOT_VERTEX_FLOATS)?,
        },
        CommandCode::SetXform => Command::SetXform {
            matrix: fixed(args.matrix.as_deref(), IDENTITY_4X4, "--matrix")?,
        },
        CommandCode::Line => Command::Line {
            vertices: vertices(args, COLORED_VERTEX_FLOATS)?,
        },
        CommandCode::Quad => Command::Quad {
            vertices: vertices(args, COLORED_VERTEX_FLOATS)?,
        },
        CommandCode::Polygon => Command::Polygon {
            vertices: vertices(args, COLORED_VERTEX_FLOATS)?,
        },
        CommandCode::CreateTexture => {
            let fill: [f32; 4] = fixed(args.fill.as_deref(), [1.0; 4], "--fill")?;
            let texels = (args.width as usize)
                .checked_mul(args.height as usize)
                .ok_or_else(|| CliError::usage("texture dimensions overflow"))?;
            Command::CreateTexture {
                width: args.width,
                height: args.height,
                pixels: fill.repeat(texels),
            }
        }
        CommandCode::BltTexture => Command::BltTexture {
            vertices: vertices(args, TEXTURED_VERTEX_FLOATS)?,
            phase: args.phase,
        },
        other => {
            return Err(CliError::usage(format!(
                "command '{other}' cannot be sent from the CLI"
            )))
        }
    };
    Ok(command)
}

fn fixed<const N: usize>(
    values: Option<&[f32]>,
    default: [f32; N],
    flag: &str,
) -> CliResult<[f32; N]> {
    match values {
        None => Ok(default),
        Some(values) => values
            .try_into()
            .map_err(|_| CliError::usage(format!("{flag} takes {N} values, got {}", values.len()))),
    }
}

fn vertices(args: &SendArgs, floats_per_vertex: usize) -> CliResult<Vertices> {
    let data = args.vertices.clone().unwrap_or_default();
    let len = data.len();
    Vertices::new(floats_per_vertex, data).ok_or_else(|| {
        CliError::usage(format!(
            "--vertices needs a multiple of {floats_per_vertex} floats for {}, got {len}",
            args.command
        ))
    })
}
