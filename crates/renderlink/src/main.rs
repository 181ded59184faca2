mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "renderlink", version, about = "Render server command protocol CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(
        long,
        value_name = "FORMAT",
        default_value = "text",
        env = "RENDERLINK_LOG_FORMAT",
        global = true
    )]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "info",
        env = "RENDERLINK_LOG_LEVEL",
        global = true
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_with_payload_options() {
        let cli = Cli::try_parse_from([
            "renderlink",
            "send",
            "/tmp/render.sock",
            "clearScreen",
            "--color",
            "0.5,0.5,1",
        ])
        .expect("send args should parse");

        let Command::Send(args) = cli.command else {
            panic!("expected send subcommand");
        };
        assert_eq!(args.command, "clearScreen");
        assert_eq!(args.color, Some(vec![0.5, 0.5, 1.0]));
    }

    #[test]
    fn parses_serve_subcommand() {
        let cli = Cli::try_parse_from([
            "renderlink",
            "serve",
            "/tmp/render.sock",
            "--max-payload",
            "1024",
            "--frame-cap",
            "64",
        ])
        .expect("serve args should parse");
        assert!(matches!(cli.command, Command::Serve(_)));
    }

    #[test]
    fn parses_info_with_timeout() {
        let cli = Cli::try_parse_from(["renderlink", "info", "/tmp/render.sock", "--timeout", "3s"])
            .expect("info args should parse");
        assert!(matches!(cli.command, Command::Info(_)));
    }

    #[test]
    fn send_requires_command_name() {
        let err = Cli::try_parse_from(["renderlink", "send", "/tmp/render.sock"])
            .expect_err("missing command should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }
}
