use std::time::Instant;

use renderlink_transport::Communicator;
use serde::Serialize;

use crate::cmd::{connect_sender, parse_duration, InfoArgs};
use crate::exit::{dispatch_error, CliResult, SUCCESS};
use crate::output::{print_record, seconds_field, OutputFormat};

#[derive(Serialize)]
struct InfoOutput {
    path: String,
    transport: &'static str,
    server_secs: f64,
    clock_step_secs: f64,
    ping_latency_ms: f64,
    round_trip_ms: f64,
    connected: bool,
}

pub fn run(args: InfoArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let mut sender = connect_sender(&args.path, timeout)?;

    let start = Instant::now();
    sender
        .ping()
        .map_err(|err| dispatch_error("ping failed", err))?;
    let ping_latency_ms = round_ms(start.elapsed().as_secs_f64());

    let t1 = sender
        .get_secs()
        .map_err(|err| dispatch_error("getSecs failed", err))?;
    let start = Instant::now();
    let t2 = sender
        .get_secs()
        .map_err(|err| dispatch_error("getSecs failed", err))?;
    let round_trip_ms = round_ms(start.elapsed().as_secs_f64());

    let transport = sender.communicator().transport_name();
    sender.close();

    let out = InfoOutput {
        path: args.path.display().to_string(),
        transport,
        server_secs: t2,
        clock_step_secs: t2 - t1,
        ping_latency_ms,
        round_trip_ms,
        connected: true,
    };
    print_record(
        &out,
        &[
            ("path", out.path.clone()),
            ("transport", out.transport.to_string()),
            ("server_secs", seconds_field(Some(out.server_secs))),
            ("clock_step_secs", seconds_field(Some(out.clock_step_secs))),
            ("ping_latency_ms", format!("{:.2}", out.ping_latency_ms)),
            ("round_trip_ms", format!("{:.2}", out.round_trip_ms)),
        ],
        format,
    );
    Ok(SUCCESS)
}

fn round_ms(secs: f64) -> f64 {
    (secs * 1000.0 * 100.0).round() / 100.0
}
