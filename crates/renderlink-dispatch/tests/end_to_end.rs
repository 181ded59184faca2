#![cfg(unix)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use renderlink_dispatch::{DispatchConfig, Dispatcher, RecordingBackend, Sender};
use renderlink_protocol::{
    Command, CommandCode, Vertices, COLORED_VERTEX_FLOATS, IDENTITY_4X4, TEXTURED_VERTEX_FLOATS,
};
use renderlink_transport::{
    ByteWriter, Communicator, LocalSocketCommunicator, MemoryCommunicator, Role, SocketConfig,
};

type SocketServer = Dispatcher<LocalSocketCommunicator, RecordingBackend>;

fn make_sock_path(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/rlink-e2e-{}-{}-{}",
        tag,
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir.join("render.sock")
}

fn cleanup(path: &std::path::Path) {
    if let Some(parent) = path.parent() {
        let _ = std::fs::remove_dir_all(parent);
    }
}

/// Bind before spawning so clients never race the listener.
fn spawn_server(
    path: &std::path::Path,
    backend: RecordingBackend,
    running: Arc<AtomicBool>,
) -> JoinHandle<SocketServer> {
    let mut communicator = LocalSocketCommunicator::with_config(
        Role::Server,
        SocketConfig {
            accept_timeout: Some(Duration::from_millis(50)),
            ..SocketConfig::default()
        },
    );
    communicator.bind(path).expect("server should bind");

    let config = DispatchConfig {
        close_on_desync: true,
        ..DispatchConfig::default()
    };
    let identifier = path.to_string_lossy().into_owned();
    thread::spawn(move || {
        let mut dispatcher = Dispatcher::with_config(communicator, backend, config);
        dispatcher
            .serve(&identifier, &running)
            .expect("serve should run until stopped");
        dispatcher
    })
}

fn connect(path: &std::path::Path) -> Sender<LocalSocketCommunicator> {
    let mut sender = Sender::new(LocalSocketCommunicator::client());
    sender
        .open(&path.to_string_lossy())
        .expect("client should connect");
    sender
}

fn stop(running: &AtomicBool, server: JoinHandle<SocketServer>) -> SocketServer {
    running.store(false, Ordering::SeqCst);
    server.join().expect("server thread should finish")
}

#[test]
fn commands_execute_in_order_over_socket() {
    let path = make_sock_path("order");
    let running = Arc::new(AtomicBool::new(true));
    let server = spawn_server(&path, RecordingBackend::new(), Arc::clone(&running));

    let quad = Command::Quad {
        vertices: Vertices::new(COLORED_VERTEX_FLOATS, (0..24).map(|i| i as f32).collect())
            .expect("quad vertices should be whole"),
    };
    let blt = Command::BltTexture {
        vertices: Vertices::new(TEXTURED_VERTEX_FLOATS, vec![0.5; 20])
            .expect("blt vertices should be whole"),
        phase: 0.25,
    };

    let mut sender = connect(&path);
    sender.clear_screen([0.1, 0.2, 0.3]).expect("clearScreen should send");
    sender.set_xform(IDENTITY_4X4).expect("setXform should send");
    sender.send(&quad).expect("quad should send");
    sender
        .create_texture(2, 2, vec![1.0; 16])
        .expect("createTexture should send");
    sender.send(&blt).expect("bltTexture should send");
    sender.flush().expect("flush should be acknowledged");
    sender.close();

    let dispatcher = stop(&running, server);
    let executed = dispatcher.backend().executed();
    assert_eq!(
        dispatcher.backend().executed_codes(),
        vec![
            CommandCode::ClearScreen,
            CommandCode::SetXform,
            CommandCode::Quad,
            CommandCode::CreateTexture,
            CommandCode::BltTexture,
            CommandCode::Flush,
        ]
    );
    assert_eq!(
        executed[1],
        Command::SetXform {
            matrix: IDENTITY_4X4
        }
    );
    assert_eq!(executed[2], quad);
    assert_eq!(executed[4], blt);
    cleanup(&path);
}

#[test]
fn get_secs_is_monotonic() {
    let path = make_sock_path("secs");
    let running = Arc::new(AtomicBool::new(true));
    let server = spawn_server(&path, RecordingBackend::new(), Arc::clone(&running));

    let mut sender = connect(&path);
    let t1 = sender.get_secs().expect("first getSecs should reply");
    let t2 = sender.get_secs().expect("second getSecs should reply");
    assert!(t2 >= t1, "server clock went backwards: {t1} then {t2}");
    sender.close();

    stop(&running, server);
    cleanup(&path);
}

#[test]
fn rejected_texture_does_not_desync() {
    let path = make_sock_path("reject");
    let running = Arc::new(AtomicBool::new(true));
    let backend = RecordingBackend::new().rejecting(CommandCode::CreateTexture);
    let server = spawn_server(&path, backend, Arc::clone(&running));

    let mut sender = connect(&path);
    sender
        .create_texture(2, 2, vec![0.0; 16])
        .expect("createTexture should send");
    sender.get_secs().expect("getSecs after a rejection should reply");
    sender.close();

    let dispatcher = stop(&running, server);
    assert_eq!(dispatcher.stats().rejected, 1);
    assert_eq!(
        dispatcher.backend().executed_codes(),
        vec![CommandCode::GetSecs]
    );
    cleanup(&path);
}

#[test]
fn unknown_code_drops_connection_and_server_recovers() {
    let path = make_sock_path("unknown");
    let running = Arc::new(AtomicBool::new(true));
    let server = spawn_server(&path, RecordingBackend::new(), Arc::clone(&running));

    let mut sender = connect(&path);
    let raw = 0x7777u16.to_ne_bytes();
    let written = sender
        .communicator_mut()
        .writer()
        .expect("client should be writable")
        .write_bytes(&raw);
    assert_eq!(written, raw.len());
    let err = sender
        .get_secs()
        .expect_err("server should drop a desynchronized client");
    assert!(err.desynchronizes(), "unexpected error: {err}");

    let mut sender = connect(&path);
    sender.ping().expect("fresh connection should accept ping");
    sender.get_secs().expect("fresh connection should reply");
    sender.close();

    let dispatcher = stop(&running, server);
    assert_eq!(dispatcher.stats().unknown, 1);
    assert!(dispatcher.stats().connections >= 2);
    assert!(!dispatcher
        .backend()
        .executed_codes()
        .contains(&CommandCode::Unknown));
    cleanup(&path);
}

#[test]
fn profiling_round_trip_over_memory() {
    let (host, render) = MemoryCommunicator::open_pair("profiling");
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    let server = thread::spawn(move || {
        let mut dispatcher = Dispatcher::new(render, RecordingBackend::new());
        dispatcher
            .serve("profiling", &flag)
            .expect("serve should run until stopped");
        dispatcher
    });

    let mut sender = Sender::new(host).with_reply_wait(Duration::from_secs(5));
    let on = sender.send(&Command::ProfileOn).expect("profileOn should send");
    let ping = sender.ping().expect("ping should send");
    let secs = sender.send(&Command::GetSecs).expect("getSecs should send");
    let flush = sender.send(&Command::Flush).expect("flush should send");
    let off = sender.send(&Command::ProfileOff).expect("profileOff should send");
    let after = sender.send(&Command::GetSecs).expect("getSecs should send");

    let stamps: Vec<f64> = [on, ping, secs]
        .iter()
        .map(|reply| reply.profile_stamp.expect("profiled command should be stamped"))
        .collect();
    assert!(stamps.windows(2).all(|pair| pair[1] >= pair[0]));
    assert!(secs.value.is_some());
    assert!(flush.value.is_some());
    assert!(flush.profile_stamp.is_none());
    assert!(off.profile_stamp.is_none());
    assert!(after.value.is_some());
    assert!(after.profile_stamp.is_none());
    assert!(!sender.is_profiling());

    running.store(false, Ordering::SeqCst);
    let dispatcher = server.join().expect("server thread should finish");
    assert!(!dispatcher.state().profiling);
    assert_eq!(dispatcher.stats().commands, 6);
    assert_eq!(dispatcher.communicator().pending(), 0);
}
