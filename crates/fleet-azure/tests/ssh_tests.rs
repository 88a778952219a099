use fleet_azure::ssh;
use fleet_core::error::FleetError;
use std::net::TcpListener;
use std::path::Path;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_silent_peer_times_out_during_handshake() {
    // Accepts the connection, then never sends an SSH banner.
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let (done_tx, done_rx) = mpsc::channel::<()>();
    let server = thread::spawn(move || {
        let (_stream, _) = listener.accept().unwrap();
        let _ = done_rx.recv_timeout(Duration::from_secs(30));
    });

    let started = Instant::now();
    let result = ssh::connect(
        "127.0.0.1",
        port,
        "compas",
        Path::new("/nonexistent/id_rsa"),
        Duration::from_secs(1),
    );

    assert!(matches!(result, Err(FleetError::SshConnection(_))));
    assert!(started.elapsed() < Duration::from_secs(20));

    drop(done_tx);
    server.join().unwrap();
}

#[test]
fn test_refused_connection_is_a_connection_error() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let result = ssh::connect(
        "127.0.0.1",
        port,
        "compas",
        Path::new("/nonexistent/id_rsa"),
        Duration::from_secs(1),
    );
    assert!(matches!(result, Err(FleetError::SshConnection(_))));
}
