use fleet_core::error::FleetError;
use ssh2::{Channel, Session};
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

const IDLE_WAIT: Duration = Duration::from_millis(5);

/// Local port forward to `target:port` through an SSH session on a
/// bootstrap host. Connections to `local_addr()` are served one at a time,
/// which matches how executors open a session per operation.
pub struct Tunnel {
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Tunnel {
    pub fn open(jump: Session, target: &str, port: u16) -> Result<Self, FleetError> {
        let listener = TcpListener::bind(("127.0.0.1", 0))?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = shutdown.clone();
        let target = target.to_string();
        debug!("Forwarding {} -> {}:{}", local_addr, target, port);
        let handle = thread::spawn(move || serve(listener, jump, &target, port, &flag));

        Ok(Self {
            local_addr,
            shutdown,
            handle: Some(handle),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for Tunnel {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn serve(listener: TcpListener, jump: Session, target: &str, port: u16, shutdown: &AtomicBool) {
    while !shutdown.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(e) = forward(&jump, stream, target, port, shutdown) {
                    warn!("Tunnel to {}:{} dropped a connection: {}", target, port, e);
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(IDLE_WAIT),
            Err(e) => {
                warn!("Tunnel to {}:{} stopped accepting: {}", target, port, e);
                break;
            }
        }
    }
}

/// Pump bytes both ways between `stream` and a direct-tcpip channel until
/// either side closes.
fn forward(
    jump: &Session,
    mut stream: TcpStream,
    target: &str,
    port: u16,
    shutdown: &AtomicBool,
) -> std::io::Result<()> {
    jump.set_blocking(true);
    let mut channel = jump.channel_direct_tcpip(target, port, None)?;
    jump.set_blocking(false);
    stream.set_nonblocking(true)?;

    let result = pump(&mut stream, &mut channel, shutdown);

    jump.set_blocking(true);
    let _ = channel.close();
    result
}

fn pump(stream: &mut TcpStream, channel: &mut Channel, shutdown: &AtomicBool) -> std::io::Result<()> {
    let mut buf = [0u8; 16 * 1024];
    while !shutdown.load(Ordering::Relaxed) {
        let mut moved = false;

        match stream.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => {
                write_all(channel, &buf[..n])?;
                moved = true;
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => return Err(e),
        }

        match channel.read(&mut buf) {
            Ok(0) if channel.eof() => return Ok(()),
            Ok(0) => {}
            Ok(n) => {
                write_all(stream, &buf[..n])?;
                moved = true;
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => return Err(e),
        }

        if !moved {
            thread::sleep(IDLE_WAIT);
        }
    }
    Ok(())
}

/// `write_all` for non-blocking writers.
fn write_all<W: Write>(writer: &mut W, mut data: &[u8]) -> std::io::Result<()> {
    while !data.is_empty() {
        match writer.write(data) {
            Ok(0) => return Err(ErrorKind::WriteZero.into()),
            Ok(n) => data = &data[n..],
            Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(IDLE_WAIT),
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
