use fleet_core::error::FleetError;
use ssh2::Session;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Establish an authenticated SSH session.
///
/// Uses the private key when it exists on disk, the SSH agent otherwise.
/// `timeout` bounds the TCP connect and every blocking call made on the
/// returned session, so a stalled peer surfaces as an error.
pub fn connect(
    host: &str,
    port: u16,
    user: &str,
    key_path: &Path,
    timeout: Duration,
) -> Result<Session, FleetError> {
    debug!("Connecting to {}@{}:{}", user, host, port);
    let tcp = tcp_connect(host, port, timeout)?;

    let mut sess = Session::new()
        .map_err(|e| FleetError::SshConnection(format!("Session::new: {}", e)))?;
    sess.set_timeout(timeout.as_millis().min(u32::MAX as u128) as u32);
    sess.set_tcp_stream(tcp);
    sess.handshake()
        .map_err(|e| FleetError::SshConnection(format!("Handshake with {}: {}", host, e)))?;

    if key_path.exists() {
        sess.userauth_pubkey_file(user, None, key_path, None)
            .map_err(|e| FleetError::SshConnection(format!("Pubkey auth: {}", e)))?;
    } else {
        sess.userauth_agent(user)
            .map_err(|e| FleetError::SshConnection(format!("Agent auth: {}", e)))?;
    }

    if !sess.authenticated() {
        return Err(FleetError::SshConnection(format!(
            "Authentication to {}@{} failed",
            user, host
        )));
    }

    info!("SSH connected to {}@{}:{}", user, host, port);
    Ok(sess)
}

fn tcp_connect(host: &str, port: u16, timeout: Duration) -> Result<TcpStream, FleetError> {
    let failed =
        |e: std::io::Error| FleetError::SshConnection(format!("TCP connect to {}:{}: {}", host, port, e));
    let mut last = None;
    for addr in (host, port).to_socket_addrs().map_err(failed)? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last = Some(e),
        }
    }
    Err(failed(last.unwrap_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses resolved")
    })))
}

/// Execute a command on the remote host and return stdout.
/// A non-zero exit status is an error carrying stderr.
pub fn exec(sess: &Session, cmd: &str) -> Result<String, FleetError> {
    debug!("Remote exec: {}", cmd);
    let mut channel = sess
        .channel_session()
        .map_err(|e| FleetError::SshCommand(format!("Channel: {}", e)))?;
    channel
        .exec(cmd)
        .map_err(|e| FleetError::SshCommand(format!("Exec '{}': {}", cmd, e)))?;

    let mut output = String::new();
    channel
        .read_to_string(&mut output)
        .map_err(|e| FleetError::SshCommand(format!("Read output: {}", e)))?;

    let mut stderr = String::new();
    channel
        .stderr()
        .read_to_string(&mut stderr)
        .map_err(|e| FleetError::SshCommand(format!("Read stderr: {}", e)))?;

    channel.wait_close().ok();
    let status = channel.exit_status().unwrap_or(-1);
    if status != 0 {
        debug!("Remote command exited {}: {}", status, stderr.trim());
        return Err(FleetError::Command {
            status,
            stderr: stderr.trim().to_string(),
        });
    }

    Ok(output)
}

/// Copy a local file to `remote` over SCP.
pub fn upload(sess: &Session, local: &Path, remote: &Path) -> Result<(), FleetError> {
    debug!("scp {} -> {}", local.display(), remote.display());
    let data = std::fs::read(local)?;
    let transfer = |e: std::io::Error| {
        FleetError::Transfer(format!("scp {} -> {}: {}", local.display(), remote.display(), e))
    };

    let mut channel = sess
        .scp_send(remote, 0o644, data.len() as u64, None)
        .map_err(|e| transfer(e.into()))?;
    channel.write_all(&data).map_err(transfer)?;
    channel.send_eof().map_err(|e| transfer(e.into()))?;
    channel.wait_eof().map_err(|e| transfer(e.into()))?;
    channel.close().map_err(|e| transfer(e.into()))?;
    channel.wait_close().map_err(|e| transfer(e.into()))?;
    Ok(())
}

/// Copy `remote` into the local file `local` over SCP.
pub fn download(sess: &Session, remote: &Path, local: &Path) -> Result<(), FleetError> {
    debug!("scp {} <- {}", local.display(), remote.display());
    let transfer = |e: std::io::Error| {
        FleetError::Transfer(format!("scp {} <- {}: {}", local.display(), remote.display(), e))
    };

    let (mut channel, stat) = sess.scp_recv(remote).map_err(|e| transfer(e.into()))?;
    let mut data = Vec::with_capacity(stat.size() as usize);
    channel.read_to_end(&mut data).map_err(transfer)?;
    channel.send_eof().ok();
    channel.wait_eof().ok();
    channel.close().ok();
    channel.wait_close().ok();

    std::fs::write(local, data)?;
    Ok(())
}
