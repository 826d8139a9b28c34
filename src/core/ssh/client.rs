use crate::config::Server;
use crate::error::{Error, Result, TargetDetails};
use crate::utils::process::{self, CommandOutput};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::credential::PrivateKey;

/// Exit status the OpenSSH client uses for its own (transport) failures.
const SSH_TRANSPORT_EXIT: i32 = 255;

/// Where and as whom to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub server_id: String,
    pub host: String,
    pub port: u16,
    pub user: String,
}

impl SshTarget {
    pub fn from_server(server_id: &str, server: &Server) -> Self {
        Self {
            server_id: server_id.to_string(),
            host: server.host.clone(),
            port: server.port,
            user: server.user.clone(),
        }
    }

    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    pub fn details(&self) -> TargetDetails {
        TargetDetails::server(&self.server_id, format!("{}:{}", self.host, self.port))
    }
}

/// Dials one authenticated connection per server.
pub trait SshConnector {
    type Connection: SshConnection;

    fn connect(&self, target: &SshTarget, key: &PrivateKey) -> Result<Self::Connection>;
}

/// An open, authenticated connection that can host many sessions.
pub trait SshConnection {
    type Session: SshSession;

    fn new_session(&mut self) -> Result<Self::Session>;

    fn close(self) -> Result<()>;
}

/// A single-command session.
pub trait SshSession {
    /// Run `command`, capturing stdout and stderr together.
    ///
    /// A non-zero remote exit is returned as `Ok` with `success == false`;
    /// `Err` is reserved for transport failures. The OpenSSH client reports
    /// its own failures as exit status 255, so a remote command that exits
    /// 255 is indistinguishable from one and comes back as
    /// `ssh.session_failed`, not `command.failed`.
    fn combined_output(&mut self, command: &str) -> Result<CommandOutput>;

    fn close(self) -> Result<()>;
}

// ============================================================================
// OpenSSH client (control-master multiplexing)
// ============================================================================

/// Drives the system `ssh` binary.
///
/// `connect` starts a control master (`ssh -M -N -S <socket>`); every session
/// is a separate `ssh -S <socket>` process multiplexed over that master, and
/// `close` sends `-O exit`.
#[derive(Debug, Clone)]
pub struct OpenSshConnector {
    pub program: String,
    pub connect_timeout: Duration,
}

impl Default for OpenSshConnector {
    fn default() -> Self {
        Self {
            program: "ssh".to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl OpenSshConnector {
    fn master_args(&self, target: &SshTarget, key_path: &Path, control_path: &Path) -> Vec<String> {
        let mut args = vec![
            "-M".to_string(),
            "-N".to_string(),
            "-S".to_string(),
            control_path.to_string_lossy().to_string(),
        ];
        args.extend(client_options(
            target,
            key_path,
            self.connect_timeout.as_secs().max(1),
        ));
        args.push("--".to_string());
        args.push(target.destination());
        args
    }
}

/// Identity, port and `-o` options shared by the master and its sessions.
fn client_options(target: &SshTarget, key_path: &Path, connect_timeout_secs: u64) -> Vec<String> {
    let mut args = vec![
        "-i".to_string(),
        key_path.to_string_lossy().to_string(),
        "-p".to_string(),
        target.port.to_string(),
    ];

    let options = [
        // Public-key authentication only.
        "IdentitiesOnly=yes".to_string(),
        "BatchMode=yes".to_string(),
        "PasswordAuthentication=no".to_string(),
        "KbdInteractiveAuthentication=no".to_string(),
        "PreferredAuthentications=publickey".to_string(),
        // Host identity is not verified.
        "StrictHostKeyChecking=no".to_string(),
        "UserKnownHostsFile=/dev/null".to_string(),
        "LogLevel=ERROR".to_string(),
        format!("ConnectTimeout={}", connect_timeout_secs),
        "ServerAliveInterval=15".to_string(),
        "ServerAliveCountMax=3".to_string(),
    ];
    for option in options {
        args.push("-o".to_string());
        args.push(option);
    }
    args
}

/// Arguments for one multiplexed session, minus the trailing command.
///
/// The socket is pinned and `ControlMaster=no` set so the client cannot
/// start a master of its own; if the master is gone a direct dial would
/// still use the same key and options, and is cut short by the 1s timeout.
fn session_args(target: &SshTarget, key_path: &Path, control_path: &Path) -> Vec<String> {
    let socket = control_path.to_string_lossy().to_string();
    let mut args = vec![
        "-S".to_string(),
        socket.clone(),
        "-o".to_string(),
        format!("ControlPath={}", socket),
        "-o".to_string(),
        "ControlMaster=no".to_string(),
    ];
    args.extend(client_options(target, key_path, 1));
    args.push("-T".to_string());
    args.push("--".to_string());
    args.push(target.destination());
    args
}

impl SshConnector for OpenSshConnector {
    type Connection = OpenSshConnection;

    fn connect(&self, target: &SshTarget, key: &PrivateKey) -> Result<OpenSshConnection> {
        let control_path = control_socket_path();

        log_status!(
            "ssh",
            "Connecting to {} ({}:{}) with {}; host key is not verified",
            target.server_id,
            target.host,
            target.port,
            key.describe()
        );

        let master = Command::new(&self.program)
            .args(self.master_args(target, &key.path, &control_path))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                Error::ssh_connect_failed(
                    target.details(),
                    format!("failed to start {}: {}", self.program, e),
                )
            })?;

        let mut connection = OpenSshConnection {
            program: self.program.clone(),
            target: target.clone(),
            key_path: key.path.clone(),
            control_path,
            master,
            closed: false,
        };

        // Allow the handshake its own timeout plus slack for process start-up.
        let deadline = Instant::now() + self.connect_timeout + Duration::from_secs(5);
        connection.wait_until_ready(deadline)?;

        Ok(connection)
    }
}

fn control_socket_path() -> PathBuf {
    // Unix socket paths are limited to ~104 bytes, keep the name short.
    let id = Uuid::new_v4().simple().to_string();
    std::env::temp_dir().join(format!("ploy-{}.sock", &id[..12]))
}

pub struct OpenSshConnection {
    program: String,
    target: SshTarget,
    key_path: PathBuf,
    control_path: PathBuf,
    master: Child,
    closed: bool,
}

impl OpenSshConnection {
    fn wait_until_ready(&mut self, deadline: Instant) -> Result<()> {
        loop {
            let exited = self.master.try_wait().map_err(|e| {
                Error::ssh_connect_failed(self.target.details(), e.to_string())
            })?;

            if let Some(status) = exited {
                let stderr = self.master_stderr();
                self.closed = true;
                let reason = if stderr.is_empty() {
                    format!("ssh exited with {}", status)
                } else {
                    stderr
                };
                return Err(Error::ssh_connect_failed(self.target.details(), reason));
            }

            if self.control_path.exists() && self.control("check").is_ok_and(|out| out.success) {
                return Ok(());
            }

            if Instant::now() >= deadline {
                self.teardown();
                return Err(Error::ssh_connect_failed(
                    self.target.details(),
                    "timed out waiting for the connection to be established",
                ));
            }

            std::thread::sleep(Duration::from_millis(50));
        }
    }

    fn master_stderr(&mut self) -> String {
        let mut buf = String::new();
        if let Some(mut stderr) = self.master.stderr.take() {
            let _ = stderr.read_to_string(&mut buf);
        }
        buf.trim().to_string()
    }

    /// Send a control command (`check`, `exit`) to the master.
    fn control(&self, operation: &str) -> std::io::Result<CommandOutput> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-S")
            .arg(&self.control_path)
            .arg("-O")
            .arg(operation)
            .arg("--")
            .arg(self.target.destination());
        process::run_combined(cmd)
    }

    fn teardown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.control("exit");
        let _ = self.master.kill();
        let _ = self.master.wait();
        let _ = std::fs::remove_file(&self.control_path);
    }
}

impl SshConnection for OpenSshConnection {
    type Session = OpenSshSession;

    fn new_session(&mut self) -> Result<OpenSshSession> {
        if self.closed || !self.control_path.exists() {
            return Err(Error::ssh_session_failed(
                self.target.details(),
                None,
                "connection is no longer open",
            ));
        }

        Ok(OpenSshSession {
            program: self.program.clone(),
            target: self.target.clone(),
            args: session_args(&self.target, &self.key_path, &self.control_path),
        })
    }

    fn close(mut self) -> Result<()> {
        let result = self.control("exit");
        self.closed = true;

        let _ = self.master.kill();
        let _ = self.master.wait();
        let _ = std::fs::remove_file(&self.control_path);

        log_status!("ssh", "Closed connection to {}", self.target.server_id);

        match result {
            Ok(out) if out.success => Ok(()),
            Ok(out) => Err(Error::ssh_close_failed(
                self.target.details(),
                out.output.trim().to_string(),
            )),
            Err(e) => Err(Error::ssh_close_failed(self.target.details(), e.to_string())),
        }
    }
}

impl Drop for OpenSshConnection {
    fn drop(&mut self) {
        self.teardown();
    }
}

pub struct OpenSshSession {
    program: String,
    target: SshTarget,
    args: Vec<String>,
}

impl SshSession for OpenSshSession {
    fn combined_output(&mut self, command: &str) -> Result<CommandOutput> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg(command);

        let output = process::run_combined(cmd).map_err(|e| {
            Error::ssh_session_failed(self.target.details(), Some(command.to_string()), e.to_string())
        })?;

        if output.exit_code == SSH_TRANSPORT_EXIT {
            return Err(Error::ssh_session_failed(
                self.target.details(),
                Some(command.to_string()),
                output.output.trim().to_string(),
            ));
        }

        Ok(output)
    }

    fn close(self) -> Result<()> {
        // The multiplexed client process has already exited.
        Ok(())
    }
}
