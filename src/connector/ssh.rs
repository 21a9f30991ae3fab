//! SSH connector.
//!
//! Every command runs through a fresh `ssh` process (or `sshpass -e ssh` for
//! password logins) so the connector holds no channel state between calls.
//! Per-command timeouts are enforced on a private current-thread tokio
//! runtime; the timed-out child is killed on drop.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tokio::process::Command;
use tracing::{debug, info};

use super::{Connector, ConnectorError};

/// Exit status `ssh` uses for its own failures (connection, auth, host key).
const SSH_TRANSPORT_EXIT: i32 = 255;
/// Exit status `sshpass` uses for a rejected password.
const SSHPASS_BAD_PASSWORD_EXIT: i32 = 5;

#[derive(Debug, Clone)]
pub struct SshOptions {
    pub port: u16,
    pub connect_timeout_secs: u64,
    pub command_timeout_secs: u64,
    /// Value for `-o StrictHostKeyChecking=`.
    pub strict_host_key_checking: String,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            port: 22,
            connect_timeout_secs: 5,
            command_timeout_secs: 30,
            strict_host_key_checking: "accept-new".to_string(),
        }
    }
}

pub enum SshAuth {
    /// Whatever the local agent / default identities provide.
    Agent,
    Key(PathBuf),
    Password(SecretString),
}

pub struct SshConnector {
    host: String,
    user: String,
    auth: SshAuth,
    options: SshOptions,
    runtime: Option<tokio::runtime::Runtime>,
}

impl SshConnector {
    /// Build a connector. A key path is expanded (`~/`) and must exist.
    pub fn new(
        host: &str,
        user: &str,
        auth: SshAuth,
        options: SshOptions,
    ) -> Result<Self, ConnectorError> {
        let auth = match auth {
            SshAuth::Key(path) => {
                let expanded = expand_home(&path);
                if !expanded.is_file() {
                    return Err(ConnectorError::KeyNotFound { path: expanded });
                }
                SshAuth::Key(expanded)
            }
            other => other,
        };

        Ok(Self {
            host: host.to_string(),
            user: user.to_string(),
            auth,
            options,
            runtime: None,
        })
    }

    fn destination(&self) -> String {
        if self.user.is_empty() {
            self.host.clone()
        } else {
            format!("{}@{}", self.user, self.host)
        }
    }

    fn uses_sshpass(&self) -> bool {
        matches!(self.auth, SshAuth::Password(_))
    }

    /// Full argv (program first) for running `remote` on the target.
    fn argv(&self, remote: &str) -> Vec<String> {
        let mut argv: Vec<String> = Vec::new();
        if self.uses_sshpass() {
            argv.extend(["sshpass".into(), "-e".into(), "ssh".into()]);
        } else {
            argv.push("ssh".into());
            // Batch mode only when not relying on a password prompt
            argv.extend(["-o".into(), "BatchMode=yes".into()]);
        }

        argv.extend([
            "-o".into(),
            format!(
                "StrictHostKeyChecking={}",
                self.options.strict_host_key_checking
            ),
            "-o".into(),
            format!("ConnectTimeout={}", self.options.connect_timeout_secs),
            "-o".into(),
            "LogLevel=ERROR".into(),
        ]);

        if self.options.port != 22 {
            argv.extend(["-p".into(), self.options.port.to_string()]);
        }

        if let SshAuth::Key(ref key) = self.auth {
            argv.extend(["-i".into(), key.display().to_string()]);
        }

        argv.push(self.destination());
        argv.push(remote.to_string());
        argv
    }

    fn command(&self, remote: &str) -> Command {
        let argv = self.argv(remote);
        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..]);
        if let SshAuth::Password(ref pw) = self.auth {
            // sshpass -e reads SSHPASS; the password never appears on argv
            cmd.env("SSHPASS", pw.expose_secret());
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn exec(
        &self,
        runtime: &tokio::runtime::Runtime,
        remote: &str,
        timeout_secs: u64,
    ) -> Result<String, ConnectorError> {
        let program = if self.uses_sshpass() { "sshpass" } else { "ssh" };
        let mut cmd = self.command(remote);
        let timeout = Duration::from_secs(timeout_secs);

        let output = runtime
            .block_on(async { tokio::time::timeout(timeout, cmd.output()).await })
            .map_err(|_| ConnectorError::Timeout { secs: timeout_secs })?
            .map_err(|source| ConnectorError::Spawn { program, source })?;

        interpret(output.status.code(), &output.stdout, &output.stderr)
    }
}

impl Connector for SshConnector {
    fn name(&self) -> &str {
        "ssh"
    }

    fn connect(&mut self) -> Result<(), ConnectorError> {
        if self.uses_sshpass() && !sshpass_available() {
            return Err(ConnectorError::Connect(
                "password authentication needs `sshpass` on PATH (or use --key)".into(),
            ));
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ConnectorError::Connect(format!("building runtime: {e}")))?;

        info!(host = %self.host, port = self.options.port, "opening SSH session");

        let probe_timeout = self.options.connect_timeout_secs + 5;
        match self.exec(&runtime, "true", probe_timeout) {
            Ok(_) => {}
            Err(ConnectorError::Remote { status, stderr })
                if self.uses_sshpass() && status == SSHPASS_BAD_PASSWORD_EXIT =>
            {
                return Err(ConnectorError::Auth(if stderr.is_empty() {
                    "password rejected".into()
                } else {
                    stderr
                }));
            }
            Err(ConnectorError::Transport(msg)) => {
                return Err(if msg.contains("Permission denied") {
                    ConnectorError::Auth(msg)
                } else {
                    ConnectorError::Connect(msg)
                });
            }
            Err(e) => return Err(ConnectorError::Connect(e.to_string())),
        }

        self.runtime = Some(runtime);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.runtime.is_some()
    }

    fn run(&self, command: &str) -> Result<String, ConnectorError> {
        let runtime = self.runtime.as_ref().ok_or(ConnectorError::NotConnected)?;
        debug!(host = %self.host, command, "ssh exec");
        self.exec(runtime, command, self.options.command_timeout_secs)
    }

    fn close(&mut self) {
        self.runtime = None;
    }
}

/// Map a finished ssh process onto the connector contract.
///
/// Output on stdout wins over a non-zero exit: `systemctl is-active` prints
/// `inactive` and exits 3, and that text is the answer we want.
fn interpret(code: Option<i32>, stdout: &[u8], stderr: &[u8]) -> Result<String, ConnectorError> {
    let stdout = String::from_utf8_lossy(stdout).into_owned();
    let stderr = String::from_utf8_lossy(stderr).trim().to_string();

    match code {
        Some(0) => Ok(stdout),
        Some(SSH_TRANSPORT_EXIT) => Err(ConnectorError::Transport(if stderr.is_empty() {
            format!("ssh exited with status {SSH_TRANSPORT_EXIT}")
        } else {
            stderr
        })),
        _ if !stdout.trim().is_empty() => Ok(stdout),
        Some(status) => Err(ConnectorError::Remote { status, stderr }),
        None => Err(ConnectorError::Transport(
            "ssh terminated by signal".into(),
        )),
    }
}

fn sshpass_available() -> bool {
    std::process::Command::new("sshpass")
        .arg("-V")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

/// Expand a leading `~/` against the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}
