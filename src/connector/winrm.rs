//! WinRM connector. Runs PowerShell over a WS-Management remote shell.
//!
//! `connect` opens one remote cmd shell, every `run` issues a Command /
//! Receive / Signal sequence inside it, and `close` deletes the shell.
//! Authentication is HTTP Basic (local accounts, or `DOMAIN\user` where the
//! listener allows it).

use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

use super::wsman::{self, Response};
use super::{Connector, ConnectorError};

/// Receive polls with this OperationTimeout; long commands just poll again.
const RECEIVE_TIMEOUT_SECS: u64 = 20;

#[derive(Debug, Clone)]
pub struct WinRmOptions {
    pub port: u16,
    pub https: bool,
    /// Upper bound for a single command, Receive polling included.
    pub timeout_secs: u64,
    pub accept_invalid_certs: bool,
}

impl Default for WinRmOptions {
    fn default() -> Self {
        Self {
            port: 5985,
            https: false,
            timeout_secs: 60,
            accept_invalid_certs: false,
        }
    }
}

struct Session {
    client: Client,
    shell_id: String,
}

pub struct WinRmConnector {
    endpoint: String,
    username: String,
    password: SecretString,
    options: WinRmOptions,
    session: Option<Session>,
}

impl WinRmConnector {
    pub fn new(
        host: &str,
        user: &str,
        domain: Option<&str>,
        password: SecretString,
        options: WinRmOptions,
    ) -> Self {
        let username = match domain {
            Some(d) if !d.is_empty() => format!("{d}\\{user}"),
            _ => user.to_string(),
        };
        let scheme = if options.https { "https" } else { "http" };
        let endpoint = format!("{scheme}://{host}:{}/wsman", options.port);

        Self {
            endpoint,
            username,
            password,
            options,
            session: None,
        }
    }

    fn post(
        &self,
        client: &Client,
        action: &str,
        shell_id: Option<&str>,
        options: &[(&str, &str)],
        body: &str,
        timeout_secs: u64,
    ) -> Result<Response, ConnectorError> {
        let envelope = wsman::envelope(&self.endpoint, action, shell_id, options, body, timeout_secs);

        let resp = client
            .post(&self.endpoint)
            .basic_auth(&self.username, Some(self.password.expose_secret()))
            .header(CONTENT_TYPE, "application/soap+xml;charset=UTF-8")
            .body(envelope)
            .send()
            .map_err(|e| ConnectorError::Transport(e.to_string()))?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ConnectorError::Auth(format!(
                "{} rejected credentials for {} (HTTP 401)",
                self.endpoint, self.username
            )));
        }

        let text = resp
            .text()
            .map_err(|e| ConnectorError::Transport(e.to_string()))?;

        if text.trim().is_empty() {
            if status.is_success() {
                return Ok(Response::default());
            }
            return Err(ConnectorError::Transport(format!("HTTP {status}")));
        }

        let parsed = wsman::parse(&text).map_err(ConnectorError::Protocol)?;
        if !status.is_success() && parsed.fault.is_none() {
            return Err(ConnectorError::Transport(format!("HTTP {status}")));
        }
        Ok(parsed)
    }

    fn start_command(&self, session: &Session, script: &str) -> Result<String, ConnectorError> {
        let resp = self.post(
            &session.client,
            wsman::ACTION_COMMAND,
            Some(&session.shell_id),
            wsman::COMMAND_OPTIONS,
            &wsman::powershell_body(script),
            RECEIVE_TIMEOUT_SECS,
        )?;
        if let Some(fault) = resp.fault {
            return Err(ConnectorError::Protocol(fault.reason));
        }
        resp.command_id
            .ok_or_else(|| ConnectorError::Protocol("Command response carried no CommandId".into()))
    }

    fn receive_all(
        &self,
        session: &Session,
        command_id: &str,
    ) -> Result<(Vec<u8>, Vec<u8>, Option<i32>), ConnectorError> {
        let deadline = Instant::now() + Duration::from_secs(self.options.timeout_secs);
        let body = wsman::receive_body(command_id);
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        loop {
            if Instant::now() >= deadline {
                return Err(ConnectorError::Timeout {
                    secs: self.options.timeout_secs,
                });
            }

            let resp = self.post(
                &session.client,
                wsman::ACTION_RECEIVE,
                Some(&session.shell_id),
                &[("WSMAN_CMDSHELL_OPTION_KEEPALIVE", "TRUE")],
                &body,
                RECEIVE_TIMEOUT_SECS,
            )?;

            match resp.fault {
                Some(fault) if fault.is_operation_timeout() => continue,
                Some(fault) => return Err(ConnectorError::Protocol(fault.reason)),
                None => {}
            }

            stdout.extend(resp.stdout);
            stderr.extend(resp.stderr);
            if resp.done {
                return Ok((stdout, stderr, resp.exit_code));
            }
        }
    }

    fn terminate(&self, session: &Session, command_id: &str) {
        let result = self.post(
            &session.client,
            wsman::ACTION_SIGNAL,
            Some(&session.shell_id),
            &[],
            &wsman::signal_body(command_id),
            RECEIVE_TIMEOUT_SECS,
        );
        if let Err(e) = result {
            debug!(error = %e, command_id, "signal terminate failed");
        }
    }
}

impl Connector for WinRmConnector {
    fn name(&self) -> &str {
        "winrm"
    }

    fn connect(&mut self) -> Result<(), ConnectorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(RECEIVE_TIMEOUT_SECS + 10))
            .danger_accept_invalid_certs(self.options.accept_invalid_certs)
            .build()
            .map_err(|e| ConnectorError::Connect(format!("building HTTP client: {e}")))?;

        info!(endpoint = %self.endpoint, user = %self.username, "opening WinRM shell");

        let resp = self
            .post(
                &client,
                wsman::ACTION_CREATE,
                None,
                wsman::SHELL_OPTIONS,
                wsman::create_shell_body(),
                RECEIVE_TIMEOUT_SECS,
            )
            .map_err(|e| match e {
                ConnectorError::Auth(_) => e,
                other => ConnectorError::Connect(other.to_string()),
            })?;

        if let Some(fault) = resp.fault {
            return Err(ConnectorError::Connect(fault.reason));
        }
        let shell_id = resp
            .shell_id
            .ok_or_else(|| ConnectorError::Connect("shell creation returned no ShellId".into()))?;

        self.session = Some(Session { client, shell_id });
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    fn run(&self, command: &str) -> Result<String, ConnectorError> {
        let session = self.session.as_ref().ok_or(ConnectorError::NotConnected)?;
        debug!(endpoint = %self.endpoint, command, "winrm exec");

        let command_id = self.start_command(session, command)?;
        let received = self.receive_all(session, &command_id);
        self.terminate(session, &command_id);
        let (stdout, stderr, exit_code) = received?;

        let stdout = String::from_utf8_lossy(&stdout).into_owned();
        let stderr = wsman::clean_stderr(&String::from_utf8_lossy(&stderr));

        match exit_code {
            Some(0) | None if stdout.trim().is_empty() && !stderr.is_empty() => {
                Err(ConnectorError::Remote {
                    status: exit_code.unwrap_or(0),
                    stderr,
                })
            }
            Some(0) | None => Ok(stdout),
            _ if !stdout.trim().is_empty() => Ok(stdout),
            Some(status) => Err(ConnectorError::Remote { status, stderr }),
        }
    }

    fn close(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let result = self.post(
            &session.client,
            wsman::ACTION_DELETE,
            Some(&session.shell_id),
            &[],
            "",
            RECEIVE_TIMEOUT_SECS,
        );
        if let Err(e) = result {
            warn!(error = %e, endpoint = %self.endpoint, "failed to delete remote shell");
        }
    }
}

impl Drop for WinRmConnector {
    fn drop(&mut self) {
        self.close();
    }
}
