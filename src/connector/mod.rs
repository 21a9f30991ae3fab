//! Connectors: the transport seam between the collector and a remote host.
//!
//! A connector executes one command string per call inside an already
//! authenticated session and hands back the command's standard output.
//! Remote-side problems (non-zero exit, stderr chatter) come back as values;
//! only a lost session is reported as [`ConnectorError::NotConnected`].

pub mod ssh;
pub mod winrm;
mod wsman;

use std::path::PathBuf;

pub use ssh::{SshAuth, SshConnector, SshOptions};
pub use winrm::{WinRmConnector, WinRmOptions};

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("not connected")]
    NotConnected,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("SSH key file not found: {}", path.display())]
    KeyNotFound { path: PathBuf },

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("command timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("remote command failed (exit {status}): {stderr}")]
    Remote { status: i32, stderr: String },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ConnectorError {
    /// True when the session itself is unusable, as opposed to a single
    /// command failing inside a healthy session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ConnectorError::NotConnected)
    }
}

/// A remote command transport.
pub trait Connector {
    /// Short transport name used in logs ("ssh", "winrm").
    fn name(&self) -> &str;

    /// Establish and verify the session. Must succeed before [`Connector::run`].
    fn connect(&mut self) -> Result<(), ConnectorError>;

    fn is_connected(&self) -> bool;

    /// Execute `command` verbatim and return its standard output.
    fn run(&self, command: &str) -> Result<String, ConnectorError>;

    /// Release the session. Safe to call when not connected.
    fn close(&mut self);
}

impl<C: Connector + ?Sized> Connector for Box<C> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn connect(&mut self) -> Result<(), ConnectorError> {
        (**self).connect()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn run(&self, command: &str) -> Result<String, ConnectorError> {
        (**self).run(command)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted connector for collector tests.

    use std::cell::RefCell;
    use std::collections::HashMap;

    use super::{Connector, ConnectorError};

    type Reply = Box<dyn Fn() -> Result<String, ConnectorError>>;

    pub struct MockConnector {
        connected: bool,
        replies: HashMap<String, Reply>,
        fallback: Option<String>,
        pub calls: RefCell<Vec<String>>,
    }

    impl MockConnector {
        pub fn new() -> Self {
            Self {
                connected: true,
                replies: HashMap::new(),
                fallback: None,
                calls: RefCell::new(Vec::new()),
            }
        }

        pub fn disconnected() -> Self {
            Self {
                connected: false,
                ..Self::new()
            }
        }

        /// Answer every unscripted command with `output`.
        pub fn answering_all(output: &str) -> Self {
            Self {
                fallback: Some(output.to_string()),
                ..Self::new()
            }
        }

        pub fn reply(mut self, command: &str, output: &str) -> Self {
            let output = output.to_string();
            self.replies
                .insert(command.to_string(), Box::new(move || Ok(output.clone())));
            self
        }

        pub fn fail(mut self, command: &str, make: fn() -> ConnectorError) -> Self {
            self.replies
                .insert(command.to_string(), Box::new(move || Err(make())));
            self
        }

        pub fn call_count(&self, command: &str) -> usize {
            self.calls.borrow().iter().filter(|c| *c == command).count()
        }
    }

    impl Connector for MockConnector {
        fn name(&self) -> &str {
            "mock"
        }

        fn connect(&mut self) -> Result<(), ConnectorError> {
            self.connected = true;
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        fn run(&self, command: &str) -> Result<String, ConnectorError> {
            self.calls.borrow_mut().push(command.to_string());
            if !self.connected {
                return Err(ConnectorError::NotConnected);
            }
            match self.replies.get(command) {
                Some(reply) => reply(),
                None => match &self.fallback {
                    Some(out) => Ok(out.clone()),
                    None => Err(ConnectorError::Remote {
                        status: 127,
                        stderr: format!("unscripted command: {command}"),
                    }),
                },
            }
        }

        fn close(&mut self) {
            self.connected = false;
        }
    }
}
