//! Error types and process exit codes.

use std::path::PathBuf;

use crate::connector::ConnectorError;
use crate::platform::Platform;

/// Exit codes for CLI operations
pub mod exit_codes {
    /// Configuration, validation, I/O or rendering failure
    pub const GENERAL_ERROR: i32 = 1;
    /// The remote session could not be established or was lost
    pub const CONNECTION_FAILURE: i32 = 2;
    /// The target platform identifier is not recognised
    pub const UNSUPPORTED_PLATFORM: i32 = 3;
}

/// Hard failures of a collection. Per-metric failures never show up here;
/// they are recorded inside the report.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("unsupported platform '{0}' (expected one of: {supported})", supported = Platform::supported())]
    UnsupportedPlatform(String),

    #[error("transport error: {0}")]
    Transport(#[source] ConnectorError),
}

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("profile '{name}' not found at {}", path.display())]
    NotFound { name: String, path: PathBuf },

    #[error("invalid profile name '{0}' (use letters, digits, '-' and '_')")]
    InvalidName(String),

    #[error("profile I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Pick the exit code for an error bubbling out of a command handler.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<CollectError>() {
            return match e {
                CollectError::UnsupportedPlatform(_) => exit_codes::UNSUPPORTED_PLATFORM,
                CollectError::Transport(_) => exit_codes::CONNECTION_FAILURE,
            };
        }
        if cause.downcast_ref::<ConnectorError>().is_some() {
            return exit_codes::CONNECTION_FAILURE;
        }
    }
    exit_codes::GENERAL_ERROR
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn unsupported_platform_message_lists_choices() {
        let msg = CollectError::UnsupportedPlatform("solaris".into()).to_string();
        assert!(msg.contains("solaris"));
        assert!(msg.contains("rhel"));
        assert!(msg.contains("windows"));
    }

    #[test]
    fn exit_codes_follow_the_error_chain() {
        let err = anyhow::Error::new(CollectError::UnsupportedPlatform("x".into()))
            .context("building collector");
        assert_eq!(exit_code(&err), exit_codes::UNSUPPORTED_PLATFORM);

        let err: anyhow::Error = Err::<(), _>(ConnectorError::NotConnected)
            .context("connecting")
            .unwrap_err();
        assert_eq!(exit_code(&err), exit_codes::CONNECTION_FAILURE);

        let err = anyhow::anyhow!("something else");
        assert_eq!(exit_code(&err), exit_codes::GENERAL_ERROR);
    }
}
