//! Error types and exit codes for the chatroom server

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use thiserror::Error;

/// Main error type for chatroom server operations
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to accept connection on {addr}: {source}")]
    Accept {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Credential store error at {path}: {message}")]
    CredentialStore { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChatError {
    /// Convert error to an exit code:
    /// - 0: Clean shutdown
    /// - 1: IO error
    /// - 2: Configuration error
    /// - 3: Credential store could not be read
    /// - 4: Listener setup failure (bind)
    /// - 5: Accept loop failure
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Io(_) => ExitCode::from(1),
            Self::ConfigError { .. } => ExitCode::from(2),
            Self::CredentialStore { .. } => ExitCode::from(3),
            Self::Bind { .. } => ExitCode::from(4),
            Self::Accept { .. } => ExitCode::from(5),
        }
    }
}

/// Result type alias for chatroom operations
pub type Result<T> = std::result::Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_distinguish_setup_failures() {
        let bind = ChatError::Bind {
            addr: "0.0.0.0:16271".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        };
        let config = ChatError::ConfigError {
            message: "bad toml".to_string(),
        };
        assert_eq!(
            format!("{:?}", bind.exit_code()),
            format!("{:?}", ExitCode::from(4))
        );
        assert_eq!(
            format!("{:?}", config.exit_code()),
            format!("{:?}", ExitCode::from(2))
        );
    }

    #[test]
    fn test_bind_error_message_names_address() {
        let err = ChatError::Bind {
            addr: "127.0.0.1:16271".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        };
        assert!(err.to_string().starts_with("Failed to bind 127.0.0.1:16271"));
    }
}
