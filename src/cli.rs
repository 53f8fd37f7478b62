//! CLI argument definitions using clap

use clap::Parser;
use std::path::PathBuf;

use crate::config::ServerConfig;

/// Multi-user chat room server
#[derive(Parser, Debug, Default)]
#[command(name = "chatroom-server")]
#[command(about = "Line-oriented chat room server")]
#[command(version)]
pub struct Cli {
    /// Configuration file (default: <config dir>/chatroom/config.toml)
    #[arg(short, long, env = "CHATROOM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Maximum number of concurrently connected clients
    #[arg(long)]
    pub max_clients: Option<usize>,

    /// Credential file holding `(userID, password)` records
    #[arg(short, long)]
    pub users_file: Option<PathBuf>,

    /// Keep new registrations in memory only
    #[arg(long)]
    pub ephemeral: bool,

    /// Log level when RUST_LOG is not set
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Cli {
    /// Apply command-line overrides on top of a loaded configuration
    pub fn apply(&self, config: &mut ServerConfig) {
        if let Some(ref host) = self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(max_clients) = self.max_clients {
            config.server.max_clients = max_clients;
        }
        if let Some(ref users_file) = self.users_file {
            config.storage.users_file = users_file.clone();
        }
        if self.ephemeral {
            config.storage.ephemeral = true;
        }
        if let Some(ref level) = self.log_level {
            config.logging.level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_replace_config_values() {
        let cli = Cli::parse_from([
            "chatroom-server",
            "--port",
            "9000",
            "--max-clients",
            "5",
            "--users-file",
            "/tmp/users.txt",
            "--ephemeral",
        ]);
        let mut config = ServerConfig::default();
        cli.apply(&mut config);

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.max_clients, 5);
        assert_eq!(config.storage.users_file, PathBuf::from("/tmp/users.txt"));
        assert!(config.storage.ephemeral);
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn test_no_flags_keeps_config() {
        let cli = Cli::parse_from(["chatroom-server"]);
        let mut config = ServerConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.server.port, 16271);
        assert_eq!(config.server.max_clients, 3);
    }
}
