//! chatroom-server entry point

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use chatroom::server::{bind, ChatServer};
use chatroom::{Cli, CredentialStore, FileCredentialStore, MemoryCredentialStore, ServerConfig};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return e.exit_code();
        }
    };

    init_logging(&config.logging.level);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {}", e);
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            e.exit_code()
        }
    }
}

fn load_config(cli: &Cli) -> chatroom::Result<ServerConfig> {
    let mut config = ServerConfig::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    config.validate()?;
    Ok(config)
}

fn init_logging(level: &str) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("chatroom={level},chatroom_server={level}"))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(config: ServerConfig) -> chatroom::Result<()> {
    let store: Arc<dyn CredentialStore> = if config.storage.ephemeral {
        tracing::info!("Ephemeral mode: registrations are kept in memory");
        Arc::new(MemoryCredentialStore::new())
    } else {
        tracing::info!("Using credential file {}", config.storage.users_file.display());
        Arc::new(FileCredentialStore::new(&config.storage.users_file))
    };

    let server = ChatServer::new(&config, store)?;
    let listener = bind(&config.listen_addr()).await?;

    tracing::info!("My chat room server. Version Two.");
    tracing::info!(
        "Listening on {} (max {} clients)",
        listener.local_addr()?,
        config.server.max_clients
    );

    server
        .serve(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
}
