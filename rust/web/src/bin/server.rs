//! Standalone blackjack server binary
//!
//! Usage: cargo run -p cardroom_web --bin cardroom-server -- --port 8080

use cardroom_web::{init_logging, LogFormat, ServerConfig, WebServer};
use clap::Parser;
use std::path::PathBuf;

/// Multi-table blackjack server: REST commands plus a websocket per table.
#[derive(Debug, Parser)]
#[command(name = "cardroom-server", version, about)]
struct Args {
    /// TOML configuration file (falls back to CARDROOM_CONFIG)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,
    /// Host to bind to
    #[arg(long)]
    host: Option<String>,
    /// Port to bind to
    #[arg(long, short = 'p')]
    port: Option<u16>,
    /// SQLite database file; records stay in memory when unset
    #[arg(long, short = 'd')]
    database: Option<PathBuf>,
    /// Log output: text or json
    #[arg(long)]
    log_format: Option<LogFormat>,
}

impl Args {
    fn apply(self, config: &mut ServerConfig) {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(database) = self.database {
            config.database_path = Some(database);
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = ServerConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;

    init_logging(config.log_format)?;

    tracing::info!(
        host = %config.host(),
        port = config.port(),
        database = ?config.database_path,
        starting_balance = config.starting_balance,
        "starting cardroom server"
    );

    let server = WebServer::new(config)?;
    let handle = server.start().await?;

    tracing::info!("server running at http://{}", handle.address());

    tokio::signal::ctrl_c().await?;

    tracing::info!("shutting down server");
    handle.shutdown().await?;
    tracing::info!("server stopped cleanly");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_loaded_config() {
        let args = Args::parse_from([
            "cardroom-server",
            "--host",
            "0.0.0.0",
            "--port",
            "9090",
            "--database",
            "/tmp/cardroom.db",
            "--log-format",
            "json",
        ]);
        let mut config = ServerConfig::default();
        args.apply(&mut config);

        assert_eq!(config.host(), "0.0.0.0");
        assert_eq!(config.port(), 9090);
        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/cardroom.db")));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn absent_flags_leave_config_alone() {
        let args = Args::parse_from(["cardroom-server"]);
        let mut config = ServerConfig::default();
        args.apply(&mut config);
        assert_eq!(config, ServerConfig::default());
    }
}
