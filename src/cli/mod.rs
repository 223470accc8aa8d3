use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::AppConfig;
use crate::keywords::{MongodbLibrary, SharedLibrary};
use crate::remote::{server, RemoteServer};

pub const MESSAGE: &str = concat!("MongoDB Library v", env!("CARGO_PKG_VERSION"), " remote server started");

#[derive(Parser, Debug)]
#[command(name = "robot-mongodb-library")]
#[command(about = "Robot Framework remote server for the MongoDB keyword library")]
#[command(version)]
#[command(after_help = "Point Robot Framework at the server with:\n  Library    Remote    http://localhost:8270")]
pub struct Cli {
    #[arg(short, long, help = "Port to bind the remote server to [default: 8270]")]
    pub port: Option<u16>,

    #[arg(long, help = "Address to bind the remote server to [default: 0.0.0.0]")]
    pub host: Option<String>,

    #[arg(long, help = "MongoDB host for the initial connection [default: localhost]")]
    pub mongodb_host: Option<String>,

    #[arg(long, help = "MongoDB port for the initial connection [default: 27017]")]
    pub mongodb_port: Option<u16>,

    #[arg(long, help = "Database selected on startup [default: robotdb]")]
    pub database: Option<String>,

    #[arg(long, help = "Refuse stop_remote_server calls")]
    pub no_stop: bool,
}

impl Cli {
    /// Flags win over environment and defaults
    pub fn apply(&self, mut config: AppConfig) -> AppConfig {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(host) = &self.mongodb_host {
            config.mongo.host = host.clone();
        }
        if let Some(port) = self.mongodb_port {
            config.mongo.port = port;
        }
        if let Some(database) = &self.database {
            config.mongo.database = database.clone();
        }
        if self.no_stop {
            config.server.allow_stop = false;
        }
        config
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.apply(crate::config::config().clone());

    let library = MongodbLibrary::new(config.clone())?;
    let remote = Arc::new(RemoteServer::new(
        Arc::new(SharedLibrary::new(library)),
        config.server.allow_stop,
    ));

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind {}: {}", bind_addr, e))?;

    println!(
        "{} on port {} at {}",
        MESSAGE,
        config.server.port,
        chrono::Local::now().format("%m/%d/%Y %I:%M")
    );
    info!(
        "Serving keywords on {} (MongoDB {}:{}, database {})",
        bind_addr, config.mongo.host, config.mongo.port, config.mongo.database
    );

    server::serve(listener, remote, config.server.max_request_size_bytes).await
}
