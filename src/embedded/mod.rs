//! Embedded MongoDB: a throwaway `mongod` process on a temporary data directory.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tempfile::TempDir;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use crate::config::EmbeddedConfig;

#[derive(Debug, Error)]
pub enum EmbeddedError {
    #[error("mongod binary not found: {0}")]
    BinaryNotFound(String),

    #[error("No free port available for embedded mongod")]
    NoFreePort,

    #[error("Embedded mongod is already running on port {0}")]
    AlreadyRunning(u16),

    #[error("Port {0} is already in use")]
    PortInUse(u16),

    #[error("Failed to create data directory: {0}")]
    DataDir(std::io::Error),

    #[error("Failed to spawn mongod: {0}")]
    Spawn(std::io::Error),

    #[error("mongod exited during startup with {0}")]
    ExitedEarly(std::process::ExitStatus),

    #[error("mongod did not accept connections on port {port} within {timeout:?}")]
    StartupTimeout { port: u16, timeout: Duration },

    #[error("Failed to stop mongod: {0}")]
    Stop(std::io::Error),
}

/// Handle to a running `mongod`. Dropping it kills the process and removes
/// the data directory.
#[derive(Debug)]
pub struct EmbeddedMongod {
    child: Child,
    port: u16,
    data_dir: TempDir,
}

impl EmbeddedMongod {
    /// Spawn `mongod` and wait until it accepts TCP connections.
    /// `port: None` picks a free port.
    pub async fn start(config: &EmbeddedConfig, port: Option<u16>) -> Result<Self, EmbeddedError> {
        let binary = locate_mongod(config.mongod_path.as_deref())?;
        let port = match port {
            Some(port) if !portpicker::is_free(port) => return Err(EmbeddedError::PortInUse(port)),
            Some(port) => port,
            None => portpicker::pick_unused_port().ok_or(EmbeddedError::NoFreePort)?,
        };
        let data_dir = tempfile::Builder::new()
            .prefix("robot-mongod-")
            .tempdir()
            .map_err(EmbeddedError::DataDir)?;

        let child = Command::new(&binary)
            .arg("--port")
            .arg(port.to_string())
            .arg("--dbpath")
            .arg(data_dir.path())
            .arg("--bind_ip")
            .arg(&config.bind_ip)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(EmbeddedError::Spawn)?;

        info!(
            "Spawned {} on port {} (data dir: {})",
            binary.display(),
            port,
            data_dir.path().display()
        );

        let mut mongod = Self { child, port, data_dir };
        mongod.wait_ready(&config.bind_ip, config.startup_timeout()).await?;
        info!("Embedded mongod ready on port {}", port);
        Ok(mongod)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    async fn wait_ready(&mut self, bind_ip: &str, timeout: Duration) -> Result<(), EmbeddedError> {
        let deadline = Instant::now() + timeout;
        let host = connect_host(bind_ip);
        loop {
            if let Ok(Some(status)) = self.child.try_wait() {
                return Err(EmbeddedError::ExitedEarly(status));
            }
            if TcpStream::connect((host, self.port)).await.is_ok() {
                // Only our own process counts as ready
                match self.child.try_wait() {
                    Ok(None) => return Ok(()),
                    Ok(Some(status)) => return Err(EmbeddedError::ExitedEarly(status)),
                    Err(e) => return Err(EmbeddedError::Spawn(e)),
                }
            }
            if Instant::now() > deadline {
                // Leave nothing behind on failure
                let _ = self.child.kill().await;
                return Err(EmbeddedError::StartupTimeout { port: self.port, timeout });
            }
            sleep(Duration::from_millis(100)).await;
        }
    }

    /// Kill the process, reap it and delete the data directory
    pub async fn stop(mut self) -> Result<(), EmbeddedError> {
        self.child.kill().await.map_err(EmbeddedError::Stop)?;
        info!("Stopped embedded mongod on port {}", self.port);
        if let Err(e) = self.data_dir.close() {
            warn!("Failed to remove embedded mongod data directory: {}", e);
        }
        Ok(())
    }
}

fn locate_mongod(configured: Option<&Path>) -> Result<PathBuf, EmbeddedError> {
    match configured {
        Some(path) if path.is_file() => Ok(path.to_path_buf()),
        Some(path) => Err(EmbeddedError::BinaryNotFound(path.display().to_string())),
        None => which::which("mongod").map_err(|e| EmbeddedError::BinaryNotFound(e.to_string())),
    }
}

/// Wildcard bind addresses are not connectable; probe loopback instead.
fn connect_host(bind_ip: &str) -> &str {
    match bind_ip {
        "0.0.0.0" | "" => "127.0.0.1",
        "::" => "::1",
        other => other.split(',').next().unwrap_or(other).trim(),
    }
}
