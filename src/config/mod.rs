use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub mongo: MongoConfig,
    pub embedded: EmbeddedConfig,
}

/// Remote server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allow_stop: bool,
    pub max_request_size_bytes: usize,
}

/// Connection defaults used when a keyword omits host, port or database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub server_selection_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedConfig {
    pub mongod_path: Option<PathBuf>,
    pub bind_ip: String,
    pub startup_timeout_secs: u64,
}

pub const DEFAULT_SERVER_PORT: u16 = 8270;
pub const DEFAULT_MONGO_HOST: &str = "localhost";
pub const DEFAULT_MONGO_PORT: u16 = 27017;
pub const DEFAULT_DATABASE: &str = "robotdb";

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: DEFAULT_SERVER_PORT,
                allow_stop: true,
                max_request_size_bytes: 10 * 1024 * 1024, // 10MB
            },
            mongo: MongoConfig {
                host: DEFAULT_MONGO_HOST.to_string(),
                port: DEFAULT_MONGO_PORT,
                database: DEFAULT_DATABASE.to_string(),
                server_selection_timeout_secs: 5,
            },
            embedded: EmbeddedConfig {
                mongod_path: None,
                bind_ip: "127.0.0.1".to_string(),
                startup_timeout_secs: 30,
            },
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Remote server overrides
        if let Ok(v) = env::var("ROBOT_MONGODB_SERVER_HOST") {
            self.server.host = v;
        }
        if let Ok(v) = env::var("ROBOT_MONGODB_SERVER_PORT") {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }
        if let Ok(v) = env::var("ROBOT_MONGODB_ALLOW_STOP") {
            self.server.allow_stop = v.parse().unwrap_or(self.server.allow_stop);
        }
        if let Ok(v) = env::var("ROBOT_MONGODB_MAX_REQUEST_BYTES") {
            self.server.max_request_size_bytes = v.parse().unwrap_or(self.server.max_request_size_bytes);
        }

        // Connection overrides
        if let Ok(v) = env::var("ROBOT_MONGODB_HOST") {
            self.mongo.host = v;
        }
        if let Ok(v) = env::var("ROBOT_MONGODB_PORT") {
            self.mongo.port = v.parse().unwrap_or(self.mongo.port);
        }
        if let Ok(v) = env::var("ROBOT_MONGODB_DATABASE") {
            self.mongo.database = v;
        }
        if let Ok(v) = env::var("ROBOT_MONGODB_SERVER_SELECTION_TIMEOUT_SECS") {
            self.mongo.server_selection_timeout_secs =
                v.parse().unwrap_or(self.mongo.server_selection_timeout_secs);
        }

        // Embedded mongod overrides
        if let Ok(v) = env::var("ROBOT_MONGODB_MONGOD_PATH") {
            self.embedded.mongod_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = env::var("ROBOT_MONGODB_EMBEDDED_BIND_IP") {
            self.embedded.bind_ip = v;
        }
        if let Ok(v) = env::var("ROBOT_MONGODB_EMBEDDED_STARTUP_TIMEOUT_SECS") {
            self.embedded.startup_timeout_secs = v.parse().unwrap_or(self.embedded.startup_timeout_secs);
        }

        self
    }
}

impl MongoConfig {
    pub fn server_selection_timeout(&self) -> Duration {
        Duration::from_secs(self.server_selection_timeout_secs)
    }
}

impl EmbeddedConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}
