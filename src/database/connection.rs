use bson::Document;
use mongodb::options::{ClientOptions, ServerAddress};
use mongodb::{Client, Collection, Database};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Errors from the connection holder and document conversion
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Not connected to a MongoDB server")]
    NotConnected,

    #[error("Invalid database name: '{0}'")]
    InvalidDatabaseName(String),

    #[error("Invalid collection name: '{0}'")]
    InvalidCollectionName(String),

    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] json5::Error),

    #[error("Invalid extended JSON: {0}")]
    InvalidExtendedJson(String),

    #[error("JSON value is not a document: {0}")]
    NotADocument(String),

    #[error("Invalid index options: {0}")]
    InvalidIndexOptions(#[from] bson::de::Error),

    #[error(transparent)]
    Driver(#[from] mongodb::error::Error),
}

/// Client handle plus the currently selected database.
///
/// The last `use_database` call determines the target of every later
/// collection operation.
pub struct Connection {
    client: Option<Client>,
    database: Option<Database>,
    address: String,
}

impl Connection {
    /// Build a client for `host:port` and select `database`.
    ///
    /// No I/O happens here; the driver connects lazily on the first operation.
    pub fn open(
        host: &str,
        port: u16,
        database: &str,
        server_selection_timeout: Duration,
    ) -> Result<Self, DatabaseError> {
        if !is_valid_database_name(database) {
            return Err(DatabaseError::InvalidDatabaseName(database.to_string()));
        }

        let mut options = ClientOptions::default();
        options.hosts = vec![ServerAddress::Tcp {
            host: host.to_string(),
            port: Some(port),
        }];
        options.app_name = Some(env!("CARGO_PKG_NAME").to_string());
        options.server_selection_timeout = Some(server_selection_timeout);

        let client = Client::with_options(options)?;
        let db = client.database(database);
        let address = format!("{}:{}", host, port);

        info!("Opened MongoDB client for {} (database: {})", address, database);
        Ok(Self {
            client: Some(client),
            database: Some(db),
            address,
        })
    }

    /// A holder with no client; every operation fails with `NotConnected`.
    pub fn disconnected() -> Self {
        Self {
            client: None,
            database: None,
            address: String::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    pub fn client(&self) -> Result<&Client, DatabaseError> {
        self.client.as_ref().ok_or(DatabaseError::NotConnected)
    }

    pub fn database(&self) -> Result<&Database, DatabaseError> {
        self.database.as_ref().ok_or(DatabaseError::NotConnected)
    }

    pub fn use_database(&mut self, name: &str) -> Result<(), DatabaseError> {
        if !is_valid_database_name(name) {
            return Err(DatabaseError::InvalidDatabaseName(name.to_string()));
        }
        let db = self.client()?.database(name);
        self.database = Some(db);
        info!("Using database: {}", name);
        Ok(())
    }

    pub fn collection(&self, name: &str) -> Result<Collection<Document>, DatabaseError> {
        if !is_valid_collection_name(name) {
            return Err(DatabaseError::InvalidCollectionName(name.to_string()));
        }
        Ok(self.database()?.collection::<Document>(name))
    }

    /// Shut the client down and forget the selected database
    pub async fn close(&mut self) {
        self.database = None;
        if let Some(client) = self.client.take() {
            client.shutdown().await;
            info!("Closed MongoDB client for {}", self.address);
        }
    }
}

/// MongoDB rejects empty names and names containing any of `/\. "$` or NUL.
pub fn is_valid_database_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() < 64
        && !name
            .chars()
            .any(|c| matches!(c, '/' | '\\' | '.' | ' ' | '"' | '$' | '\0'))
}

pub fn is_valid_collection_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('$') && !name.contains('\0')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_database_names() {
        assert!(is_valid_database_name("robotdb"));
        assert!(is_valid_database_name("test_123-abc"));
        assert!(!is_valid_database_name(""));
        assert!(!is_valid_database_name("robot.db"));
        assert!(!is_valid_database_name("robot db"));
        assert!(!is_valid_database_name("$admin"));
        assert!(!is_valid_database_name(&"x".repeat(64)));
    }

    #[test]
    fn validates_collection_names() {
        assert!(is_valid_collection_name("testCol"));
        assert!(is_valid_collection_name("nested.collection"));
        assert!(!is_valid_collection_name(""));
        assert!(!is_valid_collection_name("bad$name"));
    }

    #[test]
    fn disconnected_holder_rejects_operations() {
        let mut conn = Connection::disconnected();
        assert!(!conn.is_connected());
        assert!(matches!(conn.database(), Err(DatabaseError::NotConnected)));
        assert!(matches!(conn.collection("testCol"), Err(DatabaseError::NotConnected)));
        assert!(matches!(conn.use_database("robotdb"), Err(DatabaseError::NotConnected)));
    }

    #[tokio::test]
    async fn open_selects_database_without_io() {
        let conn = Connection::open("localhost", 27017, "robotdb", Duration::from_secs(1)).unwrap();
        assert!(conn.is_connected());
        assert_eq!(conn.database().unwrap().name(), "robotdb");
    }

    #[tokio::test]
    async fn use_database_switches_target() {
        let mut conn = Connection::open("localhost", 27017, "robotdb", Duration::from_secs(1)).unwrap();
        conn.use_database("otherdb").unwrap();
        assert_eq!(conn.database().unwrap().name(), "otherdb");
        assert!(matches!(
            conn.use_database("bad.name"),
            Err(DatabaseError::InvalidDatabaseName(_))
        ));
        // A rejected name keeps the previous selection
        assert_eq!(conn.database().unwrap().name(), "otherdb");
    }
}
