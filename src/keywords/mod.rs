//! MongoDB keywords for Robot Framework.
//!
//! Every keyword parses its JSON argument(s) right before a single driver call
//! and hands back what the driver returns.

pub mod args;
pub mod registry;

use async_trait::async_trait;
use bson::Document;
use futures::TryStreamExt;
use mongodb::options::IndexOptions;
use mongodb::IndexModel;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::database::connection::{is_valid_collection_name, is_valid_database_name};
use crate::database::{json as docs, Connection, DatabaseError};
use crate::embedded::{EmbeddedError, EmbeddedMongod};
use crate::error::LibraryError;
use crate::remote::protocol::RemoteLibrary;

pub use args::{ArgSpec, KeywordArgs};
pub use registry::KeywordSpec;

/// Keyword implementations plus the state they share: the connection holder
/// and the optional embedded server.
pub struct MongodbLibrary {
    config: AppConfig,
    connection: Connection,
    embedded: Option<EmbeddedMongod>,
}

impl MongodbLibrary {
    /// Connects to the configured default server and database
    pub fn new(config: AppConfig) -> Result<Self, LibraryError> {
        let mongo = &config.mongo;
        let connection = Connection::open(
            &mongo.host,
            mongo.port,
            &mongo.database,
            mongo.server_selection_timeout(),
        )
        .map_err(|e| LibraryError::connection(format!("{}:{}", mongo.host, mongo.port), e))?;

        Ok(Self {
            config,
            connection,
            embedded: None,
        })
    }

    /// A library with no connection; `connect_to_server` must run first
    pub fn disconnected(config: AppConfig) -> Self {
        Self {
            config,
            connection: Connection::disconnected(),
            embedded: None,
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn embedded_port(&self) -> Option<u16> {
        self.embedded.as_ref().map(EmbeddedMongod::port)
    }

    /// Run a keyword by (any style of) name with Robot Framework arguments
    pub async fn run_keyword(
        &mut self,
        name: &str,
        positional: Vec<Value>,
        named: BTreeMap<String, Value>,
    ) -> Result<Value, LibraryError> {
        let spec = registry::find(name).ok_or_else(|| LibraryError::UnknownKeyword(name.to_string()))?;
        let args = KeywordArgs::resolve(spec.name, spec.args, positional, named)?;
        debug!("Running keyword {}", args.keyword());

        let value = match spec.name {
            "connect_to_server" => {
                let port = args.port(1)?;
                self.connect_to_server(&args.string(0), port, &args.string(2)).await?;
                Value::Null
            }
            "disconnect_from_server" => {
                self.disconnect_from_server().await;
                Value::Null
            }
            "use_database" => {
                self.use_database(&args.string(0))?;
                Value::Null
            }
            "get_database_names" => json!(self.get_database_names().await?),
            "get_collection_names" => json!(self.get_collection_names().await?),
            "drop_database" => {
                self.drop_database(&args.string(0)).await?;
                Value::Null
            }
            "create_collection" => {
                self.create_collection(&args.string(0)).await?;
                Value::Null
            }
            "drop_collection" => {
                self.drop_collection(&args.string(0)).await?;
                Value::Null
            }
            "get_document_count" => json!(self.get_document_count(&args.string(0), &args.string(1)).await?),
            "insert_json_document_into_collection" => {
                json!(self.insert_json_document_into_collection(&args.string(0), &args.string(1)).await?)
            }
            "find_json_documents_in_collection" => {
                json!(self.find_json_documents_in_collection(&args.string(0), &args.string(1)).await?)
            }
            "find_one_json_document_in_collection" => {
                let found = self
                    .find_one_json_document_in_collection(&args.string(0), &args.string(1))
                    .await?;
                json!(found.unwrap_or_default())
            }
            "remove_json_documents_from_collection" => {
                json!(self.remove_json_documents_from_collection(&args.string(0), &args.string(1)).await?)
            }
            "ensure_index" => {
                json!(self.ensure_index(&args.string(0), &args.string(1), &args.string(2)).await?)
            }
            "get_index_names" => json!(self.get_index_names(&args.string(0)).await?),
            "drop_index" => {
                self.drop_index(&args.string(0), &args.string(1)).await?;
                Value::Null
            }
            "database_should_exist" => {
                self.database_should_exist(&args.string(0)).await?;
                Value::Null
            }
            "database_should_not_exist" => {
                self.database_should_not_exist(&args.string(0)).await?;
                Value::Null
            }
            "collection_should_exist" => {
                self.collection_should_exist(&args.string(0)).await?;
                Value::Null
            }
            "collection_should_not_exist" => {
                self.collection_should_not_exist(&args.string(0)).await?;
                Value::Null
            }
            "document_count_should_be" => {
                let expected = args.integer(1)?;
                self.document_count_should_be(&args.string(0), expected, &args.string(2))
                    .await?;
                Value::Null
            }
            "collection_should_contain_document" => {
                self.collection_should_contain_document(&args.string(0), &args.string(1))
                    .await?;
                Value::Null
            }
            "index_should_exist" => {
                self.index_should_exist(&args.string(0), &args.string(1)).await?;
                Value::Null
            }
            "start_embedded_mongodb" => json!(self.start_embedded_mongodb(args.optional_port(0)?).await?),
            "stop_embedded_mongodb" => {
                self.stop_embedded_mongodb().await?;
                Value::Null
            }
            _ => return Err(LibraryError::UnknownKeyword(name.to_string())),
        };

        Ok(value)
    }

    // ---- Connection and databases -------------------------------------

    pub async fn connect_to_server(&mut self, host: &str, port: u16, database: &str) -> Result<(), LibraryError> {
        let connection = Connection::open(host, port, database, self.config.mongo.server_selection_timeout())
            .map_err(|e| LibraryError::connection(format!("{}:{}", host, port), e))?;
        self.connection.close().await;
        self.connection = connection;
        Ok(())
    }

    pub async fn disconnect_from_server(&mut self) {
        self.connection.close().await;
    }

    pub fn use_database(&mut self, database: &str) -> Result<(), LibraryError> {
        self.connection.use_database(database)?;
        Ok(())
    }

    pub async fn get_database_names(&self) -> Result<Vec<String>, LibraryError> {
        let mut names = self.connection.client()?.list_database_names(None, None).await?;
        names.sort();
        Ok(names)
    }

    pub async fn get_collection_names(&self) -> Result<Vec<String>, LibraryError> {
        let mut names = self.connection.database()?.list_collection_names(None).await?;
        names.sort();
        Ok(names)
    }

    pub async fn drop_database(&self, database: &str) -> Result<(), LibraryError> {
        if !is_valid_database_name(database) {
            return Err(DatabaseError::InvalidDatabaseName(database.to_string()).into());
        }
        self.connection.client()?.database(database).drop(None).await?;
        info!("Dropped database {}", database);
        Ok(())
    }

    // ---- Collections ----------------------------------------------------

    pub async fn create_collection(&self, collection: &str) -> Result<(), LibraryError> {
        if !is_valid_collection_name(collection) {
            return Err(DatabaseError::InvalidCollectionName(collection.to_string()).into());
        }
        self.connection.database()?.create_collection(collection, None).await?;
        Ok(())
    }

    pub async fn drop_collection(&self, collection: &str) -> Result<(), LibraryError> {
        self.connection.collection(collection)?.drop(None).await?;
        Ok(())
    }

    pub async fn get_document_count(&self, collection: &str, query: &str) -> Result<u64, LibraryError> {
        let filter = docs::parse_filter(query)?;
        let count = self.connection.collection(collection)?.count_documents(filter, None).await?;
        Ok(count)
    }

    // ---- Documents ------------------------------------------------------

    /// Inserts a JSON document and returns its `_id`
    pub async fn insert_json_document_into_collection(
        &self,
        collection: &str,
        json: &str,
    ) -> Result<String, LibraryError> {
        let document = docs::parse_document(json)?;
        let result = self.connection.collection(collection)?.insert_one(document, None).await?;
        Ok(docs::bson_to_string(result.inserted_id))
    }

    pub async fn find_json_documents_in_collection(
        &self,
        collection: &str,
        query: &str,
    ) -> Result<Vec<String>, LibraryError> {
        let filter = docs::parse_filter(query)?;
        let cursor = self.connection.collection(collection)?.find(filter, None).await?;
        let documents: Vec<Document> = cursor.try_collect().await?;
        Ok(documents.into_iter().map(docs::document_to_string).collect())
    }

    pub async fn find_one_json_document_in_collection(
        &self,
        collection: &str,
        query: &str,
    ) -> Result<Option<String>, LibraryError> {
        let filter = docs::parse_filter(query)?;
        let found = self.connection.collection(collection)?.find_one(filter, None).await?;
        Ok(found.map(docs::document_to_string))
    }

    pub async fn remove_json_documents_from_collection(
        &self,
        collection: &str,
        query: &str,
    ) -> Result<u64, LibraryError> {
        let filter = docs::parse_filter(query)?;
        let result = self.connection.collection(collection)?.delete_many(filter, None).await?;
        Ok(result.deleted_count)
    }

    // ---- Indexes --------------------------------------------------------

    pub async fn ensure_index(&self, collection: &str, keys: &str, options: &str) -> Result<String, LibraryError> {
        let keys = docs::parse_document(keys)?;
        let options = docs::parse_filter(options)?;
        let options: Option<IndexOptions> = if options.is_empty() {
            None
        } else {
            Some(bson::from_document(options).map_err(DatabaseError::from)?)
        };

        let model = IndexModel::builder().keys(keys).options(options).build();
        let result = self.connection.collection(collection)?.create_index(model, None).await?;
        Ok(result.index_name)
    }

    pub async fn get_index_names(&self, collection: &str) -> Result<Vec<String>, LibraryError> {
        let names = self.connection.collection(collection)?.list_index_names().await?;
        Ok(names)
    }

    pub async fn drop_index(&self, collection: &str, index: &str) -> Result<(), LibraryError> {
        self.connection.collection(collection)?.drop_index(index, None).await?;
        Ok(())
    }

    // ---- Verification ---------------------------------------------------

    pub async fn database_should_exist(&self, database: &str) -> Result<(), LibraryError> {
        if !self.get_database_names().await?.iter().any(|n| n == database) {
            return Err(LibraryError::assertion(format!("Database '{}' does not exist", database)));
        }
        Ok(())
    }

    pub async fn database_should_not_exist(&self, database: &str) -> Result<(), LibraryError> {
        if self.get_database_names().await?.iter().any(|n| n == database) {
            return Err(LibraryError::assertion(format!("Database '{}' exists", database)));
        }
        Ok(())
    }

    pub async fn collection_should_exist(&self, collection: &str) -> Result<(), LibraryError> {
        if !self.get_collection_names().await?.iter().any(|n| n == collection) {
            return Err(LibraryError::assertion(format!(
                "Collection '{}' does not exist in database '{}'",
                collection,
                self.connection.database()?.name()
            )));
        }
        Ok(())
    }

    pub async fn collection_should_not_exist(&self, collection: &str) -> Result<(), LibraryError> {
        if self.get_collection_names().await?.iter().any(|n| n == collection) {
            return Err(LibraryError::assertion(format!(
                "Collection '{}' exists in database '{}'",
                collection,
                self.connection.database()?.name()
            )));
        }
        Ok(())
    }

    pub async fn document_count_should_be(
        &self,
        collection: &str,
        expected: i64,
        query: &str,
    ) -> Result<(), LibraryError> {
        let actual = self.get_document_count(collection, query).await?;
        if i64::try_from(actual).ok() != Some(expected) {
            return Err(LibraryError::assertion(format!(
                "Expected {} documents in collection '{}' but found {}",
                expected, collection, actual
            )));
        }
        Ok(())
    }

    pub async fn collection_should_contain_document(&self, collection: &str, query: &str) -> Result<(), LibraryError> {
        if self.find_one_json_document_in_collection(collection, query).await?.is_none() {
            return Err(LibraryError::assertion(format!(
                "Collection '{}' has no document matching {}",
                collection,
                query.trim()
            )));
        }
        Ok(())
    }

    pub async fn index_should_exist(&self, collection: &str, index: &str) -> Result<(), LibraryError> {
        if !self.get_index_names(collection).await?.iter().any(|n| n == index) {
            return Err(LibraryError::assertion(format!(
                "Collection '{}' has no index named '{}'",
                collection, index
            )));
        }
        Ok(())
    }

    // ---- Embedded server ------------------------------------------------

    pub async fn start_embedded_mongodb(&mut self, port: Option<u16>) -> Result<u16, LibraryError> {
        if let Some(running) = &self.embedded {
            return Err(EmbeddedError::AlreadyRunning(running.port()).into());
        }
        let mongod = EmbeddedMongod::start(&self.config.embedded, port).await?;
        let port = mongod.port();
        self.embedded = Some(mongod);
        Ok(port)
    }

    pub async fn stop_embedded_mongodb(&mut self) -> Result<(), LibraryError> {
        if let Some(mongod) = self.embedded.take() {
            mongod.stop().await?;
        }
        Ok(())
    }

    /// Release the client and any embedded server
    pub async fn shutdown(&mut self) -> Result<(), LibraryError> {
        self.connection.close().await;
        self.stop_embedded_mongodb().await
    }
}

/// The library as served remotely: one instance, keyword calls serialized.
pub struct SharedLibrary {
    inner: Mutex<MongodbLibrary>,
}

impl SharedLibrary {
    pub fn new(library: MongodbLibrary) -> Self {
        Self {
            inner: Mutex::new(library),
        }
    }
}

#[async_trait]
impl RemoteLibrary for SharedLibrary {
    fn keyword_names(&self) -> Vec<String> {
        registry::names()
    }

    fn keyword_arguments(&self, name: &str) -> Option<Vec<String>> {
        registry::find(name).map(KeywordSpec::signatures)
    }

    fn keyword_documentation(&self, name: &str) -> Option<String> {
        match name {
            "__intro__" => Some(registry::INTRO.to_string()),
            "__init__" => Some(registry::INIT_DOC.to_string()),
            _ => registry::find(name).map(|spec| spec.doc.to_string()),
        }
    }

    async fn run_keyword(
        &self,
        name: &str,
        positional: Vec<Value>,
        named: BTreeMap<String, Value>,
    ) -> Result<Value, LibraryError> {
        let mut library = self.inner.lock().await;
        library.run_keyword(name, positional, named).await
    }

    async fn shutdown(&self) -> Result<(), LibraryError> {
        self.inner.lock().await.shutdown().await
    }
}
