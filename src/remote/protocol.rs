//! Robot Framework remote library protocol on top of XML-RPC.

use async_trait::async_trait;
use dxr::{Fault, MethodCall, TryFromValue, Value};
use std::collections::{BTreeMap, HashMap};
use std::error::Error as _;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use super::xmlrpc::{self, Response, XmlRpcError};
use crate::error::LibraryError;

// Standard XML-RPC fault codes
pub const FAULT_PARSE_ERROR: i32 = -32700;
pub const FAULT_METHOD_NOT_FOUND: i32 = -32601;
pub const FAULT_INVALID_PARAMS: i32 = -32602;
pub const FAULT_SERVER_ERROR: i32 = -32500;

/// Protocol-level failures. Keyword failures never end up here; they are
/// reported as `status: FAIL` results.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error(transparent)]
    XmlRpc(#[from] XmlRpcError),

    #[error("Unknown method '{0}'")]
    UnknownMethod(String),

    #[error("Method '{method}' expects {expected}")]
    InvalidParams { method: String, expected: &'static str },

    #[error("Keyword '{0}' not found")]
    UnknownKeyword(String),

    #[error("Stopping the remote server is not allowed")]
    StopNotAllowed,
}

impl RemoteError {
    pub fn fault_code(&self) -> i32 {
        match self {
            RemoteError::XmlRpc(XmlRpcError::UnsupportedValue) => FAULT_INVALID_PARAMS,
            RemoteError::XmlRpc(_) => FAULT_PARSE_ERROR,
            RemoteError::UnknownMethod(_) => FAULT_METHOD_NOT_FOUND,
            RemoteError::InvalidParams { .. } | RemoteError::UnknownKeyword(_) => FAULT_INVALID_PARAMS,
            RemoteError::StopNotAllowed => FAULT_SERVER_ERROR,
        }
    }
}

/// A keyword library the remote server can expose
#[async_trait]
pub trait RemoteLibrary: Send + Sync {
    fn keyword_names(&self) -> Vec<String>;

    /// Argument specs in Robot Framework form, e.g. `query={}`
    fn keyword_arguments(&self, name: &str) -> Option<Vec<String>>;

    /// Also answers `__intro__` and `__init__`
    fn keyword_documentation(&self, name: &str) -> Option<String>;

    async fn run_keyword(
        &self,
        name: &str,
        positional: Vec<serde_json::Value>,
        named: BTreeMap<String, serde_json::Value>,
    ) -> Result<serde_json::Value, LibraryError>;

    /// Release resources before the server exits
    async fn shutdown(&self) -> Result<(), LibraryError> {
        Ok(())
    }
}

/// Dispatches remote protocol methods to a [`RemoteLibrary`]
pub struct RemoteServer {
    library: Arc<dyn RemoteLibrary>,
    allow_stop: bool,
    shutdown: Arc<Notify>,
}

impl RemoteServer {
    pub fn new(library: Arc<dyn RemoteLibrary>, allow_stop: bool) -> Self {
        Self {
            library,
            allow_stop,
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn library(&self) -> &Arc<dyn RemoteLibrary> {
        &self.library
    }

    /// Resolves once `stop_remote_server` has been called
    pub fn shutdown_signal(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Decode and dispatch one request body
    pub async fn handle_xml(&self, body: &str) -> Response {
        let call = match xmlrpc::parse_call(body) {
            Ok(call) => call,
            Err(e) => {
                warn!("Rejected malformed request: {}", e);
                return Err(Fault::new(FAULT_PARSE_ERROR, e.to_string()));
            }
        };
        self.dispatch(&call).await.map_err(|e| {
            warn!("Remote call failed: {}", e);
            Fault::new(e.fault_code(), e.to_string())
        })
    }

    pub async fn dispatch(&self, call: &MethodCall) -> Result<Value, RemoteError> {
        let method = call.name();
        debug!("Remote call {} ({} params)", method, call.params().len());
        let mut params = call.params().iter();

        match method {
            "get_keyword_names" => Ok(xmlrpc::strings(&self.library.keyword_names())),
            "run_keyword" => {
                let name = string_param(method, params.next())?;
                let args = match params.next() {
                    Some(value) => Vec::<Value>::try_from_value(value)
                        .map_err(|_| invalid(method, "an array of arguments"))?,
                    None => Vec::new(),
                };
                let kwargs = match params.next() {
                    Some(value) => HashMap::<String, Value>::try_from_value(value)
                        .map_err(|_| invalid(method, "a struct of named arguments"))?,
                    None => HashMap::new(),
                };
                self.run_keyword(&name, &args, &kwargs).await
            }
            "get_keyword_arguments" => {
                let name = string_param(method, params.next())?;
                self.library
                    .keyword_arguments(&name)
                    .map(|args| xmlrpc::strings(&args))
                    .ok_or(RemoteError::UnknownKeyword(name))
            }
            "get_keyword_documentation" => {
                let name = string_param(method, params.next())?;
                self.library
                    .keyword_documentation(&name)
                    .map(|doc| xmlrpc::string(&doc))
                    .ok_or(RemoteError::UnknownKeyword(name))
            }
            "get_keyword_tags" | "get_keyword_types" => {
                let name = string_param(method, params.next())?;
                match self.library.keyword_arguments(&name) {
                    Some(_) => Ok(xmlrpc::strings(&[])),
                    None => Err(RemoteError::UnknownKeyword(name)),
                }
            }
            "get_library_information" => Ok(self.library_information()),
            "stop_remote_server" => {
                if !self.allow_stop {
                    return Err(RemoteError::StopNotAllowed);
                }
                info!("Remote server stop requested");
                self.shutdown.notify_one();
                Ok(Value::boolean(true))
            }
            other => Err(RemoteError::UnknownMethod(other.to_string())),
        }
    }

    async fn run_keyword(
        &self,
        name: &str,
        args: &[Value],
        kwargs: &HashMap<String, Value>,
    ) -> Result<Value, RemoteError> {
        let positional = args.iter().map(xmlrpc::to_json).collect::<Result<Vec<_>, _>>()?;
        let mut named = BTreeMap::new();
        for (key, value) in kwargs {
            named.insert(key.clone(), xmlrpc::to_json(value)?);
        }

        let result = match self.library.run_keyword(name, positional, named).await {
            Ok(value) => {
                debug!("Keyword '{}' passed", name);
                xmlrpc::structure(vec![
                    ("status", xmlrpc::string("PASS")),
                    ("output", xmlrpc::string("")),
                    ("return", xmlrpc::from_json(&value)),
                ])
            }
            Err(e) => {
                info!("Keyword '{}' failed: {}", name, e);
                xmlrpc::structure(vec![
                    ("status", xmlrpc::string("FAIL")),
                    ("output", xmlrpc::string("")),
                    ("return", xmlrpc::string("")),
                    ("error", xmlrpc::string(&e.to_string())),
                    ("traceback", xmlrpc::string(&traceback(&e))),
                ])
            }
        };
        Ok(result)
    }

    fn library_information(&self) -> Value {
        let mut info = Vec::new();
        let names = self.library.keyword_names();
        for name in &names {
            let args = self.library.keyword_arguments(name).unwrap_or_default();
            let doc = self.library.keyword_documentation(name).unwrap_or_default();
            let entry = xmlrpc::structure(vec![
                ("args", xmlrpc::strings(&args)),
                ("doc", xmlrpc::string(&doc)),
                ("tags", xmlrpc::strings(&[])),
                ("types", xmlrpc::strings(&[])),
            ]);
            info.push((name.as_str(), entry));
        }
        for special in ["__intro__", "__init__"] {
            if let Some(doc) = self.library.keyword_documentation(special) {
                info.push((special, xmlrpc::structure(vec![("doc", xmlrpc::string(&doc))])));
            }
        }
        xmlrpc::structure(info)
    }
}

fn invalid(method: &str, expected: &'static str) -> RemoteError {
    RemoteError::InvalidParams {
        method: method.to_string(),
        expected,
    }
}

fn string_param(method: &str, param: Option<&Value>) -> Result<String, RemoteError> {
    param
        .and_then(|value| String::try_from_value(value).ok())
        .ok_or_else(|| invalid(method, "a keyword name"))
}

/// Error code followed by the cause chain, one per line
fn traceback(error: &LibraryError) -> String {
    let mut lines = vec![format!("{}: {}", error.error_code(), error)];
    let mut source = error.source();
    while let Some(cause) = source {
        lines.push(format!("Caused by: {}", cause));
        source = cause.source();
    }
    lines.join("\n")
}
