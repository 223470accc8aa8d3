pub mod protocol;
pub mod server;
pub mod xmlrpc;

pub use protocol::{RemoteError, RemoteLibrary, RemoteServer};
pub use xmlrpc::{Response, XmlRpcError};
