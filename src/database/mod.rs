pub mod connection;
pub mod json;

pub use connection::{Connection, DatabaseError};
