pub mod cli;
pub mod config;
pub mod database;
pub mod embedded;
pub mod error;
pub mod keywords;
pub mod remote;
