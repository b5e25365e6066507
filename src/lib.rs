// Library for the binary and tests

pub mod backends;
pub mod config;
pub mod error;
pub mod ingest;
pub mod models;
pub mod query;
pub mod routes;
