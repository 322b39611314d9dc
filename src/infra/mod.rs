//! Infrastructure adapters and runtime bootstrap.

pub mod db;
pub mod error;
pub mod files;
pub mod http_resolver;
pub mod manifest;
pub mod telemetry;
