use serde_json::Value;
use thiserror::Error;

pub mod mock;
pub mod rest;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid store host: {0}")]
    InvalidHost(String),
    #[error("dns error: {0}")]
    Dns(String),
    #[error("connect error: {0}")]
    Connect(std::io::Error),
    #[error("io error: {0}")]
    Io(std::io::Error),
    #[error("http status {0} ({1})")]
    Http(u16, String),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Minimal surface of the remote status store.
pub trait CrowdStore {
    /// Idempotent overwrite of the value at `path`.
    fn set(&mut self, path: &str, value: &Value) -> Result<(), StoreError>;
    /// Append `value` under `path` with a store-generated key.
    fn push(&mut self, path: &str, value: &Value) -> Result<(), StoreError>;
}
