pub mod alert;
pub mod auth;
pub mod cli;
pub mod config;
pub mod env;
pub mod lifecycle;
pub mod metrics;
pub mod runner;
pub mod server;

use thiserror::Error;

pub use auth::AuthError;
pub use runner::ExecutionError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),
    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("Shutdown error: {0}")]
    Shutdown(String),
}

pub type Result<T> = std::result::Result<T, Error>;
