// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskdagError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Collection error: {0}")]
    Collection(String),

    #[error("Node not collected: no listener resolved descriptor {0}")]
    NodeNotCollected(String),

    #[error("Resolving dependencies failed: {0}")]
    ResolvingDependencies(String),

    #[error("Node not found after execution: {0}")]
    NodeNotFound(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Hook '{hook}' listener '{listener}' failed: {message}")]
    Hook {
        hook: String,
        listener: String,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TaskdagError>;
