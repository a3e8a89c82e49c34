use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskPilotError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("No tracked task for execution context: {0}")]
    ContextNotFound(String),

    #[error("Dispatch failed: {0}")]
    Dispatch(String),

    #[error("Message delivery failed: {0}")]
    Delivery(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TaskPilotError>;
