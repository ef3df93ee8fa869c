use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Could not decode input: {0}")]
    Decode(String),

    #[error("main_user is required")]
    MissingMainUser,

    #[error("No valid messages found")]
    NoValidMessages,

    #[error("Profile {operation} failed for ({username}, {platform}, {main_user}): {reason}")]
    ProfileOperation {
        operation: &'static str,
        username: String,
        platform: String,
        main_user: String,
        reason: String,
    },

    #[error("Store operation '{operation}' failed for {key}: {reason}")]
    Store {
        operation: &'static str,
        key: String,
        reason: String,
    },

    #[error("Profile not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
