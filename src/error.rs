use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("configuration file not found in '{0}'")]
    NotFound(PathBuf),
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("unable to access security directory '{0}': {1}")]
    Directory(PathBuf, std::io::Error),
    #[error("'{0}' is missing and generating security information is disabled")]
    Missing(PathBuf),
    #[error("'{0}' has an invalid length")]
    Malformed(PathBuf),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failures reported by a [`Store`](crate::store::Store) implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document was modified concurrently")]
    Conflict,
    #[error("storage backend is unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Database(#[from] mongodb::error::Error),
    #[error(transparent)]
    BsonSer(#[from] bson::ser::Error),
    #[error(transparent)]
    BsonDe(#[from] bson::de::Error),
}

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment of {amount} {currency} was declined: {reason}")]
    Declined {
        amount: f64,
        currency: String,
        reason: String,
    },
    #[error("payment provider unavailable")]
    Unavailable,
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Security(#[from] SecurityError),
    #[error(transparent)]
    Store(#[from] StoreError),

    // External errors
    #[error(transparent)]
    Database(#[from] mongodb::error::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Cors(#[from] rocket_cors::Error),
}
