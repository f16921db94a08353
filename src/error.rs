use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the popularity engine and its collaborators.
///
/// `Clone` so a single in-flight recomputation can hand the same failure to
/// every caller waiting on it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CakeRankError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Store read error: {0}")]
    StoreRead(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Recomputation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<mongodb::error::Error> for CakeRankError {
    fn from(err: mongodb::error::Error) -> Self {
        CakeRankError::StoreRead(err.to_string())
    }
}

impl From<mongodb::bson::oid::Error> for CakeRankError {
    fn from(err: mongodb::bson::oid::Error) -> Self {
        CakeRankError::Validation(format!("Invalid id: {}", err))
    }
}
