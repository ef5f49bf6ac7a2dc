use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
  /// A caller bug, such as an answer quality outside 0..=5 or a malformed id.
  #[error("Invalid input: {0}")]
  InvalidInput(String),

  #[error("No card available to study")]
  NoCardAvailable,

  /// The stored revision differs and the write may not be merged.
  #[error("Document update conflict: {0}")]
  Conflict(String),

  #[error("Document not found: {0}")]
  NotFound(String),

  #[error("Storage unavailable: {0}")]
  StorageUnavailable(String),

  #[error("Operation cancelled")]
  Cancelled,

  #[error("Config error: {0}")]
  Config(String),

  #[error("Database error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("Serialization error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
}

impl Error {
  pub fn is_conflict(&self) -> bool {
    matches!(self, Self::Conflict(_))
  }

  pub fn is_not_found(&self) -> bool {
    matches!(self, Self::NotFound(_))
  }
}

pub type Result<T> = std::result::Result<T, Error>;
