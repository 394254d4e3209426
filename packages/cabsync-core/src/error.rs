use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("malformed document: {0}")]
    Format(String),
    #[error("decryption failed: {0}")]
    Decryption(String),
    #[error("password mismatch: {0}")]
    Authentication(String),
    #[error("integrity verification failed: {0}")]
    Integrity(String),
    #[error("invalid structure: {0}")]
    InvalidStructure(String),
    #[error("merge inconsistency: {0}")]
    MergeConsistency(String),
    #[error("transport error: {0}")]
    Transport(String),
}
