//! Error types for the hashdice engine
//!
//! Component errors live next to their components (`SettlementError`,
//! `OracleError`); this module holds the storage and configuration errors
//! shared across the crate plus the root error used by the binaries.

use crate::oracle::OracleError;
use crate::settlement::SettlementError;

/// Root error type for process-level operations
#[derive(Debug, thiserror::Error)]
pub enum HashdiceError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Settlement error: {0}")]
    Settlement(#[from] SettlementError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration loading and validation errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required field: {0}")]
    MissingRequired(String),
}

/// Ledger storage errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    #[error("Database open failed: {0}")]
    DatabaseOpenFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Corrupted data: {0}")]
    CorruptedData(String),

    /// A row lock could not be acquired within the configured lock timeout
    #[error("Lock wait timed out: {0}")]
    LockTimeout(String),

    /// A uniqueness or non-negativity constraint would be violated
    #[error("Constraint violated: {0}")]
    ConstraintViolation(String),

    #[error("Commit failed: {0}")]
    CommitFailed(String),
}

impl StorageError {
    /// Classify a RocksDB error raised while reading or locking a row
    pub fn from_read(e: rocksdb::Error) -> Self {
        match e.kind() {
            rocksdb::ErrorKind::Busy | rocksdb::ErrorKind::TimedOut | rocksdb::ErrorKind::TryAgain => {
                StorageError::LockTimeout(e.to_string())
            }
            _ => StorageError::ReadFailed(e.to_string()),
        }
    }

    /// Classify a RocksDB error raised while writing a row
    pub fn from_write(e: rocksdb::Error) -> Self {
        match e.kind() {
            rocksdb::ErrorKind::Busy | rocksdb::ErrorKind::TimedOut | rocksdb::ErrorKind::TryAgain => {
                StorageError::LockTimeout(e.to_string())
            }
            _ => StorageError::WriteFailed(e.to_string()),
        }
    }
}

impl From<rocksdb::Error> for StorageError {
    fn from(e: rocksdb::Error) -> Self {
        StorageError::from_write(e)
    }
}

impl From<toml::de::Error> for ConfigurationError {
    fn from(e: toml::de::Error) -> Self {
        ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e))
    }
}

// Convenience type aliases for Results
pub type HashdiceResult<T> = Result<T, HashdiceError>;
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_error_display() {
        let config_error = ConfigurationError::LoadFailed("test".to_string());
        let root: HashdiceError = config_error.into();

        assert!(root.to_string().contains("Configuration error"));
        assert!(root.to_string().contains("test"));
    }

    #[test]
    fn test_invalid_value_details() {
        let error = ConfigurationError::InvalidValue {
            field: "engine.house_edge".to_string(),
            value: "1.5".to_string(),
            reason: "must be below 1".to_string(),
        };

        assert!(error.to_string().contains("engine.house_edge"));
        assert!(error.to_string().contains("'1.5'"));
    }

    #[test]
    fn test_storage_error_conversion() {
        let root: HashdiceError = StorageError::LockTimeout("balance".to_string()).into();

        match root {
            HashdiceError::Storage(StorageError::LockTimeout(_)) => {}
            other => panic!("Expected lock timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_error_source() {
        let root: HashdiceError = StorageError::ReadFailed("disk".to_string()).into();
        assert!(root.source().is_some());
    }
}
