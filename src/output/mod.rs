//! Output artifacts that hold imported stores.
//!
//! An artifact is a container of named stores. A store only becomes visible
//! once its writer commits; a writer dropped before commit leaves no trace.

pub mod parquet;

use std::path::Path;
use std::sync::Arc;

use arrow::array::RecordBatch;
use arrow::datatypes::Schema;
use thiserror::Error;

pub use self::parquet::{ParquetArtifact, ParquetStoreWriter};

/// Errors that can occur during output operations.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] ::parquet::errors::ParquetError),

    #[error("store '{0}' already exists")]
    StoreExists(String),

    #[error("invalid store name '{0}'")]
    InvalidStoreName(String),
}

/// Page compression applied to stored columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StoreCompression {
    #[default]
    Zstd,
    Snappy,
    None,
}

/// Writer for a single store.
pub trait StoreWriter {
    /// Append a batch of rows. The batch schema must match the store schema.
    fn write_batch(&mut self, batch: &RecordBatch) -> Result<(), OutputError>;

    /// Make the store visible in its artifact.
    fn commit(self: Box<Self>) -> Result<(), OutputError>;
}

/// A container of named stores.
pub trait StoreArtifact {
    /// Where the artifact lives, for messages.
    fn location(&self) -> &Path;

    /// Whether a committed store of this name exists.
    fn has_store(&self, name: &str) -> Result<bool, OutputError>;

    /// Start writing a new store. Fails with `StoreExists` if a committed
    /// store of the same name is already present.
    fn create_store(
        &mut self,
        name: &str,
        schema: Arc<Schema>,
        metadata: &[(String, String)],
    ) -> Result<Box<dyn StoreWriter>, OutputError>;
}

/// Check that a store name can be used as a file stem.
pub fn validate_store_name(name: &str) -> Result<(), OutputError> {
    let invalid = name.is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\', '\0'])
        || name.chars().any(char::is_control);
    if invalid {
        return Err(OutputError::InvalidStoreName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_names() {
        for name in ["tree", "my_tree", "Events-2024", "tree v2"] {
            assert!(validate_store_name(name).is_ok(), "{}", name);
        }
        for name in ["", ".hidden", "..", "a/b", "a\\b", "nul\0"] {
            assert!(
                matches!(validate_store_name(name), Err(OutputError::InvalidStoreName(_))),
                "{:?}",
                name
            );
        }
    }
}
