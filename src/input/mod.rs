//! Read-back of committed stores.
//!
//! Used by the `inspect` command and by tests to check what an import
//! actually wrote.

pub mod parquet;

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, RecordBatch};
use arrow::datatypes::{DataType, Schema};
use thiserror::Error;

pub use self::parquet::{open_store, ParquetInput};

/// Errors that can occur during input operations.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] ::parquet::errors::ParquetError),

    #[error("store '{0}' not found")]
    StoreNotFound(String),

    #[error("column '{0}' not found")]
    ColumnNotFound(String),
}

/// A whole store loaded into memory.
#[derive(Debug, Clone)]
pub struct StoredTable {
    name: String,
    batch: RecordBatch,
    metadata: HashMap<String, String>,
}

impl StoredTable {
    pub(crate) fn new(name: String, batch: RecordBatch, metadata: HashMap<String, String>) -> Self {
        Self {
            name,
            batch,
            metadata,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> Arc<Schema> {
        self.batch.schema()
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    /// Key/value metadata stored with the file.
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Look up a column by name, or a record sub-field by dotted path
    /// (`branch.a`).
    pub fn column(&self, path: &str) -> Result<ArrayRef, InputError> {
        let not_found = || InputError::ColumnNotFound(path.to_string());
        let mut parts = path.split('.');
        let first = parts.next().ok_or_else(not_found)?;
        let mut column = self.batch.column_by_name(first).ok_or_else(not_found)?.clone();

        for part in parts {
            let child = match column.data_type() {
                DataType::Struct(_) => column.as_struct().column_by_name(part).cloned(),
                _ => None,
            };
            column = child.ok_or_else(not_found)?;
        }
        Ok(column)
    }
}

#[cfg(test)]
mod tests {
    use arrow::array::{Int32Array, StructArray};
    use arrow::datatypes::{Field, Fields, Int32Type};

    use super::*;

    fn table() -> StoredTable {
        let fields = Fields::from(vec![
            Field::new("a", DataType::Int32, false),
            Field::new("b", DataType::Int32, false),
        ]);
        let record = StructArray::new(
            fields.clone(),
            vec![
                Arc::new(Int32Array::from(vec![1])),
                Arc::new(Int32Array::from(vec![2])),
            ],
            None,
        );
        let schema = Arc::new(Schema::new(vec![
            Field::new("branch", DataType::Struct(fields), false),
            Field::new("x", DataType::Int32, false),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![Arc::new(record), Arc::new(Int32Array::from(vec![9]))],
        )
        .unwrap();
        StoredTable::new("tree".into(), batch, HashMap::new())
    }

    #[test]
    fn test_dotted_paths() {
        let table = table();
        let a = table.column("branch.a").unwrap();
        assert_eq!(a.as_primitive::<Int32Type>().value(0), 1);
        let b = table.column("branch.b").unwrap();
        assert_eq!(b.as_primitive::<Int32Type>().value(0), 2);
        assert_eq!(table.column("x").unwrap().len(), 1);
    }

    #[test]
    fn test_missing_columns() {
        let table = table();
        for path in ["y", "branch.c", "x.a", "branch.a.b"] {
            assert!(
                matches!(table.column(path), Err(InputError::ColumnNotFound(ref p)) if p == path),
                "{}",
                path
            );
        }
    }
}
