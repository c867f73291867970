//! Parquet artifact reader.

use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use arrow::compute::concat_batches;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use super::{InputError, StoredTable};
use crate::importer::ENTRIES_KEY;
use crate::output::parquet::STORE_EXTENSION;

/// Committed stores of a Parquet artifact directory.
pub struct ParquetInput {
    /// Map of store name to file path
    stores: HashMap<String, PathBuf>,
}

impl ParquetInput {
    /// Scan an artifact directory. Uncommitted (hidden) files are ignored.
    pub fn new(path: &Path) -> Result<Self, InputError> {
        let mut stores = HashMap::new();

        for entry in fs::read_dir(path)? {
            let file_path = entry?.path();
            let is_store = file_path
                .extension()
                .map(|e| e == STORE_EXTENSION)
                .unwrap_or(false);
            if !is_store {
                continue;
            }
            if let Some(stem) = file_path.file_stem() {
                let name = stem.to_string_lossy().to_string();
                if !name.starts_with('.') {
                    stores.insert(name, file_path);
                }
            }
        }

        Ok(Self { stores })
    }

    pub fn store_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.stores.keys().cloned().collect();
        names.sort();
        names
    }

    /// Load a whole store.
    pub fn open_store(&self, name: &str) -> Result<StoredTable, InputError> {
        let path = self
            .stores
            .get(name)
            .ok_or_else(|| InputError::StoreNotFound(name.to_string()))?;
        read_store(name, path)
    }
}

/// Load store `name` from the artifact at `dir`.
pub fn open_store(dir: &Path, name: &str) -> Result<StoredTable, InputError> {
    ParquetInput::new(dir)?.open_store(name)
}

fn read_store(name: &str, path: &Path) -> Result<StoredTable, InputError> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let schema = builder.schema().clone();

    let file_metadata = builder.metadata().file_metadata();
    let metadata: HashMap<String, String> = file_metadata
        .key_value_metadata()
        .map(|kvs| {
            kvs.iter()
                .filter_map(|kv| Some((kv.key.clone(), kv.value.clone()?)))
                .collect()
        })
        .unwrap_or_default();

    let reader = builder.with_batch_size(1000).build()?;
    let batches = reader.collect::<Result<Vec<_>, _>>()?;

    let batch = if schema.fields().is_empty() {
        // No columns were written; the row count only lives in metadata.
        let rows = metadata
            .get(ENTRIES_KEY)
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);
        RecordBatch::try_new_with_options(
            schema,
            vec![],
            &RecordBatchOptions::new().with_row_count(Some(rows)),
        )?
    } else {
        concat_batches(&schema, &batches)?
    };

    Ok(StoredTable::new(name.to_string(), batch, metadata))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{AsArray, Int32Array};
    use arrow::datatypes::{DataType, Field, Int32Type, Schema};
    use tempfile::tempdir;

    use super::*;
    use crate::output::{ParquetArtifact, StoreArtifact};

    #[test]
    fn test_read_back_multiple_batches() {
        let dir = tempdir().unwrap();
        let schema = Arc::new(Schema::new(vec![Field::new("x", DataType::Int32, false)]));
        let mut artifact = ParquetArtifact::new(dir.path()).unwrap();
        let mut writer = artifact
            .create_store("tree", schema.clone(), &[("k".into(), "v".into())])
            .unwrap();
        for chunk in [vec![1, 2], vec![3]] {
            let batch =
                RecordBatch::try_new(schema.clone(), vec![Arc::new(Int32Array::from(chunk))])
                    .unwrap();
            writer.write_batch(&batch).unwrap();
        }
        writer.commit().unwrap();

        let table = open_store(dir.path(), "tree").unwrap();
        assert_eq!(table.num_rows(), 3);
        assert_eq!(table.metadata("k"), Some("v"));
        let x = table.column("x").unwrap();
        assert_eq!(x.as_primitive::<Int32Type>().values().to_vec(), vec![1, 2, 3]);
    }

    #[test]
    fn test_partial_files_are_not_stores() {
        let dir = tempdir().unwrap();
        let schema = Arc::new(Schema::new(vec![Field::new("x", DataType::Int32, false)]));
        let mut artifact = ParquetArtifact::new(dir.path()).unwrap();
        let _pending = artifact.create_store("tree", schema, &[]).unwrap();

        let input = ParquetInput::new(dir.path()).unwrap();
        assert!(input.store_names().is_empty());
        assert!(matches!(
            input.open_store("tree"),
            Err(InputError::StoreNotFound(_))
        ));
    }
}
