//! Parquet artifact: a directory with one `<store>.parquet` file per store.
//!
//! Each writer streams into its own hidden `.<store>.<pid>-<seq>.parquet.partial`
//! file. Commit hard-links it to the store path, which fails instead of
//! replacing a store that appeared meanwhile.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arrow::array::RecordBatch;
use arrow::datatypes::Schema;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::metadata::KeyValue;
use parquet::file::properties::WriterProperties;
use tracing::{debug, warn};

use super::{validate_store_name, OutputError, StoreArtifact, StoreCompression, StoreWriter};

pub const STORE_EXTENSION: &str = "parquet";

static PARTIAL_SEQ: AtomicU64 = AtomicU64::new(0);

/// Directory of Parquet stores.
pub struct ParquetArtifact {
    dir: PathBuf,
    compression: StoreCompression,
}

impl ParquetArtifact {
    /// Open (or create) the artifact directory.
    pub fn new(path: &Path) -> Result<Self, OutputError> {
        fs::create_dir_all(path)?;

        Ok(Self {
            dir: path.to_path_buf(),
            compression: StoreCompression::default(),
        })
    }

    pub fn with_compression(mut self, compression: StoreCompression) -> Self {
        self.compression = compression;
        self
    }

    /// Path of the committed file for a store.
    pub fn store_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, STORE_EXTENSION))
    }

    /// A fresh partial path, distinct for every writer.
    fn partial_path(&self, name: &str) -> PathBuf {
        let seq = PARTIAL_SEQ.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!(
            ".{}.{}-{}.{}.partial",
            name,
            process::id(),
            seq,
            STORE_EXTENSION
        ))
    }
}

impl StoreArtifact for ParquetArtifact {
    fn location(&self) -> &Path {
        &self.dir
    }

    fn has_store(&self, name: &str) -> Result<bool, OutputError> {
        validate_store_name(name)?;
        Ok(self.store_path(name).try_exists()?)
    }

    fn create_store(
        &mut self,
        name: &str,
        schema: Arc<Schema>,
        metadata: &[(String, String)],
    ) -> Result<Box<dyn StoreWriter>, OutputError> {
        if self.has_store(name)? {
            return Err(OutputError::StoreExists(name.to_string()));
        }

        let writer = ParquetStoreWriter::new(
            name,
            self.partial_path(name),
            self.store_path(name),
            schema,
            writer_properties(self.compression, metadata),
        )?;
        Ok(Box::new(writer))
    }
}

fn writer_properties(compression: StoreCompression, metadata: &[(String, String)]) -> WriterProperties {
    let compression = match compression {
        StoreCompression::Zstd => Compression::ZSTD(ZstdLevel::default()),
        StoreCompression::Snappy => Compression::SNAPPY,
        StoreCompression::None => Compression::UNCOMPRESSED,
    };
    let key_values = metadata
        .iter()
        .map(|(k, v)| KeyValue::new(k.clone(), v.clone()))
        .collect::<Vec<_>>();

    WriterProperties::builder()
        .set_compression(compression)
        .set_key_value_metadata(Some(key_values))
        .build()
}

/// Writer for a single store. Dropping it without `commit` removes the
/// partial file.
pub struct ParquetStoreWriter {
    name: String,
    partial: PathBuf,
    target: PathBuf,
    writer: Option<ArrowWriter<File>>,
    rows: usize,
}

impl ParquetStoreWriter {
    fn new(
        name: &str,
        partial: PathBuf,
        target: PathBuf,
        schema: Arc<Schema>,
        props: WriterProperties,
    ) -> Result<Self, OutputError> {
        let file = File::create(&partial)?;
        let mut this = Self {
            name: name.to_string(),
            partial,
            target,
            writer: None,
            rows: 0,
        };
        // Assigned after construction so a failing ArrowWriter still cleans
        // up the file just created.
        this.writer = Some(ArrowWriter::try_new(file, schema, Some(props))?);
        Ok(this)
    }
}

impl StoreWriter for ParquetStoreWriter {
    fn write_batch(&mut self, batch: &RecordBatch) -> Result<(), OutputError> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };
        // Zero-column batches carry no data; the row count lives in the
        // store metadata.
        if batch.num_columns() > 0 {
            writer.write(batch)?;
        }
        self.rows += batch.num_rows();
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> Result<(), OutputError> {
        if let Some(writer) = self.writer.take() {
            writer.close()?;
        }
        // Never replaces a store committed by a concurrent import.
        match fs::hard_link(&self.partial, &self.target) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(OutputError::StoreExists(self.name.clone()));
            }
            Err(e) => return Err(e.into()),
        }
        debug!(store = %self.name, rows = self.rows, path = %self.target.display(), "committed store");

        // The store is visible now; a leftover partial link is only litter.
        let partial = std::mem::take(&mut self.partial);
        if let Err(e) = fs::remove_file(&partial) {
            warn!(
                store = %self.name,
                path = %partial.display(),
                error = %e,
                "failed to remove partial store file"
            );
        }
        Ok(())
    }
}

impl Drop for ParquetStoreWriter {
    fn drop(&mut self) {
        if self.partial.as_os_str().is_empty() {
            return;
        }
        drop(self.writer.take());
        match fs::remove_file(&self.partial) {
            Ok(()) => debug!(store = %self.name, "discarded uncommitted store"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                store = %self.name,
                path = %self.partial.display(),
                error = %e,
                "failed to remove partial store file"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use arrow::array::Int32Array;
    use arrow::datatypes::{DataType, Field};
    use tempfile::tempdir;

    use super::*;

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::new(vec![Field::new("x", DataType::Int32, false)]))
    }

    fn batch(values: Vec<i32>) -> RecordBatch {
        RecordBatch::try_new(schema(), vec![Arc::new(Int32Array::from(values))]).unwrap()
    }

    fn visible_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_commit_makes_store_visible() {
        let dir = tempdir().unwrap();
        let mut artifact = ParquetArtifact::new(dir.path()).unwrap();

        let mut writer = artifact.create_store("tree", schema(), &[]).unwrap();
        writer.write_batch(&batch(vec![1, 2, 3])).unwrap();
        assert!(!artifact.has_store("tree").unwrap());
        let files = visible_files(dir.path());
        assert_eq!(files.len(), 1);
        assert!(files[0].starts_with(".tree."), "{}", files[0]);
        assert!(files[0].ends_with(".parquet.partial"), "{}", files[0]);

        writer.commit().unwrap();
        assert!(artifact.has_store("tree").unwrap());
        assert_eq!(visible_files(dir.path()), vec!["tree.parquet"]);
    }

    #[test]
    fn test_drop_without_commit_leaves_nothing() {
        let dir = tempdir().unwrap();
        let mut artifact = ParquetArtifact::new(dir.path()).unwrap();

        let mut writer = artifact.create_store("tree", schema(), &[]).unwrap();
        writer.write_batch(&batch(vec![1])).unwrap();
        drop(writer);

        assert!(!artifact.has_store("tree").unwrap());
        assert!(visible_files(dir.path()).is_empty());
    }

    #[test]
    fn test_existing_store_is_refused() {
        let dir = tempdir().unwrap();
        let mut artifact = ParquetArtifact::new(dir.path()).unwrap();
        artifact.create_store("tree", schema(), &[]).unwrap().commit().unwrap();
        let before = fs::read(artifact.store_path("tree")).unwrap();

        let err = artifact.create_store("tree", schema(), &[]).err().unwrap();
        assert!(matches!(err, OutputError::StoreExists(ref name) if name == "tree"));
        assert_eq!(fs::read(artifact.store_path("tree")).unwrap(), before);
    }

    mod concurrent {
        use super::*;

        #[test]
        fn test_writers_for_same_name_use_own_files() {
            let dir = tempdir().unwrap();
            let mut artifact = ParquetArtifact::new(dir.path()).unwrap();

            let mut first = artifact.create_store("tree", schema(), &[]).unwrap();
            let mut second = artifact.create_store("tree", schema(), &[]).unwrap();
            first.write_batch(&batch(vec![1, 2])).unwrap();
            second.write_batch(&batch(vec![3])).unwrap();
            assert_eq!(visible_files(dir.path()).len(), 2);

            drop(second);
            first.commit().unwrap();
            assert_eq!(visible_files(dir.path()), vec!["tree.parquet"]);
        }

        #[test]
        fn test_late_commit_keeps_first_store() {
            let dir = tempdir().unwrap();
            let mut artifact = ParquetArtifact::new(dir.path()).unwrap();

            let mut first = artifact.create_store("tree", schema(), &[]).unwrap();
            let mut second = artifact.create_store("tree", schema(), &[]).unwrap();
            first.write_batch(&batch(vec![1, 2])).unwrap();
            second.write_batch(&batch(vec![3, 4, 5])).unwrap();

            first.commit().unwrap();
            let committed = fs::read(artifact.store_path("tree")).unwrap();

            let err = second.commit().unwrap_err();
            assert!(matches!(err, OutputError::StoreExists(ref name) if name == "tree"));
            assert_eq!(fs::read(artifact.store_path("tree")).unwrap(), committed);
            assert_eq!(visible_files(dir.path()), vec!["tree.parquet"]);
        }
    }

    #[test]
    fn test_invalid_name() {
        let dir = tempdir().unwrap();
        let mut artifact = ParquetArtifact::new(dir.path()).unwrap();
        assert!(matches!(
            artifact.create_store("../escape", schema(), &[]).err().unwrap(),
            OutputError::InvalidStoreName(_)
        ));
    }

    #[test]
    fn test_each_compression_writes() {
        for compression in [StoreCompression::Zstd, StoreCompression::Snappy, StoreCompression::None] {
            let dir = tempdir().unwrap();
            let mut artifact = ParquetArtifact::new(dir.path())
                .unwrap()
                .with_compression(compression);
            let mut writer = artifact.create_store("tree", schema(), &[]).unwrap();
            writer.write_batch(&batch(vec![7; 100])).unwrap();
            writer.commit().unwrap();
            assert!(artifact.has_store("tree").unwrap());
        }
    }
}
