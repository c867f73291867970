//! Import driver: tree in, committed store out.
//!
//! One import is a single sequential pass: build the schema, check that the
//! target name is free, create the store, transcode every entry, commit.
//! Any failure aborts the pass; the uncommitted store is discarded when its
//! writer is dropped.

use thiserror::Error;
use tracing::{debug, info};

use crate::arrow::{ArrowRowSink, SinkError};
use crate::output::{OutputError, StoreArtifact, StoreWriter};
use crate::schema::{build_schema, SchemaError, SchemaOptions};
use crate::transcoder::{EntryTranscoder, TranscodeError};
use crate::tree::TreeSource;

/// Metadata keys written with every store.
pub const SOURCE_KEY: &str = "treeimport.source";
pub const ENTRIES_KEY: &str = "treeimport.entries";
pub const VERSION_KEY: &str = "treeimport.version";

/// Errors that can occur during an import.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("store '{store}' already exists in {artifact}")]
    TargetAlreadyExists { store: String, artifact: String },

    #[error("failed to load entry {entry} of tree '{tree}': {detail}")]
    Source {
        tree: String,
        entry: u64,
        detail: String,
    },

    #[error("failed to transcode entry {entry}: {source}")]
    Transcode {
        entry: u64,
        #[source]
        source: TranscodeError,
    },

    #[error("failed to write store '{store}': {source}")]
    Output {
        store: String,
        #[source]
        source: OutputError,
    },

    #[error("Arrow sink error: {0}")]
    Sink(#[from] SinkError),
}

/// Coarse classification of an `ImportError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportErrorKind {
    UnsupportedBranchShape,
    InvalidBranchName,
    DuplicateField,
    TargetAlreadyExists,
    Source,
    Transcode,
    Output,
}

impl ImportError {
    pub fn kind(&self) -> ImportErrorKind {
        match self {
            ImportError::Schema(SchemaError::UnsupportedBranchShape { .. }) => {
                ImportErrorKind::UnsupportedBranchShape
            }
            ImportError::Schema(SchemaError::InvalidBranchName(_)) => {
                ImportErrorKind::InvalidBranchName
            }
            ImportError::Schema(SchemaError::DuplicateField(_)) => ImportErrorKind::DuplicateField,
            ImportError::TargetAlreadyExists { .. } => ImportErrorKind::TargetAlreadyExists,
            ImportError::Source { .. } => ImportErrorKind::Source,
            ImportError::Transcode { .. } | ImportError::Sink(_) => ImportErrorKind::Transcode,
            ImportError::Output { .. } => ImportErrorKind::Output,
        }
    }

    /// The branch or field the error is about, if any.
    pub fn branch(&self) -> Option<&str> {
        match self {
            ImportError::Schema(SchemaError::UnsupportedBranchShape { branch, .. }) => Some(branch),
            ImportError::Schema(SchemaError::InvalidBranchName(name))
            | ImportError::Schema(SchemaError::DuplicateField(name)) => Some(name),
            ImportError::Transcode { source, .. } => match source {
                TranscodeError::Source { field, .. }
                | TranscodeError::Sink { field, .. }
                | TranscodeError::Invariant { field, .. } => Some(field),
            },
            _ => None,
        }
    }
}

/// Where an importer is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportState {
    Uninitialized,
    SchemaBuilt,
    Importing,
    Committed,
    Failed,
}

/// Options for an import.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Target store name. Defaults to the tree name.
    pub store_name: Option<String>,
    /// Suppress progress reports.
    pub quiet: bool,
    /// Number of entries per record batch.
    pub batch_size: usize,
    /// Import only the first N entries.
    pub max_entries: Option<u64>,
    /// Replace `.` in branch names with `_` instead of rejecting them.
    pub convert_dots_in_branch_names: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            store_name: None,
            quiet: false,
            batch_size: 1000,
            max_entries: None,
            convert_dots_in_branch_names: false,
        }
    }
}

/// Receives progress after every flushed batch.
pub trait ProgressCallback {
    fn on_progress(&mut self, processed: u64, total: u64);
}

impl<F: FnMut(u64, u64)> ProgressCallback for F {
    fn on_progress(&mut self, processed: u64, total: u64) {
        self(processed, total)
    }
}

/// Writes `processed N / M entries` lines to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrProgress;

impl ProgressCallback for StderrProgress {
    fn on_progress(&mut self, processed: u64, total: u64) {
        eprintln!("processed {} / {} entries", processed, total);
    }
}

/// Summary of a committed import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportStats {
    pub store_name: String,
    pub entries: u64,
    pub fields: usize,
    pub batches: usize,
}

/// Imports one tree into one store of an artifact.
pub struct Importer<'a, S: TreeSource + ?Sized, A: StoreArtifact + ?Sized> {
    source: &'a mut S,
    artifact: &'a mut A,
    options: ImportOptions,
    progress: Option<Box<dyn ProgressCallback + 'a>>,
    state: ImportState,
}

impl<'a, S: TreeSource + ?Sized, A: StoreArtifact + ?Sized> Importer<'a, S, A> {
    pub fn new(source: &'a mut S, artifact: &'a mut A) -> Self {
        Self::with_options(source, artifact, ImportOptions::default())
    }

    pub fn with_options(source: &'a mut S, artifact: &'a mut A, options: ImportOptions) -> Self {
        Self {
            source,
            artifact,
            options,
            progress: Some(Box::new(StderrProgress)),
            state: ImportState::Uninitialized,
        }
    }

    pub fn set_store_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.options.store_name = Some(name.into());
        self
    }

    pub fn set_quiet(&mut self, quiet: bool) -> &mut Self {
        self.options.quiet = quiet;
        self
    }

    /// Replace the progress reporter. Ignored while quiet.
    pub fn set_progress_callback(&mut self, callback: impl ProgressCallback + 'a) -> &mut Self {
        self.progress = Some(Box::new(callback));
        self
    }

    pub fn options(&self) -> &ImportOptions {
        &self.options
    }

    pub fn state(&self) -> ImportState {
        self.state
    }

    /// Store name this importer writes to.
    pub fn store_name(&self) -> String {
        self.options
            .store_name
            .clone()
            .unwrap_or_else(|| self.source.name().to_string())
    }

    /// Run the import. May be called again after a previous run finished,
    /// for example with a different store name.
    pub fn import(&mut self) -> Result<ImportStats, ImportError> {
        self.state = ImportState::Uninitialized;
        let result = self.run();
        self.state = match &result {
            Ok(_) => ImportState::Committed,
            Err(_) => ImportState::Failed,
        };
        result
    }

    fn run(&mut self) -> Result<ImportStats, ImportError> {
        let store = self.store_name();
        let tree = self.source.name().to_string();

        let schema_options = SchemaOptions {
            convert_dots_in_branch_names: self.options.convert_dots_in_branch_names,
        };
        let schema = build_schema(&*self.source, &schema_options)?;
        self.state = ImportState::SchemaBuilt;

        let output_err = |source: OutputError| ImportError::Output {
            store: store.clone(),
            source,
        };
        let already_exists = || ImportError::TargetAlreadyExists {
            store: store.clone(),
            artifact: self.artifact.location().display().to_string(),
        };

        if self.artifact.has_store(&store).map_err(output_err)? {
            return Err(already_exists());
        }

        let total = match self.options.max_entries {
            Some(max) => self.source.entry_count().min(max),
            None => self.source.entry_count(),
        };
        let arrow_schema = schema.to_arrow();
        let metadata = vec![
            (SOURCE_KEY.to_string(), tree.clone()),
            (ENTRIES_KEY.to_string(), total.to_string()),
            (VERSION_KEY.to_string(), env!("CARGO_PKG_VERSION").to_string()),
        ];
        let artifact_location = self.artifact.location().display().to_string();
        let mut writer = self
            .artifact
            .create_store(&store, arrow_schema.clone(), &metadata)
            .map_err(|e| match e {
                OutputError::StoreExists(_) => ImportError::TargetAlreadyExists {
                    store: store.clone(),
                    artifact: artifact_location.clone(),
                },
                other => output_err(other),
            })?;
        self.state = ImportState::Importing;

        info!(tree = %tree, store = %store, entries = total, fields = schema.len(), "importing tree");

        let transcoder = EntryTranscoder::compile(&schema);
        let mut sink = ArrowRowSink::new(arrow_schema)?;
        let batch_size = self.options.batch_size.max(1);
        let mut batches = 0;

        for entry in 0..total {
            self.source
                .load_entry(entry)
                .map_err(|e| ImportError::Source {
                    tree: tree.clone(),
                    entry,
                    detail: e.to_string(),
                })?;
            transcoder
                .transcode_entry(&*self.source, &mut sink)
                .map_err(|source| ImportError::Transcode { entry, source })?;

            if sink.row_count() >= batch_size {
                self.flush(&mut sink, writer.as_mut(), &store)?;
                batches += 1;
                self.report(entry + 1, total);
            }
        }
        if sink.row_count() > 0 {
            self.flush(&mut sink, writer.as_mut(), &store)?;
            batches += 1;
            self.report(total, total);
        }

        writer.commit().map_err(|e| match e {
            OutputError::StoreExists(_) => ImportError::TargetAlreadyExists {
                store: store.clone(),
                artifact: artifact_location,
            },
            other => ImportError::Output {
                store: store.clone(),
                source: other,
            },
        })?;
        info!(store = %store, entries = total, batches, "committed store");

        Ok(ImportStats {
            store_name: store,
            entries: total,
            fields: schema.len(),
            batches,
        })
    }

    fn flush(
        &self,
        sink: &mut ArrowRowSink,
        writer: &mut dyn StoreWriter,
        store: &str,
    ) -> Result<(), ImportError> {
        let batch = sink.finish()?;
        debug!(store = %store, rows = batch.num_rows(), "flushing batch");
        writer
            .write_batch(&batch)
            .map_err(|source| ImportError::Output {
                store: store.to_string(),
                source,
            })
    }

    fn report(&mut self, processed: u64, total: u64) {
        if self.options.quiet {
            return;
        }
        if let Some(progress) = self.progress.as_mut() {
            progress.on_progress(processed, total);
        }
    }
}
