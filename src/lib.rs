//! Import branch-addressed legacy trees into typed columnar stores.
//!
//! A tree's branches are mapped once onto a closed set of field kinds
//! (primitives, text, fixed arrays, records), then every entry is copied
//! into Arrow record batches and written to a Parquet store that only
//! becomes visible when the import commits.

pub mod arrow;
pub mod importer;
pub mod input;
pub mod output;
pub mod schema;
pub mod sink;
pub mod transcoder;
pub mod tree;

pub use crate::importer::{
    ImportError, ImportErrorKind, ImportOptions, ImportState, ImportStats, Importer,
    ProgressCallback, StderrProgress,
};
pub use crate::input::{open_store, InputError, StoredTable};
pub use crate::output::{OutputError, ParquetArtifact, StoreArtifact, StoreCompression};
pub use crate::schema::{build_schema, ImportSchema, SchemaError, SchemaOptions};
pub use crate::tree::{MemoryTree, TreeDump, TreeSource};
