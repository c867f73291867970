//! Entry transcoder: copies the current entry of a tree into a RowSink.
//!
//! The schema is compiled once into a flat list of read operations, so each
//! entry is a straight walk over the ops without any type lookups.

use thiserror::Error;

use crate::schema::{FieldKind, ImportSchema, PrimitiveKind};
use crate::sink::RowSink;
use crate::tree::{LeafValue, TreeSource};

/// Errors that can occur during transcoding.
#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("failed to read field '{field}': {detail}")]
    Source { field: String, detail: String },

    #[error("failed to write field '{field}': {detail}")]
    Sink { field: String, detail: String },

    /// The source disagrees with the schema built from it.
    #[error("field '{field}' does not match its schema: {detail}")]
    Invariant { field: String, detail: String },
}

/// How to read one target field from its branch.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ReadOp {
    Primitive(PrimitiveKind),
    Text { capacity: usize },
    FixedArray { element: PrimitiveKind, length: usize },
    /// `(leaf index, kind)` per sub-field, in declared order.
    Record(Vec<(usize, PrimitiveKind)>),
}

#[derive(Debug, Clone)]
struct CompiledField {
    name: String,
    branch: usize,
    op: ReadOp,
}

/// Pre-compiled per-entry copy plan for an `ImportSchema`.
#[derive(Debug, Clone)]
pub struct EntryTranscoder {
    fields: Vec<CompiledField>,
}

impl EntryTranscoder {
    pub fn compile(schema: &ImportSchema) -> Self {
        let fields = schema
            .fields()
            .iter()
            .map(|field| {
                let op = match &field.kind {
                    FieldKind::Primitive(kind) => ReadOp::Primitive(*kind),
                    FieldKind::Text { capacity } => ReadOp::Text {
                        capacity: *capacity,
                    },
                    FieldKind::FixedArray { element, length } => ReadOp::FixedArray {
                        element: *element,
                        length: *length,
                    },
                    FieldKind::Record(subs) => {
                        ReadOp::Record(subs.iter().map(|s| (s.leaf, s.kind)).collect())
                    }
                };
                CompiledField {
                    name: field.name.clone(),
                    branch: field.branch,
                    op,
                }
            })
            .collect();
        Self { fields }
    }

    /// Copy the entry the source is positioned at into one sink row.
    pub fn transcode_entry<S, K>(&self, source: &S, sink: &mut K) -> Result<(), TranscodeError>
    where
        S: TreeSource + ?Sized,
        K: RowSink,
        K::Error: std::fmt::Display,
    {
        for field in &self.fields {
            transcode_field(field, source, sink)?;
        }
        sink.finish_row().map_err(|e| TranscodeError::Sink {
            field: "<row>".into(),
            detail: e.to_string(),
        })
    }
}

fn transcode_field<S, K>(field: &CompiledField, source: &S, sink: &mut K) -> Result<(), TranscodeError>
where
    S: TreeSource + ?Sized,
    K: RowSink,
    K::Error: std::fmt::Display,
{
    let source_err = |e: S::Error| TranscodeError::Source {
        field: field.name.clone(),
        detail: e.to_string(),
    };
    let sink_err = |e: K::Error| TranscodeError::Sink {
        field: field.name.clone(),
        detail: e.to_string(),
    };

    match &field.op {
        ReadOp::Primitive(kind) => {
            let value = source.read_scalar(field.branch, 0, 0).map_err(source_err)?;
            push_primitive(&field.name, *kind, value, sink)
        }
        ReadOp::Text { capacity } => {
            let buffer = source
                .read_chars(field.branch, 0, *capacity)
                .map_err(source_err)?;
            let text = String::from_utf8_lossy(terminated(buffer));
            sink.push_string(&text).map_err(sink_err)
        }
        ReadOp::FixedArray {
            element: PrimitiveKind::Int8,
            length,
        } => {
            let mut values = Vec::with_capacity(*length);
            for i in 0..*length {
                match source.read_scalar(field.branch, 0, i).map_err(source_err)? {
                    LeafValue::Int8(v) => values.push(v),
                    other => return Err(mismatch(&field.name, PrimitiveKind::Int8, other)),
                }
            }
            sink.push_i8_array(&values).map_err(sink_err)
        }
        ReadOp::FixedArray { element, length } => {
            sink.enter_list(*length).map_err(sink_err)?;
            for i in 0..*length {
                let value = source.read_scalar(field.branch, 0, i).map_err(source_err)?;
                push_primitive(&field.name, *element, value, sink)?;
            }
            sink.exit_list().map_err(sink_err)
        }
        ReadOp::Record(subs) => {
            sink.enter_struct().map_err(sink_err)?;
            for (leaf, kind) in subs {
                let value = source.read_scalar(field.branch, *leaf, 0).map_err(source_err)?;
                push_primitive(&field.name, *kind, value, sink)?;
            }
            sink.exit_struct().map_err(sink_err)
        }
    }
}

/// Bytes before the first terminator, or the whole buffer if there is none.
pub fn terminated(buffer: &[u8]) -> &[u8] {
    match buffer.iter().position(|&b| b == 0) {
        Some(end) => &buffer[..end],
        None => buffer,
    }
}

/// Push a decoded value, which must match `kind` exactly.
fn push_primitive<K>(field: &str, kind: PrimitiveKind, value: LeafValue, sink: &mut K) -> Result<(), TranscodeError>
where
    K: RowSink,
    K::Error: std::fmt::Display,
{
    let result = match (kind, value) {
        (PrimitiveKind::Bool, LeafValue::Bool(v)) => sink.push_bool(v),
        (PrimitiveKind::Int8, LeafValue::Int8(v)) => sink.push_i8(v),
        (PrimitiveKind::Int16, LeafValue::Int16(v)) => sink.push_i16(v),
        (PrimitiveKind::Int32, LeafValue::Int32(v)) => sink.push_i32(v),
        (PrimitiveKind::Int64, LeafValue::Int64(v)) => sink.push_i64(v),
        (PrimitiveKind::UInt8, LeafValue::UInt8(v)) => sink.push_u8(v),
        (PrimitiveKind::UInt16, LeafValue::UInt16(v)) => sink.push_u16(v),
        (PrimitiveKind::UInt32, LeafValue::UInt32(v)) => sink.push_u32(v),
        (PrimitiveKind::UInt64, LeafValue::UInt64(v)) => sink.push_u64(v),
        (PrimitiveKind::Float32, LeafValue::Float32(v)) => sink.push_f32(v),
        (PrimitiveKind::Float64, LeafValue::Float64(v)) => sink.push_f64(v),
        (kind, other) => return Err(mismatch(field, kind, other)),
    };
    result.map_err(|e| TranscodeError::Sink {
        field: field.to_string(),
        detail: e.to_string(),
    })
}

fn mismatch(field: &str, kind: PrimitiveKind, value: LeafValue) -> TranscodeError {
    TranscodeError::Invariant {
        field: field.to_string(),
        detail: format!("expected {}, source returned {}", kind, value.type_name()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::AsArray;
    use arrow::record_batch::RecordBatch;
    use arrow::datatypes::{
        DataType, Field, Float32Type, Int32Type, Int8Type, Schema, UInt64Type,
    };

    use super::*;
    use crate::arrow::ArrowRowSink;
    use crate::schema::{build_schema, FieldSpec, SchemaOptions};
    use crate::tree::{BranchValue, MemoryTree};

    fn import_all(tree: &mut MemoryTree) -> RecordBatch {
        let schema = build_schema(tree, &SchemaOptions::default()).unwrap();
        let transcoder = EntryTranscoder::compile(&schema);
        let mut sink = ArrowRowSink::new(schema.to_arrow()).unwrap();
        for entry in 0..tree.entry_count() {
            tree.load_entry(entry).unwrap();
            transcoder.transcode_entry(tree, &mut sink).unwrap();
        }
        sink.finish().unwrap()
    }

    mod text {
        use super::*;

        #[test]
        fn test_terminated_scan() {
            assert_eq!(terminated(b"R\0"), b"R");
            assert_eq!(terminated(b"\0garbage"), b"");
            assert_eq!(terminated(b"ROOT"), b"ROOT");
            assert_eq!(terminated(b""), b"");
        }

        #[test]
        fn test_strings_across_entries() {
            let mut tree = MemoryTree::new("tree");
            tree.branch("myString", "myString/C").unwrap();
            for s in ["R", "", "ROOT RNTuple"] {
                tree.fill(vec![s.into()]).unwrap();
            }

            let batch = import_all(&mut tree);
            let strings = batch.column(0).as_string::<i32>();
            let values: Vec<&str> = (0..3).map(|i| strings.value(i)).collect();
            assert_eq!(values, vec!["R", "", "ROOT RNTuple"]);
        }

        #[test]
        fn test_scan_is_capped_at_capacity() {
            let mut tree = MemoryTree::new("tree");
            tree.branch("s", "s/C").unwrap();
            tree.fill(vec!["abc".into()]).unwrap();
            tree.load_entry(0).unwrap();

            let schema = ImportSchema::new(vec![FieldSpec {
                name: "s".into(),
                branch: 0,
                kind: FieldKind::Text { capacity: 2 },
            }]);
            let mut sink = ArrowRowSink::new(schema.to_arrow()).unwrap();
            EntryTranscoder::compile(&schema)
                .transcode_entry(&tree, &mut sink)
                .unwrap();
            let batch = sink.finish().unwrap();
            assert_eq!(batch.column(0).as_string::<i32>().value(0), "ab");
        }
    }

    mod shapes {
        use super::*;

        #[test]
        fn test_fixed_arrays_keep_order() {
            let mut tree = MemoryTree::new("tree");
            tree.branch("a", "a[1]/I").unwrap();
            tree.branch("b", "b[2]/I").unwrap();
            tree.branch("c", "c[4]/C").unwrap();
            tree.fill(vec![
                BranchValue::array([42i32]),
                BranchValue::array([1i32, 2]),
                BranchValue::array("ROOT".bytes().map(|b| b as i8)),
            ])
            .unwrap();

            let batch = import_all(&mut tree);
            let a = batch.column(0).as_fixed_size_list().value(0);
            assert_eq!(a.as_primitive::<Int32Type>().values().to_vec(), vec![42]);
            let b = batch.column(1).as_fixed_size_list().value(0);
            assert_eq!(b.as_primitive::<Int32Type>().values().to_vec(), vec![1, 2]);
            let c = batch.column(2).as_fixed_size_list().value(0);
            let chars: Vec<u8> = c
                .as_primitive::<Int8Type>()
                .values()
                .iter()
                .map(|&v| v as u8)
                .collect();
            assert_eq!(chars, b"ROOT".to_vec());
        }

        #[test]
        fn test_record_sub_fields_read_independently() {
            let mut tree = MemoryTree::new("tree");
            tree.branch("branch", "a/I:x/F:big/l").unwrap();
            tree.fill(vec![BranchValue::record([
                1i32.into(),
                2.5f32.into(),
                u64::MAX.into(),
            ])])
            .unwrap();

            let batch = import_all(&mut tree);
            let rec = batch.column(0).as_struct();
            assert_eq!(
                rec.column_by_name("a").unwrap().as_primitive::<Int32Type>().value(0),
                1
            );
            assert_eq!(
                rec.column_by_name("x").unwrap().as_primitive::<Float32Type>().value(0),
                2.5
            );
            assert_eq!(
                rec.column_by_name("big").unwrap().as_primitive::<UInt64Type>().value(0),
                u64::MAX
            );
        }
    }

    mod failures {
        use super::*;

        #[test]
        fn test_schema_source_disagreement_is_invariant_error() {
            let mut tree = MemoryTree::new("tree");
            tree.branch("x", "x/I").unwrap();
            tree.fill(vec![1i32.into()]).unwrap();
            tree.load_entry(0).unwrap();

            // Schema claims i64 for an i32 branch.
            let schema = ImportSchema::new(vec![FieldSpec {
                name: "x".into(),
                branch: 0,
                kind: FieldKind::Primitive(PrimitiveKind::Int64),
            }]);
            let arrow_schema = Arc::new(Schema::new(vec![Field::new("x", DataType::Int64, false)]));
            let mut sink = ArrowRowSink::new(arrow_schema).unwrap();
            let err = EntryTranscoder::compile(&schema)
                .transcode_entry(&tree, &mut sink)
                .unwrap_err();
            assert!(matches!(err, TranscodeError::Invariant { ref field, .. } if field == "x"));
        }

        #[test]
        fn test_unloaded_source_is_source_error() {
            let mut tree = MemoryTree::new("tree");
            tree.branch("x", "x/I").unwrap();
            tree.fill(vec![1i32.into()]).unwrap();

            let schema = build_schema(&tree, &SchemaOptions::default()).unwrap();
            let mut sink = ArrowRowSink::new(schema.to_arrow()).unwrap();
            let err = EntryTranscoder::compile(&schema)
                .transcode_entry(&tree, &mut sink)
                .unwrap_err();
            assert!(matches!(err, TranscodeError::Source { .. }));
        }
    }
}
