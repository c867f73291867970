//! Target schema inferred from a tree's branches.
//!
//! The schema is a closed type system: every field is a primitive, a text
//! field, a fixed-size array of primitives, or a record of primitives. It
//! is built once before any entry is transcoded and never changes after.

mod builder;
mod mapper;

use std::fmt;
use std::sync::Arc;

use arrow::datatypes::{DataType, Field, FieldRef, Fields, Schema};
use thiserror::Error;

pub use builder::{build_schema, SchemaOptions};
pub use mapper::map_branch;

/// Errors that can occur while inferring the target schema.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("unsupported shape of branch '{branch}': {reason}")]
    UnsupportedBranchShape { branch: String, reason: String },

    #[error("duplicate field name '{0}'")]
    DuplicateField(String),

    #[error("branch name '{0}' contains '.', which is reserved for record sub-fields")]
    InvalidBranchName(String),
}

/// Fixed-width primitive kinds of the target store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
}

impl PrimitiveKind {
    pub fn to_arrow(self) -> DataType {
        match self {
            PrimitiveKind::Bool => DataType::Boolean,
            PrimitiveKind::Int8 => DataType::Int8,
            PrimitiveKind::Int16 => DataType::Int16,
            PrimitiveKind::Int32 => DataType::Int32,
            PrimitiveKind::Int64 => DataType::Int64,
            PrimitiveKind::UInt8 => DataType::UInt8,
            PrimitiveKind::UInt16 => DataType::UInt16,
            PrimitiveKind::UInt32 => DataType::UInt32,
            PrimitiveKind::UInt64 => DataType::UInt64,
            PrimitiveKind::Float32 => DataType::Float32,
            PrimitiveKind::Float64 => DataType::Float64,
        }
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PrimitiveKind::Bool => "bool",
            PrimitiveKind::Int8 => "i8",
            PrimitiveKind::Int16 => "i16",
            PrimitiveKind::Int32 => "i32",
            PrimitiveKind::Int64 => "i64",
            PrimitiveKind::UInt8 => "u8",
            PrimitiveKind::UInt16 => "u16",
            PrimitiveKind::UInt32 => "u32",
            PrimitiveKind::UInt64 => "u64",
            PrimitiveKind::Float32 => "f32",
            PrimitiveKind::Float64 => "f64",
        };
        write!(f, "{}", s)
    }
}

/// One sub-field of a record, backed by one leaf of a leaf-list branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubField {
    pub name: String,
    /// Leaf index within the branch.
    pub leaf: usize,
    pub kind: PrimitiveKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Primitive(PrimitiveKind),
    /// Null-terminated text; `capacity` caps the terminator scan.
    Text { capacity: usize },
    FixedArray { element: PrimitiveKind, length: usize },
    Record(Vec<SubField>),
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Primitive(p) => write!(f, "{}", p),
            FieldKind::Text { .. } => write!(f, "string"),
            FieldKind::FixedArray { element, length } => write!(f, "{}[{}]", element, length),
            FieldKind::Record(subs) => {
                let inner = subs
                    .iter()
                    .map(|s| format!("{}: {}", s.name, s.kind))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{{{}}}", inner)
            }
        }
    }
}

/// A top-level field of the target schema, backed by one branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    /// Branch index within the source tree.
    pub branch: usize,
    pub kind: FieldKind,
}

impl FieldSpec {
    /// Dotted paths of a record's sub-fields (`branch.a`, `branch.b`).
    /// Empty for every other kind.
    pub fn sub_field_paths(&self) -> Vec<String> {
        match &self.kind {
            FieldKind::Record(subs) => subs
                .iter()
                .map(|s| format!("{}.{}", self.name, s.name))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn to_arrow(&self) -> Field {
        Field::new(self.name.as_str(), field_data_type(&self.kind), false)
    }
}

/// Ordered, immutable set of target fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSchema {
    fields: Vec<FieldSpec>,
}

impl ImportSchema {
    pub(crate) fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn to_arrow(&self) -> Arc<Schema> {
        Arc::new(Schema::new(
            self.fields.iter().map(|f| f.to_arrow()).collect::<Vec<_>>(),
        ))
    }
}

/// Element field of a fixed-size list. Elements are never null.
pub fn list_item_field(element: DataType) -> FieldRef {
    Arc::new(Field::new("item", element, false))
}

fn field_data_type(kind: &FieldKind) -> DataType {
    match kind {
        FieldKind::Primitive(p) => p.to_arrow(),
        FieldKind::Text { .. } => DataType::Utf8,
        // The mapper bounds fixed lengths to i32.
        FieldKind::FixedArray { element, length } => {
            DataType::FixedSizeList(list_item_field(element.to_arrow()), *length as i32)
        }
        FieldKind::Record(subs) => DataType::Struct(Fields::from(
            subs.iter()
                .map(|s| Field::new(s.name.as_str(), s.kind.to_arrow(), false))
                .collect::<Vec<_>>(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_field() -> FieldSpec {
        FieldSpec {
            name: "branch".into(),
            branch: 0,
            kind: FieldKind::Record(vec![
                SubField {
                    name: "a".into(),
                    leaf: 0,
                    kind: PrimitiveKind::Int32,
                },
                SubField {
                    name: "b".into(),
                    leaf: 1,
                    kind: PrimitiveKind::Int32,
                },
            ]),
        }
    }

    #[test]
    fn test_arrow_types() {
        let schema = ImportSchema::new(vec![
            FieldSpec {
                name: "s".into(),
                branch: 0,
                kind: FieldKind::Text { capacity: 8 },
            },
            FieldSpec {
                name: "c".into(),
                branch: 1,
                kind: FieldKind::FixedArray {
                    element: PrimitiveKind::Int8,
                    length: 4,
                },
            },
            record_field(),
        ])
        .to_arrow();

        assert_eq!(schema.field(0).data_type(), &DataType::Utf8);
        assert_eq!(
            schema.field(1).data_type(),
            &DataType::FixedSizeList(list_item_field(DataType::Int8), 4)
        );
        match schema.field(2).data_type() {
            DataType::Struct(fields) => {
                assert_eq!(fields.len(), 2);
                assert_eq!(fields[0].name(), "a");
                assert_eq!(fields[1].data_type(), &DataType::Int32);
            }
            other => panic!("expected struct, got {:?}", other),
        }
        assert!(schema.fields().iter().all(|f| !f.is_nullable()));
    }

    #[test]
    fn test_sub_field_paths() {
        assert_eq!(record_field().sub_field_paths(), vec!["branch.a", "branch.b"]);
    }

    #[test]
    fn test_display() {
        assert_eq!(record_field().kind.to_string(), "{a: i32, b: i32}");
        let array = FieldKind::FixedArray {
            element: PrimitiveKind::Float32,
            length: 3,
        };
        assert_eq!(array.to_string(), "f32[3]");
    }

    #[test]
    fn test_empty_schema() {
        let schema = ImportSchema::default();
        assert!(schema.is_empty());
        assert_eq!(schema.to_arrow().fields().len(), 0);
    }
}
