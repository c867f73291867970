//! Legacy branch-addressed tree model.
//!
//! A tree is an ordered collection of branches, each made of one or more
//! leaves. All branches are positioned jointly at one entry at a time; the
//! `TreeSource` trait is the read contract the importer relies on.

mod dump;
mod leaflist;
mod memory;

use std::fmt;

pub use dump::{BranchDump, TreeDump};
pub use leaflist::{parse_leaflist, LeafListError};
pub use memory::{BranchValue, MemoryTree, TreeError};

/// Leaf type codes of the legacy leaf-list notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LeafType {
    Bool,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    /// Character buffer. Null-terminated text unless a length is declared.
    Char,
    /// Platform `long`.
    Long,
    /// Platform `unsigned long`.
    ULong,
    /// Float stored with truncated mantissa on disk.
    Float16,
    /// Double stored as a truncated float on disk.
    Double32,
}

impl LeafType {
    /// Parse a single-character leaf type code (e.g. `I`, `l`, `C`).
    pub fn from_code(code: char) -> Option<LeafType> {
        match code {
            'O' => Some(LeafType::Bool),
            'B' => Some(LeafType::Int8),
            'b' => Some(LeafType::UInt8),
            'S' => Some(LeafType::Int16),
            's' => Some(LeafType::UInt16),
            'I' => Some(LeafType::Int32),
            'i' => Some(LeafType::UInt32),
            'L' => Some(LeafType::Int64),
            'l' => Some(LeafType::UInt64),
            'F' => Some(LeafType::Float32),
            'D' => Some(LeafType::Float64),
            'C' => Some(LeafType::Char),
            'G' => Some(LeafType::Long),
            'g' => Some(LeafType::ULong),
            'f' => Some(LeafType::Float16),
            'd' => Some(LeafType::Double32),
            _ => None,
        }
    }

    pub fn code(self) -> char {
        match self {
            LeafType::Bool => 'O',
            LeafType::Int8 => 'B',
            LeafType::UInt8 => 'b',
            LeafType::Int16 => 'S',
            LeafType::UInt16 => 's',
            LeafType::Int32 => 'I',
            LeafType::UInt32 => 'i',
            LeafType::Int64 => 'L',
            LeafType::UInt64 => 'l',
            LeafType::Float32 => 'F',
            LeafType::Float64 => 'D',
            LeafType::Char => 'C',
            LeafType::Long => 'G',
            LeafType::ULong => 'g',
            LeafType::Float16 => 'f',
            LeafType::Double32 => 'd',
        }
    }

    /// In-memory width of one element in bytes.
    pub fn width(self) -> usize {
        match self {
            LeafType::Bool | LeafType::Int8 | LeafType::UInt8 | LeafType::Char => 1,
            LeafType::Int16 | LeafType::UInt16 => 2,
            LeafType::Int32 | LeafType::UInt32 | LeafType::Float32 | LeafType::Float16 => 4,
            LeafType::Int64
            | LeafType::UInt64
            | LeafType::Float64
            | LeafType::Long
            | LeafType::ULong
            | LeafType::Double32 => 8,
        }
    }
}

impl fmt::Display for LeafType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Dimensionality of a leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeafShape {
    /// One value per entry.
    Scalar,
    /// A fixed number of values per entry (`x[4]/F`).
    Fixed(usize),
    /// A variable number of values, governed by another leaf (`x[n]/F`).
    Counted(String),
}

/// One leaf of a branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafDescriptor {
    pub name: String,
    pub leaf_type: LeafType,
    pub shape: LeafShape,
    /// Largest buffer (in bytes, terminator included) a text leaf has held.
    /// Zero for every other leaf.
    pub capacity: usize,
}

impl LeafDescriptor {
    pub fn new(name: impl Into<String>, leaf_type: LeafType, shape: LeafShape) -> Self {
        Self {
            name: name.into(),
            leaf_type,
            shape,
            capacity: 0,
        }
    }

    /// A character leaf without a declared length holds null-terminated text.
    pub fn is_text(&self) -> bool {
        self.leaf_type == LeafType::Char && self.shape == LeafShape::Scalar
    }
}

impl fmt::Display for LeafDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.shape {
            LeafShape::Scalar => write!(f, "{}/{}", self.name, self.leaf_type),
            LeafShape::Fixed(n) => write!(f, "{}[{}]/{}", self.name, n, self.leaf_type),
            LeafShape::Counted(c) => write!(f, "{}[{}]/{}", self.name, c, self.leaf_type),
        }
    }
}

/// What a branch is made of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchBody {
    /// Plain leaves declared through a leaf-list descriptor.
    Leaves(Vec<LeafDescriptor>),
    /// A nested object of the given class.
    Object { class_name: String },
}

/// A named column of the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchDescriptor {
    pub name: String,
    pub body: BranchBody,
}

impl BranchDescriptor {
    pub fn leaves(&self) -> &[LeafDescriptor] {
        match &self.body {
            BranchBody::Leaves(leaves) => leaves,
            BranchBody::Object { .. } => &[],
        }
    }

    /// The leaf-list descriptor string for this branch, e.g. `a/I:b/I`.
    pub fn title(&self) -> String {
        match &self.body {
            BranchBody::Leaves(leaves) => leaves
                .iter()
                .map(|l| l.to_string())
                .collect::<Vec<_>>()
                .join(":"),
            BranchBody::Object { class_name } => class_name.clone(),
        }
    }
}

/// A single decoded leaf element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LeafValue {
    Bool(bool),
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
}

impl LeafValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            LeafValue::Bool(_) => "bool",
            LeafValue::Int8(_) => "i8",
            LeafValue::UInt8(_) => "u8",
            LeafValue::Int16(_) => "i16",
            LeafValue::UInt16(_) => "u16",
            LeafValue::Int32(_) => "i32",
            LeafValue::UInt32(_) => "u32",
            LeafValue::Int64(_) => "i64",
            LeafValue::UInt64(_) => "u64",
            LeafValue::Float32(_) => "f32",
            LeafValue::Float64(_) => "f64",
        }
    }

    /// Whether a leaf of the given type stores values of this variant.
    pub fn fits(&self, leaf_type: LeafType) -> bool {
        matches!(
            (leaf_type, self),
            (LeafType::Bool, LeafValue::Bool(_))
                | (LeafType::Int8 | LeafType::Char, LeafValue::Int8(_))
                | (LeafType::UInt8, LeafValue::UInt8(_))
                | (LeafType::Int16, LeafValue::Int16(_))
                | (LeafType::UInt16, LeafValue::UInt16(_))
                | (LeafType::Int32, LeafValue::Int32(_))
                | (LeafType::UInt32, LeafValue::UInt32(_))
                | (LeafType::Int64 | LeafType::Long, LeafValue::Int64(_))
                | (LeafType::UInt64 | LeafType::ULong, LeafValue::UInt64(_))
                | (LeafType::Float32 | LeafType::Float16, LeafValue::Float32(_))
                | (LeafType::Float64 | LeafType::Double32, LeafValue::Float64(_))
        )
    }

    /// Little-endian byte image, as laid out in a branch buffer.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match *self {
            LeafValue::Bool(v) => vec![v as u8],
            LeafValue::Int8(v) => v.to_le_bytes().to_vec(),
            LeafValue::UInt8(v) => vec![v],
            LeafValue::Int16(v) => v.to_le_bytes().to_vec(),
            LeafValue::UInt16(v) => v.to_le_bytes().to_vec(),
            LeafValue::Int32(v) => v.to_le_bytes().to_vec(),
            LeafValue::UInt32(v) => v.to_le_bytes().to_vec(),
            LeafValue::Int64(v) => v.to_le_bytes().to_vec(),
            LeafValue::UInt64(v) => v.to_le_bytes().to_vec(),
            LeafValue::Float32(v) => v.to_le_bytes().to_vec(),
            LeafValue::Float64(v) => v.to_le_bytes().to_vec(),
        }
    }

    /// Decode one element of a leaf of type `leaf_type` from its byte image.
    /// `bytes` must hold exactly `leaf_type.width()` bytes.
    pub fn from_le_bytes(leaf_type: LeafType, bytes: &[u8]) -> Option<LeafValue> {
        if bytes.len() != leaf_type.width() {
            return None;
        }
        let value = match leaf_type {
            LeafType::Bool => LeafValue::Bool(bytes[0] != 0),
            LeafType::Int8 | LeafType::Char => LeafValue::Int8(bytes[0] as i8),
            LeafType::UInt8 => LeafValue::UInt8(bytes[0]),
            LeafType::Int16 => LeafValue::Int16(i16::from_le_bytes(bytes.try_into().ok()?)),
            LeafType::UInt16 => LeafValue::UInt16(u16::from_le_bytes(bytes.try_into().ok()?)),
            LeafType::Int32 => LeafValue::Int32(i32::from_le_bytes(bytes.try_into().ok()?)),
            LeafType::UInt32 => LeafValue::UInt32(u32::from_le_bytes(bytes.try_into().ok()?)),
            LeafType::Int64 | LeafType::Long => {
                LeafValue::Int64(i64::from_le_bytes(bytes.try_into().ok()?))
            }
            LeafType::UInt64 | LeafType::ULong => {
                LeafValue::UInt64(u64::from_le_bytes(bytes.try_into().ok()?))
            }
            LeafType::Float32 | LeafType::Float16 => {
                LeafValue::Float32(f32::from_le_bytes(bytes.try_into().ok()?))
            }
            LeafType::Float64 | LeafType::Double32 => {
                LeafValue::Float64(f64::from_le_bytes(bytes.try_into().ok()?))
            }
        };
        Some(value)
    }
}

macro_rules! leaf_value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for LeafValue {
                fn from(v: $ty) -> Self {
                    LeafValue::$variant(v)
                }
            }
        )*
    };
}

leaf_value_from! {
    bool => Bool,
    i8 => Int8,
    u8 => UInt8,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
}

/// Read contract of a legacy tree.
///
/// Values are only readable after `load_entry`; every branch is then
/// positioned at that entry and can be read any number of times until the
/// next `load_entry` overwrites the buffers.
pub trait TreeSource {
    type Error: fmt::Display;

    /// Name of the tree within its file.
    fn name(&self) -> &str;

    /// Branches in declaration order.
    fn branches(&self) -> &[BranchDescriptor];

    /// Number of entries in the tree.
    fn entry_count(&self) -> u64;

    /// Position all branches at the given 0-based entry.
    fn load_entry(&mut self, entry: u64) -> Result<(), Self::Error>;

    /// Read element `element` of leaf `leaf` of branch `branch` at the
    /// current entry. Scalar leaves have a single element 0.
    fn read_scalar(&self, branch: usize, leaf: usize, element: usize)
        -> Result<LeafValue, Self::Error>;

    /// Read at most `max_len` bytes of a character leaf at the current entry.
    fn read_chars(&self, branch: usize, leaf: usize, max_len: usize)
        -> Result<&[u8], Self::Error>;
}
