//! In-memory tree.
//!
//! Each filled entry keeps the packed little-endian byte image of every
//! leaf buffer, the way the legacy container hands values to its readers.

use thiserror::Error;

use super::{
    parse_leaflist, BranchBody, BranchDescriptor, LeafDescriptor, LeafListError, LeafShape,
    LeafType, LeafValue, TreeSource,
};

/// Errors raised by the in-memory tree and the dump loader.
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("invalid leaf list for branch '{branch}': {source}")]
    LeafList {
        branch: String,
        #[source]
        source: LeafListError,
    },

    #[error("branch '{0}' already exists")]
    DuplicateBranch(String),

    #[error("cannot add branch '{0}' after entries were filled")]
    BranchAfterFill(String),

    #[error("expected {expected} branch values, got {got}")]
    ValueCount { expected: usize, got: usize },

    #[error("value for branch '{branch}' does not match its leaves: {detail}")]
    ValueMismatch { branch: String, detail: String },

    #[error("no entry loaded")]
    NoEntryLoaded,

    #[error("entry {entry} out of range (tree has {count} entries)")]
    EntryOutOfRange { entry: u64, count: u64 },

    #[error("no leaf {leaf} in branch {branch}")]
    LeafIndex { branch: usize, leaf: usize },

    #[error("element {element} out of range for leaf {leaf} of branch {branch}")]
    ElementIndex {
        branch: usize,
        leaf: usize,
        element: usize,
    },

    #[error("leaf {leaf} of branch {branch} is not a character leaf")]
    NotCharacterLeaf { branch: usize, leaf: usize },

    #[error("dump entry {entry}: {detail}")]
    DumpEntry { entry: usize, detail: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The value written to one branch for one entry.
#[derive(Debug, Clone, PartialEq)]
pub enum BranchValue {
    Scalar(LeafValue),
    Array(Vec<LeafValue>),
    Text(String),
    /// One value per leaf of a leaf-list branch.
    Record(Vec<BranchValue>),
    /// Opaque payload of an object branch.
    Object(Vec<u8>),
}

impl BranchValue {
    pub fn array<T: Into<LeafValue>>(values: impl IntoIterator<Item = T>) -> Self {
        BranchValue::Array(values.into_iter().map(Into::into).collect())
    }

    pub fn record(values: impl IntoIterator<Item = BranchValue>) -> Self {
        BranchValue::Record(values.into_iter().collect())
    }

    fn kind_name(&self) -> &'static str {
        match self {
            BranchValue::Scalar(_) => "scalar",
            BranchValue::Array(_) => "array",
            BranchValue::Text(_) => "text",
            BranchValue::Record(_) => "record",
            BranchValue::Object(_) => "object",
        }
    }
}

macro_rules! branch_value_from_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for BranchValue {
                fn from(v: $ty) -> Self {
                    BranchValue::Scalar(v.into())
                }
            }
        )*
    };
}

branch_value_from_scalar!(bool, i8, u8, i16, u16, i32, u32, i64, u64, f32, f64);

impl From<LeafValue> for BranchValue {
    fn from(v: LeafValue) -> Self {
        BranchValue::Scalar(v)
    }
}

impl From<&str> for BranchValue {
    fn from(v: &str) -> Self {
        BranchValue::Text(v.to_string())
    }
}

/// Byte images of every leaf of one branch at one entry.
type BranchBuffers = Vec<Vec<u8>>;

/// A tree held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryTree {
    name: String,
    branches: Vec<BranchDescriptor>,
    entries: Vec<Vec<BranchBuffers>>,
    current: Option<usize>,
}

impl MemoryTree {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Declare a branch from a leaf-list descriptor, e.g. `branch("b", "a/I:b/I")`.
    pub fn branch(&mut self, name: &str, leaflist: &str) -> Result<&mut Self, TreeError> {
        let leaves = parse_leaflist(leaflist).map_err(|source| TreeError::LeafList {
            branch: name.to_string(),
            source,
        })?;
        self.add_branch(name, BranchBody::Leaves(leaves))
    }

    /// Declare a branch holding objects of the given class.
    pub fn object_branch(&mut self, name: &str, class_name: &str) -> Result<&mut Self, TreeError> {
        self.add_branch(
            name,
            BranchBody::Object {
                class_name: class_name.to_string(),
            },
        )
    }

    fn add_branch(&mut self, name: &str, body: BranchBody) -> Result<&mut Self, TreeError> {
        if !self.entries.is_empty() {
            return Err(TreeError::BranchAfterFill(name.to_string()));
        }
        if self.branches.iter().any(|b| b.name == name) {
            return Err(TreeError::DuplicateBranch(name.to_string()));
        }
        self.branches.push(BranchDescriptor {
            name: name.to_string(),
            body,
        });
        Ok(self)
    }

    /// Append one entry, given one value per branch in declaration order.
    pub fn fill(&mut self, values: Vec<BranchValue>) -> Result<(), TreeError> {
        if values.len() != self.branches.len() {
            return Err(TreeError::ValueCount {
                expected: self.branches.len(),
                got: values.len(),
            });
        }

        let entry = self
            .branches
            .iter()
            .zip(&values)
            .map(|(branch, value)| encode_branch(branch, value))
            .collect::<Result<Vec<_>, _>>()?;

        // Text buffers grow to the longest value seen.
        for (branch, buffers) in self.branches.iter_mut().zip(&entry) {
            if let BranchBody::Leaves(leaves) = &mut branch.body {
                for (leaf, buffer) in leaves.iter_mut().zip(buffers) {
                    if leaf.is_text() {
                        leaf.capacity = leaf.capacity.max(buffer.len());
                    }
                }
            }
        }

        self.entries.push(entry);
        Ok(())
    }

    fn leaf_buffer(&self, branch: usize, leaf: usize) -> Result<(&LeafDescriptor, &[u8]), TreeError> {
        let entry = self.current.ok_or(TreeError::NoEntryLoaded)?;
        let descriptor = self
            .branches
            .get(branch)
            .and_then(|b| b.leaves().get(leaf))
            .ok_or(TreeError::LeafIndex { branch, leaf })?;
        let buffer = self.entries[entry]
            .get(branch)
            .and_then(|b| b.get(leaf))
            .ok_or(TreeError::LeafIndex { branch, leaf })?;
        Ok((descriptor, buffer))
    }
}

fn encode_branch(branch: &BranchDescriptor, value: &BranchValue) -> Result<BranchBuffers, TreeError> {
    let mismatch = |detail: String| TreeError::ValueMismatch {
        branch: branch.name.clone(),
        detail,
    };

    match (&branch.body, value) {
        (BranchBody::Object { .. }, BranchValue::Object(bytes)) => Ok(vec![bytes.clone()]),
        (BranchBody::Object { class_name }, other) => Err(mismatch(format!(
            "expected {} object, got {}",
            class_name,
            other.kind_name()
        ))),
        (BranchBody::Leaves(leaves), BranchValue::Record(values)) if leaves.len() > 1 => {
            if values.len() != leaves.len() {
                return Err(mismatch(format!(
                    "expected {} leaf values, got {}",
                    leaves.len(),
                    values.len()
                )));
            }
            leaves
                .iter()
                .zip(values)
                .map(|(leaf, v)| encode_leaf(leaf, v).map_err(&mismatch))
                .collect()
        }
        (BranchBody::Leaves(leaves), other) if leaves.len() == 1 => {
            Ok(vec![encode_leaf(&leaves[0], other).map_err(mismatch)?])
        }
        (BranchBody::Leaves(leaves), other) => Err(mismatch(format!(
            "expected record of {} leaves, got {}",
            leaves.len(),
            other.kind_name()
        ))),
    }
}

fn encode_leaf(leaf: &LeafDescriptor, value: &BranchValue) -> Result<Vec<u8>, String> {
    let check = |v: &LeafValue| {
        if v.fits(leaf.leaf_type) {
            Ok(())
        } else {
            Err(format!(
                "leaf '{}' of type {} cannot hold {}",
                leaf.name,
                leaf.leaf_type,
                v.type_name()
            ))
        }
    };

    match (&leaf.shape, value) {
        (LeafShape::Scalar, BranchValue::Text(s)) if leaf.leaf_type == LeafType::Char => {
            let mut bytes = s.as_bytes().to_vec();
            bytes.push(0);
            Ok(bytes)
        }
        (LeafShape::Fixed(n), BranchValue::Text(s)) if leaf.leaf_type == LeafType::Char => {
            if s.len() > *n {
                return Err(format!(
                    "text of {} bytes does not fit leaf '{}' of {} characters",
                    s.len(),
                    leaf.name,
                    n
                ));
            }
            let mut bytes = s.as_bytes().to_vec();
            bytes.resize(*n, 0);
            Ok(bytes)
        }
        (LeafShape::Scalar, BranchValue::Scalar(v)) if leaf.leaf_type != LeafType::Char => {
            check(v)?;
            Ok(v.to_le_bytes())
        }
        (LeafShape::Fixed(n), BranchValue::Array(values)) => {
            if values.len() != *n {
                return Err(format!(
                    "leaf '{}' holds {} values, got {}",
                    leaf.name,
                    n,
                    values.len()
                ));
            }
            encode_elements(values, check)
        }
        (LeafShape::Counted(_), BranchValue::Array(values)) => encode_elements(values, check),
        (_, other) => Err(format!(
            "leaf '{}' ({}) cannot hold a {} value",
            leaf, leaf.leaf_type, other.kind_name()
        )),
    }
}

fn encode_elements(
    values: &[LeafValue],
    check: impl Fn(&LeafValue) -> Result<(), String>,
) -> Result<Vec<u8>, String> {
    let mut bytes = Vec::new();
    for v in values {
        check(v)?;
        bytes.extend(v.to_le_bytes());
    }
    Ok(bytes)
}

impl TreeSource for MemoryTree {
    type Error = TreeError;

    fn name(&self) -> &str {
        &self.name
    }

    fn branches(&self) -> &[BranchDescriptor] {
        &self.branches
    }

    fn entry_count(&self) -> u64 {
        self.entries.len() as u64
    }

    fn load_entry(&mut self, entry: u64) -> Result<(), TreeError> {
        let count = self.entry_count();
        if entry >= count {
            return Err(TreeError::EntryOutOfRange { entry, count });
        }
        self.current = Some(entry as usize);
        Ok(())
    }

    fn read_scalar(&self, branch: usize, leaf: usize, element: usize) -> Result<LeafValue, TreeError> {
        let (descriptor, buffer) = self.leaf_buffer(branch, leaf)?;
        let width = descriptor.leaf_type.width();
        let start = element * width;
        buffer
            .get(start..start + width)
            .and_then(|bytes| LeafValue::from_le_bytes(descriptor.leaf_type, bytes))
            .ok_or(TreeError::ElementIndex {
                branch,
                leaf,
                element,
            })
    }

    fn read_chars(&self, branch: usize, leaf: usize, max_len: usize) -> Result<&[u8], TreeError> {
        let (descriptor, buffer) = self.leaf_buffer(branch, leaf)?;
        if descriptor.leaf_type != LeafType::Char {
            return Err(TreeError::NotCharacterLeaf { branch, leaf });
        }
        Ok(&buffer[..buffer.len().min(max_len)])
    }
}
