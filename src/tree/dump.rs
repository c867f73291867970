//! JSON dumps of legacy trees.
//!
//! ```json
//! {
//!   "name": "tree",
//!   "branches": [
//!     { "name": "x", "leaflist": "x/I" },
//!     { "name": "point", "leaflist": "px/F:py/F" },
//!     { "name": "event", "class": "Event" }
//!   ],
//!   "entries": [
//!     { "x": 1, "point": { "px": 0.5, "py": 1.5 }, "event": {} }
//!   ]
//! }
//! ```

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};

use super::{
    BranchBody, BranchDescriptor, BranchValue, LeafDescriptor, LeafShape, LeafType, LeafValue,
    MemoryTree, TreeError, TreeSource,
};

/// A tree as stored in a JSON dump.
#[derive(Debug, Clone, Deserialize)]
pub struct TreeDump {
    pub name: String,
    #[serde(default)]
    pub branches: Vec<BranchDump>,
    #[serde(default)]
    pub entries: Vec<Map<String, Value>>,
}

/// A branch declaration in a JSON dump. Exactly one of `leaflist` and
/// `class` is expected.
#[derive(Debug, Clone, Deserialize)]
pub struct BranchDump {
    pub name: String,
    #[serde(default)]
    pub leaflist: Option<String>,
    #[serde(default)]
    pub class: Option<String>,
}

impl TreeDump {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, TreeError> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, TreeError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    /// Declare every branch and fill every entry into a `MemoryTree`.
    pub fn into_tree(self) -> Result<MemoryTree, TreeError> {
        let mut tree = MemoryTree::new(self.name);
        for branch in &self.branches {
            match (&branch.leaflist, &branch.class) {
                (Some(leaflist), None) => {
                    tree.branch(&branch.name, leaflist)?;
                }
                (None, Some(class)) => {
                    tree.object_branch(&branch.name, class)?;
                }
                _ => {
                    return Err(TreeError::ValueMismatch {
                        branch: branch.name.clone(),
                        detail: "declare exactly one of 'leaflist' and 'class'".into(),
                    })
                }
            }
        }

        let descriptors: Vec<BranchDescriptor> = tree.branches().to_vec();
        for (index, entry) in self.entries.iter().enumerate() {
            let values = descriptors
                .iter()
                .map(|branch| {
                    let json = entry.get(&branch.name).ok_or_else(|| TreeError::DumpEntry {
                        entry: index,
                        detail: format!("missing value for branch '{}'", branch.name),
                    })?;
                    branch_value(branch, json).map_err(|detail| TreeError::DumpEntry {
                        entry: index,
                        detail: format!("branch '{}': {}", branch.name, detail),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            tree.fill(values)?;
        }

        Ok(tree)
    }
}

fn branch_value(branch: &BranchDescriptor, json: &Value) -> Result<BranchValue, String> {
    match &branch.body {
        BranchBody::Object { .. } => serde_json::to_vec(json)
            .map(BranchValue::Object)
            .map_err(|e| e.to_string()),
        BranchBody::Leaves(leaves) if leaves.len() == 1 => leaf_value(&leaves[0], json),
        BranchBody::Leaves(leaves) => {
            let object = json
                .as_object()
                .ok_or_else(|| format!("expected an object with keys for {}", branch.title()))?;
            leaves
                .iter()
                .map(|leaf| {
                    let value = object
                        .get(&leaf.name)
                        .ok_or_else(|| format!("missing leaf '{}'", leaf.name))?;
                    leaf_value(leaf, value)
                })
                .collect::<Result<Vec<_>, _>>()
                .map(BranchValue::Record)
        }
    }
}

fn leaf_value(leaf: &LeafDescriptor, json: &Value) -> Result<BranchValue, String> {
    match (&leaf.shape, json) {
        (_, Value::String(s)) if leaf.leaf_type == LeafType::Char => Ok(BranchValue::Text(s.clone())),
        (LeafShape::Scalar, value) => scalar_value(leaf.leaf_type, value).map(BranchValue::Scalar),
        (LeafShape::Fixed(_) | LeafShape::Counted(_), Value::Array(items)) => items
            .iter()
            .map(|item| scalar_value(leaf.leaf_type, item))
            .collect::<Result<Vec<_>, _>>()
            .map(BranchValue::Array),
        (_, other) => Err(format!("leaf '{}' cannot be read from {}", leaf, other)),
    }
}

fn scalar_value(leaf_type: LeafType, json: &Value) -> Result<LeafValue, String> {
    let out_of_range = || format!("{} is not a valid {} value", json, leaf_type);

    fn signed<T: TryFrom<i64>>(json: &Value) -> Option<T> {
        json.as_i64().and_then(|v| T::try_from(v).ok())
    }

    fn unsigned<T: TryFrom<u64>>(json: &Value) -> Option<T> {
        json.as_u64().and_then(|v| T::try_from(v).ok())
    }

    let value = match leaf_type {
        LeafType::Bool => json.as_bool().map(LeafValue::Bool),
        LeafType::Int8 | LeafType::Char => signed::<i8>(json).map(LeafValue::Int8),
        LeafType::UInt8 => unsigned::<u8>(json).map(LeafValue::UInt8),
        LeafType::Int16 => signed::<i16>(json).map(LeafValue::Int16),
        LeafType::UInt16 => unsigned::<u16>(json).map(LeafValue::UInt16),
        LeafType::Int32 => signed::<i32>(json).map(LeafValue::Int32),
        LeafType::UInt32 => unsigned::<u32>(json).map(LeafValue::UInt32),
        LeafType::Int64 | LeafType::Long => json.as_i64().map(LeafValue::Int64),
        LeafType::UInt64 | LeafType::ULong => json.as_u64().map(LeafValue::UInt64),
        LeafType::Float32 | LeafType::Float16 => {
            json.as_f64().map(|v| LeafValue::Float32(v as f32))
        }
        LeafType::Float64 | LeafType::Double32 => json.as_f64().map(LeafValue::Float64),
    };
    value.ok_or_else(out_of_range)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = r#"{
        "name": "events",
        "branches": [
            { "name": "n", "leaflist": "n/I" },
            { "name": "label", "leaflist": "label/C" },
            { "name": "pos", "leaflist": "pos[3]/D" },
            { "name": "hit", "leaflist": "a/I:b/l" }
        ],
        "entries": [
            { "n": 1, "label": "first", "pos": [0.0, 1.0, 2.0], "hit": { "a": -1, "b": 2 } },
            { "n": 2, "label": "", "pos": [3.0, 4.0, 5.0], "hit": { "a": 3, "b": 4 } }
        ]
    }"#;

    #[test]
    fn test_load_dump() {
        let mut tree = TreeDump::from_reader(DUMP.as_bytes())
            .unwrap()
            .into_tree()
            .unwrap();

        assert_eq!(tree.name(), "events");
        assert_eq!(tree.branches().len(), 4);
        assert_eq!(tree.entry_count(), 2);

        tree.load_entry(0).unwrap();
        assert_eq!(tree.read_scalar(0, 0, 0).unwrap(), LeafValue::Int32(1));
        assert_eq!(tree.read_chars(1, 0, 16).unwrap(), b"first\0");
        assert_eq!(tree.read_scalar(2, 0, 2).unwrap(), LeafValue::Float64(2.0));
        assert_eq!(tree.read_scalar(3, 0, 0).unwrap(), LeafValue::Int32(-1));
        assert_eq!(tree.read_scalar(3, 1, 0).unwrap(), LeafValue::UInt64(2));
    }

    #[test]
    fn test_missing_branch_value() {
        let dump = r#"{
            "name": "t",
            "branches": [{ "name": "x", "leaflist": "x/I" }],
            "entries": [{}]
        }"#;
        let err = TreeDump::from_reader(dump.as_bytes())
            .unwrap()
            .into_tree()
            .unwrap_err();
        assert!(matches!(err, TreeError::DumpEntry { entry: 0, .. }));
    }

    #[test]
    fn test_out_of_range_value() {
        let dump = r#"{
            "name": "t",
            "branches": [{ "name": "x", "leaflist": "x/b" }],
            "entries": [{ "x": 300 }]
        }"#;
        let err = TreeDump::from_reader(dump.as_bytes())
            .unwrap()
            .into_tree()
            .unwrap_err();
        assert!(err.to_string().contains("not a valid b value"));
    }

    #[test]
    fn test_branch_needs_one_declaration() {
        let dump = r#"{ "name": "t", "branches": [{ "name": "x" }] }"#;
        assert!(TreeDump::from_reader(dump.as_bytes())
            .unwrap()
            .into_tree()
            .is_err());
    }

    #[test]
    fn test_empty_tree() {
        let tree = TreeDump::from_reader(r#"{ "name": "tree" }"#.as_bytes())
            .unwrap()
            .into_tree()
            .unwrap();
        assert!(tree.branches().is_empty());
        assert_eq!(tree.entry_count(), 0);
    }
}
