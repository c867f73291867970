use crate::tree::{BranchBody, BranchDescriptor, LeafDescriptor, LeafShape, LeafType};

use super::{FieldKind, FieldSpec, PrimitiveKind, SchemaError, SubField};

/// Map one branch onto a target field.
///
/// | Branch | Field |
/// |---|---|
/// | scalar `O`, `B`..`l`, `F`, `D` | primitive of the same width and signedness |
/// | `name/C` | text, capped at the branch buffer capacity |
/// | `name[N]/C` | fixed array of `N` i8 |
/// | `name[N]/T` | fixed array of `N` primitives |
/// | `a/T:b/U:...` | record with one primitive per leaf |
///
/// Everything else is rejected with `UnsupportedBranchShape`.
pub fn map_branch(branch: &BranchDescriptor, index: usize) -> Result<FieldSpec, SchemaError> {
    let unsupported = |reason: String| SchemaError::UnsupportedBranchShape {
        branch: branch.name.clone(),
        reason,
    };

    let leaves = match &branch.body {
        BranchBody::Leaves(leaves) => leaves,
        BranchBody::Object { class_name } => {
            return Err(unsupported(format!("nested object of class '{}'", class_name)))
        }
    };

    let kind = match leaves.as_slice() {
        [] => return Err(unsupported("branch has no leaves".into())),
        [leaf] => map_single_leaf(leaf).map_err(unsupported)?,
        _ => map_leaf_list(leaves).map_err(unsupported)?,
    };

    Ok(FieldSpec {
        name: branch.name.clone(),
        branch: index,
        kind,
    })
}

fn map_single_leaf(leaf: &LeafDescriptor) -> Result<FieldKind, String> {
    match (&leaf.shape, leaf.leaf_type) {
        (LeafShape::Scalar, LeafType::Char) => Ok(FieldKind::Text {
            capacity: leaf.capacity,
        }),
        (LeafShape::Fixed(length), LeafType::Char) => Ok(FieldKind::FixedArray {
            element: PrimitiveKind::Int8,
            length: fixed_length(leaf, *length)?,
        }),
        (LeafShape::Scalar, leaf_type) => primitive_kind(leaf_type)
            .map(FieldKind::Primitive)
            .ok_or_else(|| unsupported_type(leaf)),
        (LeafShape::Fixed(length), leaf_type) => {
            let element = primitive_kind(leaf_type).ok_or_else(|| unsupported_type(leaf))?;
            Ok(FieldKind::FixedArray {
                element,
                length: fixed_length(leaf, *length)?,
            })
        }
        (LeafShape::Counted(counter), _) => Err(counted_array(leaf, counter)),
    }
}

fn map_leaf_list(leaves: &[LeafDescriptor]) -> Result<FieldKind, String> {
    let mut subs: Vec<SubField> = Vec::with_capacity(leaves.len());
    for (index, leaf) in leaves.iter().enumerate() {
        if let LeafShape::Counted(counter) = &leaf.shape {
            return Err(counted_array(leaf, counter));
        }
        if leaf.shape != LeafShape::Scalar {
            return Err(format!("leaf-list member '{}' is an array", leaf));
        }
        if leaf.leaf_type == LeafType::Char {
            return Err(format!("leaf-list member '{}' is a character buffer", leaf));
        }
        if leaf.name.contains('.') {
            return Err(format!("leaf name '{}' contains '.'", leaf.name));
        }
        if subs.iter().any(|s| s.name == leaf.name) {
            return Err(format!("leaf '{}' appears twice", leaf.name));
        }
        let kind = primitive_kind(leaf.leaf_type).ok_or_else(|| unsupported_type(leaf))?;
        subs.push(SubField {
            name: leaf.name.clone(),
            leaf: index,
            kind,
        });
    }
    Ok(FieldKind::Record(subs))
}

/// Fixed-size list lengths are `i32` on the Arrow side.
fn fixed_length(leaf: &LeafDescriptor, length: usize) -> Result<usize, String> {
    if length > i32::MAX as usize {
        return Err(format!(
            "array '{}' holds {} values, more than {}",
            leaf.name,
            length,
            i32::MAX
        ));
    }
    Ok(length)
}

fn primitive_kind(leaf_type: LeafType) -> Option<PrimitiveKind> {
    match leaf_type {
        LeafType::Bool => Some(PrimitiveKind::Bool),
        LeafType::Int8 => Some(PrimitiveKind::Int8),
        LeafType::UInt8 => Some(PrimitiveKind::UInt8),
        LeafType::Int16 => Some(PrimitiveKind::Int16),
        LeafType::UInt16 => Some(PrimitiveKind::UInt16),
        LeafType::Int32 => Some(PrimitiveKind::Int32),
        LeafType::UInt32 => Some(PrimitiveKind::UInt32),
        LeafType::Int64 => Some(PrimitiveKind::Int64),
        LeafType::UInt64 => Some(PrimitiveKind::UInt64),
        LeafType::Float32 => Some(PrimitiveKind::Float32),
        LeafType::Float64 => Some(PrimitiveKind::Float64),
        LeafType::Char
        | LeafType::Long
        | LeafType::ULong
        | LeafType::Float16
        | LeafType::Double32 => None,
    }
}

fn unsupported_type(leaf: &LeafDescriptor) -> String {
    format!("leaf type '{}' of '{}' has no target mapping", leaf.leaf_type, leaf)
}

fn counted_array(leaf: &LeafDescriptor, counter: &str) -> String {
    format!(
        "variable-length array '{}' counted by leaf '{}'",
        leaf.name, counter
    )
}
