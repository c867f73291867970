use thiserror::Error;

use super::{LeafDescriptor, LeafShape, LeafType};

/// Errors that can occur while parsing a leaf-list descriptor.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LeafListError {
    #[error("empty leaf-list descriptor")]
    Empty,

    #[error("empty leaf name in '{0}'")]
    EmptyLeafName(String),

    #[error("invalid leaf type code '{code}' in '{leaf}'")]
    InvalidTypeCode { leaf: String, code: String },

    #[error("invalid array syntax: {0}")]
    InvalidArray(String),

    #[error("zero-length array: {0}")]
    ZeroLength(String),
}

/// Parse a leaf-list descriptor such as `a/I:b/I`, `c[4]/C` or `x[n]/F`.
///
/// Leaves are separated by `:`. Each leaf is `name[dims]/T` where `T` is a
/// one-character type code; a missing `/T` means `F`. Fixed dimensions are
/// multiplied together (`m[2][3]` holds 6 values); a non-numeric dimension
/// names the leaf that counts the values.
pub fn parse_leaflist(descriptor: &str) -> Result<Vec<LeafDescriptor>, LeafListError> {
    let descriptor = descriptor.trim();
    if descriptor.is_empty() {
        return Err(LeafListError::Empty);
    }

    descriptor.split(':').map(parse_leaf).collect()
}

fn parse_leaf(leaf: &str) -> Result<LeafDescriptor, LeafListError> {
    let (decl, code) = match leaf.split_once('/') {
        Some((decl, code)) => (decl, code),
        None => (leaf, "F"),
    };

    let mut chars = code.chars();
    let leaf_type = match (chars.next(), chars.next()) {
        (Some(c), None) => LeafType::from_code(c),
        _ => None,
    }
    .ok_or_else(|| LeafListError::InvalidTypeCode {
        leaf: leaf.to_string(),
        code: code.to_string(),
    })?;

    let (name, shape) = parse_dimensions(decl)?;
    if name.is_empty() {
        return Err(LeafListError::EmptyLeafName(leaf.to_string()));
    }

    Ok(LeafDescriptor::new(name, leaf_type, shape))
}

/// Split `name[d1][d2]...` into the name and its shape.
fn parse_dimensions(decl: &str) -> Result<(&str, LeafShape), LeafListError> {
    let Some(bracket_start) = decl.find('[') else {
        if decl.contains(']') {
            return Err(LeafListError::InvalidArray(decl.to_string()));
        }
        return Ok((decl, LeafShape::Scalar));
    };

    let name = &decl[..bracket_start];
    let mut rest = &decl[bracket_start..];
    let mut length = 1usize;
    let mut counter: Option<&str> = None;

    while !rest.is_empty() {
        let inner_end = match (rest.strip_prefix('['), rest.find(']')) {
            (Some(_), Some(end)) => end,
            _ => return Err(LeafListError::InvalidArray(decl.to_string())),
        };
        let inner = &rest[1..inner_end];
        rest = &rest[inner_end + 1..];

        if inner.is_empty() || inner.contains('[') {
            return Err(LeafListError::InvalidArray(decl.to_string()));
        }

        match inner.parse::<usize>() {
            Ok(0) => return Err(LeafListError::ZeroLength(decl.to_string())),
            Ok(n) => {
                length = length
                    .checked_mul(n)
                    .ok_or_else(|| LeafListError::InvalidArray(decl.to_string()))?;
            }
            Err(_) if counter.is_none() => counter = Some(inner),
            Err(_) => return Err(LeafListError::InvalidArray(decl.to_string())),
        }
    }

    let shape = match counter {
        Some(counter) => LeafShape::Counted(counter.to_string()),
        None => LeafShape::Fixed(length),
    };
    Ok((name, shape))
}
