use std::collections::HashSet;

use tracing::debug;

use crate::tree::TreeSource;

use super::{map_branch, FieldSpec, ImportSchema, SchemaError};

/// Options that affect how branch names become field names.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaOptions {
    /// Replace `.` in branch names with `_` instead of rejecting the branch.
    pub convert_dots_in_branch_names: bool,
}

/// Walk every branch of the tree once and build the target schema.
///
/// Fails on the first branch that cannot be mapped; no partial schema is
/// ever returned.
pub fn build_schema<S: TreeSource + ?Sized>(
    source: &S,
    options: &SchemaOptions,
) -> Result<ImportSchema, SchemaError> {
    let mut fields: Vec<FieldSpec> = Vec::with_capacity(source.branches().len());
    let mut names: HashSet<String> = HashSet::new();

    for (index, branch) in source.branches().iter().enumerate() {
        let mut field = map_branch(branch, index)?;

        if field.name.contains('.') {
            if !options.convert_dots_in_branch_names {
                return Err(SchemaError::InvalidBranchName(branch.name.clone()));
            }
            field.name = field.name.replace('.', "_");
        }

        if !names.insert(field.name.clone()) {
            return Err(SchemaError::DuplicateField(field.name));
        }

        debug!(
            branch = %branch.name,
            leaves = %branch.title(),
            field = %field.name,
            kind = %field.kind,
            "mapped branch"
        );
        fields.push(field);
    }

    Ok(ImportSchema::new(fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldKind, PrimitiveKind};
    use crate::tree::MemoryTree;

    #[test]
    fn test_field_order_follows_branch_order() {
        let mut tree = MemoryTree::new("tree");
        tree.branch("z", "z/D").unwrap();
        tree.branch("a", "a/I").unwrap();
        tree.branch("m", "m/C").unwrap();

        let schema = build_schema(&tree, &SchemaOptions::default()).unwrap();
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["z", "a", "m"]);
        assert_eq!(schema.fields()[1].branch, 1);
        assert_eq!(
            schema.field("a").unwrap().kind,
            FieldKind::Primitive(PrimitiveKind::Int32)
        );
    }

    #[test]
    fn test_text_capacity_from_filled_entries() {
        let mut tree = MemoryTree::new("tree");
        tree.branch("s", "s/C").unwrap();
        tree.fill(vec!["ROOT RNTuple".into()]).unwrap();

        let schema = build_schema(&tree, &SchemaOptions::default()).unwrap();
        assert_eq!(schema.fields()[0].kind, FieldKind::Text { capacity: 13 });
    }

    #[test]
    fn test_first_unsupported_branch_aborts() {
        let mut tree = MemoryTree::new("tree");
        tree.branch("ok", "ok/I").unwrap();
        tree.branch("n", "n/I").unwrap();
        tree.branch("bad", "bad[n]/F").unwrap();
        tree.object_branch("obj", "Event").unwrap();

        let err = build_schema(&tree, &SchemaOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::UnsupportedBranchShape { ref branch, .. } if branch == "bad"
        ));
    }

    #[test]
    fn test_dotted_branch_names() {
        let mut tree = MemoryTree::new("tree");
        tree.branch("a.b", "b/I").unwrap();

        assert_eq!(
            build_schema(&tree, &SchemaOptions::default()),
            Err(SchemaError::InvalidBranchName("a.b".into()))
        );

        let options = SchemaOptions {
            convert_dots_in_branch_names: true,
        };
        let schema = build_schema(&tree, &options).unwrap();
        assert_eq!(schema.fields()[0].name, "a_b");
    }

    #[test]
    fn test_converted_name_collision() {
        let mut tree = MemoryTree::new("tree");
        tree.branch("a_b", "x/I").unwrap();
        tree.branch("a.b", "y/I").unwrap();

        let options = SchemaOptions {
            convert_dots_in_branch_names: true,
        };
        assert_eq!(
            build_schema(&tree, &options),
            Err(SchemaError::DuplicateField("a_b".into()))
        );
    }

    #[test]
    fn test_empty_tree() {
        let tree = MemoryTree::new("tree");
        let schema = build_schema(&tree, &SchemaOptions::default()).unwrap();
        assert!(schema.is_empty());
    }
}
