use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::Operation;
use crate::error::SchemaBuildError;
use crate::schema_descriptor::{FieldDef, SchemaDescriptor, TypeDef, TypeKind, is_builtin_type};

pub type TypeMapper = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;
pub type RootFieldMapper = Arc<dyn Fn(Operation, &str) -> Option<String> + Send + Sync>;
pub type TypePredicate = Arc<dyn Fn(&TypeDef) -> bool + Send + Sync>;
pub type RootFieldPredicate = Arc<dyn Fn(Operation, &str) -> bool + Send + Sync>;
pub type FieldPredicate = Arc<dyn Fn(&str, &str) -> bool + Send + Sync>;

/// One declarative step over a subschema.
#[derive(Clone)]
pub enum Transform {
    /// Returns the new name, or `None` to keep the type as is.
    RenameTypes(TypeMapper),
    RenameRootFields(RootFieldMapper),
    /// Keeps the types the predicate accepts. Root types are always kept.
    FilterTypes(TypePredicate),
    FilterRootFields(RootFieldPredicate),
    FilterObjectFields(FieldPredicate),
    FilterInterfaceFields(FieldPredicate),
    /// Exposes `root_type.path[0]...path[n]` as `root_type.new_name`.
    HoistField {
        root_type: String,
        path: Vec<String>,
        new_name: String,
    },
    PruneOrphans,
}

impl Transform {
    pub fn rename_types<F>(mapper: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Transform::RenameTypes(Arc::new(mapper))
    }

    pub fn prefix_types(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Transform::rename_types(move |name| Some(format!("{prefix}{name}")))
    }

    pub fn rename_root_fields<F>(mapper: F) -> Self
    where
        F: Fn(Operation, &str) -> Option<String> + Send + Sync + 'static,
    {
        Transform::RenameRootFields(Arc::new(mapper))
    }

    pub fn filter_types<F>(keep: F) -> Self
    where
        F: Fn(&TypeDef) -> bool + Send + Sync + 'static,
    {
        Transform::FilterTypes(Arc::new(keep))
    }

    pub fn filter_root_fields<F>(keep: F) -> Self
    where
        F: Fn(Operation, &str) -> bool + Send + Sync + 'static,
    {
        Transform::FilterRootFields(Arc::new(keep))
    }

    pub fn filter_object_fields<F>(keep: F) -> Self
    where
        F: Fn(&str, &str) -> bool + Send + Sync + 'static,
    {
        Transform::FilterObjectFields(Arc::new(keep))
    }

    pub fn filter_interface_fields<F>(keep: F) -> Self
    where
        F: Fn(&str, &str) -> bool + Send + Sync + 'static,
    {
        Transform::FilterInterfaceFields(Arc::new(keep))
    }

    pub fn hoist_field(
        root_type: impl Into<String>,
        path: impl IntoIterator<Item = impl Into<String>>,
        new_name: impl Into<String>,
    ) -> Self {
        Transform::HoistField {
            root_type: root_type.into(),
            path: path.into_iter().map(Into::into).collect(),
            new_name: new_name.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Transform::RenameTypes(_) => "RenameTypes",
            Transform::RenameRootFields(_) => "RenameRootFields",
            Transform::FilterTypes(_) => "FilterTypes",
            Transform::FilterRootFields(_) => "FilterRootFields",
            Transform::FilterObjectFields(_) => "FilterObjectFields",
            Transform::FilterInterfaceFields(_) => "FilterInterfaceFields",
            Transform::HoistField { .. } => "HoistField",
            Transform::PruneOrphans => "PruneOrphans",
        }
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::HoistField {
                root_type,
                path,
                new_name,
            } => f
                .debug_struct("HoistField")
                .field("root_type", root_type)
                .field("path", path)
                .field("new_name", new_name)
                .finish(),
            other => f.write_str(other.kind()),
        }
    }
}

/// Ordered list of transforms. `prune_orphans` closes the pipeline.
#[derive(Clone, Debug, Default)]
pub struct TransformPipeline {
    transforms: Vec<Transform>,
}

impl TransformPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, transform: Transform) -> Self {
        self.transforms.push(transform);
        self
    }

    pub fn prune_orphans(mut self) -> Vec<Transform> {
        self.transforms.push(Transform::PruneOrphans);
        self.transforms
    }

    pub fn finish(self) -> Vec<Transform> {
        self.transforms
    }
}

/// A subschema after its transforms, with the bookkeeping needed to map
/// merged names back to the upstream.
#[derive(Clone, Debug, Default)]
pub struct TransformedSchema {
    pub descriptor: SchemaDescriptor,
    /// merged type name -> upstream type name, only for renamed types
    type_origins: BTreeMap<String, String>,
    root_field_origins: BTreeMap<(Operation, String), String>,
    /// root field -> upstream field path from the upstream root
    hoisted: BTreeMap<(Operation, String), Vec<String>>,
}

impl TransformedSchema {
    pub fn new(descriptor: SchemaDescriptor) -> Self {
        TransformedSchema {
            descriptor,
            ..Default::default()
        }
    }

    pub fn upstream_type_name<'a>(&'a self, merged: &'a str) -> &'a str {
        self.type_origins
            .get(merged)
            .map(String::as_str)
            .unwrap_or(merged)
    }

    /// Inverse of [`upstream_type_name`](Self::upstream_type_name); `None`
    /// when the upstream type did not survive the transforms.
    pub fn merged_type_name<'a>(&'a self, upstream: &'a str) -> Option<&'a str> {
        if let Some((merged, _)) = self
            .type_origins
            .iter()
            .find(|(_, origin)| origin.as_str() == upstream)
        {
            return Some(merged);
        }
        if self.type_origins.contains_key(upstream) || !self.descriptor.has_type(upstream) {
            return None;
        }
        Some(upstream)
    }

    pub fn upstream_root_field<'a>(&'a self, operation: Operation, field: &'a str) -> &'a str {
        self.root_field_origins
            .get(&(operation, field.to_string()))
            .map(String::as_str)
            .unwrap_or(field)
    }

    pub fn hoisted(&self, operation: Operation, field: &str) -> Option<&[String]> {
        self.hoisted
            .get(&(operation, field.to_string()))
            .map(Vec::as_slice)
    }

    /// Renames the query and mutation roots to `Query` and `Mutation`.
    pub(crate) fn canonicalize_roots(&mut self) -> Result<(), SchemaBuildError> {
        let mut renames = BTreeMap::new();
        for operation in [Operation::Query, Operation::Mutation] {
            let Some(current) = self.descriptor.root_type_name(operation) else {
                continue;
            };
            let canonical = operation.root_type_name();
            if current == canonical {
                continue;
            }
            if self.descriptor.types.contains_key(canonical) {
                return Err(SchemaBuildError::RenameCollision {
                    from: current.to_string(),
                    to: canonical.to_string(),
                });
            }
            renames.insert(current.to_string(), canonical.to_string());
        }
        self.rename(&renames);
        Ok(())
    }

    fn rename(&mut self, renames: &BTreeMap<String, String>) {
        let origins: Vec<(String, String)> = renames
            .iter()
            .map(|(from, to)| {
                let origin = self.type_origins.remove(from).unwrap_or_else(|| from.clone());
                (to.clone(), origin)
            })
            .collect();
        for (merged, origin) in origins {
            if merged != origin {
                self.type_origins.insert(merged, origin);
            }
        }
        self.descriptor.rename_types(renames);
    }

    fn forget_types(&mut self, removed: &BTreeSet<String>) {
        self.type_origins.retain(|merged, _| !removed.contains(merged));
    }

    fn forget_root_field(&mut self, operation: Operation, field: &str) {
        let key = (operation, field.to_string());
        self.root_field_origins.remove(&key);
        self.hoisted.remove(&key);
    }
}

/// Applies `transforms` left to right and validates the result.
pub fn apply_transforms(
    descriptor: SchemaDescriptor,
    transforms: &[Transform],
) -> Result<TransformedSchema, SchemaBuildError> {
    let mut schema = TransformedSchema::new(descriptor);
    let mut pruned = false;
    for transform in transforms {
        if pruned {
            return Err(SchemaBuildError::TransformOrder {
                transform: transform.kind(),
            });
        }
        match transform {
            Transform::RenameTypes(mapper) => rename_types(&mut schema, mapper.as_ref())?,
            Transform::RenameRootFields(mapper) => rename_root_fields(&mut schema, mapper.as_ref())?,
            Transform::FilterTypes(keep) => filter_types(&mut schema, keep.as_ref()),
            Transform::FilterRootFields(keep) => filter_root_fields(&mut schema, keep.as_ref()),
            Transform::FilterObjectFields(keep) => {
                filter_fields(&mut schema, TypeKind::Object, keep.as_ref())
            }
            Transform::FilterInterfaceFields(keep) => {
                filter_fields(&mut schema, TypeKind::Interface, keep.as_ref())
            }
            Transform::HoistField {
                root_type,
                path,
                new_name,
            } => hoist_field(&mut schema, root_type, path, new_name)?,
            Transform::PruneOrphans => {
                prune_orphans(&mut schema);
                pruned = true;
            }
        }
    }
    schema.descriptor.validate_references()?;
    Ok(schema)
}

fn rename_types(
    schema: &mut TransformedSchema,
    mapper: &(dyn Fn(&str) -> Option<String> + Send + Sync),
) -> Result<(), SchemaBuildError> {
    let renames: BTreeMap<String, String> = schema
        .descriptor
        .types
        .keys()
        .filter(|name| !is_builtin_type(name))
        .filter_map(|name| {
            mapper(name)
                .filter(|renamed| renamed != name)
                .map(|renamed| (name.clone(), renamed))
        })
        .collect();

    let mut targets = BTreeSet::new();
    for (from, to) in &renames {
        let occupied = is_builtin_type(to)
            || (schema.descriptor.types.contains_key(to) && !renames.contains_key(to));
        if occupied || !targets.insert(to.as_str()) {
            return Err(SchemaBuildError::RenameCollision {
                from: from.clone(),
                to: to.clone(),
            });
        }
    }
    schema.rename(&renames);
    Ok(())
}

fn rename_root_fields(
    schema: &mut TransformedSchema,
    mapper: &(dyn Fn(Operation, &str) -> Option<String> + Send + Sync),
) -> Result<(), SchemaBuildError> {
    for operation in [Operation::Query, Operation::Mutation] {
        let Some(root_name) = schema.descriptor.root_type_name(operation).map(str::to_string) else {
            continue;
        };
        let Some(root) = schema.descriptor.types.get_mut(&root_name) else {
            continue;
        };

        let renames: Vec<(String, String)> = root
            .fields
            .iter()
            .filter_map(|field| {
                mapper(operation, &field.name)
                    .filter(|renamed| renamed != &field.name)
                    .map(|renamed| (field.name.clone(), renamed))
            })
            .collect();
        let final_names: Vec<String> = root
            .fields
            .iter()
            .map(|field| {
                renames
                    .iter()
                    .find(|(from, _)| from == &field.name)
                    .map_or_else(|| field.name.clone(), |(_, to)| to.clone())
            })
            .collect();
        let unique: BTreeSet<&String> = final_names.iter().collect();
        if unique.len() != final_names.len() {
            let (from, to) = renames
                .iter()
                .find(|(_, to)| final_names.iter().filter(|name| *name == to).count() > 1)
                .cloned()
                .unwrap_or_default();
            return Err(SchemaBuildError::RenameCollision { from, to });
        }

        for field in &mut root.fields {
            if let Some((_, to)) = renames.iter().find(|(from, _)| from == &field.name) {
                field.name = to.clone();
            }
        }
        let mut moved = Vec::new();
        for (from, to) in renames {
            let key = (operation, from.clone());
            let origin = schema.root_field_origins.remove(&key).unwrap_or(from);
            let hoisted = schema.hoisted.remove(&key);
            moved.push((to, origin, hoisted));
        }
        for (to, origin, hoisted) in moved {
            if let Some(path) = hoisted {
                schema.hoisted.insert((operation, to.clone()), path);
            }
            if to != origin {
                schema.root_field_origins.insert((operation, to), origin);
            }
        }
    }
    Ok(())
}

fn filter_types(schema: &mut TransformedSchema, keep: &(dyn Fn(&TypeDef) -> bool + Send + Sync)) {
    let removed: BTreeSet<String> = schema
        .descriptor
        .types
        .values()
        .filter(|def| schema.descriptor.root_operation_of(&def.name).is_none() && !keep(def))
        .map(|def| def.name.clone())
        .collect();
    remove_root_fields_to(schema, &removed);
    schema.descriptor.remove_types(&removed);
    schema.forget_types(&removed);
}

/// Drops origin bookkeeping for root fields whose type is about to disappear.
fn remove_root_fields_to(schema: &mut TransformedSchema, removed: &BTreeSet<String>) {
    for operation in [Operation::Query, Operation::Mutation, Operation::Subscription] {
        let doomed: Vec<String> = schema
            .descriptor
            .root_type(operation)
            .map(|root| {
                root.fields
                    .iter()
                    .filter(|field| {
                        removed.contains(field.ty.name())
                            || field
                                .arguments
                                .iter()
                                .any(|argument| removed.contains(argument.ty.name()))
                    })
                    .map(|field| field.name.clone())
                    .collect()
            })
            .unwrap_or_default();
        for field in doomed {
            schema.forget_root_field(operation, &field);
        }
    }
}

fn filter_root_fields(
    schema: &mut TransformedSchema,
    keep: &(dyn Fn(Operation, &str) -> bool + Send + Sync),
) {
    let mut emptied = BTreeSet::new();
    for operation in [Operation::Query, Operation::Mutation, Operation::Subscription] {
        let Some(root_name) = schema.descriptor.root_type_name(operation).map(str::to_string) else {
            continue;
        };
        let Some(root) = schema.descriptor.types.get_mut(&root_name) else {
            continue;
        };
        let mut dropped = Vec::new();
        root.fields.retain(|field| {
            let kept = keep(operation, &field.name);
            if !kept {
                dropped.push(field.name.clone());
            }
            kept
        });
        if root.fields.is_empty() {
            emptied.insert(root_name);
        }
        for field in dropped {
            schema.forget_root_field(operation, &field);
        }
    }
    schema.descriptor.remove_types(&emptied);
    schema.forget_types(&emptied);
}

fn filter_fields(
    schema: &mut TransformedSchema,
    kind: TypeKind,
    keep: &(dyn Fn(&str, &str) -> bool + Send + Sync),
) {
    let roots: Vec<(Operation, String)> = [Operation::Query, Operation::Mutation, Operation::Subscription]
        .into_iter()
        .filter_map(|operation| {
            schema
                .descriptor
                .root_type_name(operation)
                .map(|name| (operation, name.to_string()))
        })
        .collect();
    let mut dropped_root_fields = Vec::new();
    for def in schema.descriptor.types.values_mut() {
        if def.kind != kind {
            continue;
        }
        let root = roots.iter().find(|(_, name)| name == &def.name).map(|(op, _)| *op);
        let type_name = def.name.clone();
        def.fields.retain(|field| {
            let kept = keep(&type_name, &field.name);
            if !kept {
                if let Some(operation) = root {
                    dropped_root_fields.push((operation, field.name.clone()));
                }
            }
            kept
        });
    }
    for (operation, field) in dropped_root_fields {
        schema.forget_root_field(operation, &field);
    }
}

fn hoist_field(
    schema: &mut TransformedSchema,
    root_type: &str,
    path: &[String],
    new_name: &str,
) -> Result<(), SchemaBuildError> {
    let invalid = |reason: &str| SchemaBuildError::InvalidHoist {
        path: format!("{root_type}.{}", path.join(".")),
        reason: reason.to_string(),
    };
    let operation = schema
        .descriptor
        .root_operation_of(root_type)
        .ok_or_else(|| invalid("not a root type"))?;
    let Some((leaf_name, wrappers)) = path.split_last() else {
        return Err(invalid("empty path"));
    };

    // owner_types[i] is the type declaring path[i]
    let mut owner_types = vec![root_type.to_string()];
    for segment in wrappers {
        let owner = owner_types.last().map(String::as_str).unwrap_or(root_type);
        let field = schema
            .descriptor
            .field(owner, segment)
            .ok_or_else(|| invalid(&format!("{owner} has no field {segment}")))?;
        if field.ty.is_list() {
            return Err(invalid(&format!("{owner}.{segment} is a list")));
        }
        if field
            .arguments
            .iter()
            .any(|argument| argument.ty.is_non_null() && argument.default_value.is_none())
        {
            return Err(invalid(&format!("{owner}.{segment} has required arguments")));
        }
        let next = field.ty.name().to_string();
        if schema
            .descriptor
            .type_def(&next)
            .is_none_or(|def| def.kind != TypeKind::Object)
        {
            return Err(invalid(&format!("{owner}.{segment} is not an object field")));
        }
        owner_types.push(next);
    }

    let leaf_owner = owner_types.last().cloned().unwrap_or_else(|| root_type.to_string());
    let leaf: FieldDef = schema
        .descriptor
        .field(&leaf_owner, leaf_name)
        .cloned()
        .ok_or_else(|| invalid(&format!("{leaf_owner} has no field {leaf_name}")))?;

    remove_field(&mut schema.descriptor, &leaf_owner, leaf_name);
    for depth in (0..wrappers.len()).rev() {
        let wrapper_type = &owner_types[depth + 1];
        let now_empty = schema
            .descriptor
            .type_def(wrapper_type)
            .is_some_and(|def| def.fields.is_empty());
        if !now_empty {
            break;
        }
        remove_field(&mut schema.descriptor, &owner_types[depth], &wrappers[depth]);
    }

    let root = schema
        .descriptor
        .types
        .get_mut(root_type)
        .ok_or_else(|| invalid("not a root type"))?;
    if root.field(new_name).is_some() {
        return Err(invalid(&format!("{root_type} already has a field {new_name}")));
    }
    root.fields.push(FieldDef {
        name: new_name.to_string(),
        ..leaf
    });

    let head: Vec<String> = match schema.hoisted(operation, &path[0]) {
        Some(prefix) => prefix.to_vec(),
        None => vec![schema.upstream_root_field(operation, &path[0]).to_string()],
    };
    let upstream_path: Vec<String> = head.into_iter().chain(path[1..].iter().cloned()).collect();
    match upstream_path.as_slice() {
        [single] if single == new_name => {}
        [single] => {
            schema
                .root_field_origins
                .insert((operation, new_name.to_string()), single.clone());
        }
        _ => {
            schema
                .hoisted
                .insert((operation, new_name.to_string()), upstream_path);
        }
    }
    Ok(())
}

fn remove_field(descriptor: &mut SchemaDescriptor, type_name: &str, field: &str) {
    if let Some(def) = descriptor.types.get_mut(type_name) {
        def.fields.retain(|candidate| candidate.name != field);
    }
}

fn prune_orphans(schema: &mut TransformedSchema) {
    let reachable = schema.descriptor.reachable_types();
    let removed: BTreeSet<String> = schema
        .descriptor
        .types
        .keys()
        .filter(|name| !reachable.contains(*name))
        .cloned()
        .collect();
    schema
        .descriptor
        .types
        .retain(|name, _| reachable.contains(name));
    schema.forget_types(&removed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    const LEGACY: &str = indoc! {r#"
        type Query {
          viewer: Viewer
          node(id: ID!): Node
        }

        type Viewer {
          item(id: ID!): Item
        }

        interface Node {
          id: ID!
        }

        type Item implements Node {
          id: ID!
          name: String
          tags: [Tag!]
        }

        type Tag {
          label: String
        }

        type Unused {
          id: ID
        }
    "#};

    fn legacy() -> SchemaDescriptor {
        SchemaDescriptor::parse(LEGACY, "legacy").unwrap()
    }

    #[test]
    fn rename_then_prune_leaves_no_dangling_types() {
        let transforms = TransformPipeline::new()
            .then(Transform::prefix_types("Legacy"))
            .prune_orphans();
        let schema = apply_transforms(legacy(), &transforms).unwrap();

        assert_eq!(schema.descriptor.query_type.as_deref(), Some("LegacyQuery"));
        assert!(schema.descriptor.has_type("LegacyItem"));
        assert!(!schema.descriptor.has_type("LegacyUnused"));
        assert_eq!(
            schema.descriptor.field("LegacyItem", "tags").unwrap().ty.to_string(),
            "[LegacyTag!]"
        );
        assert_eq!(schema.upstream_type_name("LegacyItem"), "Item");
        assert_eq!(schema.merged_type_name("Item"), Some("LegacyItem"));
        assert_eq!(schema.merged_type_name("Unused"), None);
        schema.descriptor.validate_references().unwrap();
    }

    #[test]
    fn chained_renames_keep_upstream_origins() {
        let transforms = vec![
            Transform::prefix_types("A"),
            Transform::rename_types(|name| name.strip_prefix("A").map(|rest| format!("B{rest}"))),
        ];
        let schema = apply_transforms(legacy(), &transforms).unwrap();
        assert_eq!(schema.upstream_type_name("BItem"), "Item");
        assert_eq!(schema.upstream_type_name("String"), "String");
    }

    #[test]
    fn rename_into_existing_type_collides() {
        let transforms = vec![Transform::rename_types(|name| {
            (name == "Tag").then(|| "Item".to_string())
        })];
        let error = apply_transforms(legacy(), &transforms).unwrap_err();
        assert!(matches!(error, SchemaBuildError::RenameCollision { .. }));
    }

    #[test]
    fn hoisting_viewer_item_then_pruning_removes_viewer() {
        let transforms = TransformPipeline::new()
            .then(Transform::hoist_field("Query", ["viewer", "item"], "item"))
            .prune_orphans();
        let schema = apply_transforms(legacy(), &transforms).unwrap();

        let query = schema.descriptor.root_type(Operation::Query).unwrap();
        let names: Vec<&str> = query.fields.iter().map(|field| field.name.as_str()).collect();
        assert_eq!(names, vec!["node", "item"]);
        assert_eq!(query.field("item").unwrap().arguments[0].name, "id");
        assert!(!schema.descriptor.has_type("Viewer"));
        assert_eq!(
            schema.hoisted(Operation::Query, "item"),
            Some(&["viewer".to_string(), "item".to_string()][..])
        );
    }

    #[test]
    fn hoisting_through_a_list_is_rejected() {
        let transforms = vec![Transform::hoist_field("Item", ["tags", "label"], "label")];
        let error = apply_transforms(legacy(), &transforms).unwrap_err();
        assert!(matches!(error, SchemaBuildError::InvalidHoist { .. }));

        let transforms = vec![Transform::hoist_field("Query", ["node", "id"], "id")];
        let error = apply_transforms(legacy(), &transforms).unwrap_err();
        assert!(matches!(error, SchemaBuildError::InvalidHoist { .. }));
    }

    #[test]
    fn nothing_may_follow_prune_orphans() {
        let transforms = vec![Transform::PruneOrphans, Transform::prefix_types("X")];
        let error = apply_transforms(legacy(), &transforms).unwrap_err();
        assert!(matches!(
            error,
            SchemaBuildError::TransformOrder {
                transform: "RenameTypes"
            }
        ));
    }

    #[test]
    fn filtering_types_drops_fields_that_reference_them() {
        let transforms = vec![Transform::filter_types(|def| def.name != "Tag")];
        let schema = apply_transforms(legacy(), &transforms).unwrap();
        assert!(schema.descriptor.field("Item", "tags").is_none());
        assert!(schema.descriptor.field("Item", "name").is_some());
    }

    #[test]
    fn renamed_root_fields_map_back_and_empty_roots_detach() {
        let transforms = vec![
            Transform::rename_root_fields(|_, field| (field == "node").then(|| "legacyNode".to_string())),
            Transform::filter_root_fields(|_, field| field != "viewer"),
        ];
        let schema = apply_transforms(legacy(), &transforms).unwrap();
        assert_eq!(schema.upstream_root_field(Operation::Query, "legacyNode"), "node");

        let transforms = vec![Transform::filter_root_fields(|_, _| false)];
        let schema = apply_transforms(legacy(), &transforms).unwrap();
        assert_eq!(schema.descriptor.query_type, None);
        assert!(!schema.descriptor.has_type("Query"));
    }

    #[test]
    fn canonical_roots_rename_custom_root_types() {
        let descriptor = SchemaDescriptor::parse(
            "schema { query: RootQuery } type RootQuery { a: Int }",
            "custom",
        )
        .unwrap();
        let mut schema = apply_transforms(descriptor, &[]).unwrap();
        schema.canonicalize_roots().unwrap();
        assert_eq!(schema.descriptor.query_type.as_deref(), Some("Query"));
        assert_eq!(schema.upstream_type_name("Query"), "RootQuery");
    }
}
