use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::Operation;
use crate::computed_fields::ComputedField;
use crate::error::SchemaBuildError;
use crate::extensions::ExtensionSet;
use crate::introspection::SchemaIntrospection;
use crate::legacy_shape::LegacyShapeAdapter;
use crate::query_executor::QueryExecutor;
use crate::query_rewriter::{WrapShape, WrapTarget};
use crate::schema_descriptor::{FieldDef, SchemaDescriptor, TypeDef, TypeKind};
use crate::transforms::{Transform, TransformedSchema, apply_transforms};
use crate::type_resolver::TypeResolver;

const LOCAL_SOURCE: &str = "local type definitions";

/// One upstream as seen by the merged schema.
pub struct SubschemaBinding {
    pub name: String,
    pub schema: TransformedSchema,
    pub executor: Arc<dyn QueryExecutor>,
    pub legacy: Option<LegacyShapeAdapter>,
    pub debug: bool,
}

impl SubschemaBinding {
    /// Applies `transforms` to the upstream schema. Legacy upstreams are
    /// re-rooted through `Query.viewer` first.
    pub fn build(
        name: impl Into<String>,
        mut descriptor: SchemaDescriptor,
        transforms: &[Transform],
        executor: Arc<dyn QueryExecutor>,
        legacy_viewer: bool,
    ) -> Result<Self, SchemaBuildError> {
        let name = name.into();
        let legacy = if legacy_viewer {
            let adapter = LegacyShapeAdapter::viewer();
            let old_root = descriptor.query_type.clone();
            descriptor
                .reroot_query(adapter.root_field())
                .ok_or_else(|| SchemaBuildError::MissingViewer(name.clone()))?;
            if let Some(old_root) = old_root {
                descriptor.remove_types(&BTreeSet::from([old_root]));
            }
            Some(adapter)
        } else {
            None
        };

        let mut schema = apply_transforms(descriptor, transforms)?;
        schema.canonicalize_roots()?;
        tracing::debug!(subgraph = %name, types = schema.descriptor.types.len(), "subschema transformed");
        Ok(SubschemaBinding {
            name,
            schema,
            executor,
            legacy,
            debug: false,
        })
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// The binding type answering the value at `upstream_path`, walking root
    /// fields by their upstream names (or hoisted paths) and nested fields by name.
    pub(crate) fn resolve_scope(&self, operation: Operation, upstream_path: &[&str]) -> Option<String> {
        let descriptor = &self.schema.descriptor;
        let root = descriptor.root_type(operation)?;
        let (start, rest) = root.fields.iter().find_map(|field| {
            let prefix: Vec<&str> = match self.schema.hoisted(operation, &field.name) {
                Some(path) => path.iter().map(String::as_str).collect(),
                None => vec![self.schema.upstream_root_field(operation, &field.name)],
            };
            upstream_path
                .starts_with(&prefix)
                .then(|| (field, &upstream_path[prefix.len()..]))
        })?;
        let mut current = start.ty.name();
        for segment in rest {
            current = descriptor.field(current, segment)?.ty.name();
        }
        Some(current.to_string())
    }
}

impl fmt::Debug for SubschemaBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubschemaBinding")
            .field("name", &self.name)
            .field("legacy", &self.legacy.is_some())
            .field("debug", &self.debug)
            .finish()
    }
}

pub type ArgumentMapper = Arc<dyn Fn(&Map<String, Value>) -> Map<String, Value> + Send + Sync>;

#[derive(Clone)]
pub enum DelegatedArguments {
    /// Forward the client's literals and variable references as written.
    Passthrough,
    /// Compute upstream arguments from the client's resolved arguments.
    Mapped(ArgumentMapper),
}

/// Where a merged root field is answered.
#[derive(Clone)]
pub struct Delegation {
    pub subgraph: String,
    pub operation: Operation,
    pub namespace: Vec<String>,
    pub field_name: String,
    pub shape: WrapShape,
    pub arguments: DelegatedArguments,
    pub(crate) scope: Option<String>,
}

impl Delegation {
    pub fn new(subgraph: impl Into<String>, field_name: impl Into<String>) -> Self {
        Delegation {
            subgraph: subgraph.into(),
            operation: Operation::Query,
            namespace: Vec::new(),
            field_name: field_name.into(),
            shape: WrapShape::Direct,
            arguments: DelegatedArguments::Passthrough,
            scope: None,
        }
    }

    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.operation = operation;
        self
    }

    pub fn with_namespace(mut self, namespace: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.namespace = namespace.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_shape(mut self, shape: WrapShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn map_arguments<F>(mut self, mapper: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> Map<String, Value> + Send + Sync + 'static,
    {
        self.arguments = DelegatedArguments::Mapped(Arc::new(mapper));
        self
    }

    pub fn wrap_target(&self) -> WrapTarget {
        WrapTarget {
            namespace: self.namespace.clone(),
            field_name: self.field_name.clone(),
            shape: self.shape,
        }
    }

    /// Binding type the delegated selection is evaluated against, if known.
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }
}

impl fmt::Debug for Delegation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delegation")
            .field("subgraph", &self.subgraph)
            .field("operation", &self.operation)
            .field("namespace", &self.namespace)
            .field("field_name", &self.field_name)
            .field("shape", &self.shape)
            .field(
                "arguments",
                &match self.arguments {
                    DelegatedArguments::Passthrough => "passthrough",
                    DelegatedArguments::Mapped(_) => "mapped",
                },
            )
            .finish()
    }
}

/// Collects bindings, local type definitions and delegations into one schema.
#[derive(Default)]
pub struct SchemaMerger {
    bindings: Vec<SubschemaBinding>,
    type_defs: Vec<(String, String)>,
    delegations: Vec<(String, Delegation)>,
    type_resolvers: Vec<(String, TypeResolver)>,
    computed_fields: Vec<ComputedField>,
}

impl SchemaMerger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_binding(mut self, binding: SubschemaBinding) -> Self {
        self.bindings.push(binding);
        self
    }

    pub fn type_defs(self, sdl: impl Into<String>) -> Self {
        self.named_type_defs(LOCAL_SOURCE, sdl)
    }

    pub fn named_type_defs(mut self, source: impl Into<String>, sdl: impl Into<String>) -> Self {
        self.type_defs.push((source.into(), sdl.into()));
        self
    }

    /// Resolves the merged root field `field` through `delegation`, replacing
    /// any default delegation.
    pub fn delegate(mut self, field: impl Into<String>, delegation: Delegation) -> Self {
        self.delegations.push((field.into(), delegation));
        self
    }

    pub fn type_resolver(mut self, type_name: impl Into<String>, resolver: TypeResolver) -> Self {
        self.type_resolvers.push((type_name.into(), resolver));
        self
    }

    /// Adds a built-in extension. Its computed fields are layered after the merge.
    pub fn extension(mut self, extension: ExtensionSet) -> Self {
        let source = format!("extension {}", extension.name);
        for sdl in extension.type_defs {
            self.type_defs.push((source.clone(), sdl));
        }
        self.delegations.extend(extension.delegations);
        self.type_resolvers.extend(extension.type_resolvers);
        self.computed_fields.extend(extension.computed_fields);
        self
    }

    pub fn merge(self) -> Result<MergedSchema, SchemaBuildError> {
        let mut descriptor = SchemaDescriptor {
            query_type: Some(Operation::Query.root_type_name().to_string()),
            ..Default::default()
        };
        descriptor.types.insert(
            Operation::Query.root_type_name().to_string(),
            TypeDef::new(Operation::Query.root_type_name(), TypeKind::Object),
        );

        let mut type_owners: HashMap<String, String> = HashMap::new();
        let mut root_owners: BTreeMap<(Operation, String), usize> = BTreeMap::new();

        for (index, binding) in self.bindings.iter().enumerate() {
            let source = &binding.schema.descriptor;
            for (name, def) in &source.types {
                match source.root_operation_of(name) {
                    Some(Operation::Subscription) => continue,
                    Some(operation) => {
                        let root = root_type_mut(&mut descriptor, operation);
                        for field in &def.fields {
                            if root.field(&field.name).is_some() {
                                return Err(SchemaBuildError::RootFieldCollision {
                                    operation: operation.to_string(),
                                    field: field.name.clone(),
                                });
                            }
                            root.fields.push(field.clone());
                            root_owners.insert((operation, field.name.clone()), index);
                        }
                    }
                    None => match descriptor.types.get(name) {
                        Some(existing) if existing.same_shape(def) => {}
                        Some(_) => {
                            return Err(SchemaBuildError::TypeCollision {
                                type_name: name.clone(),
                                first: type_owners.get(name).cloned().unwrap_or_default(),
                                second: binding.name.clone(),
                            });
                        }
                        None => {
                            descriptor.types.insert(name.clone(), def.clone());
                            type_owners.insert(name.clone(), binding.name.clone());
                        }
                    },
                }
            }
        }

        for (source, sdl) in &self.type_defs {
            if sdl.contains("extend type Mutation") && descriptor.mutation_type.is_none() {
                root_type_mut(&mut descriptor, Operation::Mutation);
            }
            descriptor.extend(sdl, source)?;
        }

        let binding_index: HashMap<String, usize> = self
            .bindings
            .iter()
            .enumerate()
            .map(|(index, binding)| (binding.name.clone(), index))
            .collect();

        let mut delegations: HashMap<(Operation, String), Delegation> = HashMap::new();
        for ((operation, field), index) in &root_owners {
            let binding = &self.bindings[*index];
            let mut delegation = match binding.schema.hoisted(*operation, field) {
                Some([namespace @ .., leaf]) => {
                    Delegation::new(&binding.name, leaf).with_namespace(namespace.iter().cloned())
                }
                _ => Delegation::new(&binding.name, binding.schema.upstream_root_field(*operation, field)),
            };
            delegation.operation = *operation;
            delegation.scope = binding
                .schema
                .descriptor
                .field(operation.root_type_name(), field)
                .map(|def| def.ty.name().to_string());
            delegations.insert((*operation, field.clone()), delegation);
        }

        for (field, mut delegation) in self.delegations {
            let index = *binding_index
                .get(&delegation.subgraph)
                .ok_or_else(|| SchemaBuildError::UnknownSubgraph(delegation.subgraph.clone()))?;
            let operation = delegation.operation;
            if descriptor.field(operation.root_type_name(), &field).is_none() {
                return Err(SchemaBuildError::UndeclaredField {
                    type_name: operation.root_type_name().to_string(),
                    field,
                });
            }
            let target = delegation.wrap_target();
            delegation.scope = self.bindings[index].resolve_scope(operation, &target.upstream_path());
            if delegation.scope.is_none() {
                tracing::warn!(
                    field = %field,
                    subgraph = %delegation.subgraph,
                    "cannot find the delegated field in the subgraph schema, forwarding selections unchecked"
                );
            }
            delegations.insert((operation, field), delegation);
        }

        for operation in [Operation::Query, Operation::Mutation] {
            if let Some(root) = descriptor.root_type(operation) {
                if let Some(missing) = root
                    .fields
                    .iter()
                    .find(|field| !delegations.contains_key(&(operation, field.name.clone())))
                {
                    return Err(SchemaBuildError::MissingRootResolver {
                        operation: operation.to_string(),
                        field: missing.name.clone(),
                    });
                }
            }
        }

        let mut type_resolvers = HashMap::new();
        for (type_name, resolver) in self.type_resolvers {
            let invalid = |reason: String| SchemaBuildError::InvalidTypeResolver {
                type_name: type_name.clone(),
                reason,
            };
            if !descriptor.is_abstract(&type_name) {
                return Err(invalid("not an interface or union".to_string()));
            }
            for candidate in resolver.types() {
                if descriptor
                    .type_def(candidate)
                    .is_none_or(|def| def.kind != TypeKind::Object)
                {
                    return Err(invalid(format!("{candidate} is not an object type")));
                }
                if !descriptor.type_applies(candidate, &type_name) {
                    return Err(invalid(format!("{candidate} is not a possible type")));
                }
            }
            type_resolvers.insert(type_name, resolver);
        }

        descriptor.validate_references()?;
        let introspection = SchemaIntrospection::new(&descriptor);
        tracing::info!(
            subgraphs = self.bindings.len(),
            types = descriptor.types.len(),
            root_fields = delegations.len(),
            "merged schema built"
        );

        let merged = MergedSchema {
            descriptor,
            bindings: self.bindings,
            binding_index,
            delegations,
            type_resolvers,
            computed: HashMap::new(),
            introspection,
        };
        merged.layer(self.computed_fields)
    }
}

fn root_type_mut(descriptor: &mut SchemaDescriptor, operation: Operation) -> &mut TypeDef {
    let name = operation.root_type_name();
    if descriptor.root_type_name(operation).is_none() {
        descriptor.set_root(operation, Some(name.to_string()));
    }
    descriptor
        .types
        .entry(name.to_string())
        .or_insert_with(|| TypeDef::new(name, TypeKind::Object))
}

/// The unified schema, immutable once built.
pub struct MergedSchema {
    descriptor: SchemaDescriptor,
    bindings: Vec<SubschemaBinding>,
    binding_index: HashMap<String, usize>,
    delegations: HashMap<(Operation, String), Delegation>,
    type_resolvers: HashMap<String, TypeResolver>,
    computed: HashMap<(String, String), ComputedField>,
    introspection: SchemaIntrospection,
}

impl MergedSchema {
    /// Second pass: attaches computed resolvers to fields that are already
    /// declared. It never declares fields.
    pub fn layer(mut self, computed_fields: Vec<ComputedField>) -> Result<Self, SchemaBuildError> {
        for computed in computed_fields {
            let declared = self
                .descriptor
                .type_def(&computed.type_name)
                .filter(|def| matches!(def.kind, TypeKind::Object | TypeKind::Interface))
                .and_then(|def| def.field(&computed.field_name))
                .is_some();
            if !declared {
                return Err(SchemaBuildError::UndeclaredField {
                    type_name: computed.type_name,
                    field: computed.field_name,
                });
            }
            self.computed.insert(
                (computed.type_name.clone(), computed.field_name.clone()),
                computed,
            );
        }
        Ok(self)
    }

    pub fn descriptor(&self) -> &SchemaDescriptor {
        &self.descriptor
    }

    pub fn sdl(&self) -> String {
        self.descriptor.to_sdl()
    }

    pub fn introspection(&self) -> &SchemaIntrospection {
        &self.introspection
    }

    pub fn bindings(&self) -> impl Iterator<Item = &SubschemaBinding> {
        self.bindings.iter()
    }

    pub fn binding(&self, name: &str) -> Option<&SubschemaBinding> {
        self.binding_index.get(name).map(|index| &self.bindings[*index])
    }

    pub fn delegation(&self, operation: Operation, field: &str) -> Option<&Delegation> {
        self.delegations.get(&(operation, field.to_string()))
    }

    pub fn field_def(&self, type_name: &str, field: &str) -> Option<&FieldDef> {
        self.descriptor.field(type_name, field)
    }

    pub fn is_abstract(&self, type_name: &str) -> bool {
        self.descriptor.is_abstract(type_name)
    }

    pub fn type_applies(&self, type_name: &str, condition: &str) -> bool {
        self.descriptor.type_applies(type_name, condition)
    }

    pub fn type_resolver(&self, type_name: &str) -> Option<&TypeResolver> {
        self.type_resolvers.get(type_name)
    }

    /// Computed resolver for a field, declared on the type or one of its interfaces.
    pub fn computed_field(&self, type_name: &str, field: &str) -> Option<&ComputedField> {
        let key = |owner: &str| (owner.to_string(), field.to_string());
        self.computed.get(&key(type_name)).or_else(|| {
            self.descriptor
                .type_def(type_name)?
                .interfaces
                .iter()
                .find_map(|iface| self.computed.get(&key(iface)))
        })
    }

    /// Concrete merged type of a value at a position typed `declared`.
    pub fn resolve_concrete_type(&self, declared: &str, binding: &SubschemaBinding, value: &Value) -> String {
        if !self.is_abstract(declared) {
            return declared.to_string();
        }
        if let Some(resolver) = self.type_resolver(declared) {
            return resolver.resolve(Some(value)).to_string();
        }
        let from_typename = value
            .get("__typename")
            .and_then(Value::as_str)
            .and_then(|upstream| binding.schema.merged_type_name(upstream))
            .filter(|merged| self.descriptor.has_type(merged));
        if let Some(merged) = from_typename {
            return merged.to_string();
        }
        match self.descriptor.possible_types(declared).as_slice() {
            [single] => single.to_string(),
            _ => declared.to_string(),
        }
    }
}

impl fmt::Debug for MergedSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergedSchema")
            .field("bindings", &self.bindings)
            .field("types", &self.descriptor.types.len())
            .finish()
    }
}
