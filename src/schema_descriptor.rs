use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt::{self, Write};

use graphql_parser::parse_schema;
use graphql_parser::schema::{self as ast, Definition, TypeDefinition, TypeExtension};
use serde::{Deserialize, Serialize};

use crate::Operation;
use crate::error::SchemaBuildError;
use crate::selection::InputValue;

pub const BUILTIN_SCALARS: [&str; 5] = ["String", "Int", "Float", "Boolean", "ID"];

const DEFAULT_DEPRECATION_REASON: &str = "No longer supported";

/// Built-in scalars and introspection types are implicit in every schema.
pub fn is_builtin_type(name: &str) -> bool {
    BUILTIN_SCALARS.contains(&name) || name.starts_with("__")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TypeKind {
    Scalar,
    Object,
    Interface,
    Union,
    Enum,
    InputObject,
}

impl TypeKind {
    fn keyword(self) -> &'static str {
        match self {
            TypeKind::Scalar => "scalar",
            TypeKind::Object => "type",
            TypeKind::Interface => "interface",
            TypeKind::Union => "union",
            TypeKind::Enum => "enum",
            TypeKind::InputObject => "input",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeRef {
    Named(String),
    List(Box<TypeRef>),
    NonNull(Box<TypeRef>),
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        TypeRef::Named(name.into())
    }

    /// The innermost named type.
    pub fn name(&self) -> &str {
        match self {
            TypeRef::Named(name) => name,
            TypeRef::List(inner) | TypeRef::NonNull(inner) => inner.name(),
        }
    }

    pub fn is_list(&self) -> bool {
        match self {
            TypeRef::Named(_) => false,
            TypeRef::List(_) => true,
            TypeRef::NonNull(inner) => inner.is_list(),
        }
    }

    pub fn is_non_null(&self) -> bool {
        matches!(self, TypeRef::NonNull(_))
    }

    fn rename(&mut self, renames: &BTreeMap<String, String>) {
        match self {
            TypeRef::Named(name) => {
                if let Some(renamed) = renames.get(name.as_str()) {
                    *name = renamed.clone();
                }
            }
            TypeRef::List(inner) | TypeRef::NonNull(inner) => inner.rename(renames),
        }
    }

    pub(crate) fn from_ast(ty: &ast::Type<'_, String>) -> Self {
        match ty {
            ast::Type::NamedType(name) => TypeRef::Named(name.clone()),
            ast::Type::ListType(inner) => TypeRef::List(Box::new(TypeRef::from_ast(inner))),
            ast::Type::NonNullType(inner) => TypeRef::NonNull(Box::new(TypeRef::from_ast(inner))),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Named(name) => f.write_str(name),
            TypeRef::List(inner) => write!(f, "[{inner}]"),
            TypeRef::NonNull(inner) => write!(f, "{inner}!"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct InputValueDef {
    pub name: String,
    pub description: Option<String>,
    pub ty: TypeRef,
    /// Default value as a GraphQL literal.
    pub default_value: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub description: Option<String>,
    pub arguments: Vec<InputValueDef>,
    pub ty: TypeRef,
    pub deprecation: Option<String>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        FieldDef {
            name: name.into(),
            description: None,
            arguments: Vec::new(),
            ty,
            deprecation: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnumValueDef {
    pub name: String,
    pub description: Option<String>,
    pub deprecation: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TypeDef {
    pub name: String,
    pub kind: TypeKind,
    pub description: Option<String>,
    pub fields: Vec<FieldDef>,
    pub interfaces: Vec<String>,
    pub members: Vec<String>,
    pub enum_values: Vec<EnumValueDef>,
    pub input_fields: Vec<InputValueDef>,
}

impl TypeDef {
    pub fn new(name: impl Into<String>, kind: TypeKind) -> Self {
        TypeDef {
            name: name.into(),
            kind,
            description: None,
            fields: Vec::new(),
            interfaces: Vec::new(),
            members: Vec::new(),
            enum_values: Vec::new(),
            input_fields: Vec::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut FieldDef> {
        self.fields.iter_mut().find(|field| field.name == name)
    }

    pub fn is_abstract(&self) -> bool {
        matches!(self.kind, TypeKind::Interface | TypeKind::Union)
    }

    /// Structural equality: descriptions are ignored, since introspection
    /// and SDL snapshots of the same type may differ in them.
    pub fn same_shape(&self, other: &TypeDef) -> bool {
        self.without_descriptions() == other.without_descriptions()
    }

    fn without_descriptions(&self) -> TypeDef {
        let strip_inputs = |inputs: &[InputValueDef]| -> Vec<InputValueDef> {
            inputs
                .iter()
                .map(|input| InputValueDef {
                    description: None,
                    ..input.clone()
                })
                .collect()
        };
        TypeDef {
            description: None,
            fields: self
                .fields
                .iter()
                .map(|field| FieldDef {
                    description: None,
                    arguments: strip_inputs(&field.arguments),
                    ..field.clone()
                })
                .collect(),
            enum_values: self
                .enum_values
                .iter()
                .map(|value| EnumValueDef {
                    description: None,
                    ..value.clone()
                })
                .collect(),
            input_fields: strip_inputs(&self.input_fields),
            ..self.clone()
        }
    }

    /// Every named type this definition points at.
    pub(crate) fn references(&self) -> impl Iterator<Item = (String, &str)> + '_ {
        let fields = self.fields.iter().flat_map(move |field| {
            std::iter::once((format!("{}.{}", self.name, field.name), field.ty.name())).chain(
                field.arguments.iter().map(move |argument| {
                    (
                        format!("{}.{}({}:)", self.name, field.name, argument.name),
                        argument.ty.name(),
                    )
                }),
            )
        });
        let input_fields = self
            .input_fields
            .iter()
            .map(move |field| (format!("{}.{}", self.name, field.name), field.ty.name()));
        let interfaces = self
            .interfaces
            .iter()
            .map(move |name| (format!("{} implements", self.name), name.as_str()));
        let members = self
            .members
            .iter()
            .map(move |name| (format!("union {}", self.name), name.as_str()));
        fields.chain(input_fields).chain(interfaces).chain(members)
    }
}

/// In-memory graph of one schema.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SchemaDescriptor {
    pub query_type: Option<String>,
    pub mutation_type: Option<String>,
    pub subscription_type: Option<String>,
    pub types: BTreeMap<String, TypeDef>,
}

impl SchemaDescriptor {
    pub fn parse(sdl: &str, source_name: &str) -> Result<Self, SchemaBuildError> {
        let mut descriptor = SchemaDescriptor::default();
        descriptor.extend(sdl, source_name)?;
        Ok(descriptor)
    }

    /// Applies SDL definitions and `extend` clauses on top of this schema.
    pub fn extend(&mut self, sdl: &str, source_name: &str) -> Result<(), SchemaBuildError> {
        let document = parse_schema::<String>(sdl).map_err(|e| SchemaBuildError::Parse {
            source_name: source_name.to_string(),
            message: e.to_string(),
        })?;

        for definition in &document.definitions {
            match definition {
                Definition::SchemaDefinition(schema) => {
                    self.query_type = schema.query.clone().or(self.query_type.take());
                    self.mutation_type = schema.mutation.clone().or(self.mutation_type.take());
                    self.subscription_type =
                        schema.subscription.clone().or(self.subscription_type.take());
                }
                Definition::TypeDefinition(definition) => {
                    let type_def = type_from_ast(definition);
                    self.insert_type(type_def, source_name)?;
                }
                Definition::TypeExtension(extension) => self.apply_extension(extension)?,
                Definition::DirectiveDefinition(_) => {}
            }
        }

        for operation in [Operation::Query, Operation::Mutation, Operation::Subscription] {
            if self.root_type_name(operation).is_none()
                && self.types.contains_key(operation.root_type_name())
            {
                self.set_root(operation, Some(operation.root_type_name().to_string()));
            }
        }
        Ok(())
    }

    /// Inserts a definition; an identical existing definition is merged silently.
    pub fn insert_type(&mut self, type_def: TypeDef, source_name: &str) -> Result<(), SchemaBuildError> {
        if is_builtin_type(&type_def.name) {
            return Ok(());
        }
        match self.types.get(&type_def.name) {
            Some(existing) if existing == &type_def => Ok(()),
            Some(_) => Err(SchemaBuildError::TypeCollision {
                type_name: type_def.name,
                first: "an earlier definition".to_string(),
                second: source_name.to_string(),
            }),
            None => {
                self.types.insert(type_def.name.clone(), type_def);
                Ok(())
            }
        }
    }

    fn apply_extension(&mut self, extension: &TypeExtension<'_, String>) -> Result<(), SchemaBuildError> {
        let (name, kind) = match extension {
            TypeExtension::Scalar(ext) => (&ext.name, TypeKind::Scalar),
            TypeExtension::Object(ext) => (&ext.name, TypeKind::Object),
            TypeExtension::Interface(ext) => (&ext.name, TypeKind::Interface),
            TypeExtension::Union(ext) => (&ext.name, TypeKind::Union),
            TypeExtension::Enum(ext) => (&ext.name, TypeKind::Enum),
            TypeExtension::InputObject(ext) => (&ext.name, TypeKind::InputObject),
        };
        let target = self.types.get_mut(name.as_str()).ok_or_else(|| {
            SchemaBuildError::InvalidExtension(format!("cannot extend unknown type {name}"))
        })?;
        if target.kind != kind {
            return Err(SchemaBuildError::InvalidExtension(format!(
                "{name} is not a {}",
                kind.keyword()
            )));
        }

        match extension {
            TypeExtension::Scalar(_) => {}
            TypeExtension::Object(ext) => {
                add_fields(target, ext.fields.iter().map(field_from_ast))?;
                add_names(&mut target.interfaces, &ext.implements_interfaces);
            }
            TypeExtension::Interface(ext) => {
                add_fields(target, ext.fields.iter().map(field_from_ast))?;
            }
            TypeExtension::Union(ext) => add_names(&mut target.members, &ext.types),
            TypeExtension::Enum(ext) => {
                for value in &ext.values {
                    if target.enum_values.iter().all(|existing| existing.name != value.name) {
                        target.enum_values.push(EnumValueDef {
                            name: value.name.clone(),
                            description: value.description.clone(),
                            deprecation: deprecation(&value.directives),
                        });
                    }
                }
            }
            TypeExtension::InputObject(ext) => {
                for field in &ext.fields {
                    if target.input_fields.iter().any(|existing| existing.name == field.name) {
                        return Err(SchemaBuildError::FieldCollision {
                            type_name: target.name.clone(),
                            field: field.name.clone(),
                        });
                    }
                    target.input_fields.push(input_value_from_ast(field));
                }
            }
        }
        Ok(())
    }

    pub fn root_type_name(&self, operation: Operation) -> Option<&str> {
        match operation {
            Operation::Query => self.query_type.as_deref(),
            Operation::Mutation => self.mutation_type.as_deref(),
            Operation::Subscription => self.subscription_type.as_deref(),
        }
    }

    pub fn set_root(&mut self, operation: Operation, name: Option<String>) {
        match operation {
            Operation::Query => self.query_type = name,
            Operation::Mutation => self.mutation_type = name,
            Operation::Subscription => self.subscription_type = name,
        }
    }

    pub fn root_type(&self, operation: Operation) -> Option<&TypeDef> {
        self.root_type_name(operation)
            .and_then(|name| self.types.get(name))
    }

    pub fn root_operation_of(&self, type_name: &str) -> Option<Operation> {
        [Operation::Query, Operation::Mutation, Operation::Subscription]
            .into_iter()
            .find(|operation| self.root_type_name(*operation) == Some(type_name))
    }

    pub fn type_def(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    pub fn field(&self, type_name: &str, field_name: &str) -> Option<&FieldDef> {
        self.types.get(type_name)?.field(field_name)
    }

    pub fn has_type(&self, name: &str) -> bool {
        is_builtin_type(name) || self.types.contains_key(name)
    }

    pub fn is_abstract(&self, name: &str) -> bool {
        self.types.get(name).is_some_and(TypeDef::is_abstract)
    }

    /// Object types an abstract type can resolve to; an object type resolves to itself.
    pub fn possible_types(&self, name: &str) -> Vec<&str> {
        match self.types.get(name) {
            Some(def) if def.kind == TypeKind::Union => {
                def.members.iter().map(String::as_str).collect()
            }
            Some(def) if def.kind == TypeKind::Interface => self
                .types
                .values()
                .filter(|candidate| {
                    candidate.kind == TypeKind::Object
                        && candidate.interfaces.iter().any(|iface| iface == name)
                })
                .map(|candidate| candidate.name.as_str())
                .collect(),
            Some(def) => vec![def.name.as_str()],
            None => Vec::new(),
        }
    }

    /// Whether a value of `type_name` satisfies a fragment or field of type `condition`.
    pub fn type_applies(&self, type_name: &str, condition: &str) -> bool {
        if type_name == condition {
            return true;
        }
        match self.types.get(condition) {
            Some(def) if def.kind == TypeKind::Union => {
                def.members.iter().any(|member| member == type_name)
            }
            Some(def) if def.kind == TypeKind::Interface => self
                .types
                .get(type_name)
                .is_some_and(|candidate| candidate.interfaces.iter().any(|iface| iface == condition)),
            _ => false,
        }
    }

    /// Renames types and every reference to them.
    pub(crate) fn rename_types(&mut self, renames: &BTreeMap<String, String>) {
        if renames.is_empty() {
            return;
        }
        let types = std::mem::take(&mut self.types);
        for (name, mut def) in types {
            let name = renames.get(&name).cloned().unwrap_or(name);
            def.name = name.clone();
            for field in &mut def.fields {
                field.ty.rename(renames);
                for argument in &mut field.arguments {
                    argument.ty.rename(renames);
                }
            }
            for field in &mut def.input_fields {
                field.ty.rename(renames);
            }
            for name in def.interfaces.iter_mut().chain(def.members.iter_mut()) {
                if let Some(renamed) = renames.get(name.as_str()) {
                    *name = renamed.clone();
                }
            }
            self.types.insert(name, def);
        }
        for root in [
            &mut self.query_type,
            &mut self.mutation_type,
            &mut self.subscription_type,
        ] {
            if let Some(name) = root {
                if let Some(renamed) = renames.get(name.as_str()) {
                    *name = renamed.clone();
                }
            }
        }
    }

    /// Removes types together with every field, argument holder, interface
    /// reference and union membership pointing at them.
    pub(crate) fn remove_types(&mut self, removed: &BTreeSet<String>) {
        if removed.is_empty() {
            return;
        }
        self.types.retain(|name, _| !removed.contains(name));
        for def in self.types.values_mut() {
            def.fields.retain(|field| {
                !removed.contains(field.ty.name())
                    && field
                        .arguments
                        .iter()
                        .all(|argument| !removed.contains(argument.ty.name()))
            });
            def.input_fields
                .retain(|field| !removed.contains(field.ty.name()));
            def.interfaces.retain(|name| !removed.contains(name));
            def.members.retain(|name| !removed.contains(name));
        }
        for root in [
            &mut self.query_type,
            &mut self.mutation_type,
            &mut self.subscription_type,
        ] {
            if root.as_ref().is_some_and(|name| removed.contains(name)) {
                *root = None;
            }
        }
    }

    /// Types reachable from the root operations.
    pub(crate) fn reachable_types(&self) -> BTreeSet<String> {
        let mut reachable = BTreeSet::new();
        let mut queue: VecDeque<&str> = [
            self.query_type.as_deref(),
            self.mutation_type.as_deref(),
            self.subscription_type.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect();

        while let Some(name) = queue.pop_front() {
            let Some(def) = self.types.get(name) else {
                continue;
            };
            if !reachable.insert(def.name.clone()) {
                continue;
            }
            for (_, target) in def.references() {
                if !reachable.contains(target) {
                    queue.push_back(target);
                }
            }
            if def.kind == TypeKind::Interface {
                for implementation in self.possible_types(name) {
                    if !reachable.contains(implementation) {
                        queue.push_back(implementation);
                    }
                }
            }
        }
        reachable
    }

    /// Fails on the first reference to a type that does not exist.
    pub fn validate_references(&self) -> Result<(), SchemaBuildError> {
        for operation in [Operation::Query, Operation::Mutation, Operation::Subscription] {
            if let Some(root) = self.root_type_name(operation) {
                if !self.types.contains_key(root) {
                    return Err(SchemaBuildError::DanglingReference {
                        location: format!("schema {}", operation.keyword()),
                        target: root.to_string(),
                    });
                }
            }
        }
        for def in self.types.values() {
            if let Some((location, target)) = def.references().find(|(_, target)| !self.has_type(target)) {
                return Err(SchemaBuildError::DanglingReference {
                    location,
                    target: target.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Makes the type of `Query.<field>` the query root.
    pub(crate) fn reroot_query(&mut self, field: &str) -> Option<()> {
        let target = self.root_type(Operation::Query)?.field(field)?.ty.name().to_string();
        if self.types.get(&target)?.kind != TypeKind::Object {
            return None;
        }
        self.query_type = Some(target);
        Some(())
    }

    /// Prints the schema as SDL.
    pub fn to_sdl(&self) -> String {
        let mut out = String::new();
        let custom_roots: Vec<(Operation, &str)> =
            [Operation::Query, Operation::Mutation, Operation::Subscription]
                .into_iter()
                .filter_map(|operation| {
                    self.root_type_name(operation)
                        .map(|name| (operation, name))
                })
                .collect();
        if custom_roots
            .iter()
            .any(|(operation, name)| operation.root_type_name() != *name)
        {
            out.push_str("schema {\n");
            for (operation, name) in &custom_roots {
                let _ = writeln!(out, "  {}: {}", operation.keyword(), name);
            }
            out.push_str("}\n\n");
        }

        for def in self.types.values() {
            write_description(&mut out, def.description.as_deref(), "");
            match def.kind {
                TypeKind::Scalar => {
                    let _ = writeln!(out, "scalar {}", def.name);
                }
                TypeKind::Union => {
                    let _ = writeln!(out, "union {} = {}", def.name, def.members.join(" | "));
                }
                TypeKind::Enum => {
                    let _ = writeln!(out, "enum {} {{", def.name);
                    for value in &def.enum_values {
                        write_description(&mut out, value.description.as_deref(), "  ");
                        let _ = writeln!(out, "  {}{}", value.name, deprecated_directive(&value.deprecation));
                    }
                    out.push_str("}\n");
                }
                TypeKind::InputObject => {
                    let _ = writeln!(out, "input {} {{", def.name);
                    for field in &def.input_fields {
                        write_description(&mut out, field.description.as_deref(), "  ");
                        let _ = writeln!(out, "  {}", input_value_sdl(field));
                    }
                    out.push_str("}\n");
                }
                TypeKind::Object | TypeKind::Interface => {
                    let _ = write!(out, "{} {}", def.kind.keyword(), def.name);
                    if !def.interfaces.is_empty() {
                        let _ = write!(out, " implements {}", def.interfaces.join(" & "));
                    }
                    out.push_str(" {\n");
                    for field in &def.fields {
                        write_description(&mut out, field.description.as_deref(), "  ");
                        let _ = write!(out, "  {}", field.name);
                        if !field.arguments.is_empty() {
                            let arguments: Vec<String> =
                                field.arguments.iter().map(input_value_sdl).collect();
                            let _ = write!(out, "({})", arguments.join(", "));
                        }
                        let _ = writeln!(out, ": {}{}", field.ty, deprecated_directive(&field.deprecation));
                    }
                    out.push_str("}\n");
                }
            }
            out.push('\n');
        }
        out.truncate(out.trim_end().len());
        out.push('\n');
        out
    }
}

fn add_fields(
    target: &mut TypeDef,
    fields: impl Iterator<Item = FieldDef>,
) -> Result<(), SchemaBuildError> {
    for field in fields {
        if target.field(&field.name).is_some() {
            return Err(SchemaBuildError::FieldCollision {
                type_name: target.name.clone(),
                field: field.name,
            });
        }
        target.fields.push(field);
    }
    Ok(())
}

fn add_names(target: &mut Vec<String>, names: &[String]) {
    for name in names {
        if !target.contains(name) {
            target.push(name.clone());
        }
    }
}

fn type_from_ast(definition: &TypeDefinition<'_, String>) -> TypeDef {
    match definition {
        TypeDefinition::Scalar(scalar) => TypeDef {
            description: scalar.description.clone(),
            ..TypeDef::new(scalar.name.clone(), TypeKind::Scalar)
        },
        TypeDefinition::Object(obj) => TypeDef {
            description: obj.description.clone(),
            fields: obj.fields.iter().map(field_from_ast).collect(),
            interfaces: obj.implements_interfaces.clone(),
            ..TypeDef::new(obj.name.clone(), TypeKind::Object)
        },
        TypeDefinition::Interface(iface) => TypeDef {
            description: iface.description.clone(),
            fields: iface.fields.iter().map(field_from_ast).collect(),
            ..TypeDef::new(iface.name.clone(), TypeKind::Interface)
        },
        TypeDefinition::Union(union_type) => TypeDef {
            description: union_type.description.clone(),
            members: union_type.types.clone(),
            ..TypeDef::new(union_type.name.clone(), TypeKind::Union)
        },
        TypeDefinition::Enum(enum_type) => TypeDef {
            description: enum_type.description.clone(),
            enum_values: enum_type
                .values
                .iter()
                .map(|value| EnumValueDef {
                    name: value.name.clone(),
                    description: value.description.clone(),
                    deprecation: deprecation(&value.directives),
                })
                .collect(),
            ..TypeDef::new(enum_type.name.clone(), TypeKind::Enum)
        },
        TypeDefinition::InputObject(input) => TypeDef {
            description: input.description.clone(),
            input_fields: input.fields.iter().map(input_value_from_ast).collect(),
            ..TypeDef::new(input.name.clone(), TypeKind::InputObject)
        },
    }
}

fn field_from_ast(field: &ast::Field<'_, String>) -> FieldDef {
    FieldDef {
        name: field.name.clone(),
        description: field.description.clone(),
        arguments: field.arguments.iter().map(input_value_from_ast).collect(),
        ty: TypeRef::from_ast(&field.field_type),
        deprecation: deprecation(&field.directives),
    }
}

fn input_value_from_ast(value: &ast::InputValue<'_, String>) -> InputValueDef {
    InputValueDef {
        name: value.name.clone(),
        description: value.description.clone(),
        ty: TypeRef::from_ast(&value.value_type),
        default_value: value
            .default_value
            .as_ref()
            .map(|default| InputValue::from_ast(default).to_string()),
    }
}

fn deprecation(directives: &[ast::Directive<'_, String>]) -> Option<String> {
    let directive = directives.iter().find(|d| d.name == "deprecated")?;
    let reason = directive
        .arguments
        .iter()
        .find(|(name, _)| name == "reason")
        .and_then(|(_, value)| match value {
            ast::Value::String(reason) => Some(reason.clone()),
            _ => None,
        });
    Some(reason.unwrap_or_else(|| DEFAULT_DEPRECATION_REASON.to_string()))
}

fn deprecated_directive(deprecation: &Option<String>) -> String {
    match deprecation {
        None => String::new(),
        Some(reason) if reason == DEFAULT_DEPRECATION_REASON => " @deprecated".to_string(),
        Some(reason) => format!(
            " @deprecated(reason: {})",
            serde_json::to_string(reason).unwrap_or_default()
        ),
    }
}

fn input_value_sdl(value: &InputValueDef) -> String {
    match &value.default_value {
        Some(default) => format!("{}: {} = {}", value.name, value.ty, default),
        None => format!("{}: {}", value.name, value.ty),
    }
}

fn write_description(out: &mut String, description: Option<&str>, indent: &str) {
    if let Some(description) = description {
        let escaped = description.replace("\"\"\"", "\\\"\"\"");
        let _ = writeln!(out, "{indent}\"\"\"");
        for line in escaped.lines() {
            let _ = writeln!(out, "{indent}{line}");
        }
        let _ = writeln!(out, "{indent}\"\"\"");
    }
}
