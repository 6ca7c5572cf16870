//! Introspection in both directions: reading an upstream's `__schema` into a
//! [`SchemaDescriptor`], and answering `__schema`/`__type` for clients of the
//! merged schema.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::schema_descriptor::{
    BUILTIN_SCALARS, EnumValueDef, FieldDef, InputValueDef, SchemaDescriptor, TypeDef, TypeKind,
    TypeRef, is_builtin_type,
};
use crate::selection::{Field, Selection, SelectionSet};

pub const INTROSPECTION_QUERY: &str = r#"
query IntrospectionQuery {
  __schema {
    queryType { name }
    mutationType { name }
    subscriptionType { name }
    types { ...FullType }
  }
}

fragment FullType on __Type {
  kind
  name
  description
  fields(includeDeprecated: true) {
    name
    description
    args { ...InputValue }
    type { ...TypeRef }
    isDeprecated
    deprecationReason
  }
  inputFields { ...InputValue }
  interfaces { ...TypeRef }
  enumValues(includeDeprecated: true) {
    name
    description
    isDeprecated
    deprecationReason
  }
  possibleTypes { ...TypeRef }
}

fragment InputValue on __InputValue {
  name
  description
  type { ...TypeRef }
  defaultValue
}

fragment TypeRef on __Type {
  kind
  name
  ofType {
    kind
    name
    ofType {
      kind
      name
      ofType {
        kind
        name
        ofType {
          kind
          name
          ofType {
            kind
            name
          }
        }
      }
    }
  }
}
"#;

#[derive(Deserialize)]
struct IntrospectionData {
    #[serde(rename = "__schema")]
    schema: IntrospectionSchema,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntrospectionSchema {
    query_type: Option<NamedRef>,
    mutation_type: Option<NamedRef>,
    subscription_type: Option<NamedRef>,
    types: Vec<FullType>,
}

#[derive(Deserialize)]
struct NamedRef {
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FullType {
    kind: TypeKind,
    name: String,
    description: Option<String>,
    fields: Option<Vec<IntrospectedField>>,
    input_fields: Option<Vec<IntrospectedInputValue>>,
    interfaces: Option<Vec<NamedRef>>,
    enum_values: Option<Vec<IntrospectedEnumValue>>,
    possible_types: Option<Vec<NamedRef>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntrospectedField {
    name: String,
    description: Option<String>,
    #[serde(default)]
    args: Vec<IntrospectedInputValue>,
    #[serde(rename = "type")]
    ty: IntrospectedTypeRef,
    #[serde(default)]
    is_deprecated: bool,
    deprecation_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntrospectedInputValue {
    name: String,
    description: Option<String>,
    #[serde(rename = "type")]
    ty: IntrospectedTypeRef,
    default_value: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntrospectedEnumValue {
    name: String,
    description: Option<String>,
    #[serde(default)]
    is_deprecated: bool,
    deprecation_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntrospectedTypeRef {
    kind: String,
    name: Option<String>,
    of_type: Option<Box<IntrospectedTypeRef>>,
}

impl IntrospectedTypeRef {
    fn into_type_ref(self) -> Result<TypeRef, String> {
        match (self.kind.as_str(), self.of_type) {
            ("NON_NULL", Some(inner)) => Ok(TypeRef::NonNull(Box::new(inner.into_type_ref()?))),
            ("LIST", Some(inner)) => Ok(TypeRef::List(Box::new(inner.into_type_ref()?))),
            (kind, _) => self
                .name
                .map(TypeRef::Named)
                .ok_or_else(|| format!("type reference of kind {kind} has no name")),
        }
    }
}

impl IntrospectedInputValue {
    fn into_def(self) -> Result<InputValueDef, String> {
        Ok(InputValueDef {
            name: self.name,
            description: self.description,
            ty: self.ty.into_type_ref()?,
            default_value: self.default_value,
        })
    }
}

fn deprecation(is_deprecated: bool, reason: Option<String>) -> Option<String> {
    is_deprecated.then(|| reason.unwrap_or_else(|| "No longer supported".to_string()))
}

/// Reads an introspection result (`{"__schema": ...}`, optionally under `data`).
pub fn descriptor_from_introspection(value: &Value) -> Result<SchemaDescriptor, String> {
    let value = value.get("data").unwrap_or(value);
    let data = IntrospectionData::deserialize(value).map_err(|e| e.to_string())?;
    let schema = data.schema;

    let mut descriptor = SchemaDescriptor {
        query_type: schema.query_type.map(|named| named.name),
        mutation_type: schema.mutation_type.map(|named| named.name),
        subscription_type: schema.subscription_type.map(|named| named.name),
        types: Default::default(),
    };
    for full in schema.types {
        if is_builtin_type(&full.name) {
            continue;
        }
        let mut def = TypeDef::new(full.name, full.kind);
        def.description = full.description;
        for field in full.fields.unwrap_or_default() {
            def.fields.push(FieldDef {
                name: field.name,
                description: field.description,
                arguments: field
                    .args
                    .into_iter()
                    .map(IntrospectedInputValue::into_def)
                    .collect::<Result<_, _>>()?,
                ty: field.ty.into_type_ref()?,
                deprecation: deprecation(field.is_deprecated, field.deprecation_reason),
            });
        }
        def.input_fields = full
            .input_fields
            .unwrap_or_default()
            .into_iter()
            .map(IntrospectedInputValue::into_def)
            .collect::<Result<_, _>>()?;
        def.interfaces = full
            .interfaces
            .unwrap_or_default()
            .into_iter()
            .map(|named| named.name)
            .collect();
        if def.kind == TypeKind::Union {
            def.members = full
                .possible_types
                .unwrap_or_default()
                .into_iter()
                .map(|named| named.name)
                .collect();
        }
        def.enum_values = full
            .enum_values
            .unwrap_or_default()
            .into_iter()
            .map(|value| EnumValueDef {
                name: value.name,
                description: value.description,
                deprecation: deprecation(value.is_deprecated, value.deprecation_reason),
            })
            .collect();
        descriptor.types.insert(def.name.clone(), def);
    }
    Ok(descriptor)
}

/// Client-facing introspection of a schema, materialised once.
#[derive(Clone, Debug, Default)]
pub struct SchemaIntrospection {
    schema: Value,
    types: HashMap<String, Value>,
}

impl SchemaIntrospection {
    pub fn new(descriptor: &SchemaDescriptor) -> Self {
        let mut types = HashMap::new();
        for scalar in BUILTIN_SCALARS {
            types.insert(scalar.to_string(), builtin_scalar_json(scalar));
        }
        for def in descriptor.types.values() {
            types.insert(def.name.clone(), type_json(def, descriptor));
        }
        let mut names: Vec<&String> = types.keys().collect();
        names.sort();
        let all_types: Vec<Value> = names.iter().map(|name| types[*name].clone()).collect();

        let root = |name: Option<&str>| name.map_or(Value::Null, |name| named_ref("OBJECT", name));
        let schema = json!({
            "__typename": "__Schema",
            "description": null,
            "queryType": root(descriptor.query_type.as_deref()),
            "mutationType": root(descriptor.mutation_type.as_deref()),
            "subscriptionType": root(descriptor.subscription_type.as_deref()),
            "types": all_types,
            "directives": directives_json(),
        });
        SchemaIntrospection { schema, types }
    }

    /// Resolves a `__schema` or `__type(name:)` root field.
    pub fn resolve(&self, field: &Field, variables: &Map<String, Value>) -> Value {
        match field.name.as_str() {
            "__schema" => self.project(&self.schema, &field.selection_set, variables),
            "__type" => match field.argument("name", variables) {
                Some(Value::String(name)) => self
                    .types
                    .get(&name)
                    .map_or(Value::Null, |def| self.project(def, &field.selection_set, variables)),
                _ => Value::Null,
            },
            _ => Value::Null,
        }
    }

    fn project(&self, value: &Value, selection: &SelectionSet, variables: &Map<String, Value>) -> Value {
        match value {
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.project(item, selection, variables))
                    .collect(),
            ),
            Value::Object(object) => {
                let mut out = Map::new();
                self.project_into(object, selection, variables, &mut out);
                Value::Object(out)
            }
            other => other.clone(),
        }
    }

    fn project_into(
        &self,
        object: &Map<String, Value>,
        selection: &SelectionSet,
        variables: &Map<String, Value>,
        out: &mut Map<String, Value>,
    ) {
        let typename = object.get("__typename").and_then(Value::as_str).unwrap_or_default();
        for item in &selection.items {
            match item {
                Selection::Field(field) => {
                    let raw = match object.get(&field.name) {
                        Some(value) => Some(value),
                        // type references only carry kind, name and ofType
                        None if typename == "__Type" => object
                            .get("name")
                            .and_then(Value::as_str)
                            .and_then(|name| self.types.get(name))
                            .and_then(|full| full.get(&field.name)),
                        None => None,
                    };
                    let value = match raw {
                        Some(Value::Array(items))
                            if matches!(field.name.as_str(), "fields" | "enumValues")
                                && field.argument("includeDeprecated", variables) != Some(Value::Bool(true)) =>
                        {
                            let current: Vec<Value> = items
                                .iter()
                                .filter(|item| item.get("isDeprecated") != Some(&Value::Bool(true)))
                                .cloned()
                                .collect();
                            self.project(&Value::Array(current), &field.selection_set, variables)
                        }
                        Some(value) if !field.selection_set.is_empty() => {
                            self.project(value, &field.selection_set, variables)
                        }
                        Some(value) => value.clone(),
                        None => Value::Null,
                    };
                    out.insert(field.response_key().to_string(), value);
                }
                Selection::InlineFragment(fragment) => {
                    let applies = fragment
                        .type_condition
                        .as_deref()
                        .is_none_or(|condition| condition == typename);
                    if applies {
                        self.project_into(object, &fragment.selection_set, variables, out);
                    }
                }
            }
        }
    }
}

fn kind_name(kind: TypeKind) -> &'static str {
    match kind {
        TypeKind::Scalar => "SCALAR",
        TypeKind::Object => "OBJECT",
        TypeKind::Interface => "INTERFACE",
        TypeKind::Union => "UNION",
        TypeKind::Enum => "ENUM",
        TypeKind::InputObject => "INPUT_OBJECT",
    }
}

fn named_ref(kind: &str, name: &str) -> Value {
    json!({ "__typename": "__Type", "kind": kind, "name": name, "ofType": null })
}

fn type_ref_json(ty: &TypeRef, descriptor: &SchemaDescriptor) -> Value {
    match ty {
        TypeRef::Named(name) => {
            let kind = descriptor
                .type_def(name)
                .map_or("SCALAR", |def| kind_name(def.kind));
            named_ref(kind, name)
        }
        TypeRef::List(inner) => json!({
            "__typename": "__Type", "kind": "LIST", "name": null,
            "ofType": type_ref_json(inner, descriptor),
        }),
        TypeRef::NonNull(inner) => json!({
            "__typename": "__Type", "kind": "NON_NULL", "name": null,
            "ofType": type_ref_json(inner, descriptor),
        }),
    }
}

fn input_value_json(value: &InputValueDef, descriptor: &SchemaDescriptor) -> Value {
    json!({
        "__typename": "__InputValue",
        "name": value.name,
        "description": value.description,
        "type": type_ref_json(&value.ty, descriptor),
        "defaultValue": value.default_value,
    })
}

fn type_json(def: &TypeDef, descriptor: &SchemaDescriptor) -> Value {
    let has_fields = matches!(def.kind, TypeKind::Object | TypeKind::Interface);
    let fields = has_fields.then(|| {
        def.fields
            .iter()
            .map(|field| {
                json!({
                    "__typename": "__Field",
                    "name": field.name,
                    "description": field.description,
                    "args": field.arguments.iter().map(|arg| input_value_json(arg, descriptor)).collect::<Vec<_>>(),
                    "type": type_ref_json(&field.ty, descriptor),
                    "isDeprecated": field.deprecation.is_some(),
                    "deprecationReason": field.deprecation,
                })
            })
            .collect::<Vec<_>>()
    });
    let interfaces = has_fields.then(|| {
        def.interfaces
            .iter()
            .map(|name| named_ref("INTERFACE", name))
            .collect::<Vec<_>>()
    });
    let possible_types = def.is_abstract().then(|| {
        descriptor
            .possible_types(&def.name)
            .into_iter()
            .map(|name| named_ref("OBJECT", name))
            .collect::<Vec<_>>()
    });
    let enum_values = (def.kind == TypeKind::Enum).then(|| {
        def.enum_values
            .iter()
            .map(|value| {
                json!({
                    "__typename": "__EnumValue",
                    "name": value.name,
                    "description": value.description,
                    "isDeprecated": value.deprecation.is_some(),
                    "deprecationReason": value.deprecation,
                })
            })
            .collect::<Vec<_>>()
    });
    let input_fields = (def.kind == TypeKind::InputObject).then(|| {
        def.input_fields
            .iter()
            .map(|field| input_value_json(field, descriptor))
            .collect::<Vec<_>>()
    });
    json!({
        "__typename": "__Type",
        "kind": kind_name(def.kind),
        "name": def.name,
        "description": def.description,
        "specifiedByURL": null,
        "fields": fields,
        "interfaces": interfaces,
        "possibleTypes": possible_types,
        "enumValues": enum_values,
        "inputFields": input_fields,
        "ofType": null,
    })
}

fn builtin_scalar_json(name: &str) -> Value {
    json!({
        "__typename": "__Type",
        "kind": "SCALAR",
        "name": name,
        "description": null,
        "specifiedByURL": null,
        "fields": null,
        "interfaces": null,
        "possibleTypes": null,
        "enumValues": null,
        "inputFields": null,
        "ofType": null,
    })
}

fn directives_json() -> Value {
    let boolean_arg = |description: &str| {
        json!({
            "__typename": "__InputValue",
            "name": "if",
            "description": description,
            "type": {
                "__typename": "__Type", "kind": "NON_NULL", "name": null,
                "ofType": named_ref("SCALAR", "Boolean"),
            },
            "defaultValue": null,
        })
    };
    json!([
        {
            "__typename": "__Directive",
            "name": "skip",
            "description": "Directs the executor to skip this field or fragment when the `if` argument is true.",
            "isRepeatable": false,
            "locations": ["FIELD", "FRAGMENT_SPREAD", "INLINE_FRAGMENT"],
            "args": [boolean_arg("Skipped when true.")],
        },
        {
            "__typename": "__Directive",
            "name": "include",
            "description": "Directs the executor to include this field or fragment only when the `if` argument is true.",
            "isRepeatable": false,
            "locations": ["FIELD", "FRAGMENT_SPREAD", "INLINE_FRAGMENT"],
            "args": [boolean_arg("Included when true.")],
        },
        {
            "__typename": "__Directive",
            "name": "deprecated",
            "description": "Marks an element of a GraphQL schema as no longer supported.",
            "isRepeatable": false,
            "locations": ["FIELD_DEFINITION", "ARGUMENT_DEFINITION", "INPUT_FIELD_DEFINITION", "ENUM_VALUE"],
            "args": [{
                "__typename": "__InputValue",
                "name": "reason",
                "description": "Explains why this element was deprecated.",
                "type": named_ref("SCALAR", "String"),
                "defaultValue": "\"No longer supported\"",
            }],
        },
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    const SDL: &str = indoc! {r#"
        interface Node {
          id: ID!
        }

        type Clip implements Node {
          id: ID!
          title: String
          name: String @deprecated(reason: "use title")
        }

        enum Class {
          News
          Music
        }

        type Query {
          clip(id: ID!, class: Class = News): Clip
          nodes: [Node!]!
        }
    "#};

    fn field(query: &str) -> Field {
        SelectionSet::parse(query).unwrap().fields().next().cloned().unwrap()
    }

    #[test]
    fn projects_schema_and_type_queries() {
        let descriptor = SchemaDescriptor::parse(SDL, "test").unwrap();
        let introspection = SchemaIntrospection::new(&descriptor);

        let schema = introspection.resolve(&field("{ __schema { queryType { name } mutationType { name } } }"), &Map::new());
        assert_eq!(schema, json!({ "queryType": { "name": "Query" }, "mutationType": null }));

        let clip = introspection.resolve(
            &field(r#"{ __type(name: "Clip") { kind fields { name type { kind ofType { name } } } } }"#),
            &Map::new(),
        );
        assert_eq!(
            clip,
            json!({
                "kind": "OBJECT",
                "fields": [
                    { "name": "id", "type": { "kind": "NON_NULL", "ofType": { "name": "ID" } } },
                    { "name": "title", "type": { "kind": "SCALAR", "ofType": null } },
                ]
            })
        );

        let with_deprecated = introspection.resolve(
            &field(r#"{ __type(name: "Clip") { fields(includeDeprecated: true) { name isDeprecated } } }"#),
            &Map::new(),
        );
        assert_eq!(with_deprecated["fields"].as_array().map(Vec::len), Some(3));
    }

    #[test]
    fn named_references_resolve_to_full_types() {
        let descriptor = SchemaDescriptor::parse(SDL, "test").unwrap();
        let introspection = SchemaIntrospection::new(&descriptor);
        let node = introspection.resolve(
            &field(r#"{ __type(name: "Query") { fields { name type { ofType { ofType { ofType { name possibleTypes { name } } } } } } } }"#),
            &Map::new(),
        );
        assert_eq!(
            node["fields"][1]["type"]["ofType"]["ofType"]["ofType"],
            json!({ "name": "Node", "possibleTypes": [{ "name": "Clip" }] })
        );
        assert_eq!(
            introspection.resolve(&field(r#"{ __type(name: "Missing") { name } }"#), &Map::new()),
            Value::Null
        );
    }

    #[test]
    fn reads_back_its_own_introspection() {
        let descriptor = SchemaDescriptor::parse(SDL, "test").unwrap();
        let introspection = SchemaIntrospection::new(&descriptor);
        let document = graphql_parser::parse_query::<String>(INTROSPECTION_QUERY).unwrap();
        let lowering = crate::selection::Lowering::new(&document, Map::new());
        let graphql_parser::query::Definition::Operation(graphql_parser::query::OperationDefinition::Query(query)) =
            &document.definitions[0]
        else {
            panic!("expected the introspection query first");
        };
        let selection = lowering.selection_set(&query.selection_set, &mut Vec::new()).unwrap();
        let schema_field = selection.fields().next().unwrap();
        let data = json!({ "__schema": introspection.resolve(schema_field, &Map::new()) });

        let read_back = descriptor_from_introspection(&data).unwrap();
        assert_eq!(read_back, descriptor);
    }
}
