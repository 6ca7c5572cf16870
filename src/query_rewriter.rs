use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::computed_fields::required_alias;
use crate::error::ReshapeError;
use crate::schema_merger::{MergedSchema, SubschemaBinding};
use crate::selection::{Field, InlineFragment, InputValue, Selection, SelectionSet};

/// How a delegated field is laid out in the upstream response.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WrapShape {
    /// `{ ns { field { sel } } }`
    #[default]
    Direct,
    /// `{ ns { field { nodes { sel } } } }`
    Nodes,
    /// `{ ns { field { items { edges { node { sel } } } } } }`
    RelayEdges,
    /// `{ ns { viewer { field { sel } } } }`
    ClassicViewer,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WrapTarget {
    pub namespace: Vec<String>,
    pub field_name: String,
    pub shape: WrapShape,
}

impl WrapTarget {
    pub fn direct(field_name: impl Into<String>) -> Self {
        WrapTarget {
            field_name: field_name.into(),
            ..Default::default()
        }
    }

    /// Field names from the upstream root down to the value the client asked for.
    pub(crate) fn upstream_path(&self) -> Vec<&str> {
        let mut path: Vec<&str> = self.namespace.iter().map(String::as_str).collect();
        if self.shape == WrapShape::ClassicViewer {
            path.push("viewer");
        }
        path.push(&self.field_name);
        match self.shape {
            WrapShape::Nodes => path.push("nodes"),
            WrapShape::RelayEdges => path.extend(["items", "edges", "node"]),
            WrapShape::Direct | WrapShape::ClassicViewer => {}
        }
        path
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Connection {
    Plain,
    Nodes,
    Edges,
}

/// Inverse of a wrap: where the value sits in the upstream data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Unwrap {
    pub path: Vec<String>,
    pub connection: Connection,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WrappedQuery {
    pub selection_set: SelectionSet,
    pub unwrap: Unwrap,
}

pub fn wrap_query(
    target: &WrapTarget,
    selection: SelectionSet,
    arguments: Vec<(String, InputValue)>,
) -> WrappedQuery {
    let field = |selection_set: SelectionSet| {
        Field::new(target.field_name.clone())
            .with_arguments(arguments.clone())
            .with_selection(selection_set)
    };
    let inner = match target.shape {
        WrapShape::Direct => field(selection),
        WrapShape::Nodes => field(SelectionSet::of_field(Field::new("nodes").with_selection(selection))),
        WrapShape::RelayEdges => field(SelectionSet::of_field(
            Field::new("items").with_selection(SelectionSet::of_field(
                Field::new("edges")
                    .with_selection(SelectionSet::of_field(Field::new("node").with_selection(selection))),
            )),
        )),
        WrapShape::ClassicViewer => {
            Field::new("viewer").with_selection(SelectionSet::of_field(field(selection)))
        }
    };
    let selection_set = target
        .namespace
        .iter()
        .rev()
        .fold(SelectionSet::of_field(inner), |inner, namespace| {
            SelectionSet::of_field(Field::new(namespace.clone()).with_selection(inner))
        });

    let mut path = target.namespace.clone();
    if target.shape == WrapShape::ClassicViewer {
        path.push("viewer".to_string());
    }
    path.push(target.field_name.clone());
    let connection = match target.shape {
        WrapShape::Direct | WrapShape::ClassicViewer => Connection::Plain,
        WrapShape::Nodes => Connection::Nodes,
        WrapShape::RelayEdges => {
            path.push("items".to_string());
            Connection::Edges
        }
    };
    WrappedQuery {
        selection_set,
        unwrap: Unwrap { path, connection },
    }
}

impl Unwrap {
    /// Extracts the delegated value. Shape mismatches are logged and become `null`.
    pub fn apply(&self, data: Value) -> Value {
        match self.try_apply(data) {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(%error, "upstream response does not match the expected shape");
                Value::Null
            }
        }
    }

    pub fn try_apply(&self, data: Value) -> Result<Value, ReshapeError> {
        let mut current = data;
        for (depth, key) in self.path.iter().enumerate() {
            current = match current {
                Value::Null => return Ok(Value::Null),
                Value::Object(mut object) => object.remove(key).unwrap_or(Value::Null),
                other => return Err(self.mismatch(depth, "object", &other)),
            };
        }

        match self.connection {
            Connection::Plain => Ok(current),
            Connection::Nodes => match self.take(current, "nodes")? {
                value @ (Value::Null | Value::Array(_)) => Ok(value),
                other => Err(self.mismatch(self.path.len(), "list", &other)),
            },
            Connection::Edges => match self.take(current, "edges")? {
                Value::Null => Ok(Value::Null),
                Value::Array(edges) => edges
                    .into_iter()
                    .map(|edge| self.take(edge, "node"))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array),
                other => Err(self.mismatch(self.path.len(), "list", &other)),
            },
        }
    }

    fn take(&self, value: Value, key: &str) -> Result<Value, ReshapeError> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::Object(mut object) => Ok(object.remove(key).unwrap_or(Value::Null)),
            other => Err(ReshapeError {
                path: format!("{}.{key}", self.path.join(".")),
                expected: "object",
                found: json_kind(&other),
            }),
        }
    }

    fn mismatch(&self, depth: usize, expected: &'static str, found: &Value) -> ReshapeError {
        ReshapeError {
            path: self.path[..depth.min(self.path.len())].join("."),
            expected,
            found: json_kind(found),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

/// Converts JSON arguments into GraphQL literals for an outgoing field.
///
/// Null arguments are dropped. Top-level lists are printed as bare enum
/// identifiers (`[News, Music]`), which is what the list-typed filter
/// arguments of the upstreams expect; everything nested is converted
/// structurally.
pub fn arguments_from_json(arguments: &Map<String, Value>) -> Vec<(String, InputValue)> {
    arguments
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(name, value)| {
            let literal = match value {
                Value::Array(items) => InputValue::List(
                    items
                        .iter()
                        .map(|item| match item {
                            Value::String(identifier) => InputValue::Enum(identifier.clone()),
                            other => literal_from_json(other),
                        })
                        .collect(),
                ),
                other => literal_from_json(other),
            };
            (name.clone(), literal)
        })
        .collect()
}

pub(crate) fn literal_from_json(value: &Value) -> InputValue {
    match value {
        Value::Null => InputValue::Null,
        Value::Bool(boolean) => InputValue::Boolean(*boolean),
        Value::Number(number) => match number.as_i64() {
            Some(int) => InputValue::Int(int),
            None => InputValue::Float(number.as_f64().unwrap_or_default()),
        },
        Value::String(string) => InputValue::String(string.clone()),
        Value::Array(items) => InputValue::List(items.iter().map(literal_from_json).collect()),
        Value::Object(fields) => InputValue::Object(
            fields
                .iter()
                .map(|(name, value)| (name.clone(), literal_from_json(value)))
                .collect(),
        ),
    }
}

/// Rewrites a client selection into what one binding can answer.
pub struct QueryRewriter<'a> {
    merged: &'a MergedSchema,
    binding: &'a SubschemaBinding,
}

impl<'a> QueryRewriter<'a> {
    pub fn new(merged: &'a MergedSchema, binding: &'a SubschemaBinding) -> Self {
        QueryRewriter { merged, binding }
    }

    /// `merged_type` is the merged type of the selection; `upstream_scope` the
    /// binding type answering it, or `None` when it could not be determined,
    /// in which case every non-computed field is forwarded.
    pub fn rewrite(
        &self,
        merged_type: &str,
        upstream_scope: Option<&str>,
        selection: &SelectionSet,
    ) -> SelectionSet {
        let mut out = self.rewrite_items(merged_type, upstream_scope, selection, true);
        if !selection.is_empty() && self.merged.is_abstract(merged_type) {
            let mut injected = SelectionSet::of_field(Field::new("__typename"));
            if let Some(resolver) = self.merged.type_resolver(merged_type) {
                let discriminant = resolver.discriminant();
                let available = upstream_scope.is_none_or(|scope| {
                    self.binding.schema.descriptor.field(scope, discriminant).is_some()
                });
                if available {
                    injected.items.push(Selection::Field(Field::new(discriminant)));
                }
            }
            out.merge(injected);
        }
        out
    }

    /// With `resolve_computed` unset, fields are taken as upstream fields even
    /// when a computed field of the same name exists (required selections).
    fn rewrite_items(
        &self,
        merged_type: &str,
        upstream_scope: Option<&str>,
        selection: &SelectionSet,
        resolve_computed: bool,
    ) -> SelectionSet {
        let descriptor = &self.binding.schema.descriptor;
        let mut client_fields = Vec::new();
        if resolve_computed {
            collect_client_fields(selection, &mut client_fields);
        }
        let mut out = SelectionSet::default();
        for item in &selection.items {
            match item {
                Selection::Field(field) if field.name == "__typename" => {
                    out.merge(SelectionSet::of_field(field.clone()));
                }
                Selection::Field(field) => {
                    let computed = resolve_computed
                        .then(|| self.merged.computed_field(merged_type, &field.name))
                        .flatten();
                    if let Some(computed) = computed {
                        let mut requires = self.rewrite_items(merged_type, upstream_scope, &computed.requires, false);
                        alias_conflicting(&mut requires, &client_fields);
                        out.merge(requires);
                        continue;
                    }
                    let upstream_field = match upstream_scope {
                        Some(scope) => match descriptor.field(scope, &field.name) {
                            Some(def) => Some(def),
                            None => continue,
                        },
                        None => None,
                    };
                    let child_merged = self
                        .merged
                        .field_def(merged_type, &field.name)
                        .map(|def| def.ty.name())
                        .or_else(|| upstream_field.map(|def| def.ty.name()))
                        .unwrap_or_default()
                        .to_string();
                    let child_scope = upstream_field.map(|def| def.ty.name());
                    let rewritten = Field {
                        selection_set: if field.selection_set.is_empty() {
                            SelectionSet::default()
                        } else {
                            self.rewrite(&child_merged, child_scope, &field.selection_set)
                        },
                        ..field.clone()
                    };
                    out.merge(SelectionSet::of_field(rewritten));
                }
                Selection::InlineFragment(fragment) => match &fragment.type_condition {
                    Some(condition) if descriptor.types.contains_key(condition) => {
                        let upstream_condition = self.binding.schema.upstream_type_name(condition);
                        out.merge(SelectionSet::new(vec![Selection::InlineFragment(InlineFragment {
                            type_condition: Some(upstream_condition.to_string()),
                            selection_set: self.rewrite(condition, Some(condition), &fragment.selection_set),
                        })]));
                    }
                    Some(local) => {
                        out.merge(self.rewrite_items(local, upstream_scope, &fragment.selection_set, resolve_computed));
                    }
                    None => {
                        out.merge(self.rewrite_items(merged_type, upstream_scope, &fragment.selection_set, resolve_computed));
                    }
                },
            }
        }
        out
    }
}

/// Fields the client selected at this level, fragments included.
fn collect_client_fields<'s>(selection: &'s SelectionSet, out: &mut Vec<&'s Field>) {
    for item in &selection.items {
        match item {
            Selection::Field(field) => out.push(field),
            Selection::InlineFragment(fragment) => collect_client_fields(&fragment.selection_set, out),
        }
    }
}

/// Moves required fields whose response key a different client field uses
/// under a reserved alias.
fn alias_conflicting(requires: &mut SelectionSet, client_fields: &[&Field]) {
    for item in &mut requires.items {
        match item {
            Selection::Field(field) => {
                let taken = client_fields.iter().any(|client| {
                    client.response_key() == field.response_key()
                        && (client.name != field.name || client.arguments != field.arguments)
                });
                if taken {
                    field.alias = Some(required_alias(&field.name));
                }
            }
            Selection::InlineFragment(fragment) => alias_conflicting(&mut fragment.selection_set, client_fields),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::computed_fields::ComputedField;
    use crate::query_executor::{LocalQueryExecutor, QueryExecutor, UpstreamResponse};
    use crate::schema_descriptor::SchemaDescriptor;
    use crate::schema_merger::SchemaMerger;
    use futures::FutureExt;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use serde_json::json;

    fn selection() -> SelectionSet {
        SelectionSet::parse("{ name }").unwrap()
    }

    fn id_argument() -> Vec<(String, InputValue)> {
        vec![("id".to_string(), InputValue::String("123".to_string()))]
    }

    #[test]
    fn wraps_every_shape() {
        let cases = [
            (WrapShape::Direct, r#"{ catalog { item(id: "123") { name } } }"#),
            (WrapShape::Nodes, r#"{ catalog { item(id: "123") { nodes { name } } } }"#),
            (
                WrapShape::RelayEdges,
                r#"{ catalog { item(id: "123") { items { edges { node { name } } } } } }"#,
            ),
            (WrapShape::ClassicViewer, r#"{ catalog { viewer { item(id: "123") { name } } } }"#),
        ];
        for (shape, expected) in cases {
            let target = WrapTarget {
                namespace: vec!["catalog".to_string()],
                field_name: "item".to_string(),
                shape,
            };
            let wrapped = wrap_query(&target, selection(), id_argument());
            assert_eq!(wrapped.selection_set.to_string(), expected, "{shape:?}");
        }
    }

    #[test]
    fn unwrap_inverts_wrap() {
        let value = json!({ "name": "Foo bar 42" });
        let list = json!([{ "name": "a" }, { "name": "b" }]);
        let cases = [
            (WrapShape::Direct, json!({ "item": value.clone() }), value.clone()),
            (WrapShape::Nodes, json!({ "item": { "nodes": list.clone() } }), list.clone()),
            (
                WrapShape::RelayEdges,
                json!({ "item": { "items": { "edges": [{ "node": { "name": "a" } }, { "node": { "name": "b" } }] } } }),
                list.clone(),
            ),
            (WrapShape::ClassicViewer, json!({ "viewer": { "item": value.clone() } }), value.clone()),
        ];
        for (shape, response, expected) in cases {
            let target = WrapTarget {
                field_name: "item".to_string(),
                shape,
                ..Default::default()
            };
            let wrapped = wrap_query(&target, selection(), id_argument());
            assert_eq!(wrapped.unwrap.try_apply(response).unwrap(), expected, "{shape:?}");
        }
    }

    #[test]
    fn unwrap_tolerates_nulls_and_reports_mismatches() {
        let unwrap = wrap_query(
            &WrapTarget {
                namespace: vec!["catalog".to_string()],
                field_name: "items".to_string(),
                shape: WrapShape::Nodes,
            },
            selection(),
            Vec::new(),
        )
        .unwrap;

        assert_eq!(unwrap.apply(json!({ "catalog": null })), Value::Null);
        assert_eq!(unwrap.apply(json!({ "catalog": { "items": null } })), Value::Null);

        let error = unwrap.try_apply(json!({ "catalog": "oops" })).unwrap_err();
        assert_eq!(error.path, "catalog");
        assert_eq!(error.expected, "object");
        assert_eq!(error.found, "string");
        assert_eq!(unwrap.apply(json!({ "catalog": { "items": { "nodes": 3 } } })), Value::Null);
    }

    #[test]
    fn converts_json_arguments_to_literals() {
        let arguments = json!({
            "id": "123",
            "types": ["News", "Music"],
            "first": 10,
            "ratio": 0.5,
            "live": true,
            "skip": null,
            "filter": { "title": "Radio", "tags": ["a"] }
        });
        let literals = arguments_from_json(arguments.as_object().unwrap());
        let printed: Vec<String> = literals
            .iter()
            .map(|(name, value)| format!("{name}: {value}"))
            .collect();
        assert_eq!(
            printed,
            vec![
                r#"id: "123""#,
                "types: [News, Music]",
                "first: 10",
                "ratio: 0.5",
                "live: true",
                r#"filter: {title: "Radio", tags: ["a"]}"#,
            ]
        );
    }

    fn labelled_items() -> MergedSchema {
        let executor: Arc<dyn QueryExecutor> = Arc::new(LocalQueryExecutor::new(|_, _, _| {
            async { Ok(UpstreamResponse::data(Value::Null)) }.boxed()
        }));
        let descriptor = SchemaDescriptor::parse(
            "type Query { item: Item } type Item { id: ID! name: String title: String }",
            "items",
        )
        .unwrap();
        let binding = SubschemaBinding::build("items", descriptor, &[], executor, false).unwrap();
        SchemaMerger::new()
            .add_binding(binding)
            .type_defs("extend type Item { label: String }")
            .merge()
            .unwrap()
            .layer(vec![ComputedField::from_path(
                "Item",
                "label",
                SelectionSet::parse("{ name }").unwrap(),
                "name",
            )])
            .unwrap()
    }

    #[test]
    fn aliases_required_fields_hidden_by_client_aliases() {
        let merged = labelled_items();
        let rewriter = QueryRewriter::new(&merged, merged.binding("items").unwrap());

        let rewritten = rewriter.rewrite("Item", Some("Item"), &SelectionSet::parse("{ name: title label }").unwrap());
        assert_eq!(rewritten.to_string(), "{ name: title __req_name: name }");

        let rewritten = rewriter.rewrite("Item", Some("Item"), &SelectionSet::parse("{ label name }").unwrap());
        assert_eq!(rewritten.to_string(), "{ name }");
    }
}
