use serde_json::{Map, Value};

use crate::schema_merger::{MergedSchema, SubschemaBinding};
use crate::selection::{Field, Selection, SelectionSet};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Source {
    /// Upstream data, keyed by response key.
    Upstream,
    /// Values produced by computed resolvers, keyed by field name.
    Local,
}

/// Projects an unwrapped upstream value onto the client's selection.
pub struct ResponseShaper<'a> {
    merged: &'a MergedSchema,
    binding: &'a SubschemaBinding,
}

impl<'a> ResponseShaper<'a> {
    pub fn new(merged: &'a MergedSchema, binding: &'a SubschemaBinding) -> Self {
        ResponseShaper { merged, binding }
    }

    pub fn shape(&self, declared_type: &str, selection: &SelectionSet, value: &Value) -> Value {
        self.shape_value(declared_type, selection, value, Source::Upstream)
    }

    fn shape_value(&self, declared_type: &str, selection: &SelectionSet, value: &Value, source: Source) -> Value {
        match value {
            Value::Null => Value::Null,
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.shape_value(declared_type, selection, item, source))
                    .collect(),
            ),
            Value::Object(object) if !selection.is_empty() => {
                Value::Object(self.shape_object(declared_type, selection, value, object, source))
            }
            other => other.clone(),
        }
    }

    fn shape_object(
        &self,
        declared_type: &str,
        selection: &SelectionSet,
        raw: &Value,
        object: &Map<String, Value>,
        source: Source,
    ) -> Map<String, Value> {
        let concrete = self.merged.resolve_concrete_type(declared_type, self.binding, raw);
        let mut grouped: Vec<(&str, Vec<&Field>)> = Vec::new();
        self.collect_fields(&concrete, selection, &mut grouped);

        let mut out = Map::new();
        for (key, fields) in grouped {
            let field = fields[0];
            let value = if field.name == "__typename" {
                Value::String(concrete.clone())
            } else if let Some(computed) = self.merged.computed_field(&concrete, &field.name) {
                let value = computed.resolve(raw);
                let child_type = self.child_type(&concrete, declared_type, &field.name);
                self.shape_value(&child_type, &merge_selections(&fields), &value, Source::Local)
            } else {
                let lookup = match source {
                    Source::Upstream => key,
                    Source::Local => field.name.as_str(),
                };
                let child_type = self.child_type(&concrete, declared_type, &field.name);
                match object.get(lookup) {
                    Some(value) => self.shape_value(&child_type, &merge_selections(&fields), value, source),
                    None => Value::Null,
                }
            };
            out.insert(key.to_string(), value);
        }
        out
    }

    fn child_type(&self, concrete: &str, declared: &str, field: &str) -> String {
        self.merged
            .field_def(concrete, field)
            .or_else(|| self.merged.field_def(declared, field))
            .map(|def| def.ty.name().to_string())
            .unwrap_or_default()
    }

    fn collect_fields<'s>(&self, concrete: &str, selection: &'s SelectionSet, grouped: &mut Vec<(&'s str, Vec<&'s Field>)>) {
        for item in &selection.items {
            match item {
                Selection::Field(field) => {
                    let key = field.response_key();
                    match grouped.iter_mut().find(|(existing, _)| *existing == key) {
                        Some((_, fields)) => fields.push(field),
                        None => grouped.push((key, vec![field])),
                    }
                }
                Selection::InlineFragment(fragment) => {
                    let applies = fragment
                        .type_condition
                        .as_deref()
                        .is_none_or(|condition| self.merged.type_applies(concrete, condition));
                    if applies {
                        self.collect_fields(concrete, &fragment.selection_set, grouped);
                    }
                }
            }
        }
    }
}

fn merge_selections(fields: &[&Field]) -> SelectionSet {
    match fields {
        [single] => single.selection_set.clone(),
        _ => SelectionSet::new(
            fields
                .iter()
                .flat_map(|field| field.selection_set.items.iter().cloned())
                .collect(),
        ),
    }
}
