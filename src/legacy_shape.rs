use serde_json::Value;

use crate::Operation;
use crate::selection::{Document, Field, Selection, SelectionSet};

const VIEWER: &str = "viewer";

/// Adapts upstreams that expose every query field under `viewer`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LegacyShapeAdapter {
    root_field: String,
}

impl LegacyShapeAdapter {
    pub fn viewer() -> Self {
        LegacyShapeAdapter {
            root_field: VIEWER.to_string(),
        }
    }

    pub fn root_field(&self) -> &str {
        &self.root_field
    }

    fn needs_wrap(&self, document: &Document) -> bool {
        if document.operation != Operation::Query {
            return false;
        }
        let items = &document.selection_set.items;
        let already_wrapped = matches!(
            items.as_slice(),
            [Selection::Field(field)] if field.alias.is_none() && field.name == self.root_field
        );
        let introspection = items.iter().any(|item| {
            matches!(item, Selection::Field(field) if field.name == "__schema" || field.name == "__type")
        });
        !already_wrapped && !introspection
    }

    /// Wraps the top level in `viewer { ... }`. The flag tells [`unwrap`](Self::unwrap)
    /// whether anything was wrapped.
    pub fn wrap(&self, mut document: Document) -> (Document, bool) {
        if !self.needs_wrap(&document) {
            return (document, false);
        }
        let selection = std::mem::take(&mut document.selection_set);
        document.selection_set =
            SelectionSet::of_field(Field::new(self.root_field.clone()).with_selection(selection));
        (document, true)
    }

    pub fn unwrap(&self, data: Value, wrapped: bool) -> Value {
        if !wrapped {
            return data;
        }
        match data {
            Value::Object(mut object) => object.remove(&self.root_field).unwrap_or(Value::Null),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn document(query: &str) -> Document {
        Document::query(SelectionSet::parse(query).unwrap())
    }

    #[test]
    fn wraps_and_unwraps_the_classic_example() {
        let adapter = LegacyShapeAdapter::viewer();
        let (wrapped, did_wrap) = adapter.wrap(document(r#"{ item(id: "123") { name } }"#));
        assert!(did_wrap);
        assert_eq!(wrapped.to_string(), r#"{ viewer { item(id: "123") { name } } }"#);

        let data = json!({ "viewer": { "item": { "name": "Foo bar 42" } } });
        assert_eq!(adapter.unwrap(data, did_wrap), json!({ "item": { "name": "Foo bar 42" } }));
    }

    #[test]
    fn wrapping_is_idempotent() {
        let adapter = LegacyShapeAdapter::viewer();
        let (once, _) = adapter.wrap(document("{ item { name } }"));
        let (twice, wrapped_again) = adapter.wrap(once.clone());
        assert!(!wrapped_again);
        assert_eq!(once, twice);

        let data = json!({ "viewer": { "item": null } });
        assert_eq!(adapter.unwrap(data.clone(), wrapped_again), data);
    }

    #[test]
    fn leaves_aliased_viewer_introspection_and_mutations_alone() {
        let adapter = LegacyShapeAdapter::viewer();
        assert!(adapter.wrap(document("{ v: viewer { id } }")).1);
        assert!(!adapter.wrap(document("{ __schema { queryType { name } } }")).1);

        let mut mutation = document("{ like(id: 1) { id } }");
        mutation.operation = Operation::Mutation;
        assert!(!adapter.wrap(mutation).1);
    }

    #[test]
    fn unwrapping_missing_viewer_yields_null() {
        let adapter = LegacyShapeAdapter::viewer();
        assert_eq!(adapter.unwrap(json!({}), true), Value::Null);
        assert_eq!(adapter.unwrap(Value::Null, true), Value::Null);
    }
}
