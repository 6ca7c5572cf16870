use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::selection::SelectionSet;

pub type ComputedResolver = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Alias prefix for required fields whose name is taken by a client alias.
pub(crate) const REQUIRED_ALIAS_PREFIX: &str = "__req_";

/// A field whose value is derived from data already fetched for its parent.
///
/// The `requires` selection is added to the upstream query in place of the
/// field itself; the resolver then receives the raw parent object.
#[derive(Clone)]
pub struct ComputedField {
    pub type_name: String,
    pub field_name: String,
    pub requires: SelectionSet,
    resolver: ComputedResolver,
}

impl ComputedField {
    pub fn new<F>(
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        requires: SelectionSet,
        resolver: F,
    ) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        ComputedField {
            type_name: type_name.into(),
            field_name: field_name.into(),
            requires,
            resolver: Arc::new(resolver),
        }
    }

    /// Resolves to the value found at a dotted path, e.g. `imageFiles.nodes.0.publicLocation`.
    /// Numeric segments index into lists.
    pub fn from_path(
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        requires: SelectionSet,
        path: &str,
    ) -> Self {
        let pointer: String = path
            .split('.')
            .filter(|segment| !segment.is_empty())
            .map(|segment| format!("/{}", segment.replace('~', "~0").replace('/', "~1")))
            .collect();
        ComputedField::new(type_name, field_name, requires, move |parent| {
            parent.pointer(&pointer).cloned().unwrap_or(Value::Null)
        })
    }

    pub fn constant(type_name: impl Into<String>, field_name: impl Into<String>, value: Value) -> Self {
        ComputedField::new(type_name, field_name, SelectionSet::default(), move |_| value.clone())
    }

    /// Runs the resolver. Required fields fetched under a reserved alias are
    /// seen under their own name.
    pub fn resolve(&self, parent: &Value) -> Value {
        match required_view(parent) {
            Some(view) => (self.resolver)(&view),
            None => (self.resolver)(parent),
        }
    }
}

pub(crate) fn required_alias(field_name: &str) -> String {
    format!("{REQUIRED_ALIAS_PREFIX}{field_name}")
}

fn required_view(parent: &Value) -> Option<Value> {
    let object = parent.as_object()?;
    if !object.keys().any(|key| key.starts_with(REQUIRED_ALIAS_PREFIX)) {
        return None;
    }
    let mut view = object.clone();
    for (key, value) in object {
        if let Some(name) = key.strip_prefix(REQUIRED_ALIAS_PREFIX) {
            view.insert(name.to_string(), value.clone());
        }
    }
    Some(Value::Object(view))
}

impl fmt::Debug for ComputedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputedField")
            .field("type_name", &self.type_name)
            .field("field_name", &self.field_name)
            .field("requires", &self.requires.to_string())
            .finish()
    }
}
