use serde_json::{Map, Value, json};

use super::ExtensionSet;
use crate::computed_fields::ComputedField;
use crate::schema_merger::Delegation;

const TYPE_DEFS: &str = r#"
extend type Query {
  coloredItem(id: ID!): ColoredItem
}

interface ColoredItem {
  id: ID!
  name: String
  color: String
}

extend type Item implements ColoredItem {
  color: String
}
"#;

/// `Query.coloredItem(id)`, answered by `item(id)` of `subgraph`.
pub fn extension(subgraph: &str) -> ExtensionSet {
    let delegation = Delegation::new(subgraph, "item").map_arguments(|arguments: &Map<String, Value>| {
        arguments
            .get("id")
            .map(|id| Map::from_iter([("id".to_string(), id.clone())]))
            .unwrap_or_default()
    });
    ExtensionSet::new("colored_item")
        .type_defs(TYPE_DEFS)
        .delegate("coloredItem", delegation)
        .computed(ComputedField::constant("Item", "color", json!("#000")))
}
