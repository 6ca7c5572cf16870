use serde::Serialize;
use serde_json::Value;

use super::ExtensionSet;
use crate::computed_fields::ComputedField;
use crate::selection::{Field, SelectionSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorSet {
    pub base: &'static str,
    pub highlight: &'static str,
    pub highlight_dark: &'static str,
}

const fn colors(base: &'static str, highlight: &'static str, highlight_dark: &'static str) -> ColorSet {
    ColorSet {
        base,
        highlight,
        highlight_dark,
    }
}

/// Station palettes keyed by the broadcast service id suffix.
const STATION_COLORS: [(&str, ColorSet); 8] = [
    ("Bayern_1", colors("#00A0D5", "#98DFF1", "#65CEE9")),
    ("Bayern_2", colors("#FF6B00", "#F6C69C", "#FFC28D")),
    ("Bayern_3", colors("#94C01C", "#D5E6A6", "#CFE68F")),
    ("BR_Klassik", colors("#E1012C", "#F29BAC", "#F29BAC")),
    ("B5_aktuell", colors("#E52770", "#F4A8C5", "#EB86AD")),
    ("puls", colors("#000000", "#CBCBCB", "#CBCBCB")),
    ("Bayern_plus", colors("#789BCB", "#C8D6EA", "#A0C0ED")),
    ("BR_Heimat", colors("#005594", "#A2CBEA", "#86C8F8")),
];

/// Palette for a broadcast service id such as `av:http://ard.de/ontologies/ard#Bayern_2`.
pub fn station_colors(broadcast_service_id: &str) -> Option<ColorSet> {
    let (_, key) = broadcast_service_id.split_once('#')?;
    let key = key.split('#').next().unwrap_or(key);
    STATION_COLORS
        .iter()
        .find(|(station, _)| *station == key)
        .map(|(_, colors)| *colors)
}

/// Adds `colors: ColorSet` to `type_name`, derived from its `id`.
pub fn extension(type_name: &str) -> ExtensionSet {
    let type_defs = format!(
        "type ColorSet {{\n  base: String\n  highlight: String\n  highlightDark: String\n}}\n\n\
         extend type {type_name} {{\n  colors: ColorSet\n}}\n"
    );
    let colors = ComputedField::new(
        type_name,
        "colors",
        SelectionSet::of_field(Field::new("id")),
        |parent| {
            parent
                .get("id")
                .and_then(Value::as_str)
                .and_then(station_colors)
                .and_then(|colors| serde_json::to_value(colors).ok())
                .unwrap_or(Value::Null)
        },
    );
    ExtensionSet::new("colors").type_defs(type_defs).computed(colors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn looks_up_colors_by_id_suffix() {
        assert_eq!(
            station_colors("av:http://ard.de/ontologies/ard#Bayern_2").map(|colors| colors.base),
            Some("#FF6B00")
        );
        assert_eq!(station_colors("av:http://ard.de/ontologies/ard#Unknown"), None);
        assert_eq!(station_colors("Bayern_2"), None);
    }

    #[test]
    fn computed_colors_serialize_in_camel_case() {
        let extension = extension("BroadcastService");
        assert!(extension.type_defs[0].contains("extend type BroadcastService {"));
        let colors = &extension.computed_fields[0];
        assert_eq!(
            colors.resolve(&json!({ "id": "av:http://ard.de/ontologies/ard#puls" })),
            json!({ "base": "#000000", "highlight": "#CBCBCB", "highlightDark": "#CBCBCB" })
        );
        assert_eq!(colors.resolve(&json!({ "id": null })), Value::Null);
    }
}
