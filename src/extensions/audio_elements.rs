use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::ExtensionSet;
use crate::computed_fields::ComputedField;
use crate::schema_merger::Delegation;
use crate::selection::SelectionSet;
use crate::type_resolver::TypeResolver;

const TYPE_DEFS: &str = r#"
scalar JSON

enum AudioElementClass {
  Music
  Cart
  News
  Traffic
  Weather
  Live
  Promotion
  Audio
  None
  Commercial
  Control
  Command
  Info
  Project
  Magazine
}

extend type TTitle implements AudioElement & MusicElement & NewsElement {
  isSeekableNews: Boolean
  raw: JSON @deprecated(reason: "only for internal use")
}

interface AudioElement {
  guid: ID!
  class: TType!
  start: TDatetime!
  duration: Int
  title: String
  raw: JSON @deprecated(reason: "only for debugging purposes")
}

interface NewsElement {
  author: String
  isSeekableNews: Boolean
}

interface MusicElement {
  performer: String
  composer: String
}

type NewsElementType implements AudioElement & NewsElement {
  guid: ID!
  class: TType!
  start: TDatetime!
  duration: Int
  title: String
  author: String
  authors: [String!]
  raw: JSON
  isSeekableNews: Boolean
}

type MusicElementType implements AudioElement & MusicElement {
  guid: ID!
  class: TType!
  start: TDatetime!
  duration: Int
  title: String
  performer: String
  performers: [String!]
  composer: String
  composers: [String!]
  album: String
  musicId: Int
  raw: JSON
}

type AudioElementDefaultType implements AudioElement {
  guid: ID!
  class: TType!
  start: TDatetime!
  duration: Int
  title: String
  raw: JSON
}

extend type Query {
  audioElements(
    types: [AudioElementClass!] = [News, Music]
    start: TDatetime
    end: TDatetime
    offset: Int
    first: Int
  ): [AudioElement!]
}
"#;

const FORWARDED_ARGUMENTS: [&str; 5] = ["types", "start", "end", "offset", "first"];

/// Author held by the playout system for news bulletins that can be seeked.
const SEEKABLE_NEWS_AUTHOR: &str = "Nachrichten";

static PERSON_SEPARATOR: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\s?(?:,|\s+und|/| - | & )+\s?").ok());

/// Splits a free-text list of people into distinct trimmed names.
///
/// Returns `None` for a missing or empty value.
pub fn normalize_persons(value: Option<&str>) -> Option<Vec<String>> {
    let value = value.map(str::trim).filter(|value| !value.is_empty())?;
    let parts: Vec<&str> = match PERSON_SEPARATOR.as_ref() {
        Some(separator) => separator.split(value).collect(),
        None => vec![value],
    };
    let mut persons: Vec<String> = Vec::with_capacity(parts.len());
    for part in parts.into_iter().map(str::trim).filter(|part| !part.is_empty()) {
        if !persons.iter().any(|seen| seen == part) {
            persons.push(part.to_string());
        }
    }
    Some(persons)
}

fn persons_field(type_name: &str, field: &str, source: &'static str) -> ComputedField {
    ComputedField::new(type_name, field, requires(source), move |parent| {
        match normalize_persons(parent.get(source).and_then(Value::as_str)) {
            Some(persons) => Value::from(persons),
            None => Value::Null,
        }
    })
}

fn joined_persons_field(type_name: &str, field: &str, source: &'static str) -> ComputedField {
    ComputedField::new(type_name, field, requires(source), move |parent| {
        match normalize_persons(parent.get(source).and_then(Value::as_str)) {
            Some(persons) => Value::from(persons.join("; ")),
            None => Value::Null,
        }
    })
}

fn requires(field: &str) -> SelectionSet {
    SelectionSet::of_field(crate::selection::Field::new(field))
}

/// Classifies `titles` of `subgraph` into news, music and other audio elements.
pub fn extension(subgraph: &str) -> ExtensionSet {
    let delegation = Delegation::new(subgraph, "titles").map_arguments(|arguments: &Map<String, Value>| {
        FORWARDED_ARGUMENTS
            .iter()
            .filter_map(|name| Some((name.to_string(), arguments.get(*name)?.clone())))
            .collect()
    });
    let resolver = TypeResolver::new("class", "AudioElementDefaultType")
        .map("News", "NewsElementType")
        .map("Music", "MusicElementType");

    ExtensionSet::new("audio_elements")
        .type_defs(TYPE_DEFS)
        .delegate("audioElements", delegation)
        .type_resolver("AudioElement", resolver)
        .computed(persons_field("NewsElementType", "authors", "author"))
        .computed(joined_persons_field("NewsElementType", "author", "author"))
        .computed(ComputedField::new(
            "NewsElementType",
            "isSeekableNews",
            requires("author"),
            |parent| {
                let flagged = parent.get("isSeekableNews").and_then(Value::as_bool) == Some(true);
                let bulletin = parent.get("author").and_then(Value::as_str) == Some(SEEKABLE_NEWS_AUTHOR);
                Value::Bool(flagged || bulletin)
            },
        ))
        .computed(persons_field("MusicElementType", "performers", "performer"))
        .computed(persons_field("MusicElementType", "composers", "composer"))
        .computed(joined_persons_field("MusicElementType", "composer", "composer"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn persons(value: &str) -> Option<Vec<String>> {
        normalize_persons(Some(value))
    }

    #[test]
    fn splits_people_on_common_separators() {
        assert_eq!(
            persons("Anna Netrebko, Rolando Villazón und Orchester / Chor - Dirigent & Solist"),
            Some(
                ["Anna Netrebko", "Rolando Villazón", "Orchester", "Chor", "Dirigent", "Solist"]
                    .map(String::from)
                    .to_vec()
            )
        );
        assert_eq!(persons("  Band XYZ "), Some(vec!["Band XYZ".to_string()]));
    }

    #[test]
    fn drops_duplicates_and_empty_names() {
        assert_eq!(
            persons("Mozart, Mozart,, Haydn /"),
            Some(vec!["Mozart".to_string(), "Haydn".to_string()])
        );
        assert_eq!(normalize_persons(Some("   ")), None);
        assert_eq!(normalize_persons(None), None);
    }

    #[test]
    fn news_fields_derive_from_the_author() {
        let extension = extension("playlist");
        let field = |name: &str| {
            extension
                .computed_fields
                .iter()
                .find(|field| field.type_name == "NewsElementType" && field.field_name == name)
                .unwrap()
                .clone()
        };

        let bulletin = json!({ "author": "Nachrichten" });
        let feature = json!({ "author": "Eva Maier und Max Huber" });
        assert_eq!(field("isSeekableNews").resolve(&bulletin), json!(true));
        assert_eq!(field("isSeekableNews").resolve(&feature), json!(false));
        assert_eq!(field("author").resolve(&feature), json!("Eva Maier; Max Huber"));
        assert_eq!(field("authors").resolve(&feature), json!(["Eva Maier", "Max Huber"]));
        assert_eq!(field("authors").resolve(&json!({ "author": null })), Value::Null);
    }

    #[test]
    fn forwards_only_known_arguments() {
        let extension = extension("playlist");
        let (field, delegation) = &extension.delegations[0];
        assert_eq!(field, "audioElements");
        let crate::schema_merger::DelegatedArguments::Mapped(mapper) = &delegation.arguments else {
            panic!("expected mapped arguments");
        };
        let client = json!({ "types": ["News"], "first": 3, "unknown": 1 });
        assert_eq!(
            Value::Object(mapper(client.as_object().unwrap())),
            json!({ "types": ["News"], "first": 3 })
        );
    }
}
