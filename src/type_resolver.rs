use serde_json::Value;

/// Picks the concrete type of an abstract-typed value from one of its attributes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeResolver {
    discriminant: String,
    mapping: Vec<(String, String)>,
    default_type: String,
}

impl TypeResolver {
    pub fn new(discriminant: impl Into<String>, default_type: impl Into<String>) -> Self {
        TypeResolver {
            discriminant: discriminant.into(),
            mapping: Vec::new(),
            default_type: default_type.into(),
        }
    }

    /// Maps a discriminant value to a type. Earlier entries win.
    pub fn map(mut self, value: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.mapping.push((value.into(), type_name.into()));
        self
    }

    pub fn discriminant(&self) -> &str {
        &self.discriminant
    }

    pub fn default_type(&self) -> &str {
        &self.default_type
    }

    /// Every type the resolver can return, default first.
    pub fn types(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.default_type.as_str())
            .chain(self.mapping.iter().map(|(_, type_name)| type_name.as_str()))
    }

    /// Never fails: anything unrecognised resolves to the default type.
    pub fn resolve(&self, object: Option<&Value>) -> &str {
        let value = object
            .and_then(|object| object.get(&self.discriminant))
            .and_then(Value::as_str);
        value
            .and_then(|value| {
                self.mapping
                    .iter()
                    .find(|(candidate, _)| candidate == value)
            })
            .map_or(self.default_type.as_str(), |(_, type_name)| type_name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn audio() -> TypeResolver {
        TypeResolver::new("class", "AudioElementDefaultType")
            .map("News", "NewsElementType")
            .map("Music", "MusicElementType")
    }

    #[test]
    fn maps_known_discriminants() {
        let resolver = audio();
        assert_eq!(resolver.resolve(Some(&json!({ "class": "Music" }))), "MusicElementType");
        assert_eq!(resolver.resolve(Some(&json!({ "class": "News" }))), "NewsElementType");
    }

    #[test]
    fn falls_back_to_the_default() {
        let resolver = audio();
        assert_eq!(resolver.resolve(Some(&json!({}))), "AudioElementDefaultType");
        assert_eq!(resolver.resolve(Some(&json!({ "class": "Jingle" }))), "AudioElementDefaultType");
        assert_eq!(resolver.resolve(Some(&json!({ "class": null }))), "AudioElementDefaultType");
        assert_eq!(resolver.resolve(Some(&json!({ "class": 7 }))), "AudioElementDefaultType");
        assert_eq!(resolver.resolve(Some(&Value::Null)), "AudioElementDefaultType");
        assert_eq!(resolver.resolve(None), "AudioElementDefaultType");
    }

    #[test]
    fn first_mapping_wins() {
        let resolver = TypeResolver::new("kind", "Other").map("a", "First").map("a", "Second");
        assert_eq!(resolver.resolve(Some(&json!({ "kind": "a" }))), "First");
        assert_eq!(resolver.types().collect::<Vec<_>>(), vec!["Other", "First", "Second"]);
    }
}
