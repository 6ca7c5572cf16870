//! Built-in schema extensions, enabled from the `extensions` config section.

pub mod audio_elements;
pub mod colored_item;
pub mod colors;

use crate::computed_fields::ComputedField;
use crate::config::ExtensionsConfig;
use crate::schema_merger::Delegation;
use crate::type_resolver::TypeResolver;

pub use audio_elements::normalize_persons;

/// Type definitions plus the resolvers that make them answerable.
#[derive(Debug, Clone, Default)]
pub struct ExtensionSet {
    pub name: String,
    pub type_defs: Vec<String>,
    pub delegations: Vec<(String, Delegation)>,
    pub type_resolvers: Vec<(String, TypeResolver)>,
    pub computed_fields: Vec<ComputedField>,
}

impl ExtensionSet {
    pub fn new(name: impl Into<String>) -> Self {
        ExtensionSet {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn type_defs(mut self, sdl: impl Into<String>) -> Self {
        self.type_defs.push(sdl.into());
        self
    }

    pub fn delegate(mut self, field: impl Into<String>, delegation: Delegation) -> Self {
        self.delegations.push((field.into(), delegation));
        self
    }

    pub fn type_resolver(mut self, type_name: impl Into<String>, resolver: TypeResolver) -> Self {
        self.type_resolvers.push((type_name.into(), resolver));
        self
    }

    pub fn computed(mut self, field: ComputedField) -> Self {
        self.computed_fields.push(field);
        self
    }
}

/// The extensions switched on in `config`, in a fixed order.
pub fn from_config(config: &ExtensionsConfig) -> Vec<ExtensionSet> {
    let mut extensions = Vec::new();
    if let Some(colored_item) = &config.colored_item {
        extensions.push(colored_item::extension(&colored_item.subgraph));
    }
    if let Some(audio_elements) = &config.audio_elements {
        extensions.push(audio_elements::extension(&audio_elements.subgraph));
    }
    if let Some(colors) = &config.colors {
        extensions.push(colors::extension(&colors.type_name));
    }
    extensions
}
