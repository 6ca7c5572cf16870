use std::collections::BTreeMap;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::Operation;
use crate::computed_fields::ComputedField;
use crate::error::SchemaBuildError;
use crate::query_executor::{DEFAULT_FORWARD_HEADERS, DEFAULT_USER_AGENT};
use crate::query_rewriter::WrapShape;
use crate::schema_merger::Delegation;
use crate::selection::SelectionSet;
use crate::transforms::Transform;

/// Gateway configuration, read from `schemas/supergraph.yaml` by default.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_forward_headers")]
    pub forward_headers: Vec<String>,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    pub subgraphs: BTreeMap<String, SubgraphConfig>,
    #[serde(default)]
    pub type_defs: Vec<PathBuf>,
    #[serde(default)]
    pub delegations: Vec<DelegationConfig>,
    #[serde(default)]
    pub computed_fields: Vec<ComputedFieldConfig>,
    #[serde(default)]
    pub extensions: ExtensionsConfig,
    /// Directory relative paths are resolved against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3000))
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_forward_headers() -> Vec<String> {
    DEFAULT_FORWARD_HEADERS.iter().map(|h| h.to_string()).collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_upstream_ms")]
    pub upstream_ms: u64,
    #[serde(default = "default_request_ms")]
    pub request_ms: u64,
}

fn default_upstream_ms() -> u64 {
    10_000
}

fn default_request_ms() -> u64 {
    30_000
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        TimeoutConfig {
            upstream_ms: default_upstream_ms(),
            request_ms: default_request_ms(),
        }
    }
}

impl TimeoutConfig {
    pub fn upstream(&self) -> Duration {
        Duration::from_millis(self.upstream_ms)
    }

    pub fn request(&self) -> Duration {
        Duration::from_millis(self.request_ms)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheEngine {
    #[default]
    None,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub engine: CacheEngine,
    #[serde(default = "default_max_age")]
    pub default_max_age: u64,
    /// Per root field overrides, in seconds.
    #[serde(default)]
    pub max_age: BTreeMap<String, u64>,
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default)]
    pub response_cache: bool,
}

fn default_max_age() -> u64 {
    60
}

fn default_capacity() -> usize {
    1024
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            engine: CacheEngine::None,
            default_max_age: default_max_age(),
            max_age: BTreeMap::new(),
            capacity: default_capacity(),
            response_cache: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubgraphConfig {
    pub routing_url: String,
    #[serde(default)]
    pub schema: Option<SchemaSource>,
    #[serde(default)]
    pub legacy_viewer: bool,
    /// Overrides the gateway-wide header allow-list.
    #[serde(default)]
    pub forward_headers: Option<Vec<String>>,
    #[serde(default)]
    pub transforms: Vec<TransformConfig>,
    #[serde(default)]
    pub debug: bool,
}

/// SDL snapshot used instead of introspecting at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaSource {
    pub file: PathBuf,
    /// Introspect anyway and write the result back to `file`.
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformConfig {
    RenameTypes {
        #[serde(default)]
        prefix: Option<String>,
        #[serde(default)]
        map: BTreeMap<String, String>,
    },
    RenameRootFields {
        #[serde(default)]
        prefix: Option<String>,
        #[serde(default)]
        map: BTreeMap<String, String>,
    },
    FilterTypes {
        #[serde(default)]
        include: Vec<String>,
        #[serde(default)]
        exclude: Vec<String>,
        /// Drops every type whose name contains one of these fragments.
        #[serde(default)]
        exclude_containing: Vec<String>,
    },
    FilterRootFields {
        #[serde(default)]
        include: Vec<String>,
        #[serde(default)]
        exclude: Vec<String>,
    },
    /// Entries are `Type.field`.
    FilterObjectFields { exclude: Vec<String> },
    FilterInterfaceFields { exclude: Vec<String> },
    HoistField {
        #[serde(default = "default_root_type")]
        root_type: String,
        path: Vec<String>,
        new_name: String,
    },
    PruneOrphans,
}

fn default_root_type() -> String {
    Operation::Query.root_type_name().to_string()
}

fn keeps(include: &[String], exclude: &[String], name: &str) -> bool {
    (include.is_empty() || include.iter().any(|kept| kept == name))
        && !exclude.iter().any(|dropped| dropped == name)
}

fn renamer(
    prefix: Option<String>,
    map: BTreeMap<String, String>,
) -> impl Fn(&str) -> Option<String> + Send + Sync + 'static {
    move |name| {
        map.get(name)
            .cloned()
            .or_else(|| prefix.as_ref().map(|prefix| format!("{prefix}{name}")))
    }
}

impl TransformConfig {
    pub fn to_transform(&self) -> Transform {
        match self.clone() {
            TransformConfig::RenameTypes { prefix, map } => Transform::rename_types(renamer(prefix, map)),
            TransformConfig::RenameRootFields { prefix, map } => {
                let rename = renamer(prefix, map);
                Transform::rename_root_fields(move |_, field| rename(field))
            }
            TransformConfig::FilterTypes {
                include,
                exclude,
                exclude_containing,
            } => Transform::filter_types(move |def| {
                keeps(&include, &exclude, &def.name)
                    && !exclude_containing.iter().any(|fragment| def.name.contains(fragment.as_str()))
            }),
            TransformConfig::FilterRootFields { include, exclude } => {
                Transform::filter_root_fields(move |_, field| keeps(&include, &exclude, field))
            }
            TransformConfig::FilterObjectFields { exclude } => {
                Transform::filter_object_fields(move |type_name, field| {
                    !exclude.contains(&format!("{type_name}.{field}"))
                })
            }
            TransformConfig::FilterInterfaceFields { exclude } => {
                Transform::filter_interface_fields(move |type_name, field| {
                    !exclude.contains(&format!("{type_name}.{field}"))
                })
            }
            TransformConfig::HoistField {
                root_type,
                path,
                new_name,
            } => Transform::hoist_field(root_type, path, new_name),
            TransformConfig::PruneOrphans => Transform::PruneOrphans,
        }
    }
}

/// Resolves a merged root field through a subgraph field.
#[derive(Debug, Clone, Deserialize)]
pub struct DelegationConfig {
    pub field: String,
    #[serde(default)]
    pub operation: Operation,
    pub subgraph: String,
    #[serde(default)]
    pub namespace: Vec<String>,
    pub target: String,
    #[serde(default)]
    pub shape: WrapShape,
    /// Upstream arguments. String values starting with `$` copy the client
    /// argument of that name; anything else is sent as given. When absent the
    /// client's arguments are forwarded unchanged.
    #[serde(default)]
    pub args: Option<BTreeMap<String, Value>>,
}

impl DelegationConfig {
    pub fn to_delegation(&self) -> Delegation {
        let delegation = Delegation::new(self.subgraph.clone(), self.target.clone())
            .with_operation(self.operation)
            .with_namespace(self.namespace.clone())
            .with_shape(self.shape);
        match self.args.clone() {
            None => delegation,
            Some(template) => delegation.map_arguments(move |client: &Map<String, Value>| {
                template
                    .iter()
                    .filter_map(|(name, value)| {
                        let value = match value.as_str().and_then(|s| s.strip_prefix('$')) {
                            Some(reference) => client.get(reference)?.clone(),
                            None => value.clone(),
                        };
                        Some((name.clone(), value))
                    })
                    .collect()
            }),
        }
    }
}

/// A field resolved from a value inside its required selection.
#[derive(Debug, Clone, Deserialize)]
pub struct ComputedFieldConfig {
    pub type_name: String,
    pub field: String,
    pub requires: String,
    pub path: String,
}

impl ComputedFieldConfig {
    pub fn to_computed_field(&self) -> Result<ComputedField, SchemaBuildError> {
        let requires = SelectionSet::parse(&self.requires).map_err(|e| {
            SchemaBuildError::Config(format!(
                "requires of {}.{}: {e}",
                self.type_name, self.field
            ))
        })?;
        Ok(ComputedField::from_path(
            self.type_name.clone(),
            self.field.clone(),
            requires,
            &self.path,
        ))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtensionsConfig {
    #[serde(default)]
    pub colored_item: Option<SubgraphExtensionConfig>,
    #[serde(default)]
    pub audio_elements: Option<SubgraphExtensionConfig>,
    #[serde(default)]
    pub colors: Option<ColorsConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubgraphExtensionConfig {
    pub subgraph: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ColorsConfig {
    pub type_name: String,
}

impl GatewayConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SchemaBuildError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| SchemaBuildError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
        tracing::info!(config = %path.display(), "loading gateway configuration");
        Self::from_yaml_str(&contents, base_dir)
    }

    pub fn from_yaml_str(contents: &str, base_dir: impl Into<PathBuf>) -> Result<Self, SchemaBuildError> {
        let mut config: GatewayConfig = serde_yaml::from_str(contents)
            .map_err(|e| SchemaBuildError::Config(e.to_string()))?;
        config.base_dir = base_dir.into();
        if config.subgraphs.is_empty() {
            return Err(SchemaBuildError::Config("no subgraphs configured".to_string()));
        }
        Ok(config)
    }

    /// Resolves a configured path against the config file's directory.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Header allow-list for one subgraph.
    pub fn forward_headers_for(&self, subgraph: &SubgraphConfig) -> Vec<String> {
        subgraph
            .forward_headers
            .clone()
            .unwrap_or_else(|| self.forward_headers.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema_descriptor::SchemaDescriptor;
    use crate::transforms::apply_transforms;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const CONFIG: &str = indoc! {r#"
        listen: 0.0.0.0:4000
        timeouts:
          upstream_ms: 2500
        cache:
          engine: memory
          max_age:
            audioElements: 30
        subgraphs:
          legacy:
            routing_url: http://localhost:4001/graphql
            legacy_viewer: true
            schema:
              file: legacy.graphql
            transforms:
              - kind: rename_types
                map:
                  Item: LegacyItem
              - kind: filter_root_fields
                exclude: [debug]
              - kind: filter_types
                exclude_containing: [Payload]
              - kind: prune_orphans
          radio:
            routing_url: http://localhost:4002/graphql
            forward_headers: [authorization]
            debug: true
        type_defs:
          - local.graphql
        delegations:
          - field: coloredItem
            subgraph: legacy
            target: item
            args:
              id: $id
              locale: de
          - field: audioElements
            subgraph: radio
            target: titles
            shape: nodes
        computed_fields:
          - type_name: Image
            field: url
            requires: "{ imageFiles { nodes { publicLocation } } }"
            path: imageFiles.nodes.0.publicLocation
        extensions:
          colors:
            type_name: BroadcastService
    "#};

    #[test]
    fn parses_the_full_configuration() {
        let config = GatewayConfig::from_yaml_str(CONFIG, "/etc/stitch").unwrap();

        assert_eq!(config.listen.port(), 4000);
        assert_eq!(config.timeouts.upstream(), Duration::from_millis(2500));
        assert_eq!(config.timeouts.request(), Duration::from_secs(30));
        assert_eq!(config.cache.engine, CacheEngine::Memory);
        assert_eq!(config.cache.default_max_age, 60);
        assert_eq!(config.cache.max_age["audioElements"], 30);

        let legacy = &config.subgraphs["legacy"];
        assert!(legacy.legacy_viewer);
        assert_eq!(legacy.transforms.len(), 4);
        assert_eq!(
            config.resolve_path(&legacy.schema.as_ref().unwrap().file),
            PathBuf::from("/etc/stitch/legacy.graphql")
        );
        assert_eq!(config.forward_headers_for(legacy).len(), 5);
        assert_eq!(config.forward_headers_for(&config.subgraphs["radio"]), vec!["authorization"]);
        assert_eq!(config.delegations[1].shape, WrapShape::Nodes);
        assert_eq!(config.extensions.colors.as_ref().unwrap().type_name, "BroadcastService");
    }

    #[test]
    fn builds_transforms_from_configuration() {
        let config = GatewayConfig::from_yaml_str(CONFIG, ".").unwrap();
        let transforms: Vec<Transform> = config.subgraphs["legacy"]
            .transforms
            .iter()
            .map(TransformConfig::to_transform)
            .collect();
        let descriptor = SchemaDescriptor::parse(
            "type Query { item: Item debug: String } type Item { id: ID } type Orphan { id: ID } type LikePayload { id: ID }",
            "legacy",
        )
        .unwrap();

        let schema = apply_transforms(descriptor, &transforms).unwrap();
        assert!(schema.descriptor.has_type("LegacyItem"));
        assert!(!schema.descriptor.has_type("Orphan"));
        assert!(!schema.descriptor.has_type("LikePayload"));
        assert!(schema.descriptor.field("Query", "debug").is_none());
    }

    #[test]
    fn mapped_delegation_arguments_copy_client_values() {
        let config = GatewayConfig::from_yaml_str(CONFIG, ".").unwrap();
        let delegation = config.delegations[0].to_delegation();
        let crate::schema_merger::DelegatedArguments::Mapped(mapper) = &delegation.arguments else {
            panic!("expected mapped arguments");
        };
        let client = json!({ "id": "123", "other": true });
        assert_eq!(
            Value::Object(mapper(client.as_object().unwrap())),
            json!({ "id": "123", "locale": "de" })
        );
        assert!(matches!(
            config.delegations[1].to_delegation().arguments,
            crate::schema_merger::DelegatedArguments::Passthrough
        ));
    }

    #[test]
    fn loads_the_bundled_configuration() {
        let config = GatewayConfig::load(concat!(env!("CARGO_MANIFEST_DIR"), "/schemas/supergraph.yaml")).unwrap();
        assert!(config.base_dir.ends_with("schemas"));
        assert_eq!(config.subgraphs.len(), 3);
        assert!(config.extensions.audio_elements.is_some());

        let missing = GatewayConfig::load("does/not/exist.yaml").unwrap_err();
        assert!(matches!(missing, SchemaBuildError::Io { .. }));
    }

    #[test]
    fn rejects_configuration_without_subgraphs() {
        let error = GatewayConfig::from_yaml_str("subgraphs: {}", ".").unwrap_err();
        assert!(matches!(error, SchemaBuildError::Config(_)));
    }
}
