pub mod cache;
pub mod computed_fields;
pub mod config;
pub mod error;
pub mod extensions;
pub mod federation_gateway;
pub mod introspection;
pub mod legacy_shape;
pub mod query_executor;
pub mod query_planner;
pub mod query_rewriter;
pub mod response_shaper;
pub mod schema_descriptor;
pub mod schema_merger;
pub mod selection;
pub mod transforms;
pub mod type_resolver;

pub use cache::{Cache, InMemoryCache};
pub use computed_fields::ComputedField;
pub use config::GatewayConfig;
pub use error::{ExecutionError, ExecutionErrorKind, ReshapeError, RequestError, SchemaBuildError};
pub use federation_gateway::{FederationGateway, GatewaySettings};
pub use legacy_shape::LegacyShapeAdapter;
pub use query_executor::{HttpQueryExecutor, LocalQueryExecutor, QueryExecutor, UpstreamResponse};
pub use query_rewriter::{Unwrap, WrapShape, WrapTarget, wrap_query};
pub use schema_descriptor::SchemaDescriptor;
pub use schema_merger::{DelegatedArguments, Delegation, MergedSchema, SchemaMerger, SubschemaBinding};
pub use transforms::{Transform, TransformPipeline, apply_transforms};
pub use type_resolver::TypeResolver;

use http::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// Root operation kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum Operation {
    #[default]
    Query,
    Mutation,
    Subscription,
}

impl Operation {
    pub fn keyword(self) -> &'static str {
        match self {
            Operation::Query => "query",
            Operation::Mutation => "mutation",
            Operation::Subscription => "subscription",
        }
    }

    /// Canonical root type name in the merged schema.
    pub fn root_type_name(self) -> &'static str {
        match self {
            Operation::Query => "Query",
            Operation::Mutation => "Mutation",
            Operation::Subscription => "Subscription",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.root_type_name())
    }
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub variables: Option<Value>,
    #[serde(default)]
    pub operation_name: Option<String>,
    #[serde(default)]
    pub extensions: Option<Value>,
    #[serde(skip)]
    pub context: RequestContext,
}

impl GraphQLRequest {
    pub fn new(query: impl Into<String>) -> Self {
        GraphQLRequest {
            query: Some(query.into()),
            ..Default::default()
        }
    }

    pub fn with_variables(mut self, variables: Value) -> Self {
        self.variables = Some(variables);
        self
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct GraphQLResponse {
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphQLError>,
}

impl GraphQLResponse {
    pub fn from_error(error: impl Into<GraphQLError>) -> Self {
        GraphQLResponse {
            data: None,
            errors: vec![error.into()],
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GraphQLError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<PathSegment>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extensions: Map<String, Value>,
}

impl GraphQLError {
    pub fn new(message: impl Into<String>) -> Self {
        GraphQLError {
            message: message.into(),
            path: Vec::new(),
            extensions: Map::new(),
        }
    }

    /// Re-scopes an upstream error to the merged field it was delegated from.
    pub(crate) fn delegated(mut self, path: &[PathSegment], service: &str) -> Self {
        if !self.path.is_empty() {
            let upstream_path = serde_json::to_value(&self.path).unwrap_or(Value::Null);
            self.extensions
                .insert("upstreamPath".to_string(), upstream_path);
        }
        self.path = path.to_vec();
        self.extensions
            .entry("code")
            .or_insert_with(|| Value::String("UPSTREAM_ERROR".to_string()));
        self.extensions
            .insert("service".to_string(), Value::String(service.to_string()));
        self
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Key(String),
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

/// Request-scoped data handed to every executor call.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    headers: HashMap<String, String>,
}

impl RequestContext {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let headers = headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_ascii_lowercase(), value.to_string()))
            })
            .collect();
        RequestContext { headers }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }
}
