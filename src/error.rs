use std::path::PathBuf;
use std::time::Duration;

use serde_json::{Map, Value, json};

use crate::{GraphQLError, PathSegment};

/// Errors raised while building the merged schema. All of them are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum SchemaBuildError {
    #[error("failed to parse schema for {source_name}: {message}")]
    Parse { source_name: String, message: String },
    #[error("renaming {from} to {to} collides with an existing name")]
    RenameCollision { from: String, to: String },
    #[error("type {type_name} is contributed by both {first} and {second}")]
    TypeCollision {
        type_name: String,
        first: String,
        second: String,
    },
    #[error("root field {operation}.{field} is contributed more than once")]
    RootFieldCollision { operation: String, field: String },
    #[error("field {field} is declared twice on type {type_name}")]
    FieldCollision { type_name: String, field: String },
    #[error("{location} references unknown type {target}")]
    DanglingReference { location: String, target: String },
    #[error("transform {transform} cannot run after PruneOrphans")]
    TransformOrder { transform: &'static str },
    #[error("cannot hoist {path}: {reason}")]
    InvalidHoist { path: String, reason: String },
    #[error("subgraph {0} declares legacy_viewer but its query root has no viewer field")]
    MissingViewer(String),
    #[error("unknown subgraph {0}")]
    UnknownSubgraph(String),
    #[error("cannot attach resolver to {type_name}.{field}: field is not declared")]
    UndeclaredField { type_name: String, field: String },
    #[error("root field {operation}.{field} has no resolver")]
    MissingRootResolver { operation: String, field: String },
    #[error("invalid type extension: {0}")]
    InvalidExtension(String),
    #[error("invalid type resolver for {type_name}: {reason}")]
    InvalidTypeResolver { type_name: String, reason: String },
    #[error("introspection of subgraph {subgraph} failed: {source}")]
    Introspection {
        subgraph: String,
        #[source]
        source: ExecutionError,
    },
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Config(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionErrorKind {
    Transport,
    Upstream,
}

/// Failure of a single upstream call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecutionError {
    #[error("transport error: {message}")]
    Transport { message: String },
    #[error("upstream returned errors: {}", .messages.join("; "))]
    Upstream {
        messages: Vec<String>,
        errors: Vec<GraphQLError>,
    },
}

impl ExecutionError {
    pub fn transport(message: impl Into<String>) -> Self {
        ExecutionError::Transport {
            message: message.into(),
        }
    }

    pub fn upstream(errors: Vec<GraphQLError>) -> Self {
        ExecutionError::Upstream {
            messages: errors.iter().map(|error| error.message.clone()).collect(),
            errors,
        }
    }

    pub fn kind(&self) -> ExecutionErrorKind {
        match self {
            ExecutionError::Transport { .. } => ExecutionErrorKind::Transport,
            ExecutionError::Upstream { .. } => ExecutionErrorKind::Upstream,
        }
    }

    /// Converts the failure into client-facing errors scoped to the delegating field.
    pub fn into_graphql_errors(self, path: &[PathSegment], service: &str) -> Vec<GraphQLError> {
        match self {
            ExecutionError::Transport { message } => vec![GraphQLError {
                message,
                path: path.to_vec(),
                extensions: error_extensions("TRANSPORT_ERROR", service),
            }],
            ExecutionError::Upstream { errors, .. } => errors
                .into_iter()
                .map(|error| error.delegated(path, service))
                .collect(),
        }
    }
}

pub(crate) fn error_extensions(code: &str, service: &str) -> Map<String, Value> {
    let mut extensions = Map::new();
    extensions.insert("code".to_string(), json!(code));
    extensions.insert("service".to_string(), json!(service));
    extensions
}

/// The unwrap path did not match what the upstream returned.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("expected {expected} at `{path}`, found {found}")]
pub struct ReshapeError {
    pub path: String,
    pub expected: &'static str,
    pub found: &'static str,
}

/// Errors that fail a whole client request before or around execution.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("failed to parse query: {0}")]
    Parse(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Variables(String),
    #[error("PersistedQueryNotFound")]
    PersistedQueryNotFound,
    #[error("provided sha256Hash does not match query")]
    PersistedQueryHashMismatch,
    #[error("must provide a query string")]
    MissingQuery,
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

impl RequestError {
    pub fn code(&self) -> &'static str {
        match self {
            RequestError::Parse(_) => "GRAPHQL_PARSE_FAILED",
            RequestError::Validation(_) | RequestError::MissingQuery => {
                "GRAPHQL_VALIDATION_FAILED"
            }
            RequestError::Variables(_) => "BAD_USER_INPUT",
            RequestError::PersistedQueryNotFound => "PERSISTED_QUERY_NOT_FOUND",
            RequestError::PersistedQueryHashMismatch => "PERSISTED_QUERY_HASH_MISMATCH",
            RequestError::Timeout(_) => "GATEWAY_TIMEOUT",
        }
    }
}

impl From<RequestError> for GraphQLError {
    fn from(error: RequestError) -> Self {
        let mut extensions = Map::new();
        extensions.insert("code".to_string(), json!(error.code()));
        GraphQLError {
            message: error.to_string(),
            path: Vec::new(),
            extensions,
        }
    }
}
