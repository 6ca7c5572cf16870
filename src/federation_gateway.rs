use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::join_all;
use serde_json::{Map, Value};

use crate::cache::{Cache, InMemoryCache, persisted_query_key, query_hash, response_cache_key};
use crate::config::{CacheEngine, GatewayConfig, SubgraphConfig, TransformConfig};
use crate::error::{ExecutionError, RequestError, SchemaBuildError};
use crate::extensions;
use crate::query_executor::{HttpQueryExecutor, QueryExecutor};
use crate::query_planner::{PlanStep, QueryPlan, QueryPlanner};
use crate::query_rewriter::{QueryRewriter, arguments_from_json, wrap_query};
use crate::response_shaper::ResponseShaper;
use crate::schema_descriptor::{SchemaDescriptor, TypeRef};
use crate::schema_merger::{DelegatedArguments, Delegation, MergedSchema, SchemaMerger, SubschemaBinding};
use crate::selection::{Document, Field, VariableDefinition};
use crate::transforms::{Transform, TransformedSchema};
use crate::{GraphQLError, GraphQLRequest, GraphQLResponse, Operation, PathSegment, RequestContext};

/// Runtime knobs of the gateway that are not part of the schema.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub upstream_timeout: Duration,
    pub request_timeout: Duration,
    /// Seconds a cached response lives unless a root field overrides it.
    pub default_max_age: u64,
    pub max_age: BTreeMap<String, u64>,
    pub response_cache: bool,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        GatewaySettings {
            upstream_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            default_max_age: 60,
            max_age: BTreeMap::new(),
            response_cache: false,
        }
    }
}

impl GatewaySettings {
    pub fn from_config(config: &GatewayConfig) -> Self {
        GatewaySettings {
            upstream_timeout: config.timeouts.upstream(),
            request_timeout: config.timeouts.request(),
            default_max_age: config.cache.default_max_age,
            max_age: config.cache.max_age.clone(),
            response_cache: config.cache.response_cache,
        }
    }
}

struct FieldResult {
    response_key: String,
    value: Value,
    errors: Vec<GraphQLError>,
}

/// Serves client operations against the merged schema.
pub struct FederationGateway {
    schema: Arc<MergedSchema>,
    cache: Option<Arc<dyn Cache>>,
    settings: GatewaySettings,
}

impl FederationGateway {
    pub fn new(schema: MergedSchema) -> Self {
        FederationGateway {
            schema: Arc::new(schema),
            cache: None,
            settings: GatewaySettings::default(),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_settings(mut self, settings: GatewaySettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn schema(&self) -> &MergedSchema {
        &self.schema
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    /// Builds the gateway described by `config`, introspecting every subgraph
    /// that has no schema snapshot.
    pub async fn from_config(config: &GatewayConfig) -> Result<Self, SchemaBuildError> {
        let mut merger = SchemaMerger::new();
        for (name, subgraph) in &config.subgraphs {
            let executor = Arc::new(
                HttpQueryExecutor::new(subgraph.routing_url.clone())
                    .with_forward_headers(config.forward_headers_for(subgraph))
                    .with_user_agent(config.user_agent.clone())
                    .with_timeout(config.timeouts.upstream()),
            );
            let descriptor = load_subgraph_schema(config, name, subgraph, executor.as_ref()).await?;
            let transforms: Vec<Transform> = subgraph
                .transforms
                .iter()
                .map(TransformConfig::to_transform)
                .collect();
            let binding = SubschemaBinding::build(
                name.clone(),
                descriptor,
                &transforms,
                executor,
                subgraph.legacy_viewer,
            )?
            .with_debug(subgraph.debug);
            tracing::info!(subgraph = %name, url = %subgraph.routing_url, "subgraph registered");
            merger = merger.add_binding(binding);
        }

        for file in &config.type_defs {
            let path = config.resolve_path(file);
            let sdl = read_schema_file(&path)?;
            merger = merger.named_type_defs(path.display().to_string(), sdl);
        }
        for delegation in &config.delegations {
            merger = merger.delegate(delegation.field.clone(), delegation.to_delegation());
        }
        for extension in extensions::from_config(&config.extensions) {
            tracing::info!(extension = %extension.name, "extension enabled");
            merger = merger.extension(extension);
        }

        let computed_fields = config
            .computed_fields
            .iter()
            .map(|field| field.to_computed_field())
            .collect::<Result<Vec<_>, _>>()?;
        let schema = merger.merge()?.layer(computed_fields)?;

        let mut gateway = FederationGateway::new(schema).with_settings(GatewaySettings::from_config(config));
        if config.cache.engine == CacheEngine::Memory {
            gateway = gateway.with_cache(Arc::new(InMemoryCache::new(config.cache.capacity)));
        }
        Ok(gateway)
    }

    /// Answers one client request. Failures are reported inside the response.
    pub async fn process_request(&self, request: GraphQLRequest) -> GraphQLResponse {
        let timeout = self.settings.request_timeout;
        match tokio::time::timeout(timeout, self.handle(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(error)) => {
                tracing::debug!(code = error.code(), %error, "request rejected");
                GraphQLResponse::from_error(error)
            }
            Err(_) => {
                tracing::warn!(?timeout, "request timed out");
                GraphQLResponse::from_error(RequestError::Timeout(timeout))
            }
        }
    }

    async fn handle(&self, request: GraphQLRequest) -> Result<GraphQLResponse, RequestError> {
        let query = self.resolve_query(&request).await?;
        let variables = request.variables.clone().unwrap_or(Value::Null);

        let cache_key = self.response_cache().map(|cache| {
            let headers = self.forwarded_headers(&request.context);
            let key = response_cache_key(&query, request.operation_name.as_deref(), &variables, &headers);
            (cache, key)
        });
        if let Some((cache, key)) = &cache_key {
            let cached = cache
                .get(key)
                .await
                .and_then(|bytes| serde_json::from_slice::<GraphQLResponse>(&bytes).ok());
            if let Some(response) = cached {
                tracing::debug!(key = %key, "response cache hit");
                return Ok(response);
            }
        }

        let plan = QueryPlanner::new(&self.schema).plan(
            &query,
            request.operation_name.as_deref(),
            request.variables.as_ref(),
        )?;
        let response = self.execute(&plan, &request.context).await;

        if let Some((cache, key)) = cache_key {
            let ttl = self.max_age(&plan);
            if plan.operation == Operation::Query && response.errors.is_empty() && ttl > 0 {
                if let Ok(bytes) = serde_json::to_vec(&response) {
                    cache.set(&key, Bytes::from(bytes), ttl).await;
                }
            }
        }
        Ok(response)
    }

    fn response_cache(&self) -> Option<&Arc<dyn Cache>> {
        self.cache.as_ref().filter(|_| self.settings.response_cache)
    }

    /// Every header value some subgraph would receive for this request.
    fn forwarded_headers(&self, context: &RequestContext) -> BTreeMap<String, String> {
        self.schema
            .bindings()
            .flat_map(|binding| binding.executor.forwarded_headers(context))
            .collect()
    }

    /// Smallest max age of the delegated root fields.
    fn max_age(&self, plan: &QueryPlan) -> u64 {
        plan.steps
            .iter()
            .filter_map(|step| match step {
                PlanStep::Delegate { field } => Some(
                    self.settings
                        .max_age
                        .get(&field.name)
                        .copied()
                        .unwrap_or(self.settings.default_max_age),
                ),
                _ => None,
            })
            .min()
            .unwrap_or(self.settings.default_max_age)
    }

    /// Automatic persisted queries: a hash alone looks the query up, a hash
    /// with its query registers it.
    async fn resolve_query(&self, request: &GraphQLRequest) -> Result<String, RequestError> {
        let hash = request
            .extensions
            .as_ref()
            .and_then(|extensions| extensions.get("persistedQuery"))
            .and_then(|persisted| persisted.get("sha256Hash"))
            .and_then(Value::as_str);

        match (hash, &request.query) {
            (None, Some(query)) => Ok(query.clone()),
            (None, None) => Err(RequestError::MissingQuery),
            (Some(hash), Some(query)) => {
                if query_hash(query) != hash.to_ascii_lowercase() {
                    return Err(RequestError::PersistedQueryHashMismatch);
                }
                if let Some(cache) = &self.cache {
                    cache
                        .set(&persisted_query_key(&hash.to_ascii_lowercase()), Bytes::from(query.clone()), 0)
                        .await;
                    tracing::debug!(hash, "persisted query registered");
                }
                Ok(query.clone())
            }
            (Some(hash), None) => {
                let cache = self.cache.as_ref().ok_or(RequestError::PersistedQueryNotFound)?;
                let bytes = cache
                    .get(&persisted_query_key(&hash.to_ascii_lowercase()))
                    .await
                    .ok_or(RequestError::PersistedQueryNotFound)?;
                String::from_utf8(bytes.to_vec()).map_err(|_| RequestError::PersistedQueryNotFound)
            }
        }
    }

    async fn execute(&self, plan: &QueryPlan, context: &RequestContext) -> GraphQLResponse {
        let results = match plan.operation {
            Operation::Mutation => {
                let mut results = Vec::with_capacity(plan.steps.len());
                for step in &plan.steps {
                    results.push(self.execute_step(step, plan, context).await);
                }
                results
            }
            _ => join_all(plan.steps.iter().map(|step| self.execute_step(step, plan, context))).await,
        };

        let mut data = Map::new();
        let mut errors = Vec::new();
        for result in results {
            data.insert(result.response_key, result.value);
            errors.extend(result.errors);
        }
        GraphQLResponse {
            data: Some(Value::Object(data)),
            errors,
        }
    }

    async fn execute_step(&self, step: &PlanStep, plan: &QueryPlan, context: &RequestContext) -> FieldResult {
        let response_key = step.response_key().to_string();
        let (value, errors) = match step {
            PlanStep::Typename { .. } => (
                Value::String(plan.operation.root_type_name().to_string()),
                Vec::new(),
            ),
            PlanStep::Introspection { field } => {
                (self.schema.introspection().resolve(field, &plan.variables), Vec::new())
            }
            PlanStep::Delegate { field } => {
                let target = self
                    .schema
                    .delegation(plan.operation, &field.name)
                    .and_then(|delegation| Some((delegation, self.schema.binding(&delegation.subgraph)?)));
                match target {
                    Some((delegation, binding)) => self.delegate(delegation, binding, field, plan, context).await,
                    None => {
                        let mut error = GraphQLError::new(format!("no resolver for root field {}", field.name));
                        error.path = vec![PathSegment::from(response_key.as_str())];
                        (Value::Null, vec![error])
                    }
                }
            }
        };
        FieldResult {
            response_key,
            value,
            errors,
        }
    }

    /// Resolves one root field through its subgraph: rewrite, wrap, send,
    /// unwrap and shape.
    #[tracing::instrument(
        name = "delegate",
        skip_all,
        fields(field = %field.response_key(), subgraph = %delegation.subgraph)
    )]
    async fn delegate(
        &self,
        delegation: &Delegation,
        binding: &SubschemaBinding,
        field: &Field,
        plan: &QueryPlan,
        context: &RequestContext,
    ) -> (Value, Vec<GraphQLError>) {
        let path = [PathSegment::from(field.response_key())];
        let declared_type = self
            .schema
            .field_def(plan.operation.root_type_name(), &field.name)
            .map(|def| def.ty.name().to_string())
            .unwrap_or_default();

        let arguments = match &delegation.arguments {
            DelegatedArguments::Passthrough => field.arguments.clone(),
            DelegatedArguments::Mapped(mapper) => arguments_from_json(&mapper(&field.argument_values(&plan.variables))),
        };
        let selection = QueryRewriter::new(&self.schema, binding).rewrite(
            &declared_type,
            delegation.scope(),
            &field.selection_set,
        );
        let wrapped = wrap_query(&delegation.wrap_target(), selection, arguments);

        let used = wrapped.selection_set.variables();
        let variable_definitions: Vec<VariableDefinition> = plan
            .variable_definitions
            .iter()
            .filter(|definition| used.contains(&definition.name))
            .map(|definition| VariableDefinition {
                name: definition.name.clone(),
                ty: upstream_type_ref(&definition.ty, &binding.schema),
                default_value: definition.default_value.clone(),
            })
            .collect();
        let variables: Map<String, Value> = plan
            .variables
            .iter()
            .filter(|(name, _)| used.contains(name.as_str()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        let document = Document {
            operation: delegation.operation,
            variable_definitions,
            selection_set: wrapped.selection_set,
        };
        let (document, legacy_wrapped) = match &binding.legacy {
            Some(legacy) => legacy.wrap(document),
            None => (document, false),
        };
        if binding.debug {
            let variables_json = Value::Object(variables.clone());
            tracing::info!(document = %document, variables = %variables_json, "outgoing request");
        } else {
            tracing::debug!(document = %document, "outgoing request");
        }

        let upstream_timeout = self.settings.upstream_timeout;
        let outcome = tokio::time::timeout(upstream_timeout, binding.executor.execute(&document, &variables, context))
            .await
            .unwrap_or_else(|_| {
                Err(ExecutionError::transport(format!(
                    "{} did not answer within {upstream_timeout:?}",
                    binding.name
                )))
            });

        match outcome {
            Ok(response) => {
                if binding.debug {
                    tracing::info!(data = %response.data, errors = response.errors.len(), "upstream response");
                }
                let data = match &binding.legacy {
                    Some(legacy) => legacy.unwrap(response.data, legacy_wrapped),
                    None => response.data,
                };
                let value = wrapped.unwrap.apply(data);
                let shaped = ResponseShaper::new(&self.schema, binding).shape(&declared_type, &field.selection_set, &value);
                let errors = response
                    .errors
                    .into_iter()
                    .map(|error| error.delegated(&path, &binding.name))
                    .collect();
                (shaped, errors)
            }
            Err(error) => {
                tracing::warn!(%error, "delegation failed");
                (Value::Null, error.into_graphql_errors(&path, &binding.name))
            }
        }
    }
}

fn upstream_type_ref(ty: &TypeRef, schema: &TransformedSchema) -> TypeRef {
    match ty {
        TypeRef::Named(name) => TypeRef::named(schema.upstream_type_name(name)),
        TypeRef::List(inner) => TypeRef::List(Box::new(upstream_type_ref(inner, schema))),
        TypeRef::NonNull(inner) => TypeRef::NonNull(Box::new(upstream_type_ref(inner, schema))),
    }
}

/// Reads an SDL file.
pub fn read_schema_file(path: &Path) -> Result<String, SchemaBuildError> {
    fs::read_to_string(path).map_err(|source| SchemaBuildError::Io {
        path: path.to_path_buf(),
        source,
    })
}

async fn load_subgraph_schema(
    config: &GatewayConfig,
    name: &str,
    subgraph: &SubgraphConfig,
    executor: &dyn QueryExecutor,
) -> Result<SchemaDescriptor, SchemaBuildError> {
    if let Some(source) = subgraph.schema.as_ref().filter(|source| !source.refresh) {
        let path = config.resolve_path(&source.file);
        tracing::debug!(subgraph = %name, path = %path.display(), "loading schema snapshot");
        return SchemaDescriptor::parse(&read_schema_file(&path)?, name);
    }

    tracing::info!(subgraph = %name, "introspecting subgraph");
    let descriptor = executor
        .introspect()
        .await
        .map_err(|source| SchemaBuildError::Introspection {
            subgraph: name.to_string(),
            source,
        })?;
    if let Some(source) = &subgraph.schema {
        let path = config.resolve_path(&source.file);
        fs::write(&path, descriptor.to_sdl()).map_err(|source| SchemaBuildError::Io {
            path: path.clone(),
            source,
        })?;
        tracing::info!(subgraph = %name, path = %path.display(), "schema snapshot refreshed");
    }
    Ok(descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_executor::{LocalQueryExecutor, UpstreamResponse};
    use futures::FutureExt;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const ITEMS: &str = "type Query { item(id: ID!): Item } type Item { id: ID! name: String }";

    fn gateway(calls: Arc<AtomicUsize>) -> FederationGateway {
        let executor: Arc<dyn QueryExecutor> = Arc::new(LocalQueryExecutor::new(move |_, variables, _| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                let id = variables.get("id").cloned().unwrap_or(json!("1"));
                Ok(UpstreamResponse::data(json!({ "item": { "id": id, "name": "Foo bar 42" } })))
            }
            .boxed()
        }));
        let descriptor = SchemaDescriptor::parse(ITEMS, "items").unwrap();
        let binding = SubschemaBinding::build("items", descriptor, &[], executor, false).unwrap();
        let schema = SchemaMerger::new().add_binding(binding).merge().unwrap();
        FederationGateway::new(schema)
            .with_cache(Arc::new(InMemoryCache::default()))
            .with_settings(GatewaySettings {
                response_cache: true,
                ..Default::default()
            })
    }

    fn persisted(hash: &str) -> Value {
        json!({ "persistedQuery": { "version": 1, "sha256Hash": hash } })
    }

    #[tokio::test]
    async fn registers_and_serves_persisted_queries() {
        let gateway = gateway(Arc::new(AtomicUsize::new(0)));
        let query = r#"{ item(id: "1") { name } }"#;
        let hash = query_hash(query);

        let miss = gateway
            .process_request(GraphQLRequest {
                extensions: Some(persisted(&hash)),
                ..Default::default()
            })
            .await;
        assert_eq!(miss.errors[0].message, "PersistedQueryNotFound");
        assert_eq!(miss.errors[0].extensions["code"], "PERSISTED_QUERY_NOT_FOUND");

        let register = GraphQLRequest {
            extensions: Some(persisted(&hash)),
            ..GraphQLRequest::new(query)
        };
        assert!(gateway.process_request(register).await.errors.is_empty());

        let hit = gateway
            .process_request(GraphQLRequest {
                extensions: Some(persisted(&hash)),
                ..Default::default()
            })
            .await;
        assert_eq!(hit.data, Some(json!({ "item": { "name": "Foo bar 42" } })));
    }

    #[tokio::test]
    async fn rejects_mismatched_hashes() {
        let gateway = gateway(Arc::new(AtomicUsize::new(0)));
        let response = gateway
            .process_request(GraphQLRequest {
                extensions: Some(persisted(&query_hash("{ other }"))),
                ..GraphQLRequest::new(r#"{ item(id: "1") { name } }"#)
            })
            .await;
        assert_eq!(response.data, None);
        assert_eq!(response.errors[0].extensions["code"], "PERSISTED_QUERY_HASH_MISMATCH");
    }

    #[tokio::test]
    async fn caches_error_free_query_responses() {
        let calls = Arc::new(AtomicUsize::new(0));
        let gateway = gateway(calls.clone());
        let request = || {
            GraphQLRequest::new("query ($id: ID!) { item(id: $id) { id name } }").with_variables(json!({ "id": "7" }))
        };

        let first = gateway.process_request(request()).await;
        let second = gateway.process_request(request()).await;
        assert_eq!(first, second);
        assert_eq!(first.data, Some(json!({ "item": { "id": "7", "name": "Foo bar 42" } })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        gateway
            .process_request(GraphQLRequest::new("query ($id: ID!) { item(id: $id) { id name } }").with_variables(json!({ "id": "8" })))
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn answers_root_typename_and_introspection_locally() {
        let calls = Arc::new(AtomicUsize::new(0));
        let gateway = gateway(calls.clone());
        let response = gateway
            .process_request(GraphQLRequest::new("{ __typename __schema { queryType { name } } }"))
            .await;
        assert_eq!(
            response.data,
            Some(json!({ "__typename": "Query", "__schema": { "queryType": { "name": "Query" } } }))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cached_responses_vary_on_forwarded_credentials() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let executor: Arc<dyn QueryExecutor> = Arc::new(LocalQueryExecutor::new(move |_, _, context| {
            counter.fetch_add(1, Ordering::SeqCst);
            let user = context.header("authorization").map(str::to_string);
            async move { Ok(UpstreamResponse::data(json!({ "me": user }))) }.boxed()
        }));
        let descriptor = SchemaDescriptor::parse("type Query { me: String }", "users").unwrap();
        let binding = SubschemaBinding::build("users", descriptor, &[], executor, false).unwrap();
        let gateway = FederationGateway::new(SchemaMerger::new().add_binding(binding).merge().unwrap())
            .with_cache(Arc::new(InMemoryCache::default()))
            .with_settings(GatewaySettings {
                response_cache: true,
                ..Default::default()
            });
        let as_user = |user: &str| GraphQLRequest {
            context: RequestContext::default().with_header("authorization", user),
            ..GraphQLRequest::new("{ me }")
        };

        let alice = gateway.process_request(as_user("alice")).await;
        let bob = gateway.process_request(as_user("bob")).await;
        assert_eq!(alice.data, Some(json!({ "me": "alice" })));
        assert_eq!(bob.data, Some(json!({ "me": "bob" })));

        let again = gateway.process_request(as_user("alice")).await;
        assert_eq!(again.data, Some(json!({ "me": "alice" })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn computed_fields_survive_client_aliases_on_their_requirements() {
        let sent = Arc::new(std::sync::Mutex::new(Vec::new()));
        let log = sent.clone();
        let executor: Arc<dyn QueryExecutor> = Arc::new(LocalQueryExecutor::new(move |query, _, _| {
            log.lock().unwrap().push(query);
            async { Ok(UpstreamResponse::data(json!({ "item": { "name": "T", "__req_name": "N" } }))) }.boxed()
        }));
        let descriptor =
            SchemaDescriptor::parse("type Query { item: Item } type Item { name: String title: String }", "items")
                .unwrap();
        let binding = SubschemaBinding::build("items", descriptor, &[], executor, false)
            .unwrap()
            .with_debug(true);
        let schema = SchemaMerger::new()
            .add_binding(binding)
            .type_defs("extend type Item { label: String }")
            .merge()
            .unwrap()
            .layer(vec![crate::ComputedField::from_path(
                "Item",
                "label",
                crate::selection::SelectionSet::parse("{ name }").unwrap(),
                "name",
            )])
            .unwrap();
        let gateway = FederationGateway::new(schema);

        let response = gateway
            .process_request(GraphQLRequest::new("{ item { name: title label } }"))
            .await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        assert_eq!(response.data, Some(json!({ "item": { "name": "T", "label": "N" } })));
        assert_eq!(*sent.lock().unwrap(), vec!["{ item { name: title __req_name: name } }".to_string()]);
    }

    #[tokio::test]
    async fn reports_missing_query() {
        let gateway = gateway(Arc::new(AtomicUsize::new(0)));
        let response = gateway.process_request(GraphQLRequest::default()).await;
        assert_eq!(response.errors[0].extensions["code"], "GRAPHQL_VALIDATION_FAILED");
    }
}
