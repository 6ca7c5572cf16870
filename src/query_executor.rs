use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::error::ExecutionError;
use crate::introspection::{INTROSPECTION_QUERY, descriptor_from_introspection};
use crate::schema_descriptor::SchemaDescriptor;
use crate::selection::Document;
use crate::{GraphQLError, RequestContext};

pub const DEFAULT_USER_AGENT: &str = concat!("portkey-stitch/", env!("CARGO_PKG_VERSION"));

pub const DEFAULT_FORWARD_HEADERS: [&str; 5] = [
    "authorization",
    "x-api-key",
    "x-token",
    "traceparent",
    "x-request-id",
];

/// Usable data from an upstream, with any errors it reported alongside.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct UpstreamResponse {
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub errors: Vec<GraphQLError>,
}

impl UpstreamResponse {
    pub fn data(data: Value) -> Self {
        UpstreamResponse {
            data,
            errors: Vec::new(),
        }
    }
}

#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn send(
        &self,
        query: &str,
        variables: &Map<String, Value>,
        context: &RequestContext,
    ) -> Result<UpstreamResponse, ExecutionError>;

    async fn execute(
        &self,
        document: &Document,
        variables: &Map<String, Value>,
        context: &RequestContext,
    ) -> Result<UpstreamResponse, ExecutionError> {
        self.send(&document.to_string(), variables, context).await
    }

    /// Headers of `context` that reach the upstream, sorted by name. Cached
    /// responses vary on them.
    fn forwarded_headers(&self, context: &RequestContext) -> Vec<(String, String)> {
        let mut headers: Vec<(String, String)> = context
            .headers()
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        headers.sort();
        headers
    }

    async fn introspect(&self) -> Result<SchemaDescriptor, ExecutionError> {
        let response = self
            .send(INTROSPECTION_QUERY, &Map::new(), &RequestContext::default())
            .await?;
        descriptor_from_introspection(&response.data)
            .map_err(|e| ExecutionError::transport(format!("invalid introspection result: {e}")))
    }
}

/// Executes against a remote GraphQL endpoint over HTTP.
pub struct HttpQueryExecutor {
    client: reqwest::Client,
    url: String,
    forward_headers: Vec<String>,
    user_agent: String,
    timeout: Duration,
}

impl HttpQueryExecutor {
    pub fn new(url: impl Into<String>) -> Self {
        HttpQueryExecutor {
            client: reqwest::Client::new(),
            url: url.into(),
            forward_headers: DEFAULT_FORWARD_HEADERS.iter().map(|h| h.to_string()).collect(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_forward_headers(mut self, headers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.forward_headers = headers
            .into_iter()
            .map(|header| header.into().to_ascii_lowercase())
            .collect();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl fmt::Debug for HttpQueryExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpQueryExecutor")
            .field("url", &self.url)
            .field("forward_headers", &self.forward_headers)
            .finish()
    }
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphQLError>,
}

#[async_trait]
impl QueryExecutor for HttpQueryExecutor {
    fn forwarded_headers(&self, context: &RequestContext) -> Vec<(String, String)> {
        let mut headers: Vec<(String, String)> = self
            .forward_headers
            .iter()
            .filter_map(|name| context.header(name).map(|value| (name.clone(), value.to_string())))
            .collect();
        headers.sort();
        headers
    }

    async fn send(
        &self,
        query: &str,
        variables: &Map<String, Value>,
        context: &RequestContext,
    ) -> Result<UpstreamResponse, ExecutionError> {
        let request_body = json!({
            "query": query,
            "variables": variables,
        });

        let mut request = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .header(http::header::USER_AGENT, &self.user_agent)
            .header(http::header::CONTENT_TYPE, "application/json")
            .json(&request_body);
        for (name, value) in self.forwarded_headers(context) {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ExecutionError::transport(format!("failed to reach {}: {e}", self.url)))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ExecutionError::transport(format!("failed to read response from {}: {e}", self.url)))?;

        let envelope: Envelope = match serde_json::from_slice(&body) {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => {
                return Err(ExecutionError::transport(format!(
                    "invalid response from {}: {e}",
                    self.url
                )));
            }
            Err(_) => {
                return Err(ExecutionError::transport(format!(
                    "{} responded with {status}",
                    self.url
                )));
            }
        };

        match envelope.data {
            Some(data) if !data.is_null() => Ok(UpstreamResponse {
                data,
                errors: envelope.errors,
            }),
            _ if !envelope.errors.is_empty() => Err(ExecutionError::upstream(envelope.errors)),
            _ if !status.is_success() => Err(ExecutionError::transport(format!(
                "{} responded with {status}",
                self.url
            ))),
            _ => Ok(UpstreamResponse::data(Value::Null)),
        }
    }
}

pub type LocalHandler = Arc<
    dyn Fn(String, Map<String, Value>, RequestContext) -> BoxFuture<'static, Result<UpstreamResponse, ExecutionError>>
        + Send
        + Sync,
>;

/// Executes in process, mostly for tests and locally implemented subgraphs.
#[derive(Clone)]
pub struct LocalQueryExecutor {
    handler: LocalHandler,
    schema: Option<SchemaDescriptor>,
}

impl LocalQueryExecutor {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(String, Map<String, Value>, RequestContext) -> BoxFuture<'static, Result<UpstreamResponse, ExecutionError>>
            + Send
            + Sync
            + 'static,
    {
        LocalQueryExecutor {
            handler: Arc::new(handler),
            schema: None,
        }
    }

    /// Answers `introspect()` from a fixed schema instead of the handler.
    pub fn with_schema(mut self, schema: SchemaDescriptor) -> Self {
        self.schema = Some(schema);
        self
    }
}

#[async_trait]
impl QueryExecutor for LocalQueryExecutor {
    async fn send(
        &self,
        query: &str,
        variables: &Map<String, Value>,
        context: &RequestContext,
    ) -> Result<UpstreamResponse, ExecutionError> {
        (self.handler)(query.to_string(), variables.clone(), context.clone()).await
    }

    async fn introspect(&self) -> Result<SchemaDescriptor, ExecutionError> {
        match &self.schema {
            Some(schema) => Ok(schema.clone()),
            None => {
                let response = self
                    .send(INTROSPECTION_QUERY, &Map::new(), &RequestContext::default())
                    .await?;
                descriptor_from_introspection(&response.data)
                    .map_err(|e| ExecutionError::transport(format!("invalid introspection result: {e}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ExecutionErrorKind;
    use futures::FutureExt;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn posts_query_and_variables() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(body_partial_json(json!({ "query": "{ a }", "variables": { "id": 1 } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "a": 1 } })))
            .expect(1)
            .mount(&server)
            .await;

        let executor = HttpQueryExecutor::new(format!("{}/graphql", server.uri()));
        let variables = json!({ "id": 1 }).as_object().cloned().unwrap();
        let response = executor
            .send("{ a }", &variables, &RequestContext::default())
            .await
            .unwrap();
        assert_eq!(response.data, json!({ "a": 1 }));
        assert!(response.errors.is_empty());
    }

    #[tokio::test]
    async fn forwards_allow_listed_headers_only() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer token"))
            .and(header("user-agent", "stitch-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "a": 1 } })))
            .expect(1)
            .mount(&server)
            .await;

        let executor = HttpQueryExecutor::new(server.uri()).with_user_agent("stitch-test");
        let context = RequestContext::default()
            .with_header("Authorization", "Bearer token")
            .with_header("cookie", "secret");
        executor.send("{ a }", &Map::new(), &context).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert!(requests[0].headers.get("cookie").is_none());
        assert_eq!(
            executor.forwarded_headers(&context),
            vec![("authorization".to_string(), "Bearer token".to_string())]
        );
    }

    #[tokio::test]
    async fn classifies_failures() {
        let server = MockServer::start().await;
        Mock::given(path("/errors"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "errors": [{ "message": "boom" }] })),
            )
            .mount(&server)
            .await;
        Mock::given(path("/partial"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "a": null, "b": 2 },
                "errors": [{ "message": "a failed", "path": ["a"] }]
            })))
            .mount(&server)
            .await;
        Mock::given(path("/down"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let send = |route: &str| {
            let executor = HttpQueryExecutor::new(format!("{}{route}", server.uri()));
            async move { executor.send("{ a }", &Map::new(), &RequestContext::default()).await }
        };

        let error = send("/errors").await.unwrap_err();
        assert_eq!(error.kind(), ExecutionErrorKind::Upstream);
        assert_eq!(error.to_string(), "upstream returned errors: boom");

        let partial = send("/partial").await.unwrap();
        assert_eq!(partial.data["b"], json!(2));
        assert_eq!(partial.errors[0].message, "a failed");

        let error = send("/down").await.unwrap_err();
        assert_eq!(error.kind(), ExecutionErrorKind::Transport);
    }

    #[tokio::test]
    async fn times_out_slow_upstreams() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "data": { "a": 1 } }))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let executor = HttpQueryExecutor::new(server.uri()).with_timeout(Duration::from_millis(50));
        let error = executor
            .send("{ a }", &Map::new(), &RequestContext::default())
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ExecutionErrorKind::Transport);
    }

    #[tokio::test]
    async fn local_executor_serves_fixed_schema() {
        let schema = SchemaDescriptor::parse("type Query { a: Int }", "local").unwrap();
        let executor = LocalQueryExecutor::new(|query, _, _| {
            async move { Ok(UpstreamResponse::data(json!({ "echo": query }))) }.boxed()
        })
        .with_schema(schema.clone());

        assert_eq!(executor.introspect().await.unwrap(), schema);
        let response = executor
            .send("{ a }", &Map::new(), &RequestContext::default())
            .await
            .unwrap();
        assert_eq!(response.data, json!({ "echo": "{ a }" }));
    }
}
