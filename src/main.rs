use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use clap::Parser;
use http::response::Builder;
use http_body_util::{BodyExt, Full, combinators::BoxBody};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use portkey_stitch::{FederationGateway, GatewayConfig, GraphQLError, GraphQLRequest, GraphQLResponse, RequestContext};

type Body = BoxBody<Bytes, hyper::Error>;

#[derive(Parser, Debug)]
#[command(name = "portkey-stitch", version, about = "GraphQL schema stitching gateway")]
struct Args {
    /// Gateway configuration file.
    #[arg(long, env = "PORTKEY_CONFIG", default_value = "./schemas/supergraph.yaml")]
    config: PathBuf,

    /// Overrides `listen` from the configuration.
    #[arg(long, env = "PORTKEY_LISTEN")]
    listen: Option<SocketAddr>,

    /// Print the merged schema as SDL and exit.
    #[arg(long)]
    print_schema: bool,
}

// GraphiQL with the header editor, so forwarded headers can be tried out
const GRAPHIQL_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <title>portkey-stitch</title>
    <link rel="stylesheet" href="https://unpkg.com/graphiql@3.0.10/graphiql.min.css" />
    <style>html, body, #graphiql { height: 100%; margin: 0; }</style>
  </head>
  <body>
    <div id="graphiql">Loading…</div>
    <script crossorigin src="https://unpkg.com/react@18.2.0/umd/react.production.min.js"></script>
    <script crossorigin src="https://unpkg.com/react-dom@18.2.0/umd/react-dom.production.min.js"></script>
    <script crossorigin src="https://unpkg.com/graphiql@3.0.10/graphiql.min.js"></script>
    <script>
      const fetcher = GraphiQL.createFetcher({ url: '/graphql' });
      ReactDOM.createRoot(document.getElementById('graphiql')).render(
        React.createElement(GraphiQL, { fetcher, headerEditorEnabled: true, shouldPersistHeaders: true })
      );
    </script>
  </body>
</html>
"#;

// Create a response body from a string
fn full<T: Into<Bytes>>(value: T) -> Body {
    Full::new(value.into())
        .map_err(|never| match never {})
        .boxed()
}

fn cors(builder: Builder) -> Builder {
    builder
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .header("Access-Control-Allow-Headers", "*")
}

fn respond(builder: Builder, body: impl Into<Bytes>) -> Response<Body> {
    cors(builder)
        .body(full(body))
        .unwrap_or_else(|_| internal_server_error())
}

fn json_response(status: StatusCode, response: &GraphQLResponse) -> Response<Body> {
    match serde_json::to_vec(response) {
        Ok(json) => respond(
            Response::builder()
                .status(status)
                .header("Content-Type", "application/json"),
            json,
        ),
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize response");
            internal_server_error()
        }
    }
}

async fn graphql(req: Request<Incoming>, gateway: &FederationGateway) -> Response<Body> {
    let context = RequestContext::from_headers(req.headers());
    let body = match req.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            tracing::warn!(error = %e, "failed to read request body");
            return respond(
                Response::builder().status(StatusCode::BAD_REQUEST),
                "Failed to read request body",
            );
        }
    };

    match serde_json::from_slice::<GraphQLRequest>(&body) {
        Ok(mut request) => {
            request.context = context;
            let response = gateway.process_request(request).await;
            json_response(StatusCode::OK, &response)
        }
        Err(e) => json_response(
            StatusCode::BAD_REQUEST,
            &GraphQLResponse::from_error(GraphQLError::new(format!("Invalid JSON request: {e}"))),
        ),
    }
}

async fn handle_request(req: Request<Incoming>, gateway: Arc<FederationGateway>) -> Result<Response<Body>, Infallible> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::POST, "/graphql") => graphql(req, &gateway).await,
        (&Method::GET, "/graphiql") => respond(Response::builder().header("Content-Type", "text/html"), GRAPHIQL_HTML),
        (&Method::GET, "/") => respond(
            Response::builder()
                .status(StatusCode::FOUND)
                .header("Location", "/graphiql"),
            "",
        ),
        (&Method::OPTIONS, _) => respond(Response::builder().status(StatusCode::NO_CONTENT), ""),
        _ => respond(Response::builder().status(StatusCode::NOT_FOUND), "Not Found"),
    };
    Ok(response)
}

fn internal_server_error() -> Response<Body> {
    let mut response = Response::new(full("Internal Server Error"));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

#[derive(Clone)]
// An Executor that uses the tokio runtime.
pub struct TokioExecutor;

impl<F> hyper::rt::Executor<F> for TokioExecutor
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    fn execute(&self, fut: F) {
        tokio::task::spawn(fut);
    }
}

async fn serve(listener: TcpListener, gateway: Arc<FederationGateway>) -> std::io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let gateway = Arc::clone(&gateway);

        tokio::task::spawn(async move {
            let service = service_fn(move |req| handle_request(req, Arc::clone(&gateway)));
            if let Err(e) = hyper_util::server::conn::auto::Builder::new(TokioExecutor)
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                tracing::debug!(%peer, error = %e, "connection closed with error");
            }
        });
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = GatewayConfig::load(&args.config)?;
    let gateway = FederationGateway::from_config(&config).await.inspect_err(|e| {
        tracing::error!(error = %e, "failed to build the merged schema");
    })?;

    if args.print_schema {
        println!("{}", gateway.schema().sdl());
        return Ok(());
    }

    let addr = args.listen.unwrap_or(config.listen);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("GraphQL gateway listening on http://{addr}/graphql");
    tracing::info!("GraphiQL UI available at http://{addr}/graphiql");

    tokio::select! {
        result = serve(listener, Arc::new(gateway)) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
    }
    Ok(())
}
