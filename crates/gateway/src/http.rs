//! The HTTP front door: `POST <configured-path>` runs the decision facade
//! and, on allow, proxies byte-for-byte to the origin; `GET /ping` is a
//! liveness probe. `GraphqlEndpoint` is a hand-rolled `Endpoint` impl
//! reading the raw request rather than going through `#[handler]`
//! extractors, since the facade needs the full header set and raw body,
//! not a typed subset of either.

use std::collections::BTreeMap;
use std::sync::Arc;

use gqiam_identity::{IdentityConfig, TokenVerifier};
use gqiam_role_cache::RoleCache;
use poem::endpoint::BoxEndpoint;
use poem::http::{HeaderName, Method, StatusCode};
use poem::middleware::Cors;
use poem::{get, handler, post, Endpoint, EndpointExt, IntoResponse, Request, Response, Route};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::config::CorsOptions;
use crate::facade::{authorize, AuthorizeRequest, Decision, DenyReason};
use crate::role_source::ManagerRoleSource;

pub struct AppState {
    pub identity_config: IdentityConfig,
    pub verifier: Option<TokenVerifier>,
    pub role_cache: Arc<RoleCache<ManagerRoleSource>>,
    pub http_client: reqwest::Client,
    pub source_url: Url,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphQlRequest {
    query: String,
    #[serde(default)]
    #[allow(dead_code)]
    operation_name: Option<String>,
    #[serde(default)]
    variables: Value,
}

#[derive(Serialize)]
struct DenyBody {
    message: &'static str,
}

pub fn build_router(path: &str, state: Arc<AppState>, cors_options: &CorsOptions) -> BoxEndpoint<'static> {
    let route = Route::new().at("/ping", get(ping)).at(path, post(GraphqlEndpoint { state }));
    route.with(cors_middleware(cors_options)).boxed()
}

/// An empty `cors_options` means "no cross-origin restrictions configured",
/// which poem's default `Cors::new()` already expresses (reflects any
/// origin, allows the common methods and headers).
fn cors_middleware(options: &CorsOptions) -> Cors {
    let mut cors = Cors::new();
    for origin in &options.allow_origins {
        cors = cors.allow_origin(origin.clone());
    }
    for method in &options.allow_methods {
        if let Ok(method) = method.parse::<Method>() {
            cors = cors.allow_method(method);
        } else {
            tracing::warn!(%method, "ignoring unparseable corsOptions.allowMethods entry");
        }
    }
    for header in &options.allow_headers {
        if let Ok(header) = header.parse::<HeaderName>() {
            cors = cors.allow_header(header);
        } else {
            tracing::warn!(%header, "ignoring unparseable corsOptions.allowHeaders entry");
        }
    }
    cors
}

#[handler]
async fn ping() -> &'static str {
    "pong"
}

struct GraphqlEndpoint {
    state: Arc<AppState>,
}

#[poem::async_trait]
impl Endpoint for GraphqlEndpoint {
    type Output = Response;

    async fn call(&self, mut req: Request) -> poem::Result<Response> {
        let headers = collect_headers(&req);
        let socket_remote_addr = req.remote_addr().to_string();
        let proto = format!("{:?}", req.version());

        let body = req.take_body();
        let bytes = match body.into_bytes().await {
            Ok(bytes) => bytes,
            Err(_) => return Ok(deny_response(DenyReason::BadRequest)),
        };

        let parsed: GraphQlRequest = match serde_json::from_slice(&bytes) {
            Ok(parsed) => parsed,
            Err(_) => return Ok(deny_response(DenyReason::BadRequest)),
        };

        let request = AuthorizeRequest {
            headers: &headers,
            query: &parsed.query,
            variables: parsed.variables,
            proto,
            socket_remote_addr,
        };

        let decision = authorize(
            &self.state.identity_config,
            self.state.verifier.as_ref(),
            &self.state.role_cache,
            request,
        )
        .await;

        match decision {
            Decision::Allow => proxy_to_origin(&self.state, bytes.as_ref()).await,
            Decision::Deny(reason) => Ok(deny_response(reason)),
        }
    }
}

fn collect_headers(req: &Request) -> BTreeMap<String, String> {
    req.headers()
        .iter()
        .filter_map(|(name, value)| {
            value.to_str().ok().map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}

async fn proxy_to_origin(state: &AppState, body: &[u8]) -> poem::Result<Response> {
    let upstream = state
        .http_client
        .post(state.source_url.clone())
        .header("content-type", "application/json")
        .body(body.to_vec())
        .send()
        .await
        .map_err(|e| poem::Error::from_string(e.to_string(), StatusCode::BAD_GATEWAY))?;

    let status = upstream.status();
    let content_type = upstream
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/json")
        .to_string();
    let bytes = upstream
        .bytes()
        .await
        .map_err(|e| poem::Error::from_string(e.to_string(), StatusCode::BAD_GATEWAY))?;

    Ok(Response::builder()
        .status(status)
        .header("content-type", content_type)
        .body(bytes.to_vec()))
}

fn deny_response(reason: DenyReason) -> Response {
    let (status, message) = match reason {
        DenyReason::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
        DenyReason::BadRequest => (StatusCode::BAD_REQUEST, "bad request"),
        DenyReason::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
    };
    poem::web::Json(DenyBody { message }).with_status(status).into_response()
}
