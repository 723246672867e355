//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo, one task per connection. Probes and CORS
//! preflight are answered here. Under `/api/`, admission runs on the request
//! head before the body is read, then [`routes::dispatch`] runs the handler.

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN,
};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::admission::{self, AdmissionController, MonotonicClock, WindowTable};
use crate::config::Args;
use crate::eligibility::SchemeCatalog;
use crate::routes::{self, json_response, FullBody};
use crate::store::Stores;
use crate::types::{Result, SakhiError};

/// Request bodies larger than this are rejected with 413
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub stores: Stores,
    /// Scheme catalog, loaded once at startup
    pub catalog: Arc<SchemeCatalog>,
    pub admission: Arc<AdmissionController>,
    /// Value sent as Access-Control-Allow-Origin
    pub cors_origin: HeaderValue,
    pub started_at: Instant,
}

impl AppState {
    /// State with an admission controller built from the configured budgets
    pub fn new(args: Args, stores: Stores, catalog: SchemeCatalog) -> Result<Self> {
        let admission = AdmissionController::new(
            args.budget_table(),
            Arc::new(WindowTable::new()),
            Arc::new(MonotonicClock::new()),
        )
        .with_eviction_threshold(args.budgets.evict_after_windows);

        Self::with_admission(args, stores, catalog, admission)
    }

    /// State with a caller-supplied admission controller (tests inject a manual clock)
    pub fn with_admission(
        args: Args,
        stores: Stores,
        catalog: SchemeCatalog,
        admission: AdmissionController,
    ) -> Result<Self> {
        let cors_origin = HeaderValue::from_str(args.allowed_origins.trim()).map_err(|_| {
            SakhiError::Config(format!(
                "ALLOWED_ORIGINS is not a valid header value: {}",
                args.allowed_origins
            ))
        })?;

        Ok(Self {
            args,
            stores,
            catalog: Arc::new(catalog),
            admission: Arc::new(admission),
            cors_origin,
            started_at: Instant::now(),
        })
    }
}

pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Krishi Sakhi listening on {} as node {}",
        state.args.listen, state.args.node_id
    );

    admission::spawn_sweep_task(Arc::clone(&state.admission), state.args.sweep_interval());

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .preserve_header_case(true)
                        .title_case_headers(true)
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<FullBody>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!("[{}] {} {}", addr, method, path);

    let response = match (method, path.as_str()) {
        // CORS preflight
        (Method::OPTIONS, _) => preflight_response(),

        // Liveness probe
        (Method::GET, "/health") | (Method::GET, "/healthz") => routes::health_check(&state),

        // Readiness probe - 200 only if the store answers
        (Method::GET, "/ready") | (Method::GET, "/readyz") => {
            routes::readiness_check(&state).await
        }

        // Version info for deployment verification
        (Method::GET, "/version") => routes::version_info(),

        (_, p) if p.starts_with("/api/") => {
            let (parts, body) = req.into_parts();
            match routes::admit_request(&state, &parts) {
                Ok(admitted) => match collect_body(body).await {
                    Ok(body) => routes::dispatch(&state, admitted, &parts, body).await,
                    Err(response) => response,
                },
                Err(response) => response,
            }
        }

        _ => routes::not_found_response(&path),
    };

    Ok(with_cors(response, &state.cors_origin))
}

/// Buffer the request body, bounded by [`MAX_BODY_BYTES`]
async fn collect_body(body: Incoming) -> std::result::Result<Bytes, Response<FullBody>> {
    match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => Err(json_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            &serde_json::json!({
                "success": false,
                "error": "Request body too large",
                "code": "PAYLOAD_TOO_LARGE",
            }),
        )),
        Err(e) => {
            warn!("Failed to read request body: {}", e);
            Err(json_response(
                StatusCode::BAD_REQUEST,
                &serde_json::json!({
                    "success": false,
                    "error": "Failed to read request body",
                    "code": "BAD_REQUEST",
                }),
            ))
        }
    }
}

fn with_cors(mut response: Response<FullBody>, origin: &HeaderValue) -> Response<FullBody> {
    response
        .headers_mut()
        .insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
    response
}

/// CORS preflight response
fn preflight_response() -> Response<FullBody> {
    let mut response = Response::new(Full::new(Bytes::new()));
    let headers = response.headers_mut();
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, X-User-Id"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PUT, PATCH, DELETE, OPTIONS"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preflight_allows_identity_header() {
        let response = with_cors(preflight_response(), &HeaderValue::from_static("*"));
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers.get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
        assert!(headers
            .get(ACCESS_CONTROL_ALLOW_HEADERS)
            .unwrap()
            .to_str()
            .unwrap()
            .contains("X-User-Id"));
    }
}
