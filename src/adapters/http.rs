//! HTTP channel: REST bridge and peer envelope intake.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use super::{Channel, Endpoint};
use crate::error::Error;
use crate::protocol::{Envelope, RestRequest, RestResponse};
use crate::Result;

/// Maximum JSON body size (64 KB).
const MAX_BODY_BYTES: usize = 64 * 1024;

/// HTTP channel serving `/chat`, `/submit` and `/health`.
pub struct HttpChannel {
    endpoint: Arc<Endpoint>,
    addr: SocketAddr,
    shutdown: watch::Sender<bool>,
}

impl HttpChannel {
    pub fn new(endpoint: Arc<Endpoint>, addr: SocketAddr) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            endpoint,
            addr,
            shutdown,
        }
    }

    /// The channel's routes with state applied.
    pub fn routes(&self) -> Router {
        router(self.endpoint.clone())
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serve on an already bound listener until [`Channel::stop`] is called.
    pub fn serve(&self, listener: TcpListener) -> impl std::future::Future<Output = Result<()>> + Send + 'static {
        serve_until(listener, self.routes(), self.shutdown.subscribe())
    }
}

/// Bind the HTTP listener.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Config(format!("Failed to bind {}: {}", addr, e)))
}

async fn serve_until(listener: TcpListener, app: Router, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    if let Ok(local) = listener.local_addr() {
        info!("HTTP channel listening on http://{}", local);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
        .await?;

    info!("HTTP channel stopped");
    Ok(())
}

/// Build the router for an endpoint.
pub fn router(endpoint: Arc<Endpoint>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/chat", post(chat_handler))
        .route("/submit", post(submit_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(endpoint)
}

/// Error body returned to HTTP callers.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(Error::InvalidMessage(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::InvalidMessage(_) => StatusCode::BAD_REQUEST,
            Error::BackendUnavailable(_) => StatusCode::BAD_GATEWAY,
            Error::Transport(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("request failed: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    name: String,
    address: String,
    turns: usize,
}

async fn health_handler(State(endpoint): State<Arc<Endpoint>>) -> impl IntoResponse {
    let identity = endpoint.identity();
    Json(HealthResponse {
        status: "healthy".to_string(),
        name: identity.name.clone(),
        address: identity.address.clone(),
        turns: endpoint.processor().turns(),
    })
}

async fn chat_handler(
    State(endpoint): State<Arc<Endpoint>>,
    body: std::result::Result<Json<RestRequest>, JsonRejection>,
) -> std::result::Result<Json<RestResponse>, ApiError> {
    let Json(req) = body?;
    let response = endpoint.on_rest_request(req).await?;
    Ok(Json(response))
}

async fn submit_handler(
    State(endpoint): State<Arc<Endpoint>>,
    body: std::result::Result<Json<Envelope>, JsonRejection>,
) -> std::result::Result<impl IntoResponse, ApiError> {
    let Json(envelope) = body?;
    endpoint.on_envelope(envelope).await?;
    Ok((StatusCode::OK, Json(json!({ "status": "delivered" }))))
}

impl Channel for HttpChannel {
    fn name(&self) -> &str {
        "http"
    }

    fn start(&self) -> impl std::future::Future<Output = Result<()>> + Send {
        let addr = self.addr;
        let app = self.routes();
        let shutdown = self.shutdown.subscribe();

        async move {
            let listener = bind(addr).await?;
            serve_until(listener, app, shutdown).await
        }
    }

    fn stop(&self) -> impl std::future::Future<Output = Result<()>> + Send {
        if self.shutdown.receiver_count() == 0 {
            warn!("HTTP channel was not running");
        }
        self.shutdown.send_replace(true);
        async { Ok(()) }
    }
}
