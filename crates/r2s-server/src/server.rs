use std::time::Instant;

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use r2s_core::Pipeline;
use r2s_store::SnapshotRepo;

use crate::config::ServerConfig;
use crate::{handlers, snapshots};

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Pipeline,
    /// `None` when no database path is configured.
    pub snapshots: Option<SnapshotRepo>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(pipeline: Pipeline, snapshots: Option<SnapshotRepo>) -> Self {
        Self {
            pipeline,
            snapshots,
            start_time: Instant::now(),
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/api/solve", post(handlers::solve))
        .route("/api/save", post(handlers::save))
        .route("/api/download-csv", post(handlers::download_csv))
        .route("/api/db-status", get(snapshots::db_status))
        .route("/api/snapshots", get(snapshots::list).post(snapshots::create))
        .route("/api/snapshots/latest", get(snapshots::latest))
        .route(
            "/api/snapshots/{id}",
            get(snapshots::get).put(snapshots::update).delete(snapshots::delete),
        )
        .route("/health", get(handlers::health))
        .fallback(handlers::not_found)
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.body_limit_bytes))
        .layer(cors_layer(&config.cors_origins))
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve in the background. Returns a handle to shut it down.
pub async fn start(config: &ServerConfig, state: AppState) -> Result<ServerHandle, std::io::Error> {
    let router = build_router(state, config);
    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    let local_addr = listener.local_addr()?;

    info!(addr = %local_addr, "r2s server started");

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let serve = axum::serve(listener, router).with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });
        if let Err(e) = serve.await {
            error!(error = %e, "server exited with error");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        shutdown: shutdown_tx,
        server,
    })
}

/// Handle returned by [`start`]; keeps the server task alive.
pub struct ServerHandle {
    pub port: u16,
    shutdown: oneshot::Sender<()>,
    server: JoinHandle<()>,
}

impl ServerHandle {
    /// Stop accepting connections and wait for in-flight requests to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.server.await {
            warn!(error = %e, "server task did not exit cleanly");
        }
        info!("r2s server stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use r2s_core::Collaborators;
    use r2s_gateway::mock::{EchoAllocator, FixedReply, ScoringPostprocessor, StubValidator};
    use tower::ServiceExt;

    fn make_state() -> AppState {
        let pipeline = Pipeline::new(Collaborators {
            preparer: Arc::new(FixedReply::failure("not used")),
            allocator: Arc::new(EchoAllocator::default()),
            postprocessor: Arc::new(ScoringPostprocessor::default()),
            validator: Arc::new(StubValidator::accepting()),
        });
        AppState::new(pipeline, None)
    }

    fn make_router() -> Router {
        build_router(make_state(), &ServerConfig::default())
    }

    #[tokio::test]
    async fn health_endpoint() {
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = make_router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert!(parsed["version"].is_string());
    }

    #[tokio::test]
    async fn unknown_api_route_returns_404() {
        let req = Request::builder().uri("/api/nope").body(Body::empty()).unwrap();
        let resp = make_router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["error"], "API endpoint not found");
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let req = Request::builder().uri("/nonexistent").body(Body::empty()).unwrap();
        let resp = make_router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn permissive_cors_when_no_origins() {
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/save")
            .header(header::ORIGIN, "http://example.test")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();
        let resp = make_router().oneshot(req).await.unwrap();
        assert_eq!(resp.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn listed_cors_origin_is_echoed() {
        let config = ServerConfig {
            cors_origins: vec!["http://localhost:5173".into()],
            ..ServerConfig::default()
        };
        let router = build_router(make_state(), &config);
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/save")
            .header(header::ORIGIN, "http://localhost:5173")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "http://localhost:5173");
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let config = ServerConfig {
            body_limit_bytes: 16,
            ..ServerConfig::default()
        };
        let router = build_router(make_state(), &config);
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/save")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(vec![b' '; 64]))
            .unwrap();
        let resp = router.oneshot(req).await.unwrap();
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn server_starts_and_shuts_down() {
        let config = ServerConfig {
            port: 0,
            ..ServerConfig::default()
        };
        let handle = start(&config, make_state()).await.unwrap();
        assert!(handle.port > 0);
        handle.shutdown().await;
    }
}
