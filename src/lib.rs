//! Prototype Showcase - catalog of demo projects whose pages render
//! components materialized at runtime from stored source.

pub mod catalog;
pub mod config;
pub mod import;
pub mod logging;
pub mod materializer;
pub mod resolver;
pub mod routes;
pub mod state;
pub mod store;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::config::ShowcaseConfig;
use crate::materializer::SourceError;
use crate::resolver::{load_manifests, NamespaceResolver, ResolverError};
use crate::state::AppState;
use crate::store::{RecordStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to open record store: {0}")]
    Store(#[from] StoreError),

    #[error("failed to build namespace table: {0}")]
    Resolver(#[from] ResolverError),

    #[error("failed to configure component source: {0}")]
    Source(#[from] SourceError),

    #[error("invalid bind address `{0}`")]
    Address(String),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configure CORS from environment variables.
/// Uses ALLOWED_ORIGINS (comma-separated) or FRONTEND_ORIGIN, falling back to
/// the local frontend dev server.
pub fn configure_cors() -> CorsLayer {
    let allowed_origins = std::env::var("ALLOWED_ORIGINS")
        .ok()
        .map(|s| {
            s.split(',')
                .filter_map(|origin| origin.trim().parse::<HeaderValue>().ok())
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty())
        .or_else(|| {
            std::env::var("FRONTEND_ORIGIN")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(|origin| vec![origin])
        })
        .unwrap_or_else(|| {
            vec![
                HeaderValue::from_static("http://localhost:3000"),
                HeaderValue::from_static("http://127.0.0.1:3000"),
            ]
        });

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([axum::http::header::CONTENT_TYPE])
}

/// Create and configure the application router.
pub fn create_app(state: AppState) -> Router {
    let body_limit = state.config.body_limit_bytes;

    Router::new()
        .route(
            "/api/projects",
            get(routes::projects::list_projects).post(routes::projects::create_project),
        )
        .route("/api/projects/{id}", get(routes::projects::get_project))
        .route(
            "/api/projects/{id}/modules",
            get(routes::projects::get_project_modules),
        )
        .route("/api/modules", post(routes::modules::create_module))
        .route("/api/modules/{id}", get(routes::modules::get_module))
        .route("/api/modules/{id}/pages", get(routes::modules::get_module_pages))
        .route("/api/pages", post(routes::pages::create_page))
        .route("/api/pages/{id}", get(routes::pages::get_page))
        .route("/api/pages/{id}/render", get(routes::render::render_page))
        .route(
            "/api/components",
            post(routes::components::save_component),
        )
        .route(
            "/api/components/{project_type}",
            get(routes::components::list_components),
        )
        .route(
            "/api/components/{project_type}/{name}",
            get(routes::components::get_component),
        )
        .route("/api/render/{name}", get(routes::render::render_by_name))
        .route(
            "/api/render/{project_type}/{name}",
            get(routes::render::render_component),
        )
        .route("/api/debug/components", get(routes::debug::list_components))
        .route(
            "/api/debug/components/{project_type}/{name}",
            get(routes::debug::get_component),
        )
        .route("/api/debug/projects/{id}", get(routes::debug::get_project))
        .route("/health", get(routes::health::health_ping))
        .route("/health/ready", get(routes::health::health_ready))
        .with_state(state)
        .layer(logging::middleware::propagate_request_id_layer())
        .layer(middleware::from_fn(logging::middleware::log_request))
        .layer(logging::middleware::request_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        // Enforced by the Json extractor so oversized bodies still get the error shape.
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(configure_cors())
}

/// Open the store, build the namespace table from manifests and wire the
/// component source the configuration asks for.
pub async fn build_state(config: ShowcaseConfig) -> Result<AppState, StartupError> {
    let store = Arc::new(RecordStore::open(&config.data_file).await?);
    let stats = store.stats().await;
    tracing::info!(
        path = %config.data_file.display(),
        projects = stats.projects,
        components = stats.components,
        "record store opened"
    );

    let manifests = load_manifests(&config.manifest_dir).await?;
    let resolver = Arc::new(NamespaceResolver::from_manifests(&manifests)?);
    tracing::info!(
        manifests = manifests.len(),
        components = resolver.len(),
        "namespace table built"
    );

    Ok(AppState::new(config, store, resolver)?)
}

/// Wait for Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl-C, shutting down"),
        () = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

async fn serve(config: ShowcaseConfig) -> Result<(), StartupError> {
    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .map_err(|_| StartupError::Address(config.bind_address()))?;

    let state = build_state(config).await?;
    let app = create_app(state);

    tracing::info!(%addr, "starting server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("server stopped");
    Ok(())
}

/// Run the server (used by main).
pub async fn run() -> Result<(), StartupError> {
    dotenvy::dotenv().ok();

    // Held until return so buffered log lines are flushed.
    let _log_guards = logging::init();

    routes::health::init_start_time();

    let config = ShowcaseConfig::from_env();
    let result = serve(config).await;
    if let Err(e) = &result {
        tracing::error!(error = %e, "server exited with error");
    }
    result
}

#[cfg(test)]
mod tests {
    use crate::routes::test_support::{get, test_app};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_responses_carry_request_id() {
        let (_dir, _state, app) = test_app().await;
        let res = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let (_dir, _state, app) = test_app().await;
        let (status, _) = get(&app, "/api/nothing-here").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    async fn post_oversized(content_length: bool) -> axum::response::Response {
        let (_dir, mut state, _) = test_app().await;
        let mut config = (*state.config).clone();
        config.body_limit_bytes = 64;
        state.config = std::sync::Arc::new(config);
        let app = crate::create_app(state);

        let body = serde_json::json!({
            "projectType": "t",
            "componentName": "C",
            "content": "x".repeat(500)
        })
        .to_string();
        let mut request = Request::post("/api/components").header("content-type", "application/json");
        if content_length {
            request = request.header("content-length", body.len());
        }
        app.oneshot(request.body(Body::from(body)).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected_with_error_body() {
        for content_length in [true, false] {
            let res = post_oversized(content_length).await;
            assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
            let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
            let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(parsed, serde_json::json!({"error": crate::routes::BODY_TOO_LARGE}));
        }
    }
}
