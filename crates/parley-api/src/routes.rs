//! Router setup with all API routes and middleware.

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use parley_core::config::ParleyConfig;
use parley_core::error::ParleyError;

use crate::handlers;
use crate::state::AppState;

/// JSON bodies other than uploads.
const JSON_BODY_LIMIT: usize = 1024 * 1024;

/// Localhost origins on the server port and the port above it (dev server).
fn local_origins(port: u16) -> Vec<HeaderValue> {
    let dev_port = port.saturating_add(1);
    [port, dev_port]
        .into_iter()
        .flat_map(|p| {
            [
                format!("http://127.0.0.1:{}", p),
                format!("http://localhost:{}", p),
            ]
        })
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect()
}

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(local_origins(state.config.server.port)))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::HeaderName::from_static(handlers::FILE_NAME_HEADER),
        ]);

    let upload_limit = state.config.server.max_upload_bytes;

    let routes = Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/conversation",
            get(handlers::get_conversation).delete(handlers::reset_conversation),
        )
        .route("/conversation/messages", post(handlers::send_message))
        .route(
            "/conversation/messages/{id}/feedback",
            post(handlers::record_feedback),
        )
        .route(
            "/conversation/messages/{id}/reprompt",
            post(handlers::reprompt),
        )
        .route(
            "/draft",
            get(handlers::get_draft)
                .put(handlers::update_draft)
                .delete(handlers::discard_draft),
        )
        .route("/draft/dictation/start", post(handlers::dictation_start))
        .route("/draft/dictation/stop", post(handlers::dictation_stop))
        .route(
            "/attachments",
            get(handlers::list_attachments)
                .post(handlers::upload_attachment)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/attachments/{id}",
            axum::routing::delete(handlers::remove_attachment),
        )
        .route(
            "/attachments/{id}/content",
            get(handlers::attachment_content),
        )
        .route(
            "/settings",
            get(handlers::get_settings).put(handlers::update_settings),
        )
        .route("/settings/reset", post(handlers::reset_settings))
        .route("/stream", get(handlers::stream));

    routes
        .layer(DefaultBodyLimit::max(JSON_BODY_LIMIT))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server on the configured address.
pub async fn start_server(config: &ParleyConfig, state: AppState) -> Result<(), ParleyError> {
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let router = create_router(state);

    tracing::info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ParleyError::Api(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, router)
        .await
        .map_err(|e| ParleyError::Api(format!("Server error: {}", e)))?;

    Ok(())
}
