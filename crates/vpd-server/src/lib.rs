pub mod clock;
pub mod controller;
pub mod device;
pub mod error;
pub mod proxy;
pub mod routes;
pub mod state;

use axum::routing::{get, post, put};
use axum::Router;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve_on()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Events (SSE)
        .route("/api/events", get(routes::events::sse_events))
        // Status
        .route("/api/status", get(routes::status::get_status))
        // Overrides
        .route("/api/overrides", get(routes::overrides::list_overrides))
        .route(
            "/api/overrides/{actuator}",
            post(routes::overrides::set_override).delete(routes::overrides::clear_override),
        )
        // Stages
        .route("/api/stages", get(routes::stages::list_stages))
        .route("/api/stage", put(routes::stages::set_stage))
        // Policy
        .route("/api/policy/reload", post(routes::policy::reload_policy))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Serve the control API on a pre-bound listener until `shutdown` flips.
///
/// Accepting a bound `TcpListener` lets the caller read the actual port
/// before starting (useful when `port = 0` and the OS picks a free port).
pub async fn serve_on(
    app_state: AppState,
    listener: tokio::net::TcpListener,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    let app = build_router(app_state);

    tracing::info!("control API listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await?;
    Ok(())
}
