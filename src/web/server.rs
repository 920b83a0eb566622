use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::api::passes as pass_handlers;
use super::api::schedule as schedule_handlers;
use super::api::tracking as tracking_handlers;
use super::error::WebError;
use super::state::AppState;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Trajectory store
        .route("/api/passes", get(pass_handlers::list_passes))
        .route("/api/passes/{id}", get(pass_handlers::get_pass))
        .route("/api/passes/{id}/header", get(pass_handlers::get_header))
        .route("/api/schedule/regenerate", post(schedule_handlers::regenerate))
        .route("/api/cache/clear", post(schedule_handlers::clear_cache))
        // Control loop
        .route("/api/tracking/start", post(tracking_handlers::start))
        .route("/api/tracking/stop", post(tracking_handlers::stop))
        .route("/api/tracking/status", get(tracking_handlers::status))
        .route(
            "/api/tracking/additional-data",
            post(tracking_handlers::additional_data),
        )
        .route("/api/queue", post(tracking_handlers::load_queue))
        .route("/api/clock/offset", post(tracking_handlers::set_clock_offset))
        .route("/api/clock/sync", post(tracking_handlers::sync_clock))
        // Middleware
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(state: AppState) -> Result<(), WebError> {
    let bind_addr = state.config.web.bind.clone();
    let app = router(state);

    log::info!("Starting server on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|source| WebError::Bind {
            addr: bind_addr.clone(),
            source,
        })?;
    axum::serve(listener, app).await?;
    Ok(())
}
