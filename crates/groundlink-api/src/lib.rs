pub mod handlers;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

pub use handlers::ApiState;

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/status", get(handlers::handle_status))
        .route("/telemetry", get(handlers::handle_telemetry))
        .route("/link/ports", get(handlers::handle_ports))
        .route("/connect", post(handlers::handle_connect))
        .route("/disconnect", post(handlers::handle_disconnect))
        .route("/command", post(handlers::handle_command))
        .route("/mission/upload", post(handlers::handle_mission_upload))
        .route("/mission/download", get(handlers::handle_mission_download))
        .route("/mission/clear", post(handlers::handle_mission_clear))
        .route("/mission/cancel", post(handlers::handle_mission_cancel))
        .route("/mission/survey", post(handlers::handle_mission_survey))
        .route("/daemon/shutdown", post(handlers::handle_shutdown))
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(cors)
}

pub async fn serve(state: ApiState, port: u16) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!(port, "API listening on 127.0.0.1");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
