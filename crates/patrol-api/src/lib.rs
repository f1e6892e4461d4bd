pub mod handlers;

use std::future::Future;

use axum::routing::{delete, get, patch, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

pub use handlers::{ApiError, ApiState};

/// Full application router, every route nested under `/api`.
pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/status", get(handlers::handle_status))
        .route("/users", post(handlers::handle_create_user))
        .route("/orders", post(handlers::handle_create_order))
        .route(
            "/orders/{order_id}/status",
            patch(handlers::handle_set_order_status),
        )
        .route(
            "/orders/{order_id}/assignments",
            post(handlers::handle_assign_agent).get(handlers::handle_list_assignments),
        )
        .route(
            "/orders/{order_id}/messages",
            get(handlers::handle_order_messages),
        )
        .route(
            "/assignments/{assignment_id}",
            delete(handlers::handle_remove_assignment),
        )
        .route("/messages", post(handlers::handle_send_message))
        .route("/messages/multi", post(handlers::handle_send_multi))
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(cors)
}

/// Bind `bind:port` and serve until `shutdown` resolves.
pub async fn serve(
    state: ApiState,
    bind: &str,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind((bind, port)).await?;
    serve_on(listener, state, shutdown).await
}

/// Serve on an already-bound listener. Tests bind port 0 and pass it here.
pub async fn serve_on(
    listener: TcpListener,
    state: ApiState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "API listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
