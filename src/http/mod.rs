//! The axum-based HTTP surface: request parsing and error mapping live here, all
//! business logic lives in [`crate::coordinator::Coordinator`].

pub mod entity;
pub mod error;
pub mod query;
pub mod status;

use crate::coordinator::Storage;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared, per-process application state handed to every handler via axum's `State`
/// extractor. Depends on the [`Storage`] trait rather than the concrete
/// [`crate::coordinator::Coordinator`], so handlers know nothing about quorum fan-out.
pub struct AppState {
    pub coordinator: Arc<dyn Storage>,
}

/// Build the router. `access_log` mirrors the CLI's `--access-log` flag: when set, every
/// request/response is additionally logged by `tower_http`'s `TraceLayer`, on top of the
/// `tracing` calls handlers and the coordinator already make.
pub fn router(state: Arc<AppState>, access_log: bool) -> Router {
    let router = Router::new()
        .route("/v0/status", get(status::status))
        .route(
            "/v0/entity",
            get(entity::get_entity)
                .put(entity::put_entity)
                .delete(entity::delete_entity),
        )
        .fallback(error::not_found_fallback)
        .with_state(state);

    if access_log {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}
