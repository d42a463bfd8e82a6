//! Router construction for the mlhub server.

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Extension, Router,
};
use mlhub_core::{EvaluateInternalService, EvaluateService};
use tower_http::trace::TraceLayer;

use crate::handlers;

const TRAINING: &str = "/evaluate/project/:owner/:pid/training/:tid";

/// Build the full axum router with all routes and middleware.
pub fn build_router(
    service: Arc<EvaluateService>,
    internal: Arc<EvaluateInternalService>,
) -> Router {
    let api = Router::new()
        .route("/health", get(handlers::health::health))
        .route(
            &format!("{TRAINING}/custom"),
            post(handlers::evaluate::create_custom),
        )
        .route(
            &format!("{TRAINING}/standard"),
            post(handlers::evaluate::create_standard),
        )
        .route(
            &format!("{TRAINING}/evaluate/:id"),
            get(handlers::evaluate::get),
        )
        .route(
            &format!("{TRAINING}/evaluate/:id/detail"),
            put(handlers::evaluate::update_detail),
        );

    Router::new()
        .nest("/api/v1", api)
        .layer(Extension(service))
        .layer(Extension(internal))
        .layer(TraceLayer::new_for_http())
}
