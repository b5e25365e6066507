// HTTP routes

mod http;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::query::QueryPipeline;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) pipeline: Arc<QueryPipeline>,
}

pub fn app(pipeline: Arc<QueryPipeline>) -> Router {
    let state = AppState { pipeline };
    Router::new()
        .route("/", get(|| async { "instance-metrics query API" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route("/query", post(http::query_handler)) // POST /query
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
