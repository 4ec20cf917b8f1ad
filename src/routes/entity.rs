//! Entity CRUD routes. The first path segment names the entity; handlers look
//! up its service in `AppState`.

use crate::handlers::entity::{
    bulk_create, create, delete as delete_handler, delete_many, increment, list, query, read, replace,
    soft_delete, update, update_many,
};
use crate::state::AppState;
use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::limit::RequestBodyLimitLayer;

/// Default cap on request bodies.
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

pub fn entity_routes(state: AppState) -> Router {
    entity_routes_with_limit(state, DEFAULT_BODY_LIMIT)
}

pub fn entity_routes_with_limit(state: AppState, body_limit: usize) -> Router {
    Router::new()
        .route(
            "/:entity",
            get(list).post(create).put(replace).patch(update_many),
        )
        .route("/:entity/query", post(query))
        .route("/:entity/bulk", post(bulk_create))
        .route("/:entity/delete", post(delete_many))
        .route("/:entity/increment", post(increment))
        .route(
            "/:entity/:id",
            get(read).patch(update).delete(delete_handler),
        )
        .route("/:entity/:id/soft", delete(soft_delete))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .with_state(state)
}
