//! Route builders.

mod common;
mod entity;
pub use common::common_routes;
pub use entity::{entity_routes, entity_routes_with_limit, DEFAULT_BODY_LIMIT};
