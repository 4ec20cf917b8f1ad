//! CRUD query SDK: a declarative filter/populate query compiler for PostgreSQL
//! with a generic per-entity CRUD service and an axum adapter.

pub mod case;
pub mod config;
pub mod error;
pub mod executor;
pub mod handlers;
pub mod query;
pub mod response;
pub mod routes;
pub mod service;
pub mod sql;
pub mod state;

#[cfg(test)]
mod test_support;

pub use config::{load_from_path, resolve, ModelConfig, ResolvedEntity, ResolvedModel, Settings};
pub use error::{AppError, BackendError, BackendErrorKind, ConfigError};
pub use executor::{BackendExecutor, PgExecutor, Row};
pub use query::{FilterRequest, FilterSpec, PopulateRequest, QueryOptions, SearchCriteria, SortOrder};
pub use response::{paginate, IncrementResult, PaginatedResult};
pub use routes::{common_routes, entity_routes, entity_routes_with_limit};
pub use service::{EntityService, Operation, ServiceHooks};
pub use state::AppState;
