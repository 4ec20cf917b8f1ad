//! EntityService: generic CRUD over the query compiler, with optional hooks.

mod crud;
mod hooks;
pub use crud::EntityService;
pub use hooks::{HookChain, Operation, ServiceHooks};
