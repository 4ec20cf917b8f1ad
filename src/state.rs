//! Shared application state for the entity routes.

use crate::config::ResolvedModel;
use crate::error::{AppError, ConfigError};
use crate::executor::BackendExecutor;
use crate::service::{EntityService, ServiceHooks};
use std::collections::HashMap;
use std::sync::Arc;

/// One `EntityService` per entity, keyed by entity name. Built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub model: Arc<ResolvedModel>,
    services: Arc<HashMap<String, EntityService>>,
}

impl AppState {
    pub fn new(model: Arc<ResolvedModel>, executor: Arc<dyn BackendExecutor>) -> Result<Self, ConfigError> {
        Self::with_hooks(model, executor, |_| Vec::new())
    }

    /// `hooks_for` names the hooks registered on each entity's service.
    pub fn with_hooks(
        model: Arc<ResolvedModel>,
        executor: Arc<dyn BackendExecutor>,
        hooks_for: impl Fn(&str) -> Vec<Arc<dyn ServiceHooks>>,
    ) -> Result<Self, ConfigError> {
        let mut services = HashMap::with_capacity(model.entities.len());
        for entity in &model.entities {
            let mut service = EntityService::new(model.clone(), &entity.name, executor.clone())?;
            for hook in hooks_for(&entity.name) {
                service = service.with_hook(hook);
            }
            services.insert(entity.name.clone(), service);
        }
        tracing::info!(entities = services.len(), "entity services ready");
        Ok(AppState {
            model,
            services: Arc::new(services),
        })
    }

    pub fn service(&self, entity: &str) -> Result<&EntityService, AppError> {
        self.services
            .get(entity)
            .ok_or_else(|| AppError::NotFound(format!("unknown entity '{}'", entity)))
    }
}
