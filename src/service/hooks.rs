//! Service hooks: code run around each service operation.

use crate::error::AppError;
use async_trait::async_trait;
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    FindOne,
    Find,
    List,
    Count,
    Exists,
    Create,
    BulkCreate,
    Update,
    Replace,
    UpdateOne,
    UpdateMany,
    Delete,
    DeleteOne,
    DeleteMany,
    SoftDelete,
    Increment,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::FindOne => "findOne",
            Operation::Find => "find",
            Operation::List => "list",
            Operation::Count => "count",
            Operation::Exists => "exists",
            Operation::Create => "create",
            Operation::BulkCreate => "bulkCreate",
            Operation::Update => "update",
            Operation::Replace => "replace",
            Operation::UpdateOne => "updateOne",
            Operation::UpdateMany => "updateMany",
            Operation::Delete => "delete",
            Operation::DeleteOne => "deleteOne",
            Operation::DeleteMany => "deleteMany",
            Operation::SoftDelete => "softDelete",
            Operation::Increment => "increment",
        }
    }
}

/// Hooks registered on an `EntityService`.
#[async_trait]
pub trait ServiceHooks: Send + Sync {
    /// Called before the operation with its input.
    /// Return `Err` to abort the operation.
    async fn before(&self, _op: Operation, _input: &Value) -> Result<(), AppError> {
        Ok(())
    }

    /// Called after a successful operation. Receives the previous hook's output
    /// and returns what the next hook (or the caller) sees.
    async fn after(&self, _op: Operation, _input: &Value, output: Value) -> Result<Value, AppError> {
        Ok(output)
    }
}

/// Ordered hook list.
#[derive(Clone, Default)]
pub struct HookChain {
    hooks: Vec<std::sync::Arc<dyn ServiceHooks>>,
}

impl HookChain {
    pub fn push(&mut self, hook: std::sync::Arc<dyn ServiceHooks>) {
        self.hooks.push(hook);
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Runs every `before` in registration order; the first error stops the chain.
    pub async fn before(&self, op: Operation, input: &Value) -> Result<(), AppError> {
        for hook in &self.hooks {
            hook.before(op, input).await?;
        }
        if !self.hooks.is_empty() {
            tracing::debug!(op = op.as_str(), hooks = self.hooks.len(), "before hooks ran");
        }
        Ok(())
    }

    /// Waterfall: each `after` receives the previous one's output.
    pub async fn after(&self, op: Operation, input: &Value, output: Value) -> Result<Value, AppError> {
        let mut out = output;
        for hook in &self.hooks {
            out = hook.after(op, input, out).await?;
        }
        Ok(out)
    }
}
