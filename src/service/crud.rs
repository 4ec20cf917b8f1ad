//! Generic CRUD service for one entity of the model.

use crate::config::{ResolvedEntity, ResolvedModel};
use crate::error::{AppError, BackendError, ConfigError};
use crate::executor::{BackendExecutor, Row};
use crate::query::{FilterRequest, FilterSpec, QueryOptions};
use crate::response::{paginate, IncrementResult, PaginatedResult};
use crate::service::hooks::{HookChain, Operation, ServiceHooks};
use crate::sql::hydrate::entity_row;
use crate::sql::{condition, mutation};
use crate::sql::{QueryBuf, SelectPlan, Window};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::future::Future;
use std::sync::Arc;

/// CRUD operations for one entity. Built once at startup; holds only
/// read-only model data, so it is shared freely between requests.
#[derive(Clone)]
pub struct EntityService {
    model: Arc<ResolvedModel>,
    index: usize,
    executor: Arc<dyn BackendExecutor>,
    hooks: HookChain,
    options: QueryOptions,
}

impl EntityService {
    pub fn new(model: Arc<ResolvedModel>, entity: &str, executor: Arc<dyn BackendExecutor>) -> Result<Self, ConfigError> {
        let index = model
            .entities
            .iter()
            .position(|e| e.name == entity)
            .ok_or_else(|| ConfigError::MissingReference {
                kind: "entity",
                id: entity.to_string(),
            })?;
        Ok(EntityService {
            model,
            index,
            executor,
            hooks: HookChain::default(),
            options: QueryOptions::default(),
        })
    }

    pub fn with_hook(mut self, hook: Arc<dyn ServiceHooks>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Server-side defaults used by the HTTP handlers.
    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    pub fn entity(&self) -> &ResolvedEntity {
        &self.model.entities[self.index]
    }

    // ---- reads ----

    pub async fn find_one(&self, request: &FilterRequest, options: &QueryOptions) -> Result<Option<Value>, AppError> {
        let input = request_input(request);
        self.run(Operation::FindOne, input, async {
            let rows = self.select(request, options, Some(Window { take: 1, skip: 0 })).await?;
            Ok(rows.into_iter().next())
        })
        .await
    }

    pub async fn find_one_or_fail(&self, request: &FilterRequest, options: &QueryOptions) -> Result<Value, AppError> {
        self.find_one(request, options)
            .await?
            .ok_or_else(|| AppError::not_found(&self.entity().name))
    }

    /// Rows matching the request. A page window applies only when the request
    /// names one or the options ask for pagination.
    pub async fn find(&self, request: &FilterRequest, options: &QueryOptions) -> Result<Vec<Value>, AppError> {
        let input = request_input(request);
        self.run(Operation::Find, input, async {
            let window = if options.paginated || request.has_window() {
                Some(self.window(request, options)?)
            } else {
                None
            };
            self.select(request, options, window).await
        })
        .await
    }

    /// One page of rows plus the total match count.
    pub async fn list(&self, request: &FilterRequest, options: &QueryOptions) -> Result<PaginatedResult<Value>, AppError> {
        let input = request_input(request);
        self.run(Operation::List, input, async {
            let page = request.pagination()?.page;
            let window = self.window(request, options)?;
            let plan = SelectPlan::build(&self.model, self.entity(), request, options, Some(window))?;
            let data_q = plan.to_sql(self.executor.dialect());
            let count_q = plan.count_sql(self.executor.dialect());
            let (rows, total) = tokio::try_join!(self.fetch(&data_q), self.count_rows(&count_q))?;
            Ok(paginate(plan.hydrate(&rows), total, window.take, page))
        })
        .await
    }

    pub async fn count(&self, request: &FilterRequest, options: &QueryOptions) -> Result<u64, AppError> {
        let input = request_input(request);
        self.run(Operation::Count, input, async {
            let plan = SelectPlan::build(&self.model, self.entity(), request, options, None)?;
            self.count_rows(&plan.count_sql(self.executor.dialect())).await
        })
        .await
    }

    pub async fn exists(&self, request: &FilterRequest, options: &QueryOptions) -> Result<bool, AppError> {
        let input = request_input(request);
        self.run(Operation::Exists, input, async {
            let plan = SelectPlan::build(&self.model, self.entity(), request, options, None)?;
            self.executor
                .exists(&plan.count_sql(self.executor.dialect()))
                .await
                .map_err(|e| self.backend_error(e))
        })
        .await
    }

    // ---- writes ----

    pub async fn create(&self, body: Value) -> Result<Value, AppError> {
        let input = body.clone();
        self.run(Operation::Create, input, async {
            let row = as_object(&body)?;
            let q = mutation::insert_many(self.entity(), std::slice::from_ref(row), self.executor.dialect());
            self.returning_one(&q).await?.ok_or_else(|| AppError::Internal("insert returned no row".into()))
        })
        .await
    }

    /// All rows in one INSERT statement.
    pub async fn bulk_create(&self, bodies: Vec<Value>) -> Result<Vec<Value>, AppError> {
        let input = Value::Array(bodies.clone());
        self.run(Operation::BulkCreate, input, async {
            if bodies.is_empty() {
                return Ok(Vec::new());
            }
            let rows: Vec<Map<String, Value>> = bodies
                .iter()
                .map(|b| as_object(b).cloned())
                .collect::<Result<_, _>>()?;
            let q = mutation::insert_many(self.entity(), &rows, self.executor.dialect());
            self.returning(&q).await
        })
        .await
    }

    /// Shallow-merge `data` into the row with this key.
    pub async fn update(&self, key: &Value, data: Value) -> Result<Value, AppError> {
        let input = json!({ "key": key, "data": data });
        self.run(Operation::Update, input, async {
            let changes = as_object(&data)?;
            match mutation::update_by_key(self.entity(), key, changes, self.executor.dialect())? {
                Some(q) => self
                    .returning_one(&q)
                    .await?
                    .ok_or_else(|| AppError::not_found(&self.entity().name)),
                None => self.find_by_key(key).await,
            }
        })
        .await
    }

    /// Update keyed by the primary key carried in the body itself.
    pub async fn replace(&self, body: Value) -> Result<Value, AppError> {
        let input = body.clone();
        self.run(Operation::Replace, input, async {
            let changes = as_object(&body)?;
            match mutation::update_by_key(self.entity(), &body, changes, self.executor.dialect())? {
                Some(q) => self
                    .returning_one(&q)
                    .await?
                    .ok_or_else(|| AppError::not_found(&self.entity().name)),
                None => self.find_by_key(&body).await,
            }
        })
        .await
    }

    /// Update the first row matching `criteria`; `None` when nothing matches.
    pub async fn update_one(&self, criteria: FilterSpec, data: Value) -> Result<Option<Value>, AppError> {
        let input = json!({ "where": criteria, "data": data });
        self.run(Operation::UpdateOne, input, async {
            let changes = as_object(&data)?;
            let request = FilterRequest::with_where(criteria.clone());
            let plan = self.criteria_plan(&request)?;
            match mutation::update_where_ids(&plan, changes, Some(1), self.executor.dialect()) {
                Some(q) => self.returning_one(&q).await,
                None => self.rows(&plan, Some(Window { take: 1, skip: 0 })).await.map(|r| r.into_iter().next()),
            }
        })
        .await
    }

    pub async fn update_many(&self, criteria: FilterSpec, data: Value) -> Result<Vec<Value>, AppError> {
        let input = json!({ "where": criteria, "data": data });
        self.run(Operation::UpdateMany, input, async {
            let changes = as_object(&data)?;
            let request = FilterRequest::with_where(criteria.clone());
            let plan = self.criteria_plan(&request)?;
            match mutation::update_where_ids(&plan, changes, None, self.executor.dialect()) {
                Some(q) => self.returning(&q).await,
                None => Err(AppError::BadRequest("no updatable fields in body".into())),
            }
        })
        .await
    }

    /// Remove the row with this key and return it.
    pub async fn delete(&self, key: &Value) -> Result<Value, AppError> {
        self.run(Operation::Delete, key.clone(), async {
            let q = mutation::delete_by_key(self.entity(), key, self.executor.dialect())?;
            self.returning_one(&q)
                .await?
                .ok_or_else(|| AppError::not_found(&self.entity().name))
        })
        .await
    }

    pub async fn delete_one(&self, criteria: FilterSpec) -> Result<Option<Value>, AppError> {
        let input = json!({ "where": criteria });
        self.run(Operation::DeleteOne, input, async {
            let request = FilterRequest::with_where(criteria.clone());
            let plan = self.criteria_plan(&request)?;
            self.returning_one(&mutation::delete_where_ids(&plan, Some(1), self.executor.dialect()))
                .await
        })
        .await
    }

    pub async fn delete_many(&self, criteria: FilterSpec) -> Result<Vec<Value>, AppError> {
        let input = json!({ "where": criteria });
        self.run(Operation::DeleteMany, input, async {
            let request = FilterRequest::with_where(criteria.clone());
            let plan = self.criteria_plan(&request)?;
            self.returning(&mutation::delete_where_ids(&plan, None, self.executor.dialect()))
                .await
        })
        .await
    }

    /// Set the delete-date column on the row with this key.
    pub async fn soft_delete(&self, key: &Value) -> Result<Value, AppError> {
        self.run(Operation::SoftDelete, key.clone(), async {
            let q = mutation::soft_delete_by_key(self.entity(), key, self.executor.dialect())?;
            self.returning_one(&q)
                .await?
                .ok_or_else(|| AppError::not_found(&self.entity().name))
        })
        .await
    }

    /// `column = column + delta` on every row matching `criteria`.
    pub async fn increment(&self, criteria: FilterSpec, values: Map<String, Value>) -> Result<IncrementResult, AppError> {
        let input = json!({ "where": criteria, "values": values });
        self.run(Operation::Increment, input, async {
            let request = FilterRequest::with_where(criteria.clone());
            let plan = self.criteria_plan(&request)?;
            let q = mutation::increment_where(&plan, &values, self.executor.dialect())?;
            let affected = self.executor.execute(&q).await.map_err(|e| self.backend_error(e))?;
            Ok(IncrementResult { success: true, affected })
        })
        .await
    }

    // ---- plumbing ----

    /// Runs `work` between the before and after hooks.
    async fn run<T, F>(&self, op: Operation, input: Value, work: F) -> Result<T, AppError>
    where
        T: Serialize + DeserializeOwned,
        F: Future<Output = Result<T, AppError>>,
    {
        self.hooks.before(op, &input).await?;
        let out = work.await?;
        if self.hooks.is_empty() {
            return Ok(out);
        }
        let value = serde_json::to_value(out).map_err(|e| AppError::Internal(e.to_string()))?;
        let value = self.hooks.after(op, &input, value).await?;
        serde_json::from_value(value)
            .map_err(|e| AppError::Internal(format!("{} hook output: {}", op.as_str(), e)))
    }

    fn window(&self, request: &FilterRequest, options: &QueryOptions) -> Result<Window, AppError> {
        let max = options.max_limit.unwrap_or(self.entity().max_page_size);
        let (take, skip) = request.pagination()?.window(max);
        Ok(Window { take, skip })
    }

    /// Criteria mutations join every declared relation their filter descends into.
    fn criteria_plan<'a>(&'a self, request: &FilterRequest) -> Result<SelectPlan<'a>, AppError> {
        let mut request = request.clone();
        let referenced = condition::referenced_populates(&request.where_, &self.entity().populations);
        for item in referenced {
            if !request.populates.iter().any(|p| p.name() == item.name()) {
                request.populates.push(item);
            }
        }
        SelectPlan::build(&self.model, self.entity(), &request, &self.options, None)
    }

    async fn select(
        &self,
        request: &FilterRequest,
        options: &QueryOptions,
        window: Option<Window>,
    ) -> Result<Vec<Value>, AppError> {
        let plan = SelectPlan::build(&self.model, self.entity(), request, options, window)?;
        self.rows(&plan, window).await
    }

    async fn rows(&self, plan: &SelectPlan<'_>, window: Option<Window>) -> Result<Vec<Value>, AppError> {
        let q = plan.to_sql(self.executor.dialect());
        let rows = self.fetch(&q).await?;
        let mut out = plan.hydrate(&rows);
        if let Some(w) = window {
            out.truncate(w.take as usize);
        }
        Ok(out)
    }

    async fn find_by_key(&self, key: &Value) -> Result<Value, AppError> {
        let mut criteria = Map::new();
        for (column, value) in mutation::key_values(self.entity(), key)? {
            criteria.insert(column.property.clone(), value);
        }
        let request = FilterRequest::with_where(criteria);
        let plan = self.criteria_plan(&request)?;
        self.rows(&plan, Some(Window { take: 1, skip: 0 }))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::not_found(&self.entity().name))
    }

    async fn fetch(&self, q: &QueryBuf) -> Result<Vec<Row>, AppError> {
        self.executor.fetch_all(q).await.map_err(|e| self.backend_error(e))
    }

    async fn count_rows(&self, q: &QueryBuf) -> Result<u64, AppError> {
        self.executor.count(q).await.map_err(|e| self.backend_error(e))
    }

    async fn returning(&self, q: &QueryBuf) -> Result<Vec<Value>, AppError> {
        let rows = self.fetch(q).await?;
        Ok(rows.iter().map(|r| entity_row(self.entity(), r)).collect())
    }

    async fn returning_one(&self, q: &QueryBuf) -> Result<Option<Value>, AppError> {
        Ok(self.returning(q).await?.into_iter().next())
    }

    fn backend_error(&self, e: BackendError) -> AppError {
        let entity = self.entity();
        tracing::error!(entity = %entity.name, table = %entity.table, error = %e, "backend error");
        self.model.constraints.translate(e)
    }
}

fn request_input(request: &FilterRequest) -> Value {
    serde_json::to_value(request).unwrap_or(Value::Null)
}

fn as_object(body: &Value) -> Result<&Map<String, Value>, AppError> {
    body.as_object()
        .ok_or_else(|| AppError::BadRequest("request body must be a JSON object".into()))
}
