//! Backend executor: runs compiled statements and returns rows as JSON objects.

use crate::error::BackendError;
use crate::sql::{Dialect, PgBindValue, QueryBuf};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::postgres::PgRow;
use sqlx::PgPool;

pub type Row = Map<String, Value>;

#[async_trait]
pub trait BackendExecutor: Send + Sync {
    fn dialect(&self) -> Dialect;

    async fn fetch_all(&self, q: &QueryBuf) -> Result<Vec<Row>, BackendError>;

    /// Affected row count.
    async fn execute(&self, q: &QueryBuf) -> Result<u64, BackendError>;

    /// Reads the `total` column of the first row.
    async fn count(&self, q: &QueryBuf) -> Result<u64, BackendError> {
        let rows = self.fetch_all(q).await?;
        Ok(rows
            .first()
            .and_then(|r| r.get("total"))
            .and_then(Value::as_u64)
            .unwrap_or(0))
    }

    async fn exists(&self, q: &QueryBuf) -> Result<bool, BackendError> {
        Ok(self.count(q).await? > 0)
    }
}

/// PostgreSQL executor over a sqlx pool.
#[derive(Clone)]
pub struct PgExecutor {
    pool: PgPool,
}

impl PgExecutor {
    pub fn new(pool: PgPool) -> Self {
        PgExecutor { pool }
    }

    fn query<'q>(q: &'q QueryBuf) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
        tracing::debug!(sql = %q.sql, params = ?q.param_names(), "query");
        let mut query = sqlx::query(&q.sql);
        for v in q.values() {
            query = query.bind(PgBindValue::from_json(v));
        }
        query
    }
}

#[async_trait]
impl BackendExecutor for PgExecutor {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn fetch_all(&self, q: &QueryBuf) -> Result<Vec<Row>, BackendError> {
        let rows = Self::query(q).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn execute(&self, q: &QueryBuf) -> Result<u64, BackendError> {
        let done = Self::query(q).execute(&self.pool).await?;
        Ok(done.rows_affected())
    }
}

fn row_to_json(row: &PgRow) -> Row {
    use sqlx::Column;
    use sqlx::Row;
    let mut map = Map::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    map
}

fn cell_to_value(row: &PgRow, name: &str) -> Value {
    use sqlx::Row;
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n as f64) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(name) {
        return j;
    }
    Value::Null
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    struct Scripted {
        rows: Mutex<Vec<Vec<Row>>>,
    }

    #[async_trait]
    impl BackendExecutor for Scripted {
        fn dialect(&self) -> Dialect {
            Dialect::Generic
        }

        async fn fetch_all(&self, _q: &QueryBuf) -> Result<Vec<Row>, BackendError> {
            Ok(self.rows.lock().unwrap().pop().unwrap_or_default())
        }

        async fn execute(&self, _q: &QueryBuf) -> Result<u64, BackendError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_default_count_and_exists_read_total() {
        let total = json!({"total": 3}).as_object().unwrap().clone();
        let exec = Scripted {
            rows: Mutex::new(vec![vec![], vec![total]]),
        };
        let q = QueryBuf::new(Dialect::Generic);
        assert_eq!(exec.count(&q).await.unwrap(), 3);
        assert!(!exec.exists(&q).await.unwrap());
    }
}
