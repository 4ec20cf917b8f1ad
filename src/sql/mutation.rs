//! INSERT / UPDATE / DELETE statements. Criteria-based variants restrict the
//! target rows through the primary-key subselect of a `SelectPlan`.

use crate::config::{ColumnInfo, ResolvedEntity};
use crate::error::{AppError, ConfigError};
use crate::sql::select::SelectPlan;
use crate::sql::{qualified, qualified_table, quoted, Dialect, QueryBuf};
use serde_json::{Map, Value};

fn table(entity: &ResolvedEntity) -> String {
    qualified_table(entity.schema.as_deref(), &entity.table)
}

fn hint(entity: &ResolvedEntity, column: &str, suffix: &str) -> String {
    format!("{}.{}_{}", entity.table, column, suffix)
}

/// Primary key column/value pairs. A single key accepts the bare value or an
/// object holding it; composite keys need an object with every key property.
pub fn key_values<'e>(entity: &'e ResolvedEntity, key: &Value) -> Result<Vec<(&'e ColumnInfo, Value)>, AppError> {
    let primary: Vec<&ColumnInfo> = entity.primary_columns().collect();
    match key {
        Value::Object(map) => primary
            .into_iter()
            .map(|c| {
                map.get(&c.property)
                    .or_else(|| map.get(&c.name))
                    .filter(|v| !v.is_null())
                    .map(|v| (c, v.clone()))
                    .ok_or_else(|| AppError::BadRequest(format!("missing primary key {}", c.property)))
            })
            .collect(),
        Value::Null | Value::Array(_) => Err(AppError::BadRequest("invalid primary key".into())),
        scalar if primary.len() == 1 => Ok(vec![(primary[0], scalar.clone())]),
        _ => Err(AppError::BadRequest(format!(
            "{} has a composite primary key; pass an object",
            entity.name
        ))),
    }
}

/// `WHERE` for one row by key; soft-deleted rows never match.
fn push_key_where(entity: &ResolvedEntity, key: &[(&ColumnInfo, Value)], q: &mut QueryBuf) {
    let mut parts: Vec<String> = key
        .iter()
        .map(|(c, v)| {
            let ph = q.bind_cast(&hint(entity, &c.name, "key"), v.clone(), c.pg_type.as_deref());
            format!("{} = {}", qualified(&entity.table, &c.name), ph)
        })
        .collect();
    if let Some(deleted) = &entity.delete_date_column {
        parts.push(format!("{} IS NULL", qualified(&entity.table, deleted)));
    }
    q.push_sql(&format!(" WHERE {}", parts.join(" AND ")));
}

/// `RETURNING *`, unless some column must be read back as text; then every
/// column is listed with its cast.
fn push_returning(entity: &ResolvedEntity, q: &mut QueryBuf) {
    let dialect = q.dialect();
    if dialect != Dialect::Postgres || !entity.columns.iter().any(ColumnInfo::reads_as_text) {
        q.push_sql(" RETURNING *");
        return;
    }
    let list: Vec<String> = entity
        .columns
        .iter()
        .map(|c| format!("{} AS {}", c.read_expr(dialect), quoted(&c.name)))
        .collect();
    q.push_sql(&format!(" RETURNING {}", list.join(", ")));
}

/// `SET` assignments for known, non-key columns of the body; unknown keys are ignored.
fn push_set(entity: &ResolvedEntity, data: &Map<String, Value>, q: &mut QueryBuf) -> bool {
    let mut parts = Vec::new();
    for c in entity.columns.iter().filter(|c| !c.primary) {
        let Some(v) = data.get(&c.property).or_else(|| data.get(&c.name)) else {
            continue;
        };
        let ph = q.bind_cast(&hint(entity, &c.name, "set"), v.clone(), c.pg_type.as_deref());
        parts.push(format!("{} = {}", quoted(&c.name), ph));
    }
    if parts.is_empty() {
        return false;
    }
    q.push_sql(&format!(" SET {}", parts.join(", ")));
    true
}

/// One multi-row INSERT. Columns are the union of known keys across rows;
/// rows missing a column get `DEFAULT`.
pub fn insert_many(entity: &ResolvedEntity, rows: &[Map<String, Value>], dialect: Dialect) -> QueryBuf {
    let mut columns: Vec<&ColumnInfo> = entity
        .columns
        .iter()
        .filter(|c| rows.iter().any(|r| r.contains_key(&c.property) || r.contains_key(&c.name)))
        .collect();
    if columns.is_empty() {
        columns = entity
            .columns
            .iter()
            .find(|c| c.has_default)
            .or_else(|| entity.primary_columns().next())
            .into_iter()
            .collect();
    }
    let mut q = QueryBuf::new(dialect);
    let names: Vec<String> = columns.iter().map(|c| quoted(&c.name)).collect();
    q.push_sql(&format!("INSERT INTO {} ({}) VALUES ", table(entity), names.join(", ")));
    let mut tuples = Vec::with_capacity(rows.len());
    for row in rows {
        let values: Vec<String> = columns
            .iter()
            .map(|c| match row.get(&c.property).or_else(|| row.get(&c.name)) {
                Some(v) => q.bind_cast(&hint(entity, &c.name, "val"), v.clone(), c.pg_type.as_deref()),
                None => "DEFAULT".to_string(),
            })
            .collect();
        tuples.push(format!("({})", values.join(", ")));
    }
    q.push_sql(&tuples.join(", "));
    push_returning(entity, &mut q);
    q
}

/// `None` when the body names no updatable column.
pub fn update_by_key(
    entity: &ResolvedEntity,
    key: &Value,
    data: &Map<String, Value>,
    dialect: Dialect,
) -> Result<Option<QueryBuf>, AppError> {
    let key = key_values(entity, key)?;
    let mut q = QueryBuf::new(dialect);
    q.push_sql(&format!("UPDATE {}", table(entity)));
    if !push_set(entity, data, &mut q) {
        return Ok(None);
    }
    push_key_where(entity, &key, &mut q);
    push_returning(entity, &mut q);
    Ok(Some(q))
}

/// Update the rows selected by the plan (at most `limit` of them).
pub fn update_where_ids(
    plan: &SelectPlan<'_>,
    data: &Map<String, Value>,
    limit: Option<u32>,
    dialect: Dialect,
) -> Option<QueryBuf> {
    let entity = plan.entity();
    let mut q = QueryBuf::new(dialect);
    q.push_sql(&format!("UPDATE {}", table(entity)));
    if !push_set(entity, data, &mut q) {
        return None;
    }
    push_ids_where(plan, limit, &mut q);
    push_returning(entity, &mut q);
    Some(q)
}

pub fn delete_by_key(entity: &ResolvedEntity, key: &Value, dialect: Dialect) -> Result<QueryBuf, AppError> {
    let key = key_values(entity, key)?;
    let mut q = QueryBuf::new(dialect);
    q.push_sql(&format!("DELETE FROM {}", table(entity)));
    push_key_where(entity, &key, &mut q);
    push_returning(entity, &mut q);
    Ok(q)
}

pub fn delete_where_ids(plan: &SelectPlan<'_>, limit: Option<u32>, dialect: Dialect) -> QueryBuf {
    let mut q = QueryBuf::new(dialect);
    q.push_sql(&format!("DELETE FROM {}", table(plan.entity())));
    push_ids_where(plan, limit, &mut q);
    push_returning(plan.entity(), &mut q);
    q
}

/// Marks the row deleted. Entities without a delete-date column cannot be soft-deleted.
pub fn soft_delete_by_key(entity: &ResolvedEntity, key: &Value, dialect: Dialect) -> Result<QueryBuf, AppError> {
    let deleted = entity
        .delete_date_column
        .as_ref()
        .ok_or_else(|| ConfigError::SoftDeleteUnsupported {
            entity: entity.name.clone(),
        })?;
    let key = key_values(entity, key)?;
    let mut q = QueryBuf::new(dialect);
    q.push_sql(&format!(
        "UPDATE {} SET {} = CURRENT_TIMESTAMP",
        table(entity),
        quoted(deleted)
    ));
    push_key_where(entity, &key, &mut q);
    push_returning(entity, &mut q);
    Ok(q)
}

/// `SET col = col + delta` for each entry; deltas must be numbers and keys own columns.
pub fn increment_where(plan: &SelectPlan<'_>, values: &Map<String, Value>, dialect: Dialect) -> Result<QueryBuf, AppError> {
    let entity = plan.entity();
    if values.is_empty() {
        return Err(AppError::BadRequest("increment needs at least one field".into()));
    }
    let mut q = QueryBuf::new(dialect);
    let mut parts = Vec::with_capacity(values.len());
    for (field, delta) in values {
        let column = entity
            .column(field)
            .filter(|c| !c.primary)
            .ok_or_else(|| AppError::BadRequest(format!("cannot increment {}: not a column of {}", field, entity.name)))?;
        if !delta.is_number() {
            return Err(AppError::invalid_operand(field, "increment", "delta must be a number"));
        }
        let ph = q.bind_cast(&hint(entity, &column.name, "inc"), delta.clone(), column.pg_type.as_deref());
        parts.push(format!("{} = {} + {}", quoted(&column.name), quoted(&column.name), ph));
    }
    q.push_sql(&format!("UPDATE {} SET {}", table(entity), parts.join(", ")));
    push_ids_where(plan, None, &mut q);
    Ok(q)
}

fn push_ids_where(plan: &SelectPlan<'_>, limit: Option<u32>, q: &mut QueryBuf) {
    q.push_sql(&format!(" WHERE {} IN (", plan.key_tuple()));
    plan.ids_subquery(q, limit);
    q.push_sql(")");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{FilterRequest, QueryOptions};
    use crate::test_support::model;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    fn no_joins() -> QueryOptions {
        QueryOptions {
            population: Some(vec![]),
            ..Default::default()
        }
    }

    #[test]
    fn test_bulk_insert_uses_default_for_missing_keys() {
        let m = model();
        let users = m.entity("users").unwrap();
        let q = insert_many(
            users,
            &[
                obj(json!({"firstName": "Ann", "age": 30, "unknown": 1})),
                obj(json!({"firstName": "Bo"})),
            ],
            Dialect::Postgres,
        );
        assert_eq!(
            q.sql,
            "INSERT INTO \"users\" (\"firstName\", \"age\") VALUES ($1, $2), ($3, DEFAULT) RETURNING *"
        );
        assert_eq!(
            q.param_names(),
            vec!["users_firstname_val", "users_age_val", "users_firstname_val_2"]
        );
    }

    #[test]
    fn test_insert_of_empty_body_uses_defaults() {
        let m = model();
        let tags = m.entity("tags").unwrap();
        let q = insert_many(tags, &[Map::new()], Dialect::Postgres);
        assert_eq!(q.sql, "INSERT INTO \"tags\" (\"id\") VALUES (DEFAULT) RETURNING *");
    }

    #[test]
    fn test_insert_of_empty_body_prefers_defaulted_column() {
        let m = model();
        let users = m.entity("users").unwrap();
        let q = insert_many(users, &[Map::new()], Dialect::Generic);
        assert_eq!(q.sql, "INSERT INTO \"users\" (\"id\") VALUES (DEFAULT) RETURNING *");
        let memberships = m.entity("memberships").unwrap();
        let q = insert_many(memberships, &[Map::new()], Dialect::Generic);
        assert_eq!(q.sql, "INSERT INTO \"memberships\" (\"userId\") VALUES (DEFAULT) RETURNING *");
    }

    #[test]
    fn test_returning_reads_numeric_and_enum_columns_as_text() {
        let m = model();
        let invoices = m.entity("invoices").unwrap();
        let q = update_by_key(invoices, &json!(4), &obj(json!({"total": "19.90"})), Dialect::Postgres)
            .unwrap()
            .unwrap();
        assert_eq!(
            q.sql,
            concat!(
                "UPDATE \"invoices\" SET \"total\" = $1::numeric(12,2) WHERE \"invoices\".\"id\" = $2::int8",
                " RETURNING \"id\" AS \"id\", \"total\"::text AS \"total\", \"status\"::text AS \"status\""
            )
        );
        let q = delete_by_key(invoices, &json!(4), Dialect::Generic).unwrap();
        assert!(q.sql.ends_with(" RETURNING *"));
    }

    #[test]
    fn test_update_by_key_skips_primary_and_soft_deleted() {
        let m = model();
        let users = m.entity("users").unwrap();
        let q = update_by_key(users, &json!(7), &obj(json!({"id": 9, "lastName": "Lee"})), Dialect::Postgres)
            .unwrap()
            .unwrap();
        assert_eq!(
            q.sql,
            "UPDATE \"users\" SET \"lastName\" = $1 WHERE \"users\".\"id\" = $2 AND \"users\".\"deletedAt\" IS NULL RETURNING *"
        );
        assert_eq!(q.values(), vec![&json!("Lee"), &json!(7)]);
        assert!(update_by_key(users, &json!(7), &obj(json!({"id": 9})), Dialect::Postgres)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_composite_key_requires_object() {
        let m = model();
        let memberships = m.entity("memberships").unwrap();
        assert!(delete_by_key(memberships, &json!(1), Dialect::Postgres).is_err());
        assert!(delete_by_key(memberships, &json!({"userId": 1}), Dialect::Postgres).is_err());
        let q = delete_by_key(memberships, &json!({"userId": 1, "groupId": 2}), Dialect::Postgres).unwrap();
        assert_eq!(
            q.sql,
            "DELETE FROM \"memberships\" WHERE \"memberships\".\"userId\" = $1 AND \"memberships\".\"groupId\" = $2 RETURNING *"
        );
    }

    #[test]
    fn test_soft_delete_needs_delete_date_column() {
        let m = model();
        let users = m.entity("users").unwrap();
        let q = soft_delete_by_key(users, &json!(3), Dialect::Postgres).unwrap();
        assert_eq!(
            q.sql,
            "UPDATE \"users\" SET \"deletedAt\" = CURRENT_TIMESTAMP WHERE \"users\".\"id\" = $1 AND \"users\".\"deletedAt\" IS NULL RETURNING *"
        );
        let tags = m.entity("tags").unwrap();
        let err = soft_delete_by_key(tags, &json!(3), Dialect::Postgres).unwrap_err();
        assert!(matches!(err, AppError::Config(ConfigError::SoftDeleteUnsupported { .. })));
    }

    #[test]
    fn test_increment_by_criteria() {
        let m = model();
        let users = m.entity("users").unwrap();
        let request = FilterRequest::with_where(obj(json!({"id": 42})));
        let plan = SelectPlan::build(&m, users, &request, &no_joins(), None).unwrap();
        let q = increment_where(&plan, &obj(json!({"loginCount": 1})), Dialect::Postgres).unwrap();
        assert_eq!(
            q.sql,
            concat!(
                "UPDATE \"users\" SET \"loginCount\" = \"loginCount\" + $1",
                " WHERE \"users\".\"id\" IN (SELECT \"users\".\"id\" FROM \"users\" \"users\"",
                " WHERE \"users\".\"id\" = $2 AND \"users\".\"deletedAt\" IS NULL)"
            )
        );
        assert_eq!(q.values(), vec![&json!(1), &json!(42)]);
    }

    #[test]
    fn test_increment_rejects_bad_input() {
        let m = model();
        let users = m.entity("users").unwrap();
        let plan = SelectPlan::build(&m, users, &FilterRequest::default(), &no_joins(), None).unwrap();
        assert!(increment_where(&plan, &Map::new(), Dialect::Postgres).is_err());
        assert!(increment_where(&plan, &obj(json!({"loginCount": "1"})), Dialect::Postgres).is_err());
        assert!(increment_where(&plan, &obj(json!({"posts": 1})), Dialect::Postgres).is_err());
        assert!(increment_where(&plan, &obj(json!({"id": 1})), Dialect::Postgres).is_err());
    }

    #[test]
    fn test_update_one_by_criteria_limits_subselect() {
        let m = model();
        let users = m.entity("users").unwrap();
        let request = FilterRequest::with_where(obj(json!({"email": {"$endsL": "@x.io"}})));
        let plan = SelectPlan::build(&m, users, &request, &no_joins(), None).unwrap();
        let q = update_where_ids(&plan, &obj(json!({"age": 1})), Some(1), Dialect::Postgres).unwrap();
        assert_eq!(
            q.sql,
            concat!(
                "UPDATE \"users\" SET \"age\" = $1 WHERE \"users\".\"id\" IN (",
                "SELECT \"users\".\"id\" FROM \"users\" \"users\"",
                " WHERE LOWER(\"users\".\"email\") ILIKE $2 AND \"users\".\"deletedAt\" IS NULL",
                " GROUP BY \"users\".\"id\" ORDER BY MAX(\"users\".\"id\") DESC LIMIT 1) RETURNING *"
            )
        );
    }

    #[test]
    fn test_delete_many_by_criteria() {
        let m = model();
        let tags = m.entity("tags").unwrap();
        let request = FilterRequest::with_where(obj(json!({"name": {"$in": ["a", "b"]}})));
        let plan = SelectPlan::build(&m, tags, &request, &QueryOptions::default(), None).unwrap();
        let q = delete_where_ids(&plan, None, Dialect::Generic);
        assert_eq!(
            q.sql,
            "DELETE FROM \"tags\" WHERE \"tags\".\"id\" IN (SELECT \"tags\".\"id\" FROM \"tags\" \"tags\" WHERE \"tags\".\"name\" IN (?, ?)) RETURNING *"
        );
    }
}
