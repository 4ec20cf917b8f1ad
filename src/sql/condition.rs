//! Condition compiler: filter spec -> typed predicate tree -> parameterized SQL.
//!
//! Parsing does all operator and arity validation, so a spec that fails never
//! produces SQL. Rendering binds parameters in text order.

use crate::config::{DeclaredJoin, ResolvedEntity, ResolvedModel};
use crate::error::AppError;
use crate::query::{FilterSpec, PopulateItem};
use crate::sql::operator::{column_comparison, Operand, Operator};
use crate::sql::populate::ResolvedJoin;
use crate::sql::{qualified, QueryBuf};
use serde_json::{Map, Value};

const OR_KEY: &str = "$or";

#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Compare {
        alias: String,
        column: String,
        cast: Option<String>,
        operator: Operator,
        operand: Operand,
    },
    /// Case-insensitive pattern match used by free-text search.
    Match {
        alias: String,
        column: String,
        pattern: String,
    },
}

impl Predicate {
    pub fn is_empty(&self) -> bool {
        match self {
            Predicate::And(items) => items.iter().all(Predicate::is_empty),
            // An empty branch matches every row, so the whole disjunction does.
            Predicate::Or(items) => items.iter().any(Predicate::is_empty) || items.is_empty(),
            _ => false,
        }
    }
}

/// Where field names resolve: one alias of the statement plus what can be reached from it.
#[derive(Clone, Copy)]
pub struct Scope<'a> {
    pub alias: &'a str,
    pub entity: &'a ResolvedEntity,
    pub joins: &'a [ResolvedJoin],
    pub declared: &'a [DeclaredJoin],
    pub model: &'a ResolvedModel,
}

impl<'a> Scope<'a> {
    pub fn root(entity: &'a ResolvedEntity, joins: &'a [ResolvedJoin], model: &'a ResolvedModel) -> Self {
        Scope {
            alias: entity.alias(),
            entity,
            joins,
            declared: &entity.populations,
            model,
        }
    }

    fn child(&self, property: &str) -> Result<Option<Scope<'a>>, AppError> {
        let Some(join) = self.joins.iter().find(|j| j.property == property) else {
            if self.declared.iter().any(|d| d.property == property) {
                return Err(AppError::BadRequest(format!(
                    "relation {} must be populated to filter on it",
                    property
                )));
            }
            return Ok(None);
        };
        let entity = self
            .model
            .entity(&join.target)
            .ok_or_else(|| AppError::BadRequest(format!("unknown relation target {}", join.target)))?;
        let declared = self
            .declared
            .iter()
            .find(|d| d.property == property)
            .map(|d| d.children.as_slice())
            .unwrap_or(&[]);
        Ok(Some(Scope {
            alias: &join.alias,
            entity,
            joins: &join.children,
            declared,
            model: self.model,
        }))
    }

    /// (column, cast) for a field path; unknown paths pass through.
    fn column(&self, path: &str) -> (String, Option<String>) {
        match self.entity.column(path) {
            Some(c) => (c.name.clone(), c.pg_type.clone()),
            None => (self.entity.column_name(path), None),
        }
    }
}

/// Parse a filter spec into a predicate tree.
pub fn parse(spec: &FilterSpec, scope: &Scope) -> Result<Predicate, AppError> {
    parse_entries(spec, scope, None)
}

fn parse_entries(spec: &Map<String, Value>, scope: &Scope, prefix: Option<&str>) -> Result<Predicate, AppError> {
    let mut parts = Vec::with_capacity(spec.len());
    for (key, value) in spec {
        if key == OR_KEY {
            parts.push(parse_or(value, scope, prefix)?);
            continue;
        }
        if Operator::is_token(key) {
            let operator = Operator::parse(key)?;
            return Err(AppError::BadRequest(format!(
                "operator {} must be applied to a field",
                operator.token()
            )));
        }
        let path = match prefix {
            Some(p) => format!("{}.{}", p, key),
            None => key.clone(),
        };
        match value {
            Value::Object(inner) if is_operator_expression(inner) => {
                for (token, operand) in inner {
                    parts.push(parse_operator(token, operand, &path, scope)?);
                }
            }
            Value::Object(inner) => {
                // Joins are only reachable from the scope's own fields, not from embedded paths.
                let child = match prefix {
                    None => scope.child(key)?,
                    Some(_) => None,
                };
                match child {
                    Some(child) => parts.push(parse_entries(inner, &child, None)?),
                    None => parts.push(parse_entries(inner, scope, Some(&path))?),
                }
            }
            Value::Array(_) => parts.push(parse_operator("$in", value, &path, scope)?),
            _ => parts.push(parse_operator("$eq", value, &path, scope)?),
        }
    }
    Ok(Predicate::And(parts))
}

/// Relations a filter spec descends into, as a populate tree. `$or` branches
/// are merged; embedded paths and operator expressions name no relation.
pub fn referenced_populates(spec: &FilterSpec, declared: &[DeclaredJoin]) -> Vec<PopulateItem> {
    let mut out = Vec::new();
    collect_referenced(spec, declared, &mut out);
    out
}

fn collect_referenced(spec: &FilterSpec, declared: &[DeclaredJoin], out: &mut Vec<PopulateItem>) {
    for (key, value) in spec {
        if key == OR_KEY {
            for branch in value.as_array().into_iter().flatten().filter_map(Value::as_object) {
                collect_referenced(branch, declared, out);
            }
            continue;
        }
        let Value::Object(inner) = value else {
            continue;
        };
        if is_operator_expression(inner) {
            continue;
        }
        let Some(join) = declared.iter().find(|d| d.property == *key) else {
            continue;
        };
        let position = match out.iter().position(|item| item.name() == key.as_str()) {
            Some(i) => i,
            None => {
                out.push(PopulateItem::Node {
                    name: key.clone(),
                    populates: Vec::new(),
                });
                out.len() - 1
            }
        };
        if let PopulateItem::Node { populates, .. } = &mut out[position] {
            collect_referenced(inner, &join.children, populates);
        }
    }
}

fn is_operator_expression(inner: &Map<String, Value>) -> bool {
    inner.keys().any(|k| Operator::is_token(k) && k != OR_KEY)
}

fn parse_or(value: &Value, scope: &Scope, prefix: Option<&str>) -> Result<Predicate, AppError> {
    let items = value
        .as_array()
        .ok_or_else(|| AppError::invalid_operand(OR_KEY, OR_KEY, "expected an array of conditions"))?;
    let mut branches = Vec::with_capacity(items.len());
    for item in items {
        let spec = item
            .as_object()
            .ok_or_else(|| AppError::invalid_operand(OR_KEY, OR_KEY, "every entry must be an object"))?;
        branches.push(parse_entries(spec, scope, prefix)?);
    }
    Ok(Predicate::Or(branches))
}

fn parse_operator(token: &str, value: &Value, path: &str, scope: &Scope) -> Result<Predicate, AppError> {
    let operator = Operator::parse(token)?;
    let (column, cast) = scope.column(path);
    let (operator, operand) = if operator == Operator::Field {
        (operator, field_operand(value, path, scope)?)
    } else {
        operator.operand(path, value)?
    };
    Ok(Predicate::Compare {
        alias: scope.alias.to_string(),
        column,
        cast,
        operator,
        operand,
    })
}

/// `$field: "other"` or `$field: { field: "other", operator: "$gt" }`.
fn field_operand(value: &Value, path: &str, scope: &Scope) -> Result<Operand, AppError> {
    let (other, compare) = match value {
        Value::String(other) => (other.as_str(), Operator::Eq),
        Value::Object(spec) => {
            let other = spec
                .get("field")
                .and_then(Value::as_str)
                .ok_or_else(|| AppError::invalid_operand(path, "$field", "expected a field name"))?;
            let compare = match spec.get("operator").and_then(Value::as_str) {
                Some(token) => column_comparison(token)?,
                None => Operator::Eq,
            };
            (other, compare)
        }
        _ => return Err(AppError::invalid_operand(path, "$field", "expected a field name")),
    };
    let (column, _) = scope.column(other);
    Ok(Operand::Column {
        sql: qualified(scope.alias, &column),
        compare,
    })
}

/// Render a predicate into SQL text, binding its values into `q`.
/// Returns `None` for an empty tree.
pub fn render(predicate: &Predicate, q: &mut QueryBuf) -> Option<String> {
    match predicate {
        Predicate::And(items) => {
            let parts: Vec<String> = items.iter().filter_map(|p| render(p, q)).collect();
            (!parts.is_empty()).then(|| parts.join(" AND "))
        }
        Predicate::Or(_) if predicate.is_empty() => None,
        Predicate::Or(items) => {
            let mut parts = Vec::with_capacity(items.len());
            for branch in items {
                let Some(sql) = render(branch, q) else {
                    continue;
                };
                if and_width(branch) > 1 {
                    parts.push(format!("({})", sql));
                } else {
                    parts.push(sql);
                }
            }
            (!parts.is_empty()).then(|| format!("({})", parts.join(" OR ")))
        }
        Predicate::Compare {
            alias,
            column,
            cast,
            operator,
            operand,
        } => {
            let hint = format!("{}.{}", alias, column);
            Some(operator.render(&qualified(alias, column), operand, &hint, cast.as_deref(), q))
        }
        Predicate::Match { alias, column, pattern } => {
            let ph = q.bind("search", Value::String(pattern.clone()));
            Some(format!("{} {} {}", qualified(alias, column), q.dialect().ci_like(), ph))
        }
    }
}

/// Number of terms a predicate contributes to an enclosing conjunction.
fn and_width(predicate: &Predicate) -> usize {
    match predicate {
        Predicate::And(items) => items.iter().map(and_width).sum(),
        Predicate::Or(_) if predicate.is_empty() => 0,
        _ => 1,
    }
}
