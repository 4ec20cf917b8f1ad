//! Population resolver: merges requested relation trees against declared ones
//! and renders the resulting joins.

use crate::config::{Cardinality, DeclaredJoin, RelationKeys, RelationKind, ResolvedModel};
use crate::query::PopulateRequest;
use crate::sql::{qualified, qualified_table, quoted};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
}

impl JoinType {
    pub fn as_sql(self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
        }
    }
}

/// How joined rows attach to the parent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinShape {
    /// Declared relation: rows land on the relation property.
    Select,
    /// Computed relation onto a single side property.
    MapOne,
    /// Computed relation onto a side array.
    MapMany,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JoinMethod {
    pub join: JoinType,
    pub shape: JoinShape,
}

impl JoinMethod {
    pub fn of(kind: RelationKind, required: bool) -> Self {
        let join = if required { JoinType::Inner } else { JoinType::Left };
        let shape = match kind {
            RelationKind::Relation => JoinShape::Select,
            RelationKind::MapOne => JoinShape::MapOne,
            RelationKind::MapMany => JoinShape::MapMany,
        };
        JoinMethod { join, shape }
    }

    pub fn name(self) -> &'static str {
        match (self.join, self.shape) {
            (JoinType::Inner, JoinShape::Select) => "innerJoinAndSelect",
            (JoinType::Inner, JoinShape::MapOne) => "innerJoinAndMapOne",
            (JoinType::Inner, JoinShape::MapMany) => "innerJoinAndMapMany",
            (JoinType::Left, JoinShape::Select) => "leftJoinAndSelect",
            (JoinType::Left, JoinShape::MapOne) => "leftJoinAndMapOne",
            (JoinType::Left, JoinShape::MapMany) => "leftJoinAndMapMany",
        }
    }
}

/// One join of the per-request join plan.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedJoin {
    pub property: String,
    pub kind: RelationKind,
    pub method: JoinMethod,
    /// Target entity name.
    pub target: String,
    pub alias: String,
    pub parent_alias: String,
    pub required: bool,
    pub eager: bool,
    pub on_condition: Option<String>,
    pub keys: Option<RelationKeys>,
    pub cardinality: Cardinality,
    pub children: Vec<ResolvedJoin>,
}

impl ResolvedJoin {
    /// Whether the join can multiply parent rows.
    pub fn is_many(&self) -> bool {
        match self.method.shape {
            JoinShape::MapMany => true,
            JoinShape::MapOne => false,
            JoinShape::Select => self.cardinality == Cardinality::Many,
        }
    }
}

/// True when any join in the tree is to-many.
pub fn any_many(joins: &[ResolvedJoin]) -> bool {
    joins.iter().any(|j| j.is_many() || any_many(&j.children))
}

/// Find a join anywhere in the tree by alias.
pub fn find_by_alias<'a>(joins: &'a [ResolvedJoin], alias: &str) -> Option<&'a ResolvedJoin> {
    joins
        .iter()
        .find_map(|j| if j.alias == alias { Some(j) } else { find_by_alias(&j.children, alias) })
}

fn conjoin(declared: Option<&str>, extra: Option<&str>) -> Option<String> {
    match (declared, extra) {
        (Some(d), Some(e)) => Some(format!("({}) AND ({})", d, e)),
        (Some(d), None) => Some(d.to_string()),
        (None, Some(e)) => Some(e.to_string()),
        (None, None) => None,
    }
}

fn with_overrides(declared: &DeclaredJoin, request: &PopulateRequest) -> DeclaredJoin {
    DeclaredJoin {
        eager: request.eager.unwrap_or(declared.eager),
        required: request.required.unwrap_or(declared.required),
        on_condition: conjoin(declared.on_condition.as_deref(), request.on_condition.as_deref()),
        ..declared.clone()
    }
}

/// Server-side override layer: keep only the declared entries named in
/// `population` (in that order) with their overrides applied. `None` keeps
/// the declared tree as is.
pub fn narrow(population: Option<&[PopulateRequest]>, declared: &[DeclaredJoin]) -> Vec<DeclaredJoin> {
    let Some(population) = population else {
        return declared.to_vec();
    };
    let mut out: Vec<DeclaredJoin> = Vec::with_capacity(population.len());
    for request in population {
        let Some(found) = declared.iter().find(|d| d.property == request.property) else {
            continue;
        };
        if out.iter().any(|d| d.property == found.property) {
            continue;
        }
        let mut merged = with_overrides(found, request);
        if !request.populates.is_empty() {
            merged.children = narrow(Some(request.populates.as_slice()), &found.children);
        }
        out.push(merged);
    }
    out
}

/// Merge the caller's requested tree against the allowed one. Requested entries
/// come first in request order (unknown names dropped), then every eager entry
/// not already requested.
pub fn resolve(requested: &[PopulateRequest], allowed: &[DeclaredJoin], parent_alias: &str) -> Vec<ResolvedJoin> {
    let mut out: Vec<ResolvedJoin> = Vec::new();
    for request in requested {
        let Some(found) = allowed.iter().find(|a| a.property == request.property) else {
            tracing::debug!(property = %request.property, "populate dropped: not allowed");
            continue;
        };
        if out.iter().any(|j| j.property == found.property) {
            continue;
        }
        out.push(to_join(&with_overrides(found, request), &request.populates, parent_alias));
    }
    for eager in allowed.iter().filter(|a| a.eager) {
        if !out.iter().any(|j| j.property == eager.property) {
            out.push(to_join(eager, &[], parent_alias));
        }
    }
    out
}

fn to_join(declared: &DeclaredJoin, requested_children: &[PopulateRequest], parent_alias: &str) -> ResolvedJoin {
    let children = if declared.children.is_empty() {
        Vec::new()
    } else {
        resolve(requested_children, &declared.children, &declared.alias)
    };
    ResolvedJoin {
        property: declared.property.clone(),
        kind: declared.kind,
        method: JoinMethod::of(declared.kind, declared.required),
        target: declared.target.clone(),
        alias: declared.alias.clone(),
        parent_alias: parent_alias.to_string(),
        required: declared.required,
        eager: declared.eager,
        on_condition: declared.on_condition.clone(),
        keys: declared.keys.clone(),
        cardinality: declared.cardinality,
        children,
    }
}

/// Append the join clauses for the tree, parents before children.
pub fn render_joins(joins: &[ResolvedJoin], model: &ResolvedModel, include_deleted: bool, out: &mut String) {
    for join in joins {
        let Some(target) = model.entity(&join.target) else {
            continue;
        };
        let keyword = join.method.join.as_sql();
        let alias = quoted(&join.alias);
        let mut on = match (&join.keys, &join.on_condition) {
            (Some(keys), extra) => {
                let on = match &keys.through {
                    Some(through) => {
                        let junction = format!("{}__through", join.alias);
                        out.push_str(&format!(
                            " {} {} {} ON {} = {}",
                            keyword,
                            qualified_table(through.schema.as_deref(), &through.table),
                            quoted(&junction),
                            qualified(&junction, &through.source_column),
                            qualified(&join.parent_alias, &keys.local_column),
                        ));
                        format!(
                            "{} = {}",
                            qualified(&join.alias, &keys.foreign_column),
                            qualified(&junction, &through.target_column)
                        )
                    }
                    None => format!(
                        "{} = {}",
                        qualified(&join.parent_alias, &keys.local_column),
                        qualified(&join.alias, &keys.foreign_column)
                    ),
                };
                match extra {
                    Some(extra) => format!("{} AND ({})", on, extra),
                    None => on,
                }
            }
            (None, Some(condition)) => condition.clone(),
            (None, None) => "1 = 1".to_string(),
        };
        if let (Some(deleted), false) = (&target.delete_date_column, include_deleted) {
            on = format!("{} AND {} IS NULL", on, qualified(&join.alias, deleted));
        }
        out.push_str(&format!(
            " {} {} {} ON {}",
            keyword,
            qualified_table(target.schema.as_deref(), &target.table),
            alias,
            on
        ));
        render_joins(&join.children, model, include_deleted, out);
    }
}
