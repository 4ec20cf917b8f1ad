//! Query assembler: joins, projection, conditions, search, soft-delete, sort
//! and page window, applied in that order.

use crate::config::{ResolvedEntity, ResolvedModel};
use crate::error::AppError;
use crate::query::{FilterRequest, QueryOptions, SortOrder};
use crate::sql::condition::{self, Predicate, Scope};
use crate::sql::hydrate::{hydrate, Nested, Shape};
use crate::sql::operator::{Operand, Operator};
use crate::sql::populate::{any_many, find_by_alias, narrow, render_joins, resolve, ResolvedJoin};
use crate::sql::{qualified, qualified_table, quoted, Dialect, QueryBuf};
use serde_json::{Map, Value};

/// Alias of the derived table that windows the driving table.
const PAGE_ALIAS: &str = "__page";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    pub take: u32,
    pub skip: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SelectedColumn {
    pub alias: String,
    pub column: String,
    pub property: String,
    /// Selected as `::text` on Postgres (NUMERIC and user-defined types).
    pub as_text: bool,
}

impl SelectedColumn {
    pub fn label(&self) -> String {
        format!("{}__{}", self.alias, self.column)
    }

    fn expr(&self, dialect: Dialect) -> String {
        let col = qualified(&self.alias, &self.column);
        if self.as_text && dialect == Dialect::Postgres {
            format!("{}::text", col)
        } else {
            col
        }
    }
}

pub struct SelectPlan<'a> {
    model: &'a ResolvedModel,
    entity: &'a ResolvedEntity,
    joins: Vec<ResolvedJoin>,
    columns: Vec<SelectedColumn>,
    predicate: Predicate,
    sort: Vec<(String, SortOrder)>,
    window: Option<Window>,
    include_deleted: bool,
}

impl<'a> SelectPlan<'a> {
    pub fn build(
        model: &'a ResolvedModel,
        entity: &'a ResolvedEntity,
        request: &FilterRequest,
        options: &QueryOptions,
        window: Option<Window>,
    ) -> Result<Self, AppError> {
        let alias = entity.alias();

        // 1. joins
        let allowed = narrow(options.population.as_deref(), &entity.populations);
        let joins = resolve(&request.populate_requests(), &allowed, alias);

        // 2-3. projection and explicitly requested hidden columns
        let mut columns = root_projection(entity, &request.fields, &options.include_hidden_fields);
        join_projection(model, &joins, &request.fields, &mut columns);

        // 4. where
        let scope = Scope::root(entity, &joins, model);
        let mut parts = vec![condition::parse(&request.where_, &scope)?];

        // 5. search
        if let Some(search) = search_predicate(entity, request, options) {
            parts.push(search);
        }

        // 6. soft-deleted rows
        let include_deleted = options.include_deleted && entity.has_soft_delete();
        if let (Some(deleted), false) = (&entity.delete_date_column, include_deleted) {
            parts.push(Predicate::Compare {
                alias: alias.to_string(),
                column: deleted.clone(),
                cast: None,
                operator: Operator::IsNull,
                operand: Operand::None,
            });
        }

        // 7. sort
        let sort_spec = if request.sort.is_empty() {
            &entity.default_sort
        } else {
            &request.sort
        };
        let sort = sort_spec
            .iter()
            .map(|(field, order)| (sort_column(model, entity, &joins, field), *order))
            .collect();

        Ok(SelectPlan {
            model,
            entity,
            joins,
            columns,
            predicate: Predicate::And(parts),
            sort,
            window,
            include_deleted,
        })
    }

    pub fn entity(&self) -> &ResolvedEntity {
        self.entity
    }

    pub fn joins(&self) -> &[ResolvedJoin] {
        &self.joins
    }

    pub fn columns(&self) -> &[SelectedColumn] {
        &self.columns
    }

    pub fn window(&self) -> Option<Window> {
        self.window
    }

    /// Whether the window has to go through the primary-key subselect.
    fn windows_through_keys(&self) -> bool {
        self.window.is_some() && any_many(&self.joins)
    }

    /// The full select statement.
    pub fn to_sql(&self, dialect: Dialect) -> QueryBuf {
        let mut q = QueryBuf::new(dialect);
        let labels: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("{} AS {}", c.expr(dialect), quoted(&c.label())))
            .collect();
        q.push_sql(&format!("SELECT {} FROM {}", labels.join(", "), self.from()));

        if let (true, Some(window)) = (self.windows_through_keys(), self.window) {
            q.push_sql(" INNER JOIN (");
            self.render_keys(&mut q, Some(window));
            let on: Vec<String> = self
                .entity
                .pk_columns
                .iter()
                .map(|pk| format!("{} = {}", qualified(self.entity.alias(), pk), qualified(PAGE_ALIAS, pk)))
                .collect();
            q.push_sql(&format!(") {} ON {}", quoted(PAGE_ALIAS), on.join(" AND ")));
        }

        self.render_joins_and_where(&mut q);
        q.push_sql(&self.order_by(false));
        if let (false, Some(window)) = (self.windows_through_keys(), self.window) {
            q.push_sql(&limit_offset(window));
        }
        q
    }

    /// `SELECT COUNT(DISTINCT pk) AS total` over the same joins and predicates.
    pub fn count_sql(&self, dialect: Dialect) -> QueryBuf {
        let mut q = QueryBuf::new(dialect);
        q.push_sql(&format!(
            "SELECT COUNT(DISTINCT {}) AS \"total\" FROM {}",
            self.key_tuple(),
            self.from()
        ));
        self.render_joins_and_where(&mut q);
        q
    }

    /// Primary keys of the matching rows, for `(pk) IN (...)` in criteria mutations.
    pub fn ids_subquery(&self, q: &mut QueryBuf, limit: Option<u32>) {
        self.render_keys(q, limit.map(|take| Window { take, skip: 0 }));
    }

    /// `("alias"."pk", ...)` or the single qualified key.
    pub fn key_tuple(&self) -> String {
        let keys: Vec<String> = self
            .entity
            .pk_columns
            .iter()
            .map(|pk| qualified(self.entity.alias(), pk))
            .collect();
        if keys.len() == 1 {
            keys.join("")
        } else {
            format!("({})", keys.join(", "))
        }
    }

    /// Output shape for hydrating the rows of `to_sql`.
    pub fn shape(&self) -> Shape {
        self.alias_shape(self.entity, self.entity.alias(), &self.joins)
    }

    /// Fold rows produced by `to_sql` into nested JSON.
    pub fn hydrate(&self, rows: &[Map<String, Value>]) -> Vec<Value> {
        hydrate(rows, &self.shape())
    }

    fn alias_shape(&self, entity: &ResolvedEntity, alias: &str, joins: &[ResolvedJoin]) -> Shape {
        let own: Vec<&SelectedColumn> = self.columns.iter().filter(|c| c.alias == alias).collect();
        Shape {
            columns: own.iter().map(|c| (c.label(), c.property.clone())).collect(),
            keys: entity
                .pk_columns
                .iter()
                .map(|pk| SelectedColumn {
                    alias: alias.to_string(),
                    column: pk.clone(),
                    property: String::new(),
                    as_text: false,
                }
                .label())
                .collect(),
            children: joins
                .iter()
                .filter_map(|j| {
                    let target = self.model.entity(&j.target)?;
                    Some(Nested {
                        property: j.property.clone(),
                        many: j.is_many(),
                        shape: self.alias_shape(target, &j.alias, &j.children),
                    })
                })
                .collect(),
        }
    }

    fn from(&self) -> String {
        format!(
            "{} {}",
            qualified_table(self.entity.schema.as_deref(), &self.entity.table),
            quoted(self.entity.alias())
        )
    }

    fn render_joins_and_where(&self, q: &mut QueryBuf) {
        let mut joins = String::new();
        render_joins(&self.joins, self.model, self.include_deleted, &mut joins);
        q.push_sql(&joins);
        // Placeholders are numbered as bound, so the text is pushed right after rendering.
        if let Some(where_sql) = condition::render(&self.predicate, q) {
            q.push_sql(&format!(" WHERE {}", where_sql));
        }
    }

    fn render_keys(&self, q: &mut QueryBuf, window: Option<Window>) {
        let keys: Vec<String> = self
            .entity
            .pk_columns
            .iter()
            .map(|pk| qualified(self.entity.alias(), pk))
            .collect();
        q.push_sql(&format!("SELECT {} FROM {}", keys.join(", "), self.from()));
        self.render_joins_and_where(q);
        if let Some(window) = window {
            q.push_sql(&format!(" GROUP BY {}", keys.join(", ")));
            q.push_sql(&self.order_by(true));
            q.push_sql(&limit_offset(window));
        }
    }

    /// Grouped key subselects order by an aggregate of each sort column.
    fn order_by(&self, grouped: bool) -> String {
        if self.sort.is_empty() {
            return String::new();
        }
        let items: Vec<String> = self
            .sort
            .iter()
            .map(|(expr, order)| match (grouped, order) {
                (false, _) => format!("{} {}", expr, order.as_sql()),
                (true, SortOrder::Asc) => format!("MIN({}) ASC", expr),
                (true, SortOrder::Desc) => format!("MAX({}) DESC", expr),
            })
            .collect();
        format!(" ORDER BY {}", items.join(", "))
    }
}

fn limit_offset(window: Window) -> String {
    if window.skip > 0 {
        format!(" LIMIT {} OFFSET {}", window.take, window.skip)
    } else {
        format!(" LIMIT {}", window.take)
    }
}

fn root_projection(entity: &ResolvedEntity, fields: &[String], include_hidden: &[String]) -> Vec<SelectedColumn> {
    let alias = entity.alias();
    let select = |c: &crate::config::ColumnInfo| SelectedColumn {
        alias: alias.to_string(),
        column: c.name.clone(),
        property: c.property.clone(),
        as_text: c.reads_as_text(),
    };
    let root_fields: Vec<&str> = fields.iter().filter(|f| !f.contains('.')).map(String::as_str).collect();
    let mut out: Vec<SelectedColumn> = if root_fields.is_empty() {
        entity.visible_columns().map(select).collect()
    } else {
        let mut out: Vec<SelectedColumn> = entity.primary_columns().map(select).collect();
        for field in root_fields {
            if let Some(c) = entity.column(field) {
                if !c.hidden && !out.iter().any(|s| s.column == c.name) {
                    out.push(select(c));
                }
            }
        }
        out
    };
    for field in include_hidden {
        if let Some(c) = entity.column(field) {
            if !out.iter().any(|s| s.column == c.name) {
                out.push(select(c));
            }
        }
    }
    out
}

/// Joined aliases select `alias.field` entries when any are listed, else every visible column.
fn join_projection(model: &ResolvedModel, joins: &[ResolvedJoin], fields: &[String], out: &mut Vec<SelectedColumn>) {
    for join in joins {
        let Some(target) = model.entity(&join.target) else {
            continue;
        };
        let listed: Vec<&str> = fields
            .iter()
            .filter_map(|f| f.split_once('.'))
            .filter(|(alias, _)| *alias == join.alias)
            .map(|(_, field)| field)
            .collect();
        let select = |c: &crate::config::ColumnInfo| SelectedColumn {
            alias: join.alias.clone(),
            column: c.name.clone(),
            property: c.property.clone(),
            as_text: c.reads_as_text(),
        };
        if listed.is_empty() {
            out.extend(target.visible_columns().map(select));
        } else {
            let start = out.len();
            out.extend(target.primary_columns().map(select));
            for field in listed {
                if let Some(c) = target.column(field) {
                    if !c.hidden && !out[start..].iter().any(|s| s.column == c.name) {
                        out.push(select(c));
                    }
                }
            }
        }
        join_projection(model, &join.children, fields, out);
    }
}

fn search_predicate(entity: &ResolvedEntity, request: &FilterRequest, options: &QueryOptions) -> Option<Predicate> {
    let term = request.search.as_deref().filter(|s| !s.is_empty())?;
    let allowed = options
        .allowed_search_fields
        .as_ref()
        .or(entity.allowed_search_fields.as_ref())
        .filter(|a| !a.is_empty());
    let pattern = request.search_criteria.pattern(term);
    let branches: Vec<Predicate> = request
        .search_fields
        .iter()
        .filter(|f| match allowed {
            Some(list) => list.contains(f),
            None => entity.column(f).is_some_and(|c| !c.hidden),
        })
        .map(|f| Predicate::Match {
            alias: entity.alias().to_string(),
            column: entity.column_name(f),
            pattern: pattern.clone(),
        })
        .collect();
    if branches.is_empty() {
        return None;
    }
    Some(Predicate::Or(branches))
}

/// Root fields sort on the driving table; `alias.field` sorts on a joined alias.
fn sort_column(model: &ResolvedModel, entity: &ResolvedEntity, joins: &[ResolvedJoin], field: &str) -> String {
    if let Some((alias, rest)) = field.split_once('.') {
        if let Some(join) = find_by_alias(joins, alias) {
            if let Some(target) = model.entity(&join.target) {
                return qualified(&join.alias, &target.column_name(rest));
            }
        }
    }
    qualified(entity.alias(), &entity.column_name(field))
}
