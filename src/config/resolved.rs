//! Resolved entity model: config validated and flattened for runtime use.
//! Built once at startup and shared read-only between requests.

use crate::case::to_snake_case;
use crate::config::{Cardinality, ColumnNaming, RelationKind, ThroughConfig};
use crate::error::ConstraintMessages;
use crate::query::SortSpec;
use crate::sql::{quoted, Dialect};
use std::collections::HashMap;

/// Upper bound on page size when neither the entity nor the call declares one.
pub const MAX_PAGE_SIZE: u32 = 1000;

#[derive(Clone, Debug)]
pub struct ColumnInfo {
    /// Database column name.
    pub name: String,
    /// API property name.
    pub property: String,
    /// PostgreSQL type name for SQL casts when binding values.
    pub pg_type: Option<String>,
    pub primary: bool,
    pub hidden: bool,
    pub has_default: bool,
}

impl ColumnInfo {
    /// NUMERIC and user-defined (`schema.type`) columns have no JSON decoding;
    /// they are read back as text.
    pub fn reads_as_text(&self) -> bool {
        let ty = self.pg_type.as_deref().unwrap_or("").to_lowercase();
        ty.starts_with("numeric") || ty.starts_with("decimal") || ty.contains('.')
    }

    /// Unqualified output expression, as used in `RETURNING`.
    pub fn read_expr(&self, dialect: Dialect) -> String {
        let col = quoted(&self.name);
        if dialect == Dialect::Postgres && self.reads_as_text() {
            format!("{}::text", col)
        } else {
            col
        }
    }
}

/// Join keys of a declared (foreign-key backed) relation.
#[derive(Clone, Debug, PartialEq)]
pub struct RelationKeys {
    pub local_column: String,
    pub foreign_column: String,
    pub through: Option<ThroughConfig>,
}

/// A server-declared population entry with its target resolved.
#[derive(Clone, Debug)]
pub struct DeclaredJoin {
    pub property: String,
    pub kind: RelationKind,
    /// Target entity name.
    pub target: String,
    pub alias: String,
    pub cardinality: Cardinality,
    pub eager: bool,
    pub required: bool,
    pub on_condition: Option<String>,
    /// Present for `RelationKind::Relation`.
    pub keys: Option<RelationKeys>,
    pub children: Vec<DeclaredJoin>,
}

#[derive(Clone, Debug)]
pub struct ResolvedEntity {
    pub name: String,
    pub schema: Option<String>,
    pub table: String,
    pub naming: ColumnNaming,
    pub columns: Vec<ColumnInfo>,
    pub pk_columns: Vec<String>,
    pub delete_date_column: Option<String>,
    pub populations: Vec<DeclaredJoin>,
    pub default_sort: SortSpec,
    pub max_page_size: u32,
    pub allowed_search_fields: Option<Vec<String>>,
    pub(crate) by_property: HashMap<String, usize>,
}

impl ResolvedEntity {
    /// Alias of the driving table inside compiled statements.
    pub fn alias(&self) -> &str {
        &self.table
    }

    /// Column by API property, falling back to the raw column name.
    pub fn column(&self, property: &str) -> Option<&ColumnInfo> {
        self.by_property
            .get(property)
            .map(|&i| &self.columns[i])
            .or_else(|| self.columns.iter().find(|c| c.name == property))
    }

    /// Column name for a property; unknown properties pass through (converted per naming).
    pub fn column_name(&self, property: &str) -> String {
        match self.column(property) {
            Some(c) => c.name.clone(),
            None => match self.naming {
                ColumnNaming::Verbatim => property.to_string(),
                ColumnNaming::SnakeCase => to_snake_case(property),
            },
        }
    }

    pub fn visible_columns(&self) -> impl Iterator<Item = &ColumnInfo> {
        self.columns.iter().filter(|c| !c.hidden)
    }

    pub fn primary_columns(&self) -> impl Iterator<Item = &ColumnInfo> {
        self.columns.iter().filter(|c| c.primary)
    }

    pub fn has_soft_delete(&self) -> bool {
        self.delete_date_column.is_some()
    }

    pub fn population(&self, property: &str) -> Option<&DeclaredJoin> {
        self.populations.iter().find(|p| p.property == property)
    }
}

#[derive(Clone, Debug, Default)]
pub struct ResolvedModel {
    pub entities: Vec<ResolvedEntity>,
    pub constraints: ConstraintMessages,
    pub(crate) by_name: HashMap<String, usize>,
}

impl ResolvedModel {
    pub fn entity(&self, name: &str) -> Option<&ResolvedEntity> {
        self.by_name.get(name).map(|&i| &self.entities[i])
    }
}
