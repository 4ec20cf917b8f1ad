//! Raw entity model types matching the JSON model file.

use crate::query::SortSpec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Column naming convention for deriving API property names from column names.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnNaming {
    /// Property name equals column name.
    #[default]
    Verbatim,
    /// Columns are snake_case; properties are their camelCase form.
    SnakeCase,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub name: String,
    /// API-facing name; defaults to the column name (or its camelCase form).
    #[serde(default)]
    pub property: Option<String>,
    /// PostgreSQL type name used to cast bound parameters (e.g. "uuid", "timestamptz").
    #[serde(default, rename = "type")]
    pub type_: Option<String>,
    #[serde(default)]
    pub primary: bool,
    /// Not selected unless explicitly requested through `QueryOptions::include_hidden_fields`.
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub has_default: bool,
    /// Soft-delete timestamp column.
    #[serde(default)]
    pub delete_date: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    One,
    Many,
}

/// Junction table for many-to-many relations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThroughConfig {
    pub table: String,
    #[serde(default)]
    pub schema: Option<String>,
    /// Junction column referencing the owner's `local_column`.
    pub source_column: String,
    /// Junction column referencing the target's `foreign_column`.
    pub target_column: String,
}

/// A relation backed by the entity's own keys (foreign key or junction table).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelationConfig {
    pub property: String,
    /// Target entity name.
    pub target: String,
    pub cardinality: Cardinality,
    pub local_column: String,
    pub foreign_column: String,
    #[serde(default)]
    pub through: Option<ThroughConfig>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationKind {
    #[serde(rename = "relation")]
    Relation,
    #[serde(rename = "mapOne")]
    MapOne,
    #[serde(rename = "mapMany")]
    MapMany,
}

/// Server-declared allowed population entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PopulationConfig {
    /// Relation property (for `relation`) or the side property receiving mapped rows.
    pub property: String,
    #[serde(rename = "type")]
    pub kind: RelationKind,
    /// Target entity; required for `mapOne` / `mapMany`, derived from the relation otherwise.
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub eager: bool,
    /// Inner join when true, left join otherwise.
    #[serde(default)]
    pub required: bool,
    /// Raw join condition, e.g. `"tags"."categoryId" = "tag_categories"."id"`.
    #[serde(default)]
    pub on_condition: Option<String>,
    #[serde(default)]
    pub populates: Vec<PopulationConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntityConfig {
    pub name: String,
    #[serde(default)]
    pub schema: Option<String>,
    /// Defaults to `name`.
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub column_naming: ColumnNaming,
    pub columns: Vec<ColumnConfig>,
    #[serde(default)]
    pub relations: Vec<RelationConfig>,
    #[serde(default)]
    pub populations: Vec<PopulationConfig>,
    /// `{ property: "ASC" | "DESC" }`, in order. Defaults to primary key descending.
    #[serde(default)]
    pub default_sort: Option<SortSpec>,
    #[serde(default)]
    pub max_page_size: Option<u32>,
    #[serde(default)]
    pub allowed_search_fields: Option<Vec<String>>,
}

/// The full model: every entity plus the constraint-name message table.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    pub entities: Vec<EntityConfig>,
    /// Backend constraint name -> domain message. `<name>_RESTRICTED_DELETE` keys
    /// are used when a delete is blocked by a referencing row.
    #[serde(default)]
    pub constraint_messages: HashMap<String, String>,
}
