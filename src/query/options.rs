//! Server-side query options: per-call policy layered over the entity's declarations.

use serde::{Deserialize, Serialize};

/// Population request node. From clients only `property` and `populates` are ever
/// set; the override fields are reserved for server-side `QueryOptions::population`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PopulateRequest {
    pub property: String,
    #[serde(default)]
    pub eager: Option<bool>,
    #[serde(default)]
    pub required: Option<bool>,
    /// Extra join condition, conjoined with the declared one.
    #[serde(default)]
    pub on_condition: Option<String>,
    #[serde(default)]
    pub populates: Vec<PopulateRequest>,
}

impl PopulateRequest {
    pub fn named(property: impl Into<String>) -> Self {
        PopulateRequest {
            property: property.into(),
            ..Default::default()
        }
    }

    pub fn with_children(mut self, children: Vec<PopulateRequest>) -> Self {
        self.populates = children;
        self
    }

    pub fn eager(mut self, eager: bool) -> Self {
        self.eager = Some(eager);
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = Some(required);
        self
    }

    pub fn on_condition(mut self, condition: impl Into<String>) -> Self {
        self.on_condition = Some(condition.into());
        self
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Narrows/overrides the entity's declared populations for this call. `None` = all declared.
    #[serde(default)]
    pub population: Option<Vec<PopulateRequest>>,
    /// Max page size for this call; falls back to the entity's `max_page_size`.
    #[serde(default)]
    pub max_limit: Option<u32>,
    /// Fields allowed in `searchFields`; falls back to the entity's allow-list.
    #[serde(default)]
    pub allowed_search_fields: Option<Vec<String>>,
    /// Return soft-deleted rows (only honoured for entities with a delete-date column).
    #[serde(default)]
    pub include_deleted: bool,
    /// Hidden columns to select explicitly.
    #[serde(default)]
    pub include_hidden_fields: Vec<String>,
    /// Force a page window on `find`.
    #[serde(default)]
    pub paginated: bool,
}
