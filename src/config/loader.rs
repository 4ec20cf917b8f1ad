//! Load the entity model from JSON and resolve it for runtime use.

use crate::case::to_camel_case;
use crate::config::resolved::{ColumnInfo, DeclaredJoin, RelationKeys, ResolvedEntity, ResolvedModel, MAX_PAGE_SIZE};
use crate::config::types::*;
use crate::config::validate;
use crate::error::{ConfigError, ConstraintMessages};
use crate::query::{SortOrder, SortSpec};
use std::collections::HashMap;
use std::path::Path;

/// Build resolved model from the model config (validates first).
pub fn resolve(config: &ModelConfig) -> Result<ResolvedModel, ConfigError> {
    validate(config)?;
    let configs: HashMap<&str, &EntityConfig> = config.entities.iter().map(|e| (e.name.as_str(), e)).collect();

    let mut entities = Vec::with_capacity(config.entities.len());
    let mut by_name = HashMap::new();
    for e in &config.entities {
        let columns: Vec<ColumnInfo> = e
            .columns
            .iter()
            .map(|c| ColumnInfo {
                name: c.name.clone(),
                property: c.property.clone().unwrap_or_else(|| match e.column_naming {
                    ColumnNaming::Verbatim => c.name.clone(),
                    ColumnNaming::SnakeCase => to_camel_case(&c.name),
                }),
                pg_type: c.type_.clone(),
                primary: c.primary,
                hidden: c.hidden,
                has_default: c.has_default,
            })
            .collect();
        let by_property = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.property.clone(), i))
            .collect();
        let pk_columns: Vec<String> = e.columns.iter().filter(|c| c.primary).map(|c| c.name.clone()).collect();
        let default_sort = e.default_sort.clone().unwrap_or_else(|| {
            SortSpec(
                columns
                    .iter()
                    .filter(|c| c.primary)
                    .map(|c| (c.property.clone(), SortOrder::Desc))
                    .collect(),
            )
        });

        by_name.insert(e.name.clone(), entities.len());
        entities.push(ResolvedEntity {
            name: e.name.clone(),
            schema: e.schema.clone(),
            table: e.table.clone().unwrap_or_else(|| e.name.clone()),
            naming: e.column_naming,
            columns,
            pk_columns,
            delete_date_column: e.columns.iter().find(|c| c.delete_date).map(|c| c.name.clone()),
            populations: declare_joins(&e.populations, e, &configs)?,
            default_sort,
            max_page_size: e.max_page_size.unwrap_or(MAX_PAGE_SIZE),
            allowed_search_fields: e.allowed_search_fields.clone(),
            by_property,
        });
    }

    tracing::debug!(entities = entities.len(), "model resolved");
    Ok(ResolvedModel {
        entities,
        constraints: ConstraintMessages::new(config.constraint_messages.clone()),
        by_name,
    })
}

fn declare_joins(
    populations: &[PopulationConfig],
    parent: &EntityConfig,
    configs: &HashMap<&str, &EntityConfig>,
) -> Result<Vec<DeclaredJoin>, ConfigError> {
    let mut out = Vec::with_capacity(populations.len());
    for p in populations {
        let (target, cardinality, keys) = match p.kind {
            RelationKind::Relation => {
                let rel = parent
                    .relations
                    .iter()
                    .find(|r| r.property == p.property)
                    .ok_or_else(|| ConfigError::UnknownRelation {
                        entity: parent.name.clone(),
                        property: p.property.clone(),
                    })?;
                let keys = RelationKeys {
                    local_column: rel.local_column.clone(),
                    foreign_column: rel.foreign_column.clone(),
                    through: rel.through.clone(),
                };
                (rel.target.clone(), rel.cardinality, Some(keys))
            }
            RelationKind::MapOne => (p.target.clone().unwrap_or_default(), Cardinality::One, None),
            RelationKind::MapMany => (p.target.clone().unwrap_or_default(), Cardinality::Many, None),
        };
        let target_config = configs.get(target.as_str()).ok_or_else(|| ConfigError::MissingReference {
            kind: "population target",
            id: target.clone(),
        })?;
        out.push(DeclaredJoin {
            property: p.property.clone(),
            kind: p.kind,
            alias: p.alias.clone().unwrap_or_else(|| p.property.clone()),
            target,
            cardinality,
            eager: p.eager,
            required: p.required,
            on_condition: p.on_condition.clone(),
            keys,
            children: declare_joins(&p.populates, target_config, configs)?,
        });
    }
    Ok(out)
}

/// Load and resolve the model from a JSON file.
pub async fn load_from_path(path: impl AsRef<Path>) -> Result<ResolvedModel, ConfigError> {
    let path = path.as_ref();
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    let config: ModelConfig =
        serde_json::from_str(&raw).map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    tracing::info!(path = %path.display(), entities = config.entities.len(), "model loaded");
    resolve(&config)
}
