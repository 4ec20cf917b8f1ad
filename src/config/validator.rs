//! Model validation: referential integrity and population declarations.

use crate::config::{EntityConfig, ModelConfig, PopulationConfig, RelationKind};
use crate::error::ConfigError;
use std::collections::{HashMap, HashSet};

pub fn validate(config: &ModelConfig) -> Result<(), ConfigError> {
    let mut by_name: HashMap<&str, &EntityConfig> = HashMap::new();
    for e in &config.entities {
        if by_name.insert(e.name.as_str(), e).is_some() {
            return Err(ConfigError::DuplicateEntity(e.name.clone()));
        }
    }

    for e in &config.entities {
        if !e.columns.iter().any(|c| c.primary) {
            return Err(ConfigError::MissingPrimaryKey { entity: e.name.clone() });
        }
        if e.columns.iter().filter(|c| c.delete_date).count() > 1 {
            return Err(ConfigError::Validation(format!(
                "entity {} declares more than one delete-date column",
                e.name
            )));
        }
        if e.max_page_size == Some(0) {
            return Err(ConfigError::Validation(format!("entity {}: max_page_size must be > 0", e.name)));
        }
        for r in &e.relations {
            if !by_name.contains_key(r.target.as_str()) {
                return Err(ConfigError::MissingReference {
                    kind: "relation target",
                    id: format!("{}.{} -> {}", e.name, r.property, r.target),
                });
            }
        }
        let mut aliases = HashSet::new();
        aliases.insert(e.table.clone().unwrap_or_else(|| e.name.clone()));
        validate_populations(&e.populations, e, &by_name, &mut aliases)?;
    }
    Ok(())
}

fn validate_populations(
    populations: &[PopulationConfig],
    parent: &EntityConfig,
    by_name: &HashMap<&str, &EntityConfig>,
    aliases: &mut HashSet<String>,
) -> Result<(), ConfigError> {
    for p in populations {
        let target = match p.kind {
            RelationKind::Relation => {
                let rel = parent
                    .relations
                    .iter()
                    .find(|r| r.property == p.property)
                    .ok_or_else(|| ConfigError::UnknownRelation {
                        entity: parent.name.clone(),
                        property: p.property.clone(),
                    })?;
                rel.target.as_str()
            }
            RelationKind::MapOne | RelationKind::MapMany => {
                if p.on_condition.as_deref().map(str::trim).unwrap_or("").is_empty() {
                    return Err(ConfigError::MissingOnCondition {
                        entity: parent.name.clone(),
                        property: p.property.clone(),
                    });
                }
                p.target.as_deref().ok_or_else(|| ConfigError::MissingReference {
                    kind: "population target",
                    id: format!("{}.{}", parent.name, p.property),
                })?
            }
        };
        let target_entity = by_name.get(target).ok_or_else(|| ConfigError::MissingReference {
            kind: "population target",
            id: target.to_string(),
        })?;
        let alias = p.alias.clone().unwrap_or_else(|| p.property.clone());
        if !aliases.insert(alias.clone()) {
            return Err(ConfigError::Validation(format!(
                "population alias '{}' is used twice under entity {}",
                alias, parent.name
            )));
        }
        validate_populations(&p.populates, target_entity, by_name, aliases)?;
    }
    Ok(())
}
