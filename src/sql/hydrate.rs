//! Fold flat, labelled result rows back into nested JSON objects.

use crate::config::ResolvedEntity;
use serde_json::{Map, Value};

/// Output shape of one alias: which labels become which properties.
#[derive(Clone, Debug, Default)]
pub struct Shape {
    /// (label, property)
    pub columns: Vec<(String, String)>,
    /// Labels identifying a row of this alias (primary key).
    pub keys: Vec<String>,
    pub children: Vec<Nested>,
}

#[derive(Clone, Debug)]
pub struct Nested {
    pub property: String,
    pub many: bool,
    pub shape: Shape,
}

struct Node {
    fields: Map<String, Value>,
    slots: Vec<Slot>,
}

enum Slot {
    One(Option<(String, Node)>),
    Many(Vec<(String, Node)>),
}

impl Shape {
    /// Identity of the row for this alias; `None` when every key is null (no joined row).
    fn identity(&self, row: &Map<String, Value>) -> Option<String> {
        let values: Vec<&Value> = self.keys.iter().map(|k| row.get(k).unwrap_or(&Value::Null)).collect();
        if values.iter().all(|v| v.is_null()) {
            return None;
        }
        Some(values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join("\u{1f}"))
    }

    fn node(&self, row: &Map<String, Value>) -> Node {
        let fields = self
            .columns
            .iter()
            .map(|(label, property)| (property.clone(), row.get(label).cloned().unwrap_or(Value::Null)))
            .collect();
        let slots = self
            .children
            .iter()
            .map(|c| if c.many { Slot::Many(Vec::new()) } else { Slot::One(None) })
            .collect();
        Node { fields, slots }
    }

    fn absorb(&self, node: &mut Node, row: &Map<String, Value>) {
        for (child, slot) in self.children.iter().zip(node.slots.iter_mut()) {
            let Some(id) = child.shape.identity(row) else {
                continue;
            };
            let entry = match slot {
                Slot::One(existing) => existing.get_or_insert_with(|| (id.clone(), child.shape.node(row))),
                Slot::Many(items) => match items.iter().position(|(k, _)| *k == id) {
                    Some(i) => &mut items[i],
                    None => {
                        items.push((id, child.shape.node(row)));
                        let last = items.len() - 1;
                        &mut items[last]
                    }
                },
            };
            child.shape.absorb(&mut entry.1, row);
        }
    }

    fn finish(&self, node: Node) -> Value {
        let mut fields = node.fields;
        for (child, slot) in self.children.iter().zip(node.slots) {
            let value = match slot {
                Slot::One(None) => Value::Null,
                Slot::One(Some((_, n))) => child.shape.finish(n),
                Slot::Many(items) => Value::Array(items.into_iter().map(|(_, n)| child.shape.finish(n)).collect()),
            };
            fields.insert(child.property.clone(), value);
        }
        Value::Object(fields)
    }
}

/// Roots are deduplicated by key in first-seen order; joined rows attach below them.
pub fn hydrate(rows: &[Map<String, Value>], shape: &Shape) -> Vec<Value> {
    let mut roots: Vec<(String, Node)> = Vec::new();
    for row in rows {
        let id = shape.identity(row).unwrap_or_default();
        let index = match roots.iter().position(|(k, _)| *k == id) {
            Some(i) => i,
            None => {
                roots.push((id, shape.node(row)));
                roots.len() - 1
            }
        };
        shape.absorb(&mut roots[index].1, row);
    }
    roots.into_iter().map(|(_, n)| shape.finish(n)).collect()
}

/// Map a `RETURNING *` row (column names) to API properties, dropping hidden columns.
pub fn entity_row(entity: &ResolvedEntity, row: &Map<String, Value>) -> Value {
    let mut out = Map::new();
    for c in entity.visible_columns() {
        if let Some(v) = row.get(&c.name) {
            out.insert(c.property.clone(), v.clone());
        }
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::model;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn row(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    fn user_shape() -> Shape {
        Shape {
            columns: vec![
                ("users__id".into(), "id".into()),
                ("users__firstName".into(), "firstName".into()),
            ],
            keys: vec!["users__id".into()],
            children: vec![
                Nested {
                    property: "profile".into(),
                    many: false,
                    shape: Shape {
                        columns: vec![("profile__id".into(), "id".into()), ("profile__bio".into(), "bio".into())],
                        keys: vec!["profile__id".into()],
                        children: vec![],
                    },
                },
                Nested {
                    property: "tags".into(),
                    many: true,
                    shape: Shape {
                        columns: vec![("tags__id".into(), "id".into()), ("tags__name".into(), "name".into())],
                        keys: vec!["tags__id".into()],
                        children: vec![Nested {
                            property: "category".into(),
                            many: false,
                            shape: Shape {
                                columns: vec![("tag_categories__id".into(), "id".into())],
                                keys: vec!["tag_categories__id".into()],
                                children: vec![],
                            },
                        }],
                    },
                },
            ],
        }
    }

    #[test]
    fn test_rows_fold_into_nested_objects() {
        let rows = vec![
            row(json!({"users__id": 2, "users__firstName": "Ann", "profile__id": 7, "profile__bio": "hi",
                       "tags__id": 1, "tags__name": "rust", "tag_categories__id": 3})),
            row(json!({"users__id": 2, "users__firstName": "Ann", "profile__id": 7, "profile__bio": "hi",
                       "tags__id": 4, "tags__name": "sql", "tag_categories__id": null})),
            row(json!({"users__id": 2, "users__firstName": "Ann", "profile__id": 7, "profile__bio": "hi",
                       "tags__id": 1, "tags__name": "rust", "tag_categories__id": 3})),
            row(json!({"users__id": 1, "users__firstName": "Bo", "profile__id": null, "profile__bio": null,
                       "tags__id": null, "tags__name": null, "tag_categories__id": null})),
        ];
        let out = hydrate(&rows, &user_shape());
        assert_eq!(
            out,
            vec![
                json!({"id": 2, "firstName": "Ann", "profile": {"id": 7, "bio": "hi"}, "tags": [
                    {"id": 1, "name": "rust", "category": {"id": 3}},
                    {"id": 4, "name": "sql", "category": null}
                ]}),
                json!({"id": 1, "firstName": "Bo", "profile": null, "tags": []}),
            ]
        );
    }

    #[test]
    fn test_entity_row_drops_hidden_and_renames() {
        let m = model();
        let users = m.entity("users").unwrap();
        let out = entity_row(users, &row(json!({"id": 1, "firstName": "Ann", "password": "x"})));
        assert_eq!(out, json!({"id": 1, "firstName": "Ann"}));

        let posts = m.entity("posts").unwrap();
        let out = entity_row(posts, &row(json!({"id": 1, "author_id": 2})));
        assert_eq!(out, json!({"id": 1, "authorId": 2}));
    }
}
