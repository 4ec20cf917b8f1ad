//! Shared fixtures for unit tests: a small users/posts/tags model.

use crate::config::{resolve, ModelConfig, ResolvedModel};
use serde_json::json;

pub(crate) fn model_config() -> ModelConfig {
    serde_json::from_value(json!({
        "entities": [
            {
                "name": "users",
                "columns": [
                    {"name": "id", "primary": true, "has_default": true},
                    {"name": "firstName"},
                    {"name": "lastName"},
                    {"name": "email"},
                    {"name": "age"},
                    {"name": "loginCount", "has_default": true},
                    {"name": "password", "hidden": true},
                    {"name": "address.city"},
                    {"name": "deletedAt", "type": "timestamptz", "delete_date": true}
                ],
                "relations": [
                    {"property": "posts", "target": "posts", "cardinality": "many",
                     "local_column": "id", "foreign_column": "author_id"},
                    {"property": "tags", "target": "tags", "cardinality": "many",
                     "local_column": "id", "foreign_column": "id",
                     "through": {"table": "user_tags", "source_column": "userId", "target_column": "tagId"}},
                    {"property": "profile", "target": "profiles", "cardinality": "one",
                     "local_column": "id", "foreign_column": "userId"}
                ],
                "populations": [
                    {"property": "tags", "type": "relation", "populates": [
                        {"property": "category", "type": "mapOne", "target": "tag_categories",
                         "alias": "tag_categories",
                         "on_condition": "\"tag_categories\".\"id\" = \"tags\".\"categoryId\""}
                    ]},
                    {"property": "profile", "type": "relation", "eager": true},
                    {"property": "posts", "type": "relation"},
                    {"property": "badges", "type": "mapMany", "target": "tags",
                     "on_condition": "\"badges\".\"ownerId\" = \"users\".\"id\""}
                ],
                "max_page_size": 50,
                "allowed_search_fields": ["firstName", "lastName", "email"]
            },
            {
                "name": "posts",
                "column_naming": "snake_case",
                "columns": [
                    {"name": "id", "primary": true, "has_default": true},
                    {"name": "author_id"},
                    {"name": "title"},
                    {"name": "published_at", "type": "timestamptz"}
                ],
                "relations": [
                    {"property": "author", "target": "users", "cardinality": "one",
                     "local_column": "author_id", "foreign_column": "id"}
                ],
                "populations": [
                    {"property": "author", "type": "relation", "required": true}
                ],
                "default_sort": {"published_at": "DESC", "id": "ASC"}
            },
            {
                "name": "tags",
                "columns": [
                    {"name": "id", "primary": true},
                    {"name": "name"},
                    {"name": "categoryId"},
                    {"name": "ownerId"}
                ]
            },
            {
                "name": "tag_categories",
                "columns": [
                    {"name": "id", "primary": true},
                    {"name": "label"}
                ]
            },
            {
                "name": "profiles",
                "table": "user_profiles",
                "columns": [
                    {"name": "id", "primary": true},
                    {"name": "userId"},
                    {"name": "bio"}
                ]
            },
            {
                "name": "memberships",
                "columns": [
                    {"name": "userId", "primary": true},
                    {"name": "groupId", "primary": true},
                    {"name": "role"}
                ]
            },
            {
                "name": "invoices",
                "columns": [
                    {"name": "id", "type": "int8", "primary": true, "has_default": true},
                    {"name": "total", "type": "numeric(12,2)"},
                    {"name": "status", "type": "billing.invoice_status"}
                ]
            }
        ],
        "constraint_messages": {
            "UQ_users_email": "Email already registered"
        }
    }))
    .expect("fixture model deserializes")
}

pub(crate) fn model() -> ResolvedModel {
    resolve(&model_config()).expect("fixture model resolves")
}
