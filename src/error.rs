//! Typed errors, backend constraint translation and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("entity {entity} declares no primary key column")]
    MissingPrimaryKey { entity: String },
    #[error("duplicate entity: {0}")]
    DuplicateEntity(String),
    #[error("population {entity}.{property}: computed relations must declare on_condition")]
    MissingOnCondition { entity: String, property: String },
    #[error("population {entity}.{property}: no relation with that property")]
    UnknownRelation { entity: String, property: String },
    #[error("entity {entity} does not declare a delete-date column")]
    SoftDeleteUnsupported { entity: String },
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

/// Backend-neutral classification of executor failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendErrorKind {
    UniqueViolation,
    ForeignKeyViolation,
    NotNullViolation,
    CheckViolation,
    Other,
}

/// Error reported by a `BackendExecutor`.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub constraint: Option<String>,
    pub detail: Option<String>,
    pub message: String,
}

impl BackendError {
    pub fn other(message: impl Into<String>) -> Self {
        BackendError {
            kind: BackendErrorKind::Other,
            constraint: None,
            detail: None,
            message: message.into(),
        }
    }

    pub fn constraint(kind: BackendErrorKind, constraint: &str, detail: &str) -> Self {
        BackendError {
            kind,
            constraint: Some(constraint.to_string()),
            detail: Some(detail.to_string()),
            message: format!("constraint {} violated", constraint),
        }
    }
}

impl From<sqlx::Error> for BackendError {
    fn from(e: sqlx::Error) -> Self {
        let Some(db) = e.as_database_error() else {
            return BackendError::other(e.to_string());
        };
        let kind = match db.kind() {
            sqlx::error::ErrorKind::UniqueViolation => BackendErrorKind::UniqueViolation,
            sqlx::error::ErrorKind::ForeignKeyViolation => BackendErrorKind::ForeignKeyViolation,
            sqlx::error::ErrorKind::NotNullViolation => BackendErrorKind::NotNullViolation,
            sqlx::error::ErrorKind::CheckViolation => BackendErrorKind::CheckViolation,
            _ => BackendErrorKind::Other,
        };
        let detail = db
            .try_downcast_ref::<sqlx::postgres::PgDatabaseError>()
            .and_then(|pg| pg.detail())
            .map(String::from);
        BackendError {
            kind,
            constraint: db.constraint().map(String::from),
            detail,
            message: db.message().to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("Operator {operator} Not Supported")]
    UnsupportedOperator { operator: String },
    #[error("Invalid column {field} value for {operator}: {reason}")]
    InvalidOperand {
        field: String,
        operator: String,
        reason: String,
    },
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unprocessable(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(entity: &str) -> Self {
        AppError::NotFound(format!("{} NOT FOUND", entity.to_uppercase()))
    }

    pub fn invalid_operand(field: &str, operator: &str, reason: impl Into<String>) -> Self {
        AppError::InvalidOperand {
            field: field.to_string(),
            operator: operator.to_string(),
            reason: reason.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::UnsupportedOperator { .. } | AppError::InvalidOperand { .. } => {
                StatusCode::BAD_REQUEST
            }
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Backend(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Constraint name -> domain message lookup, declared with the model.
#[derive(Clone, Debug, Default)]
pub struct ConstraintMessages {
    messages: HashMap<String, String>,
}

impl ConstraintMessages {
    pub fn new(messages: HashMap<String, String>) -> Self {
        ConstraintMessages { messages }
    }

    /// Translate a backend failure: unique -> 409; foreign key to a missing row -> 404;
    /// foreign key still referenced -> 422; anything else stays a backend error.
    pub fn translate(&self, err: BackendError) -> AppError {
        let Some(constraint) = err.constraint.clone() else {
            return AppError::Backend(err);
        };
        let message = |key: &str| self.messages.get(key).cloned();
        match err.kind {
            BackendErrorKind::UniqueViolation => {
                AppError::Conflict(message(&constraint).unwrap_or(constraint))
            }
            BackendErrorKind::ForeignKeyViolation => {
                let detail = err.detail.as_deref().unwrap_or("");
                if detail.contains("is not present in table") {
                    AppError::NotFound(message(&constraint).unwrap_or(constraint))
                } else {
                    let restricted = format!("{}_RESTRICTED_DELETE", constraint);
                    AppError::Unprocessable(
                        message(&restricted)
                            .or_else(|| message(&constraint))
                            .unwrap_or(constraint),
                    )
                }
            }
            _ => AppError::Backend(err),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub status_code: u16,
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Internal failures keep their detail in the logs, not in the response.
        let message = match &self {
            AppError::Config(_) | AppError::Backend(_) | AppError::Internal(_)
                if status.is_server_error() =>
            {
                tracing::error!(error = %self, "request failed");
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        };
        let body = ErrorBody {
            status_code: status.as_u16(),
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages() -> ConstraintMessages {
        let mut m = HashMap::new();
        m.insert("UQ_users_email".to_string(), "Email already registered".to_string());
        m.insert("FK_posts_author".to_string(), "Author does not exist".to_string());
        m.insert(
            "FK_posts_author_RESTRICTED_DELETE".to_string(),
            "User still has posts".to_string(),
        );
        ConstraintMessages::new(m)
    }

    #[test]
    fn test_unique_violation_is_conflict() {
        let err = BackendError::constraint(BackendErrorKind::UniqueViolation, "UQ_users_email", "");
        let app = messages().translate(err);
        assert!(matches!(&app, AppError::Conflict(m) if m == "Email already registered"));
        assert_eq!(app.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_fk_missing_parent_is_not_found() {
        let err = BackendError::constraint(
            BackendErrorKind::ForeignKeyViolation,
            "FK_posts_author",
            "Key (authorId)=(9) is not present in table \"users\".",
        );
        let app = messages().translate(err);
        assert!(matches!(&app, AppError::NotFound(m) if m == "Author does not exist"));
    }

    #[test]
    fn test_fk_still_referenced_is_unprocessable() {
        let err = BackendError::constraint(
            BackendErrorKind::ForeignKeyViolation,
            "FK_posts_author",
            "Key (id)=(1) is still referenced from table \"posts\".",
        );
        let app = messages().translate(err);
        assert!(matches!(&app, AppError::Unprocessable(m) if m == "User still has posts"));
        assert_eq!(app.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_unmapped_constraint_falls_back_to_name() {
        let err = BackendError::constraint(BackendErrorKind::UniqueViolation, "UQ_tags_name", "");
        assert!(matches!(messages().translate(err), AppError::Conflict(m) if m == "UQ_tags_name"));
    }

    #[test]
    fn test_plain_backend_error_stays_internal() {
        let app = messages().translate(BackendError::other("connection reset"));
        assert_eq!(app.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_operator_errors_are_client_errors() {
        let unsupported = AppError::UnsupportedOperator { operator: "$regex".into() };
        assert_eq!(unsupported.status(), StatusCode::BAD_REQUEST);
        assert_eq!(unsupported.to_string(), "Operator $regex Not Supported");
        let arity = AppError::invalid_operand("age", "$between", "expected exactly 2 values");
        assert_eq!(arity.status(), StatusCode::BAD_REQUEST);
        assert!(arity.to_string().contains("age"));
    }
}
