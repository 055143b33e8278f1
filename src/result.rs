//! Service result wrapper.
//!
//! Every service operation returns a [`ServiceResult`]. Handlers return it
//! as-is; the `IntoResponse` impls below turn it into the JSON envelope and
//! status code, so an endpoint never builds a response by hand.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::ApiError;
use crate::middleware::response::ApiResponse;

pub type ServiceResult<T> = Result<Success<T>, ServiceError>;

/// Outcome classification shared by successes and failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Ok,
    Created,
    Error,
    Forbidden,
    Unauthorized,
    Invalid,
    NotFound,
    Conflict,
}

impl ResultStatus {
    pub fn http_status(self) -> StatusCode {
        match self {
            ResultStatus::Ok => StatusCode::OK,
            ResultStatus::Created => StatusCode::CREATED,
            ResultStatus::Error => StatusCode::INTERNAL_SERVER_ERROR,
            ResultStatus::Forbidden => StatusCode::FORBIDDEN,
            ResultStatus::Unauthorized => StatusCode::UNAUTHORIZED,
            ResultStatus::Invalid => StatusCode::BAD_REQUEST,
            ResultStatus::NotFound => StatusCode::NOT_FOUND,
            ResultStatus::Conflict => StatusCode::CONFLICT,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Success<T> {
    Ok(T),
    Created(T),
}

impl<T> Success<T> {
    pub fn status(&self) -> ResultStatus {
        match self {
            Success::Ok(_) => ResultStatus::Ok,
            Success::Created(_) => ResultStatus::Created,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Success::Ok(value) | Success::Created(value) => value,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Success<U> {
        match self {
            Success::Ok(value) => Success::Ok(f(value)),
            Success::Created(value) => Success::Created(f(value)),
        }
    }
}

/// Shorthand for `Ok(Success::Ok(value))`.
pub fn ok<T>(value: T) -> ServiceResult<T> {
    Ok(Success::Ok(value))
}

/// Shorthand for `Ok(Success::Created(value))`.
pub fn created<T>(value: T) -> ServiceResult<T> {
    Ok(Success::Created(value))
}

/// A single failed rule on a request field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    Error(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("Validation failed")]
    Invalid(Vec<ValidationError>),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
}

impl ServiceError {
    pub fn status(&self) -> ResultStatus {
        match self {
            ServiceError::Error(_) => ResultStatus::Error,
            ServiceError::Forbidden(_) => ResultStatus::Forbidden,
            ServiceError::Unauthorized(_) => ResultStatus::Unauthorized,
            ServiceError::Invalid(_) => ResultStatus::Invalid,
            ServiceError::NotFound(_) => ResultStatus::NotFound,
            ServiceError::Conflict(_) => ResultStatus::Conflict,
        }
    }

    pub fn not_found(what: &str, id: impl std::fmt::Display) -> Self {
        ServiceError::NotFound(format!("{} '{}' not found", what, id))
    }

    /// One validation error on one field.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ServiceError::Invalid(vec![ValidationError::new(field, message)])
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => ServiceError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                let target = db_err.constraint().unwrap_or("unique constraint");
                ServiceError::Conflict(format!("A record with the same key already exists ({})", target))
            }
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                let target = db_err.constraint().unwrap_or("reference");
                ServiceError::Invalid(vec![ValidationError::new(target, "Referenced record does not exist")])
            }
            sqlx::Error::Database(db_err) if db_err.is_check_violation() => {
                let target = db_err.constraint().unwrap_or("check");
                ServiceError::Invalid(vec![ValidationError::new(target, "Value violates a constraint")])
            }
            _ => {
                tracing::error!("Database error in service call: {}", err);
                ServiceError::Error("An error occurred while processing your request".to_string())
            }
        }
    }
}

impl From<crate::database::DatabaseError> for ServiceError {
    fn from(err: crate::database::DatabaseError) -> Self {
        tracing::error!("Database manager error in service call: {}", err);
        ServiceError::Error("Database temporarily unavailable".to_string())
    }
}

/// Collects validation failures for a request before any query runs.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<ValidationError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(&mut self, field: &str, value: &str) -> &mut Self {
        if value.trim().is_empty() {
            self.errors.push(ValidationError::new(field, "This field is required"));
        }
        self
    }

    pub fn max_len(&mut self, field: &str, value: &str, max: usize) -> &mut Self {
        if value.chars().count() > max {
            self.errors
                .push(ValidationError::new(field, format!("Must be at most {} characters", max)));
        }
        self
    }

    /// Letters, digits, `-` and `_` only.
    pub fn code(&mut self, field: &str, value: &str) -> &mut Self {
        if !value.is_empty() && !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            self.errors.push(ValidationError::new(
                field,
                "May only contain letters, numbers, hyphens and underscores",
            ));
        }
        self
    }

    pub fn email(&mut self, field: &str, value: &str) -> &mut Self {
        let valid = match value.split_once('@') {
            Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
            None => false,
        };
        if !valid {
            self.errors.push(ValidationError::new(field, "Must be a valid email address"));
        }
        self
    }

    pub fn check(&mut self, condition: bool, field: &str, message: &str) -> &mut Self {
        if !condition {
            self.errors.push(ValidationError::new(field, message));
        }
        self
    }

    pub fn push(&mut self, error: ValidationError) -> &mut Self {
        self.errors.push(error);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn finish(&mut self) -> Result<(), ServiceError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::Invalid(std::mem::take(&mut self.errors)))
        }
    }
}

impl<T: Serialize> IntoResponse for Success<T> {
    fn into_response(self) -> Response {
        match self {
            Success::Ok(data) => ApiResponse::success(data).into_response(),
            Success::Created(data) => ApiResponse::created(data).into_response(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_map_to_http_codes() {
        assert_eq!(ResultStatus::Ok.http_status(), StatusCode::OK);
        assert_eq!(ResultStatus::Created.http_status(), StatusCode::CREATED);
        assert_eq!(ResultStatus::Error.http_status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ResultStatus::Forbidden.http_status(), StatusCode::FORBIDDEN);
        assert_eq!(ResultStatus::Unauthorized.http_status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ResultStatus::Invalid.http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(ResultStatus::NotFound.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(ResultStatus::Conflict.http_status(), StatusCode::CONFLICT);
    }

    #[test]
    fn validator_collects_every_failure() {
        let err = Validator::new()
            .required("code", "")
            .required("name", "  ")
            .max_len("description", &"x".repeat(11), 10)
            .email("email", "not-an-email")
            .finish()
            .unwrap_err();

        match err {
            ServiceError::Invalid(errors) => {
                let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(fields, vec!["code", "name", "description", "email"]);
            }
            other => panic!("expected Invalid, got {:?}", other),
        }
    }

    #[test]
    fn validator_passes_clean_input() {
        assert!(Validator::new()
            .required("code", "ACME")
            .code("code", "ACME_01-x")
            .email("email", "ops@acme.io")
            .finish()
            .is_ok());
    }

    #[test]
    fn code_rule_rejects_spaces() {
        assert!(Validator::new().code("code", "has space").finish().is_err());
    }

    #[test]
    fn row_not_found_becomes_not_found() {
        let err = ServiceError::from(sqlx::Error::RowNotFound);
        assert_eq!(err.status(), ResultStatus::NotFound);
    }

    #[test]
    fn success_keeps_status_through_map() {
        let created = Success::Created(2).map(|n| n * 2);
        assert_eq!(created.status(), ResultStatus::Created);
        assert_eq!(created.into_inner(), 4);
    }

    #[tokio::test]
    async fn invalid_result_renders_validation_list() {
        let response = ServiceError::invalid("name", "This field is required").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert_eq!(body["validation_errors"][0]["field"], "name");
    }

    #[tokio::test]
    async fn created_result_renders_201_envelope() {
        let response = Success::Created(serde_json::json!({"id": 1})).into_response();
        assert_eq!(response.status(), StatusCode::CREATED);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["id"], 1);
    }

    #[sqlx::test(migrations = "./migrations/tenant")]
    async fn constraint_violations_map_to_client_errors(pool: sqlx::PgPool) {
        sqlx::query("INSERT INTO clients (code, name) VALUES ('acme', 'Acme')")
            .execute(&pool)
            .await
            .unwrap();

        let duplicate = sqlx::query("INSERT INTO clients (code, name) VALUES ('acme', 'Acme again')")
            .execute(&pool)
            .await
            .unwrap_err();
        let err = ServiceError::from(duplicate);
        assert!(matches!(err, ServiceError::Conflict(ref msg) if msg.contains("clients_code_unique")));

        let dangling = sqlx::query("INSERT INTO projects (client_id, code, name) VALUES ($1, 'invoices', 'Invoices')")
            .bind(uuid::Uuid::new_v4())
            .execute(&pool)
            .await
            .unwrap_err();
        assert_eq!(ServiceError::from(dangling).status(), ResultStatus::Invalid);
    }
}
