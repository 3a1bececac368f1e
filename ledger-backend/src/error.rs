// src/error.rs

use crate::domain::integrity::RuleViolation;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::DbErr;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use thiserror::Error;
use validator::ValidationErrors;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    DbErr(#[from] DbErr),

    #[error("Item not found: {0}")]
    NotFound(String),

    /// 参照先（会社など）が存在しない。書き込み前に検出される
    #[error("Referenced entity not found: {0}")]
    ReferenceNotFound(String),

    #[error("Invalid argument `{field}`: {message}")]
    InvalidArgument { field: String, message: String },

    #[error("Insufficient units: requested {requested}, available {available}")]
    InsufficientUnits { requested: i64, available: i64 },

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error(
        "Refund exceeds payment: amount {payment_amount}, already refunded {already_refunded}, requested {requested}"
    )]
    RefundExceedsPayment {
        payment_amount: i64,
        already_refunded: i64,
        requested: i64,
    },

    #[error("Schema rules violated by {} document(s)", .0.len())]
    SchemaRuleViolation(Vec<RuleViolation>),

    #[error("Validation failed")]
    ValidationFailure(#[from] ValidationErrors),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

impl AppError {
    pub fn invalid_argument(field: &str, message: impl Into<String>) -> Self {
        AppError::InvalidArgument {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::DbErr(_) => "database_error",
            AppError::NotFound(_) => "not_found",
            AppError::ReferenceNotFound(_) => "reference_not_found",
            AppError::InvalidArgument { .. } => "invalid_argument",
            AppError::InsufficientUnits { .. } => "insufficient_units",
            AppError::InvalidTransition { .. } => "invalid_transition",
            AppError::RefundExceedsPayment { .. } => "refund_exceeds_payment",
            AppError::SchemaRuleViolation(_) => "schema_rule_violation",
            AppError::ValidationFailure(_) => "validation_errors",
            AppError::BadRequest(_) => "bad_request",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Conflict(_) => "conflict",
            AppError::InternalServerError(_) => "internal_server_error",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::DbErr(DbErr::RecordNotFound(_)) => StatusCode::NOT_FOUND,
            AppError::DbErr(_) | AppError::InternalServerError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ReferenceNotFound(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::InvalidArgument { .. }
            | AppError::ValidationFailure(_)
            | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::InsufficientUnits { .. }
            | AppError::InvalidTransition { .. }
            | AppError::RefundExceedsPayment { .. }
            | AppError::SchemaRuleViolation(_)
            | AppError::Conflict(_) => StatusCode::CONFLICT,
        }
    }
}

// axum でエラーをHTTPレスポンスに変換するための実装
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_type = self.error_type().to_string();

        let (message, details, validation_errors) = match &self {
            AppError::DbErr(db_err) => {
                tracing::error!(error = ?db_err, "Database error"); // サーバーログには詳細を出す
                let details = match db_err {
                    DbErr::RecordNotFound(entity) => Some(json!({ "entity": entity })),
                    DbErr::Exec(_) => Some(json!({ "operation": "exec" })),
                    DbErr::Query(_) => Some(json!({ "operation": "query" })),
                    _ => None,
                };
                ("A database error occurred".to_string(), details, None)
            }
            AppError::InternalServerError(message) => {
                tracing::error!(%message, "Internal server error");
                ("An internal server error occurred".to_string(), None, None)
            }
            AppError::InvalidArgument { field, message } => (
                self.to_string(),
                Some(json!({ "field": field, "constraint": message })),
                None,
            ),
            AppError::InsufficientUnits {
                requested,
                available,
            } => (
                self.to_string(),
                Some(json!({ "requested": requested, "available": available })),
                None,
            ),
            AppError::InvalidTransition { from, to } => (
                self.to_string(),
                Some(json!({ "from": from, "to": to })),
                None,
            ),
            AppError::RefundExceedsPayment {
                payment_amount,
                already_refunded,
                requested,
            } => (
                self.to_string(),
                Some(json!({
                    "payment_amount": payment_amount,
                    "already_refunded": already_refunded,
                    "requested": requested,
                })),
                None,
            ),
            AppError::SchemaRuleViolation(violations) => (
                self.to_string(),
                Some(json!({ "violations": violations })),
                None,
            ),
            AppError::ValidationFailure(errors) => {
                let field_errors: HashMap<String, Vec<String>> = errors
                    .field_errors()
                    .into_iter()
                    .map(|(field, errors)| {
                        let messages = errors
                            .iter()
                            .map(|e| {
                                e.message
                                    .as_ref()
                                    .map_or_else(|| e.code.to_string(), |m| m.to_string())
                            })
                            .collect();
                        (field.to_string(), messages)
                    })
                    .collect();
                ("Validation failed".to_string(), None, Some(field_errors))
            }
            AppError::NotFound(message)
            | AppError::ReferenceNotFound(message)
            | AppError::BadRequest(message)
            | AppError::Unauthorized(message)
            | AppError::Conflict(message) => (message.clone(), None, None),
        };

        let body = ErrorResponse {
            success: false,
            error: message.clone(),
            message,
            details,
            validation_errors,
            error_type,
        };

        (status, Json(body)).into_response()
    }
}

// Result 型のエイリアス
pub type AppResult<T> = Result<T, AppError>;

/// 統一的なエラーレスポンス構造
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_errors: Option<HashMap<String, Vec<String>>>,
    pub error_type: String,
}
