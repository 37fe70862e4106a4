use crate::errors::GateError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use miette::Diagnostic;
use serde_json::json;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Permission,
    Role,
    User,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntityKind::Permission => "permission",
            EntityKind::Role => "role",
            EntityKind::User => "user",
        })
    }
}

/// Why an authorization gate refused a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    /// The checked permission code is not in the catalog (misconfiguration).
    UnknownPermission(String),
    MissingPermission(String),
    /// The checked role name does not exist (misconfiguration).
    UnknownRole(String),
    MissingRole(String),
}

impl Denial {
    pub fn is_misconfiguration(&self) -> bool {
        matches!(self, Denial::UnknownPermission(_) | Denial::UnknownRole(_))
    }
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Denial::UnknownPermission(code) => write!(f, "unknown permission `{code}`"),
            Denial::MissingPermission(code) => write!(f, "missing permission `{code}`"),
            Denial::UnknownRole(name) => write!(f, "unknown role `{name}`"),
            Denial::MissingRole(name) => write!(f, "missing role `{name}`"),
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum RbacError {
    #[error("{kind} `{key}` already exists")]
    #[diagnostic(
        code(rolegate::rbac::conflict),
        help("Permission codes, role names and user emails must be unique")
    )]
    Conflict { kind: EntityKind, key: String },

    #[error("{kind} `{key}` not found")]
    #[diagnostic(code(rolegate::rbac::not_found))]
    NotFound { kind: EntityKind, key: String },

    #[error("{kind} `{key}` does not exist")]
    #[diagnostic(
        code(rolegate::rbac::missing_reference),
        help("Create the referenced entry first")
    )]
    MissingReference { kind: EntityKind, key: String },

    #[error("Invalid role inheritance: {0}")]
    #[diagnostic(
        code(rolegate::rbac::invalid_graph),
        help("A role may not inherit itself, directly or through other roles")
    )]
    InvalidGraph(String),

    #[error("Invalid input: {0}")]
    #[diagnostic(code(rolegate::rbac::invalid_input))]
    InvalidInput(String),

    #[error("Forbidden: {0}")]
    #[diagnostic(code(rolegate::rbac::forbidden))]
    Forbidden(Denial),

    #[error("Unauthenticated: {0}")]
    #[diagnostic(
        code(rolegate::rbac::unauthenticated),
        help("Send `Authorization: Bearer <token>` with a token from POST /auth/token")
    )]
    Unauthenticated(String),

    #[error(transparent)]
    #[diagnostic(code(rolegate::rbac::unexpected))]
    Unexpected(#[from] GateError),
}

impl From<sea_orm::DbErr> for RbacError {
    fn from(value: sea_orm::DbErr) -> Self {
        RbacError::Unexpected(GateError::Db(value))
    }
}

impl RbacError {
    pub fn not_found(kind: EntityKind, key: impl Into<String>) -> Self {
        RbacError::NotFound {
            kind,
            key: key.into(),
        }
    }

    pub fn missing(kind: EntityKind, key: impl Into<String>) -> Self {
        RbacError::MissingReference {
            kind,
            key: key.into(),
        }
    }

    pub fn conflict(kind: EntityKind, key: impl Into<String>) -> Self {
        RbacError::Conflict {
            kind,
            key: key.into(),
        }
    }

    /// Both a missing request target and a dangling reference in the payload.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RbacError::NotFound { .. } | RbacError::MissingReference { .. }
        )
    }

    fn kind(&self) -> &'static str {
        match self {
            RbacError::Conflict { .. } => "conflict",
            RbacError::NotFound { .. } => "not_found",
            RbacError::MissingReference { .. } => "not_found",
            RbacError::InvalidGraph(_) => "invalid_graph",
            RbacError::InvalidInput(_) => "invalid_request",
            RbacError::Forbidden(_) => "forbidden",
            RbacError::Unauthenticated(_) => "unauthenticated",
            RbacError::Unexpected(_) => "server_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RbacError::Conflict { .. }
            | RbacError::MissingReference { .. }
            | RbacError::InvalidGraph(_)
            | RbacError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            RbacError::NotFound { .. } => StatusCode::NOT_FOUND,
            RbacError::Forbidden(_) => StatusCode::FORBIDDEN,
            RbacError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            RbacError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RbacError {
    fn into_response(self) -> Response {
        let status = self.status();
        let description = match &self {
            RbacError::Unexpected(err) => {
                tracing::error!(error = %err, "Request failed");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        let body = json!({ "error": self.kind(), "error_description": description });
        (status, Json(body)).into_response()
    }
}
