use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum GateError {
    #[error("I/O error: {0}")]
    #[diagnostic(code(rolegate::io))]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    #[diagnostic(code(rolegate::config))]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(rolegate::serde))]
    Serde(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    #[diagnostic(code(rolegate::db))]
    Db(#[from] sea_orm::DbErr),

    #[error("Password hashing error: {0}")]
    #[diagnostic(code(rolegate::password))]
    Password(String),

    #[error("{0}")]
    #[diagnostic(code(rolegate::other))]
    Other(String),
}

impl From<argon2::password_hash::Error> for GateError {
    fn from(value: argon2::password_hash::Error) -> Self {
        GateError::Password(value.to_string())
    }
}

impl GateError {
    /// True when the underlying database rejected a write on a unique index.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            GateError::Db(err) => matches!(
                err.sql_err(),
                Some(sea_orm::SqlErr::UniqueConstraintViolation(_))
            ),
            _ => false,
        }
    }
}
