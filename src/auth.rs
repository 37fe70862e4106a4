//! Password login and opaque bearer tokens.

use crate::rbac::errors::RbacError;
use crate::storage::{self, IssuedToken, NewUser, User};
use crate::users;
use axum::http::{header, HeaderMap};
use sea_orm::DatabaseConnection;
use serde::Deserialize;

/// Self-service sign-up. The account starts without any grants.
#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub password_confirmation: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
}

/// Verifies credentials and issues a token valid for `ttl_secs`.
///
/// Unknown emails, wrong passwords and disabled accounts fail identically.
pub async fn login(
    db: &DatabaseConnection,
    email: &str,
    password: &str,
    ttl_secs: i64,
) -> Result<(User, IssuedToken), RbacError> {
    let email = email.trim().to_lowercase();

    let Some(user) = storage::verify_user_password(db, &email, password).await? else {
        tracing::warn!(email = %email, "Rejected login");
        return Err(RbacError::Unauthenticated("invalid credentials".into()));
    };

    let token = storage::issue_access_token(db, &user.id, ttl_secs).await?;
    tracing::info!(user_id = %user.id, expires_at = token.expires_at, "Issued access token");
    Ok((user, token))
}

/// Creates an account and signs it in.
///
/// When a confirmation is supplied it must equal the password.
pub async fn register(
    db: &DatabaseConnection,
    registration: Registration,
    ttl_secs: i64,
) -> Result<(User, IssuedToken), RbacError> {
    if let Some(confirmation) = &registration.password_confirmation {
        if *confirmation != registration.password {
            return Err(RbacError::InvalidInput(
                "password does not match password confirmation".into(),
            ));
        }
    }

    let user = users::create_user(
        db,
        NewUser {
            email: registration.email,
            password: registration.password,
            full_name: registration.full_name,
            roles: Vec::new(),
            permissions: Vec::new(),
        },
    )
    .await?;

    let token = storage::issue_access_token(db, &user.id, ttl_secs).await?;
    tracing::info!(user_id = %user.id, "Registered user");
    Ok((user, token))
}

/// Resolves a live token to an enabled user.
pub async fn authenticate(db: &DatabaseConnection, token: &str) -> Result<User, RbacError> {
    let Some(access) = storage::get_access_token(db, token).await? else {
        return Err(RbacError::Unauthenticated("invalid or expired token".into()));
    };

    match storage::get_user(db, &access.user_id).await? {
        Some(user) if user.enabled => Ok(user),
        _ => Err(RbacError::Unauthenticated("account unavailable".into())),
    }
}

pub async fn logout(db: &DatabaseConnection, token: &str) -> Result<(), RbacError> {
    if !storage::revoke_access_token(db, token).await? {
        return Err(RbacError::Unauthenticated("invalid token".into()));
    }
    tracing::info!("Revoked access token");
    Ok(())
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
