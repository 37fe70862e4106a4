//! User accounts and their direct role and permission grants.

use crate::rbac::errors::{EntityKind, RbacError};
use crate::rbac::manage::{ensure_permissions_exist, ensure_roles_exist};
use crate::rbac::types::unique_in_order;
use crate::storage::{self, NewUser, User, UserPatch};
use sea_orm::DatabaseConnection;

pub const DEFAULT_PAGE_SIZE: u64 = 100;
pub const MAX_PAGE_SIZE: u64 = 500;

fn validate_email(email: &str) -> Result<String, RbacError> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(RbacError::InvalidInput(format!(
            "`{email}` is not a valid email address"
        ))),
    }
}

fn validate_password(password: &str) -> Result<(), RbacError> {
    if password.is_empty() {
        return Err(RbacError::InvalidInput("password must not be empty".into()));
    }
    Ok(())
}

pub async fn create_user(db: &DatabaseConnection, input: NewUser) -> Result<User, RbacError> {
    let email = validate_email(&input.email)?;
    validate_password(&input.password)?;

    if storage::get_user_by_email(db, &email).await?.is_some() {
        return Err(RbacError::conflict(EntityKind::User, email));
    }

    let roles = unique_in_order(input.roles);
    ensure_roles_exist(db, &roles).await?;
    let permissions = unique_in_order(input.permissions);
    ensure_permissions_exist(db, &permissions).await?;

    let user = storage::create_user(
        db,
        NewUser {
            email: email.clone(),
            password: input.password,
            full_name: input.full_name,
            roles,
            permissions,
        },
    )
    .await
    .map_err(|e| {
        if e.is_unique_violation() {
            RbacError::conflict(EntityKind::User, email.as_str())
        } else {
            RbacError::Unexpected(e)
        }
    })?;

    tracing::info!(user_id = %user.id, email = %user.email, roles = ?user.roles, "Created user");
    Ok(user)
}

pub async fn get_user(db: &DatabaseConnection, id: &str) -> Result<User, RbacError> {
    storage::get_user(db, id)
        .await?
        .ok_or_else(|| RbacError::not_found(EntityKind::User, id))
}

pub async fn get_user_by_email(db: &DatabaseConnection, email: &str) -> Result<User, RbacError> {
    let email = email.trim().to_lowercase();
    storage::get_user_by_email(db, &email)
        .await?
        .ok_or_else(|| RbacError::not_found(EntityKind::User, email))
}

/// `limit` is clamped to `1..=MAX_PAGE_SIZE`.
pub async fn list_users(
    db: &DatabaseConnection,
    skip: u64,
    limit: u64,
) -> Result<Vec<User>, RbacError> {
    let limit = limit.clamp(1, MAX_PAGE_SIZE);
    Ok(storage::list_users(db, skip, limit).await?)
}

pub async fn update_user(
    db: &DatabaseConnection,
    id: &str,
    patch: UserPatch,
) -> Result<User, RbacError> {
    let current = get_user(db, id).await?;

    let email = match &patch.email {
        Some(email) => {
            let email = validate_email(email)?;
            if let Some(existing) = storage::get_user_by_email(db, &email).await? {
                if existing.id != current.id {
                    return Err(RbacError::conflict(EntityKind::User, email));
                }
            }
            Some(email)
        }
        None => None,
    };

    if let Some(password) = &patch.password {
        validate_password(password)?;
    }

    let roles = patch.roles.map(unique_in_order);
    if let Some(list) = &roles {
        ensure_roles_exist(db, list).await?;
    }
    let permissions = patch.permissions.map(unique_in_order);
    if let Some(list) = &permissions {
        ensure_permissions_exist(db, list).await?;
    }

    let patch = UserPatch {
        email,
        password: patch.password,
        full_name: patch.full_name,
        roles,
        permissions,
        enabled: patch.enabled,
    };

    let user = storage::update_user(db, id, &patch)
        .await
        .map_err(|e| {
            if e.is_unique_violation() {
                RbacError::conflict(EntityKind::User, patch.email.clone().unwrap_or_default())
            } else {
                RbacError::Unexpected(e)
            }
        })?
        .ok_or_else(|| RbacError::not_found(EntityKind::User, id))?;

    tracing::info!(user_id = %user.id, "Updated user");
    Ok(user)
}

async fn store_grants(db: &DatabaseConnection, id: &str, patch: UserPatch) -> Result<User, RbacError> {
    storage::update_user(db, id, &patch)
        .await?
        .ok_or_else(|| RbacError::not_found(EntityKind::User, id))
}

/// Adds `names` to the user's direct roles. Roles already held are ignored.
pub async fn add_roles_to_user(
    db: &DatabaseConnection,
    id: &str,
    names: &[String],
) -> Result<User, RbacError> {
    let user = get_user(db, id).await?;
    ensure_roles_exist(db, names).await?;

    let merged = unique_in_order(user.roles.iter().chain(names).cloned());
    if merged.len() == user.roles.len() {
        return Ok(user);
    }

    let user = store_grants(
        db,
        id,
        UserPatch {
            roles: Some(merged),
            ..Default::default()
        },
    )
    .await?;
    tracing::info!(user_id = %user.id, added = ?names, "Granted roles to user");
    Ok(user)
}

/// Removes `names` from the user's direct roles. Names not held are ignored.
pub async fn remove_roles_from_user(
    db: &DatabaseConnection,
    id: &str,
    names: &[String],
) -> Result<User, RbacError> {
    let user = get_user(db, id).await?;

    let remaining: Vec<String> = user
        .roles
        .iter()
        .filter(|name| !names.contains(*name))
        .cloned()
        .collect();
    if remaining.len() == user.roles.len() {
        return Ok(user);
    }

    let user = store_grants(
        db,
        id,
        UserPatch {
            roles: Some(remaining),
            ..Default::default()
        },
    )
    .await?;
    tracing::info!(user_id = %user.id, removed = ?names, "Revoked roles from user");
    Ok(user)
}

/// Adds `codes` to the user's direct permissions. Codes already held are ignored.
pub async fn add_permissions_to_user(
    db: &DatabaseConnection,
    id: &str,
    codes: &[String],
) -> Result<User, RbacError> {
    let user = get_user(db, id).await?;
    ensure_permissions_exist(db, codes).await?;

    let merged = unique_in_order(user.permissions.iter().chain(codes).cloned());
    if merged.len() == user.permissions.len() {
        return Ok(user);
    }

    let user = store_grants(
        db,
        id,
        UserPatch {
            permissions: Some(merged),
            ..Default::default()
        },
    )
    .await?;
    tracing::info!(user_id = %user.id, added = ?codes, "Granted permissions to user");
    Ok(user)
}

pub async fn remove_permissions_from_user(
    db: &DatabaseConnection,
    id: &str,
    codes: &[String],
) -> Result<User, RbacError> {
    let user = get_user(db, id).await?;

    let remaining: Vec<String> = user
        .permissions
        .iter()
        .filter(|code| !codes.contains(*code))
        .cloned()
        .collect();
    if remaining.len() == user.permissions.len() {
        return Ok(user);
    }

    let user = store_grants(
        db,
        id,
        UserPatch {
            permissions: Some(remaining),
            ..Default::default()
        },
    )
    .await?;
    tracing::info!(user_id = %user.id, removed = ?codes, "Revoked permissions from user");
    Ok(user)
}

pub async fn delete_user(db: &DatabaseConnection, id: &str) -> Result<(), RbacError> {
    if !storage::delete_user(db, id).await? {
        return Err(RbacError::not_found(EntityKind::User, id));
    }
    tracing::info!(user_id = %id, "Deleted user");
    Ok(())
}
