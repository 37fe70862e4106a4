//! Validated mutations of the permission catalog and the role graph.
//!
//! Every operation checks all of its preconditions before the first write,
//! so a rejected call leaves the store untouched. Deletions never cascade:
//! roles and users keep listing deleted names and codes, and the resolver
//! skips them.

use crate::rbac::errors::{EntityKind, RbacError};
use crate::rbac::resolver::would_create_cycle;
use crate::rbac::store::{PermissionCatalog, RoleGraphStore};
use crate::rbac::types::unique_in_order;
use crate::storage::{NewRole, Permission, PermissionPatch, Role, RolePatch};
use std::collections::HashSet;

fn require_non_empty(what: &str, value: &str) -> Result<(), RbacError> {
    if value.trim().is_empty() {
        return Err(RbacError::InvalidInput(format!("{what} must not be empty")));
    }
    Ok(())
}

/// Fails with a missing reference for the first code not in the catalog.
pub(crate) async fn ensure_permissions_exist<S>(store: &S, codes: &[String]) -> Result<(), RbacError>
where
    S: PermissionCatalog + ?Sized,
{
    for code in codes {
        require_non_empty("permission code", code)?;
    }

    let known: HashSet<String> = store
        .find_permissions_by_codes(codes)
        .await?
        .into_iter()
        .map(|p| p.code)
        .collect();

    match codes.iter().find(|code| !known.contains(*code)) {
        Some(code) => Err(RbacError::missing(EntityKind::Permission, code.as_str())),
        None => Ok(()),
    }
}

/// Fails with a missing reference for the first name not in the role store.
pub(crate) async fn ensure_roles_exist<S>(store: &S, names: &[String]) -> Result<(), RbacError>
where
    S: RoleGraphStore + ?Sized,
{
    for name in names {
        require_non_empty("role name", name)?;
    }

    let known: HashSet<String> = store
        .find_roles_by_names(names)
        .await?
        .into_iter()
        .map(|r| r.name)
        .collect();

    match names.iter().find(|name| !known.contains(*name)) {
        Some(name) => Err(RbacError::missing(EntityKind::Role, name.as_str())),
        None => Ok(()),
    }
}

/// Trims and de-duplicates role names taken from a request.
fn role_names(names: Vec<String>) -> Vec<String> {
    unique_in_order(names.into_iter().map(|name| name.trim().to_string()))
}

/// Checks that `role` may inherit every entry of `inherited`.
async fn validate_inheritance<S>(store: &S, role: &str, inherited: &[String]) -> Result<(), RbacError>
where
    S: RoleGraphStore + ?Sized,
{
    for parent in inherited {
        require_non_empty("inherited role name", parent)?;

        if parent == role {
            return Err(RbacError::InvalidGraph(format!(
                "role `{role}` cannot inherit itself"
            )));
        }

        if store.find_role_by_name(parent).await?.is_none() {
            return Err(RbacError::missing(EntityKind::Role, parent.as_str()));
        }

        if would_create_cycle(store, parent, role).await? {
            return Err(RbacError::InvalidGraph(format!(
                "role `{role}` inheriting `{parent}` would create a cycle"
            )));
        }
    }

    Ok(())
}

/// Cycle checks for a renamed role's kept parents.
///
/// Unlike `validate_inheritance`, a parent that has since been deleted is
/// skipped rather than rejected.
async fn recheck_renamed_inheritance<S>(
    store: &S,
    role: &str,
    inherited: &[String],
) -> Result<(), RbacError>
where
    S: RoleGraphStore + ?Sized,
{
    for parent in inherited {
        if parent == role {
            return Err(RbacError::InvalidGraph(format!(
                "role `{role}` cannot inherit itself"
            )));
        }

        if store.find_role_by_name(parent).await?.is_none() {
            continue;
        }

        if would_create_cycle(store, parent, role).await? {
            return Err(RbacError::InvalidGraph(format!(
                "role `{role}` inheriting `{parent}` would create a cycle"
            )));
        }
    }

    Ok(())
}

async fn load_role<S>(store: &S, id: &str) -> Result<Role, RbacError>
where
    S: RoleGraphStore + ?Sized,
{
    store
        .find_role(id)
        .await?
        .ok_or_else(|| RbacError::not_found(EntityKind::Role, id))
}

// Permissions

pub async fn create_permission<S>(
    store: &S,
    code: &str,
    description: &str,
) -> Result<Permission, RbacError>
where
    S: PermissionCatalog + ?Sized,
{
    require_non_empty("permission code", code)?;

    let permission = store.create_permission(code, description).await?;
    tracing::info!(code = %permission.code, id = %permission.id, "Created permission");
    Ok(permission)
}

pub async fn get_permission<S>(store: &S, id: &str) -> Result<Permission, RbacError>
where
    S: PermissionCatalog + ?Sized,
{
    store
        .find_permission(id)
        .await?
        .ok_or_else(|| RbacError::not_found(EntityKind::Permission, id))
}

pub async fn get_permission_by_code<S>(store: &S, code: &str) -> Result<Permission, RbacError>
where
    S: PermissionCatalog + ?Sized,
{
    store
        .find_permission_by_code(code)
        .await?
        .ok_or_else(|| RbacError::not_found(EntityKind::Permission, code))
}

pub async fn list_permissions<S>(store: &S) -> Result<Vec<Permission>, RbacError>
where
    S: PermissionCatalog + ?Sized,
{
    store.list_permissions().await
}

pub async fn update_permission<S>(
    store: &S,
    id: &str,
    patch: PermissionPatch,
) -> Result<Permission, RbacError>
where
    S: PermissionCatalog + ?Sized,
{
    if let Some(code) = &patch.code {
        require_non_empty("permission code", code)?;
    }

    let permission = store.update_permission(id, &patch).await?;
    tracing::info!(code = %permission.code, id = %permission.id, "Updated permission");
    Ok(permission)
}

pub async fn delete_permission<S>(store: &S, id: &str) -> Result<(), RbacError>
where
    S: PermissionCatalog + ?Sized,
{
    if !store.delete_permission(id).await? {
        return Err(RbacError::not_found(EntityKind::Permission, id));
    }
    tracing::info!(id = %id, "Deleted permission");
    Ok(())
}

pub async fn delete_all_permissions<S>(store: &S) -> Result<u64, RbacError>
where
    S: PermissionCatalog + ?Sized,
{
    let deleted = store.delete_all_permissions().await?;
    tracing::info!(deleted, "Deleted all permissions");
    Ok(deleted)
}

// Roles

pub async fn create_role<S>(store: &S, input: NewRole) -> Result<Role, RbacError>
where
    S: PermissionCatalog + RoleGraphStore + ?Sized,
{
    let name = input.name.trim().to_string();
    require_non_empty("role name", &name)?;

    if store.find_role_by_name(&name).await?.is_some() {
        return Err(RbacError::conflict(EntityKind::Role, name));
    }

    let inherited_roles = role_names(input.inherited_roles);
    validate_inheritance(store, &name, &inherited_roles).await?;

    let permissions = unique_in_order(input.permissions);
    ensure_permissions_exist(store, &permissions).await?;

    let role = store
        .create_role(NewRole {
            name,
            description: input.description,
            permissions,
            inherited_roles,
        })
        .await?;

    tracing::info!(
        role = %role.name,
        id = %role.id,
        inherits = ?role.inherited_roles,
        "Created role"
    );
    Ok(role)
}

pub async fn get_role<S>(store: &S, id: &str) -> Result<Role, RbacError>
where
    S: RoleGraphStore + ?Sized,
{
    load_role(store, id).await
}

pub async fn get_role_by_name<S>(store: &S, name: &str) -> Result<Role, RbacError>
where
    S: RoleGraphStore + ?Sized,
{
    store
        .find_role_by_name(name)
        .await?
        .ok_or_else(|| RbacError::not_found(EntityKind::Role, name))
}

pub async fn list_roles<S>(store: &S) -> Result<Vec<Role>, RbacError>
where
    S: RoleGraphStore + ?Sized,
{
    store.list_roles().await
}

/// Applies the fields present in `patch`, validating each like `create_role`.
///
/// A rename re-checks the resulting inherited list against the new name;
/// kept parents that no longer exist do not block it.
pub async fn update_role<S>(store: &S, id: &str, patch: RolePatch) -> Result<Role, RbacError>
where
    S: PermissionCatalog + RoleGraphStore + ?Sized,
{
    let current = load_role(store, id).await?;
    if patch.is_empty() {
        return Ok(current);
    }

    let name = match &patch.name {
        Some(name) => {
            let name = name.trim().to_string();
            require_non_empty("role name", &name)?;
            if let Some(existing) = store.find_role_by_name(&name).await? {
                if existing.id != current.id {
                    return Err(RbacError::conflict(EntityKind::Role, name));
                }
            }
            name
        }
        None => current.name.clone(),
    };
    let renamed = name != current.name;

    let inherited_roles = patch.inherited_roles.map(role_names);
    match &inherited_roles {
        Some(list) => validate_inheritance(store, &name, list).await?,
        None if renamed => {
            recheck_renamed_inheritance(store, &name, &current.inherited_roles).await?
        }
        None => {}
    }

    let permissions = patch.permissions.map(unique_in_order);
    if let Some(list) = &permissions {
        ensure_permissions_exist(store, list).await?;
    }

    let role = store
        .update_role(
            id,
            &RolePatch {
                name: patch.name.map(|_| name),
                description: patch.description,
                permissions,
                inherited_roles,
            },
        )
        .await?;

    tracing::info!(role = %role.name, id = %role.id, "Updated role");
    Ok(role)
}

/// Adds `codes` to the role. Codes already present are ignored.
pub async fn add_permissions_to_role<S>(
    store: &S,
    id: &str,
    codes: &[String],
) -> Result<Role, RbacError>
where
    S: PermissionCatalog + RoleGraphStore + ?Sized,
{
    let role = load_role(store, id).await?;
    ensure_permissions_exist(store, codes).await?;

    let merged = unique_in_order(role.permissions.iter().chain(codes).cloned());
    if merged.len() == role.permissions.len() {
        return Ok(role);
    }

    let updated = store
        .update_role(
            id,
            &RolePatch {
                permissions: Some(merged),
                ..Default::default()
            },
        )
        .await?;

    tracing::info!(role = %updated.name, added = ?codes, "Granted permissions to role");
    Ok(updated)
}

/// Removes `codes` from the role. Codes not present are ignored.
pub async fn remove_permissions_from_role<S>(
    store: &S,
    id: &str,
    codes: &[String],
) -> Result<Role, RbacError>
where
    S: RoleGraphStore + ?Sized,
{
    let role = load_role(store, id).await?;

    let remaining: Vec<String> = role
        .permissions
        .iter()
        .filter(|code| !codes.contains(*code))
        .cloned()
        .collect();
    if remaining.len() == role.permissions.len() {
        return Ok(role);
    }

    let updated = store
        .update_role(
            id,
            &RolePatch {
                permissions: Some(remaining),
                ..Default::default()
            },
        )
        .await?;

    tracing::info!(role = %updated.name, removed = ?codes, "Revoked permissions from role");
    Ok(updated)
}

/// Makes the role inherit `parent`. Inheriting an existing parent again is a no-op.
pub async fn add_inherited_role<S>(store: &S, id: &str, parent: &str) -> Result<Role, RbacError>
where
    S: RoleGraphStore + ?Sized,
{
    let role = load_role(store, id).await?;
    let parent = parent.trim();
    require_non_empty("inherited role name", parent)?;

    if parent == role.name {
        return Err(RbacError::InvalidGraph(format!(
            "role `{}` cannot inherit itself",
            role.name
        )));
    }

    if store.find_role_by_name(parent).await?.is_none() {
        return Err(RbacError::missing(EntityKind::Role, parent));
    }

    if role.inherited_roles.iter().any(|r| r == parent) {
        return Ok(role);
    }

    if would_create_cycle(store, parent, &role.name).await? {
        return Err(RbacError::InvalidGraph(format!(
            "role `{}` inheriting `{parent}` would create a cycle",
            role.name
        )));
    }

    let mut inherited_roles = role.inherited_roles.clone();
    inherited_roles.push(parent.to_string());

    let updated = store
        .update_role(
            id,
            &RolePatch {
                inherited_roles: Some(inherited_roles),
                ..Default::default()
            },
        )
        .await?;

    tracing::info!(role = %updated.name, parent = %parent, "Added inherited role");
    Ok(updated)
}

/// Drops `parent` from the role's inherited list. Absent parents are a no-op.
pub async fn remove_inherited_role<S>(store: &S, id: &str, parent: &str) -> Result<Role, RbacError>
where
    S: RoleGraphStore + ?Sized,
{
    let role = load_role(store, id).await?;
    let parent = parent.trim();

    if !role.inherited_roles.iter().any(|r| r == parent) {
        return Ok(role);
    }

    let inherited_roles: Vec<String> = role
        .inherited_roles
        .iter()
        .filter(|r| *r != parent)
        .cloned()
        .collect();

    let updated = store
        .update_role(
            id,
            &RolePatch {
                inherited_roles: Some(inherited_roles),
                ..Default::default()
            },
        )
        .await?;

    tracing::info!(role = %updated.name, parent = %parent, "Removed inherited role");
    Ok(updated)
}

pub async fn delete_role<S>(store: &S, id: &str) -> Result<(), RbacError>
where
    S: RoleGraphStore + ?Sized,
{
    if !store.delete_role(id).await? {
        return Err(RbacError::not_found(EntityKind::Role, id));
    }
    tracing::info!(id = %id, "Deleted role");
    Ok(())
}

pub async fn delete_all_roles<S>(store: &S) -> Result<u64, RbacError>
where
    S: RoleGraphStore + ?Sized,
{
    let deleted = store.delete_all_roles().await?;
    tracing::info!(deleted, "Deleted all roles");
    Ok(deleted)
}
