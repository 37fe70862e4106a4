//! Request gates built on the resolver.

use crate::rbac::errors::{Denial, RbacError};
use crate::rbac::resolver::{effective_permissions, effective_roles};
use crate::rbac::store::{PermissionCatalog, RoleGraphStore};
use crate::rbac::types::Grantee;

pub async fn has_permission<S, G>(store: &S, grantee: &G, code: &str) -> Result<bool, RbacError>
where
    S: RoleGraphStore + ?Sized,
    G: Grantee + Sync + ?Sized,
{
    Ok(effective_permissions(store, grantee).await?.contains(code))
}

/// Succeeds silently when `grantee` holds `code`.
///
/// A code missing from the catalog is denied as `UnknownPermission`.
pub async fn ensure_permission<S, G>(store: &S, grantee: &G, code: &str) -> Result<(), RbacError>
where
    S: PermissionCatalog + RoleGraphStore + ?Sized,
    G: Grantee + Sync + ?Sized,
{
    if store.find_permission_by_code(code).await?.is_none() {
        tracing::warn!(permission = %code, "Permission gate references an unknown permission");
        return Err(RbacError::Forbidden(Denial::UnknownPermission(code.to_string())));
    }

    if !has_permission(store, grantee, code).await? {
        return Err(RbacError::Forbidden(Denial::MissingPermission(code.to_string())));
    }

    Ok(())
}

pub async fn has_role<S, G>(store: &S, grantee: &G, name: &str) -> Result<bool, RbacError>
where
    S: RoleGraphStore + ?Sized,
    G: Grantee + Sync + ?Sized,
{
    Ok(effective_roles(store, grantee).await?.contains(name))
}

pub async fn ensure_role<S, G>(store: &S, grantee: &G, name: &str) -> Result<(), RbacError>
where
    S: RoleGraphStore + ?Sized,
    G: Grantee + Sync + ?Sized,
{
    if store.find_role_by_name(name).await?.is_none() {
        tracing::warn!(role = %name, "Role gate references an unknown role");
        return Err(RbacError::Forbidden(Denial::UnknownRole(name.to_string())));
    }

    if !has_role(store, grantee, name).await? {
        return Err(RbacError::Forbidden(Denial::MissingRole(name.to_string())));
    }

    Ok(())
}
