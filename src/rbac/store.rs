//! Persistence seams for the RBAC core.
//!
//! The resolver, management service and guard are generic over these two
//! traits. The production backend is `sea_orm::DatabaseConnection`; neither
//! trait performs graph validation.

use crate::errors::GateError;
use crate::rbac::errors::{EntityKind, RbacError};
use crate::storage::{self, NewRole, Permission, PermissionPatch, Role, RolePatch};
use async_trait::async_trait;
use sea_orm::DatabaseConnection;

#[async_trait]
pub trait PermissionCatalog: Send + Sync {
    async fn find_permission_by_code(&self, code: &str) -> Result<Option<Permission>, RbacError>;

    async fn find_permission(&self, id: &str) -> Result<Option<Permission>, RbacError>;

    /// Matching permissions only; unknown codes are silently dropped.
    async fn find_permissions_by_codes(
        &self,
        codes: &[String],
    ) -> Result<Vec<Permission>, RbacError>;

    async fn list_permissions(&self) -> Result<Vec<Permission>, RbacError>;

    /// Fails with `Conflict` when the code is taken.
    async fn create_permission(
        &self,
        code: &str,
        description: &str,
    ) -> Result<Permission, RbacError>;

    /// Fails with `Conflict` when the new code belongs to another permission
    /// and `NotFound` when `id` is unknown.
    async fn update_permission(
        &self,
        id: &str,
        patch: &PermissionPatch,
    ) -> Result<Permission, RbacError>;

    async fn delete_permission(&self, id: &str) -> Result<bool, RbacError>;

    async fn delete_all_permissions(&self) -> Result<u64, RbacError>;
}

#[async_trait]
pub trait RoleGraphStore: Send + Sync {
    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, RbacError>;

    async fn find_role(&self, id: &str) -> Result<Option<Role>, RbacError>;

    /// Matching roles only; unknown names are silently dropped.
    async fn find_roles_by_names(&self, names: &[String]) -> Result<Vec<Role>, RbacError>;

    async fn list_roles(&self) -> Result<Vec<Role>, RbacError>;

    async fn create_role(&self, role: NewRole) -> Result<Role, RbacError>;

    async fn update_role(&self, id: &str, patch: &RolePatch) -> Result<Role, RbacError>;

    async fn delete_role(&self, id: &str) -> Result<bool, RbacError>;

    async fn delete_all_roles(&self) -> Result<u64, RbacError>;
}

/// Maps a unique-index rejection to `Conflict`; everything else is unexpected.
fn conflict_or(err: GateError, kind: EntityKind, key: &str) -> RbacError {
    if err.is_unique_violation() {
        RbacError::conflict(kind, key)
    } else {
        RbacError::Unexpected(err)
    }
}

#[async_trait]
impl PermissionCatalog for DatabaseConnection {
    async fn find_permission_by_code(&self, code: &str) -> Result<Option<Permission>, RbacError> {
        Ok(storage::get_permission_by_code(self, code).await?)
    }

    async fn find_permission(&self, id: &str) -> Result<Option<Permission>, RbacError> {
        Ok(storage::get_permission(self, id).await?)
    }

    async fn find_permissions_by_codes(
        &self,
        codes: &[String],
    ) -> Result<Vec<Permission>, RbacError> {
        Ok(storage::get_permissions_by_codes(self, codes).await?)
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>, RbacError> {
        Ok(storage::list_permissions(self).await?)
    }

    async fn create_permission(
        &self,
        code: &str,
        description: &str,
    ) -> Result<Permission, RbacError> {
        if storage::get_permission_by_code(self, code).await?.is_some() {
            return Err(RbacError::conflict(EntityKind::Permission, code));
        }

        storage::create_permission(self, code, description)
            .await
            .map_err(|e| conflict_or(e, EntityKind::Permission, code))
    }

    async fn update_permission(
        &self,
        id: &str,
        patch: &PermissionPatch,
    ) -> Result<Permission, RbacError> {
        if let Some(code) = &patch.code {
            if let Some(existing) = storage::get_permission_by_code(self, code).await? {
                if existing.id != id {
                    return Err(RbacError::conflict(EntityKind::Permission, code.as_str()));
                }
            }
        }

        let key = patch.code.as_deref().unwrap_or(id);
        storage::update_permission(self, id, patch)
            .await
            .map_err(|e| conflict_or(e, EntityKind::Permission, key))?
            .ok_or_else(|| RbacError::not_found(EntityKind::Permission, id))
    }

    async fn delete_permission(&self, id: &str) -> Result<bool, RbacError> {
        Ok(storage::delete_permission(self, id).await?)
    }

    async fn delete_all_permissions(&self) -> Result<u64, RbacError> {
        Ok(storage::delete_all_permissions(self).await?)
    }
}

#[async_trait]
impl RoleGraphStore for DatabaseConnection {
    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, RbacError> {
        Ok(storage::get_role_by_name(self, name).await?)
    }

    async fn find_role(&self, id: &str) -> Result<Option<Role>, RbacError> {
        Ok(storage::get_role(self, id).await?)
    }

    async fn find_roles_by_names(&self, names: &[String]) -> Result<Vec<Role>, RbacError> {
        Ok(storage::get_roles_by_names(self, names).await?)
    }

    async fn list_roles(&self) -> Result<Vec<Role>, RbacError> {
        Ok(storage::list_roles(self).await?)
    }

    async fn create_role(&self, role: NewRole) -> Result<Role, RbacError> {
        let name = role.name.clone();
        storage::create_role(self, role)
            .await
            .map_err(|e| conflict_or(e, EntityKind::Role, &name))
    }

    async fn update_role(&self, id: &str, patch: &RolePatch) -> Result<Role, RbacError> {
        let key = patch.name.as_deref().unwrap_or(id);
        storage::update_role(self, id, patch)
            .await
            .map_err(|e| conflict_or(e, EntityKind::Role, key))?
            .ok_or_else(|| RbacError::not_found(EntityKind::Role, id))
    }

    async fn delete_role(&self, id: &str) -> Result<bool, RbacError> {
        Ok(storage::delete_role(self, id).await?)
    }

    async fn delete_all_roles(&self) -> Result<u64, RbacError> {
        Ok(storage::delete_all_roles(self).await?)
    }
}
