//! Idempotent bootstrap of the base catalog, base roles and a super-admin.

use crate::rbac::errors::RbacError;
use crate::rbac::manage;
use crate::rbac::store::{PermissionCatalog, RoleGraphStore};
use crate::settings::Bootstrap;
use crate::storage::{self, NewRole, NewUser, User};
use sea_orm::DatabaseConnection;

pub struct RoleSeed {
    pub name: &'static str,
    pub description: &'static str,
    pub permissions: &'static [&'static str],
    pub inherited_roles: &'static [&'static str],
}

pub const BASE_PERMISSIONS: &[(&str, &str)] = &[
    ("user:read", "View user profiles and data"),
    ("user:create", "Create new user accounts"),
    ("user:update", "Modify existing user profiles"),
    ("user:delete", "Delete user accounts"),
    ("user:list", "List all users"),
    ("user:assign_roles", "Assign roles to users"),
    ("user:remove_roles", "Remove roles from users"),
    ("user:assign_permissions", "Assign permissions directly to users"),
    ("user:remove_permissions", "Remove direct permissions from users"),
    ("role:read", "View role definitions and permissions"),
    ("role:create", "Create new roles"),
    ("role:update", "Modify existing roles"),
    ("role:delete", "Delete roles"),
    ("role:list", "List all roles"),
    ("role:assign_permissions", "Assign permissions to roles"),
    ("role:remove_permissions", "Remove permissions from roles"),
    ("role:assign_inherited_role", "Assign inherited roles to roles"),
    ("role:remove_inherited_role", "Remove inherited roles from roles"),
    ("permission:read", "View permission definitions"),
    ("permission:create", "Create new permissions"),
    ("permission:update", "Modify existing permissions"),
    ("permission:delete", "Delete permissions"),
    ("permission:list", "List all permissions"),
    ("admin:full_access", "Grants full administrative access to the system"),
];

/// Ordered so that every inherited role is seeded before its heirs.
pub const BASE_ROLES: &[RoleSeed] = &[
    RoleSeed {
        name: "guest",
        description: "Unauthenticated user with minimal access.",
        permissions: &["user:read"],
        inherited_roles: &[],
    },
    RoleSeed {
        name: "user",
        description: "Standard authenticated user.",
        permissions: &["user:read", "user:update"],
        inherited_roles: &["guest"],
    },
    RoleSeed {
        name: "editor",
        description: "User with content creation and modification privileges.",
        permissions: &["user:read", "user:list", "role:read", "permission:read"],
        inherited_roles: &["user"],
    },
    RoleSeed {
        name: "admin",
        description: "Administrator with full system access.",
        // Codes are exact matches, so every management permission is listed.
        permissions: &[
            "admin:full_access",
            "user:read",
            "user:create",
            "user:update",
            "user:delete",
            "user:list",
            "user:assign_roles",
            "user:remove_roles",
            "user:assign_permissions",
            "user:remove_permissions",
            "role:read",
            "role:create",
            "role:update",
            "role:delete",
            "role:list",
            "role:assign_permissions",
            "role:remove_permissions",
            "role:assign_inherited_role",
            "role:remove_inherited_role",
            "permission:read",
            "permission:create",
            "permission:update",
            "permission:delete",
            "permission:list",
        ],
        inherited_roles: &["editor"],
    },
];

pub const SUPERADMIN_ROLE: &str = "admin";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub permissions_created: usize,
    pub roles_created: usize,
}

/// Creates whatever base permissions and roles are missing. Existing
/// entries are left as they are.
pub async fn seed_defaults<S>(store: &S) -> Result<SeedReport, RbacError>
where
    S: PermissionCatalog + RoleGraphStore + ?Sized,
{
    let mut report = SeedReport::default();

    for (code, description) in BASE_PERMISSIONS {
        if store.find_permission_by_code(code).await?.is_none() {
            manage::create_permission(store, code, description).await?;
            report.permissions_created += 1;
        }
    }

    for seed in BASE_ROLES {
        if store.find_role_by_name(seed.name).await?.is_some() {
            continue;
        }
        manage::create_role(
            store,
            NewRole {
                name: seed.name.to_string(),
                description: Some(seed.description.to_string()),
                permissions: seed.permissions.iter().map(|p| p.to_string()).collect(),
                inherited_roles: seed.inherited_roles.iter().map(|r| r.to_string()).collect(),
            },
        )
        .await?;
        report.roles_created += 1;
    }

    tracing::info!(
        permissions_created = report.permissions_created,
        roles_created = report.roles_created,
        "Seeded base permissions and roles"
    );
    Ok(report)
}

/// Creates the super-admin account unless the email is already registered.
pub async fn ensure_superadmin(
    db: &DatabaseConnection,
    email: &str,
    password: &str,
) -> Result<Option<User>, RbacError> {
    if storage::get_user_by_email(db, &email.trim().to_lowercase())
        .await?
        .is_some()
    {
        return Ok(None);
    }

    let user = crate::users::create_user(
        db,
        NewUser {
            email: email.to_string(),
            password: password.to_string(),
            full_name: Some("Super Admin".to_string()),
            roles: vec![SUPERADMIN_ROLE.to_string()],
            permissions: Vec::new(),
        },
    )
    .await?;

    tracing::info!(email = %user.email, "Created super-admin user");
    Ok(Some(user))
}

/// Startup seeding as configured in `[bootstrap]`.
pub async fn bootstrap(db: &DatabaseConnection, cfg: &Bootstrap) -> Result<(), RbacError> {
    if cfg.seed_defaults {
        seed_defaults(db).await?;
    }

    match (&cfg.admin_email, &cfg.admin_password) {
        (Some(email), Some(password)) => {
            ensure_superadmin(db, email, password).await?;
        }
        (Some(_), None) | (None, Some(_)) => {
            tracing::warn!("bootstrap.admin_email and bootstrap.admin_password must be set together");
        }
        (None, None) => {}
    }

    Ok(())
}
