use crate::entities;
use crate::errors::GateError;
use crate::settings::Database as DbCfg;
use base64ct::Encoding;
use chrono::Utc;
use migration::{Migrator, MigratorTrait};
use rand::RngCore;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Database, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: String,
    pub code: String,
    pub description: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PermissionPatch {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub permissions: Vec<String>,
    pub inherited_roles: Vec<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewRole {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub inherited_roles: Vec<String>,
}

/// Partial role update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RolePatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Option<Vec<String>>,
    #[serde(default)]
    pub inherited_roles: Option<Vec<String>>,
}

impl RolePatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.permissions.is_none()
            && self.inherited_roles.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub full_name: Option<String>,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub enabled: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserPatch {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub roles: Option<Vec<String>>,
    #[serde(default)]
    pub permissions: Option<Vec<String>>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub token_hash: String,
    pub user_id: String,
    pub created_at: i64,
    pub expires_at: i64,
    pub revoked: i64,
}

/// A freshly issued bearer token. `token` is never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedToken {
    pub token: String,
    pub user_id: String,
    pub expires_at: i64,
}

pub async fn init(cfg: &DbCfg) -> Result<DatabaseConnection, GateError> {
    let db = Database::connect(&cfg.url).await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// 12 random bytes as 24 lowercase hex characters.
pub fn new_object_id() -> String {
    let mut bytes = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

pub fn is_object_id(value: &str) -> bool {
    value.len() == 24
        && value
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64ct::Base64UrlUnpadded::encode_string(&bytes)
}

pub fn hash_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    base64ct::Base64UrlUnpadded::encode_string(&digest)
}

fn encode_list(values: &[String]) -> Result<String, GateError> {
    Ok(serde_json::to_string(values)?)
}

fn decode_list(raw: &str) -> Result<Vec<String>, GateError> {
    Ok(serde_json::from_str(raw)?)
}

fn hash_password(password: &str) -> Result<String, GateError> {
    use argon2::password_hash::{rand_core::OsRng, SaltString};
    use argon2::{Argon2, PasswordHasher};

    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

// Permission catalog

fn permission_from_model(model: entities::permission::Model) -> Permission {
    Permission {
        id: model.id,
        code: model.code,
        description: model.description,
        created_at: model.created_at,
    }
}

pub async fn create_permission(
    db: &DatabaseConnection,
    code: &str,
    description: &str,
) -> Result<Permission, GateError> {
    let id = new_object_id();
    let created_at = Utc::now().timestamp();

    let permission = entities::permission::ActiveModel {
        id: Set(id.clone()),
        code: Set(code.to_string()),
        description: Set(description.to_string()),
        created_at: Set(created_at),
    };

    permission.insert(db).await?;

    Ok(Permission {
        id,
        code: code.to_string(),
        description: description.to_string(),
        created_at,
    })
}

pub async fn get_permission(
    db: &DatabaseConnection,
    id: &str,
) -> Result<Option<Permission>, GateError> {
    use entities::permission::Entity;

    Ok(Entity::find_by_id(id.to_string())
        .one(db)
        .await?
        .map(permission_from_model))
}

pub async fn get_permission_by_code(
    db: &DatabaseConnection,
    code: &str,
) -> Result<Option<Permission>, GateError> {
    use entities::permission::{Column, Entity};

    Ok(Entity::find()
        .filter(Column::Code.eq(code))
        .one(db)
        .await?
        .map(permission_from_model))
}

/// Returns only the permissions that exist; unknown codes are dropped.
pub async fn get_permissions_by_codes(
    db: &DatabaseConnection,
    codes: &[String],
) -> Result<Vec<Permission>, GateError> {
    use entities::permission::{Column, Entity};

    if codes.is_empty() {
        return Ok(Vec::new());
    }

    let models = Entity::find()
        .filter(Column::Code.is_in(codes.iter().cloned()))
        .all(db)
        .await?;

    Ok(models.into_iter().map(permission_from_model).collect())
}

pub async fn list_permissions(db: &DatabaseConnection) -> Result<Vec<Permission>, GateError> {
    use entities::permission::{Column, Entity};

    let models = Entity::find()
        .order_by_asc(Column::CreatedAt)
        .order_by_asc(Column::Code)
        .all(db)
        .await?;

    Ok(models.into_iter().map(permission_from_model).collect())
}

pub async fn update_permission(
    db: &DatabaseConnection,
    id: &str,
    patch: &PermissionPatch,
) -> Result<Option<Permission>, GateError> {
    use entities::permission::Entity;

    let Some(model) = Entity::find_by_id(id.to_string()).one(db).await? else {
        return Ok(None);
    };

    let mut active: entities::permission::ActiveModel = model.clone().into();
    if let Some(code) = &patch.code {
        active.code = Set(code.clone());
    }
    if let Some(description) = &patch.description {
        active.description = Set(description.clone());
    }

    if !active.is_changed() {
        return Ok(Some(permission_from_model(model)));
    }

    let updated = active.update(db).await?;
    Ok(Some(permission_from_model(updated)))
}

pub async fn delete_permission(db: &DatabaseConnection, id: &str) -> Result<bool, GateError> {
    use entities::permission::Entity;

    let result = Entity::delete_by_id(id.to_string()).exec(db).await?;
    Ok(result.rows_affected > 0)
}

pub async fn delete_all_permissions(db: &DatabaseConnection) -> Result<u64, GateError> {
    use entities::permission::Entity;

    let result = Entity::delete_many().exec(db).await?;
    Ok(result.rows_affected)
}

// Role graph

fn role_from_model(model: entities::role::Model) -> Result<Role, GateError> {
    Ok(Role {
        permissions: decode_list(&model.permissions)?,
        inherited_roles: decode_list(&model.inherited_roles)?,
        id: model.id,
        name: model.name,
        description: model.description,
        created_at: model.created_at,
    })
}

pub async fn create_role(db: &DatabaseConnection, input: NewRole) -> Result<Role, GateError> {
    let id = new_object_id();
    let created_at = Utc::now().timestamp();

    let role = entities::role::ActiveModel {
        id: Set(id.clone()),
        name: Set(input.name.clone()),
        description: Set(input.description.clone()),
        permissions: Set(encode_list(&input.permissions)?),
        inherited_roles: Set(encode_list(&input.inherited_roles)?),
        created_at: Set(created_at),
    };

    role.insert(db).await?;

    Ok(Role {
        id,
        name: input.name,
        description: input.description,
        permissions: input.permissions,
        inherited_roles: input.inherited_roles,
        created_at,
    })
}

pub async fn get_role(db: &DatabaseConnection, id: &str) -> Result<Option<Role>, GateError> {
    use entities::role::Entity;

    Entity::find_by_id(id.to_string())
        .one(db)
        .await?
        .map(role_from_model)
        .transpose()
}

pub async fn get_role_by_name(
    db: &DatabaseConnection,
    name: &str,
) -> Result<Option<Role>, GateError> {
    use entities::role::{Column, Entity};

    Entity::find()
        .filter(Column::Name.eq(name))
        .one(db)
        .await?
        .map(role_from_model)
        .transpose()
}

/// Returns only the roles that exist; unknown names are dropped.
pub async fn get_roles_by_names(
    db: &DatabaseConnection,
    names: &[String],
) -> Result<Vec<Role>, GateError> {
    use entities::role::{Column, Entity};

    if names.is_empty() {
        return Ok(Vec::new());
    }

    Entity::find()
        .filter(Column::Name.is_in(names.iter().cloned()))
        .all(db)
        .await?
        .into_iter()
        .map(role_from_model)
        .collect()
}

pub async fn list_roles(db: &DatabaseConnection) -> Result<Vec<Role>, GateError> {
    use entities::role::{Column, Entity};

    Entity::find()
        .order_by_asc(Column::CreatedAt)
        .order_by_asc(Column::Name)
        .all(db)
        .await?
        .into_iter()
        .map(role_from_model)
        .collect()
}

pub async fn update_role(
    db: &DatabaseConnection,
    id: &str,
    patch: &RolePatch,
) -> Result<Option<Role>, GateError> {
    use entities::role::Entity;

    let Some(model) = Entity::find_by_id(id.to_string()).one(db).await? else {
        return Ok(None);
    };

    let mut active: entities::role::ActiveModel = model.clone().into();
    if let Some(name) = &patch.name {
        active.name = Set(name.clone());
    }
    if let Some(description) = &patch.description {
        active.description = Set(Some(description.clone()));
    }
    if let Some(permissions) = &patch.permissions {
        active.permissions = Set(encode_list(permissions)?);
    }
    if let Some(inherited_roles) = &patch.inherited_roles {
        active.inherited_roles = Set(encode_list(inherited_roles)?);
    }

    if !active.is_changed() {
        return role_from_model(model).map(Some);
    }

    let updated = active.update(db).await?;
    role_from_model(updated).map(Some)
}

pub async fn delete_role(db: &DatabaseConnection, id: &str) -> Result<bool, GateError> {
    use entities::role::Entity;

    let result = Entity::delete_by_id(id.to_string()).exec(db).await?;
    Ok(result.rows_affected > 0)
}

pub async fn delete_all_roles(db: &DatabaseConnection) -> Result<u64, GateError> {
    use entities::role::Entity;

    let result = Entity::delete_many().exec(db).await?;
    Ok(result.rows_affected)
}

// User management functions

fn user_from_model(model: entities::user::Model) -> Result<User, GateError> {
    Ok(User {
        roles: decode_list(&model.roles)?,
        permissions: decode_list(&model.permissions)?,
        id: model.id,
        email: model.email,
        password_hash: model.password_hash,
        full_name: model.full_name,
        enabled: model.enabled != 0,
        created_at: model.created_at,
    })
}

pub async fn create_user(db: &DatabaseConnection, input: NewUser) -> Result<User, GateError> {
    let id = new_object_id();
    let created_at = Utc::now().timestamp();

    // Hash password with Argon2id
    let password_hash = hash_password(&input.password)?;

    let user = entities::user::ActiveModel {
        id: Set(id.clone()),
        email: Set(input.email.clone()),
        password_hash: Set(password_hash.clone()),
        full_name: Set(input.full_name.clone()),
        roles: Set(encode_list(&input.roles)?),
        permissions: Set(encode_list(&input.permissions)?),
        enabled: Set(1),
        created_at: Set(created_at),
    };

    user.insert(db).await?;

    Ok(User {
        id,
        email: input.email,
        password_hash,
        full_name: input.full_name,
        roles: input.roles,
        permissions: input.permissions,
        enabled: true,
        created_at,
    })
}

pub async fn get_user(db: &DatabaseConnection, id: &str) -> Result<Option<User>, GateError> {
    use entities::user::Entity;

    Entity::find_by_id(id.to_string())
        .one(db)
        .await?
        .map(user_from_model)
        .transpose()
}

pub async fn get_user_by_email(
    db: &DatabaseConnection,
    email: &str,
) -> Result<Option<User>, GateError> {
    use entities::user::{Column, Entity};

    Entity::find()
        .filter(Column::Email.eq(email))
        .one(db)
        .await?
        .map(user_from_model)
        .transpose()
}

pub async fn list_users(
    db: &DatabaseConnection,
    skip: u64,
    limit: u64,
) -> Result<Vec<User>, GateError> {
    use entities::user::{Column, Entity};

    Entity::find()
        .order_by_asc(Column::CreatedAt)
        .order_by_asc(Column::Email)
        .offset(skip)
        .limit(limit)
        .all(db)
        .await?
        .into_iter()
        .map(user_from_model)
        .collect()
}

pub async fn update_user(
    db: &DatabaseConnection,
    id: &str,
    patch: &UserPatch,
) -> Result<Option<User>, GateError> {
    use entities::user::Entity;

    let Some(model) = Entity::find_by_id(id.to_string()).one(db).await? else {
        return Ok(None);
    };

    let mut active: entities::user::ActiveModel = model.clone().into();
    if let Some(email) = &patch.email {
        active.email = Set(email.clone());
    }
    if let Some(password) = &patch.password {
        active.password_hash = Set(hash_password(password)?);
    }
    if let Some(full_name) = &patch.full_name {
        active.full_name = Set(Some(full_name.clone()));
    }
    if let Some(roles) = &patch.roles {
        active.roles = Set(encode_list(roles)?);
    }
    if let Some(permissions) = &patch.permissions {
        active.permissions = Set(encode_list(permissions)?);
    }
    if let Some(enabled) = patch.enabled {
        active.enabled = Set(if enabled { 1 } else { 0 });
    }

    if !active.is_changed() {
        return user_from_model(model).map(Some);
    }

    let updated = active.update(db).await?;
    user_from_model(updated).map(Some)
}

pub async fn delete_user(db: &DatabaseConnection, id: &str) -> Result<bool, GateError> {
    use entities::user::Entity;

    let result = Entity::delete_by_id(id.to_string()).exec(db).await?;
    Ok(result.rows_affected > 0)
}

/// Returns the user when the password matches and the account is enabled.
pub async fn verify_user_password(
    db: &DatabaseConnection,
    email: &str,
    password: &str,
) -> Result<Option<User>, GateError> {
    use argon2::{Argon2, PasswordHash, PasswordVerifier};

    let user = match get_user_by_email(db, email).await? {
        Some(u) if u.enabled => u,
        _ => return Ok(None),
    };

    let parsed_hash = PasswordHash::new(&user.password_hash)?;

    if Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
    {
        Ok(Some(user))
    } else {
        Ok(None)
    }
}

// Access tokens

pub async fn issue_access_token(
    db: &DatabaseConnection,
    user_id: &str,
    ttl_secs: i64,
) -> Result<IssuedToken, GateError> {
    let token = random_token();
    let now = Utc::now().timestamp();
    let expires_at = now + ttl_secs;

    let access_token = entities::access_token::ActiveModel {
        token_hash: Set(hash_token(&token)),
        user_id: Set(user_id.to_string()),
        created_at: Set(now),
        expires_at: Set(expires_at),
        revoked: Set(0),
    };

    access_token.insert(db).await?;

    Ok(IssuedToken {
        token,
        user_id: user_id.to_string(),
        expires_at,
    })
}

/// Looks up a live token. Revoked and expired tokens read as absent.
pub async fn get_access_token(
    db: &DatabaseConnection,
    token: &str,
) -> Result<Option<AccessToken>, GateError> {
    use entities::access_token::Entity;

    let Some(model) = Entity::find_by_id(hash_token(token)).one(db).await? else {
        return Ok(None);
    };

    let now = Utc::now().timestamp();
    if model.revoked != 0 || now > model.expires_at {
        return Ok(None);
    }

    Ok(Some(AccessToken {
        token_hash: model.token_hash,
        user_id: model.user_id,
        created_at: model.created_at,
        expires_at: model.expires_at,
        revoked: model.revoked,
    }))
}

pub async fn revoke_access_token(db: &DatabaseConnection, token: &str) -> Result<bool, GateError> {
    use entities::access_token::Entity;

    let Some(model) = Entity::find_by_id(hash_token(token)).one(db).await? else {
        return Ok(false);
    };

    let mut active: entities::access_token::ActiveModel = model.into();
    active.revoked = Set(1);
    active.update(db).await?;

    Ok(true)
}

pub async fn cleanup_expired_access_tokens(db: &DatabaseConnection) -> Result<u64, GateError> {
    use entities::access_token::{Column, Entity};

    let now = Utc::now().timestamp();
    let result = Entity::delete_many()
        .filter(Column::ExpiresAt.lt(now).or(Column::Revoked.ne(0)))
        .exec(db)
        .await?;

    Ok(result.rows_affected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{Database, DatabaseConnection};
    use tempfile::NamedTempFile;

    /// Test database helper that keeps temp file alive
    struct TestDb {
        connection: DatabaseConnection,
        _temp_file: NamedTempFile,
    }

    impl TestDb {
        async fn new() -> Self {
            let temp_file = NamedTempFile::new().expect("Failed to create temp file");
            let db_path = temp_file.path().to_str().expect("Invalid temp file path");
            let db_url = format!("sqlite://{}?mode=rwc", db_path);

            let connection = Database::connect(&db_url)
                .await
                .expect("Failed to connect to test database");

            Migrator::up(&connection, None)
                .await
                .expect("Failed to run migrations");

            Self {
                connection,
                _temp_file: temp_file,
            }
        }

        fn connection(&self) -> &DatabaseConnection {
            &self.connection
        }
    }

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    // ============================================================================
    // Identifier Tests
    // ============================================================================

    #[test]
    fn test_object_id_shape() {
        let id = new_object_id();
        assert_eq!(id.len(), 24);
        assert!(is_object_id(&id));
        assert_ne!(id, new_object_id());
    }

    #[test]
    fn test_is_object_id_rejects_malformed() {
        assert!(!is_object_id(""));
        assert!(!is_object_id("not-an-id"));
        assert!(!is_object_id("65A1B2C3D4E5F60718293A4B"));
        assert!(!is_object_id("65a1b2c3d4e5f60718293a4"));
        assert!(is_object_id("65a1b2c3d4e5f60718293a4b"));
    }

    #[test]
    fn test_hash_token_is_stable() {
        assert_eq!(hash_token("abc"), hash_token("abc"));
        assert_ne!(hash_token("abc"), hash_token("abd"));
        assert!(!hash_token("abc").contains('='));
    }

    // ============================================================================
    // Permission Tests
    // ============================================================================

    #[tokio::test]
    async fn test_create_and_get_permission() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let created = create_permission(db, "user:read", "Read users")
            .await
            .expect("Failed to create permission");

        assert!(is_object_id(&created.id));

        let by_id = get_permission(db, &created.id)
            .await
            .expect("Query failed")
            .expect("Permission not found");
        assert_eq!(by_id, created);

        let by_code = get_permission_by_code(db, "user:read")
            .await
            .expect("Query failed")
            .expect("Permission not found");
        assert_eq!(by_code.id, created.id);
    }

    #[tokio::test]
    async fn test_duplicate_permission_code_is_unique_violation() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        create_permission(db, "user:read", "Read users")
            .await
            .expect("Failed to create permission");

        let err = create_permission(db, "user:read", "Again")
            .await
            .expect_err("Duplicate code should fail");
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn test_get_permissions_by_codes_drops_unknown() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        create_permission(db, "a", "").await.unwrap();
        create_permission(db, "b", "").await.unwrap();

        let found = get_permissions_by_codes(db, &names(&["a", "b", "ghost"]))
            .await
            .expect("Query failed");
        let mut codes: Vec<_> = found.into_iter().map(|p| p.code).collect();
        codes.sort();
        assert_eq!(codes, names(&["a", "b"]));

        let none = get_permissions_by_codes(db, &[]).await.expect("Query failed");
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_update_permission_partial() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let created = create_permission(db, "user:read", "Read users").await.unwrap();

        let updated = update_permission(
            db,
            &created.id,
            &PermissionPatch {
                code: None,
                description: Some("Read any user".to_string()),
            },
        )
        .await
        .expect("Update failed")
        .expect("Permission not found");

        assert_eq!(updated.code, "user:read");
        assert_eq!(updated.description, "Read any user");

        let missing = update_permission(db, &new_object_id(), &PermissionPatch::default())
            .await
            .expect("Update failed");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_delete_permissions() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let a = create_permission(db, "a", "").await.unwrap();
        create_permission(db, "b", "").await.unwrap();
        create_permission(db, "c", "").await.unwrap();

        assert!(delete_permission(db, &a.id).await.unwrap());
        assert!(!delete_permission(db, &a.id).await.unwrap());
        assert_eq!(delete_all_permissions(db).await.unwrap(), 2);
        assert!(list_permissions(db).await.unwrap().is_empty());
    }

    // ============================================================================
    // Role Tests
    // ============================================================================

    #[tokio::test]
    async fn test_role_lists_survive_storage() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let created = create_role(
            db,
            NewRole {
                name: "editor".to_string(),
                description: Some("Edits things".to_string()),
                permissions: names(&["post:edit", "post:read"]),
                inherited_roles: names(&["user"]),
            },
        )
        .await
        .expect("Failed to create role");

        let loaded = get_role_by_name(db, "editor")
            .await
            .expect("Query failed")
            .expect("Role not found");

        assert_eq!(loaded, created);
        assert_eq!(loaded.permissions, names(&["post:edit", "post:read"]));
        assert_eq!(loaded.inherited_roles, names(&["user"]));
    }

    #[tokio::test]
    async fn test_update_role_only_touches_present_fields() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let created = create_role(
            db,
            NewRole {
                name: "editor".to_string(),
                permissions: names(&["post:edit"]),
                inherited_roles: names(&["user"]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let updated = update_role(
            db,
            &created.id,
            &RolePatch {
                permissions: Some(names(&["post:edit", "post:publish"])),
                ..Default::default()
            },
        )
        .await
        .expect("Update failed")
        .expect("Role not found");

        assert_eq!(updated.name, "editor");
        assert_eq!(updated.inherited_roles, names(&["user"]));
        assert_eq!(updated.permissions, names(&["post:edit", "post:publish"]));

        let unchanged = update_role(db, &created.id, &RolePatch::default())
            .await
            .expect("Update failed")
            .expect("Role not found");
        assert_eq!(unchanged, updated);
    }

    #[tokio::test]
    async fn test_get_roles_by_names_drops_unknown() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        for name in ["guest", "user"] {
            create_role(
                db,
                NewRole {
                    name: name.to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        }

        let found = get_roles_by_names(db, &names(&["guest", "ghost"]))
            .await
            .expect("Query failed");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "guest");
    }

    // ============================================================================
    // User Tests
    // ============================================================================

    #[tokio::test]
    async fn test_create_user_and_verify_password() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let user = create_user(
            db,
            NewUser {
                email: "alice@example.com".to_string(),
                password: "s3cret!".to_string(),
                full_name: Some("Alice".to_string()),
                roles: names(&["user"]),
                permissions: vec![],
            },
        )
        .await
        .expect("Failed to create user");

        assert!(user.password_hash.starts_with("$argon2"));
        assert!(user.enabled);

        let verified = verify_user_password(db, "alice@example.com", "s3cret!")
            .await
            .expect("Verify failed");
        assert_eq!(verified.map(|u| u.id), Some(user.id.clone()));

        let wrong = verify_user_password(db, "alice@example.com", "nope")
            .await
            .expect("Verify failed");
        assert!(wrong.is_none());

        let unknown = verify_user_password(db, "bob@example.com", "s3cret!")
            .await
            .expect("Verify failed");
        assert!(unknown.is_none());
    }

    #[tokio::test]
    async fn test_disabled_user_cannot_verify() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let user = create_user(
            db,
            NewUser {
                email: "alice@example.com".to_string(),
                password: "s3cret!".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        update_user(
            db,
            &user.id,
            &UserPatch {
                enabled: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let verified = verify_user_password(db, "alice@example.com", "s3cret!")
            .await
            .expect("Verify failed");
        assert!(verified.is_none());
    }

    #[tokio::test]
    async fn test_list_users_paginates() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        for i in 0..5 {
            create_user(
                db,
                NewUser {
                    email: format!("user{}@example.com", i),
                    password: "pw".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        }

        assert_eq!(list_users(db, 0, 10).await.unwrap().len(), 5);
        assert_eq!(list_users(db, 0, 2).await.unwrap().len(), 2);
        assert_eq!(list_users(db, 4, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_password_hash_not_serialized() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let user = create_user(
            db,
            NewUser {
                email: "alice@example.com".to_string(),
                password: "s3cret!".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["email"], "alice@example.com");
    }

    // ============================================================================
    // Access Token Tests
    // ============================================================================

    #[tokio::test]
    async fn test_issue_and_get_access_token() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let issued = issue_access_token(db, "user-1", 3600)
            .await
            .expect("Failed to issue token");

        let token = get_access_token(db, &issued.token)
            .await
            .expect("Query failed")
            .expect("Token not found");

        assert_eq!(token.user_id, "user-1");
        assert_eq!(token.token_hash, hash_token(&issued.token));
        assert_ne!(token.token_hash, issued.token);
    }

    #[tokio::test]
    async fn test_expired_access_token_reads_as_absent() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let issued = issue_access_token(db, "user-1", -10).await.unwrap();

        assert!(get_access_token(db, &issued.token).await.unwrap().is_none());
        assert_eq!(cleanup_expired_access_tokens(db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_revoke_access_token() {
        let test_db = TestDb::new().await;
        let db = test_db.connection();

        let issued = issue_access_token(db, "user-1", 3600).await.unwrap();

        assert!(revoke_access_token(db, &issued.token).await.unwrap());
        assert!(get_access_token(db, &issued.token).await.unwrap().is_none());
        assert!(!revoke_access_token(db, "unknown").await.unwrap());
    }
}
