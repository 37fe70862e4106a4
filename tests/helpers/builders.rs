use rolegate::rbac::manage;
use rolegate::storage::{NewRole, NewUser, Role, User, UserPatch};
use rolegate::users;
use sea_orm::DatabaseConnection;

/// Builder for creating test roles through the management service
pub struct RoleBuilder {
    name: String,
    description: Option<String>,
    permissions: Vec<String>,
    inherited_roles: Vec<String>,
}

impl RoleBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: None,
            permissions: Vec::new(),
            inherited_roles: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn with_permissions(mut self, codes: &[&str]) -> Self {
        self.permissions = codes.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn inherits(mut self, roles: &[&str]) -> Self {
        self.inherited_roles = roles.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn build(self) -> NewRole {
        NewRole {
            name: self.name,
            description: self.description,
            permissions: self.permissions,
            inherited_roles: self.inherited_roles,
        }
    }

    pub async fn create(self, db: &DatabaseConnection) -> Role {
        manage::create_role(db, self.build())
            .await
            .expect("Failed to create test role")
    }
}

/// Builder for creating test users
pub struct UserBuilder {
    email: String,
    password: String,
    roles: Vec<String>,
    permissions: Vec<String>,
    enabled: bool,
}

impl UserBuilder {
    pub fn new(email: &str) -> Self {
        Self {
            email: email.to_string(),
            password: "password123".to_string(),
            roles: Vec::new(),
            permissions: Vec::new(),
            enabled: true,
        }
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.password = password.to_string();
        self
    }

    pub fn with_roles(mut self, roles: &[&str]) -> Self {
        self.roles = roles.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn with_permissions(mut self, codes: &[&str]) -> Self {
        self.permissions = codes.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub async fn create(self, db: &DatabaseConnection) -> User {
        let user = users::create_user(
            db,
            NewUser {
                email: self.email,
                password: self.password,
                full_name: None,
                roles: self.roles,
                permissions: self.permissions,
            },
        )
        .await
        .expect("Failed to create test user");

        if self.enabled {
            return user;
        }

        users::update_user(
            db,
            &user.id,
            UserPatch {
                enabled: Some(false),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to disable test user")
    }
}
