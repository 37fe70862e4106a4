use crate::storage::User;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Anything that holds roles and permissions directly.
pub trait Grantee {
    fn direct_roles(&self) -> &[String];
    fn direct_permissions(&self) -> &[String];
}

impl Grantee for User {
    fn direct_roles(&self) -> &[String] {
        &self.roles
    }

    fn direct_permissions(&self) -> &[String] {
        &self.permissions
    }
}

/// Bare grant lists, for checks that do not start from a stored user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grants {
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl Grants {
    pub fn roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
            permissions: Vec::new(),
        }
    }

    pub fn with_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions = permissions.into_iter().map(Into::into).collect();
        self
    }
}

impl Grantee for Grants {
    fn direct_roles(&self) -> &[String] {
        &self.roles
    }

    fn direct_permissions(&self) -> &[String] {
        &self.permissions
    }
}

/// Drops repeated entries, keeping the first occurrence of each.
pub fn unique_in_order<I>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    values
        .into_iter()
        .filter(|value| seen.insert(value.clone()))
        .collect()
}
