#![allow(dead_code)]

pub mod builders;
pub mod db;
pub mod http;

pub use builders::{RoleBuilder, UserBuilder};
pub use db::{seed_permissions, TestDb};
pub use http::{bearer_request, json_request, read_json};

use std::collections::HashSet;

pub fn set(values: &[&str]) -> HashSet<String> {
    values.iter().map(|v| v.to_string()).collect()
}

pub fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}
