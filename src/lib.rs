//! rolegate - identity service with role-based access control
//!
//! The `rbac` module holds the permission catalog and role graph seams, the
//! inheritance resolver, validated management operations and the
//! authorization guard. The remaining modules wire it to SeaORM storage,
//! password login and an axum HTTP surface.

pub mod auth;
pub mod entities;
pub mod errors;
pub mod jobs;
pub mod rbac;
pub mod seed;
pub mod settings;
pub mod storage;
pub mod users;
pub mod web;
