//! Role-based access control: a permission catalog, a role graph with
//! multi-level inheritance, and the checks built on top of them.

pub mod errors;
pub mod guard;
pub mod manage;
pub mod resolver;
pub mod store;
pub mod types;

pub use errors::{Denial, EntityKind, RbacError};
pub use guard::{ensure_permission, ensure_role, has_permission, has_role};
pub use resolver::{effective_permissions, effective_roles, would_create_cycle};
pub use store::{PermissionCatalog, RoleGraphStore};
pub use types::{Grantee, Grants};
