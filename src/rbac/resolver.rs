//! Breadth-first walks over the role inheritance graph.
//!
//! Every walk uses a FIFO worklist and a visited set; the visited set is the
//! only thing that stops a cyclic graph. A role name that resolves to nothing
//! is skipped.

use crate::rbac::errors::RbacError;
use crate::rbac::store::RoleGraphStore;
use crate::rbac::types::Grantee;
use crate::storage::Role;
use std::collections::{HashSet, VecDeque};

/// Roles reachable from `seeds`, each fetched once.
async fn reachable_roles<S>(store: &S, seeds: &[String]) -> Result<Vec<Role>, RbacError>
where
    S: RoleGraphStore + ?Sized,
{
    let mut frontier: VecDeque<String> = seeds.iter().cloned().collect();
    let mut visited: HashSet<String> = HashSet::new();
    let mut reached = Vec::new();

    while let Some(name) = frontier.pop_front() {
        if !visited.insert(name.clone()) {
            continue;
        }

        let Some(role) = store.find_role_by_name(&name).await? else {
            tracing::debug!(role = %name, "Skipping dangling role reference");
            continue;
        };

        frontier.extend(
            role.inherited_roles
                .iter()
                .filter(|parent| !visited.contains(*parent))
                .cloned(),
        );
        reached.push(role);
    }

    tracing::debug!(
        seeds = seeds.len(),
        visited = visited.len(),
        reached = reached.len(),
        "Walked role graph"
    );

    Ok(reached)
}

/// Direct permissions plus every permission granted by a reachable role.
pub async fn effective_permissions<S, G>(
    store: &S,
    grantee: &G,
) -> Result<HashSet<String>, RbacError>
where
    S: RoleGraphStore + ?Sized,
    G: Grantee + Sync + ?Sized,
{
    let mut permissions: HashSet<String> = grantee.direct_permissions().iter().cloned().collect();

    for role in reachable_roles(store, grantee.direct_roles()).await? {
        permissions.extend(role.permissions);
    }

    Ok(permissions)
}

/// Direct role names plus every role name inherited by a reachable role.
pub async fn effective_roles<S, G>(store: &S, grantee: &G) -> Result<HashSet<String>, RbacError>
where
    S: RoleGraphStore + ?Sized,
    G: Grantee + Sync + ?Sized,
{
    let mut roles: HashSet<String> = grantee.direct_roles().iter().cloned().collect();

    for role in reachable_roles(store, grantee.direct_roles()).await? {
        roles.extend(role.inherited_roles);
    }

    Ok(roles)
}

/// Whether `target` is reachable from `start` along inheritance edges.
///
/// Letting `target` inherit `start` closes a loop exactly when this is true.
/// `start == target` is always true.
pub async fn would_create_cycle<S>(store: &S, start: &str, target: &str) -> Result<bool, RbacError>
where
    S: RoleGraphStore + ?Sized,
{
    if start == target {
        return Ok(true);
    }

    let mut frontier = VecDeque::from([start.to_string()]);
    let mut visited: HashSet<String> = HashSet::new();

    while let Some(name) = frontier.pop_front() {
        if !visited.insert(name.clone()) {
            continue;
        }

        let Some(role) = store.find_role_by_name(&name).await? else {
            continue;
        };

        for parent in role.inherited_roles {
            if parent == target {
                return Ok(true);
            }
            if !visited.contains(&parent) {
                frontier.push_back(parent);
            }
        }
    }

    Ok(false)
}
