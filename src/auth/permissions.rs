/*!
 * # Permissions Module
 *
 * Permissions are `resource:action` strings. Users carry a single role and
 * the role determines the permission set; there is no per-user override.
 */

use crate::entities::user::UserRole;

/// Common permission string constants for compile-time safety
pub mod consts {
    pub const USERS_MANAGE: &str = "users:manage";

    // Materials, categories, assemblies, groups, templates
    pub const CATALOG_READ: &str = "catalog:read";
    pub const CATALOG_WRITE: &str = "catalog:write";

    // Clients, projects, timelines, uploads
    pub const PROJECTS_READ: &str = "projects:read";
    pub const PROJECTS_WRITE: &str = "projects:write";

    pub const NOTIFICATIONS_SEND: &str = "notifications:send";
}

use consts::*;

const ADMIN_PERMISSIONS: &[&str] = &[
    USERS_MANAGE,
    CATALOG_READ,
    CATALOG_WRITE,
    PROJECTS_READ,
    PROJECTS_WRITE,
    NOTIFICATIONS_SEND,
];

const MANAGER_PERMISSIONS: &[&str] = &[
    CATALOG_READ,
    CATALOG_WRITE,
    PROJECTS_READ,
    PROJECTS_WRITE,
    NOTIFICATIONS_SEND,
];

const VIEWER_PERMISSIONS: &[&str] = &[CATALOG_READ, PROJECTS_READ];

pub fn permissions_for_role(role: UserRole) -> &'static [&'static str] {
    match role {
        UserRole::Admin => ADMIN_PERMISSIONS,
        UserRole::Manager => MANAGER_PERMISSIONS,
        UserRole::Viewer => VIEWER_PERMISSIONS,
    }
}
