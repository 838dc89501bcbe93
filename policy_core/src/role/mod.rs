//! Role graph collaborators.
//!
//! The graph is always derived from the current grouping sections. It is
//! rebuilt from scratch after each grouping mutation and never patched.

mod default;
mod links;

pub use default::DefaultRoleManager;
pub use links::RoleLinks;

use std::fmt;

/// Domain used by grouping rules that carry no third field.
pub const DEFAULT_DOMAIN: &str = "";

/// Maximum inheritance depth followed by [`DefaultRoleManager`].
pub const DEFAULT_MAX_HIERARCHY_LEVEL: usize = 10;

/// Builder and query surface of one role graph.
pub trait RoleManager: Send + Sync + fmt::Debug {
    /// Forget every link.
    fn clear(&mut self);

    /// Record that `name1` inherits `name2`.
    fn add_link(&mut self, name1: &str, name2: &str, domain: Option<&str>);

    /// Remove a direct link. Returns false if it did not exist.
    fn delete_link(&mut self, name1: &str, name2: &str, domain: Option<&str>) -> bool;

    /// Whether `name1` inherits `name2`, directly or transitively.
    fn has_link(&self, name1: &str, name2: &str, domain: Option<&str>) -> bool;

    /// Roles `name` directly inherits.
    fn get_roles(&self, name: &str, domain: Option<&str>) -> Vec<String>;

    /// Names that directly inherit `name`.
    fn get_users(&self, name: &str, domain: Option<&str>) -> Vec<String>;
}
