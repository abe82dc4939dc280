//! Role graphs and reachability.
//!
//! Each role section of the model (`g`, `g2`, ...) owns one directed
//! graph. An edge `a -> b` means "a has role b": `a` inherits whatever
//! is granted to `b`. Graphs are optionally partitioned by domain key
//! into independent subgraphs.

mod default_role_manager;

use std::sync::Arc;

use parking_lot::RwLock;

pub use default_role_manager::DefaultRoleManager;

/// A role manager shared between the enforcer (mutation, rebuilds) and
/// the expression evaluator (`g(...)` reachability calls).
pub type SharedRoleManager = Arc<RwLock<dyn RoleManager>>;

/// Configuration for role-graph traversal.
#[derive(Debug, Clone)]
pub struct RoleConfig {
    /// Maximum number of inheritance hops followed by `has_link`.
    /// Exceeding the bound is treated as "no link", never as an error;
    /// it exists to bound pathological or cyclic graphs.
    pub max_hierarchy_level: usize,
}

impl Default for RoleConfig {
    fn default() -> Self {
        Self {
            max_hierarchy_level: 100,
        }
    }
}

impl RoleConfig {
    pub fn with_max_hierarchy_level(mut self, level: usize) -> Self {
        self.max_hierarchy_level = level;
        self
    }
}

/// One role-relation graph.
///
/// All queries operate on the current built graph; rebuild scheduling is
/// the enforcer's responsibility (see `auto_build_role_links`).
pub trait RoleManager: Send + Sync {
    /// Drops all edges in all domains.
    fn clear(&mut self);

    /// Inserts the edge `name1 -> name2` (idempotent).
    fn add_link(&mut self, name1: &str, name2: &str, domain: Option<&str>);

    /// Deletes the edge if present; reports whether a change occurred.
    fn delete_link(&mut self, name1: &str, name2: &str, domain: Option<&str>) -> bool;

    /// Transitive reachability: true if `name2` is reachable from
    /// `name1`, including the trivial `name1 == name2` case. Terminates
    /// on cyclic graphs and under the configured depth bound.
    fn has_link(&self, name1: &str, name2: &str, domain: Option<&str>) -> bool;

    /// Direct roles of `name` (one hop of out-edges).
    fn get_roles(&self, name: &str, domain: Option<&str>) -> Vec<String>;

    /// Direct members of `name` (one hop of in-edges).
    fn get_users(&self, name: &str, domain: Option<&str>) -> Vec<String>;

    /// Domain keys that currently carry at least one edge.
    fn get_all_domains(&self) -> Vec<String>;
}
