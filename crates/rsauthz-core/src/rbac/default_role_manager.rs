//! Adjacency-map role graph with breadth-first reachability.

use std::collections::{HashMap, HashSet};

use super::{RoleConfig, RoleManager};

/// The domain-less subgraph lives under the empty key.
const NO_DOMAIN: &str = "";

#[derive(Debug, Default)]
struct RoleGraph {
    out_edges: HashMap<String, HashSet<String>>,
    in_edges: HashMap<String, HashSet<String>>,
}

impl RoleGraph {
    fn is_empty(&self) -> bool {
        self.out_edges.values().all(HashSet::is_empty)
    }
}

/// Default `RoleManager`: one adjacency map (forward and reverse) per
/// domain, breadth-first `has_link` with a visited set for cycle safety
/// and a configurable depth bound.
#[derive(Debug, Default)]
pub struct DefaultRoleManager {
    domains: HashMap<String, RoleGraph>,
    config: RoleConfig,
}

impl DefaultRoleManager {
    pub fn new(config: RoleConfig) -> Self {
        Self {
            domains: HashMap::new(),
            config,
        }
    }

    fn graph(&self, domain: Option<&str>) -> Option<&RoleGraph> {
        self.domains.get(domain.unwrap_or(NO_DOMAIN))
    }

    fn graph_mut(&mut self, domain: Option<&str>) -> &mut RoleGraph {
        self.domains
            .entry(domain.unwrap_or(NO_DOMAIN).to_string())
            .or_default()
    }
}

impl RoleManager for DefaultRoleManager {
    fn clear(&mut self) {
        self.domains.clear();
    }

    fn add_link(&mut self, name1: &str, name2: &str, domain: Option<&str>) {
        let graph = self.graph_mut(domain);
        graph
            .out_edges
            .entry(name1.to_string())
            .or_default()
            .insert(name2.to_string());
        graph
            .in_edges
            .entry(name2.to_string())
            .or_default()
            .insert(name1.to_string());
    }

    fn delete_link(&mut self, name1: &str, name2: &str, domain: Option<&str>) -> bool {
        let graph = self.graph_mut(domain);
        let removed = graph
            .out_edges
            .get_mut(name1)
            .is_some_and(|roles| roles.remove(name2));
        if removed {
            if let Some(users) = graph.in_edges.get_mut(name2) {
                users.remove(name1);
            }
        }
        removed
    }

    fn has_link(&self, name1: &str, name2: &str, domain: Option<&str>) -> bool {
        if name1 == name2 {
            return true;
        }
        let Some(graph) = self.graph(domain) else {
            return false;
        };

        // Level-by-level expansion: the visited set makes cycles finite,
        // the level counter enforces the hierarchy bound.
        let mut visited: HashSet<&str> = HashSet::from([name1]);
        let mut frontier: Vec<&str> = vec![name1];
        for _ in 0..self.config.max_hierarchy_level {
            let mut next: Vec<&str> = Vec::new();
            for node in frontier {
                let Some(roles) = graph.out_edges.get(node) else {
                    continue;
                };
                for role in roles {
                    if role.as_str() == name2 {
                        return true;
                    }
                    if visited.insert(role.as_str()) {
                        next.push(role.as_str());
                    }
                }
            }
            if next.is_empty() {
                return false;
            }
            frontier = next;
        }
        false
    }

    fn get_roles(&self, name: &str, domain: Option<&str>) -> Vec<String> {
        let mut roles: Vec<String> = self
            .graph(domain)
            .and_then(|graph| graph.out_edges.get(name))
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        roles.sort_unstable();
        roles
    }

    fn get_users(&self, name: &str, domain: Option<&str>) -> Vec<String> {
        let mut users: Vec<String> = self
            .graph(domain)
            .and_then(|graph| graph.in_edges.get(name))
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        users.sort_unstable();
        users
    }

    fn get_all_domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = self
            .domains
            .iter()
            .filter(|(_, graph)| !graph.is_empty())
            .map(|(domain, _)| domain.clone())
            .collect();
        domains.sort_unstable();
        domains
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rm() -> DefaultRoleManager {
        DefaultRoleManager::new(RoleConfig::default())
    }

    #[test]
    fn has_link_is_reflexive_on_empty_graphs() {
        let rm = rm();
        assert!(rm.has_link("alice", "alice", None));
        assert!(!rm.has_link("alice", "bob", None));
    }

    #[test]
    fn has_link_follows_chains_directionally() {
        let mut rm = rm();
        rm.add_link("a", "b", None);
        rm.add_link("b", "c", None);
        assert!(rm.has_link("a", "b", None));
        assert!(rm.has_link("a", "c", None));
        assert!(!rm.has_link("c", "a", None));
        assert!(!rm.has_link("b", "a", None));
    }

    #[test]
    fn delete_link_restores_pre_add_state() {
        let mut rm = rm();
        assert!(!rm.has_link("alice", "admin", None));
        rm.add_link("alice", "admin", None);
        assert!(rm.has_link("alice", "admin", None));
        assert!(rm.delete_link("alice", "admin", None));
        assert!(!rm.has_link("alice", "admin", None));
        // A second delete is a no-op and reports it.
        assert!(!rm.delete_link("alice", "admin", None));
    }

    #[test]
    fn cycles_terminate_and_stay_reachable() {
        let mut rm = rm();
        rm.add_link("a", "b", None);
        rm.add_link("b", "a", None);
        assert!(rm.has_link("a", "b", None));
        assert!(rm.has_link("b", "a", None));
        assert!(!rm.has_link("a", "c", None));
    }

    #[test]
    fn depth_bound_cuts_off_long_chains() {
        let mut rm = DefaultRoleManager::new(RoleConfig::default().with_max_hierarchy_level(2));
        rm.add_link("a", "b", None);
        rm.add_link("b", "c", None);
        rm.add_link("c", "d", None);
        assert!(rm.has_link("a", "c", None));
        // d is three hops away; the bound treats it as no link.
        assert!(!rm.has_link("a", "d", None));
    }

    #[test]
    fn domains_partition_the_graph() {
        let mut rm = rm();
        rm.add_link("alice", "admin", Some("domain1"));
        rm.add_link("bob", "admin", Some("domain2"));
        assert_eq!(rm.get_roles("alice", Some("domain1")), vec!["admin"]);
        assert!(rm.get_roles("alice", Some("domain2")).is_empty());
        assert!(rm.has_link("alice", "admin", Some("domain1")));
        assert!(!rm.has_link("alice", "admin", Some("domain2")));
        assert!(!rm.has_link("alice", "admin", None));
        assert_eq!(rm.get_all_domains(), vec!["domain1", "domain2"]);
    }

    #[test]
    fn one_hop_queries_do_not_traverse() {
        let mut rm = rm();
        rm.add_link("alice", "admin", None);
        rm.add_link("admin", "superadmin", None);
        assert_eq!(rm.get_roles("alice", None), vec!["admin"]);
        assert_eq!(rm.get_users("admin", None), vec!["alice"]);
        assert_eq!(rm.get_users("superadmin", None), vec!["admin"]);
    }

    #[test]
    fn clear_drops_every_domain() {
        let mut rm = rm();
        rm.add_link("a", "b", None);
        rm.add_link("c", "d", Some("tenant"));
        rm.clear();
        assert!(!rm.has_link("a", "b", None));
        assert!(rm.get_all_domains().is_empty());
    }
}
