//! Role- and permission-centric convenience surface over the role
//! graphs and policy rows.
//!
//! "Implicit" queries walk inheritance across every role section, so a
//! user linked through `g` and `g2` sees both graphs' contributions.

use std::collections::{HashSet, VecDeque};

use crate::error::EngineResult;

use super::Enforcer;

impl Enforcer {
    /// Direct roles of a user in the `g` graph.
    pub fn get_roles_for_user(&self, name: &str, domain: Option<&str>) -> Vec<String> {
        match self.role_managers.get("g") {
            Some(rm) => rm.read().get_roles(name, domain),
            None => Vec::new(),
        }
    }

    /// Direct members of a role in the `g` graph.
    pub fn get_users_for_role(&self, name: &str, domain: Option<&str>) -> Vec<String> {
        match self.role_managers.get("g") {
            Some(rm) => rm.read().get_users(name, domain),
            None => Vec::new(),
        }
    }

    pub fn has_role_for_user(&self, name: &str, role: &str, domain: Option<&str>) -> bool {
        self.get_roles_for_user(name, domain).iter().any(|r| r == role)
    }

    pub fn add_role_for_user(
        &mut self,
        user: &str,
        role: &str,
        domain: Option<&str>,
    ) -> EngineResult<bool> {
        match domain {
            Some(domain) => self.add_grouping_policy(&[user, role, domain]),
            None => self.add_grouping_policy(&[user, role]),
        }
    }

    pub fn delete_role_for_user(&mut self, user: &str, role: &str, domain: Option<&str>) -> bool {
        match domain {
            Some(domain) => self.remove_grouping_policy(&[user, role, domain]),
            None => self.remove_grouping_policy(&[user, role]),
        }
    }

    /// Removes every direct role of the user (within the domain, when
    /// given).
    pub fn delete_roles_for_user(&mut self, user: &str, domain: Option<&str>) -> EngineResult<bool> {
        match domain {
            Some(domain) => self.remove_filtered_grouping_policy(0, &[user, "", domain]),
            None => self.remove_filtered_grouping_policy(0, &[user]),
        }
    }

    /// Policy rows whose subject is the user itself (no inheritance).
    pub fn get_permissions_for_user(&self, user: &str, domain: Option<&str>) -> Vec<Vec<String>> {
        match domain {
            Some(domain) => self.get_filtered_policy(0, &[user, domain]),
            None => self.get_filtered_policy(0, &[user]),
        }
    }

    pub fn has_permission_for_user(&self, user: &str, permission: &[&str]) -> bool {
        let mut rule = vec![user];
        rule.extend_from_slice(permission);
        self.has_policy(&rule)
    }

    pub fn add_permission_for_user(
        &mut self,
        user: &str,
        permission: &[&str],
    ) -> EngineResult<bool> {
        let mut rule = vec![user];
        rule.extend_from_slice(permission);
        self.add_policy(&rule)
    }

    pub fn delete_permission_for_user(&mut self, user: &str, permission: &[&str]) -> bool {
        let mut rule = vec![user];
        rule.extend_from_slice(permission);
        self.remove_policy(&rule)
    }

    /// Removes the user entirely: its role memberships and its own
    /// permission rows.
    pub fn delete_user(&mut self, user: &str) -> EngineResult<bool> {
        let roles = self.remove_filtered_grouping_policy(0, &[user])?;
        let permissions = self.remove_filtered_policy(0, &[user]);
        Ok(roles || permissions)
    }

    /// Removes the role entirely: every membership edge into it and
    /// every permission row granted to it.
    pub fn delete_role(&mut self, role: &str) -> EngineResult<bool> {
        let memberships = self.remove_filtered_grouping_policy(1, &[role])?;
        let permissions = self.remove_filtered_policy(0, &[role]);
        Ok(memberships || permissions)
    }

    /// Removes the permission from every subject that carries it.
    pub fn delete_permission(&mut self, permission: &[&str]) -> bool {
        self.remove_filtered_policy(1, permission)
    }

    /// Removes every policy and role row scoped to the given domains
    /// (domain at policy field 1 and role field 2). An empty list drops
    /// all rows.
    pub fn delete_domains(&mut self, domains: &[&str]) -> EngineResult<bool> {
        if domains.is_empty() {
            self.clear_policy()?;
            return Ok(true);
        }
        let mut affected = false;
        for domain in domains {
            affected |= self.remove_filtered_policy(1, &[domain]);
            affected |= self.remove_filtered_grouping_policy(2, &[domain])?;
        }
        Ok(affected)
    }

    /// All roles the user holds directly or by inheritance, across every
    /// role section, in breadth-first discovery order.
    pub fn get_implicit_roles_for_user(&self, name: &str, domain: Option<&str>) -> Vec<String> {
        self.walk_implicit(name, |rm, current| rm.get_roles(current, domain))
    }

    /// All users who hold the role directly or by inheritance, across
    /// every role section.
    pub fn get_implicit_users_for_role(&self, name: &str, domain: Option<&str>) -> Vec<String> {
        self.walk_implicit(name, |rm, current| rm.get_users(current, domain))
    }

    /// Policy rows granted to the user or any of its implicit roles.
    pub fn get_implicit_permissions_for_user(
        &self,
        user: &str,
        domain: Option<&str>,
    ) -> Vec<Vec<String>> {
        let mut subjects = vec![user.to_string()];
        subjects.extend(self.get_implicit_roles_for_user(user, domain));
        let mut permissions = Vec::new();
        for subject in &subjects {
            for row in self.get_permissions_for_user(subject, domain) {
                if !permissions.contains(&row) {
                    permissions.push(row);
                }
            }
        }
        permissions
    }

    /// Users (subjects that are not themselves roles) allowed the
    /// permission, decided by running each candidate through `enforce`.
    pub fn get_implicit_users_for_permission(
        &self,
        permission: &[&str],
    ) -> EngineResult<Vec<String>> {
        let roles = self
            .model
            .get_values_for_field_in_policy_all_types(crate::model::SectionKind::Role, 1);
        let mut candidates = self.get_all_subjects();
        for subject in self
            .model
            .get_values_for_field_in_policy_all_types(crate::model::SectionKind::Role, 0)
        {
            if !candidates.contains(&subject) {
                candidates.push(subject);
            }
        }
        candidates.retain(|name| !roles.contains(name));

        let mut users = Vec::new();
        for candidate in candidates {
            let mut request = vec![candidate.as_str()];
            request.extend_from_slice(permission);
            if self.enforce(&request)? {
                users.push(candidate);
            }
        }
        Ok(users)
    }

    /// Domain keys carrying at least one edge, across every role
    /// section, sorted and deduplicated.
    pub fn get_all_domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = self
            .role_managers
            .values()
            .flat_map(|rm| rm.read().get_all_domains())
            .collect();
        domains.sort_unstable();
        domains.dedup();
        domains
    }

    fn walk_implicit(
        &self,
        start: &str,
        step: impl Fn(&dyn crate::rbac::RoleManager, &str) -> Vec<String>,
    ) -> Vec<String> {
        let mut found = Vec::new();
        let mut seen: HashSet<String> = HashSet::from([start.to_string()]);
        let mut queue: VecDeque<String> = VecDeque::from([start.to_string()]);
        while let Some(current) = queue.pop_front() {
            for rm in self.role_managers.values() {
                for next in step(&*rm.read(), &current) {
                    if seen.insert(next.clone()) {
                        found.push(next.clone());
                        queue.push_back(next);
                    }
                }
            }
        }
        found
    }
}
