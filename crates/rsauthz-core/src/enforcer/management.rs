//! Policy-management surface: typed wrappers over model row mutations
//! that keep the role graphs in sync.
//!
//! All mutation methods report whether they changed anything; adding a
//! duplicate or removing a missing row is "unaffected", never an error.

use crate::error::EngineResult;
use crate::model::SectionKind;

use super::Enforcer;

fn owned(rule: &[&str]) -> Vec<String> {
    rule.iter().map(|s| s.to_string()).collect()
}

impl Enforcer {
    // Policy rows (`p`, `p2`, ...).

    pub fn add_policy(&mut self, rule: &[&str]) -> EngineResult<bool> {
        self.add_named_policy("p", rule)
    }

    pub fn add_named_policy(&mut self, key: &str, rule: &[&str]) -> EngineResult<bool> {
        self.model.add_policy(SectionKind::Policy, key, owned(rule))
    }

    pub fn add_policies(&mut self, rules: &[Vec<&str>]) -> EngineResult<bool> {
        let mut affected = false;
        for rule in rules {
            affected |= self.add_policy(rule)?;
        }
        Ok(affected)
    }

    pub fn remove_policy(&mut self, rule: &[&str]) -> bool {
        self.remove_named_policy("p", rule)
    }

    pub fn remove_named_policy(&mut self, key: &str, rule: &[&str]) -> bool {
        self.model.remove_policy(SectionKind::Policy, key, &owned(rule))
    }

    /// Removes rows matching the given fields from `start_index` on;
    /// empty strings are wildcards.
    pub fn remove_filtered_policy(&mut self, start_index: usize, field_values: &[&str]) -> bool {
        self.remove_filtered_named_policy("p", start_index, field_values)
    }

    pub fn remove_filtered_named_policy(
        &mut self,
        key: &str,
        start_index: usize,
        field_values: &[&str],
    ) -> bool {
        !self
            .model
            .remove_filtered_policy(SectionKind::Policy, key, start_index, &owned(field_values))
            .is_empty()
    }

    pub fn has_policy(&self, rule: &[&str]) -> bool {
        self.has_named_policy("p", rule)
    }

    pub fn has_named_policy(&self, key: &str, rule: &[&str]) -> bool {
        self.model.has_policy(SectionKind::Policy, key, &owned(rule))
    }

    pub fn get_policy(&self) -> Vec<Vec<String>> {
        self.get_named_policy("p")
    }

    pub fn get_named_policy(&self, key: &str) -> Vec<Vec<String>> {
        self.model.get_policy(SectionKind::Policy, key)
    }

    pub fn get_filtered_policy(&self, start_index: usize, field_values: &[&str]) -> Vec<Vec<String>> {
        self.get_filtered_named_policy("p", start_index, field_values)
    }

    pub fn get_filtered_named_policy(
        &self,
        key: &str,
        start_index: usize,
        field_values: &[&str],
    ) -> Vec<Vec<String>> {
        self.model
            .get_filtered_policy(SectionKind::Policy, key, start_index, &owned(field_values))
    }

    // Role rows (`g`, `g2`, ...). Mutations keep the corresponding role
    // graph current unless auto rebuild is off.

    pub fn add_grouping_policy(&mut self, rule: &[&str]) -> EngineResult<bool> {
        self.add_named_grouping_policy("g", rule)
    }

    pub fn add_named_grouping_policy(&mut self, key: &str, rule: &[&str]) -> EngineResult<bool> {
        let affected = self.model.add_policy(SectionKind::Role, key, owned(rule))?;
        if affected && self.auto_build_role_links {
            if let (Some(rm), [name1, name2, rest @ ..]) = (self.role_managers.get(key), rule) {
                rm.write().add_link(name1, name2, rest.first().copied());
            }
        }
        Ok(affected)
    }

    pub fn remove_grouping_policy(&mut self, rule: &[&str]) -> bool {
        self.remove_named_grouping_policy("g", rule)
    }

    pub fn remove_named_grouping_policy(&mut self, key: &str, rule: &[&str]) -> bool {
        let affected = self.model.remove_policy(SectionKind::Role, key, &owned(rule));
        if affected && self.auto_build_role_links {
            if let (Some(rm), [name1, name2, rest @ ..]) = (self.role_managers.get(key), rule) {
                rm.write().delete_link(name1, name2, rest.first().copied());
            }
        }
        affected
    }

    pub fn remove_filtered_grouping_policy(
        &mut self,
        start_index: usize,
        field_values: &[&str],
    ) -> EngineResult<bool> {
        self.remove_filtered_named_grouping_policy("g", start_index, field_values)
    }

    pub fn remove_filtered_named_grouping_policy(
        &mut self,
        key: &str,
        start_index: usize,
        field_values: &[&str],
    ) -> EngineResult<bool> {
        let removed =
            self.model
                .remove_filtered_policy(SectionKind::Role, key, start_index, &owned(field_values));
        if removed.is_empty() {
            return Ok(false);
        }
        if self.auto_build_role_links {
            // Wildcard removal can touch arbitrary edges; rebuild rather
            // than mirror each removed row.
            self.build_role_links()?;
        }
        Ok(true)
    }

    pub fn has_grouping_policy(&self, rule: &[&str]) -> bool {
        self.has_named_grouping_policy("g", rule)
    }

    pub fn has_named_grouping_policy(&self, key: &str, rule: &[&str]) -> bool {
        self.model.has_policy(SectionKind::Role, key, &owned(rule))
    }

    pub fn get_grouping_policy(&self) -> Vec<Vec<String>> {
        self.get_named_grouping_policy("g")
    }

    pub fn get_named_grouping_policy(&self, key: &str) -> Vec<Vec<String>> {
        self.model.get_policy(SectionKind::Role, key)
    }

    // Cross-row views.

    /// Distinct subjects across `p` rows (field 0), first-seen order.
    pub fn get_all_subjects(&self) -> Vec<String> {
        self.model.get_values_for_field_in_policy(SectionKind::Policy, "p", 0)
    }

    /// Distinct objects across `p` rows (field 1).
    pub fn get_all_objects(&self) -> Vec<String> {
        self.model.get_values_for_field_in_policy(SectionKind::Policy, "p", 1)
    }

    /// Distinct actions across `p` rows (field 2).
    pub fn get_all_actions(&self) -> Vec<String> {
        self.model.get_values_for_field_in_policy(SectionKind::Policy, "p", 2)
    }

    /// Distinct roles across every role section (field 1).
    pub fn get_all_roles(&self) -> Vec<String> {
        self.model
            .get_values_for_field_in_policy_all_types(SectionKind::Role, 1)
    }

    /// Distinct values of a named `p` field. Fails with `FieldNotFound`
    /// for labels the policy section does not declare.
    pub fn get_all_values_for_field(&self, label: &str) -> EngineResult<Vec<String>> {
        let index = self
            .model
            .required_field_index(SectionKind::Policy, "p", label)?;
        Ok(self
            .model
            .get_values_for_field_in_policy(SectionKind::Policy, "p", index))
    }

    /// Drops every policy and role row; role graphs are emptied with
    /// them.
    pub fn clear_policy(&mut self) -> EngineResult<()> {
        self.model.clear_policy();
        self.expr_cache.invalidate_all();
        self.build_role_links()
    }
}
