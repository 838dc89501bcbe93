//! Management API over the policy model.
//!
//! Every read takes the fair lock in shared mode for the duration of the
//! store lookup. Every write takes it exclusively and, for grouping sections
//! with automatic rebuilding on, rebuilds the role graph before the guard is
//! released, so readers never see rules and roles out of step.
//!
//! Internal helpers receive the already-locked state and never lock again;
//! the fair lock is not reentrant.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::EnforcerConfig;
use crate::error::Result;
use crate::function::{FunctionMap, MatchFunction};
use crate::lock::FairRwLock;
use crate::role::{RoleLinks, RoleManager, DEFAULT_MAX_HIERARCHY_LEVEL};
use crate::rule::{collect_rules, Family, Rule, DEFAULT_GROUPING_TYPE, DEFAULT_POLICY_TYPE};
use crate::store::PolicyStore;

/// Everything guarded by the fair lock.
#[derive(Debug)]
pub struct PolicyState {
    store: PolicyStore,
    links: RoleLinks,
    auto_build_role_links: bool,
}

impl PolicyState {
    pub fn store(&self) -> &PolicyStore {
        &self.store
    }

    pub fn links(&self) -> &RoleLinks {
        &self.links
    }

    fn role_manager(&self, ptype: &str) -> Option<&dyn RoleManager> {
        self.links.manager(ptype)
    }
}

/// Thread-safe handle to the policy model. Clones share the same model.
#[derive(Debug, Clone)]
pub struct PolicyManager {
    state: Arc<FairRwLock<PolicyState>>,
    functions: FunctionMap,
}

impl PolicyManager {
    /// An empty model with automatic role-link rebuilding on.
    pub fn new() -> Self {
        Self::with_store(PolicyStore::new(), true, DEFAULT_MAX_HIERARCHY_LEVEL)
    }

    pub fn with_store(store: PolicyStore, auto_build_role_links: bool, max_hierarchy_level: usize) -> Self {
        let mut links = RoleLinks::new(max_hierarchy_level);
        if auto_build_role_links {
            links.build_all(&store);
        }
        Self {
            state: Arc::new(FairRwLock::new(PolicyState {
                store,
                links,
                auto_build_role_links,
            })),
            functions: FunctionMap::with_builtins(),
        }
    }

    /// Build a manager from configuration: declare sections, then seed rules.
    pub fn from_config(config: &EnforcerConfig) -> Result<Self> {
        config.validate()?;
        let mut store = PolicyStore::new();
        for (ptype, tokens) in &config.sections {
            store.declare_section(ptype, tokens.clone())?;
        }
        for seed in &config.seed {
            if !store.add_rule(&seed.ptype, seed.rule())? {
                debug!(ptype = %seed.ptype, "duplicate seed rule skipped");
            }
        }
        info!(
            sections = config.sections.len(),
            seeded = config.seed.len(),
            "policy model initialized"
        );
        Ok(Self::with_store(
            store,
            config.auto_build_role_links,
            config.max_hierarchy_level,
        ))
    }

    // ---------------------------------------------------------------
    // Locking helpers
    // ---------------------------------------------------------------

    fn read<R>(&self, f: impl FnOnce(&PolicyState) -> R) -> R {
        let state = self.state.read();
        f(&state)
    }

    fn mutate<F>(&self, ptype: &str, op: &'static str, f: F) -> Result<bool>
    where
        F: FnOnce(&mut PolicyStore) -> Result<bool>,
    {
        let mut guard = self.state.write();
        let state = &mut *guard;

        let changed = f(&mut state.store)?;
        if !changed {
            if op.ends_with("_batch") {
                warn!(ptype, op, "batch rejected, policy unchanged");
            } else {
                debug!(ptype, op, "policy unchanged");
            }
            return Ok(false);
        }

        info!(ptype, op, "policy updated");
        if Family::is_grouping(ptype) && state.auto_build_role_links {
            state.links.on_grouping_mutation(ptype, &state.store);
        }
        Ok(true)
    }

    /// Run `f` against a consistent view of rules and role graphs.
    pub fn with_state<R>(&self, f: impl FnOnce(&PolicyState) -> R) -> R {
        self.read(f)
    }

    /// Copy of the current model.
    pub fn snapshot(&self) -> PolicyStore {
        self.read(|s| s.store.clone())
    }

    // ---------------------------------------------------------------
    // Value listings
    // ---------------------------------------------------------------

    pub fn get_all_subjects(&self) -> Result<Vec<String>> {
        self.get_all_named_subjects(DEFAULT_POLICY_TYPE)
    }

    pub fn get_all_named_subjects(&self, ptype: &str) -> Result<Vec<String>> {
        self.read(|s| s.store.values_for_field(ptype, 0))
    }

    pub fn get_all_objects(&self) -> Result<Vec<String>> {
        self.get_all_named_objects(DEFAULT_POLICY_TYPE)
    }

    pub fn get_all_named_objects(&self, ptype: &str) -> Result<Vec<String>> {
        self.read(|s| s.store.values_for_field(ptype, 1))
    }

    pub fn get_all_actions(&self) -> Result<Vec<String>> {
        self.get_all_named_actions(DEFAULT_POLICY_TYPE)
    }

    pub fn get_all_named_actions(&self, ptype: &str) -> Result<Vec<String>> {
        self.read(|s| s.store.values_for_field(ptype, 2))
    }

    pub fn get_all_roles(&self) -> Result<Vec<String>> {
        self.get_all_named_roles(DEFAULT_GROUPING_TYPE)
    }

    pub fn get_all_named_roles(&self, ptype: &str) -> Result<Vec<String>> {
        self.read(|s| s.store.values_for_field(ptype, 1))
    }

    // ---------------------------------------------------------------
    // Authorization rules: reads
    // ---------------------------------------------------------------

    pub fn get_policy(&self) -> Vec<Rule> {
        self.get_named_policy(DEFAULT_POLICY_TYPE)
    }

    pub fn get_named_policy(&self, ptype: &str) -> Vec<Rule> {
        self.read(|s| s.store.all_rules(ptype))
    }

    pub fn get_filtered_policy(&self, field_index: usize, field_values: &[&str]) -> Result<Vec<Rule>> {
        self.get_filtered_named_policy(DEFAULT_POLICY_TYPE, field_index, field_values)
    }

    pub fn get_filtered_named_policy(
        &self,
        ptype: &str,
        field_index: usize,
        field_values: &[&str],
    ) -> Result<Vec<Rule>> {
        self.read(|s| s.store.filtered_rules(ptype, field_index, field_values))
    }

    pub fn has_policy(&self, rule: impl Into<Rule>) -> bool {
        self.has_named_policy(DEFAULT_POLICY_TYPE, rule)
    }

    pub fn has_named_policy(&self, ptype: &str, rule: impl Into<Rule>) -> bool {
        let rule = rule.into();
        self.read(|s| s.store.has_rule(ptype, &rule))
    }

    // ---------------------------------------------------------------
    // Authorization rules: writes
    // ---------------------------------------------------------------

    /// Add a rule. Returns false, changing nothing, if it already exists.
    pub fn add_policy(&self, rule: impl Into<Rule>) -> Result<bool> {
        self.add_named_policy(DEFAULT_POLICY_TYPE, rule)
    }

    pub fn add_named_policy(&self, ptype: &str, rule: impl Into<Rule>) -> Result<bool> {
        let rule = rule.into();
        self.mutate(ptype, "add", |store| store.add_rule(ptype, rule))
    }

    /// Add all rules or none: one existing rule rejects the batch.
    pub fn add_policies<I, R>(&self, rules: I) -> Result<bool>
    where
        I: IntoIterator<Item = R>,
        R: Into<Rule>,
    {
        self.add_named_policies(DEFAULT_POLICY_TYPE, rules)
    }

    pub fn add_named_policies<I, R>(&self, ptype: &str, rules: I) -> Result<bool>
    where
        I: IntoIterator<Item = R>,
        R: Into<Rule>,
    {
        let rules = collect_rules(rules);
        self.mutate(ptype, "add_batch", |store| store.add_rules(ptype, rules))
    }

    pub fn update_policy(&self, old_rule: impl Into<Rule>, new_rule: impl Into<Rule>) -> Result<bool> {
        self.update_named_policy(DEFAULT_POLICY_TYPE, old_rule, new_rule)
    }

    pub fn update_named_policy(
        &self,
        ptype: &str,
        old_rule: impl Into<Rule>,
        new_rule: impl Into<Rule>,
    ) -> Result<bool> {
        let (old_rule, new_rule) = (old_rule.into(), new_rule.into());
        self.mutate(ptype, "update", |store| {
            store.update_rule(ptype, &old_rule, new_rule)
        })
    }

    pub fn update_policies<I, J, R, S>(&self, old_rules: I, new_rules: J) -> Result<bool>
    where
        I: IntoIterator<Item = R>,
        J: IntoIterator<Item = S>,
        R: Into<Rule>,
        S: Into<Rule>,
    {
        self.update_named_policies(DEFAULT_POLICY_TYPE, old_rules, new_rules)
    }

    pub fn update_named_policies<I, J, R, S>(
        &self,
        ptype: &str,
        old_rules: I,
        new_rules: J,
    ) -> Result<bool>
    where
        I: IntoIterator<Item = R>,
        J: IntoIterator<Item = S>,
        R: Into<Rule>,
        S: Into<Rule>,
    {
        let (olds, news) = (collect_rules(old_rules), collect_rules(new_rules));
        self.mutate(ptype, "update_batch", |store| {
            store.update_rules(ptype, &olds, news)
        })
    }

    pub fn remove_policy(&self, rule: impl Into<Rule>) -> Result<bool> {
        self.remove_named_policy(DEFAULT_POLICY_TYPE, rule)
    }

    pub fn remove_named_policy(&self, ptype: &str, rule: impl Into<Rule>) -> Result<bool> {
        let rule = rule.into();
        self.mutate(ptype, "remove", |store| store.remove_rule(ptype, &rule))
    }

    pub fn remove_policies<I, R>(&self, rules: I) -> Result<bool>
    where
        I: IntoIterator<Item = R>,
        R: Into<Rule>,
    {
        self.remove_named_policies(DEFAULT_POLICY_TYPE, rules)
    }

    pub fn remove_named_policies<I, R>(&self, ptype: &str, rules: I) -> Result<bool>
    where
        I: IntoIterator<Item = R>,
        R: Into<Rule>,
    {
        let rules = collect_rules(rules);
        self.mutate(ptype, "remove_batch", |store| store.remove_rules(ptype, &rules))
    }

    pub fn remove_filtered_policy(&self, field_index: usize, field_values: &[&str]) -> Result<bool> {
        self.remove_filtered_named_policy(DEFAULT_POLICY_TYPE, field_index, field_values)
    }

    pub fn remove_filtered_named_policy(
        &self,
        ptype: &str,
        field_index: usize,
        field_values: &[&str],
    ) -> Result<bool> {
        self.mutate(ptype, "remove_filtered", |store| {
            store.remove_filtered(ptype, field_index, field_values)
        })
    }

    // ---------------------------------------------------------------
    // Grouping rules: reads
    // ---------------------------------------------------------------

    pub fn get_grouping_policy(&self) -> Vec<Rule> {
        self.get_named_grouping_policy(DEFAULT_GROUPING_TYPE)
    }

    pub fn get_named_grouping_policy(&self, ptype: &str) -> Vec<Rule> {
        self.read(|s| s.store.all_rules(ptype))
    }

    pub fn get_filtered_grouping_policy(
        &self,
        field_index: usize,
        field_values: &[&str],
    ) -> Result<Vec<Rule>> {
        self.get_filtered_named_grouping_policy(DEFAULT_GROUPING_TYPE, field_index, field_values)
    }

    pub fn get_filtered_named_grouping_policy(
        &self,
        ptype: &str,
        field_index: usize,
        field_values: &[&str],
    ) -> Result<Vec<Rule>> {
        self.read(|s| s.store.filtered_rules(ptype, field_index, field_values))
    }

    pub fn has_grouping_policy(&self, rule: impl Into<Rule>) -> bool {
        self.has_named_grouping_policy(DEFAULT_GROUPING_TYPE, rule)
    }

    pub fn has_named_grouping_policy(&self, ptype: &str, rule: impl Into<Rule>) -> bool {
        let rule = rule.into();
        self.read(|s| s.store.has_rule(ptype, &rule))
    }

    // ---------------------------------------------------------------
    // Grouping rules: writes
    // ---------------------------------------------------------------

    /// Add a role-inheritance rule. The role graph reflects it before this returns.
    pub fn add_grouping_policy(&self, rule: impl Into<Rule>) -> Result<bool> {
        self.add_named_grouping_policy(DEFAULT_GROUPING_TYPE, rule)
    }

    pub fn add_named_grouping_policy(&self, ptype: &str, rule: impl Into<Rule>) -> Result<bool> {
        let rule = rule.into();
        self.mutate(ptype, "add", |store| store.add_rule(ptype, rule))
    }

    pub fn add_grouping_policies<I, R>(&self, rules: I) -> Result<bool>
    where
        I: IntoIterator<Item = R>,
        R: Into<Rule>,
    {
        self.add_named_grouping_policies(DEFAULT_GROUPING_TYPE, rules)
    }

    pub fn add_named_grouping_policies<I, R>(&self, ptype: &str, rules: I) -> Result<bool>
    where
        I: IntoIterator<Item = R>,
        R: Into<Rule>,
    {
        let rules = collect_rules(rules);
        self.mutate(ptype, "add_batch", |store| store.add_rules(ptype, rules))
    }

    pub fn remove_grouping_policy(&self, rule: impl Into<Rule>) -> Result<bool> {
        self.remove_named_grouping_policy(DEFAULT_GROUPING_TYPE, rule)
    }

    pub fn remove_named_grouping_policy(&self, ptype: &str, rule: impl Into<Rule>) -> Result<bool> {
        let rule = rule.into();
        self.mutate(ptype, "remove", |store| store.remove_rule(ptype, &rule))
    }

    pub fn remove_grouping_policies<I, R>(&self, rules: I) -> Result<bool>
    where
        I: IntoIterator<Item = R>,
        R: Into<Rule>,
    {
        self.remove_named_grouping_policies(DEFAULT_GROUPING_TYPE, rules)
    }

    pub fn remove_named_grouping_policies<I, R>(&self, ptype: &str, rules: I) -> Result<bool>
    where
        I: IntoIterator<Item = R>,
        R: Into<Rule>,
    {
        let rules = collect_rules(rules);
        self.mutate(ptype, "remove_batch", |store| store.remove_rules(ptype, &rules))
    }

    pub fn remove_filtered_grouping_policy(
        &self,
        field_index: usize,
        field_values: &[&str],
    ) -> Result<bool> {
        self.remove_filtered_named_grouping_policy(DEFAULT_GROUPING_TYPE, field_index, field_values)
    }

    pub fn remove_filtered_named_grouping_policy(
        &self,
        ptype: &str,
        field_index: usize,
        field_values: &[&str],
    ) -> Result<bool> {
        self.mutate(ptype, "remove_filtered", |store| {
            store.remove_filtered(ptype, field_index, field_values)
        })
    }

    pub fn update_grouping_policy(
        &self,
        old_rule: impl Into<Rule>,
        new_rule: impl Into<Rule>,
    ) -> Result<bool> {
        self.update_named_grouping_policy(DEFAULT_GROUPING_TYPE, old_rule, new_rule)
    }

    pub fn update_named_grouping_policy(
        &self,
        ptype: &str,
        old_rule: impl Into<Rule>,
        new_rule: impl Into<Rule>,
    ) -> Result<bool> {
        let (old_rule, new_rule) = (old_rule.into(), new_rule.into());
        self.mutate(ptype, "update", |store| {
            store.update_rule(ptype, &old_rule, new_rule)
        })
    }

    pub fn update_grouping_policies<I, J, R, S>(&self, old_rules: I, new_rules: J) -> Result<bool>
    where
        I: IntoIterator<Item = R>,
        J: IntoIterator<Item = S>,
        R: Into<Rule>,
        S: Into<Rule>,
    {
        self.update_named_grouping_policies(DEFAULT_GROUPING_TYPE, old_rules, new_rules)
    }

    pub fn update_named_grouping_policies<I, J, R, S>(
        &self,
        ptype: &str,
        old_rules: I,
        new_rules: J,
    ) -> Result<bool>
    where
        I: IntoIterator<Item = R>,
        J: IntoIterator<Item = S>,
        R: Into<Rule>,
        S: Into<Rule>,
    {
        let (olds, news) = (collect_rules(old_rules), collect_rules(new_rules));
        self.mutate(ptype, "update_batch", |store| {
            store.update_rules(ptype, &olds, news)
        })
    }

    // ---------------------------------------------------------------
    // Role graph
    // ---------------------------------------------------------------

    /// Turning rebuilding back on catches the graphs up with the rules
    /// before any reader can see the flag set.
    pub fn enable_auto_build_role_links(&self, enabled: bool) {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let resumed = enabled && !state.auto_build_role_links;
        state.auto_build_role_links = enabled;
        if resumed {
            state.links.build_all(&state.store);
        }
    }

    pub fn auto_build_role_links(&self) -> bool {
        self.read(|s| s.auto_build_role_links)
    }

    /// Rebuild every role graph from the current grouping rules.
    pub fn build_role_links(&self) {
        let mut guard = self.state.write();
        let state = &mut *guard;
        state.links.build_all(&state.store);
    }

    /// Swap in a custom role manager for `ptype` and build it immediately.
    pub fn set_role_manager(&self, ptype: &str, manager: Box<dyn RoleManager>) {
        let mut guard = self.state.write();
        let state = &mut *guard;
        state.links.set_manager(ptype, manager);
        state.links.on_grouping_mutation(ptype, &state.store);
    }

    pub fn has_role_for_user(&self, user: &str, role: &str) -> bool {
        self.has_named_link(DEFAULT_GROUPING_TYPE, user, role, None)
    }

    pub fn has_role_for_user_in_domain(&self, user: &str, role: &str, domain: &str) -> bool {
        self.has_named_link(DEFAULT_GROUPING_TYPE, user, role, Some(domain))
    }

    /// Whether `name1` inherits `name2` in the graph built from section `ptype`.
    pub fn has_named_link(&self, ptype: &str, name1: &str, name2: &str, domain: Option<&str>) -> bool {
        self.read(|s| {
            s.role_manager(ptype)
                .is_some_and(|rm| rm.has_link(name1, name2, domain))
        })
    }

    pub fn get_roles_for_user(&self, user: &str) -> Vec<String> {
        self.get_roles_for_user_in_domain(user, None)
    }

    pub fn get_roles_for_user_in_domain(&self, user: &str, domain: Option<&str>) -> Vec<String> {
        self.read(|s| {
            s.role_manager(DEFAULT_GROUPING_TYPE)
                .map(|rm| rm.get_roles(user, domain))
                .unwrap_or_default()
        })
    }

    pub fn get_users_for_role(&self, role: &str) -> Vec<String> {
        self.read(|s| {
            s.role_manager(DEFAULT_GROUPING_TYPE)
                .map(|rm| rm.get_users(role, None))
                .unwrap_or_default()
        })
    }

    // ---------------------------------------------------------------
    // Whole-model operations
    // ---------------------------------------------------------------

    /// Replace the entire model. Role graphs are rebuilt before readers resume.
    pub fn reload(&self, store: PolicyStore) {
        let mut guard = self.state.write();
        let state = &mut *guard;
        state.store = store;
        state.links.build_all(&state.store);
        info!("policy model reloaded");
    }

    /// Drop every rule, keeping declared section shapes.
    pub fn clear_policy(&self) {
        let mut guard = self.state.write();
        let state = &mut *guard;
        state.store.clear();
        state.links.build_all(&state.store);
        info!("policy cleared");
    }

    // ---------------------------------------------------------------
    // Functions
    // ---------------------------------------------------------------

    /// Register a matcher function. Does not take the policy lock.
    pub fn add_function<F>(&self, name: &str, function: F)
    where
        F: Fn(&[&str]) -> bool + Send + Sync + 'static,
    {
        self.functions.add_function(name, function);
    }

    pub fn functions(&self) -> &FunctionMap {
        &self.functions
    }

    pub fn function(&self, name: &str) -> Option<MatchFunction> {
        self.functions.get(name)
    }

    pub fn call_function(&self, name: &str, args: &[&str]) -> Result<bool> {
        self.functions.call(name, args)
    }
}

impl Default for PolicyManager {
    fn default() -> Self {
        Self::new()
    }
}
