use std::collections::HashMap;

use tracing::{debug, info};

use super::{DefaultRoleManager, RoleManager, DEFAULT_MAX_HIERARCHY_LEVEL};
use crate::store::{PolicyStore, Section};

/// One role manager per grouping section, rebuilt in full whenever its
/// section changes.
#[derive(Debug)]
pub struct RoleLinks {
    managers: HashMap<String, Box<dyn RoleManager>>,
    max_hierarchy_level: usize,
}

impl RoleLinks {
    pub fn new(max_hierarchy_level: usize) -> Self {
        Self {
            managers: HashMap::new(),
            max_hierarchy_level,
        }
    }

    /// Install a custom manager for `ptype`. It is rebuilt on the next trigger.
    pub fn set_manager(&mut self, ptype: &str, manager: Box<dyn RoleManager>) {
        self.managers.insert(ptype.to_string(), manager);
    }

    pub fn manager(&self, ptype: &str) -> Option<&dyn RoleManager> {
        self.managers.get(ptype).map(|m| m.as_ref())
    }

    /// Rebuild the graph for `ptype` from the current contents of its section.
    pub fn on_grouping_mutation(&mut self, ptype: &str, store: &PolicyStore) {
        let max_level = self.max_hierarchy_level;
        let manager = self
            .managers
            .entry(ptype.to_string())
            .or_insert_with(|| Box::new(DefaultRoleManager::new(max_level)));

        match store.section(ptype) {
            Some(section) => rebuild(manager.as_mut(), section),
            None => manager.clear(),
        }
        debug!(ptype, links = store.len(ptype), "role graph rebuilt");
    }

    /// Rebuild every grouping section's graph and clear graphs whose
    /// section no longer exists.
    pub fn build_all(&mut self, store: &PolicyStore) {
        for (ptype, manager) in self.managers.iter_mut() {
            if store.section(ptype).is_none() {
                manager.clear();
            }
        }

        let ptypes: Vec<&str> = store.grouping_sections().map(|(ptype, _)| ptype).collect();
        for ptype in &ptypes {
            self.on_grouping_mutation(ptype, store);
        }
        info!(sections = ptypes.len(), "role links built");
    }
}

impl Default for RoleLinks {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HIERARCHY_LEVEL)
    }
}

fn rebuild(manager: &mut dyn RoleManager, section: &Section) {
    manager.clear();
    for rule in section.rules() {
        // Grouping rules are validated to carry at least two fields.
        if let (Some(name1), Some(name2)) = (rule.field(0), rule.field(1)) {
            manager.add_link(name1, name2, rule.field(2));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::Rule;

    #[test]
    fn test_rebuild_reflects_section() {
        let mut store = PolicyStore::new();
        store.add_rule("g", Rule::from(["alice", "admin"])).unwrap();

        let mut links = RoleLinks::default();
        links.on_grouping_mutation("g", &store);
        assert!(links.manager("g").unwrap().has_link("alice", "admin", None));

        store.remove_rule("g", &Rule::from(["alice", "admin"])).unwrap();
        links.on_grouping_mutation("g", &store);
        assert!(!links.manager("g").unwrap().has_link("alice", "admin", None));
    }

    #[test]
    fn test_build_all_covers_every_grouping_section() {
        let mut store = PolicyStore::new();
        store.add_rule("g", Rule::from(["alice", "admin"])).unwrap();
        store
            .add_rule("g2", Rule::from(["bob", "reader", "tenant1"]))
            .unwrap();
        store.add_rule("p", Rule::from(["admin", "data", "read"])).unwrap();

        let mut links = RoleLinks::default();
        links.build_all(&store);

        assert!(links.manager("g").unwrap().has_link("alice", "admin", None));
        assert!(links
            .manager("g2")
            .unwrap()
            .has_link("bob", "reader", Some("tenant1")));
        assert!(links.manager("p").is_none());
    }

    #[test]
    fn test_custom_manager_is_rebuilt() {
        let mut store = PolicyStore::new();
        store.add_rule("g", Rule::from(["u", "r"])).unwrap();

        let mut stale = DefaultRoleManager::new(1);
        stale.add_link("ghost", "r", None);

        let mut links = RoleLinks::default();
        links.set_manager("g", Box::new(stale));
        links.on_grouping_mutation("g", &store);

        let manager = links.manager("g").unwrap();
        assert!(manager.has_link("u", "r", None));
        assert!(!manager.has_link("ghost", "r", None));
    }
}
