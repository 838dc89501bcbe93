use std::collections::{HashMap, HashSet, VecDeque};

use super::{RoleManager, DEFAULT_DOMAIN, DEFAULT_MAX_HIERARCHY_LEVEL};

type Edges = HashMap<String, Vec<String>>;

/// Role graph kept as direct edges per domain and searched breadth-first.
#[derive(Debug, Clone)]
pub struct DefaultRoleManager {
    // domain -> name -> roles it inherits, in insertion order
    links: HashMap<String, Edges>,
    max_hierarchy_level: usize,
}

impl DefaultRoleManager {
    pub fn new(max_hierarchy_level: usize) -> Self {
        Self {
            links: HashMap::new(),
            max_hierarchy_level,
        }
    }

    pub fn max_hierarchy_level(&self) -> usize {
        self.max_hierarchy_level
    }

    fn edges(&self, domain: Option<&str>) -> Option<&Edges> {
        self.links.get(domain.unwrap_or(DEFAULT_DOMAIN))
    }
}

impl Default for DefaultRoleManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HIERARCHY_LEVEL)
    }
}

impl RoleManager for DefaultRoleManager {
    fn clear(&mut self) {
        self.links.clear();
    }

    fn add_link(&mut self, name1: &str, name2: &str, domain: Option<&str>) {
        let roles = self
            .links
            .entry(domain.unwrap_or(DEFAULT_DOMAIN).to_string())
            .or_default()
            .entry(name1.to_string())
            .or_default();
        if !roles.iter().any(|r| r == name2) {
            roles.push(name2.to_string());
        }
    }

    fn delete_link(&mut self, name1: &str, name2: &str, domain: Option<&str>) -> bool {
        let Some(roles) = self
            .links
            .get_mut(domain.unwrap_or(DEFAULT_DOMAIN))
            .and_then(|edges| edges.get_mut(name1))
        else {
            return false;
        };
        let before = roles.len();
        roles.retain(|r| r != name2);
        roles.len() != before
    }

    fn has_link(&self, name1: &str, name2: &str, domain: Option<&str>) -> bool {
        if name1 == name2 {
            return true;
        }
        let Some(edges) = self.edges(domain) else {
            return false;
        };

        let mut visited = HashSet::from([name1]);
        let mut frontier = VecDeque::from([(name1, 0usize)]);
        while let Some((name, depth)) = frontier.pop_front() {
            if depth >= self.max_hierarchy_level {
                continue;
            }
            for role in edges.get(name).into_iter().flatten() {
                if role == name2 {
                    return true;
                }
                if visited.insert(role.as_str()) {
                    frontier.push_back((role.as_str(), depth + 1));
                }
            }
        }
        false
    }

    fn get_roles(&self, name: &str, domain: Option<&str>) -> Vec<String> {
        self.edges(domain)
            .and_then(|edges| edges.get(name))
            .cloned()
            .unwrap_or_default()
    }

    fn get_users(&self, name: &str, domain: Option<&str>) -> Vec<String> {
        let Some(edges) = self.edges(domain) else {
            return Vec::new();
        };
        let mut users: Vec<String> = edges
            .iter()
            .filter(|(_, roles)| roles.iter().any(|r| r == name))
            .map(|(user, _)| user.clone())
            .collect();
        users.sort();
        users
    }
}
