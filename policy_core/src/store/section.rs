use std::collections::HashSet;

use crate::error::{PolicyError, Result};
use crate::rule::{Family, Rule};

/// Rules of one ptype: an ordered sequence plus a membership index.
///
/// The two always hold the same rules; enumeration follows insertion order.
#[derive(Debug, Clone, Default)]
pub struct Section {
    // Field names when the section was declared with a fixed shape
    tokens: Option<Vec<String>>,
    // Rules in insertion order
    rules: Vec<Rule>,
    // Membership index over `rules`
    members: HashSet<Rule>,
}

impl Section {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a section whose rules must have exactly `tokens.len()` fields.
    pub fn with_tokens(tokens: Vec<String>) -> Self {
        Self {
            tokens: Some(tokens),
            ..Self::default()
        }
    }

    pub fn tokens(&self) -> Option<&[String]> {
        self.tokens.as_deref()
    }

    pub fn arity(&self) -> Option<usize> {
        self.tokens.as_ref().map(Vec::len)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn contains(&self, rule: &Rule) -> bool {
        self.members.contains(rule)
    }

    pub fn position(&self, rule: &Rule) -> Option<usize> {
        if !self.contains(rule) {
            return None;
        }
        self.rules.iter().position(|r| r == rule)
    }

    /// Check that `rule` fits this section.
    pub fn validate(&self, ptype: &str, rule: &Rule) -> Result<()> {
        if rule.is_empty() {
            return Err(PolicyError::malformed(format!(
                "empty rule for section '{}'",
                ptype
            )));
        }

        if let Some(arity) = self.arity() {
            if rule.len() != arity {
                return Err(PolicyError::malformed(format!(
                    "rule {} has {} fields, section '{}' expects {}",
                    rule,
                    rule.len(),
                    ptype,
                    arity
                )));
            }
        }

        if Family::is_grouping(ptype) && rule.len() < 2 {
            return Err(PolicyError::malformed(format!(
                "grouping rule {} needs at least two fields",
                rule
            )));
        }

        Ok(())
    }

    pub(crate) fn widest_rule(&self) -> usize {
        self.rules.iter().map(|r| r.len()).max().unwrap_or(0)
    }

    /// Append a rule. Returns false if it is already present.
    pub(crate) fn push(&mut self, rule: Rule) -> bool {
        if !self.members.insert(rule.clone()) {
            return false;
        }
        self.rules.push(rule);
        true
    }

    /// Remove a rule. Returns false if it was absent.
    pub(crate) fn remove(&mut self, rule: &Rule) -> bool {
        if !self.members.remove(rule) {
            return false;
        }
        self.rules.retain(|r| r != rule);
        true
    }

    /// Replace the rule at `index`, keeping its position.
    pub(crate) fn replace_at(&mut self, index: usize, rule: Rule) {
        let old = std::mem::replace(&mut self.rules[index], rule.clone());
        self.members.remove(&old);
        self.members.insert(rule);
    }

    /// Apply several positional replacements, then reindex membership.
    pub(crate) fn replace_many(&mut self, edits: Vec<(usize, Rule)>) {
        for (index, rule) in edits {
            self.rules[index] = rule;
        }
        self.members = self.rules.iter().cloned().collect();
    }

    /// Remove every rule matching `predicate`, returning them in order.
    pub(crate) fn drain_matching<F>(&mut self, predicate: F) -> Vec<Rule>
    where
        F: Fn(&Rule) -> bool,
    {
        let (removed, kept): (Vec<Rule>, Vec<Rule>) =
            self.rules.drain(..).partition(|r| predicate(r));
        self.rules = kept;
        for rule in &removed {
            self.members.remove(rule);
        }
        removed
    }

    pub(crate) fn clear(&mut self) {
        self.rules.clear();
        self.members.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_push_keeps_order_and_uniqueness() {
        let mut section = Section::new();
        assert!(section.push(Rule::from(["b"])));
        assert!(section.push(Rule::from(["a"])));
        assert!(!section.push(Rule::from(["b"])));

        assert_eq!(section.len(), 2);
        assert_eq!(section.rules(), &[Rule::from(["b"]), Rule::from(["a"])]);
    }

    #[test]
    fn test_section_replace_at() {
        let mut section = Section::new();
        section.push(Rule::from(["1"]));
        section.push(Rule::from(["2"]));
        section.push(Rule::from(["3"]));

        section.replace_at(1, Rule::from(["two"]));
        assert_eq!(section.position(&Rule::from(["two"])), Some(1));
        assert!(!section.contains(&Rule::from(["2"])));
    }

    #[test]
    fn test_section_drain_matching() {
        let mut section = Section::new();
        for name in ["a1", "b1", "a2"] {
            section.push(Rule::from([name]));
        }

        let removed = section.drain_matching(|r| r[0].starts_with('a'));
        assert_eq!(removed, vec![Rule::from(["a1"]), Rule::from(["a2"])]);
        assert_eq!(section.rules(), &[Rule::from(["b1"])]);
        assert!(!section.contains(&Rule::from(["a1"])));
    }

    #[test]
    fn test_validate_shape() {
        let section = Section::with_tokens(vec!["sub".into(), "obj".into(), "act".into()]);
        assert!(section.validate("p", &Rule::from(["a", "b", "c"])).is_ok());
        assert!(matches!(
            section.validate("p", &Rule::from(["a", "b"])),
            Err(PolicyError::MalformedRule(_))
        ));
        assert!(matches!(
            Section::new().validate("p", &Rule::default()),
            Err(PolicyError::MalformedRule(_))
        ));
        assert!(matches!(
            Section::new().validate("g", &Rule::from(["alice"])),
            Err(PolicyError::MalformedRule(_))
        ));
    }
}
