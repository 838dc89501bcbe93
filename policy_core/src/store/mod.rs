//! Policy storage.
//!
//! The store owns every section of the policy model and is the only place
//! rules are mutated. It knows nothing about locking; callers go through
//! [`PolicyManager`](crate::manager::PolicyManager), which serializes access.

mod section;

pub use section::Section;

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::error::{PolicyError, Result};
use crate::rule::{Family, Rule};

/// In-memory, section-keyed collection of rules.
#[derive(Debug, Clone, Default)]
pub struct PolicyStore {
    sections: BTreeMap<String, Section>,
}

impl PolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a section with fixed field tokens, e.g. `p = sub, obj, act`.
    ///
    /// Redeclaring an existing section keeps its rules only if they still fit.
    pub fn declare_section(&mut self, ptype: &str, tokens: Vec<String>) -> Result<()> {
        let mut section = Section::with_tokens(tokens);
        if let Some(existing) = self.sections.get(ptype) {
            for rule in existing.rules() {
                section.validate(ptype, rule)?;
                section.push(rule.clone());
            }
        }
        self.sections.insert(ptype.to_string(), section);
        Ok(())
    }

    pub fn section(&self, ptype: &str) -> Option<&Section> {
        self.sections.get(ptype)
    }

    /// All sections, ordered by ptype.
    pub fn sections(&self) -> impl Iterator<Item = (&str, &Section)> {
        self.sections.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Sections that feed the role graph.
    pub fn grouping_sections(&self) -> impl Iterator<Item = (&str, &Section)> {
        self.sections().filter(|(ptype, _)| Family::is_grouping(ptype))
    }

    pub fn len(&self, ptype: &str) -> usize {
        self.sections.get(ptype).map_or(0, Section::len)
    }

    /// Drop every rule while keeping declared section shapes.
    pub fn clear(&mut self) {
        for section in self.sections.values_mut() {
            section.clear();
        }
    }

    /// Distinct values found at `field_index`, in first-seen order.
    pub fn values_for_field(&self, ptype: &str, field_index: usize) -> Result<Vec<String>> {
        let Some(section) = self.sections.get(ptype) else {
            return Ok(Vec::new());
        };
        check_span(ptype, section, field_index, 1)?;

        let mut seen = HashSet::new();
        let values = section
            .rules()
            .iter()
            .filter_map(|rule| rule.field(field_index))
            .filter(|value| seen.insert(*value))
            .map(String::from)
            .collect();
        Ok(values)
    }

    pub fn all_rules(&self, ptype: &str) -> Vec<Rule> {
        self.sections
            .get(ptype)
            .map(|s| s.rules().to_vec())
            .unwrap_or_default()
    }

    /// Rules whose fields from `field_index` on match `field_values`.
    /// Empty values are wildcards.
    pub fn filtered_rules(
        &self,
        ptype: &str,
        field_index: usize,
        field_values: &[&str],
    ) -> Result<Vec<Rule>> {
        let Some(section) = self.sections.get(ptype) else {
            return Ok(Vec::new());
        };
        check_span(ptype, section, field_index, filter_span(field_values))?;

        Ok(section
            .rules()
            .iter()
            .filter(|rule| rule.matches_filter(field_index, field_values))
            .cloned()
            .collect())
    }

    pub fn has_rule(&self, ptype: &str, rule: &Rule) -> bool {
        self.sections
            .get(ptype)
            .is_some_and(|section| section.contains(rule))
    }

    pub fn add_rule(&mut self, ptype: &str, rule: Rule) -> Result<bool> {
        self.validate(ptype, &rule)?;
        let section = self.sections.entry(ptype.to_string()).or_default();
        Ok(section.push(rule))
    }

    /// Add every rule or none of them.
    pub fn add_rules(&mut self, ptype: &str, rules: Vec<Rule>) -> Result<bool> {
        for rule in &rules {
            self.validate(ptype, rule)?;
        }
        if rules.is_empty() {
            return Ok(false);
        }

        let mut incoming = HashSet::new();
        for rule in &rules {
            if self.has_rule(ptype, rule) || !incoming.insert(rule) {
                debug!(ptype, %rule, "rejecting batch add, rule already present");
                return Ok(false);
            }
        }

        let section = self.sections.entry(ptype.to_string()).or_default();
        for rule in rules {
            section.push(rule);
        }
        Ok(true)
    }

    pub fn remove_rule(&mut self, ptype: &str, rule: &Rule) -> Result<bool> {
        self.validate(ptype, rule)?;
        Ok(self
            .sections
            .get_mut(ptype)
            .is_some_and(|section| section.remove(rule)))
    }

    /// Remove every rule or none of them.
    pub fn remove_rules(&mut self, ptype: &str, rules: &[Rule]) -> Result<bool> {
        for rule in rules {
            self.validate(ptype, rule)?;
        }
        let Some(section) = self.sections.get_mut(ptype) else {
            return Ok(false);
        };
        if rules.is_empty() {
            return Ok(false);
        }

        let mut outgoing = HashSet::new();
        for rule in rules {
            if !section.contains(rule) || !outgoing.insert(rule) {
                debug!(ptype, %rule, "rejecting batch remove, rule missing");
                return Ok(false);
            }
        }

        for rule in rules {
            section.remove(rule);
        }
        Ok(true)
    }

    pub fn remove_filtered(
        &mut self,
        ptype: &str,
        field_index: usize,
        field_values: &[&str],
    ) -> Result<bool> {
        Ok(!self
            .remove_filtered_rules(ptype, field_index, field_values)?
            .is_empty())
    }

    /// Remove every rule matching the filter and return what was removed.
    pub fn remove_filtered_rules(
        &mut self,
        ptype: &str,
        field_index: usize,
        field_values: &[&str],
    ) -> Result<Vec<Rule>> {
        let Some(section) = self.sections.get_mut(ptype) else {
            return Ok(Vec::new());
        };
        check_span(ptype, section, field_index, filter_span(field_values))?;

        Ok(section.drain_matching(|rule| rule.matches_filter(field_index, field_values)))
    }

    /// Replace `old` with `new` in place.
    ///
    /// Returns false if `old` is absent or if `new` already exists as a
    /// different rule; the section is left untouched in both cases.
    pub fn update_rule(&mut self, ptype: &str, old: &Rule, new: Rule) -> Result<bool> {
        self.validate(ptype, old)?;
        self.validate(ptype, &new)?;

        let Some(section) = self.sections.get_mut(ptype) else {
            return Ok(false);
        };
        let Some(index) = section.position(old) else {
            return Ok(false);
        };
        if new != *old && section.contains(&new) {
            debug!(ptype, %new, "rejecting update, target rule already present");
            return Ok(false);
        }

        section.replace_at(index, new);
        Ok(true)
    }

    /// Pairwise update of `olds[i]` to `news[i]`, all or nothing.
    pub fn update_rules(&mut self, ptype: &str, olds: &[Rule], news: Vec<Rule>) -> Result<bool> {
        if olds.len() != news.len() {
            return Err(PolicyError::malformed(format!(
                "update of {} rules given {} replacements",
                olds.len(),
                news.len()
            )));
        }
        for rule in olds.iter().chain(news.iter()) {
            self.validate(ptype, rule)?;
        }
        let Some(section) = self.sections.get_mut(ptype) else {
            return Ok(false);
        };
        if olds.is_empty() {
            return Ok(false);
        }

        let mut positions = Vec::with_capacity(olds.len());
        let mut seen_positions = HashSet::new();
        for old in olds {
            match section.position(old) {
                Some(index) if seen_positions.insert(index) => positions.push(index),
                _ => return Ok(false),
            }
        }

        let replaced: HashSet<&Rule> = olds.iter().collect();
        let mut incoming = HashSet::new();
        for new in &news {
            if !incoming.insert(new) || (section.contains(new) && !replaced.contains(new)) {
                debug!(ptype, %new, "rejecting batch update, target rule already present");
                return Ok(false);
            }
        }

        section.replace_many(positions.into_iter().zip(news).collect());
        Ok(true)
    }

    fn validate(&self, ptype: &str, rule: &Rule) -> Result<()> {
        match self.sections.get(ptype) {
            Some(section) => section.validate(ptype, rule),
            None => Section::new().validate(ptype, rule),
        }
    }
}

/// Number of leading columns a filter actually constrains.
fn filter_span(field_values: &[&str]) -> usize {
    field_values
        .iter()
        .rposition(|v| !v.is_empty())
        .map_or(0, |last| last + 1)
}

fn check_span(ptype: &str, section: &Section, field_index: usize, span: usize) -> Result<()> {
    if span == 0 {
        return Ok(());
    }

    let width = match section.arity() {
        Some(arity) => arity,
        None if section.is_empty() => return Ok(()),
        None => section.widest_rule(),
    };

    if field_index.checked_add(span).map_or(true, |end| end > width) {
        return Err(PolicyError::IndexOutOfRange {
            ptype: ptype.to_string(),
            index: field_index,
            width,
        });
    }
    Ok(())
}
