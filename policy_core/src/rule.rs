use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

/// Default section names for authorization and grouping rules.
pub const DEFAULT_POLICY_TYPE: &str = "p";
pub const DEFAULT_GROUPING_TYPE: &str = "g";

/// Which family a section belongs to.
///
/// Grouping sections (`g`, `g2`, ...) feed the role graph; every other
/// section holds plain authorization rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Family {
    Policy,
    Grouping,
}

impl Family {
    pub fn of(ptype: &str) -> Self {
        if ptype.starts_with('g') {
            Family::Grouping
        } else {
            Family::Policy
        }
    }

    pub fn is_grouping(ptype: &str) -> bool {
        Family::of(ptype) == Family::Grouping
    }
}

/// One authorization or grouping statement: an ordered list of field values.
///
/// Two rules are equal iff their fields are equal position by position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rule(Vec<String>);

impl Rule {
    pub fn new(fields: Vec<String>) -> Self {
        Self(fields)
    }

    pub fn fields(&self) -> &[String] {
        &self.0
    }

    pub fn field(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    pub fn into_fields(self) -> Vec<String> {
        self.0
    }

    /// Whether the fields starting at `field_index` match `field_values`.
    /// Empty values are wildcards.
    pub fn matches_filter(&self, field_index: usize, field_values: &[&str]) -> bool {
        field_values.iter().enumerate().all(|(offset, value)| {
            value.is_empty() || self.field(field_index + offset) == Some(*value)
        })
    }
}

impl Deref for Rule {
    type Target = [String];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

impl From<Vec<String>> for Rule {
    fn from(fields: Vec<String>) -> Self {
        Self(fields)
    }
}

impl From<Vec<&str>> for Rule {
    fn from(fields: Vec<&str>) -> Self {
        Self(fields.into_iter().map(String::from).collect())
    }
}

impl From<&[&str]> for Rule {
    fn from(fields: &[&str]) -> Self {
        Self(fields.iter().map(|f| f.to_string()).collect())
    }
}

impl From<&[String]> for Rule {
    fn from(fields: &[String]) -> Self {
        Self(fields.to_vec())
    }
}

impl<const N: usize> From<[&str; N]> for Rule {
    fn from(fields: [&str; N]) -> Self {
        Self(fields.iter().map(|f| f.to_string()).collect())
    }
}

impl From<&Rule> for Rule {
    fn from(rule: &Rule) -> Self {
        rule.clone()
    }
}

/// Normalize a batch of rule-like values.
pub fn collect_rules<I, R>(rules: I) -> Vec<Rule>
where
    I: IntoIterator<Item = R>,
    R: Into<Rule>,
{
    rules.into_iter().map(Into::into).collect()
}
