//! Enforcer configuration.
//!
//! Loaded from TOML. Declares section shapes, role-graph settings and an
//! optional list of rules to seed the model with at start-up.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PolicyError, Result};
use crate::role::DEFAULT_MAX_HIERARCHY_LEVEL;
use crate::rule::Rule;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnforcerConfig {
    /// Rebuild role graphs after every grouping mutation
    pub auto_build_role_links: bool,

    /// Depth limit for role inheritance lookups
    pub max_hierarchy_level: usize,

    /// Declared sections: ptype -> field tokens
    pub sections: BTreeMap<String, Vec<String>>,

    /// Rules loaded when the manager is created
    pub seed: Vec<SeedRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedRule {
    pub ptype: String,
    pub fields: Vec<String>,
}

impl SeedRule {
    pub fn rule(&self) -> Rule {
        Rule::from(self.fields.clone())
    }
}

impl Default for EnforcerConfig {
    fn default() -> Self {
        Self {
            auto_build_role_links: true,
            max_hierarchy_level: DEFAULT_MAX_HIERARCHY_LEVEL,
            sections: BTreeMap::new(),
            seed: Vec::new(),
        }
    }
}

impl EnforcerConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: EnforcerConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading enforcer config from {:?}", path);
        let source = fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_hierarchy_level == 0 {
            return Err(PolicyError::Config(
                "max_hierarchy_level must be at least 1".to_string(),
            ));
        }
        for (ptype, tokens) in &self.sections {
            if ptype.is_empty() {
                return Err(PolicyError::Config("section name cannot be empty".to_string()));
            }
            if tokens.is_empty() {
                return Err(PolicyError::Config(format!(
                    "section '{}' declares no fields",
                    ptype
                )));
            }
        }
        if let Some(seed) = self.seed.iter().find(|s| s.ptype.is_empty()) {
            return Err(PolicyError::Config(format!(
                "seed rule {:?} has no ptype",
                seed.fields
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
auto_build_role_links = false
max_hierarchy_level = 5

[sections]
p = ["sub", "obj", "act"]
g = ["_", "_"]

[[seed]]
ptype = "p"
fields = ["alice", "data1", "read"]

[[seed]]
ptype = "g"
fields = ["alice", "admin"]
"#;

    #[test]
    fn test_parse_config() {
        let config = EnforcerConfig::from_toml_str(SAMPLE).unwrap();
        assert!(!config.auto_build_role_links);
        assert_eq!(config.max_hierarchy_level, 5);
        assert_eq!(config.sections["p"], vec!["sub", "obj", "act"]);
        assert_eq!(config.seed.len(), 2);
        assert_eq!(config.seed[1].rule(), Rule::from(["alice", "admin"]));
    }

    #[test]
    fn test_defaults() {
        let config = EnforcerConfig::from_toml_str("").unwrap();
        assert_eq!(config, EnforcerConfig::default());
        assert!(config.auto_build_role_links);
        assert_eq!(config.max_hierarchy_level, DEFAULT_MAX_HIERARCHY_LEVEL);
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            EnforcerConfig::from_toml_str("max_hierarchy_level = 0"),
            Err(PolicyError::Config(_))
        ));
        assert!(matches!(
            EnforcerConfig::from_toml_str("[sections]\np = []"),
            Err(PolicyError::Config(_))
        ));
        assert!(matches!(
            EnforcerConfig::from_toml_str("auto_build_role_links = \"yes\""),
            Err(PolicyError::Toml(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = EnforcerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.sections.len(), 2);

        assert!(matches!(
            EnforcerConfig::from_file("/nonexistent/policy.toml"),
            Err(PolicyError::Io(_))
        ));
    }
}
