//! Named functions for the matcher evaluator.
//!
//! The registry is independent of the policy lock: registering a function
//! never touches rules or role graphs.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::{PolicyError, Result};

/// A matcher function: takes string arguments, answers yes or no.
pub type MatchFunction = Arc<dyn Fn(&[&str]) -> bool + Send + Sync>;

/// Registry of named matcher functions.
#[derive(Clone, Default)]
pub struct FunctionMap {
    functions: Arc<RwLock<HashMap<String, MatchFunction>>>,
}

impl FunctionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with `keyMatch` and `regexMatch`.
    pub fn with_builtins() -> Self {
        let map = Self::new();
        map.add_function("keyMatch", |args: &[&str]| match args {
            [key1, key2] => key_match(key1, key2),
            _ => false,
        });
        map.add_function("regexMatch", |args: &[&str]| match args {
            [key1, key2] => regex_match(key1, key2),
            _ => false,
        });
        map
    }

    /// Register `function` under `name`, replacing any previous entry.
    pub fn add_function<F>(&self, name: &str, function: F)
    where
        F: Fn(&[&str]) -> bool + Send + Sync + 'static,
    {
        debug!(name, "registering function");
        let previous = self
            .functions
            .write()
            .insert(name.to_string(), Arc::new(function));
        if previous.is_some() {
            debug!(name, "replaced existing function");
        }
    }

    pub fn get(&self, name: &str) -> Option<MatchFunction> {
        self.functions.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.read().contains_key(name)
    }

    /// Invoke a registered function by name.
    pub fn call(&self, name: &str, args: &[&str]) -> Result<bool> {
        let function = self
            .get(name)
            .ok_or_else(|| PolicyError::UnknownFunction(name.to_string()))?;
        Ok(function(args))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for FunctionMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionMap")
            .field("functions", &self.names())
            .finish()
    }
}

/// `key1` equals `key2`, or starts with the part of `key2` before a trailing `*`.
pub fn key_match(key1: &str, key2: &str) -> bool {
    match key2.strip_suffix('*') {
        Some(prefix) => key1.starts_with(prefix),
        None => key1 == key2,
    }
}

/// `key1` matches the regular expression `pattern`; invalid patterns never match.
pub fn regex_match(key1: &str, pattern: &str) -> bool {
    match Regex::new(pattern) {
        Ok(re) => re.is_match(key1),
        Err(e) => {
            warn!(pattern, "invalid regex: {}", e);
            false
        }
    }
}
