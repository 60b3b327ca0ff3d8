//! Permission alias expansion.
//!
//! An alias permission stands for one or more real `(permission, argument)`
//! pairs. The snapshot builder asks an [`AliasExpander`] about every grant it
//! loads and records what comes back as alias grants on the same holder.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Placeholder replaced by the source grant's argument.
pub const ARGUMENT_PLACEHOLDER: &str = "{arg}";

/// Strategy for expanding a grant into alias grants.
pub trait AliasExpander: Send + Sync {
    /// The `(permission, argument)` pairs `permission`/`argument` expands to.
    fn aliases(&self, permission: &str, argument: &str) -> Vec<(String, String)>;
}

/// Expands nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAliases;

impl AliasExpander for NoAliases {
    fn aliases(&self, _permission: &str, _argument: &str) -> Vec<(String, String)> {
        Vec::new()
    }
}

/// One target of an alias rule. `argument` may contain `{arg}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasTarget {
    pub permission: String,
    #[serde(default = "default_argument")]
    pub argument: String,
}

fn default_argument() -> String {
    ARGUMENT_PLACEHOLDER.to_string()
}

/// A `[[aliases]]` entry from the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasRule {
    pub permission: String,
    #[serde(default)]
    pub expands_to: Vec<AliasTarget>,
}

/// Table-driven expander built from alias rules.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    rules: HashMap<String, Vec<AliasTarget>>,
}

impl AliasTable {
    pub fn new(rules: &[AliasRule]) -> Self {
        let mut table: HashMap<String, Vec<AliasTarget>> = HashMap::new();
        for rule in rules {
            table
                .entry(rule.permission.clone())
                .or_default()
                .extend(rule.expands_to.iter().cloned());
        }
        Self { rules: table }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }
}

impl AliasExpander for AliasTable {
    fn aliases(&self, permission: &str, argument: &str) -> Vec<(String, String)> {
        match self.rules.get(permission) {
            Some(targets) => targets
                .iter()
                .map(|t| {
                    (
                        t.permission.clone(),
                        t.argument.replace(ARGUMENT_PLACEHOLDER, argument),
                    )
                })
                .collect(),
            None => Vec::new(),
        }
    }
}
