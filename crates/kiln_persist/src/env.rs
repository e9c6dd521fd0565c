//! Process environments recorded with a build graph.

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::process::Command;

use crate::error::PersistResult;
use crate::persist::Persist;
use crate::pool::PersistentPool;

/// An environment a command ran with, ordered by variable name.
///
/// Stored exactly like a `BTreeMap<String, String>`: a count followed by
/// name/value pairs, both through the string table. Sorting makes the
/// encoding independent of the order variables were added in.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    /// Creates an empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name` to `value`, returning the previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.vars.insert(name.into(), value.into())
    }

    /// Removes `name`, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.vars.remove(name)
    }

    /// Looks up a variable.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Iterates over `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Returns `true` if no variable is set.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Makes `command` run with exactly this environment.
    pub fn apply_to(&self, command: &mut Command) {
        command.env_clear().envs(&self.vars);
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Environment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl IntoIterator for Environment {
    type Item = (String, String);
    type IntoIter = btree_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.vars.into_iter()
    }
}

impl Persist for Environment {
    fn store(&self, pool: &mut PersistentPool) -> PersistResult<()> {
        self.vars.store(pool)
    }

    fn load(pool: &mut PersistentPool) -> PersistResult<Self> {
        BTreeMap::load(pool).map(|vars| Self { vars })
    }
}
