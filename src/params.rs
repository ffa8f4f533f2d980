//! Per-statement record of bound parameter values.

use std::collections::BTreeMap;
use std::fmt;

use crate::value::BoundValue;

/// Identifies a bound parameter: a 1-based position or a driver-level name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParameterKey {
    Index(u32),
    Name(String),
}

impl From<u32> for ParameterKey {
    fn from(index: u32) -> Self {
        ParameterKey::Index(index)
    }
}

impl From<&str> for ParameterKey {
    fn from(name: &str) -> Self {
        ParameterKey::Name(name.to_owned())
    }
}

impl From<String> for ParameterKey {
    fn from(name: String) -> Self {
        ParameterKey::Name(name)
    }
}

impl fmt::Display for ParameterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterKey::Index(i) => write!(f, "{i}"),
            ParameterKey::Name(n) => f.write_str(n),
        }
    }
}

/// The last value bound to each parameter of one statement.
///
/// A bound NULL is stored as [`BoundValue::Null`], which is distinct from a
/// parameter that was never bound. No bounds checking is done here; the
/// driver rejects bad indices before a value is recorded.
#[derive(Debug, Clone, Default)]
pub struct ParameterStore {
    values: BTreeMap<ParameterKey, BoundValue>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `value` for `key`, replacing any earlier value.
    pub fn set(&mut self, key: impl Into<ParameterKey>, value: BoundValue) {
        self.values.insert(key.into(), value);
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn get(&self, key: &ParameterKey) -> Option<&BoundValue> {
        self.values.get(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Copy the current bindings. Later changes to the store are not visible
    /// through the snapshot.
    pub fn snapshot(&self) -> ParameterSnapshot {
        ParameterSnapshot {
            values: self.values.clone(),
        }
    }
}

/// An owned, ordered copy of a [`ParameterStore`] taken at call time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSnapshot {
    values: BTreeMap<ParameterKey, BoundValue>,
}

impl ParameterSnapshot {
    pub fn get(&self, key: &ParameterKey) -> Option<&BoundValue> {
        self.values.get(key)
    }

    pub fn index(&self, index: u32) -> Option<&BoundValue> {
        self.values.get(&ParameterKey::Index(index))
    }

    pub fn name(&self, name: &str) -> Option<&BoundValue> {
        self.values.get(&ParameterKey::Name(name.to_owned()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ParameterKey, &BoundValue)> {
        self.values.iter()
    }
}

impl FromIterator<(ParameterKey, BoundValue)> for ParameterSnapshot {
    fn from_iter<I: IntoIterator<Item = (ParameterKey, BoundValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}
