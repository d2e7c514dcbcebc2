//! Drift detection between desired and observed connector configuration.
//!
//! Both maps are compared in wire form: every value is a string and equality
//! is exact. `tasksMax` and `connectorClass` take part through their wire keys
//! (`tasks.max`, `connector.class`).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::model::DesiredConnector;
use crate::status::ObservedConnector;

/// Keys Kafka Connect fills in on its own and echoes back in the config.
///
/// `name` is injected into every stored config by the worker. Deployments
/// whose runtime adds more bookkeeping keys extend the set with
/// [`DiffEngine::with_ignored_keys`].
pub const SERVER_POPULATED_KEYS: &[&str] = &["name"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Drift {
    /// Desired key missing from the observed config.
    Missing(String),
    /// Observed key not declared in the desired config.
    Unexpected(String),
    Changed {
        key: String,
        desired: String,
        observed: String,
    },
}

impl Drift {
    pub fn key(&self) -> &str {
        match self {
            Drift::Missing(key) | Drift::Unexpected(key) => key,
            Drift::Changed { key, .. } => key,
        }
    }
}

impl fmt::Display for Drift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Drift::Missing(key) => write!(f, "+{}", key),
            Drift::Unexpected(key) => write!(f, "-{}", key),
            Drift::Changed { key, .. } => write!(f, "~{}", key),
        }
    }
}

/// Compares configurations, skipping an explicit ignore-set.
#[derive(Debug, Clone)]
pub struct DiffEngine {
    ignored: BTreeSet<String>,
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self {
            ignored: SERVER_POPULATED_KEYS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl DiffEngine {
    /// Extend the ignore-set beyond [`SERVER_POPULATED_KEYS`].
    pub fn with_ignored_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn is_ignored(&self, key: &str) -> bool {
        self.ignored.contains(key)
    }

    pub fn ignored_keys(&self) -> impl Iterator<Item = &str> {
        self.ignored.iter().map(String::as_str)
    }

    pub fn needs_update(&self, desired: &DesiredConnector, observed: &ObservedConnector) -> bool {
        !self.drift(desired, observed).is_empty()
    }

    /// All differing keys, ordered by key.
    pub fn drift(&self, desired: &DesiredConnector, observed: &ObservedConnector) -> Vec<Drift> {
        self.compare(&desired.wire_config(), &observed.config)
    }

    pub fn compare(
        &self,
        desired: &BTreeMap<String, String>,
        observed: &BTreeMap<String, String>,
    ) -> Vec<Drift> {
        let keys: BTreeSet<&String> = desired
            .keys()
            .chain(observed.keys())
            .filter(|k| !self.is_ignored(k))
            .collect();

        keys.into_iter()
            .filter_map(|key| match (desired.get(key), observed.get(key)) {
                (Some(_), None) => Some(Drift::Missing(key.clone())),
                (None, Some(_)) => Some(Drift::Unexpected(key.clone())),
                (Some(d), Some(o)) if d != o => Some(Drift::Changed {
                    key: key.clone(),
                    desired: d.clone(),
                    observed: o.clone(),
                }),
                _ => None,
            })
            .collect()
    }
}

/// [`DiffEngine::needs_update`] with the default ignore-set.
pub fn needs_update(desired: &DesiredConnector, observed: &ObservedConnector) -> bool {
    DiffEngine::default().needs_update(desired, observed)
}
