//! Event types that accept registered callbacks.
//!
//! The catalog is loaded once at start-up (built-in list or a JSON array) and
//! handed to the callback table; it never changes afterwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::types::Result;

/// Event types callbacks may be registered for when no catalog is supplied.
pub const BUILTIN_EVENT_TYPES: &[&str] = &["boot", "message"];

/// Immutable set of callback-capable event types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventTypeCatalog {
    types: BTreeSet<String>,
}

impl EventTypeCatalog {
    pub fn new<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            types: types.into_iter().map(Into::into).collect(),
        }
    }

    /// Load from a JSON array of strings.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn contains(&self, event_type: &str) -> bool {
        self.types.contains(event_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.types.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl Default for EventTypeCatalog {
    fn default() -> Self {
        Self::new(BUILTIN_EVENT_TYPES.iter().copied())
    }
}
