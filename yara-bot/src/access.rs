//! Allow-list gate.

use std::collections::HashSet;

/// Static set of authorized identities (user ids or usernames).
#[derive(Debug, Clone, Default)]
pub struct AccessGate {
    allowed: HashSet<String>,
    allow_all: bool,
}

impl AccessGate {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut allowed = HashSet::new();
        let mut allow_all = false;
        for entry in entries {
            let entry = entry.as_ref().trim().trim_start_matches('@');
            if entry == "*" {
                allow_all = true;
            } else if !entry.is_empty() {
                allowed.insert(entry.to_string());
            }
        }
        Self { allowed, allow_all }
    }

    /// Whether a single identity is on the list.
    pub fn is_authorized(&self, identity: &str) -> bool {
        self.allow_all || self.allowed.contains(identity.trim_start_matches('@'))
    }

    /// Whether any of the sender's identities is on the list.
    pub fn is_any_authorized<'a>(&self, mut identities: impl Iterator<Item = &'a str>) -> bool {
        self.allow_all || identities.any(|id| self.is_authorized(id))
    }

    pub fn is_empty(&self) -> bool {
        !self.allow_all && self.allowed.is_empty()
    }
}
