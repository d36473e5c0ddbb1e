// src/lock_tracker.rs
// Per-session record of which datastores this client believes it has locked.
//
// Advisory only: the device decides lock ownership. The tracker never blocks a
// request; it only sharpens the diagnosis when the device refuses one.

use std::collections::HashMap;

use crate::datastore::Datastore;
use crate::operation::OperationKind;

#[derive(Debug, Default, Clone)]
pub struct LockTracker {
    held: HashMap<String, bool>,
}

impl LockTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_lock(&mut self, target: &Datastore) {
        self.held.insert(target.name(), true);
    }

    pub fn record_unlock(&mut self, target: &Datastore) {
        self.held.insert(target.name(), false);
    }

    pub fn is_locked(&self, target: &Datastore) -> bool {
        self.held.get(&target.name()).copied().unwrap_or(false)
    }

    /// Names of the datastores currently believed locked, sorted.
    pub fn held(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .held
            .iter()
            .filter(|(_, locked)| **locked)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn clear(&mut self) {
        self.held.clear();
    }

    /// Local explanation for a device-rejected lock or unlock of `target`.
    pub fn diagnose(&self, operation: OperationKind, target: &Datastore) -> String {
        let held = self.held();
        match operation {
            OperationKind::Unlock if self.is_locked(target) => format!(
                "device refused to unlock {} although this session locked it",
                target
            ),
            OperationKind::Unlock if held.is_empty() => {
                format!("unlock of {} refused: this session holds no locks", target)
            }
            OperationKind::Unlock => format!(
                "unlock of {} refused: this session holds locks on {}, not {}",
                target,
                held.join(", "),
                target
            ),
            OperationKind::Lock if self.is_locked(target) => {
                format!("lock of {} refused: this session already holds it", target)
            }
            _ => format!(
                "{} of {} refused by the device; this session does not hold that lock",
                operation, target
            ),
        }
    }
}
