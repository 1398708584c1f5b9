use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationVerb {
    Assign,
    Reassign,
    Unassign,
    Status,
}

impl OperationVerb {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationVerb::Assign => "assign",
            OperationVerb::Reassign => "reassign",
            OperationVerb::Unassign => "unassign",
            OperationVerb::Status => "status",
        }
    }
}

/// Identifies the operation holding the guard, e.g. `assign-r1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationKey {
    pub verb: OperationVerb,
    pub entity_id: String,
}

impl OperationKey {
    pub fn new(verb: OperationVerb, entity_id: impl Into<String>) -> Self {
        Self {
            verb,
            entity_id: entity_id.into(),
        }
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.verb.as_str(), self.entity_id)
    }
}

/// Single-flight slot: at most one mutating operation per planning session.
#[derive(Debug, Clone, Default)]
pub struct OperationGuard {
    slot: Arc<Mutex<Option<OperationKey>>>,
}

impl OperationGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the slot, or hands back the key of the operation holding it.
    pub fn try_acquire(&self, key: OperationKey) -> Result<OperationPermit, OperationKey> {
        let mut slot = self.lock();
        if let Some(current) = slot.as_ref() {
            return Err(current.clone());
        }
        *slot = Some(key.clone());

        Ok(OperationPermit {
            slot: self.slot.clone(),
            key,
        })
    }

    pub fn current(&self) -> Option<OperationKey> {
        self.lock().clone()
    }

    pub fn is_locked(&self) -> bool {
        self.lock().is_some()
    }

    /// Whether `entity_id` is the operand of the running operation.
    pub fn is_busy(&self, entity_id: &str) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|current| current.entity_id == entity_id)
    }

    fn lock(&self) -> MutexGuard<'_, Option<OperationKey>> {
        // The slot holds plain data, so a poisoned lock is still consistent.
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Releases the guard when dropped, whatever the operation's outcome.
#[derive(Debug)]
pub struct OperationPermit {
    slot: Arc<Mutex<Option<OperationKey>>>,
    key: OperationKey,
}

impl OperationPermit {
    pub fn key(&self) -> &OperationKey {
        &self.key
    }
}

impl Drop for OperationPermit {
    fn drop(&mut self) {
        let mut slot = self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.as_ref() == Some(&self.key) {
            *slot = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_renders_verb_and_entity() {
        let key = OperationKey::new(OperationVerb::Assign, "r1");
        assert_eq!(key.to_string(), "assign-r1");
    }

    #[test]
    fn second_acquire_is_rejected_while_held() {
        let guard = OperationGuard::new();
        let _permit = guard
            .try_acquire(OperationKey::new(OperationVerb::Assign, "r1"))
            .unwrap();

        let holder = guard
            .try_acquire(OperationKey::new(OperationVerb::Unassign, "t2"))
            .unwrap_err();
        assert_eq!(holder, OperationKey::new(OperationVerb::Assign, "r1"));
        assert_eq!(guard.current(), Some(holder));
    }

    #[test]
    fn dropping_permit_releases_slot() {
        let guard = OperationGuard::new();
        {
            let permit = guard
                .try_acquire(OperationKey::new(OperationVerb::Reassign, "t1"))
                .unwrap();
            assert_eq!(permit.key().entity_id, "t1");
            assert!(guard.is_locked());
        }
        assert!(!guard.is_locked());
        assert!(guard.current().is_none());
    }

    #[test]
    fn busy_check_compares_whole_ids() {
        let guard = OperationGuard::new();
        let _permit = guard
            .try_acquire(OperationKey::new(OperationVerb::Unassign, "task-12"))
            .unwrap();

        assert!(guard.is_busy("task-12"));
        assert!(!guard.is_busy("task-1"));
        assert!(!guard.is_busy("12"));
    }
}
