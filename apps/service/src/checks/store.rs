//! Shared state between the scheduler loop, the workers, and snapshot
//! readers: the write-once check registry and the latest-result table.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::types::{Check, CheckResult};
use super::validation::ValidationError;

/// Registry of accepted checks, in registration order.
///
/// Populated once at setup and read-only afterward, so no locking is
/// needed around it.
#[derive(Debug, Default)]
pub struct Registry {
    order: Vec<Arc<Check>>,
    by_name: HashMap<String, Arc<Check>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a check. Names are unique keys.
    pub fn insert(&mut self, check: Check) -> Result<(), ValidationError> {
        if self.by_name.contains_key(&check.name) {
            return Err(ValidationError::DuplicateName { name: check.name });
        }

        let check = Arc::new(check);
        self.by_name.insert(check.name.clone(), check.clone());
        self.order.push(check);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Checks in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Check>> {
        self.order.iter()
    }
}

/// Latest-result table: exactly one slot per check name, last write wins.
///
/// Writes are point-wise and short; readers take a brief shared lock to
/// copy the table, so snapshots never block check execution for long.
#[derive(Debug, Default)]
pub struct ResultStore {
    slots: RwLock<HashMap<String, CheckResult>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed run, replacing any previous result for the name.
    pub fn record(&self, result: CheckResult) {
        self.slots
            .write()
            .expect("result table lock poisoned")
            .insert(result.name.clone(), result);
    }

    /// Point-in-time view of every check's last-known state, ordered by
    /// registration. Checks that have not run yet appear as Unknown
    /// placeholders.
    pub fn snapshot(&self, registry: &Registry) -> Vec<CheckResult> {
        let slots = self.slots.read().expect("result table lock poisoned");
        registry
            .iter()
            .map(|check| {
                slots
                    .get(&check.name)
                    .cloned()
                    .unwrap_or_else(|| CheckResult::pending(&check.name))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::types::{CheckKind, CheckState};
    use std::time::Duration;

    fn check(name: &str) -> Check {
        Check {
            name: name.to_owned(),
            kind: CheckKind::Tcp,
            target: "example.com:80".to_owned(),
            expect: String::new(),
            timeout: Duration::from_secs(5),
            interval: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_registry_rejects_duplicate_names() {
        let mut registry = Registry::new();
        assert!(registry.is_empty());
        registry.insert(check("web")).unwrap();
        assert_eq!(
            registry.insert(check("web")),
            Err(ValidationError::DuplicateName { name: "web".to_owned() })
        );
        assert_eq!(registry.len(), 1);
        assert!(!registry.is_empty());
    }

    #[test]
    fn test_snapshot_keeps_registration_order() {
        let mut registry = Registry::new();
        for name in ["zulu", "alpha", "mike"] {
            registry.insert(check(name)).unwrap();
        }

        let store = ResultStore::new();
        // Record out of order; snapshot order must not care.
        store.record(CheckResult::pending("mike").passing("ok".to_owned(), 1));
        store.record(CheckResult::pending("zulu").failing("down".to_owned(), 2));

        let snapshot = store.snapshot(&registry);
        let names: Vec<_> = snapshot.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["zulu", "alpha", "mike"]);

        // Never-run check shows the Unknown placeholder.
        assert_eq!(snapshot[1].state, CheckState::Unknown);
        assert!(snapshot[1].last_run.is_none());
    }

    #[test]
    fn test_last_write_wins() {
        let mut registry = Registry::new();
        registry.insert(check("web")).unwrap();

        let store = ResultStore::new();
        store.record(CheckResult::pending("web").failing("down".to_owned(), 5));
        store.record(CheckResult::pending("web").passing("up".to_owned(), 3));

        let snapshot = store.snapshot(&registry);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].state, CheckState::Ok);
        assert_eq!(snapshot[0].output, "up");
    }

    #[test]
    fn test_snapshot_is_stable_between_runs() {
        let mut registry = Registry::new();
        registry.insert(check("web")).unwrap();

        let store = ResultStore::new();
        store.record(CheckResult::pending("web").passing("up".to_owned(), 3));

        assert_eq!(store.snapshot(&registry), store.snapshot(&registry));
    }
}
