//! Alert state that outlives a single evaluation cycle.
//!
//! A [`WrappedGroup`](crate::WrappedGroup) is rebuilt every scheduling cycle,
//! so each alerting rule's active set is checked out of this store before
//! evaluation and checked back in afterwards.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use tracing::warn;

use crate::alert::{ActiveAlerts, Alert};

/// Identity of an alerting rule: its group, its position in the group and its name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleKey {
    pub group: String,
    pub position: usize,
    pub name: String,
}

impl RuleKey {
    pub fn new(group: impl Into<String>, position: usize, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            position,
            name: name.into(),
        }
    }
}

#[derive(Debug, Default)]
pub struct AlertStateStore {
    rules: Mutex<HashMap<RuleKey, ActiveAlerts>>,
}

impl AlertStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return the active set for `key` (empty if unknown).
    pub fn take(&self, key: &RuleKey) -> ActiveAlerts {
        match self.rules.lock() {
            Ok(mut rules) => rules.remove(key).unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "alert state lock poisoned");
                ActiveAlerts::new()
            }
        }
    }

    /// Store the active set for `key`; an empty set clears the entry.
    pub fn put(&self, key: RuleKey, alerts: ActiveAlerts) {
        if let Ok(mut rules) = self.rules.lock() {
            if alerts.is_empty() {
                rules.remove(&key);
            } else {
                rules.insert(key, alerts);
            }
        }
    }

    /// Drop state for every group not in `groups`. Returns the number of
    /// rule entries removed.
    pub fn retain_groups(&self, groups: &HashSet<String>) -> usize {
        let Ok(mut rules) = self.rules.lock() else {
            return 0;
        };
        let before = rules.len();
        rules.retain(|k, _| groups.contains(&k.group));
        before - rules.len()
    }

    /// Every tracked alert whose group key starts with `prefix`
    /// (e.g. `"t1/"` for one tenant).
    pub fn alerts_with_prefix(&self, prefix: &str) -> Vec<Alert> {
        let Ok(rules) = self.rules.lock() else {
            return Vec::new();
        };
        let mut out: Vec<Alert> = rules
            .iter()
            .filter(|(k, _)| k.group.starts_with(prefix))
            .flat_map(|(_, alerts)| alerts.values().cloned())
            .collect();
        out.sort_by(|a, b| a.labels.cmp(&b.labels));
        out
    }

    /// Number of rules with tracked alerts.
    pub fn len(&self) -> usize {
        self.rules.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertState;
    use crate::engine::Labels;
    use chrono::Utc;

    fn alert(name: &str) -> Alert {
        Alert {
            labels: Labels::from([("alertname".into(), name.into())]),
            annotations: Labels::new(),
            state: AlertState::Firing,
            value: 1.0,
            active_at: Utc::now(),
            fired_at: Some(Utc::now()),
            resolved_at: None,
        }
    }

    #[test]
    fn take_put_cycle() {
        let store = AlertStateStore::new();
        let key = RuleKey::new("t1/ns/g", 0, "A");
        assert!(store.take(&key).is_empty());

        let a = alert("A");
        let mut set = ActiveAlerts::new();
        set.insert(a.labels.clone(), a);
        store.put(key.clone(), set);
        assert_eq!(store.len(), 1);

        let back = store.take(&key);
        assert_eq!(back.len(), 1);
        assert!(store.is_empty());

        store.put(key.clone(), ActiveAlerts::new());
        assert!(store.is_empty());
    }

    #[test]
    fn prefix_listing_is_tenant_scoped() {
        let store = AlertStateStore::new();
        for (group, name) in [("t1/ns/g", "A"), ("t2/ns/g", "B")] {
            let a = alert(name);
            let mut set = ActiveAlerts::new();
            set.insert(a.labels.clone(), a);
            store.put(RuleKey::new(group, 0, name), set);
        }
        let t1 = store.alerts_with_prefix("t1/");
        assert_eq!(t1.len(), 1);
        assert_eq!(t1[0].name(), "A");
    }

    #[test]
    fn retain_groups_drops_deleted_groups() {
        let store = AlertStateStore::new();
        for (group, name) in [("t1/ns/kept", "A"), ("t1/ns/gone", "B"), ("t1/ns/gone", "C")] {
            let a = alert(name);
            let mut set = ActiveAlerts::new();
            set.insert(a.labels.clone(), a);
            store.put(RuleKey::new(group, 0, name), set);
        }

        let keep = HashSet::from(["t1/ns/kept".to_string()]);
        assert_eq!(store.retain_groups(&keep), 2);
        let left = store.alerts_with_prefix("t1/");
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].name(), "A");
    }
}
