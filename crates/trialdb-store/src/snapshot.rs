use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use trialdb_query::{matches, Predicate};
use trialdb_types::{Entity, EntityId, Fingerprint, Project, Trial, TrialGroup};

use crate::error::{StoreError, StoreResult};

/// The in-memory object store: one id-keyed map over all entity kinds
/// plus the derived indices.
///
/// The id lists (`projects`, `groups`, `trials`) double as the store's
/// native iteration order: ids are appended at creation and queries walk
/// them front to back, so results come out in discovery order.
///
/// In eager mode a snapshot is throwaway state — it is rebuilt from the
/// backing file on every guarded call and owns every entity it hands out
/// as a fresh clone.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// All entities, one namespace across kinds.
    #[serde(default)]
    pub objects: BTreeMap<EntityId, Entity>,
    /// Project name -> id.
    #[serde(default)]
    pub project_names: BTreeMap<String, EntityId>,
    /// Group name -> id.
    #[serde(default)]
    pub group_names: BTreeMap<String, EntityId>,
    /// Project ids in creation order.
    #[serde(default)]
    pub projects: Vec<EntityId>,
    /// Group ids in creation order.
    #[serde(default)]
    pub groups: Vec<EntityId>,
    /// Trial ids in creation order.
    #[serde(default)]
    pub trials: Vec<EntityId>,
}

impl Snapshot {
    pub fn get(&self, id: &EntityId) -> Option<&Entity> {
        self.objects.get(id)
    }

    pub fn project(&self, id: &EntityId) -> Option<&Project> {
        self.objects.get(id).and_then(Entity::as_project)
    }

    pub fn group(&self, id: &EntityId) -> Option<&TrialGroup> {
        self.objects.get(id).and_then(Entity::as_group)
    }

    pub fn trial(&self, id: &EntityId) -> Option<&Trial> {
        self.objects.get(id).and_then(Entity::as_trial)
    }

    /// Every revision recorded for a fingerprint, in discovery order.
    pub fn trials_with_fingerprint(&self, fingerprint: &Fingerprint) -> Vec<&Trial> {
        self.trials
            .iter()
            .filter_map(|id| self.trial(id))
            .filter(|t| t.fingerprint == *fingerprint)
            .collect()
    }

    /// The highest revision recorded for a fingerprint, if any.
    pub fn max_revision(&self, fingerprint: &Fingerprint) -> Option<u32> {
        self.trials_with_fingerprint(fingerprint)
            .iter()
            .map(|t| t.revision)
            .max()
    }

    /// Run a predicate over an id list in native order.
    ///
    /// An id present in the list but missing from the object map is a
    /// consistency fault: fatal when `strict`, otherwise warned and
    /// skipped.
    pub fn fetch(
        &self,
        ids: &[EntityId],
        predicate: &Predicate,
        strict: bool,
    ) -> StoreResult<Vec<Entity>> {
        let mut selected = Vec::new();
        for id in ids {
            let Some(entity) = self.objects.get(id) else {
                if strict {
                    return Err(StoreError::ConsistencyFault { id: *id });
                }
                warn!(id = %id.short_hex(), "index references a missing object; skipped");
                continue;
            };
            if matches(entity, predicate) {
                selected.push(entity.clone());
            }
        }
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trialdb_types::Status;

    fn trial_with(params: &[(&str, serde_json::Value)]) -> Trial {
        Trial::new(
            params
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    fn populated() -> (Snapshot, Trial, Trial) {
        let mut snapshot = Snapshot::default();
        let a = trial_with(&[("a", json!(1))]);
        let b = trial_with(&[("a", json!(2))]);
        for t in [&a, &b] {
            snapshot.objects.insert(t.id(), Entity::Trial(t.clone()));
            snapshot.trials.push(t.id());
        }
        (snapshot, a, b)
    }

    #[test]
    fn typed_lookups() {
        let (snapshot, a, _) = populated();
        assert!(snapshot.trial(&a.id()).is_some());
        assert!(snapshot.project(&a.id()).is_none());
        assert!(snapshot.get(&EntityId::for_project("absent")).is_none());
    }

    #[test]
    fn revisions_share_a_fingerprint() {
        let (mut snapshot, a, _) = populated();
        let mut second = a.clone();
        second.revision = 1;
        snapshot.objects.insert(second.id(), Entity::Trial(second.clone()));
        snapshot.trials.push(second.id());

        let found = snapshot.trials_with_fingerprint(&a.fingerprint);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].revision, 0);
        assert_eq!(found[1].revision, 1);
        assert_eq!(snapshot.max_revision(&a.fingerprint), Some(1));
    }

    #[test]
    fn fetch_preserves_native_order() {
        let (snapshot, a, b) = populated();
        let out = snapshot.fetch(&snapshot.trials, &Predicate::new(), true).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id(), a.id());
        assert_eq!(out[1].id(), b.id());
    }

    #[test]
    fn fetch_filters_by_predicate() {
        let (mut snapshot, a, _) = populated();
        if let Some(Entity::Trial(t)) = snapshot.objects.get_mut(&a.id()) {
            t.status = Status::Running;
        }
        let out = snapshot
            .fetch(&snapshot.trials, &Predicate::new().eq("status", "running"), true)
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id(), a.id());
    }

    #[test]
    fn dangling_index_id_is_fatal_when_strict() {
        let (mut snapshot, _, _) = populated();
        snapshot.trials.push(EntityId::for_project("ghost"));
        let err = snapshot
            .fetch(&snapshot.trials, &Predicate::new(), true)
            .unwrap_err();
        assert!(matches!(err, StoreError::ConsistencyFault { .. }));
    }

    #[test]
    fn dangling_index_id_is_skipped_when_lenient() {
        let (mut snapshot, _, _) = populated();
        snapshot.trials.push(EntityId::for_project("ghost"));
        let out = snapshot
            .fetch(&snapshot.trials, &Predicate::new(), false)
            .unwrap();
        assert_eq!(out.len(), 2);
    }
}
