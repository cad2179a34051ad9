use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use trialdb_aggregators::Aggregator;

use crate::id::{EntityId, Fingerprint};
use crate::status::Status;

/// A trial's parameter mapping. `BTreeMap` keeps the canonical encoding —
/// and therefore the fingerprint — independent of insertion order.
pub type Params = BTreeMap<String, Value>;

/// One metric column on a trial.
///
/// A column is created on the first observation for its key and its shape
/// is fixed from then on: callers that supply an explicit step get a
/// step-keyed map (later writes to the same step overwrite), callers that
/// don't get an aggregation container.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricColumn {
    Stepped(BTreeMap<u64, Value>),
    Aggregated(Aggregator),
}

/// A single run of one parameter configuration.
///
/// Identity is the (fingerprint, revision) pair, frozen at creation:
/// the fingerprint hashes the initial parameter set, and re-submitting the
/// same configuration allocates the next revision instead of overwriting.
/// Later parameter merges do not re-fingerprint the trial.
///
/// `update_count` is the optimistic-concurrency version stamp. The store
/// increments it on every mutating call; atomic operations compare stamps
/// before applying.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub fingerprint: Fingerprint,
    #[serde(default)]
    pub revision: u32,
    #[serde(default)]
    pub parameters: Params,
    /// Aggregator-managed bookkeeping fields (not metrics).
    #[serde(default)]
    pub metadata: BTreeMap<String, Aggregator>,
    /// Version stamp, incremented by the store on every mutation.
    #[serde(rename = "_update_count", default)]
    pub update_count: u64,
    #[serde(default)]
    pub metrics: BTreeMap<String, MetricColumn>,
    /// Named chronometers; each accumulates elapsed-seconds observations.
    #[serde(default)]
    pub chronos: BTreeMap<String, Aggregator>,
    #[serde(default)]
    pub tags: BTreeMap<String, Value>,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<EntityId>,
}

impl Trial {
    /// Create a revision-0 trial for the given parameter set.
    pub fn new(parameters: Params) -> Self {
        let fingerprint = Fingerprint::of_params(&parameters);
        Self {
            fingerprint,
            revision: 0,
            parameters,
            metadata: BTreeMap::new(),
            update_count: 0,
            metrics: BTreeMap::new(),
            chronos: BTreeMap::new(),
            tags: BTreeMap::new(),
            status: Status::Created,
            errors: Vec::new(),
            project_id: None,
            group_id: None,
        }
    }

    pub fn with_project(mut self, project_id: EntityId) -> Self {
        self.project_id = Some(project_id);
        self
    }

    pub fn with_group(mut self, group_id: EntityId) -> Self {
        self.group_id = Some(group_id);
        self
    }

    /// The trial's id, derived from its frozen identity.
    pub fn id(&self) -> EntityId {
        EntityId::for_trial(&self.fingerprint, self.revision)
    }

    /// The lightweight (id, version) handle passed over the wire.
    pub fn entity_ref(&self) -> crate::entity::EntityRef {
        crate::entity::EntityRef {
            id: self.id(),
            update_count: self.update_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, Value)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn same_params_same_fingerprint() {
        let a = Trial::new(params(&[("a", json!(1))]));
        let b = Trial::new(params(&[("a", json!(1))]));
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn different_params_different_fingerprint() {
        let a = Trial::new(params(&[("a", json!(1))]));
        let b = Trial::new(params(&[("a", json!(2))]));
        assert_ne!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn revision_changes_id_not_fingerprint() {
        let a = Trial::new(params(&[("a", json!(1))]));
        let mut b = a.clone();
        b.revision = 1;
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn parameter_merge_keeps_identity() {
        let mut t = Trial::new(params(&[("a", json!(1))]));
        let id = t.id();
        t.parameters.insert("late".into(), json!(true));
        assert_eq!(t.id(), id);
    }

    #[test]
    fn serde_roundtrip_with_update_count_alias() {
        let mut t = Trial::new(params(&[("lr", json!(0.01))]));
        t.update_count = 7;
        let encoded = serde_json::to_value(&t).unwrap();
        assert_eq!(encoded["_update_count"], json!(7));
        let decoded: Trial = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, t);
    }

    #[test]
    fn stepped_metric_column_roundtrip() {
        let mut steps = BTreeMap::new();
        steps.insert(3u64, json!(0.5));
        steps.insert(10u64, json!(0.25));
        let col = MetricColumn::Stepped(steps);
        let encoded = serde_json::to_string(&col).unwrap();
        let decoded: MetricColumn = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, col);
    }
}
