use std::collections::BTreeMap;

use serde_json::Value;

use trialdb_aggregators::AggregatorSpec;
use trialdb_query::Predicate;
use trialdb_types::{Project, Status, Trial, TrialGroup};

use crate::error::StoreResult;

/// The transactional store API.
///
/// Implemented by the file-backed store ([`crate::FileProtocol`]) and by
/// the remote client stub, so calling code is transport-agnostic.
///
/// Entity arguments are the caller's possibly-stale view; every operation
/// re-resolves them against the freshest snapshot before executing.
/// Mutating operations return the updated entity as an owned clone —
/// callers that keep logging against the same trial should replace their
/// copy with the returned one, otherwise an eventual atomic operation will
/// see a stale version stamp.
pub trait Protocol: Send {
    /// Insert a project. If the id already exists the conflict is logged
    /// and the existing project is returned unchanged.
    fn new_project(&mut self, project: &Project) -> StoreResult<Project>;

    /// Insert a trial group and append it to its project's group list.
    /// Strict stores require the owning project to exist. A duplicate id
    /// is logged and the existing group returned unchanged.
    fn new_trial_group(&mut self, group: &TrialGroup) -> StoreResult<TrialGroup>;

    /// Insert a trial. Re-submitting an already-recorded fingerprint
    /// allocates the next revision instead of overwriting. The trial is
    /// appended to its project's and group's lists when those ids are
    /// set; an ownerless trial is recorded with a warning.
    fn new_trial(&mut self, trial: &Trial) -> StoreResult<Trial>;

    /// Look up a project by the caller's copy. Pure read.
    fn get_project(&mut self, project: &Project) -> StoreResult<Option<Project>>;

    /// Look up a trial group by the caller's copy. Pure read.
    fn get_trial_group(&mut self, group: &TrialGroup) -> StoreResult<Option<TrialGroup>>;

    /// Every recorded revision sharing the trial's fingerprint, in
    /// discovery order. Empty when the exact (fingerprint, revision) id
    /// is unknown. Pure read.
    fn get_trial(&mut self, trial: &Trial) -> StoreResult<Vec<Trial>>;

    /// Open the trial's wall-clock interval on the dedicated `runtime`
    /// chronometer.
    fn log_trial_start(&mut self, trial: &Trial) -> StoreResult<Trial>;

    /// Close the `runtime` interval and append the elapsed seconds to its
    /// aggregator.
    fn log_trial_finish(&mut self, trial: &Trial) -> StoreResult<Trial>;

    /// Open an interval on an arbitrary named chronometer; the first
    /// start for a name creates its aggregator from `aggregator`.
    fn log_trial_chrono_start(
        &mut self,
        trial: &Trial,
        name: &str,
        aggregator: AggregatorSpec,
    ) -> StoreResult<Trial>;

    /// Close a named chronometer interval and append the elapsed seconds.
    fn log_trial_chrono_finish(&mut self, trial: &Trial, name: &str) -> StoreResult<Trial>;

    /// Append values to metadata containers, creating each container from
    /// `aggregator` (default: last-value) on first use.
    fn log_trial_metadata(
        &mut self,
        trial: &Trial,
        aggregator: Option<AggregatorSpec>,
        fields: BTreeMap<String, Value>,
    ) -> StoreResult<Trial>;

    /// Record metric values. With a step, values land in a step-keyed
    /// map (overwriting any prior value at that step); without one they
    /// are appended to the column's aggregator (default: full time
    /// series).
    fn log_trial_metrics(
        &mut self,
        trial: &Trial,
        step: Option<u64>,
        aggregator: Option<AggregatorSpec>,
        fields: BTreeMap<String, Value>,
    ) -> StoreResult<Trial>;

    /// Merge tags into the trial's tag mapping.
    fn add_trial_tags(
        &mut self,
        trial: &Trial,
        tags: BTreeMap<String, Value>,
    ) -> StoreResult<Trial>;

    /// Merge arguments into the trial's parameter mapping. The trial's
    /// fingerprint is frozen at creation and is not recomputed.
    fn log_trial_arguments(
        &mut self,
        trial: &Trial,
        parameters: BTreeMap<String, Value>,
    ) -> StoreResult<Trial>;

    /// Atomically set the trial's status, appending `error` to its error
    /// list when given. Fails with a concurrent-write error if another
    /// writer touched the trial since the caller's copy was taken.
    fn set_trial_status(
        &mut self,
        trial: &Trial,
        status: Status,
        error: Option<String>,
    ) -> StoreResult<Trial>;

    /// Adopt a trial into a project after creation.
    fn add_project_trial(
        &mut self,
        project: &Project,
        trial: &Trial,
    ) -> StoreResult<(Project, Trial)>;

    /// Adopt a trial into a group after creation.
    fn add_group_trial(
        &mut self,
        group: &TrialGroup,
        trial: &Trial,
    ) -> StoreResult<(TrialGroup, Trial)>;

    /// All trials matching the predicate, in discovery order.
    fn fetch_trials(&mut self, predicate: &Predicate) -> StoreResult<Vec<Trial>>;

    /// All groups matching the predicate, in discovery order.
    fn fetch_groups(&mut self, predicate: &Predicate) -> StoreResult<Vec<TrialGroup>>;

    /// All projects matching the predicate, in discovery order.
    fn fetch_projects(&mut self, predicate: &Predicate) -> StoreResult<Vec<Project>>;

    /// Persist outside of a write-guarded call. Non-eager stores batch
    /// mutations in memory and make them durable here.
    fn commit(&mut self) -> StoreResult<()>;
}
