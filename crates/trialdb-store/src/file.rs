use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tracing::{debug, error, warn};

use trialdb_aggregators::{Aggregate, AggregatorSpec};
use trialdb_query::Predicate;
use trialdb_types::{Entity, EntityId, Project, Status, Trial, TrialGroup};

use crate::error::{StoreError, StoreResult};
use crate::lock::StoreLock;
use crate::persist;
use crate::protocol::Protocol;
use crate::snapshot::Snapshot;

/// The chronometer opened by `log_trial_start`.
pub const RUNTIME_CHRONO: &str = "runtime";

/// Behavior switches for a file-backed store.
#[derive(Clone, Debug)]
pub struct StoreOptions {
    /// Fail on consistency faults (dangling references, missing
    /// ownership) instead of warning and continuing. Turn off when using
    /// the store as lenient in-memory/offline storage.
    pub strict: bool,
    /// Reload the snapshot from the backing file on every guarded call
    /// and persist after every write. Required when multiple processes
    /// share the file; non-eager stores skip the lock and the reload and
    /// rely on an explicit `commit`.
    pub eager: bool,
    /// Upper bound on waiting for the cross-process lock.
    pub lock_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            strict: true,
            eager: true,
            lock_timeout: Duration::from_secs(5),
        }
    }
}

/// File-backed implementation of the store [`Protocol`].
///
/// Every operation acquires the cross-process lock, reloads the snapshot
/// (eager mode), re-resolves entity arguments against the fresh snapshot,
/// executes, persists (write operations), and releases the lock — in that
/// order, with the release guaranteed by RAII on all exit paths.
///
/// An eager instance keeps no authoritative state in memory between
/// calls, so any number of processes can share one backing file; the lock
/// linearizes their reload/mutate/persist sequences.
pub struct FileProtocol {
    path: PathBuf,
    options: StoreOptions,
    lock: StoreLock,
    snapshot: Snapshot,
    /// Open chronometer intervals, keyed by (trial, chronometer name).
    /// Process-local by design: an interval is started and finished by
    /// the same logger.
    pending_chronos: HashMap<(EntityId, String), Instant>,
}

impl FileProtocol {
    /// Open (or create) a store backed by the given file.
    pub fn open(path: impl AsRef<Path>, options: StoreOptions) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let snapshot = persist::load(&path)?;
        let mut lock_path = path.clone().into_os_string();
        lock_path.push(".lock");
        let lock = StoreLock::new(
            PathBuf::from(lock_path),
            options.lock_timeout,
            options.eager,
        );
        Ok(Self {
            path,
            options,
            lock,
            snapshot,
            pending_chronos: HashMap::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// The current in-memory snapshot. Eager stores refresh it on every
    /// guarded call, so between calls it may lag the backing file.
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Read-guarded lookup by id, for callers (the dispatch layer) that
    /// hold a reference rather than a full entity.
    pub fn find_project(&mut self, id: &EntityId) -> StoreResult<Option<Project>> {
        self.read_guard(|p| Ok(p.snapshot.project(id).cloned()))
    }

    /// See [`FileProtocol::find_project`].
    pub fn find_group(&mut self, id: &EntityId) -> StoreResult<Option<TrialGroup>> {
        self.read_guard(|p| Ok(p.snapshot.group(id).cloned()))
    }

    /// See [`FileProtocol::find_project`].
    pub fn find_trial(&mut self, id: &EntityId) -> StoreResult<Option<Trial>> {
        self.read_guard(|p| Ok(p.snapshot.trial(id).cloned()))
    }

    fn read_guard<T>(&mut self, f: impl FnOnce(&mut Self) -> StoreResult<T>) -> StoreResult<T> {
        let _guard = self.lock.acquire()?;
        if self.options.eager {
            self.snapshot = persist::load(&self.path)?;
        }
        f(self)
    }

    fn write_guard<T>(&mut self, f: impl FnOnce(&mut Self) -> StoreResult<T>) -> StoreResult<T> {
        let _guard = self.lock.acquire()?;
        if self.options.eager {
            self.snapshot = persist::load(&self.path)?;
        }
        match f(self) {
            Ok(value) => {
                if self.options.eager {
                    persist::save(&self.path, &self.snapshot)?;
                }
                Ok(value)
            }
            Err(err) => {
                // The backing file was not touched. Re-read it so the
                // in-memory snapshot also reflects the pre-call state.
                if self.options.eager {
                    match persist::load(&self.path) {
                        Ok(snapshot) => self.snapshot = snapshot,
                        Err(reload) => {
                            warn!(error = %reload, "could not restore snapshot after aborted write")
                        }
                    }
                }
                Err(err)
            }
        }
    }

    /// Replace the caller's trial with the freshest copy.
    ///
    /// No fresher copy: the caller's clone is used as-is (first
    /// creation). Fresher copy, non-atomic: the fresh copy silently wins.
    /// Fresher copy, atomic: version stamps must match or the operation
    /// aborts with a concurrent-write failure.
    fn resolve_trial(&self, caller: &Trial, atomic: bool) -> StoreResult<Trial> {
        match self.snapshot.trial(&caller.id()) {
            None => Ok(caller.clone()),
            Some(fresh) => {
                if atomic && fresh.update_count != caller.update_count {
                    return Err(StoreError::ConcurrentWrite {
                        ours: caller.update_count,
                        theirs: fresh.update_count,
                    });
                }
                Ok(fresh.clone())
            }
        }
    }

    fn resolve_project(&self, caller: &Project) -> Project {
        self.snapshot
            .project(&caller.id())
            .cloned()
            .unwrap_or_else(|| caller.clone())
    }

    fn resolve_group(&self, caller: &TrialGroup) -> TrialGroup {
        self.snapshot
            .group(&caller.id())
            .cloned()
            .unwrap_or_else(|| caller.clone())
    }

    /// Write a trial back into the snapshot if it is already registered
    /// there. Unregistered trials (never `new_trial`ed) stay out of the
    /// object map: the mutation lives only in the returned copy.
    fn put_trial(&mut self, trial: Trial) -> Trial {
        let id = trial.id();
        if self.snapshot.objects.contains_key(&id) {
            self.snapshot.objects.insert(id, Entity::Trial(trial.clone()));
        }
        trial
    }

    /// Stamp and store a mutated trial.
    fn commit_trial(&mut self, mut trial: Trial) -> Trial {
        trial.update_count += 1;
        self.put_trial(trial)
    }

    fn put_project(&mut self, project: Project) -> Project {
        let id = project.id();
        if self.snapshot.objects.contains_key(&id) {
            self.snapshot
                .objects
                .insert(id, Entity::Project(project.clone()));
        }
        project
    }

    fn put_group(&mut self, group: TrialGroup) -> TrialGroup {
        let id = group.id();
        if self.snapshot.objects.contains_key(&id) {
            self.snapshot.objects.insert(id, Entity::Group(group.clone()));
        }
        group
    }

    fn finish_chrono(&mut self, trial: &Trial, name: &str) -> StoreResult<Trial> {
        let mut t = self.resolve_trial(trial, false)?;
        let started = self
            .pending_chronos
            .remove(&(t.id(), name.to_string()))
            .ok_or_else(|| StoreError::ChronoNotStarted { name: name.to_string() })?;
        let chrono = t
            .chronos
            .get_mut(name)
            .ok_or_else(|| StoreError::ChronoNotStarted { name: name.to_string() })?;
        chrono.append(Value::from(started.elapsed().as_secs_f64()));
        Ok(self.commit_trial(t))
    }
}

impl Protocol for FileProtocol {
    fn new_project(&mut self, project: &Project) -> StoreResult<Project> {
        self.write_guard(|p| {
            let id = project.id();
            debug!(name = %project.name, "create project");
            if let Some(existing) = p.snapshot.project(&id) {
                error!(name = %project.name, id = %id.short_hex(), "cannot insert project: id already exists");
                return Ok(existing.clone());
            }
            p.snapshot.objects.insert(id, Entity::Project(project.clone()));
            p.snapshot.projects.push(id);
            p.snapshot.project_names.insert(project.name.clone(), id);
            Ok(project.clone())
        })
    }

    fn new_trial_group(&mut self, group: &TrialGroup) -> StoreResult<TrialGroup> {
        self.write_guard(|p| {
            let id = group.id();
            debug!(name = %group.name, "create trial group");
            if let Some(existing) = p.snapshot.group(&id) {
                error!(name = %group.name, id = %id.short_hex(), "cannot insert group: id already exists");
                return Ok(existing.clone());
            }
            match group.project_id {
                Some(pid) => match p.snapshot.objects.get_mut(&pid) {
                    Some(Entity::Project(project)) => project.groups.push(id),
                    _ if p.options.strict => {
                        return Err(StoreError::ConsistencyFault { id: pid })
                    }
                    _ => warn!(group = %group.name, "owning project missing; group left unattached"),
                },
                None if p.options.strict => {
                    return Err(StoreError::MissingOwner {
                        group: group.name.clone(),
                    })
                }
                None => warn!(group = %group.name, "group created without an owning project"),
            }
            p.snapshot.objects.insert(id, Entity::Group(group.clone()));
            p.snapshot.groups.push(id);
            p.snapshot.group_names.insert(group.name.clone(), id);
            Ok(group.clone())
        })
    }

    fn new_trial(&mut self, trial: &Trial) -> StoreResult<Trial> {
        self.write_guard(|p| {
            let mut trial = trial.clone();
            if p.snapshot.objects.contains_key(&trial.id()) {
                let next = p.snapshot.max_revision(&trial.fingerprint).unwrap_or(0) + 1;
                warn!(
                    fingerprint = %trial.fingerprint.short_hex(),
                    revision = next,
                    "trial already recorded; bumping revision"
                );
                trial.revision = next;
            }
            let id = trial.id();
            p.snapshot.objects.insert(id, Entity::Trial(trial.clone()));
            p.snapshot.trials.push(id);

            match trial.project_id {
                Some(pid) => match p.snapshot.objects.get_mut(&pid) {
                    Some(Entity::Project(project)) => project.trials.push(id),
                    _ if p.options.strict => {
                        return Err(StoreError::ConsistencyFault { id: pid })
                    }
                    _ => warn!(trial = %id.short_hex(), "owning project missing; trial left unattached"),
                },
                None => warn!(trial = %id.short_hex(), "orphan trial"),
            }
            if let Some(gid) = trial.group_id {
                match p.snapshot.objects.get_mut(&gid) {
                    Some(Entity::Group(group)) => group.trials.push(id),
                    _ if p.options.strict => {
                        return Err(StoreError::ConsistencyFault { id: gid })
                    }
                    _ => warn!(trial = %id.short_hex(), "owning group missing; trial left unattached"),
                }
            }
            Ok(trial)
        })
    }

    fn get_project(&mut self, project: &Project) -> StoreResult<Option<Project>> {
        self.read_guard(|p| {
            debug!(name = %project.name, "look up project");
            Ok(p.snapshot.project(&project.id()).cloned())
        })
    }

    fn get_trial_group(&mut self, group: &TrialGroup) -> StoreResult<Option<TrialGroup>> {
        self.read_guard(|p| Ok(p.snapshot.group(&group.id()).cloned()))
    }

    fn get_trial(&mut self, trial: &Trial) -> StoreResult<Vec<Trial>> {
        self.read_guard(|p| {
            if !p.snapshot.objects.contains_key(&trial.id()) {
                return Ok(Vec::new());
            }
            Ok(p.snapshot
                .trials_with_fingerprint(&trial.fingerprint)
                .into_iter()
                .cloned()
                .collect())
        })
    }

    fn log_trial_start(&mut self, trial: &Trial) -> StoreResult<Trial> {
        self.write_guard(|p| {
            let mut t = p.resolve_trial(trial, false)?;
            t.chronos
                .insert(RUNTIME_CHRONO.to_string(), AggregatorSpec::Value.build());
            p.pending_chronos
                .insert((t.id(), RUNTIME_CHRONO.to_string()), Instant::now());
            Ok(p.commit_trial(t))
        })
    }

    fn log_trial_finish(&mut self, trial: &Trial) -> StoreResult<Trial> {
        self.write_guard(|p| p.finish_chrono(trial, RUNTIME_CHRONO))
    }

    fn log_trial_chrono_start(
        &mut self,
        trial: &Trial,
        name: &str,
        aggregator: AggregatorSpec,
    ) -> StoreResult<Trial> {
        self.write_guard(|p| {
            let mut t = p.resolve_trial(trial, false)?;
            if !t.chronos.contains_key(name) {
                t.chronos.insert(name.to_string(), aggregator.build());
            }
            p.pending_chronos
                .insert((t.id(), name.to_string()), Instant::now());
            Ok(p.commit_trial(t))
        })
    }

    fn log_trial_chrono_finish(&mut self, trial: &Trial, name: &str) -> StoreResult<Trial> {
        self.write_guard(|p| p.finish_chrono(trial, name))
    }

    fn log_trial_metadata(
        &mut self,
        trial: &Trial,
        aggregator: Option<AggregatorSpec>,
        fields: BTreeMap<String, Value>,
    ) -> StoreResult<Trial> {
        self.write_guard(|p| {
            let mut t = p.resolve_trial(trial, false)?;
            let spec = aggregator.unwrap_or(AggregatorSpec::Value);
            for (key, value) in fields {
                t.metadata
                    .entry(key)
                    .or_insert_with(|| spec.build())
                    .append(value);
            }
            Ok(p.commit_trial(t))
        })
    }

    fn log_trial_metrics(
        &mut self,
        trial: &Trial,
        step: Option<u64>,
        aggregator: Option<AggregatorSpec>,
        fields: BTreeMap<String, Value>,
    ) -> StoreResult<Trial> {
        self.write_guard(|p| {
            let mut t = p.resolve_trial(trial, false)?;
            for (key, value) in fields {
                let column = t.metrics.entry(key.clone()).or_insert_with(|| match step {
                    Some(_) => trialdb_types::MetricColumn::Stepped(BTreeMap::new()),
                    None => trialdb_types::MetricColumn::Aggregated(
                        aggregator.unwrap_or(AggregatorSpec::TimeSeries).build(),
                    ),
                });
                match (step, column) {
                    (Some(s), trialdb_types::MetricColumn::Stepped(map)) => {
                        map.insert(s, value);
                    }
                    (Some(s), trialdb_types::MetricColumn::Aggregated(agg)) => {
                        agg.append(json!([s, value]));
                    }
                    (None, trialdb_types::MetricColumn::Aggregated(agg)) => {
                        agg.append(value);
                    }
                    (None, trialdb_types::MetricColumn::Stepped(_)) => {
                        return Err(StoreError::StepRequired { key });
                    }
                }
            }
            Ok(p.commit_trial(t))
        })
    }

    fn add_trial_tags(
        &mut self,
        trial: &Trial,
        tags: BTreeMap<String, Value>,
    ) -> StoreResult<Trial> {
        self.write_guard(|p| {
            let mut t = p.resolve_trial(trial, false)?;
            t.tags.extend(tags);
            Ok(p.commit_trial(t))
        })
    }

    fn log_trial_arguments(
        &mut self,
        trial: &Trial,
        parameters: BTreeMap<String, Value>,
    ) -> StoreResult<Trial> {
        self.write_guard(|p| {
            let mut t = p.resolve_trial(trial, false)?;
            t.parameters.extend(parameters);
            Ok(p.commit_trial(t))
        })
    }

    fn set_trial_status(
        &mut self,
        trial: &Trial,
        status: Status,
        error: Option<String>,
    ) -> StoreResult<Trial> {
        self.write_guard(|p| {
            let mut t = p.resolve_trial(trial, true)?;
            t.status = status;
            if let Some(message) = error {
                t.errors.push(message);
            }
            Ok(p.commit_trial(t))
        })
    }

    fn add_project_trial(
        &mut self,
        project: &Project,
        trial: &Trial,
    ) -> StoreResult<(Project, Trial)> {
        self.write_guard(|p| {
            let mut project = p.resolve_project(project);
            let mut trial = p.resolve_trial(trial, false)?;
            trial.project_id = Some(project.id());
            project.trials.push(trial.id());
            let project = p.put_project(project);
            let trial = p.put_trial(trial);
            Ok((project, trial))
        })
    }

    fn add_group_trial(
        &mut self,
        group: &TrialGroup,
        trial: &Trial,
    ) -> StoreResult<(TrialGroup, Trial)> {
        self.write_guard(|p| {
            let mut group = p.resolve_group(group);
            let mut trial = p.resolve_trial(trial, false)?;
            trial.group_id = Some(group.id());
            group.trials.push(trial.id());
            let group = p.put_group(group);
            let trial = p.put_trial(trial);
            Ok((group, trial))
        })
    }

    fn fetch_trials(&mut self, predicate: &Predicate) -> StoreResult<Vec<Trial>> {
        self.read_guard(|p| {
            let ids = p.snapshot.trials.clone();
            let entities = p.snapshot.fetch(&ids, predicate, p.options.strict)?;
            Ok(entities
                .into_iter()
                .filter_map(|e| match e {
                    Entity::Trial(t) => Some(t),
                    _ => None,
                })
                .collect())
        })
    }

    fn fetch_groups(&mut self, predicate: &Predicate) -> StoreResult<Vec<TrialGroup>> {
        self.read_guard(|p| {
            let ids = p.snapshot.groups.clone();
            let entities = p.snapshot.fetch(&ids, predicate, p.options.strict)?;
            Ok(entities
                .into_iter()
                .filter_map(|e| match e {
                    Entity::Group(g) => Some(g),
                    _ => None,
                })
                .collect())
        })
    }

    fn fetch_projects(&mut self, predicate: &Predicate) -> StoreResult<Vec<Project>> {
        self.read_guard(|p| {
            let ids = p.snapshot.projects.clone();
            let entities = p.snapshot.fetch(&ids, predicate, p.options.strict)?;
            Ok(entities
                .into_iter()
                .filter_map(|e| match e {
                    Entity::Project(proj) => Some(proj),
                    _ => None,
                })
                .collect())
        })
    }

    fn commit(&mut self) -> StoreResult<()> {
        let _guard = self.lock.acquire()?;
        persist::save(&self.path, &self.snapshot)
    }
}
