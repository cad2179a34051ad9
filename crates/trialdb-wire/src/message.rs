use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use trialdb_aggregators::AggregatorSpec;
use trialdb_query::Predicate;
use trialdb_types::{EntityId, EntityRef, Project, Status, Trial, TrialGroup};

use crate::envelope::ErrorEnvelope;

pub const PROTOCOL_VERSION: u32 = 1;

/// One store operation, as sent by the remote client.
///
/// Creation operations carry the full entity; everything else passes
/// trials by [`EntityRef`] — id plus version stamp — and lets the server
/// re-resolve against its own snapshot. The stamp is what makes the
/// atomic `SetTrialStatus` check work across the wire.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Request {
    NewProject { project: Project },
    NewTrialGroup { group: TrialGroup },
    NewTrial { trial: Trial },
    GetProject { id: EntityId },
    GetTrialGroup { id: EntityId },
    GetTrial { id: EntityId },
    LogTrialStart { trial: EntityRef },
    LogTrialFinish { trial: EntityRef },
    LogTrialChronoStart {
        trial: EntityRef,
        name: String,
        aggregator: AggregatorSpec,
    },
    LogTrialChronoFinish { trial: EntityRef, name: String },
    LogTrialMetadata {
        trial: EntityRef,
        aggregator: Option<AggregatorSpec>,
        fields: BTreeMap<String, Value>,
    },
    LogTrialMetrics {
        trial: EntityRef,
        step: Option<u64>,
        aggregator: Option<AggregatorSpec>,
        fields: BTreeMap<String, Value>,
    },
    AddTrialTags {
        trial: EntityRef,
        tags: BTreeMap<String, Value>,
    },
    LogTrialArguments {
        trial: EntityRef,
        parameters: BTreeMap<String, Value>,
    },
    SetTrialStatus {
        trial: EntityRef,
        status: Status,
        error: Option<String>,
    },
    AddProjectTrial { project: EntityId, trial: EntityRef },
    AddGroupTrial { group: EntityId, trial: EntityRef },
    FetchTrials { predicate: Predicate },
    FetchGroups { predicate: Predicate },
    FetchProjects { predicate: Predicate },
    Commit,
}

impl Request {
    pub fn operation(&self) -> &'static str {
        match self {
            Self::NewProject { .. } => "new_project",
            Self::NewTrialGroup { .. } => "new_trial_group",
            Self::NewTrial { .. } => "new_trial",
            Self::GetProject { .. } => "get_project",
            Self::GetTrialGroup { .. } => "get_trial_group",
            Self::GetTrial { .. } => "get_trial",
            Self::LogTrialStart { .. } => "log_trial_start",
            Self::LogTrialFinish { .. } => "log_trial_finish",
            Self::LogTrialChronoStart { .. } => "log_trial_chrono_start",
            Self::LogTrialChronoFinish { .. } => "log_trial_chrono_finish",
            Self::LogTrialMetadata { .. } => "log_trial_metadata",
            Self::LogTrialMetrics { .. } => "log_trial_metrics",
            Self::AddTrialTags { .. } => "add_trial_tags",
            Self::LogTrialArguments { .. } => "log_trial_arguments",
            Self::SetTrialStatus { .. } => "set_trial_status",
            Self::AddProjectTrial { .. } => "add_project_trial",
            Self::AddGroupTrial { .. } => "add_group_trial",
            Self::FetchTrials { .. } => "fetch_trials",
            Self::FetchGroups { .. } => "fetch_groups",
            Self::FetchProjects { .. } => "fetch_projects",
            Self::Commit => "commit",
        }
    }
}

/// The result-or-error envelope written back for every request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Response {
    Project(Project),
    Group(TrialGroup),
    Trial(Trial),
    MaybeProject(Option<Project>),
    MaybeGroup(Option<TrialGroup>),
    Trials(Vec<Trial>),
    Groups(Vec<TrialGroup>),
    Projects(Vec<Project>),
    ProjectTrial { project: Project, trial: Trial },
    GroupTrial { group: TrialGroup, trial: Trial },
    Unit,
    Error(ErrorEnvelope),
}
