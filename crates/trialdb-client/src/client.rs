use std::collections::BTreeMap;
use std::net::TcpStream;

use serde_json::Value;
use tracing::debug;

use trialdb_aggregators::AggregatorSpec;
use trialdb_query::Predicate;
use trialdb_store::{Protocol, StoreError, StoreResult};
use trialdb_transport::{Channel, SecurityLayer, TransportError};
use trialdb_types::{Project, Status, Trial, TrialGroup};
use trialdb_wire::{Codec, Request, Response, WireError};

/// Remote stub for the store [`Protocol`].
///
/// Presents the identical operation set and argument shapes as the
/// in-process file store, so calling code is transport-agnostic. Trials
/// cross the wire by (id, version stamp) reference; the server
/// re-resolves against its own snapshot, which keeps the atomic
/// concurrent-write check intact end to end.
pub struct RemoteClient {
    channel: Channel<TcpStream>,
}

impl RemoteClient {
    /// Connect to a dispatch server, optionally upgrading the connection
    /// through the encrypted handshake.
    pub fn connect(host: &str, port: u16, security: SecurityLayer) -> StoreResult<Self> {
        let stream = TcpStream::connect((host, port))?;
        let channel = Channel::connect(stream, security).map_err(transport_error)?;
        debug!(host, port, security = ?security, "connected to store server");
        Ok(Self { channel })
    }

    fn call(&mut self, request: &Request) -> StoreResult<Response> {
        let payload = Codec::encode(request).map_err(wire_error)?;
        self.channel.send(&payload).map_err(transport_error)?;
        let reply = self.channel.recv().map_err(transport_error)?;
        match Codec::decode::<Response>(&reply).map_err(wire_error)? {
            Response::Error(envelope) => Err(envelope.into_store_error()),
            response => Ok(response),
        }
    }

    fn call_trial(&mut self, request: &Request) -> StoreResult<Trial> {
        match self.call(request)? {
            Response::Trial(trial) => Ok(trial),
            other => Err(unexpected(request, &other)),
        }
    }
}

fn transport_error(err: TransportError) -> StoreError {
    match err {
        TransportError::Io(io) => StoreError::Io(io),
        other => StoreError::Backend(other.to_string()),
    }
}

fn wire_error(err: WireError) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn unexpected(request: &Request, response: &Response) -> StoreError {
    StoreError::Backend(format!(
        "unexpected response to {}: {response:?}",
        request.operation()
    ))
}

impl Protocol for RemoteClient {
    fn new_project(&mut self, project: &Project) -> StoreResult<Project> {
        let request = Request::NewProject {
            project: project.clone(),
        };
        match self.call(&request)? {
            Response::Project(project) => Ok(project),
            other => Err(unexpected(&request, &other)),
        }
    }

    fn new_trial_group(&mut self, group: &TrialGroup) -> StoreResult<TrialGroup> {
        let request = Request::NewTrialGroup {
            group: group.clone(),
        };
        match self.call(&request)? {
            Response::Group(group) => Ok(group),
            other => Err(unexpected(&request, &other)),
        }
    }

    fn new_trial(&mut self, trial: &Trial) -> StoreResult<Trial> {
        self.call_trial(&Request::NewTrial {
            trial: trial.clone(),
        })
    }

    fn get_project(&mut self, project: &Project) -> StoreResult<Option<Project>> {
        let request = Request::GetProject { id: project.id() };
        match self.call(&request)? {
            Response::MaybeProject(project) => Ok(project),
            other => Err(unexpected(&request, &other)),
        }
    }

    fn get_trial_group(&mut self, group: &TrialGroup) -> StoreResult<Option<TrialGroup>> {
        let request = Request::GetTrialGroup { id: group.id() };
        match self.call(&request)? {
            Response::MaybeGroup(group) => Ok(group),
            other => Err(unexpected(&request, &other)),
        }
    }

    fn get_trial(&mut self, trial: &Trial) -> StoreResult<Vec<Trial>> {
        let request = Request::GetTrial { id: trial.id() };
        match self.call(&request)? {
            Response::Trials(trials) => Ok(trials),
            other => Err(unexpected(&request, &other)),
        }
    }

    fn log_trial_start(&mut self, trial: &Trial) -> StoreResult<Trial> {
        self.call_trial(&Request::LogTrialStart {
            trial: trial.entity_ref(),
        })
    }

    fn log_trial_finish(&mut self, trial: &Trial) -> StoreResult<Trial> {
        self.call_trial(&Request::LogTrialFinish {
            trial: trial.entity_ref(),
        })
    }

    fn log_trial_chrono_start(
        &mut self,
        trial: &Trial,
        name: &str,
        aggregator: AggregatorSpec,
    ) -> StoreResult<Trial> {
        self.call_trial(&Request::LogTrialChronoStart {
            trial: trial.entity_ref(),
            name: name.to_string(),
            aggregator,
        })
    }

    fn log_trial_chrono_finish(&mut self, trial: &Trial, name: &str) -> StoreResult<Trial> {
        self.call_trial(&Request::LogTrialChronoFinish {
            trial: trial.entity_ref(),
            name: name.to_string(),
        })
    }

    fn log_trial_metadata(
        &mut self,
        trial: &Trial,
        aggregator: Option<AggregatorSpec>,
        fields: BTreeMap<String, Value>,
    ) -> StoreResult<Trial> {
        self.call_trial(&Request::LogTrialMetadata {
            trial: trial.entity_ref(),
            aggregator,
            fields,
        })
    }

    fn log_trial_metrics(
        &mut self,
        trial: &Trial,
        step: Option<u64>,
        aggregator: Option<AggregatorSpec>,
        fields: BTreeMap<String, Value>,
    ) -> StoreResult<Trial> {
        self.call_trial(&Request::LogTrialMetrics {
            trial: trial.entity_ref(),
            step,
            aggregator,
            fields,
        })
    }

    fn add_trial_tags(
        &mut self,
        trial: &Trial,
        tags: BTreeMap<String, Value>,
    ) -> StoreResult<Trial> {
        self.call_trial(&Request::AddTrialTags {
            trial: trial.entity_ref(),
            tags,
        })
    }

    fn log_trial_arguments(
        &mut self,
        trial: &Trial,
        parameters: BTreeMap<String, Value>,
    ) -> StoreResult<Trial> {
        self.call_trial(&Request::LogTrialArguments {
            trial: trial.entity_ref(),
            parameters,
        })
    }

    fn set_trial_status(
        &mut self,
        trial: &Trial,
        status: Status,
        error: Option<String>,
    ) -> StoreResult<Trial> {
        self.call_trial(&Request::SetTrialStatus {
            trial: trial.entity_ref(),
            status,
            error,
        })
    }

    fn add_project_trial(
        &mut self,
        project: &Project,
        trial: &Trial,
    ) -> StoreResult<(Project, Trial)> {
        let request = Request::AddProjectTrial {
            project: project.id(),
            trial: trial.entity_ref(),
        };
        match self.call(&request)? {
            Response::ProjectTrial { project, trial } => Ok((project, trial)),
            other => Err(unexpected(&request, &other)),
        }
    }

    fn add_group_trial(
        &mut self,
        group: &TrialGroup,
        trial: &Trial,
    ) -> StoreResult<(TrialGroup, Trial)> {
        let request = Request::AddGroupTrial {
            group: group.id(),
            trial: trial.entity_ref(),
        };
        match self.call(&request)? {
            Response::GroupTrial { group, trial } => Ok((group, trial)),
            other => Err(unexpected(&request, &other)),
        }
    }

    fn fetch_trials(&mut self, predicate: &Predicate) -> StoreResult<Vec<Trial>> {
        let request = Request::FetchTrials {
            predicate: predicate.clone(),
        };
        match self.call(&request)? {
            Response::Trials(trials) => Ok(trials),
            other => Err(unexpected(&request, &other)),
        }
    }

    fn fetch_groups(&mut self, predicate: &Predicate) -> StoreResult<Vec<TrialGroup>> {
        let request = Request::FetchGroups {
            predicate: predicate.clone(),
        };
        match self.call(&request)? {
            Response::Groups(groups) => Ok(groups),
            other => Err(unexpected(&request, &other)),
        }
    }

    fn fetch_projects(&mut self, predicate: &Predicate) -> StoreResult<Vec<Project>> {
        let request = Request::FetchProjects {
            predicate: predicate.clone(),
        };
        match self.call(&request)? {
            Response::Projects(projects) => Ok(projects),
            other => Err(unexpected(&request, &other)),
        }
    }

    fn commit(&mut self) -> StoreResult<()> {
        let request = Request::Commit;
        match self.call(&request)? {
            Response::Unit => Ok(()),
            other => Err(unexpected(&request, &other)),
        }
    }
}
