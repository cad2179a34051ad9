use tracing::debug;

use trialdb_store::{FileProtocol, Protocol, StoreError, StoreResult};
use trialdb_types::{EntityId, EntityRef, Trial};
use trialdb_wire::{ErrorEnvelope, Request, Response};

/// Execute one request against the server's store, mapping failures into
/// the wire error envelope. Never panics the connection: every outcome is
/// a [`Response`].
pub fn dispatch(protocol: &mut FileProtocol, request: Request) -> Response {
    debug!(operation = request.operation(), "dispatch");
    match execute(protocol, request) {
        Ok(response) => response,
        Err(err) => Response::Error(ErrorEnvelope::from(&err)),
    }
}

/// Materialize the caller's view of a trial from its wire reference.
///
/// The server re-resolves the id against its own snapshot and then
/// substitutes the caller's version stamp, so atomic operations compare
/// the caller's stamp — not the server's fresh one — against the store.
fn trial_view(protocol: &mut FileProtocol, reference: &EntityRef) -> StoreResult<Trial> {
    let mut trial = protocol
        .find_trial(&reference.id)?
        .ok_or(StoreError::UnknownEntity { id: reference.id })?;
    trial.update_count = reference.update_count;
    Ok(trial)
}

fn require_project(
    protocol: &mut FileProtocol,
    id: EntityId,
) -> StoreResult<trialdb_types::Project> {
    protocol
        .find_project(&id)?
        .ok_or(StoreError::UnknownEntity { id })
}

fn require_group(
    protocol: &mut FileProtocol,
    id: EntityId,
) -> StoreResult<trialdb_types::TrialGroup> {
    protocol
        .find_group(&id)?
        .ok_or(StoreError::UnknownEntity { id })
}

fn execute(protocol: &mut FileProtocol, request: Request) -> StoreResult<Response> {
    Ok(match request {
        Request::NewProject { project } => Response::Project(protocol.new_project(&project)?),
        Request::NewTrialGroup { group } => Response::Group(protocol.new_trial_group(&group)?),
        Request::NewTrial { trial } => Response::Trial(protocol.new_trial(&trial)?),
        Request::GetProject { id } => Response::MaybeProject(protocol.find_project(&id)?),
        Request::GetTrialGroup { id } => Response::MaybeGroup(protocol.find_group(&id)?),
        Request::GetTrial { id } => match protocol.find_trial(&id)? {
            Some(trial) => Response::Trials(protocol.get_trial(&trial)?),
            None => Response::Trials(Vec::new()),
        },
        Request::LogTrialStart { trial } => {
            let view = trial_view(protocol, &trial)?;
            Response::Trial(protocol.log_trial_start(&view)?)
        }
        Request::LogTrialFinish { trial } => {
            let view = trial_view(protocol, &trial)?;
            Response::Trial(protocol.log_trial_finish(&view)?)
        }
        Request::LogTrialChronoStart {
            trial,
            name,
            aggregator,
        } => {
            let view = trial_view(protocol, &trial)?;
            Response::Trial(protocol.log_trial_chrono_start(&view, &name, aggregator)?)
        }
        Request::LogTrialChronoFinish { trial, name } => {
            let view = trial_view(protocol, &trial)?;
            Response::Trial(protocol.log_trial_chrono_finish(&view, &name)?)
        }
        Request::LogTrialMetadata {
            trial,
            aggregator,
            fields,
        } => {
            let view = trial_view(protocol, &trial)?;
            Response::Trial(protocol.log_trial_metadata(&view, aggregator, fields)?)
        }
        Request::LogTrialMetrics {
            trial,
            step,
            aggregator,
            fields,
        } => {
            let view = trial_view(protocol, &trial)?;
            Response::Trial(protocol.log_trial_metrics(&view, step, aggregator, fields)?)
        }
        Request::AddTrialTags { trial, tags } => {
            let view = trial_view(protocol, &trial)?;
            Response::Trial(protocol.add_trial_tags(&view, tags)?)
        }
        Request::LogTrialArguments { trial, parameters } => {
            let view = trial_view(protocol, &trial)?;
            Response::Trial(protocol.log_trial_arguments(&view, parameters)?)
        }
        Request::SetTrialStatus {
            trial,
            status,
            error,
        } => {
            let view = trial_view(protocol, &trial)?;
            Response::Trial(protocol.set_trial_status(&view, status, error)?)
        }
        Request::AddProjectTrial { project, trial } => {
            let project = require_project(protocol, project)?;
            let view = trial_view(protocol, &trial)?;
            let (project, trial) = protocol.add_project_trial(&project, &view)?;
            Response::ProjectTrial { project, trial }
        }
        Request::AddGroupTrial { group, trial } => {
            let group = require_group(protocol, group)?;
            let view = trial_view(protocol, &trial)?;
            let (group, trial) = protocol.add_group_trial(&group, &view)?;
            Response::GroupTrial { group, trial }
        }
        Request::FetchTrials { predicate } => {
            Response::Trials(protocol.fetch_trials(&predicate)?)
        }
        Request::FetchGroups { predicate } => Response::Groups(protocol.fetch_groups(&predicate)?),
        Request::FetchProjects { predicate } => {
            Response::Projects(protocol.fetch_projects(&predicate)?)
        }
        Request::Commit => {
            protocol.commit()?;
            Response::Unit
        }
    })
}
