use serde::{Deserialize, Serialize};

use crate::group::TrialGroup;
use crate::id::EntityId;
use crate::project::Project;
use crate::trial::Trial;

/// The three kinds of record the object map can hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Project,
    Group,
    Trial,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Group => "group",
            Self::Trial => "trial",
        }
    }
}

/// One-namespace wrapper for everything stored in the object map.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    Project(Project),
    Group(TrialGroup),
    Trial(Trial),
}

impl Entity {
    pub fn id(&self) -> EntityId {
        match self {
            Self::Project(p) => p.id(),
            Self::Group(g) => g.id(),
            Self::Trial(t) => t.id(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Project(_) => EntityKind::Project,
            Self::Group(_) => EntityKind::Group,
            Self::Trial(_) => EntityKind::Trial,
        }
    }

    pub fn as_project(&self) -> Option<&Project> {
        match self {
            Self::Project(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&TrialGroup> {
        match self {
            Self::Group(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_trial(&self) -> Option<&Trial> {
        match self {
            Self::Trial(t) => Some(t),
            _ => None,
        }
    }
}

impl From<Project> for Entity {
    fn from(p: Project) -> Self {
        Self::Project(p)
    }
}

impl From<TrialGroup> for Entity {
    fn from(g: TrialGroup) -> Self {
        Self::Group(g)
    }
}

impl From<Trial> for Entity {
    fn from(t: Trial) -> Self {
        Self::Trial(t)
    }
}

/// The (id, version stamp) handle used when an entity crosses the wire.
///
/// Remote calls pass entities by reference, not by value; the server
/// re-resolves the id against its own snapshot and atomic operations
/// compare the carried stamp against the fresh copy's.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: EntityId,
    pub update_count: u64,
}
