use serde::{Deserialize, Serialize};

use crate::id::EntityId;

/// Top level of the run hierarchy: a named project owning trials and
/// trial groups.
///
/// Ownership lists hold ids, not inline records; the records themselves
/// live in the store's object map. The id is derived from the name, so a
/// project name maps to exactly one id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Owned trial ids, in creation order.
    #[serde(default)]
    pub trials: Vec<EntityId>,
    /// Owned group ids, in creation order.
    #[serde(default)]
    pub groups: Vec<EntityId>,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            trials: Vec::new(),
            groups: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn id(&self) -> EntityId {
        EntityId::for_project(&self.name)
    }
}
