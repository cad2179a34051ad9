use serde::{Deserialize, Serialize};

use crate::id::EntityId;

/// A named grouping of trials inside a project (one sweep, one study, one
/// ablation — whatever the caller wants to fence off).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrialGroup {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Owning project. Strict stores require this to resolve at creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<EntityId>,
    /// Member trial ids, in creation order.
    #[serde(default)]
    pub trials: Vec<EntityId>,
}

impl TrialGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            project_id: None,
            trials: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_project(mut self, project_id: EntityId) -> Self {
        self.project_id = Some(project_id);
        self
    }

    pub fn id(&self) -> EntityId {
        EntityId::for_group(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_domain_separated_from_projects() {
        let g = TrialGroup::new("baseline");
        assert_eq!(g.id(), EntityId::for_group("baseline"));
        assert_ne!(g.id(), EntityId::for_project("baseline"));
    }

    #[test]
    fn serde_roundtrip() {
        let g = TrialGroup::new("sweep-1").with_project(EntityId::for_project("p"));
        let encoded = serde_json::to_string(&g).unwrap();
        let decoded: TrialGroup = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, g);
    }
}
