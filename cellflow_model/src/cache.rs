use indexmap::IndexMap;

use crate::error::ModelError;
use crate::project::{Action, Project};

/// Actions of one project keyed by id, in declaration order.
///
/// The cache owns its copies; edits go through `get_mut` and reach the
/// project only through `apply_to`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionCache {
    actions: IndexMap<String, Action>,
}

impl ActionCache {
    pub fn from_project(project: &Project) -> Result<Self, ModelError> {
        Self::from_actions(project.actions.iter().cloned())
    }

    pub fn from_actions(actions: impl IntoIterator<Item = Action>) -> Result<Self, ModelError> {
        let mut cache = Self::default();
        for action in actions {
            if cache.actions.contains_key(&action.id) {
                return Err(ModelError::DuplicateActionId(action.id));
            }
            cache.actions.insert(action.id.clone(), action);
        }
        Ok(cache)
    }

    pub fn get(&self, id: &str) -> Option<&Action> {
        self.actions.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Action> {
        self.actions.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.actions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Id of the first action whose input is the chain start.
    pub fn first_action_id(&self) -> Option<&str> {
        self.actions
            .values()
            .find(|a| a.is_first())
            .map(|a| a.id.as_str())
    }

    /// Id of the first action whose output is the chain end.
    pub fn last_action_id(&self) -> Option<&str> {
        self.actions
            .values()
            .find(|a| a.is_last())
            .map(|a| a.id.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.actions.values()
    }

    /// Writes the cached actions back over the project's actions with the
    /// same id. Project actions unknown to the cache are left alone.
    pub fn apply_to(&self, project: &mut Project) {
        for action in project.actions.iter_mut() {
            if let Some(cached) = self.actions.get(&action.id) {
                *action = cached.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::ActionIO;

    fn project() -> Project {
        let mut move1 = Action::new("move1", "robot", "move_to");
        move1.inputs = vec![ActionIO::First];
        move1.outputs = vec!["move2".into()];
        let mut move2 = Action::new("move2", "robot", "move_to");
        move2.inputs = vec!["move1".into()];
        move2.outputs = vec![ActionIO::Last];
        Project {
            id: "demo".into(),
            scene_id: "cell".into(),
            desc: String::new(),
            actions: vec![move1, move2],
            parameters: Vec::new(),
        }
    }

    #[test]
    fn keeps_declaration_order_and_chain_ends() {
        let cache = ActionCache::from_project(&project()).unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.first_action_id(), Some("move1"));
        assert_eq!(cache.last_action_id(), Some("move2"));
        let ids: Vec<_> = cache.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, ["move1", "move2"]);
    }

    #[test]
    fn rejects_duplicate_ids() {
        let mut project = project();
        project.actions[1].id = "move1".into();
        assert_eq!(
            ActionCache::from_project(&project),
            Err(ModelError::DuplicateActionId("move1".into()))
        );
    }

    #[test]
    fn edits_reach_the_project_through_apply_to() {
        let mut project = project();
        let mut cache = ActionCache::from_project(&project).unwrap();
        cache.get_mut("move2").unwrap().outputs.clear();
        assert!(project.actions[1].is_last());

        cache.apply_to(&mut project);
        assert!(project.actions[1].outputs.is_empty());
        assert!(cache.last_action_id().is_none());
    }
}
