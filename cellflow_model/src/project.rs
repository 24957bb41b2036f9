use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

const START: &str = "start";
const END: &str = "end";

/// One end of a link between actions. `First` and `Last` mark the ends of the
/// chain and are written as `"start"` and `"end"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionIO {
    Action(String),
    First,
    Last,
}

impl ActionIO {
    pub fn action_id(&self) -> Option<&str> {
        match self {
            ActionIO::Action(id) => Some(id),
            _ => None,
        }
    }
}

impl From<String> for ActionIO {
    fn from(value: String) -> Self {
        match value.as_str() {
            START => ActionIO::First,
            END => ActionIO::Last,
            _ => ActionIO::Action(value),
        }
    }
}

impl From<&str> for ActionIO {
    fn from(value: &str) -> Self {
        ActionIO::from(value.to_string())
    }
}

impl From<ActionIO> for String {
    fn from(io: ActionIO) -> Self {
        match io {
            ActionIO::Action(id) => id,
            ActionIO::First => START.to_string(),
            ActionIO::Last => END.to_string(),
        }
    }
}

impl fmt::Display for ActionIO {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionIO::Action(id) => f.write_str(id),
            ActionIO::First => f.write_str(START),
            ActionIO::Last => f.write_str(END),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionParameter {
    pub id: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub id: String,
    /// `<object id>/<method>`
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub inputs: Vec<ActionIO>,
    #[serde(default)]
    pub outputs: Vec<ActionIO>,
    #[serde(default)]
    pub parameters: Vec<ActionParameter>,
}

impl Action {
    pub fn new(id: impl Into<String>, object_id: &str, method: &str) -> Self {
        Self {
            id: id.into(),
            type_name: format!("{object_id}/{method}"),
            inputs: Vec::new(),
            outputs: Vec::new(),
            parameters: Vec::new(),
        }
    }

    /// Splits the type into object id and method.
    pub fn parse_type(&self) -> Result<(&str, &str), ModelError> {
        let invalid = || ModelError::InvalidActionType(self.type_name.clone());
        let (object_id, method) = self.type_name.split_once('/').ok_or_else(invalid)?;
        if object_id.is_empty() || method.is_empty() || method.contains('/') {
            return Err(invalid());
        }
        Ok((object_id, method))
    }

    pub fn is_first(&self) -> bool {
        self.inputs.first() == Some(&ActionIO::First)
    }

    pub fn is_last(&self) -> bool {
        self.outputs.first() == Some(&ActionIO::Last)
    }

    pub fn parameter(&self, id: &str) -> Option<&ActionParameter> {
        self.parameters.iter().find(|p| p.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub scene_id: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub actions: Vec<Action>,
    /// Declared resource parameter names.
    #[serde(default)]
    pub parameters: Vec<String>,
}

impl Project {
    pub fn action(&self, id: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_travel_as_plain_strings() {
        let json = r#"{
            "id": "move1",
            "type": "robot/move_to",
            "inputs": ["start"],
            "outputs": ["move2"],
            "parameters": [{"id": "speed", "type": "int", "value": 5}]
        }"#;
        let action: Action = serde_json::from_str(json).unwrap();
        assert!(action.is_first());
        assert!(!action.is_last());
        assert_eq!(action.outputs, vec![ActionIO::Action("move2".into())]);
        assert_eq!(action.parameter("speed").unwrap().value, 5);

        let back = serde_json::to_value(&action).unwrap();
        assert_eq!(back["inputs"][0], "start");
        assert_eq!(ActionIO::Last.to_string(), "end");
    }

    #[test]
    fn parse_type_needs_exactly_one_separator() {
        assert_eq!(
            Action::new("a", "robot", "move_to").parse_type(),
            Ok(("robot", "move_to"))
        );
        for bad in ["robot", "/move_to", "robot/", "a/b/c"] {
            let mut action = Action::new("a", "x", "y");
            action.type_name = bad.to_string();
            assert_eq!(
                action.parse_type(),
                Err(ModelError::InvalidActionType(bad.to_string()))
            );
        }
    }

    #[test]
    fn project_reads_camel_case_with_defaults() {
        let project: Project =
            serde_json::from_str(r#"{"id": "demo", "sceneId": "cell"}"#).unwrap();
        assert_eq!(project.scene_id, "cell");
        assert!(project.actions.is_empty());
        assert!(project.parameters.is_empty());
    }
}
