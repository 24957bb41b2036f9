//! Shared scene, project and catalog used by the compiler tests.

use cellflow_model::{
    Action, ActionIO, ActionParameter, ObjectTypeCatalog, Project, Scene, SceneObject,
};
use serde_json::json;

use crate::inspect::object_type_meta;

pub const ROBOT_TYPE: &str = r#"
from arcor2.object_types import Generic
from arcor2.action import action
from arcor2.data import ActionMetadata


class Robot(Generic):
    __DESCRIPTION__ = 'Robot with basic motion'

    @action
    def move_to(self, target: str, speed: int) -> None:
        pass

    move_to.__action__ = ActionMetadata(blocking=True)

    @action
    def home(self) -> None:
        pass

    home.__action__ = ActionMetadata()
"#;

pub const GRIPPER_TYPE: &str = r#"
class KinectGripper(Robot):
    @action
    def grip(self, force: float) -> None:
        pass

    grip.__action__ = ActionMetadata(free=True)
"#;

pub fn catalog() -> ObjectTypeCatalog {
    let mut catalog = ObjectTypeCatalog::new();
    catalog.insert(object_type_meta(ROBOT_TYPE).unwrap());
    catalog.insert(object_type_meta(GRIPPER_TYPE).unwrap());
    catalog
}

pub fn scene() -> Scene {
    Scene {
        id: "cell".into(),
        desc: String::new(),
        objects: vec![SceneObject::new("robot", "Robot")],
    }
}

pub fn move_action(id: &str, inputs: ActionIO, outputs: ActionIO) -> Action {
    let mut action = Action::new(id, "robot", "move_to");
    action.inputs = vec![inputs];
    action.outputs = vec![outputs];
    action.parameters = vec![
        ActionParameter {
            id: "target".into(),
            type_name: "str".into(),
            value: json!("box"),
        },
        ActionParameter {
            id: "speed".into(),
            type_name: "int".into(),
            value: json!(10),
        },
    ];
    action
}

/// `move1 -> move2`, both moving the robot.
pub fn project() -> Project {
    Project {
        id: "demo".into(),
        scene_id: "cell".into(),
        desc: String::new(),
        actions: vec![
            move_action("move1", ActionIO::First, "move2".into()),
            move_action("move2", "move1".into(), ActionIO::Last),
        ],
        parameters: vec!["speed".into()],
    }
}

pub fn built_in() -> Vec<String> {
    vec!["Generic".into(), "Robot".into()]
}
