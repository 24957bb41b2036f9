use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneObject {
    pub id: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

impl SceneObject {
    pub fn new(id: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            type_name: type_name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub id: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub objects: Vec<SceneObject>,
}

impl Scene {
    pub fn object(&self, id: &str) -> Option<&SceneObject> {
        self.objects.iter().find(|o| o.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_up_objects_by_id() {
        let scene: Scene = serde_json::from_str(
            r#"{"id": "cell", "objects": [{"id": "robot", "type": "Robot"}]}"#,
        )
        .unwrap();
        assert_eq!(scene.object("robot").unwrap().type_name, "Robot");
        assert!(scene.object("camera").is_none());
    }
}
