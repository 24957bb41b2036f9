use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectType {
    pub name: String,
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActionMetadata {
    pub free: bool,
    pub blocking: bool,
    pub composite: bool,
    pub blackbox: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectActionArgs {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

impl ObjectActionArgs {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectAction {
    pub name: String,
    #[serde(default)]
    pub meta: ActionMetadata,
    #[serde(default)]
    pub action_args: Vec<ObjectActionArgs>,
}

impl ObjectAction {
    pub fn arg(&self, name: &str) -> Option<&ObjectActionArgs> {
        self.action_args.iter().find(|a| a.name == name)
    }
}

/// An object type together with the actions it declares itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectTypeMeta {
    pub object_type: ObjectType,
    #[serde(default)]
    pub actions: Vec<ObjectAction>,
}

/// Known object types by name, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<ObjectTypeMeta>", into = "Vec<ObjectTypeMeta>")]
pub struct ObjectTypeCatalog {
    types: IndexMap<String, ObjectTypeMeta>,
}

impl ObjectTypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a type; returns the replaced entry.
    pub fn insert(&mut self, meta: ObjectTypeMeta) -> Option<ObjectTypeMeta> {
        self.types.insert(meta.object_type.name.clone(), meta)
    }

    pub fn get(&self, name: &str) -> Option<&ObjectTypeMeta> {
        self.types.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObjectTypeMeta> {
        self.types.values()
    }

    /// Actions available on `type_name`, own actions first, then inherited
    /// ones not overridden further down. The chain stops at a base that is
    /// not in the catalog.
    pub fn actions_of(&self, type_name: &str) -> Result<Vec<&ObjectAction>, ModelError> {
        let mut current = self
            .types
            .get(type_name)
            .ok_or_else(|| ModelError::UnknownObjectType(type_name.to_string()))?;

        let mut visited = HashSet::new();
        let mut actions: Vec<&ObjectAction> = Vec::new();
        loop {
            if !visited.insert(current.object_type.name.as_str()) {
                return Err(ModelError::BaseChainCycle(type_name.to_string()));
            }
            for action in &current.actions {
                if !actions.iter().any(|a| a.name == action.name) {
                    actions.push(action);
                }
            }
            match current
                .object_type
                .base
                .as_deref()
                .and_then(|base| self.types.get(base))
            {
                Some(base) => current = base,
                None => return Ok(actions),
            }
        }
    }

    pub fn action(&self, type_name: &str, method: &str) -> Result<Option<&ObjectAction>, ModelError> {
        Ok(self
            .actions_of(type_name)?
            .into_iter()
            .find(|a| a.name == method))
    }
}

impl From<Vec<ObjectTypeMeta>> for ObjectTypeCatalog {
    fn from(types: Vec<ObjectTypeMeta>) -> Self {
        let mut catalog = Self::new();
        for meta in types {
            catalog.insert(meta);
        }
        catalog
    }
}

impl From<ObjectTypeCatalog> for Vec<ObjectTypeMeta> {
    fn from(catalog: ObjectTypeCatalog) -> Self {
        catalog.types.into_iter().map(|(_, meta)| meta).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(name: &str, base: Option<&str>, actions: &[&str]) -> ObjectTypeMeta {
        ObjectTypeMeta {
            object_type: ObjectType {
                name: name.to_string(),
                base: base.map(str::to_string),
                description: String::new(),
            },
            actions: actions
                .iter()
                .map(|a| ObjectAction {
                    name: a.to_string(),
                    meta: ActionMetadata::default(),
                    action_args: vec![ObjectActionArgs::new("speed", name)],
                })
                .collect(),
        }
    }

    #[test]
    fn inherited_actions_resolve_through_the_base_chain() {
        let catalog = ObjectTypeCatalog::from(vec![
            meta("Robot", Some("Generic"), &["move_to", "home"]),
            meta("Kuka", Some("Robot"), &["home", "weld"]),
        ]);

        let names: Vec<_> = catalog
            .actions_of("Kuka")
            .unwrap()
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(names, ["home", "weld", "move_to"]);

        // override wins
        let home = catalog.action("Kuka", "home").unwrap().unwrap();
        assert_eq!(home.action_args[0].type_name, "Kuka");
        assert!(catalog.action("Robot", "weld").unwrap().is_none());
        assert_eq!(
            catalog.actions_of("Camera"),
            Err(ModelError::UnknownObjectType("Camera".into()))
        );
    }

    #[test]
    fn base_chain_cycles_are_rejected() {
        let catalog = ObjectTypeCatalog::from(vec![
            meta("A", Some("B"), &[]),
            meta("B", Some("A"), &[]),
        ]);
        assert_eq!(
            catalog.actions_of("A"),
            Err(ModelError::BaseChainCycle("A".into()))
        );
    }

    #[test]
    fn catalog_serializes_as_a_list() {
        let catalog = ObjectTypeCatalog::from(vec![meta("Robot", None, &["home"])]);
        let json = serde_json::to_value(&catalog).unwrap();
        assert_eq!(json[0]["objectType"]["name"], "Robot");
        assert_eq!(json[0]["actions"][0]["actionArgs"][0]["type"], "Robot");
        assert_eq!(json[0]["actions"][0]["meta"]["blocking"], false);

        let back: ObjectTypeCatalog = serde_json::from_value(json).unwrap();
        assert_eq!(back, catalog);
    }

    #[test]
    fn metadata_flags_default_to_false() {
        let meta: ActionMetadata = serde_json::from_str(r#"{"blocking": true}"#).unwrap();
        assert_eq!(
            meta,
            ActionMetadata {
                blocking: true,
                ..ActionMetadata::default()
            }
        );
    }
}
