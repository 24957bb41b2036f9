//! Reads the object type and its actions out of an object-type source.
//!
//! The source holds exactly one class. Actions are methods decorated with
//! `@action` and paired with a class-level metadata assignment:
//!
//! ```text
//! class Robot(Generic):
//!     @action
//!     def move_to(self, target: ActionPoint, speed: int) -> None:
//!         ...
//!
//!     move_to.__action__ = ActionMetadata(blocking=True)
//! ```

use indexmap::IndexMap;
use log::debug;

use cellflow_model::{ActionMetadata, ObjectAction, ObjectActionArgs, ObjectType, ObjectTypeMeta};
use cellflow_source::{parse, render_expr, ClassDef, Constant, Expr, ParamKind, Stmt};

use crate::error::CompileError;

const ACTION_DECORATOR: &str = "action";
const METADATA_ATTR: &str = "__action__";
const METADATA_CALL: &str = "ActionMetadata";
const DESCRIPTION_ATTR: &str = "__DESCRIPTION__";
const RECEIVER: &str = "self";

/// The single top-level class of an object-type source.
pub fn object_cls_def(source: &str) -> Result<ClassDef, CompileError> {
    let tree = parse(source)?;
    let mut classes = tree.body.into_iter().filter_map(|stmt| match stmt {
        Stmt::ClassDef(class) => Some(class),
        _ => None,
    });
    let class = classes.next().ok_or(CompileError::NoClassDefinition)?;
    if classes.next().is_some() {
        return Err(CompileError::MultipleClassDefinitions);
    }
    Ok(class)
}

pub fn object_type_info(source: &str) -> Result<ObjectType, CompileError> {
    type_info(&object_cls_def(source)?)
}

pub fn object_actions(source: &str) -> Result<Vec<ObjectAction>, CompileError> {
    actions(&object_cls_def(source)?)
}

pub fn inspect_object_type(source: &str) -> Result<(ObjectType, Vec<ObjectAction>), CompileError> {
    let class = object_cls_def(source)?;
    let object_type = type_info(&class)?;
    let actions = actions(&class)?;
    debug!(
        "inspected object type {} with {} action(s)",
        object_type.name,
        actions.len()
    );
    Ok((object_type, actions))
}

/// Same as `inspect_object_type`, packed for a catalog.
pub fn object_type_meta(source: &str) -> Result<ObjectTypeMeta, CompileError> {
    let (object_type, actions) = inspect_object_type(source)?;
    Ok(ObjectTypeMeta {
        object_type,
        actions,
    })
}

/// Validates an object-type source without keeping the results.
pub fn check_object_type(source: &str) -> Result<(), CompileError> {
    inspect_object_type(source).map(|_| ())
}

fn type_info(class: &ClassDef) -> Result<ObjectType, CompileError> {
    let base = match class.bases.as_slice() {
        [] => None,
        [base] => Some(base.dotted_name().map_or_else(|| render_expr(base), Ok)?),
        _ => return Err(CompileError::MultipleBases(class.name.clone())),
    };

    let mut description = None;
    for stmt in &class.body {
        let Stmt::Assign { targets, value } = stmt else {
            continue;
        };
        if !matches!(targets.as_slice(), [target] if target.as_name() == Some(DESCRIPTION_ATTR)) {
            continue;
        }
        let text = value
            .as_str()
            .ok_or_else(|| CompileError::InvalidDescription(class.name.clone()))?;
        description = Some(text.to_string());
    }

    let description = description
        .or_else(|| class.docstring().map(|doc| doc.trim().to_string()))
        .unwrap_or_default();

    Ok(ObjectType {
        name: class.name.clone(),
        base,
        description,
    })
}

/// `<method>.__action__ = ActionMetadata(...)` statements by method name.
fn metadata_table(class: &ClassDef) -> Result<IndexMap<String, ActionMetadata>, CompileError> {
    let mut table = IndexMap::new();
    for stmt in &class.body {
        let Stmt::Assign { targets, value } = stmt else {
            continue;
        };
        let [Expr::Attribute { value: owner, attr }] = targets.as_slice() else {
            continue;
        };
        if attr != METADATA_ATTR {
            continue;
        }
        let Some(method) = owner.as_name() else {
            continue;
        };
        table.insert(method.to_string(), parse_metadata(method, value)?);
    }
    Ok(table)
}

fn parse_metadata(method: &str, value: &Expr) -> Result<ActionMetadata, CompileError> {
    let invalid = || CompileError::InvalidMetadata(method.to_string());
    let Expr::Call {
        func,
        args,
        keywords,
    } = value
    else {
        return Err(invalid());
    };
    if func.dotted_name().as_deref() != Some(METADATA_CALL) || !args.is_empty() {
        return Err(invalid());
    }

    let mut meta = ActionMetadata::default();
    for keyword in keywords {
        let flag = keyword.arg.as_deref().ok_or_else(invalid)?;
        let field = metadata_field(&mut meta, flag).ok_or_else(|| {
            CompileError::UnknownMetadataFlag {
                method: method.to_string(),
                flag: flag.to_string(),
            }
        })?;
        *field = match keyword.value {
            Expr::Constant(Constant::Bool(b)) => b,
            _ => {
                return Err(CompileError::InvalidMetadataValue {
                    method: method.to_string(),
                    flag: flag.to_string(),
                });
            }
        };
    }
    Ok(meta)
}

fn metadata_field<'a>(meta: &'a mut ActionMetadata, flag: &str) -> Option<&'a mut bool> {
    match flag {
        "free" => Some(&mut meta.free),
        "blocking" => Some(&mut meta.blocking),
        "composite" => Some(&mut meta.composite),
        "blackbox" => Some(&mut meta.blackbox),
        _ => None,
    }
}

fn actions(class: &ClassDef) -> Result<Vec<ObjectAction>, CompileError> {
    let mut metadata = metadata_table(class)?;
    let mut actions = Vec::new();

    for stmt in &class.body {
        let Stmt::FunctionDef(def) = stmt else {
            continue;
        };
        if !def.has_decorator(ACTION_DECORATOR) {
            if metadata.contains_key(&def.name) {
                return Err(CompileError::MissingActionDecorator(def.name.clone()));
            }
            continue;
        }
        let meta = metadata
            .shift_remove(&def.name)
            .ok_or_else(|| CompileError::MissingMetadata(def.name.clone()))?;

        let mut action_args = Vec::new();
        for (i, param) in def.params.iter().enumerate() {
            if i == 0 && param.name == RECEIVER {
                continue;
            }
            if matches!(param.kind, ParamKind::VarArgs | ParamKind::VarKeywords) {
                return Err(CompileError::UnsupportedArgument {
                    method: def.name.clone(),
                    arg: param.name.clone(),
                });
            }
            let annotation = param.annotation.as_ref().ok_or_else(|| {
                CompileError::UnannotatedArgument {
                    method: def.name.clone(),
                    arg: param.name.clone(),
                }
            })?;
            // `x: 'Pose'` names the type `Pose`
            let type_name = match annotation {
                Expr::Constant(Constant::Str(text)) => text.trim().to_string(),
                other => render_expr(other)?,
            };
            action_args.push(ObjectActionArgs::new(&param.name, type_name));
        }

        actions.push(ObjectAction {
            name: def.name.clone(),
            meta,
            action_args,
        });
    }

    // metadata left over belongs to no method at all
    if let Some((method, _)) = metadata.into_iter().next() {
        return Err(CompileError::MissingActionDecorator(method));
    }
    Ok(actions)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROBOT: &str = r#"
import time

from arcor2.object_types import Generic
from arcor2.action import action
from arcor2.data import ActionMetadata, ActionPoint, Pose


class Robot(Generic):
    """
    Abstract class representing robot and its basic capabilities (motion)
    """

    def get_pose(self, end_effector: str) -> Pose:
        raise NotImplementedError()

    @action
    def move_to(self, target: ActionPoint, end_effector: str, speed: int) -> None:
        time.sleep(1)

    move_to.__action__ = ActionMetadata(free=True, blocking=True)

    @action
    def pick(self, items: List[str]) -> None:
        pass

    pick.__action__ = ActionMetadata()
"#;

    #[test]
    fn inspects_robot_type() {
        let (object_type, actions) = inspect_object_type(ROBOT).unwrap();
        assert_eq!(object_type.name, "Robot");
        assert_eq!(object_type.base.as_deref(), Some("Generic"));
        assert_eq!(
            object_type.description,
            "Abstract class representing robot and its basic capabilities (motion)"
        );

        assert_eq!(actions.len(), 2);
        let move_to = &actions[0];
        assert_eq!(move_to.name, "move_to");
        assert!(move_to.meta.free && move_to.meta.blocking && !move_to.meta.composite);
        assert_eq!(
            move_to.action_args,
            vec![
                ObjectActionArgs::new("target", "ActionPoint"),
                ObjectActionArgs::new("end_effector", "str"),
                ObjectActionArgs::new("speed", "int"),
            ]
        );
        assert_eq!(actions[1].action_args[0].type_name, "List[str]");
        assert!(check_object_type(ROBOT).is_ok());
    }

    #[test]
    fn description_attribute_wins_over_docstring() {
        let src = "class Box:\n    '''Doc.'''\n    __DESCRIPTION__ = 'A box.'\n";
        let info = object_type_info(src).unwrap();
        assert_eq!(info.description, "A box.");
        assert_eq!(info.base, None);

        let src = "class Box:\n    __DESCRIPTION__ = 42\n";
        assert_eq!(
            object_type_info(src),
            Err(CompileError::InvalidDescription("Box".into()))
        );
    }

    #[test]
    fn requires_exactly_one_class() {
        assert_eq!(object_type_info("x = 1\n"), Err(CompileError::NoClassDefinition));
        assert_eq!(
            object_type_info("class A:\n    pass\nclass B:\n    pass\n"),
            Err(CompileError::MultipleClassDefinitions)
        );
        assert_eq!(
            object_type_info("class A(B, C):\n    pass\n"),
            Err(CompileError::MultipleBases("A".into()))
        );
    }

    #[test]
    fn rejects_unannotated_arguments() {
        let src = "class R:\n    @action\n    def move(self, speed):\n        pass\n    move.__action__ = ActionMetadata()\n";
        assert_eq!(
            object_actions(src),
            Err(CompileError::UnannotatedArgument {
                method: "move".into(),
                arg: "speed".into()
            })
        );
    }

    #[test]
    fn async_helpers_do_not_block_inspection() {
        let src = "class Cam:\n    async def _poll(self):\n        if (frame := await self.read()) is None:\n            return\n\n    @action\n    def snap(self, name: str):\n        pass\n    snap.__action__ = ActionMetadata()\n";
        let actions = object_actions(src).unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].name, "snap");
    }

    #[test]
    fn string_annotations_name_the_type() {
        let src = "class R:\n    @action\n    def move(self, to: 'Pose', via: 'List[Pose]' = None):\n        pass\n    move.__action__ = ActionMetadata()\n";
        let actions = object_actions(src).unwrap();
        assert_eq!(actions[0].arg("to").unwrap().type_name, "Pose");
        assert_eq!(actions[0].arg("via").unwrap().type_name, "List[Pose]");
    }

    #[test]
    fn decorator_and_metadata_must_pair() {
        let no_meta = "class R:\n    @action\n    def move(self):\n        pass\n";
        assert_eq!(
            object_actions(no_meta),
            Err(CompileError::MissingMetadata("move".into()))
        );

        let no_decorator = "class R:\n    def move(self):\n        pass\n    move.__action__ = ActionMetadata()\n";
        assert_eq!(
            object_actions(no_decorator),
            Err(CompileError::MissingActionDecorator("move".into()))
        );

        let orphan = "class R:\n    ghost.__action__ = ActionMetadata()\n";
        assert_eq!(
            object_actions(orphan),
            Err(CompileError::MissingActionDecorator("ghost".into()))
        );
    }

    #[test]
    fn validates_metadata_flags() {
        let unknown = "class R:\n    m.__action__ = ActionMetadata(fast=True)\n";
        assert_eq!(
            object_actions(unknown),
            Err(CompileError::UnknownMetadataFlag {
                method: "m".into(),
                flag: "fast".into()
            })
        );

        let not_bool = "class R:\n    m.__action__ = ActionMetadata(free=1)\n";
        assert!(matches!(
            object_actions(not_bool),
            Err(CompileError::InvalidMetadataValue { .. })
        ));

        let wrong_call = "class R:\n    m.__action__ = dict(free=True)\n";
        assert_eq!(
            object_actions(wrong_call),
            Err(CompileError::InvalidMetadata("m".into()))
        );
    }

    #[test]
    fn variadic_arguments_are_not_actions() {
        let src = "class R:\n    @action\n    def run(self, *steps: int):\n        pass\n    run.__action__ = ActionMetadata()\n";
        assert_eq!(
            object_actions(src),
            Err(CompileError::UnsupportedArgument {
                method: "run".into(),
                arg: "steps".into()
            })
        );
    }

    #[test]
    fn parse_errors_surface_as_source_errors() {
        assert!(matches!(
            check_object_type("class R(:\n"),
            Err(CompileError::Source(_))
        ));
    }
}
