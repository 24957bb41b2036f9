//! Action graph to program text.

use std::collections::{HashMap, HashSet};

use log::{debug, info};

use cellflow_model::{Action, ActionCache, ActionIO, ObjectTypeCatalog, Project, Scene};
use cellflow_source::lexer::is_identifier;
use cellflow_source::{
    add_class_instance, add_import, append_method_call, bind_instance_from_registry,
    main_loop_body_mut, render, CmpOp, Constant, Expr, FunctionDef, Keyword, Module, Stmt,
};

use crate::config::CompilerConfig;
use crate::error::CompileError;
use crate::naming::object_variable_name;

pub const SCRIPT_HEADER: &str = "#!/usr/bin/env python3\n# -*- coding: utf-8 -*-\n\n";

/// Variable holding the resources instance in generated programs.
pub const RESOURCES_VAR: &str = "res";
pub const RESOURCES_CLASS: &str = "Resources";

/// Generates the program for `project` with default import locations.
/// `built_in` lists the types that come from the runtime library.
pub fn program_src(
    project: &Project,
    scene: &Scene,
    built_in: &[String],
    catalog: &ObjectTypeCatalog,
) -> Result<String, CompileError> {
    let config = CompilerConfig {
        built_in_types: built_in.to_vec(),
        ..CompilerConfig::default()
    };
    program_src_with_config(project, scene, catalog, &config)
}

pub fn program_src_with_config(
    project: &Project,
    scene: &Scene,
    catalog: &ObjectTypeCatalog,
    config: &CompilerConfig,
) -> Result<String, CompileError> {
    check_scene(scene)?;
    let chain = action_chain(project)?;
    for action in &chain {
        check_action(action, scene, catalog)?;
    }

    let mut tree = empty_script_tree();
    tree = add_import(tree, &config.resources_module, RESOURCES_CLASS);
    tree = add_class_instance(tree, RESOURCES_CLASS, RESOURCES_VAR)?;

    for object in &scene.objects {
        tree = add_import(tree, &config.type_module(&object.type_name), &object.type_name);
        tree = bind_instance_from_registry(
            tree,
            &object_variable_name(&object.id),
            &object.type_name,
            RESOURCES_VAR,
            &object.id,
        )?;
    }

    let body = main_loop_body_mut(&mut tree)?;
    for action in &chain {
        let (object_id, method) = action.parse_type()?;
        append_method_call(
            body,
            &object_variable_name(object_id),
            method,
            Vec::new(),
            vec![Keyword::unpack(Expr::name_attr(RESOURCES_VAR, &action.id))],
        );
    }

    let text = render(&tree)?;
    info!(
        "generated program for project {} ({} action(s), {} object(s))",
        project.id,
        chain.len(),
        scene.objects.len()
    );
    Ok(format!("{SCRIPT_HEADER}{text}"))
}

/// `def main() -> None: while True: pass` and the guarded entry point.
fn empty_script_tree() -> Module {
    let mut main = FunctionDef::new(
        "main",
        Vec::new(),
        vec![Stmt::While {
            test: Expr::Constant(Constant::Bool(true)),
            body: vec![Stmt::Pass],
            orelse: Vec::new(),
        }],
    );
    main.returns = Some(Expr::Constant(Constant::None));

    Module::new(vec![
        Stmt::FunctionDef(main),
        Stmt::If {
            test: Expr::Compare {
                left: Box::new(Expr::name("__name__")),
                ops: vec![CmpOp::Eq],
                comparators: vec![Expr::str("__main__")],
            },
            body: vec![Stmt::Expr(Expr::call(
                Expr::name("main"),
                Vec::new(),
                Vec::new(),
            ))],
            orelse: Vec::new(),
        },
    ])
}

/// Object ids are unique and map to distinct, usable variable names.
fn check_scene(scene: &Scene) -> Result<(), CompileError> {
    let mut ids = HashSet::new();
    let mut names: HashMap<String, &str> = HashMap::new();
    for object in &scene.objects {
        if !ids.insert(object.id.as_str()) {
            return Err(CompileError::DuplicateObjectId(object.id.clone()));
        }
        if !is_identifier(&object.type_name) {
            return Err(CompileError::UnknownObjectType(object.type_name.clone()));
        }
        let name = object_variable_name(&object.id);
        if let Some(first) = names.get(&name) {
            return Err(CompileError::AmbiguousObjectName {
                name,
                first: first.to_string(),
                second: object.id.clone(),
            });
        }
        names.insert(name, &object.id);
    }
    Ok(())
}

/// Actions in execution order, from the start-marked one to the end-marked
/// one. Every action of the project has to be on that path exactly once.
pub fn action_chain(project: &Project) -> Result<Vec<Action>, CompileError> {
    let cache = ActionCache::from_project(project)?;

    let starts: Vec<&Action> = cache.iter().filter(|a| a.is_first()).collect();
    let start = match starts.as_slice() {
        [] => return Err(CompileError::StartActionNotFound),
        [start] => *start,
        _ => {
            return Err(CompileError::MultipleStartActions(
                starts.iter().map(|a| a.id.clone()).collect(),
            ));
        }
    };
    let ends: Vec<&Action> = cache.iter().filter(|a| a.is_last()).collect();
    match ends.len() {
        0 => return Err(CompileError::EndActionNotFound),
        1 => {}
        _ => {
            return Err(CompileError::MultipleEndActions(
                ends.iter().map(|a| a.id.clone()).collect(),
            ));
        }
    }

    let mut chain = Vec::with_capacity(cache.len());
    let mut visited = HashSet::new();
    let mut current = start;
    loop {
        if !visited.insert(current.id.as_str()) {
            return Err(CompileError::BrokenChain(format!(
                "cycle through action `{}`",
                current.id
            )));
        }
        debug!("chain: {}", current.id);
        chain.push(current.clone());
        if current.is_last() {
            break;
        }
        let next = match current.outputs.first() {
            Some(ActionIO::Action(next)) => next,
            _ => {
                return Err(CompileError::BrokenChain(format!(
                    "action `{}` has no successor",
                    current.id
                )));
            }
        };
        current = cache
            .get(next)
            .ok_or_else(|| CompileError::UnknownAction(next.clone()))?;
    }

    if chain.len() != cache.len() {
        let orphans: Vec<&str> = cache
            .iter()
            .map(|a| a.id.as_str())
            .filter(|id| !visited.contains(id))
            .collect();
        return Err(CompileError::BrokenChain(format!(
            "actions not reachable from 'start': {}",
            orphans.join(", ")
        )));
    }
    Ok(chain)
}

/// The action targets a scene object whose type offers the method, and its
/// parameters match the method arguments one to one.
fn check_action(
    action: &Action,
    scene: &Scene,
    catalog: &ObjectTypeCatalog,
) -> Result<(), CompileError> {
    if !is_identifier(&action.id) {
        return Err(CompileError::InvalidActionId(action.id.clone()));
    }
    let (object_id, method) = action.parse_type()?;
    let object = scene
        .object(object_id)
        .ok_or_else(|| CompileError::UnknownObject {
            action: action.id.clone(),
            object: object_id.to_string(),
        })?;
    let object_action = catalog
        .action(&object.type_name, method)?
        .ok_or_else(|| CompileError::UnknownObjectAction {
            object_type: object.type_name.clone(),
            method: method.to_string(),
        })?;

    let mismatch = |reason: String| CompileError::ParameterMismatch {
        action: action.id.clone(),
        reason,
    };
    for arg in &object_action.action_args {
        let parameter = action
            .parameter(&arg.name)
            .ok_or_else(|| mismatch(format!("missing parameter `{}`", arg.name)))?;
        if parameter.type_name != arg.type_name {
            return Err(mismatch(format!(
                "parameter `{}` has type `{}`, expected `{}`",
                arg.name, parameter.type_name, arg.type_name
            )));
        }
    }
    if let Some(extra) = action
        .parameters
        .iter()
        .find(|p| object_action.arg(&p.id).is_none())
    {
        return Err(mismatch(format!("unknown parameter `{}`", extra.id)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{built_in, catalog, move_action, project, scene};
    use cellflow_model::SceneObject;
    use cellflow_source::SourceError;

    fn emit(project: &Project, scene: &Scene) -> Result<String, CompileError> {
        program_src(project, scene, &built_in(), &catalog())
    }

    #[test]
    fn emits_two_action_program() {
        let expected = "#!/usr/bin/env python3\n# -*- coding: utf-8 -*-\n\n\
from resources import Resources\n\
from arcor2.object_types import Robot\n\
\n\
\n\
def main() -> None:\n\
\x20   res = Resources()\n\
\x20   robot: Robot = res.objects['robot']\n\
\x20   while True:\n\
\x20       robot.move_to(**res.move1)\n\
\x20       robot.move_to(**res.move2)\n\
\n\
\n\
if __name__ == '__main__':\n\
\x20   main()\n";
        assert_eq!(emit(&project(), &scene()).unwrap(), expected);
    }

    #[test]
    fn follows_links_rather_than_declaration_order() {
        let mut project = project();
        project.actions.reverse();
        let text = emit(&project, &scene()).unwrap();
        let first = text.find("res.move1").unwrap();
        let second = text.find("res.move2").unwrap();
        assert!(first < second);
    }

    #[test]
    fn user_types_import_from_their_own_module() {
        let mut scene = scene();
        scene.objects.push(SceneObject::new("LeftGripper", "KinectGripper"));
        let mut project = project();
        let mut grip = Action::new("grip1", "LeftGripper", "grip");
        grip.inputs = vec!["move2".into()];
        grip.outputs = vec![ActionIO::Last];
        grip.parameters = vec![cellflow_model::ActionParameter {
            id: "force".into(),
            type_name: "float".into(),
            value: serde_json::json!(1.5),
        }];
        project.actions[1].outputs = vec!["grip1".into()];
        project.actions.push(grip);

        let text = emit(&project, &scene).unwrap();
        assert!(text.contains("from object_types.kinect_gripper import KinectGripper\n"));
        assert!(text.contains("    left_gripper: KinectGripper = res.objects['LeftGripper']\n"));
        assert!(text.contains("        left_gripper.grip(**res.grip1)\n"));
    }

    #[test]
    fn inherited_actions_are_callable() {
        let scene = Scene {
            id: "cell".into(),
            desc: String::new(),
            objects: vec![SceneObject::new("robot", "KinectGripper")],
        };
        assert!(emit(&project(), &scene).is_ok());
    }

    #[test]
    fn single_action_is_both_start_and_end() {
        let mut project = project();
        project.actions = vec![move_action("only", ActionIO::First, ActionIO::Last)];
        let text = emit(&project, &scene()).unwrap();
        assert!(text.contains("    while True:\n        robot.move_to(**res.only)\n"));
    }

    #[test]
    fn rejects_two_start_actions() {
        let mut project = project();
        project.actions[1].inputs = vec![ActionIO::First];
        assert_eq!(
            emit(&project, &scene()),
            Err(CompileError::MultipleStartActions(vec![
                "move1".into(),
                "move2".into()
            ]))
        );
    }

    #[test]
    fn missing_terminator_is_reported() {
        let mut project = project();
        project.actions[1].outputs.clear();
        let err = emit(&project, &scene()).unwrap_err();
        assert_eq!(err, CompileError::EndActionNotFound);
        assert_eq!(err.to_string(), "'end' action not found");

        let mut project = self::project();
        project.actions[0].inputs.clear();
        assert_eq!(
            emit(&project, &scene()),
            Err(CompileError::StartActionNotFound)
        );
    }

    #[test]
    fn detects_cycles_and_orphans() {
        let mut cyclic = project();
        cyclic.actions[0].outputs = vec!["move1".into()];
        cyclic.actions.push(move_action("tail", "x".into(), ActionIO::Last));
        cyclic.actions[1].outputs = vec!["move2".into()];
        assert!(matches!(
            emit(&cyclic, &scene()),
            Err(CompileError::BrokenChain(_))
        ));

        let mut orphaned = project();
        orphaned
            .actions
            .push(move_action("lonely", "nowhere".into(), "nowhere".into()));
        match emit(&orphaned, &scene()) {
            Err(CompileError::BrokenChain(reason)) => assert!(reason.contains("lonely")),
            other => panic!("unexpected result {other:?}"),
        }

        let mut dangling = project();
        dangling.actions[0].outputs = vec!["ghost".into()];
        dangling.actions[1].outputs = vec![ActionIO::Last];
        assert_eq!(
            emit(&dangling, &scene()),
            Err(CompileError::UnknownAction("ghost".into()))
        );
    }

    #[test]
    fn validates_objects_and_parameters() {
        let mut project = project();
        project.actions[0].type_name = "camera/move_to".into();
        assert!(matches!(
            emit(&project, &scene()),
            Err(CompileError::UnknownObject { .. })
        ));

        let mut project = self::project();
        project.actions[0].type_name = "robot/fly".into();
        assert!(matches!(
            emit(&project, &scene()),
            Err(CompileError::UnknownObjectAction { .. })
        ));

        let mut project = self::project();
        project.actions[0].type_name = "robot".into();
        assert_eq!(
            emit(&project, &scene()),
            Err(CompileError::InvalidActionType("robot".into()))
        );

        let mut project = self::project();
        project.actions[0].parameters[1].type_name = "float".into();
        assert!(matches!(
            emit(&project, &scene()),
            Err(CompileError::ParameterMismatch { .. })
        ));

        let mut project = self::project();
        project.actions[0].parameters.pop();
        assert!(matches!(
            emit(&project, &scene()),
            Err(CompileError::ParameterMismatch { .. })
        ));
    }

    #[test]
    fn object_names_must_stay_distinct() {
        let mut scene = scene();
        scene.objects.push(SceneObject::new("Robot", "Robot"));
        assert_eq!(
            emit(&project(), &scene),
            Err(CompileError::AmbiguousObjectName {
                name: "robot".into(),
                first: "robot".into(),
                second: "Robot".into(),
            })
        );

        let mut scene = self::scene();
        scene.objects.push(SceneObject::new("robot", "Robot"));
        assert_eq!(
            emit(&project(), &scene),
            Err(CompileError::DuplicateObjectId("robot".into()))
        );

        let mut scene = self::scene();
        scene.objects.push(SceneObject::new("res", "Robot"));
        assert_eq!(
            emit(&project(), &scene),
            Err(CompileError::Source(SourceError::NameAlreadyBound {
                name: "res".into(),
                existing: "Resources".into(),
            }))
        );
    }

    #[test]
    fn config_moves_imports() {
        let config = CompilerConfig {
            resources_module: "cell.resources".into(),
            built_in_module: "runtime.types".into(),
            ..CompilerConfig::default()
        };
        let text = program_src_with_config(&project(), &scene(), &catalog(), &config).unwrap();
        assert!(text.contains("from cell.resources import Resources\nfrom runtime.types import Robot\n"));
    }
}
