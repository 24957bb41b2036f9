//! Program text back to action links.

use std::collections::HashSet;

use log::{debug, info};

use cellflow_model::{ActionCache, ActionIO, Project};
use cellflow_source::{main_loop_body, parse, render, Expr, Keyword, Module, Stmt};

use crate::emit::RESOURCES_VAR;
use crate::error::CompileError;
use crate::naming::object_variable_name;

/// One `<variable>.<method>(**res.<action id>)` statement.
struct ActionCall<'a> {
    variable: &'a str,
    method: &'a str,
    action_id: &'a str,
}

fn describe(stmt: &Stmt) -> String {
    render(&Module::new(vec![stmt.clone()]))
        .map(|text| text.trim_end().to_string())
        .unwrap_or_else(|_| "<unprintable statement>".to_string())
}

fn action_call(stmt: &Stmt) -> Result<ActionCall<'_>, CompileError> {
    let unexpected = || CompileError::UnexpectedContent(describe(stmt));
    let Stmt::Expr(Expr::Call {
        func,
        args,
        keywords,
    }) = stmt
    else {
        return Err(unexpected());
    };
    let Expr::Attribute {
        value: receiver,
        attr: method,
    } = func.as_ref()
    else {
        return Err(unexpected());
    };
    let variable = receiver.as_name().ok_or_else(unexpected)?;
    let action_id = match (args.as_slice(), keywords.as_slice()) {
        (
            [],
            [Keyword {
                arg: None,
                value: Expr::Attribute { value, attr },
            }],
        ) if value.as_name() == Some(RESOURCES_VAR) => attr.as_str(),
        _ => return Err(unexpected()),
    };
    Ok(ActionCall {
        variable,
        method,
        action_id,
    })
}

/// Rebuilds the links of the actions in `cache` from the order of calls in
/// the main loop of `source`.
///
/// Every action of the cache has to be called exactly once. On error the
/// cache holds the links rebuilt up to the offending statement; callers
/// should throw it away.
pub fn get_logic_from_source(source: &str, cache: &mut ActionCache) -> Result<(), CompileError> {
    let tree = parse(source)?;
    let body = main_loop_body(&tree)?;
    if matches!(body.as_slice(), [] | [Stmt::Pass]) {
        return Err(CompileError::UnexpectedContent(
            "main loop holds no action calls".to_string(),
        ));
    }

    let mut found = HashSet::new();
    let mut previous: Option<String> = None;
    let last_index = body.len() - 1;

    for (index, stmt) in body.iter().enumerate() {
        let call = action_call(stmt)?;
        if !found.insert(call.action_id) {
            return Err(CompileError::DuplicateAction(call.action_id.to_string()));
        }
        let action = cache
            .get_mut(call.action_id)
            .ok_or_else(|| CompileError::UnknownAction(call.action_id.to_string()))?;

        let (object_id, method) = action.parse_type()?;
        if object_variable_name(object_id) != call.variable || method != call.method {
            return Err(CompileError::ActionTypeMismatch {
                action_type: action.type_name.clone(),
                found: format!("{}/{}", call.variable, call.method),
            });
        }

        action.inputs.clear();
        action.outputs.clear();
        match &previous {
            None => action.inputs.push(ActionIO::First),
            Some(prev) => action.inputs.push(ActionIO::Action(prev.clone())),
        }
        if index == last_index {
            action.outputs.push(ActionIO::Last);
        }
        if let Some(prev) = previous.as_deref().and_then(|prev| cache.get_mut(prev)) {
            prev.outputs.push(ActionIO::Action(call.action_id.to_string()));
        }

        debug!("recovered {} at position {}", call.action_id, index);
        previous = Some(call.action_id.to_string());
    }

    if found.len() != cache.len() {
        let missing: Vec<&str> = cache
            .iter()
            .map(|a| a.id.as_str())
            .filter(|id| !found.contains(id))
            .collect();
        return Err(CompileError::BrokenChain(format!(
            "actions not called from the main loop: {}",
            missing.join(", ")
        )));
    }

    info!("recovered {} action link(s) from source", body.len());
    Ok(())
}

/// Recovers the links of `project` from `source`; the project is only
/// updated when the whole program is accepted.
pub fn recover_project(source: &str, project: &mut Project) -> Result<(), CompileError> {
    let mut cache = ActionCache::from_project(project)?;
    get_logic_from_source(source, &mut cache)?;
    cache.apply_to(project);
    Ok(())
}
