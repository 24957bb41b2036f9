//! Pure tree-to-tree edits and lookups.
//!
//! Edits take the module by value and hand back the edited module, so a
//! failed edit never leaves a half-modified tree behind.

use log::debug;

use crate::ast::*;
use crate::error::SourceError;

const MAIN: &str = "main";

/// Nested statement lists of a compound statement, in source order.
fn bodies(stmt: &Stmt) -> Vec<&Vec<Stmt>> {
    match stmt {
        Stmt::FunctionDef(def) => vec![&def.body],
        Stmt::ClassDef(class) => vec![&class.body],
        Stmt::If { body, orelse, .. }
        | Stmt::While { body, orelse, .. }
        | Stmt::For { body, orelse, .. } => vec![body, orelse],
        Stmt::With { body, .. } => vec![body],
        Stmt::Try {
            body,
            handlers,
            orelse,
            finalbody,
        } => {
            let mut all = vec![body];
            all.extend(handlers.iter().map(|h| &h.body));
            all.push(orelse);
            all.push(finalbody);
            all
        }
        _ => Vec::new(),
    }
}

fn bodies_mut(stmt: &mut Stmt) -> Vec<&mut Vec<Stmt>> {
    match stmt {
        Stmt::FunctionDef(def) => vec![&mut def.body],
        Stmt::ClassDef(class) => vec![&mut class.body],
        Stmt::If { body, orelse, .. }
        | Stmt::While { body, orelse, .. }
        | Stmt::For { body, orelse, .. } => vec![body, orelse],
        Stmt::With { body, .. } => vec![body],
        Stmt::Try {
            body,
            handlers,
            orelse,
            finalbody,
        } => {
            let mut all = vec![body];
            all.extend(handlers.iter_mut().map(|h| &mut h.body));
            all.push(orelse);
            all.push(finalbody);
            all
        }
        _ => Vec::new(),
    }
}

fn function_in<'a>(body: &'a [Stmt], name: &str) -> Option<&'a FunctionDef> {
    for stmt in body {
        if let Stmt::FunctionDef(def) = stmt {
            if def.name == name {
                return Some(def);
            }
        }
        if let Some(found) = bodies(stmt).into_iter().find_map(|b| function_in(b, name)) {
            return Some(found);
        }
    }
    None
}

fn function_in_mut<'a>(body: &'a mut [Stmt], name: &str) -> Option<&'a mut FunctionDef> {
    let index = body
        .iter()
        .position(|stmt| function_in(std::slice::from_ref(stmt), name).is_some())?;
    let direct = matches!(&body[index], Stmt::FunctionDef(def) if def.name == name);
    if direct {
        return match &mut body[index] {
            Stmt::FunctionDef(def) => Some(def),
            _ => None,
        };
    }
    bodies_mut(&mut body[index])
        .into_iter()
        .find_map(|b| function_in_mut(b, name))
}

/// First function called `name`, depth first.
pub fn find_function<'a>(tree: &'a Module, name: &str) -> Result<&'a FunctionDef, SourceError> {
    function_in(&tree.body, name).ok_or_else(|| SourceError::FunctionNotFound(name.to_string()))
}

pub fn find_function_mut<'a>(
    tree: &'a mut Module,
    name: &str,
) -> Result<&'a mut FunctionDef, SourceError> {
    function_in_mut(&mut tree.body, name)
        .ok_or_else(|| SourceError::FunctionNotFound(name.to_string()))
}

pub fn find_class_def<'a>(tree: &'a Module, name: &str) -> Result<&'a ClassDef, SourceError> {
    fn class_in<'a>(body: &'a [Stmt], name: &str) -> Option<&'a ClassDef> {
        for stmt in body {
            if let Stmt::ClassDef(class) = stmt {
                if class.name == name {
                    return Some(class);
                }
            }
            if let Some(found) = bodies(stmt).into_iter().find_map(|b| class_in(b, name)) {
                return Some(found);
            }
        }
        None
    }
    class_in(&tree.body, name).ok_or_else(|| SourceError::ClassNotFound(name.to_string()))
}

/// `from <module> import <name>`, merged into an existing import of the same
/// module when there is one.
pub fn add_import(mut tree: Module, module: &str, name: &str) -> Module {
    let existing = tree.body.iter_mut().find_map(|stmt| match stmt {
        Stmt::ImportFrom {
            module: existing,
            names,
            level: 0,
        } if existing == module => Some(names),
        _ => None,
    });
    if let Some(names) = existing {
        if !names.iter().any(|a| a.name == name && a.asname.is_none()) {
            debug!("extending `from {module} import` with {name}");
            names.push(Alias::new(name));
        }
        return tree;
    }

    let index = match tree.body.iter().rposition(Stmt::is_import) {
        Some(last) => last + 1,
        // keep a module docstring first
        None => match tree.body.first() {
            Some(Stmt::Expr(Expr::Constant(Constant::Str(_)))) => 1,
            _ => 0,
        },
    };
    debug!("adding `from {module} import {name}`");
    tree.body.insert(
        index,
        Stmt::ImportFrom {
            module: module.to_string(),
            names: vec![Alias::new(name)],
            level: 0,
        },
    );
    tree
}

/// Top-level import binds `class` under that exact name.
pub fn is_imported(tree: &Module, class: &str) -> bool {
    tree.body.iter().any(|stmt| match stmt {
        Stmt::ImportFrom { names, .. } | Stmt::Import(names) => {
            names.iter().any(|a| a.bound_name() == class)
        }
        _ => false,
    })
}

/// Appends `<instance>.<method>(...)` to `body`, replacing a lone `pass`.
pub fn append_method_call(
    body: &mut Vec<Stmt>,
    instance: &str,
    method: &str,
    args: Vec<Expr>,
    keywords: Vec<Keyword>,
) {
    if matches!(body.as_slice(), [Stmt::Pass]) {
        body.clear();
    }
    debug!("appending call {instance}.{method}");
    body.push(Stmt::method_call(instance, method, args, keywords));
}

/// What `name` is already bound to in `body`: the instantiated class for
/// `name = Class()`, the annotation for `name: Class = ...`.
fn existing_binding(body: &[Stmt], name: &str) -> Option<String> {
    let describe = |e: &Expr| e.dotted_name().unwrap_or_else(|| "<expression>".to_string());
    body.iter().find_map(|stmt| match stmt {
        Stmt::Assign { targets, value }
            if targets.iter().any(|t| t.as_name() == Some(name)) =>
        {
            Some(match value {
                Expr::Call { func, .. } => describe(func),
                other => describe(other),
            })
        }
        Stmt::AnnAssign {
            target, annotation, ..
        } if target.as_name() == Some(name) => Some(describe(annotation)),
        _ => None,
    })
}

/// Checks `name` against existing bindings in `main`. `Ok(true)` means the
/// same binding is already there.
fn check_binding(main: &FunctionDef, name: &str, class: &str) -> Result<bool, SourceError> {
    match existing_binding(&main.body, name) {
        None => Ok(false),
        Some(existing) if existing == class => Ok(true),
        Some(existing) => Err(SourceError::NameAlreadyBound {
            name: name.to_string(),
            existing,
        }),
    }
}

/// Position right after the last assignment in `body`.
fn after_last_binding(body: &[Stmt]) -> usize {
    body.iter().rposition(Stmt::is_binding).map_or(0, |i| i + 1)
}

/// Inserts `name = Class()` at the start of `main`.
pub fn add_class_instance(mut tree: Module, class: &str, name: &str) -> Result<Module, SourceError> {
    if !is_imported(&tree, class) {
        return Err(SourceError::ClassNotImported(class.to_string()));
    }
    let main = find_function_mut(&mut tree, MAIN)?;
    if check_binding(main, name, class)? {
        return Ok(tree);
    }
    debug!("binding {name} = {class}()");
    main.body.insert(
        0,
        Stmt::Assign {
            targets: vec![Expr::name(name)],
            value: Expr::call(Expr::name(class), Vec::new(), Vec::new()),
        },
    );
    Ok(tree)
}

/// Inserts `name: Class = accessor.objects['key']` after the last binding in
/// `main`.
pub fn bind_instance_from_registry(
    mut tree: Module,
    name: &str,
    class: &str,
    accessor: &str,
    key: &str,
) -> Result<Module, SourceError> {
    let main = find_function_mut(&mut tree, MAIN)?;
    if check_binding(main, name, class)? {
        return Ok(tree);
    }
    debug!("binding {name}: {class} = {accessor}.objects['{key}']");
    let index = after_last_binding(&main.body);
    main.body.insert(
        index,
        Stmt::AnnAssign {
            target: Expr::name(name),
            annotation: Expr::name(class),
            value: Some(Expr::subscript(
                Expr::name_attr(accessor, "objects"),
                Expr::str(key),
            )),
        },
    );
    Ok(tree)
}

/// Inserts `<instance>.<method>(...)` into `main` right after its bindings.
pub fn add_method_call_in_main(
    mut tree: Module,
    instance: &str,
    method: &str,
    args: Vec<Expr>,
    keywords: Vec<Keyword>,
) -> Result<Module, SourceError> {
    let main = find_function_mut(&mut tree, MAIN)?;
    let index = after_last_binding(&main.body);
    main.body
        .insert(index, Stmt::method_call(instance, method, args, keywords));
    Ok(tree)
}

fn main_loop_index(main: &FunctionDef) -> Result<usize, SourceError> {
    let mut loops = main
        .body
        .iter()
        .enumerate()
        .filter(|(_, stmt)| matches!(stmt, Stmt::While { .. }))
        .map(|(i, _)| i);
    let index = loops.next().ok_or(SourceError::MainLoopNotFound)?;
    if loops.next().is_some() {
        return Err(SourceError::MultipleMainLoops);
    }
    Ok(index)
}

/// Body of the single `while` loop in `main`.
pub fn main_loop_body(tree: &Module) -> Result<&Vec<Stmt>, SourceError> {
    let main = find_function(tree, MAIN)?;
    match &main.body[main_loop_index(main)?] {
        Stmt::While { body, .. } => Ok(body),
        _ => Err(SourceError::MainLoopNotFound),
    }
}

pub fn main_loop_body_mut(tree: &mut Module) -> Result<&mut Vec<Stmt>, SourceError> {
    let main = find_function_mut(tree, MAIN)?;
    let index = main_loop_index(main)?;
    match &mut main.body[index] {
        Stmt::While { body, .. } => Ok(body),
        _ => Err(SourceError::MainLoopNotFound),
    }
}

fn collect<'a>(body: &'a [Stmt], wanted: fn(&Stmt) -> bool, out: &mut Vec<&'a Stmt>) {
    for stmt in body {
        if wanted(stmt) {
            out.push(stmt);
        }
        for nested in bodies(stmt) {
            collect(nested, wanted, out);
        }
    }
}

/// Every `assert` in `function`, nested blocks included.
pub fn find_asserts(function: &FunctionDef) -> Vec<&Stmt> {
    let mut out = Vec::new();
    collect(&function.body, |s| matches!(s, Stmt::Assert { .. }), &mut out);
    out
}

/// Every `raise` in `function`, nested blocks included.
pub fn find_raises(function: &FunctionDef) -> Vec<&Stmt> {
    let mut out = Vec::new();
    collect(&function.body, |s| matches!(s, Stmt::Raise { .. }), &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::render::render;

    const SKELETON: &str = "def main() -> None:\n    while True:\n        pass\n\n\nif __name__ == '__main__':\n    main()\n";

    #[test]
    fn finds_nested_functions_depth_first() {
        let tree = parse(
            "class A:\n    def run(self):\n        return 1\n\ndef run():\n    return 2\n",
        )
        .unwrap();
        let run = find_function(&tree, "run").unwrap();
        assert_eq!(run.params.len(), 1);
        assert_eq!(
            find_function(&tree, "missing"),
            Err(SourceError::FunctionNotFound("missing".into()))
        );
        assert_eq!(find_class_def(&tree, "A").unwrap().name, "A");
        assert!(matches!(
            find_class_def(&tree, "B"),
            Err(SourceError::ClassNotFound(_))
        ));
    }

    #[test]
    fn find_function_mut_edits_in_place() {
        let mut tree = parse("if True:\n    def inner():\n        pass\n").unwrap();
        find_function_mut(&mut tree, "inner").unwrap().body = vec![Stmt::Break];
        assert_eq!(find_function(&tree, "inner").unwrap().body, vec![Stmt::Break]);
    }

    #[test]
    fn find_function_mut_reaches_top_level_and_methods() {
        let mut tree = parse(
            "class A:\n    def run(self):\n        return 1\n\ndef main():\n    pass\n",
        )
        .unwrap();
        find_function_mut(&mut tree, "main").unwrap().body = vec![Stmt::Continue];
        find_function_mut(&mut tree, "run").unwrap().body = vec![Stmt::Break];
        assert_eq!(find_function(&tree, "main").unwrap().body, vec![Stmt::Continue]);
        assert_eq!(find_function(&tree, "run").unwrap().body, vec![Stmt::Break]);
        assert!(matches!(
            find_function_mut(&mut tree, "missing"),
            Err(SourceError::FunctionNotFound(_))
        ));
    }

    #[test]
    fn add_import_is_idempotent_and_merges() {
        let tree = parse("import time\nx = 1\n").unwrap();
        let tree = add_import(tree, "arcor2.data", "ActionPoint");
        let tree = add_import(tree, "arcor2.data", "Pose");
        let tree = add_import(tree, "arcor2.data", "Pose");
        assert_eq!(
            render(&tree).unwrap(),
            "import time\nfrom arcor2.data import ActionPoint, Pose\nx = 1\n"
        );
    }

    #[test]
    fn add_import_keeps_docstring_first() {
        let tree = parse("'''Doc.'''\nx = 1\n").unwrap();
        let tree = add_import(tree, "a", "B");
        assert!(tree.body[1].is_import());
    }

    #[test]
    fn add_class_instance_requires_import() {
        let tree = parse(SKELETON).unwrap();
        assert_eq!(
            add_class_instance(tree.clone(), "Resources", "res"),
            Err(SourceError::ClassNotImported("Resources".into()))
        );

        let tree = add_import(tree, "resources", "Resources");
        let tree = add_class_instance(tree, "Resources", "res").unwrap();
        let again = add_class_instance(tree.clone(), "Resources", "res").unwrap();
        assert_eq!(again, tree);

        let tree = add_import(tree, "resources", "Other");
        assert_eq!(
            add_class_instance(tree, "Other", "res"),
            Err(SourceError::NameAlreadyBound {
                name: "res".into(),
                existing: "Resources".into()
            })
        );
    }

    #[test]
    fn bindings_follow_the_last_assignment() {
        let tree = add_import(parse(SKELETON).unwrap(), "resources", "Resources");
        let tree = add_class_instance(tree, "Resources", "res").unwrap();
        let tree = bind_instance_from_registry(tree, "robot", "Robot", "res", "robot").unwrap();
        let tree = bind_instance_from_registry(tree, "gripper", "Gripper", "res", "g1").unwrap();
        let tree = add_method_call_in_main(tree, "robot", "home", Vec::new(), Vec::new()).unwrap();

        let text = render(&tree).unwrap();
        assert!(text.contains(
            "    res = Resources()\n    robot: Robot = res.objects['robot']\n    gripper: Gripper = res.objects['g1']\n    robot.home()\n    while True:\n"
        ));

        assert_eq!(
            bind_instance_from_registry(tree, "res", "Robot", "res", "x"),
            Err(SourceError::NameAlreadyBound {
                name: "res".into(),
                existing: "Resources".into()
            })
        );
    }

    #[test]
    fn appending_replaces_placeholder_pass() {
        let mut tree = parse(SKELETON).unwrap();
        let body = main_loop_body_mut(&mut tree).unwrap();
        append_method_call(
            body,
            "robot",
            "move_to",
            Vec::new(),
            vec![Keyword::unpack(Expr::name_attr("res", "move1"))],
        );
        append_method_call(body, "robot", "home", Vec::new(), Vec::new());
        let body = main_loop_body(&tree).unwrap();
        assert_eq!(body.len(), 2);
        assert!(render(&tree).unwrap().contains("        robot.move_to(**res.move1)\n        robot.home()\n"));
    }

    #[test]
    fn main_loop_must_be_unique() {
        let tree = parse("def main():\n    x = 1\n").unwrap();
        assert_eq!(main_loop_body(&tree), Err(SourceError::MainLoopNotFound));

        let tree = parse("def main():\n    while a:\n        pass\n    while b:\n        pass\n").unwrap();
        assert_eq!(main_loop_body(&tree), Err(SourceError::MultipleMainLoops));

        let tree = parse("x = 1\n").unwrap();
        assert_eq!(
            main_loop_body(&tree),
            Err(SourceError::FunctionNotFound("main".into()))
        );
    }

    #[test]
    fn collects_asserts_and_raises_in_nested_blocks() {
        let tree = parse(
            "def check(x):\n    assert x\n    if x > 1:\n        raise ValueError('x')\n    try:\n        assert x < 9, 'big'\n    except KeyError:\n        raise\n",
        )
        .unwrap();
        let check = find_function(&tree, "check").unwrap();
        assert_eq!(find_asserts(check).len(), 2);
        assert_eq!(find_raises(check).len(), 2);
    }
}
