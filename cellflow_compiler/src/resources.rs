use log::info;

use cellflow_source::lexer::is_identifier;
use cellflow_source::{render, ClassDef, Expr, FunctionDef, Module, Param, Stmt};

use crate::emit::RESOURCES_CLASS;
use crate::error::CompileError;

const RESOURCES_BASE_MODULE: &str = "arcor2.resources";
const RESOURCES_BASE: &str = "ResourcesBase";
const SELF: &str = "self";

fn self_param() -> Vec<Param> {
    vec![Param::positional(SELF)]
}

fn call(func: Expr, args: Vec<Expr>) -> Expr {
    Expr::call(func, args, Vec::new())
}

/// `self._<name>`
fn private_attr(name: &str) -> Expr {
    Expr::name_attr(SELF, &format!("_{name}"))
}

/// Source of the project-specific `Resources` class: one read-only property
/// per declared parameter, loaded once in `__init__`.
pub fn derived_resources_class(
    project_id: &str,
    parameters: &[String],
) -> Result<String, CompileError> {
    if let Some(bad) = parameters.iter().find(|p| !is_identifier(p)) {
        return Err(CompileError::InvalidParameterName(bad.clone()));
    }

    // super(Resources, self).__init__('<project id>')
    let mut init_body = vec![Stmt::Expr(call(
        Expr::attr(
            call(
                Expr::name("super"),
                vec![Expr::name(RESOURCES_CLASS), Expr::name(SELF)],
            ),
            "__init__",
        ),
        vec![Expr::str(project_id)],
    ))];
    for param in parameters {
        init_body.push(Stmt::Assign {
            targets: vec![private_attr(param)],
            value: call(Expr::name_attr(SELF, "parameters"), vec![Expr::str(param)]),
        });
    }

    let mut body = vec![Stmt::FunctionDef(FunctionDef::new(
        "__init__",
        self_param(),
        init_body,
    ))];
    for param in parameters {
        let mut property = FunctionDef::new(
            param,
            self_param(),
            vec![
                Stmt::Expr(call(
                    Expr::name_attr(RESOURCES_CLASS, "print_info"),
                    vec![Expr::str(param), private_attr(param)],
                )),
                Stmt::Return(Some(private_attr(param))),
            ],
        );
        property.decorators.push(Expr::name("property"));
        body.push(Stmt::FunctionDef(property));
    }

    let tree = Module::new(vec![
        Stmt::ImportFrom {
            module: RESOURCES_BASE_MODULE.to_string(),
            names: vec![cellflow_source::Alias::new(RESOURCES_BASE)],
            level: 0,
        },
        Stmt::ClassDef(ClassDef::new(
            RESOURCES_CLASS,
            vec![Expr::name(RESOURCES_BASE)],
            body,
        )),
    ]);

    let text = render(&tree)?;
    info!(
        "generated resources class for project {} ({} parameter(s))",
        project_id,
        parameters.len()
    );
    Ok(text)
}
