//! Tree to text. Output is normalized: four-space indentation, single-quoted
//! strings, the minimum parentheses precedence requires, and blank lines
//! around definitions.

use crate::ast::*;
use crate::error::RenderError;
use crate::lexer::is_identifier;

const INDENT: &str = "    ";

pub fn render(module: &Module) -> Result<String, RenderError> {
    let mut renderer = Renderer::default();
    renderer.block(&module.body, 0)?;
    Ok(renderer.out)
}

/// Render a single expression, as it would appear on the right of `=`.
pub fn render_expr(expr: &Expr) -> Result<String, RenderError> {
    bare(expr)
}

/// Python `repr` of a string: single quotes unless the text holds a single
/// quote and no double quote.
pub fn quote_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

fn docstring_literal(s: &str) -> String {
    format!(
        "\"\"\"{}\"\"\"",
        s.replace('\\', "\\\\").replace("\"\"\"", "\\\"\\\"\\\"")
    )
}

#[derive(Default)]
struct Renderer {
    out: String,
}

impl Renderer {
    fn line(&mut self, depth: usize, text: &str) {
        for _ in 0..depth {
            self.out.push_str(INDENT);
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn blank_lines(&mut self, count: usize) {
        for _ in 0..count {
            self.out.push('\n');
        }
    }

    fn block(&mut self, body: &[Stmt], depth: usize) -> Result<(), RenderError> {
        let spacing = if depth == 0 { 2 } else { 1 };
        for (i, stmt) in body.iter().enumerate() {
            if i > 0 && (stmt.is_definition() || body[i - 1].is_definition()) {
                self.blank_lines(spacing);
            }
            let docstring = i == 0 && depth > 0;
            self.stmt(stmt, depth, docstring)?;
        }
        Ok(())
    }

    fn suite(&mut self, header: String, body: &[Stmt], depth: usize) -> Result<(), RenderError> {
        if body.is_empty() {
            return Err(RenderError::EmptyBlock(header));
        }
        self.line(depth, &format!("{header}:"));
        self.block(body, depth + 1)
    }

    /// `else:` clause of loops and `try`, omitted when empty.
    fn orelse(&mut self, orelse: &[Stmt], depth: usize) -> Result<(), RenderError> {
        if orelse.is_empty() {
            return Ok(());
        }
        self.suite("else".to_string(), orelse, depth)
    }

    fn stmt(&mut self, stmt: &Stmt, depth: usize, docstring: bool) -> Result<(), RenderError> {
        match stmt {
            Stmt::Expr(Expr::Constant(Constant::Str(s))) if docstring && s.contains('\n') => {
                self.line(depth, &docstring_literal(s));
            }
            Stmt::Expr(e) => self.line(depth, &bare(e)?),
            Stmt::Assign { targets, value } => {
                if targets.is_empty() {
                    return Err(RenderError::Malformed("assignment without target".into()));
                }
                let mut text = String::new();
                for target in targets {
                    text.push_str(&bare(target)?);
                    text.push_str(" = ");
                }
                text.push_str(&bare(value)?);
                self.line(depth, &text);
            }
            Stmt::AnnAssign {
                target,
                annotation,
                value,
            } => {
                let mut text = format!("{}: {}", expr(target, PREC_TEST)?, expr(annotation, PREC_TEST)?);
                if let Some(value) = value {
                    text.push_str(" = ");
                    text.push_str(&bare(value)?);
                }
                self.line(depth, &text);
            }
            Stmt::AugAssign { target, op, value } => {
                let text = format!("{} {}= {}", bare(target)?, op.symbol(), bare(value)?);
                self.line(depth, &text);
            }
            Stmt::Return(value) => match value {
                Some(v) => self.line(depth, &format!("return {}", bare(v)?)),
                None => self.line(depth, "return"),
            },
            Stmt::Pass => self.line(depth, "pass"),
            Stmt::Break => self.line(depth, "break"),
            Stmt::Continue => self.line(depth, "continue"),
            Stmt::Raise { exc, cause } => {
                let text = match (exc, cause) {
                    (None, None) => "raise".to_string(),
                    (Some(e), None) => format!("raise {}", expr(e, PREC_TEST)?),
                    (Some(e), Some(c)) => {
                        format!("raise {} from {}", expr(e, PREC_TEST)?, expr(c, PREC_TEST)?)
                    }
                    (None, Some(_)) => {
                        return Err(RenderError::Malformed("raise with cause but no exception".into()));
                    }
                };
                self.line(depth, &text);
            }
            Stmt::Assert { test, msg } => {
                let mut text = format!("assert {}", expr(test, PREC_TEST)?);
                if let Some(msg) = msg {
                    text.push_str(", ");
                    text.push_str(&expr(msg, PREC_TEST)?);
                }
                self.line(depth, &text);
            }
            Stmt::Delete(targets) => {
                let text = format!("del {}", join(targets, |t| expr(t, PREC_BITOR))?);
                self.line(depth, &text);
            }
            Stmt::Global(names) => {
                for name in names {
                    identifier(name)?;
                }
                self.line(depth, &format!("global {}", names.join(", ")));
            }
            Stmt::Import(names) => {
                let text = format!("import {}", join(names, |a| alias(a, true))?);
                self.line(depth, &text);
            }
            Stmt::ImportFrom {
                module,
                names,
                level,
            } => {
                if names.is_empty() {
                    return Err(RenderError::Malformed(format!("import from `{module}` without names")));
                }
                if !module.is_empty() {
                    dotted(module)?;
                }
                let names = if names.len() == 1 && names[0].name == "*" {
                    "*".to_string()
                } else {
                    join(names, |a| alias(a, false))?
                };
                let text = format!("from {}{} import {}", ".".repeat(*level), module, names);
                self.line(depth, &text);
            }
            Stmt::FunctionDef(def) => {
                for decorator in &def.decorators {
                    self.line(depth, &format!("@{}", expr(decorator, PREC_TEST)?));
                }
                identifier(&def.name)?;
                let keyword = if def.is_async { "async def" } else { "def" };
                let mut header = format!("{keyword} {}({})", def.name, params(&def.params, true)?);
                if let Some(returns) = &def.returns {
                    header.push_str(" -> ");
                    header.push_str(&expr(returns, PREC_TEST)?);
                }
                self.suite(header, &def.body, depth)?;
            }
            Stmt::ClassDef(class) => {
                for decorator in &class.decorators {
                    self.line(depth, &format!("@{}", expr(decorator, PREC_TEST)?));
                }
                identifier(&class.name)?;
                let args = call_args(&class.bases, &class.keywords)?;
                let header = if args.is_empty() {
                    format!("class {}", class.name)
                } else {
                    format!("class {}({})", class.name, args)
                };
                match class.body.first() {
                    None => return Err(RenderError::EmptyBlock(header)),
                    Some(first) => {
                        self.line(depth, &format!("{header}:"));
                        // a class opening with a method gets a blank line
                        if first.is_definition() {
                            self.blank_lines(1);
                        }
                        self.block(&class.body, depth + 1)?;
                    }
                }
            }
            Stmt::If { .. } => self.if_chain(stmt, depth, "if")?,
            Stmt::While { test, body, orelse } => {
                self.suite(format!("while {}", expr(test, PREC_TEST)?), body, depth)?;
                self.orelse(orelse, depth)?;
            }
            Stmt::For {
                target,
                iter,
                body,
                orelse,
            } => {
                let header = format!("for {} in {}", bare(target)?, bare(iter)?);
                self.suite(header, body, depth)?;
                self.orelse(orelse, depth)?;
            }
            Stmt::With { items, body } => {
                let items = join(items, |item| {
                    let context = expr(&item.context, PREC_TEST)?;
                    Ok(match &item.target {
                        Some(target) => format!("{context} as {}", expr(target, PREC_BITOR)?),
                        None => context,
                    })
                })?;
                self.suite(format!("with {items}"), body, depth)?;
            }
            Stmt::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                if handlers.is_empty() && finalbody.is_empty() {
                    return Err(RenderError::Malformed("try without except or finally".into()));
                }
                self.suite("try".to_string(), body, depth)?;
                for handler in handlers {
                    let header = match (&handler.kind, &handler.name) {
                        (None, _) => "except".to_string(),
                        (Some(kind), None) => format!("except {}", expr(kind, PREC_TEST)?),
                        (Some(kind), Some(name)) => {
                            identifier(name)?;
                            format!("except {} as {}", expr(kind, PREC_TEST)?, name)
                        }
                    };
                    self.suite(header, &handler.body, depth)?;
                }
                self.orelse(orelse, depth)?;
                if !finalbody.is_empty() {
                    self.suite("finally".to_string(), finalbody, depth)?;
                }
            }
        }
        Ok(())
    }

    fn if_chain(&mut self, stmt: &Stmt, depth: usize, keyword: &str) -> Result<(), RenderError> {
        let Stmt::If { test, body, orelse } = stmt else {
            return Err(RenderError::Malformed("expected if statement".into()));
        };
        self.suite(format!("{keyword} {}", expr(test, PREC_TEST)?), body, depth)?;
        match orelse.as_slice() {
            [] => Ok(()),
            [nested @ Stmt::If { .. }] => self.if_chain(nested, depth, "elif"),
            _ => self.suite("else".to_string(), orelse, depth),
        }
    }
}

// Binding strength, loosest first.
const PREC_NAMED: u8 = 0;
const PREC_TEST: u8 = 1;
const PREC_IFEXP: u8 = 2;
const PREC_OR: u8 = 3;
const PREC_AND: u8 = 4;
const PREC_NOT: u8 = 5;
const PREC_CMP: u8 = 6;
const PREC_BITOR: u8 = 7;
const PREC_BITXOR: u8 = 8;
const PREC_BITAND: u8 = 9;
const PREC_SHIFT: u8 = 10;
const PREC_ARITH: u8 = 11;
const PREC_TERM: u8 = 12;
const PREC_UNARY: u8 = 13;
const PREC_POWER: u8 = 14;
const PREC_AWAIT: u8 = 15;
const PREC_PRIMARY: u8 = 16;
const PREC_ATOM: u8 = 17;

fn binop_precedence(op: BinOp) -> u8 {
    match op {
        BinOp::BitOr => PREC_BITOR,
        BinOp::BitXor => PREC_BITXOR,
        BinOp::BitAnd => PREC_BITAND,
        BinOp::LShift | BinOp::RShift => PREC_SHIFT,
        BinOp::Add | BinOp::Sub => PREC_ARITH,
        BinOp::Mult | BinOp::MatMult | BinOp::Div | BinOp::FloorDiv | BinOp::Mod => PREC_TERM,
        BinOp::Pow => PREC_POWER,
    }
}

fn precedence(e: &Expr) -> u8 {
    match e {
        // parenthesized by expr_unwrapped
        Expr::Tuple(_) => PREC_ATOM,
        Expr::NamedExpr { .. } => PREC_NAMED,
        Expr::Lambda { .. } => PREC_TEST,
        Expr::Await(_) => PREC_AWAIT,
        Expr::IfExp { .. } => PREC_IFEXP,
        Expr::BoolOp { op: BoolOp::Or, .. } => PREC_OR,
        Expr::BoolOp { op: BoolOp::And, .. } => PREC_AND,
        Expr::UnaryOp { op: UnaryOp::Not, .. } => PREC_NOT,
        Expr::UnaryOp { .. } => PREC_UNARY,
        Expr::Compare { .. } => PREC_CMP,
        Expr::BinOp { op, .. } => binop_precedence(*op),
        Expr::Starred(_) => PREC_BITOR,
        Expr::Call { .. } | Expr::Attribute { .. } | Expr::Subscript { .. } => PREC_PRIMARY,
        _ => PREC_ATOM,
    }
}

fn identifier(name: &str) -> Result<(), RenderError> {
    if is_identifier(name) {
        Ok(())
    } else {
        Err(RenderError::InvalidIdentifier(name.to_string()))
    }
}

fn dotted(name: &str) -> Result<(), RenderError> {
    name.split('.').try_for_each(identifier)
}

fn alias(a: &Alias, dotted_name: bool) -> Result<String, RenderError> {
    if dotted_name {
        dotted(&a.name)?;
    } else {
        identifier(&a.name)?;
    }
    match &a.asname {
        Some(asname) => {
            identifier(asname)?;
            Ok(format!("{} as {}", a.name, asname))
        }
        None => Ok(a.name.clone()),
    }
}

fn join<T>(
    items: &[T],
    mut f: impl FnMut(&T) -> Result<String, RenderError>,
) -> Result<String, RenderError> {
    let parts = items.iter().map(&mut f).collect::<Result<Vec<_>, _>>()?;
    Ok(parts.join(", "))
}

fn params(params: &[Param], annotated: bool) -> Result<String, RenderError> {
    let mut parts = Vec::with_capacity(params.len() + 1);
    let mut star_seen = false;
    for param in params {
        identifier(&param.name)?;
        let prefix = match param.kind {
            ParamKind::Positional => "",
            ParamKind::VarArgs => {
                star_seen = true;
                "*"
            }
            ParamKind::KeywordOnly => {
                if !star_seen {
                    parts.push("*".to_string());
                    star_seen = true;
                }
                ""
            }
            ParamKind::VarKeywords => "**",
        };
        let mut text = format!("{prefix}{}", param.name);
        let annotation = match (&param.annotation, annotated) {
            (Some(annotation), true) => Some(expr(annotation, PREC_TEST)?),
            _ => None,
        };
        if let Some(annotation) = &annotation {
            text.push_str(": ");
            text.push_str(annotation);
        }
        if let Some(default) = &param.default {
            text.push_str(if annotation.is_some() { " = " } else { "=" });
            text.push_str(&expr(default, PREC_TEST)?);
        }
        parts.push(text);
    }
    Ok(parts.join(", "))
}

fn call_args(args: &[Expr], keywords: &[Keyword]) -> Result<String, RenderError> {
    let mut parts = Vec::with_capacity(args.len() + keywords.len());
    for arg in args {
        parts.push(expr(arg, PREC_TEST)?);
    }
    for keyword in keywords {
        parts.push(match &keyword.arg {
            Some(name) => {
                identifier(name)?;
                format!("{name}={}", expr(&keyword.value, PREC_TEST)?)
            }
            None => format!("**{}", expr(&keyword.value, PREC_BITOR)?),
        });
    }
    Ok(parts.join(", "))
}

fn comprehension_clauses(generators: &[Comprehension]) -> Result<String, RenderError> {
    if generators.is_empty() {
        return Err(RenderError::Malformed("comprehension without `for`".into()));
    }
    let mut text = String::new();
    for generator in generators {
        text.push_str(&format!(
            " for {} in {}",
            bare(&generator.target)?,
            expr(&generator.iter, PREC_OR)?
        ));
        for condition in &generator.ifs {
            text.push_str(&format!(" if {}", expr(condition, PREC_OR)?));
        }
    }
    Ok(text)
}

fn constant(c: &Constant) -> String {
    match c {
        Constant::None => "None".to_string(),
        Constant::Bool(true) => "True".to_string(),
        Constant::Bool(false) => "False".to_string(),
        Constant::Int(text) | Constant::Float(text) | Constant::Verbatim(text) => text.clone(),
        Constant::Str(s) => quote_str(s),
        Constant::Ellipsis => "...".to_string(),
    }
}

/// Statement-level rendering: tuples go without parentheses.
fn bare(e: &Expr) -> Result<String, RenderError> {
    match e {
        Expr::Tuple(items) => tuple_items(items),
        _ => expr(e, PREC_TEST),
    }
}

fn tuple_items(items: &[Expr]) -> Result<String, RenderError> {
    match items {
        [] => Ok("()".to_string()),
        [single] => Ok(format!("{},", expr(single, PREC_TEST)?)),
        _ => join(items, |i| expr(i, PREC_TEST)),
    }
}

fn expr(e: &Expr, min: u8) -> Result<String, RenderError> {
    let text = expr_unwrapped(e)?;
    if precedence(e) < min {
        Ok(format!("({text})"))
    } else {
        Ok(text)
    }
}

fn expr_unwrapped(e: &Expr) -> Result<String, RenderError> {
    let text = match e {
        Expr::Name(name) => {
            identifier(name)?;
            name.clone()
        }
        Expr::Constant(c) => constant(c),
        Expr::Attribute { value, attr } => {
            identifier(attr)?;
            format!("{}.{}", expr(value, PREC_PRIMARY)?, attr)
        }
        Expr::Subscript { value, slice } => {
            let index = match slice.as_ref() {
                Expr::Tuple(items) if !items.is_empty() => {
                    join(items, |i| subscript_item(i))?
                }
                other => subscript_item(other)?,
            };
            format!("{}[{}]", expr(value, PREC_PRIMARY)?, index)
        }
        Expr::Slice { .. } => {
            return Err(RenderError::Malformed("slice outside of a subscript".into()));
        }
        Expr::Call {
            func,
            args,
            keywords,
        } => format!("{}({})", expr(func, PREC_PRIMARY)?, call_args(args, keywords)?),
        Expr::Starred(value) => format!("*{}", expr(value, PREC_BITOR)?),
        Expr::List(items) => format!("[{}]", join(items, |i| expr(i, PREC_TEST))?),
        Expr::Tuple(items) => match items.as_slice() {
            [] => "()".to_string(),
            _ => format!("({})", tuple_items(items)?),
        },
        Expr::Set(items) => {
            if items.is_empty() {
                "set()".to_string()
            } else {
                format!("{{{}}}", join(items, |i| expr(i, PREC_TEST))?)
            }
        }
        Expr::Dict(entries) => {
            let entries = join(entries, |(k, v)| {
                Ok(format!("{}: {}", expr(k, PREC_TEST)?, expr(v, PREC_TEST)?))
            })?;
            format!("{{{entries}}}")
        }
        Expr::Comprehension {
            kind,
            element,
            generators,
        } => {
            let inner = format!("{}{}", expr(element, PREC_TEST)?, comprehension_clauses(generators)?);
            match kind {
                ComprehensionKind::List => format!("[{inner}]"),
                ComprehensionKind::Set => format!("{{{inner}}}"),
                ComprehensionKind::Generator => format!("({inner})"),
            }
        }
        Expr::DictComprehension {
            key,
            value,
            generators,
        } => format!(
            "{{{}: {}{}}}",
            expr(key, PREC_TEST)?,
            expr(value, PREC_TEST)?,
            comprehension_clauses(generators)?
        ),
        Expr::UnaryOp { op, operand } => match op {
            UnaryOp::Not => format!("not {}", expr(operand, PREC_NOT)?),
            UnaryOp::Neg => format!("-{}", expr(operand, PREC_UNARY)?),
            UnaryOp::Pos => format!("+{}", expr(operand, PREC_UNARY)?),
            UnaryOp::Invert => format!("~{}", expr(operand, PREC_UNARY)?),
        },
        Expr::BinOp { left, op, right } => {
            let prec = binop_precedence(*op);
            let (left_min, right_min) = if *op == BinOp::Pow {
                (prec + 1, PREC_UNARY)
            } else {
                (prec, prec + 1)
            };
            format!(
                "{} {} {}",
                expr(left, left_min)?,
                op.symbol(),
                expr(right, right_min)?
            )
        }
        Expr::BoolOp { op, values } => {
            if values.len() < 2 {
                return Err(RenderError::Malformed("boolean operation with fewer than two operands".into()));
            }
            let (keyword, prec) = match op {
                BoolOp::And => (" and ", PREC_AND),
                BoolOp::Or => (" or ", PREC_OR),
            };
            let parts = values
                .iter()
                .map(|v| expr(v, prec + 1))
                .collect::<Result<Vec<_>, _>>()?;
            parts.join(keyword)
        }
        Expr::Compare {
            left,
            ops,
            comparators,
        } => {
            if ops.is_empty() || ops.len() != comparators.len() {
                return Err(RenderError::Malformed("comparison operator count mismatch".into()));
            }
            let mut text = expr(left, PREC_BITOR)?;
            for (op, comparator) in ops.iter().zip(comparators) {
                text.push_str(&format!(" {} {}", op.symbol(), expr(comparator, PREC_BITOR)?));
            }
            text
        }
        Expr::IfExp { test, body, orelse } => format!(
            "{} if {} else {}",
            expr(body, PREC_OR)?,
            expr(test, PREC_OR)?,
            expr(orelse, PREC_TEST)?
        ),
        Expr::Lambda { params: lambda_params, body } => {
            let params = params(lambda_params, false)?;
            if params.is_empty() {
                format!("lambda: {}", expr(body, PREC_TEST)?)
            } else {
                format!("lambda {}: {}", params, expr(body, PREC_TEST)?)
            }
        }
        Expr::Await(value) => format!("await {}", expr(value, PREC_PRIMARY)?),
        Expr::NamedExpr { target, value } => {
            identifier(target)?;
            format!("{} := {}", target, expr(value, PREC_TEST)?)
        }
    };
    Ok(text)
}

fn subscript_item(e: &Expr) -> Result<String, RenderError> {
    let Expr::Slice { lower, upper, step } = e else {
        return expr(e, PREC_TEST);
    };
    let part = |p: &Option<Box<Expr>>| -> Result<String, RenderError> {
        match p {
            Some(p) => expr(p, PREC_TEST),
            None => Ok(String::new()),
        }
    };
    let mut text = format!("{}:{}", part(lower)?, part(upper)?);
    if step.is_some() {
        text.push(':');
        text.push_str(&part(step)?);
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn roundtrip(src: &str) -> String {
        render(&parse(src).unwrap()).unwrap()
    }

    #[test]
    fn renders_normalized_program() {
        let src = "from arcor2.resources import ResourcesBase\nfrom object_types.robot import Robot\ndef main() -> None:\n    res = Resources()\n    robot: Robot = res.objects[\"robot\"]\n    while True:\n        robot.move_to(**res.move1)\nif __name__ == \"__main__\":\n    main()\n";
        let expected = "from arcor2.resources import ResourcesBase\nfrom object_types.robot import Robot\n\n\ndef main() -> None:\n    res = Resources()\n    robot: Robot = res.objects['robot']\n    while True:\n        robot.move_to(**res.move1)\n\n\nif __name__ == '__main__':\n    main()\n";
        assert_eq!(roundtrip(src), expected);
    }

    #[test]
    fn rendering_is_a_fixed_point() {
        let src = r#"
class Robot(Generic):
    """
    Abstract robot.
    """

    def __init__(self, *args, name: str = 'r', **kwargs) -> None:
        super(Robot, self).__init__(*args, **kwargs)

    @property
    def pose(self):
        return self._poses[-1] if self._poses else None

    def area(self, a, b=2, *, scale: float = 1.0):
        x, y = divmod(a, b)
        values = [v ** 2 for v in range(x) if v % 2 == 0 and not v in skip]
        return {'x': x, 'y': -y ** 2, 's': (a + b) * scale}
"#;
        let once = roundtrip(src);
        assert_eq!(roundtrip(&once), once);
        assert!(once.contains("    \"\"\"\n    Abstract robot.\n    \"\"\"\n"));
        assert!(once.contains("\n\n    @property\n"));
        assert!(once.contains("def area(self, a, b=2, *, scale: float = 1.0):"));
        assert!(once.contains("(a + b) * scale"));
        assert!(once.contains("'y': -y ** 2"));
    }

    #[test]
    fn quotes_strings_like_repr() {
        assert_eq!(quote_str("plain"), "'plain'");
        assert_eq!(quote_str("it's"), "\"it's\"");
        assert_eq!(quote_str("both ' and \""), "'both \\' and \"'");
        assert_eq!(quote_str("line\nbreak\\"), "'line\\nbreak\\\\'");
    }

    #[test]
    fn adds_parentheses_only_where_needed() {
        let sub = Expr::BinOp {
            left: Box::new(Expr::name("a")),
            op: BinOp::Sub,
            right: Box::new(Expr::BinOp {
                left: Box::new(Expr::name("b")),
                op: BinOp::Sub,
                right: Box::new(Expr::name("c")),
            }),
        };
        assert_eq!(render_expr(&sub).unwrap(), "a - (b - c)");

        let call_on_tuple = Expr::call(
            Expr::name("f"),
            vec![Expr::Tuple(vec![Expr::name("x"), Expr::name("y")])],
            Vec::new(),
        );
        assert_eq!(render_expr(&call_on_tuple).unwrap(), "f((x, y))");
        let nested = Expr::List(vec![
            Expr::Tuple(vec![Expr::name("a")]),
            Expr::Tuple(Vec::new()),
        ]);
        assert_eq!(render_expr(&nested).unwrap(), "[(a,), ()]");
        assert_eq!(roundtrip("d = {'k': (1, 2)}\n"), "d = {'k': (1, 2)}\n");
        assert_eq!(roundtrip("x = 1,\n"), "x = 1,\n");
        assert_eq!(roundtrip("y = (-2) ** 2\n"), "y = (-2) ** 2\n");
    }

    #[test]
    fn renders_async_and_assignment_expressions() {
        let src = "async def grab(cam):\n    frame = await cam.read()\n    if n := len(frame):\n        return -await cam.count() ** 2\n    while (chunk := cam.next()) is not None:\n        print(chunk)\n";
        let once = roundtrip(src);
        assert_eq!(
            once,
            "async def grab(cam):\n    frame = await cam.read()\n    if (n := len(frame)):\n        return -await cam.count() ** 2\n    while (chunk := cam.next()) is not None:\n        print(chunk)\n"
        );
        assert_eq!(roundtrip(&once), once);
    }

    #[test]
    fn collapses_elif_chains() {
        let src = "if a:\n    pass\nelse:\n    if b:\n        pass\n    else:\n        x = 1\n";
        assert_eq!(
            roundtrip(src),
            "if a:\n    pass\nelif b:\n    pass\nelse:\n    x = 1\n"
        );
    }

    #[test]
    fn rejects_unrenderable_trees() {
        let empty = Module::new(vec![Stmt::FunctionDef(FunctionDef::new("main", Vec::new(), Vec::new()))]);
        assert_eq!(render(&empty), Err(RenderError::EmptyBlock("def main()".into())));

        let bad_name = Module::new(vec![Stmt::Expr(Expr::name("my robot"))]);
        assert_eq!(
            render(&bad_name),
            Err(RenderError::InvalidIdentifier("my robot".into()))
        );
    }
}
