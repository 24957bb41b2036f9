//! Parsing, editing and rendering of the Python subset that object types and
//! generated programs are written in.

pub mod ast;
pub mod edit;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod render;

pub use ast::*;
pub use edit::*;
pub use error::*;
pub use parser::parse;
pub use render::{quote_str, render, render_expr};
