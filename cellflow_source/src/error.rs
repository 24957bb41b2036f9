use thiserror::Error;

/// Structural errors: unparsable source or a tree that lacks what an
/// operation needs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("failed to parse the code (line {line}, column {column}): {message}")]
    Parse {
        line: u32,
        column: u32,
        message: String,
    },

    #[error("function `{0}` not found")]
    FunctionNotFound(String),

    #[error("class definition `{0}` not found")]
    ClassNotFound(String),

    #[error("class `{0}` not imported")]
    ClassNotImported(String),

    #[error("name `{name}` already used for instance of `{existing}`")]
    NameAlreadyBound { name: String, existing: String },

    #[error("main loop not found")]
    MainLoopNotFound,

    #[error("function `main` contains more than one loop")]
    MultipleMainLoops,
}

impl SourceError {
    pub(crate) fn parse(line: u32, column: u32, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            column,
            message: message.into(),
        }
    }
}

/// A tree that cannot be turned back into text. Always a bug in whatever
/// built the tree, never a user input problem.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("empty block in `{0}`")]
    EmptyBlock(String),

    #[error("`{0}` is not a valid identifier")]
    InvalidIdentifier(String),

    #[error("malformed node: {0}")]
    Malformed(String),
}
