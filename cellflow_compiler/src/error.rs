use cellflow_model::ModelError;
use cellflow_source::{RenderError, SourceError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error(transparent)]
    Source(#[from] SourceError),

    /// The compiler built a tree it cannot print. Never caused by input.
    #[error("internal error while rendering the program: {0}")]
    Render(#[from] RenderError),

    #[error(transparent)]
    Model(ModelError),

    // ---- action graph ----
    #[error("'start' action not found")]
    StartActionNotFound,

    #[error("'end' action not found")]
    EndActionNotFound,

    #[error("more than one 'start' action: {}", .0.join(", "))]
    MultipleStartActions(Vec<String>),

    #[error("more than one 'end' action: {}", .0.join(", "))]
    MultipleEndActions(Vec<String>),

    #[error("unknown action `{0}`")]
    UnknownAction(String),

    #[error("broken action chain: {0}")]
    BrokenChain(String),

    #[error("invalid action type `{0}`, expected `<object id>/<method>`")]
    InvalidActionType(String),

    #[error("action id `{0}` is not usable as a resource attribute")]
    InvalidActionId(String),

    #[error("action `{action}` refers to unknown object `{object}`")]
    UnknownObject { action: String, object: String },

    #[error("unknown object type `{0}`")]
    UnknownObjectType(String),

    #[error("object type `{object_type}` has no action `{method}`")]
    UnknownObjectAction { object_type: String, method: String },

    #[error("parameters of action `{action}` do not match: {reason}")]
    ParameterMismatch { action: String, reason: String },

    #[error("duplicate object id `{0}` in scene")]
    DuplicateObjectId(String),

    #[error("objects `{first}` and `{second}` both map to variable `{name}`")]
    AmbiguousObjectName {
        name: String,
        first: String,
        second: String,
    },

    #[error("resource parameter `{0}` is not a valid identifier")]
    InvalidParameterName(String),

    // ---- script recovery ----
    #[error("unexpected content in the main loop: {0}")]
    UnexpectedContent(String),

    #[error("action `{0}` is called more than once")]
    DuplicateAction(String),

    #[error("action type `{action_type}` does not match the program, which calls `{found}`")]
    ActionTypeMismatch { action_type: String, found: String },

    // ---- object type inspection ----
    #[error("no class definition found")]
    NoClassDefinition,

    #[error("more than one class definition found")]
    MultipleClassDefinitions,

    #[error("class `{0}` has more than one base; only one base class is supported")]
    MultipleBases(String),

    #[error("`__DESCRIPTION__` of class `{0}` must be a string")]
    InvalidDescription(String),

    #[error("unknown `__action__` flag `{flag}` on method `{method}`")]
    UnknownMetadataFlag { method: String, flag: String },

    #[error("`__action__` flag `{flag}` of method `{method}` must be True or False")]
    InvalidMetadataValue { method: String, flag: String },

    #[error("`__action__` of method `{0}` must be an `ActionMetadata(...)` call with keyword flags")]
    InvalidMetadata(String),

    #[error("method `{0}` has an `@action` decorator but no metadata")]
    MissingMetadata(String),

    #[error("method `{0}` has metadata but no `@action` decorator")]
    MissingActionDecorator(String),

    #[error("argument `{arg}` of method `{method}` is not annotated")]
    UnannotatedArgument { method: String, arg: String },

    #[error("argument `{arg}` of method `{method}` is variadic; actions take named arguments only")]
    UnsupportedArgument { method: String, arg: String },

    #[error("invalid type reference `{0}`, expected `<module>/<Class>`")]
    InvalidTypeReference(String),
}

impl From<ModelError> for CompileError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::InvalidActionType(t) => Self::InvalidActionType(t),
            ModelError::UnknownObjectType(t) => Self::UnknownObjectType(t),
            other => Self::Model(other),
        }
    }
}

impl CompileError {
    /// Errors that point at a bug in the compiler rather than at its input.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Render(_))
    }

    /// Stable snake_case name for reporting upstream.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Source(SourceError::Parse { .. }) => "parse",
            Self::Source(_) => "source_structure",
            Self::Render(_) => "render",
            Self::Model(ModelError::DuplicateActionId(_)) => "duplicate_action_id",
            Self::Model(ModelError::BaseChainCycle(_)) => "base_chain_cycle",
            Self::Model(_) => "model",
            Self::StartActionNotFound => "start_action_not_found",
            Self::EndActionNotFound => "end_action_not_found",
            Self::MultipleStartActions(_) => "multiple_start_actions",
            Self::MultipleEndActions(_) => "multiple_end_actions",
            Self::UnknownAction(_) => "unknown_action",
            Self::BrokenChain(_) => "broken_chain",
            Self::InvalidActionType(_) => "invalid_action_type",
            Self::InvalidActionId(_) => "invalid_action_id",
            Self::UnknownObject { .. } => "unknown_object",
            Self::UnknownObjectType(_) => "unknown_object_type",
            Self::UnknownObjectAction { .. } => "unknown_object_action",
            Self::ParameterMismatch { .. } => "parameter_mismatch",
            Self::DuplicateObjectId(_) => "duplicate_object_id",
            Self::AmbiguousObjectName { .. } => "ambiguous_object_name",
            Self::InvalidParameterName(_) => "invalid_parameter_name",
            Self::UnexpectedContent(_) => "unexpected_content",
            Self::DuplicateAction(_) => "duplicate_action",
            Self::ActionTypeMismatch { .. } => "action_type_mismatch",
            Self::NoClassDefinition => "no_class_definition",
            Self::MultipleClassDefinitions => "multiple_class_definitions",
            Self::MultipleBases(_) => "multiple_bases",
            Self::InvalidDescription(_) => "invalid_description",
            Self::UnknownMetadataFlag { .. } => "unknown_metadata_flag",
            Self::InvalidMetadataValue { .. } => "invalid_metadata_value",
            Self::InvalidMetadata(_) => "invalid_metadata",
            Self::MissingMetadata(_) => "missing_metadata",
            Self::MissingActionDecorator(_) => "missing_action_decorator",
            Self::UnannotatedArgument { .. } => "unannotated_argument",
            Self::UnsupportedArgument { .. } => "unsupported_argument",
            Self::InvalidTypeReference(_) => "invalid_type_reference",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_errors_map_onto_graph_kinds() {
        let err = CompileError::from(ModelError::InvalidActionType("robot".into()));
        assert_eq!(err, CompileError::InvalidActionType("robot".into()));
        assert_eq!(err.kind(), "invalid_action_type");

        let err = CompileError::from(ModelError::DuplicateActionId("a".into()));
        assert_eq!(err.kind(), "duplicate_action_id");
        assert!(!err.is_internal());
    }

    #[test]
    fn only_render_errors_are_internal() {
        let err = CompileError::from(RenderError::EmptyBlock("def main()".into()));
        assert!(err.is_internal());
        assert_eq!(CompileError::EndActionNotFound.to_string(), "'end' action not found");
    }

    #[test]
    fn messages_share_one_style() {
        assert_eq!(
            CompileError::UnknownAction("move9".into()).to_string(),
            "unknown action `move9`"
        );
        assert_eq!(
            CompileError::UnannotatedArgument {
                method: "move_to".into(),
                arg: "speed".into(),
            }
            .to_string(),
            "argument `speed` of method `move_to` is not annotated"
        );
        for err in [
            CompileError::NoClassDefinition,
            CompileError::DuplicateAction("move1".into()),
            CompileError::MissingMetadata("home".into()),
            CompileError::UnexpectedContent("x = 1".into()),
        ] {
            let text = err.to_string();
            assert!(text.starts_with(|c: char| c.is_lowercase()), "{text}");
            assert!(!text.ends_with(['.', '!']), "{text}");
        }
    }
}
