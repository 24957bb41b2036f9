use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("invalid action type `{0}`, expected `<object id>/<method>`")]
    InvalidActionType(String),

    #[error("duplicate action id `{0}`")]
    DuplicateActionId(String),

    #[error("unknown object type `{0}`")]
    UnknownObjectType(String),

    #[error("cycle in the base types of `{0}`")]
    BaseChainCycle(String),
}
