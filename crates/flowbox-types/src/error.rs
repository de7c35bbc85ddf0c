use thiserror::Error;

/// Structural problems found while building a workflow graph.
///
/// Any of these is fatal to loading: no partial graph is installed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("duplicate box id '{0}'")]
    DuplicateBoxId(String),

    #[error("box '{box_id}' declares input '{input}' more than once")]
    DuplicateInputName { box_id: String, input: String },

    #[error("connection {source_id} -> {target_id} references unknown box '{missing}'")]
    UnknownEndpoint {
        source_id: String,
        target_id: String,
        missing: String,
    },

    #[error("box '{target_id}' does not declare input '{input}' (connected from '{source_id}')")]
    UnknownInput {
        source_id: String,
        target_id: String,
        input: String,
    },

    #[error("input '{input}' of box '{target_id}' is bound more than once (by '{first}' and '{second}')")]
    DuplicateInputBinding {
        target_id: String,
        input: String,
        first: String,
        second: String,
    },

    #[error("cycle detected involving box '{0}'")]
    CycleDetected(String),
}

impl ValidationError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::DuplicateBoxId(_) => "DUPLICATE_BOX_ID",
            ValidationError::DuplicateInputName { .. } => "DUPLICATE_INPUT_NAME",
            ValidationError::UnknownEndpoint { .. } => "UNKNOWN_ENDPOINT",
            ValidationError::UnknownInput { .. } => "UNKNOWN_INPUT",
            ValidationError::DuplicateInputBinding { .. } => "DUPLICATE_INPUT_BINDING",
            ValidationError::CycleDetected(_) => "CYCLE_DETECTED",
        }
    }
}

/// Errors from graph lookups.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("box '{0}' not found")]
    UnknownBox(String),
}

/// Reasons a run request is rejected before it starts.
///
/// These never affect a run that is already in flight.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunError {
    #[error("a run is already in progress")]
    RunAlreadyInProgress,

    #[error("box '{0}' not found")]
    UnknownBox(String),

    #[error("no workflow loaded")]
    NoWorkflowLoaded,
}

impl RunError {
    pub fn code(&self) -> &'static str {
        match self {
            RunError::RunAlreadyInProgress => "RUN_IN_PROGRESS",
            RunError::UnknownBox(_) => "NOT_FOUND",
            RunError::NoWorkflowLoaded => "NO_WORKFLOW",
        }
    }
}

impl From<GraphError> for RunError {
    fn from(e: GraphError) -> Self {
        match e {
            GraphError::UnknownBox(id) => RunError::UnknownBox(id),
        }
    }
}
