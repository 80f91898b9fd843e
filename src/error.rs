// 🚨 Error types - schema composition, project workflow, persistence
//
// Validation failures are NOT errors: they come back as data
// (see `schema::ValidationReport`). The enums below cover programming
// defects in a form graph, illegal workflow commands, and store faults.

use thiserror::Error;

// ============================================================================
// SCHEMA COMPOSITION
// ============================================================================

/// Raised while building a form graph. A graph that builds is well-formed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("refinement '{message}' references unknown field '{path}'")]
    UnknownRefinementPath { path: String, message: String },

    #[error("step '{step}' claims field '{field}' that its schema does not declare")]
    UndeclaredStepField { step: String, field: String },

    #[error("field '{field}' is claimed by both '{first}' and '{second}'")]
    DuplicateStepField {
        field: String,
        first: String,
        second: String,
    },

    #[error("step '{0}' is registered twice")]
    DuplicateStep(String),

    #[error("form '{0}' has no steps")]
    EmptyGraph(String),

    #[error("pattern '{pattern}' does not compile")]
    InvalidPattern { pattern: String },
}

// ============================================================================
// PROJECT WORKFLOW
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("project {project_id} is {status} and can no longer change")]
    ProjectFrozen { project_id: i64, status: String },

    #[error("property {property_id} is already attached to project {project_id}")]
    AlreadyAttached { project_id: i64, property_id: i64 },

    #[error("property {property_id} is not attached to project {project_id}")]
    NotAttached { project_id: i64, property_id: i64 },

    #[error("financial record #{index} not found on property {property_id}")]
    RecordNotFound { property_id: i64, index: usize },

    #[error("invalid financial record: {0}")]
    InvalidRecord(String),

    #[error("invalid status transition: from={from} to={to}")]
    InvalidTransition { from: String, to: String },
}

// ============================================================================
// PERSISTENCE COLLABORATOR
// ============================================================================

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("record not found: {entity} with id={id}")]
    NotFound { entity: String, id: String },

    /// A property claims membership in a project that does not exist.
    #[error("property {property_id} references missing project {project_id}")]
    DanglingProjectReference { property_id: i64, project_id: i64 },

    #[error("corrupt column {column}: {message}")]
    CorruptColumn { column: String, message: String },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_messages_name_the_field() {
        let err = SchemaError::UnknownRefinementPath {
            path: "addressTo".to_string(),
            message: "Email address and addressTo are required".to_string(),
        };
        assert!(err.to_string().contains("addressTo"));
    }

    #[test]
    fn test_store_error_wraps_workflow_error() {
        let err: StoreError = WorkflowError::NotAttached {
            project_id: 1,
            property_id: 7,
        }
        .into();
        assert!(matches!(err, StoreError::Workflow(_)));
        assert_eq!(err.to_string(), "property 7 is not attached to project 1");
    }
}
