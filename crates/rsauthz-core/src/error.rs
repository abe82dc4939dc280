//! Error types for the enforcement engine.

use thiserror::Error;

/// Errors produced while loading models or evaluating requests.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The model definition is unusable: unparseable effect or matcher
    /// expression, unsupported effect strategy, or inconsistent section
    /// field counts. Fatal at model-load time.
    #[error("malformed model: {message}")]
    MalformedModel { message: String },

    /// The number of request values does not match the request section's
    /// declared field count. Aborts the single enforcement call.
    #[error("request arity mismatch: expected {expected} values, got {actual}")]
    RequestArityMismatch { expected: usize, actual: usize },

    /// A matcher or sub-expression failed to parse.
    #[error("expression syntax error in `{expression}`: {message}")]
    ExpressionSyntax { expression: String, message: String },

    /// Evaluation failed: unresolvable field reference, non-numeric value
    /// in a numeric context, or a cyclic `eval` reference. Surfaced
    /// per-request; model and role-graph state are unaffected.
    #[error("expression evaluation error: {message}")]
    ExpressionEvaluation { message: String },

    /// A field label was required but is absent from the section.
    #[error("field `{field}` not found in section `{section}`")]
    FieldNotFound { section: String, field: String },

    /// A policy-source collaborator failed to supply or persist rows.
    #[error("adapter error: {message}")]
    Adapter { message: String },
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
