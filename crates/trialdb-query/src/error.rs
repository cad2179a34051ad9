/// Errors from predicate construction.
///
/// A malformed predicate always fails the whole query call; it is never
/// silently ignored.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueryError {
    /// An operator object had more than one key.
    #[error("malformed condition for attribute {attribute}: operator objects take exactly one key")]
    MultiKeyCondition { attribute: String },

    /// The operator is not one the engine understands.
    #[error("unknown operator {operator} for attribute {attribute}")]
    UnknownOperator { attribute: String, operator: String },

    /// The predicate document had the wrong overall shape.
    #[error("malformed predicate: {0}")]
    Malformed(String),
}

/// Result alias for query operations.
pub type QueryResult<T> = Result<T, QueryError>;
