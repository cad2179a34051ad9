//! Predicate evaluation for TrialDB.
//!
//! The query language is intentionally flat: an ordered conjunction of
//! per-attribute conditions, where each condition is equality or set
//! membership. Evaluation short-circuits in caller order. There is no
//! nesting, no disjunction, and no comparison operators — this is a run
//! filter, not a document query language.

pub mod error;
pub mod predicate;

pub use error::{QueryError, QueryResult};
pub use predicate::{attribute_of, matches, Condition, Predicate};
