//! Query construction: predicates, query-by-example, derived query methods
//! and their compilation to SQL.

pub mod example;
pub mod method;
pub mod predicate;
pub(crate) mod sql;
mod value;

pub use example::Example;
pub use method::{DerivedQuery, QueryCache, QueryError, ResultShape};
pub use predicate::{CompareOp, Predicate};
pub use value::{QueryArg, Value};
