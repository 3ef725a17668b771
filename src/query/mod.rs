//! Query engine: filter, sort, paginate and project documents.
//!
//! - [`Query`] / [`Condition`]: what to match, built in code or parsed from JSON
//! - [`Matcher`]: evaluates a query against one document
//! - [`SortSpec`], [`Projection`]: ordering and field selection
//! - [`Find`]: the builder that runs all of the above over a collection

mod condition;
mod find;
mod matcher;
mod projection;
mod sort;

pub use condition::{Bound, Clause, Condition, Predicate, Query, Range};
pub use find::Find;
pub use matcher::{matches, Matcher, RangeSemantics};
pub use projection::Projection;
pub use sort::{collate, compare_field, Direction, SortSpec};
