//! Declarative filter compilation.
//!
//! Translates client-supplied [`FilterExpression`] trees and
//! [`PaginationArgs`] into store predicates and query options, including
//! the combined find-and-count pipeline.

pub mod compiler;
pub mod error;
pub mod options;
pub mod pipeline;
pub mod types;

pub use compiler::{FilterCompiler, FilterSettings};
pub use error::FilterError;
pub use pipeline::parse_find_and_count;
pub use types::{
    CombinedFilter, ComparisonOperator, FilterExpression, FindOptions, LogicalOperator,
    PaginationArgs, SingleFilter, SortArg, SortOrder,
};
