//! Query filter compilers.
//!
//! Both grammars share one leaf derivation ([`fields::query_fields`]):
//! - [`SimpleQueryValidator`]: flat `field`/`field_<op>` keys plus control fields,
//! - [`AdvancedQueryValidator`]: `$and`/`$or` trees of operator objects.

pub mod advanced;
pub mod fields;
pub mod simple;

pub use advanced::AdvancedQueryValidator;
pub use fields::{QueryField, query_fields};
pub use simple::{ListQuery, QueryMode, SimpleQueryValidator, SortOrder};

/// Limits shared by the query grammars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// Maximum `$and`/`$or` nesting of an advanced query.
    pub max_query_depth: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            max_query_depth: 16,
        }
    }
}
