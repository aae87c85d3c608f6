#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Security primitives shared by the schema compilers and the authorization chain.
//!
//! - [`SecurityContext`] - the authenticated user resolved for one request
//! - [`FindFilter`] - the accumulating record filter handed to the persistence engine
//! - [`FilterExpr`], [`Comparison`], [`CompareOp`] - the filter expression language
//! - [`filter_keys`] - well-known filter keys (record id, owner, layer ids)

pub mod context;
pub mod find_filter;

pub use context::{SecurityContext, SecurityContextBuilder};
pub use find_filter::{CompareOp, Comparison, FilterExpr, FindFilter, filter_keys};
