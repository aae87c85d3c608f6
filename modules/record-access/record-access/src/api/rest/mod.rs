//! HTTP adapter.
//!
//! Every mount contributes a collection path (list, create) and an item
//! path (get, update, delete). Bodies are `{"data": ...}` on success and
//! `{"error": "..."}` on failure; a missing record is `404 {"data": null}`.

pub mod error;
pub mod handlers;
pub mod routes;

pub use routes::router;
