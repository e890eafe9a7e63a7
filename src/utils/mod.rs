//! Utility helpers.
//!
//! - [`load_resource`]: resolve a string reference (URL, file path, or
//!   literal text) to its text content.

mod resource;

pub use resource::{load_resource, ResourceError};
