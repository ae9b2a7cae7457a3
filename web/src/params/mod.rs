//! This module holds typed parameters for various endpoint inputs.
//!
//! Each parameter type is deserialized straight from the request body, so malformed
//! JSON is rejected by axum before any controller logic runs.

pub(crate) mod file;
