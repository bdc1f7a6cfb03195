//! Triage backend client
//!
//! Wire contract of the access, conversation, history, finalization and
//! report endpoints, plus the error classification shared by all of them.

mod error;
mod http;
mod types;

pub use error::{ApiError, ApiErrorKind};
pub use http::HttpBackend;
pub use types::*;
