//! Utility functions and helpers.

pub mod dates;
pub mod http;
pub mod log;
pub mod url;

pub use url::resolve_url;
