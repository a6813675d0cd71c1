pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod search;
pub mod test_utils;

pub use error::{Result, SearchError};

/// Package version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
