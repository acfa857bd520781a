#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for fetcher operations.
pub const TRACING_TARGET_FETCHER: &str = "hudup_core::fetcher";

/// Tracing target for export bookkeeping.
pub const TRACING_TARGET_EXPORT: &str = "hudup_core::export";

mod error;

pub mod config;
pub mod export;
pub mod fetcher;
pub mod text;
pub mod types;

#[doc(hidden)]
pub mod prelude;

pub use config::DataConfig;
pub use error::{BoxedError, Error, ErrorKind, Result};
pub use types::{INVALID_ID, Id};
