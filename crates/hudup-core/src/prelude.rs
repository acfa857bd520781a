//! Convenient re-exports for common use.

pub use crate::config::DataConfig;
pub use crate::error::{BoxedError, Error, ErrorKind, Result};
pub use crate::export::{ExportSlot, Stub};
pub use crate::fetcher::{BoxFetcher, Fetcher, FetcherMetadata, MemFetcher, MetaFetcher};
pub use crate::text::TextParsable;
pub use crate::types::{
    AttributeList, Context, ContextList, ContextTemplateSchema, ExternalRecord, INVALID_ID, Id,
    MemProfiles, Profile, Rating, RatingMatrix, RatingVector,
};
