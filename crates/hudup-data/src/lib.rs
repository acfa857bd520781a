#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for dataset lifecycle events.
pub const TRACING_TARGET_DATASET: &str = "hudup_data::dataset";

/// Tracing target for providers and drivers.
pub const TRACING_TARGET_PROVIDER: &str = "hudup_data::provider";

/// Tracing target for snapshots.
pub const TRACING_TARGET_SNAPSHOT: &str = "hudup_data::snapshot";

/// Tracing target for scanners.
pub const TRACING_TARGET_SCANNER: &str = "hudup_data::scanner";

/// Tracing target for pointers.
pub const TRACING_TARGET_POINTER: &str = "hudup_data::pointer";

/// Tracing target for dataset pairs and pools.
pub const TRACING_TARGET_POOL: &str = "hudup_data::pool";

pub mod dataset;
pub mod loader;
pub mod pair;
pub mod pointer;
pub mod pool;
pub mod provider;
pub mod scanner;
pub mod snapshot;

#[doc(hidden)]
pub mod prelude;

pub use dataset::{Dataset, DatasetKind, DatasetLease, SharedDataset};
pub use loader::{DatasetLoader, DriverRegistry};
pub use pair::{DatasetPair, PairSlot};
pub use pool::DatasetPool;
