//! Convenient re-exports for common use.

pub use crate::dataset::{Dataset, DatasetKind, DatasetLease, SharedDataset, catchup};
pub use crate::loader::{DatasetLoader, DriverRegistry};
pub use crate::pair::{DatasetPair, PairSlot};
pub use crate::pointer::{KBasePointer, NullPointer, ServerPointer};
pub use crate::pool::DatasetPool;
pub use crate::provider::{Provider, ProviderFactory};
pub use crate::scanner::{Scanner, SemiScanner};
pub use crate::snapshot::Snapshot;
