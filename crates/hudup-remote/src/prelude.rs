//! Convenient re-exports for common use.

pub use crate::config::{PoolsServiceConfig, RegistryConfig};
pub use crate::exchanged::{
    DatasetPairExchanged, DatasetPoolExchanged, PairManifest, PoolManifest, SlotManifest,
};
pub use crate::pools::{
    ClientStatus, ClientWrapper, DatasetPoolExchangedItem, DatasetPoolsService,
    DatasetPoolsServiceImpl, PoolClient, PoolsServiceStub,
};
pub use crate::protocol::{DatasetRequest, DatasetResponse, DatasetTransfer};
pub use crate::registry::{Registry, RemoteObject};
pub use crate::remote::{DatasetRemote, DatasetStub};
pub use crate::server::{DatasetServer, export_dataset};
pub use crate::wrapper::DatasetRemoteWrapper;
