#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for registry events.
pub const TRACING_TARGET_REGISTRY: &str = "hudup_remote::registry";

/// Tracing target for served datasets.
pub const TRACING_TARGET_SERVER: &str = "hudup_remote::server";

/// Tracing target for dataset proxies and remote wrappers.
pub const TRACING_TARGET_WRAPPER: &str = "hudup_remote::wrapper";

/// Tracing target for exchanged pools and the pools service.
pub const TRACING_TARGET_POOLS: &str = "hudup_remote::pools";

pub mod config;
pub mod exchanged;
pub mod pools;
pub mod protocol;
pub mod registry;
pub mod remote;
pub mod server;
pub mod wrapper;

#[doc(hidden)]
pub mod prelude;

pub use config::{PoolsServiceConfig, RegistryConfig};
pub use exchanged::{DatasetPairExchanged, DatasetPoolExchanged, PoolManifest};
pub use pools::{DatasetPoolsService, DatasetPoolsServiceImpl, PoolClient};
pub use registry::{Registry, RemoteObject};
pub use remote::{DatasetRemote, DatasetStub};
pub use server::{DatasetServer, export_dataset};
pub use wrapper::DatasetRemoteWrapper;
