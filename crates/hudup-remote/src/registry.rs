//! The export table remote objects are invoked through.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use hudup_core::export::{Stub, Unexporter};
use hudup_core::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::TRACING_TARGET_REGISTRY;
use crate::config::RegistryConfig;

/// An object a registry can dispatch calls to.
///
/// Calls arrive and leave as JSON frames.
#[async_trait]
pub trait RemoteObject: Send + Sync + 'static {
    async fn invoke(&self, frame: Value) -> Result<Value>;

    fn as_any(&self) -> &dyn Any;
}

struct Entry {
    port: u16,
    object: Arc<dyn RemoteObject>,
}

/// Table of exported objects.
///
/// A registry is created explicitly, passed to whoever exports or calls,
/// and torn down with [`Registry::shutdown`]. Every call is serialized into
/// a JSON frame and served on its own task, so nothing crosses the registry
/// that could not cross a process boundary.
pub struct Registry {
    id: Uuid,
    config: RegistryConfig,
    objects: RwLock<HashMap<Uuid, Entry>>,
    shut_down: AtomicBool,
    this: Weak<Registry>,
}

impl Registry {
    pub fn new(config: RegistryConfig) -> Arc<Self> {
        let registry = Arc::new_cyclic(|this| Self {
            id: Uuid::new_v4(),
            config,
            objects: RwLock::default(),
            shut_down: AtomicBool::new(false),
            this: this.clone(),
        });

        tracing::info!(
            target: TRACING_TARGET_REGISTRY,
            registry_id = %registry.id,
            host = %registry.config.registry_host,
            port = registry.config.registry_port,
            "registry started"
        );
        registry
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Handle for releasing stubs from an [`ExportSlot`].
    ///
    /// [`ExportSlot`]: hudup_core::export::ExportSlot
    pub fn unexporter(&self) -> Weak<dyn Unexporter> {
        self.this.clone()
    }

    /// Exports an object at `port`, or at the default port when `port` is 0.
    pub async fn export(&self, object: Arc<dyn RemoteObject>, port: u16) -> Result<Stub> {
        if self.is_shut_down() {
            return Err(Error::transport().with_message("registry is shut down"));
        }

        let port = if port == 0 { self.config.registry_port } else { port };
        let stub = Stub {
            object_id: Uuid::new_v4(),
            registry_id: self.id,
            port,
        };
        self.objects
            .write()
            .await
            .insert(stub.object_id, Entry { port, object });

        tracing::debug!(
            target: TRACING_TARGET_REGISTRY,
            object_id = %stub.object_id,
            port,
            "object registered"
        );
        Ok(stub)
    }

    /// The local object behind a stub, if it was exported here and still is.
    pub async fn resolve(&self, stub: &Stub) -> Option<Arc<dyn RemoteObject>> {
        if stub.registry_id != self.id {
            return None;
        }

        let objects = self.objects.read().await;
        objects
            .get(&stub.object_id)
            .filter(|entry| entry.port == stub.port)
            .map(|entry| entry.object.clone())
    }

    pub async fn is_exported(&self, stub: &Stub) -> bool {
        self.resolve(stub).await.is_some()
    }

    /// Number of exported objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    /// Sends a frame to the object behind `stub`.
    ///
    /// Fails with [`ErrorKind::Transport`] when the registry is shut down,
    /// the stub is stale, or the serving task dies.
    ///
    /// [`ErrorKind::Transport`]: hudup_core::ErrorKind::Transport
    pub async fn invoke(&self, stub: &Stub, frame: Value) -> Result<Value> {
        if self.is_shut_down() {
            return Err(Error::transport().with_message("registry is shut down"));
        }

        let object = self.resolve(stub).await.ok_or_else(|| {
            Error::transport().with_message(format!("object {} is not exported", stub.object_id))
        })?;

        tokio::spawn(async move { object.invoke(frame).await })
            .await
            .map_err(|e| {
                Error::transport()
                    .with_message("remote call did not complete")
                    .with_source(e)
            })?
    }

    /// Typed [`Registry::invoke`].
    pub async fn call<Req, Resp>(&self, stub: &Stub, request: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let frame = serde_json::to_value(request)?;
        let reply = self.invoke(stub, frame).await?;
        serde_json::from_value(reply).map_err(|e| {
            Error::transport()
                .with_message("undecodable reply frame")
                .with_source(e)
        })
    }

    /// Unexports everything and refuses further exports and calls.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        let released = {
            let mut objects = self.objects.write().await;
            let released = objects.len();
            objects.clear();
            released
        };

        tracing::info!(
            target: TRACING_TARGET_REGISTRY,
            registry_id = %self.id,
            released,
            "registry shut down"
        );
    }
}

#[async_trait]
impl Unexporter for Registry {
    async fn unexport(&self, stub: &Stub) -> Result<bool> {
        if stub.registry_id != self.id {
            return Ok(false);
        }

        let removed = self.objects.write().await.remove(&stub.object_id).is_some();
        tracing::debug!(
            target: TRACING_TARGET_REGISTRY,
            object_id = %stub.object_id,
            removed,
            "object unregistered"
        );
        Ok(removed)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use hudup_core::ErrorKind;
    use hudup_core::export::ExportSlot;

    use super::*;

    struct Echo;

    #[async_trait]
    impl RemoteObject for Echo {
        async fn invoke(&self, frame: Value) -> Result<Value> {
            Ok(frame)
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    async fn register(registry: &Arc<Registry>) -> Result<(Stub, Weak<dyn Unexporter>)> {
        let stub = registry.export(Arc::new(Echo), 0).await?;
        Ok((stub, registry.unexporter()))
    }

    #[tokio::test]
    async fn call_round_trips_through_frames() {
        let registry = Registry::new(RegistryConfig::default());
        let stub = registry.export(Arc::new(Echo), 0).await.unwrap();

        assert_eq!(stub.port, registry.config().registry_port);
        let reply: Vec<i32> = registry.call(&stub, &vec![1, 2, 3]).await.unwrap();
        assert_eq!(reply, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn stale_stub_is_transport_error() {
        let registry = Registry::new(RegistryConfig::default());
        let stub = registry.export(Arc::new(Echo), 9000).await.unwrap();

        assert!(registry.unexport(&stub).await.unwrap());
        assert!(!registry.unexport(&stub).await.unwrap());

        let error = registry.invoke(&stub, Value::Null).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Transport);
    }

    #[tokio::test]
    async fn export_slot_yields_one_stub() {
        let registry = Registry::new(RegistryConfig::default());
        let slot = ExportSlot::new();

        let first = slot.export_with(|| register(&registry)).await.unwrap();
        let second = slot.export_with(|| register(&registry)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(registry.len().await, 1);

        slot.unexport().await.unwrap();
        slot.unexport().await.unwrap();
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn shutdown_releases_everything() {
        let registry = Registry::new(RegistryConfig::default());
        let stub = registry.export(Arc::new(Echo), 0).await.unwrap();

        registry.shutdown().await;
        registry.shutdown().await;

        assert!(!registry.is_exported(&stub).await);
        let error = registry.export(Arc::new(Echo), 0).await.unwrap_err();
        assert!(error.is_transport());
    }
}
