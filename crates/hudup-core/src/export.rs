//! Bookkeeping for objects exported to a remote registry.
//!
//! An exportable object owns one [`ExportSlot`]. The slot guarantees at most
//! one stub per object: exporting while exported returns the existing stub,
//! and unexporting while unexported does nothing.

use std::fmt;
use std::future::Future;
use std::sync::Weak;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::TRACING_TARGET_EXPORT;
use crate::error::Result;

/// Stable reference to an exported object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stub {
    /// Identity of the exported object within its registry.
    pub object_id: Uuid,
    /// Registry holding the object.
    pub registry_id: Uuid,
    /// Port the object was exported at.
    pub port: u16,
}

/// The side of a registry able to release a stub.
#[async_trait]
pub trait Unexporter: Send + Sync {
    /// Releases the stub, returning false if it was not registered.
    async fn unexport(&self, stub: &Stub) -> Result<bool>;
}

struct Exported {
    stub: Stub,
    registry: Weak<dyn Unexporter>,
}

/// Holds the stub of an exported object.
#[derive(Default)]
pub struct ExportSlot {
    exported: Mutex<Option<Exported>>,
}

impl ExportSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exports through `register` unless a stub already exists.
    ///
    /// The slot stays locked while registering, so concurrent callers still
    /// end up with a single stub.
    pub async fn export_with<F, Fut>(&self, register: F) -> Result<Stub>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<(Stub, Weak<dyn Unexporter>)>> + Send,
    {
        let mut exported = self.exported.lock().await;
        if let Some(current) = exported.as_ref() {
            return Ok(current.stub);
        }

        let (stub, registry) = register().await?;
        tracing::debug!(
            target: TRACING_TARGET_EXPORT,
            object_id = %stub.object_id,
            port = stub.port,
            "object exported"
        );

        *exported = Some(Exported { stub, registry });
        Ok(stub)
    }

    /// Releases the stub if there is one.
    ///
    /// The slot is emptied before the registry is contacted, and a registry
    /// that no longer exists counts as released.
    pub async fn unexport(&self) -> Result<()> {
        let Some(exported) = self.exported.lock().await.take() else {
            return Ok(());
        };

        let Some(registry) = exported.registry.upgrade() else {
            return Ok(());
        };

        let released = registry.unexport(&exported.stub).await?;
        tracing::debug!(
            target: TRACING_TARGET_EXPORT,
            object_id = %exported.stub.object_id,
            released = released,
            "object unexported"
        );
        Ok(())
    }

    /// The current stub, if exported.
    pub async fn stub(&self) -> Option<Stub> {
        self.exported.lock().await.as_ref().map(|e| e.stub)
    }

    pub async fn is_exported(&self) -> bool {
        self.exported.lock().await.is_some()
    }
}

impl fmt::Debug for ExportSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stub = self
            .exported
            .try_lock()
            .ok()
            .and_then(|exported| exported.as_ref().map(|e| e.stub));

        f.debug_struct("ExportSlot").field("stub", &stub).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct CountingRegistry {
        exports: AtomicUsize,
        unexports: AtomicUsize,
    }

    #[async_trait]
    impl Unexporter for CountingRegistry {
        async fn unexport(&self, _stub: &Stub) -> Result<bool> {
            self.unexports.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }
    }

    fn stub() -> Stub {
        Stub {
            object_id: Uuid::now_v7(),
            registry_id: Uuid::now_v7(),
            port: 10151,
        }
    }

    async fn export(slot: &ExportSlot, registry: &Arc<CountingRegistry>) -> Stub {
        let weak: Weak<dyn Unexporter> = Arc::downgrade(registry) as Weak<dyn Unexporter>;
        slot.export_with(|| async move {
            registry.exports.fetch_add(1, Ordering::SeqCst);
            Ok((stub(), weak))
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn export_twice_returns_same_stub() {
        let registry = Arc::new(CountingRegistry::default());
        let slot = ExportSlot::new();

        let first = export(&slot, &registry).await;
        let second = export(&slot, &registry).await;

        assert_eq!(first, second);
        assert_eq!(registry.exports.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unexport_is_idempotent() {
        let registry = Arc::new(CountingRegistry::default());
        let slot = ExportSlot::new();
        export(&slot, &registry).await;

        slot.unexport().await.unwrap();
        slot.unexport().await.unwrap();

        assert!(!slot.is_exported().await);
        assert_eq!(registry.unexports.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dropped_registry_counts_as_released() {
        let registry = Arc::new(CountingRegistry::default());
        let slot = ExportSlot::new();
        export(&slot, &registry).await;
        drop(registry);

        slot.unexport().await.unwrap();
        assert_eq!(slot.stub().await, None);
    }
}
