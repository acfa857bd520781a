use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use hudup_core::Result;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};
use uuid::Uuid;

use crate::TRACING_TARGET_POOLS;

/// Something using a pool, such as an evaluator.
#[async_trait]
pub trait PoolClient: Send + Sync + 'static {
    /// Human readable name, for listings.
    fn name(&self) -> String;

    /// Drops everything the client holds from the pool.
    ///
    /// Called without the service lock held.
    async fn release_pool(&self) -> Result<()>;

    /// Reloads the pool after it changed on the service side.
    async fn reload_pool(&self) -> Result<()>;
}

/// Where a tracked client stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display)]
#[derive(Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ClientStatus {
    /// Using the pool.
    Attached,
    /// Released through [`ClientWrapper::close`].
    Closed,
    /// The client itself no longer exists.
    Gone,
}

/// A client tracked by a pool.
///
/// Holds the client weakly: tracking never keeps a client alive. Clones
/// share the closed state.
#[derive(Clone)]
pub struct ClientWrapper {
    id: Uuid,
    name: String,
    client: Weak<dyn PoolClient>,
    closed: Arc<AtomicBool>,
}

impl ClientWrapper {
    pub fn new(client: &Arc<dyn PoolClient>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: client.name(),
            client: Arc::downgrade(client),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn client(&self) -> Option<Arc<dyn PoolClient>> {
        self.client.upgrade()
    }

    /// Returns true if this wrapper tracks `client`.
    pub fn tracks(&self, client: &Arc<dyn PoolClient>) -> bool {
        std::ptr::addr_eq(self.client.as_ptr(), Arc::as_ptr(client))
    }

    pub fn status(&self) -> ClientStatus {
        if self.closed.load(Ordering::SeqCst) {
            ClientStatus::Closed
        } else if self.client.strong_count() == 0 {
            ClientStatus::Gone
        } else {
            ClientStatus::Attached
        }
    }

    /// Asks the client to release the pool. Only the first call reaches
    /// the client; returns whether this call did.
    pub async fn close(&self) -> Result<bool> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }

        let Some(client) = self.client() else {
            return Ok(false);
        };

        tracing::debug!(
            target: TRACING_TARGET_POOLS,
            client_id = %self.id,
            client = %self.name,
            "releasing pool client"
        );
        client.release_pool().await?;
        Ok(true)
    }

    /// Asks the client to reload the pool and marks it attached again.
    pub async fn reset(&self) -> Result<()> {
        if let Some(client) = self.client() {
            client.reload_pool().await?;
        }

        self.closed.store(false, Ordering::SeqCst);
        Ok(())
    }
}

impl fmt::Debug for ClientWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientWrapper")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("status", &self.status())
            .finish()
    }
}
