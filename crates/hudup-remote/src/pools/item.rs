use std::sync::Arc;

use super::client::{ClientWrapper, PoolClient};
use crate::TRACING_TARGET_POOLS;
use crate::exchanged::DatasetPoolExchanged;

/// A named pool and the clients using it.
///
/// Clients are tracked, not owned. Removing one releases only that client;
/// the pool stays until the item is closed.
#[derive(Debug)]
pub struct DatasetPoolExchangedItem {
    name: String,
    pool: DatasetPoolExchanged,
    clients: Vec<ClientWrapper>,
}

impl DatasetPoolExchangedItem {
    pub fn new(name: impl Into<String>, pool: DatasetPoolExchanged) -> Self {
        Self {
            name: name.into(),
            pool,
            clients: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pool(&self) -> &DatasetPoolExchanged {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut DatasetPoolExchanged {
        &mut self.pool
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn client(&self, index: usize) -> Option<&ClientWrapper> {
        self.clients.get(index)
    }

    pub fn clients(&self) -> impl Iterator<Item = &ClientWrapper> {
        self.clients.iter()
    }

    pub fn contains_client(&self, client: &Arc<dyn PoolClient>) -> bool {
        self.clients.iter().any(|wrapper| wrapper.tracks(client))
    }

    /// Starts tracking a client; false if it already is tracked.
    pub fn add_client(&mut self, client: &Arc<dyn PoolClient>) -> bool {
        if self.contains_client(client) {
            return false;
        }

        self.clients.push(ClientWrapper::new(client));
        true
    }

    /// Stops tracking a client without releasing it.
    pub fn remove_client(&mut self, client: &Arc<dyn PoolClient>) -> Option<ClientWrapper> {
        let index = self.clients.iter().position(|wrapper| wrapper.tracks(client))?;
        Some(self.clients.remove(index))
    }

    /// Withdraws every dataset of the pool and releases every client.
    pub async fn close(mut self) {
        if let Err(error) = self.pool.unexport(true).await {
            tracing::warn!(
                target: TRACING_TARGET_POOLS,
                pool = %self.name,
                error = %error,
                "pool not fully unexported"
            );
        }
        self.pool.clear(false).await;

        for client in self.clients.drain(..) {
            if let Err(error) = client.close().await {
                tracing::warn!(
                    target: TRACING_TARGET_POOLS,
                    pool = %self.name,
                    client = client.name(),
                    error = %error,
                    "cannot release pool client"
                );
            }
        }

        tracing::info!(target: TRACING_TARGET_POOLS, pool = %self.name, "pool closed");
    }
}
