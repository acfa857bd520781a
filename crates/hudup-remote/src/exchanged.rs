//! Pairs and pools whose datasets may live behind a registry.

use std::collections::HashSet;
use std::sync::Arc;

use hudup_core::Result;
use hudup_core::export::Stub;
use hudup_data::pair::{DatasetPair, PairSlot};
use hudup_data::pool::DatasetPool;
use hudup_data::SharedDataset;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::TRACING_TARGET_POOLS;
use crate::registry::Registry;
use crate::remote::DatasetRemote;
use crate::wrapper::DatasetRemoteWrapper;

/// The (training, testing, whole) UUIDs a pair is matched by when syncing.
/// The whole UUID only counts for pairs without training and testing.
pub type PairKey = (Option<Uuid>, Option<Uuid>, Option<Uuid>);

/// The exportable twin of [`DatasetPair`].
///
/// A slot can hold a UUID without a dataset: the other side of the split
/// has the dataset and the UUID names it.
#[derive(Debug, Clone, Default)]
pub struct DatasetPairExchanged {
    pub training: Option<DatasetRemote>,
    pub testing: Option<DatasetRemote>,
    pub whole: Option<DatasetRemote>,
    pub training_uuid: Option<Uuid>,
    pub testing_uuid: Option<Uuid>,
    pub whole_uuid: Option<Uuid>,
}

impl DatasetPairExchanged {
    pub fn from_pair(pair: &DatasetPair) -> Self {
        let local = |slot| pair.dataset(slot).cloned().map(DatasetRemote::Local);
        Self {
            training: local(PairSlot::Training),
            testing: local(PairSlot::Testing),
            whole: local(PairSlot::Whole),
            training_uuid: pair.training_uuid,
            testing_uuid: pair.testing_uuid,
            whole_uuid: pair.whole_uuid,
        }
    }

    pub fn remote(&self, slot: PairSlot) -> Option<&DatasetRemote> {
        match slot {
            PairSlot::Training => self.training.as_ref(),
            PairSlot::Testing => self.testing.as_ref(),
            PairSlot::Whole => self.whole.as_ref(),
        }
    }

    pub fn uuid(&self, slot: PairSlot) -> Option<Uuid> {
        match slot {
            PairSlot::Training => self.training_uuid,
            PairSlot::Testing => self.testing_uuid,
            PairSlot::Whole => self.whole_uuid,
        }
    }

    fn slot_mut(&mut self, slot: PairSlot) -> (&mut Option<DatasetRemote>, &mut Option<Uuid>) {
        match slot {
            PairSlot::Training => (&mut self.training, &mut self.training_uuid),
            PairSlot::Testing => (&mut self.testing, &mut self.testing_uuid),
            PairSlot::Whole => (&mut self.whole, &mut self.whole_uuid),
        }
    }

    pub fn key(&self) -> PairKey {
        match (self.training_uuid, self.testing_uuid) {
            (None, None) => (None, None, self.whole_uuid),
            (training, testing) => (training, testing, None),
        }
    }

    pub fn validate(&self) -> bool {
        self.training.is_some() && self.testing.is_some()
    }

    pub fn fill_missing_uuid(&mut self) {
        for slot in PairSlot::ALL {
            let (remote, uuid) = self.slot_mut(slot);
            if remote.is_some() && uuid.is_none() {
                *uuid = Some(Uuid::new_v4());
            }
        }
    }

    /// Releases every slot. Forced release withdraws the remote exports
    /// even when this side does not own them.
    ///
    /// Every slot is attempted; the first failure is returned.
    pub async fn unexport(&self, forced: bool) -> Result<()> {
        let mut first_error = None;
        for slot in PairSlot::ALL {
            let Some(remote) = self.remote(slot) else {
                continue;
            };

            if let Err(error) = unexport_slot(remote, forced).await {
                tracing::warn!(
                    target: TRACING_TARGET_POOLS,
                    slot = slot.as_ref(),
                    forced,
                    error = %error,
                    "cannot unexport dataset"
                );
                first_error.get_or_insert(error);
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Unexports and empties every slot, UUIDs included.
    pub async fn clear(&mut self, forced: bool) {
        let _ = self.unexport(forced).await;
        *self = Self::default();
    }
}

async fn unexport_slot(remote: &DatasetRemote, forced: bool) -> Result<()> {
    if let Some(wrapper) = remote.as_wrapper() {
        return if forced {
            wrapper.force_unexport().await
        } else {
            wrapper.unexport().await
        };
    }

    match remote {
        DatasetRemote::Local(dataset) => dataset.export_slot().unexport().await,
        DatasetRemote::Stub(stub) if forced => stub.unexport_remote().await,
        DatasetRemote::Stub(_) => Ok(()),
    }
}

/// The stub a client reaches a slot by: for a wrapper, that of the
/// dataset it wraps.
async fn slot_stub(remote: &DatasetRemote) -> Option<Stub> {
    match remote.as_wrapper() {
        Some(wrapper) => wrapper.remote().await?.stub().await,
        None => remote.stub().await,
    }
}

/// The exportable twin of [`DatasetPool`].
#[derive(Debug, Clone, Default)]
pub struct DatasetPoolExchanged {
    pairs: Vec<DatasetPairExchanged>,
}

impl DatasetPoolExchanged {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes over the datasets of a local pool, naming each with a UUID.
    pub fn from_pool(pool: &DatasetPool) -> Self {
        let mut exchanged: Self = pool.iter().map(DatasetPairExchanged::from_pair).collect();
        exchanged.fill_missing_uuid();
        exchanged
    }

    pub fn add(&mut self, pair: DatasetPairExchanged) {
        self.pairs.push(pair);
    }

    pub fn get(&self, index: usize) -> Option<&DatasetPairExchanged> {
        self.pairs.get(index)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DatasetPairExchanged> {
        self.pairs.iter()
    }

    pub fn fill_missing_uuid(&mut self) {
        self.pairs
            .iter_mut()
            .for_each(DatasetPairExchanged::fill_missing_uuid);
    }

    /// A copy of this pool with every dataset wrapped and served at `port`.
    ///
    /// Datasets already wrapped keep their wrapper; the others get a new
    /// one with the given exclusivity. UUIDs carry over. A dataset that
    /// cannot be exported is logged and left in the copy unexported.
    pub async fn export(&self, registry: &Arc<Registry>, port: u16, exclusive: bool) -> Self {
        let mut exported = Self::new();
        for pair in &self.pairs {
            let mut copy = DatasetPairExchanged {
                training_uuid: pair.training_uuid,
                testing_uuid: pair.testing_uuid,
                whole_uuid: pair.whole_uuid,
                ..DatasetPairExchanged::default()
            };

            for slot in PairSlot::ALL {
                let Some(remote) = pair.remote(slot) else {
                    continue;
                };

                let wrapped = match remote.as_wrapper() {
                    Some(_) => remote.clone(),
                    None => {
                        let wrapper: SharedDataset =
                            Arc::new(DatasetRemoteWrapper::new(remote.clone(), exclusive));
                        DatasetRemote::Local(wrapper)
                    }
                };

                if let Some(wrapper) = wrapped.as_wrapper()
                    && let Err(error) = wrapper.export_inside(registry, port).await
                {
                    tracing::warn!(
                        target: TRACING_TARGET_POOLS,
                        slot = slot.as_ref(),
                        port,
                        error = %error,
                        "cannot export dataset"
                    );
                }

                *copy.slot_mut(slot).0 = Some(wrapped);
            }

            exported.add(copy);
        }

        tracing::debug!(
            target: TRACING_TARGET_POOLS,
            pairs = exported.len(),
            port,
            exclusive,
            "pool exported"
        );
        exported
    }

    /// Releases every pair; see [`DatasetPairExchanged::unexport`].
    pub async fn unexport(&self, forced: bool) -> Result<()> {
        let mut first_error = None;
        for pair in &self.pairs {
            if let Err(error) = pair.unexport(forced).await {
                first_error.get_or_insert(error);
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    pub async fn clear(&mut self, forced: bool) {
        for pair in &mut self.pairs {
            pair.clear(forced).await;
        }
        self.pairs.clear();
    }

    /// The pair holding a dataset under `uuid` in `slot`.
    pub fn find_by_uuid(&self, slot: PairSlot, uuid: Uuid) -> Option<&DatasetPairExchanged> {
        self.pairs
            .iter()
            .find(|pair| pair.remote(slot).is_some() && pair.uuid(slot) == Some(uuid))
    }

    pub fn find_by_training_uuid(&self, uuid: Uuid) -> Option<&DatasetPairExchanged> {
        self.find_by_uuid(PairSlot::Training, uuid)
    }

    pub fn find_by_testing_uuid(&self, uuid: Uuid) -> Option<&DatasetPairExchanged> {
        self.find_by_uuid(PairSlot::Testing, uuid)
    }

    pub fn find_by_whole_uuid(&self, uuid: Uuid) -> Option<&DatasetPairExchanged> {
        self.find_by_uuid(PairSlot::Whole, uuid)
    }

    /// Rebuilds a local pool from the innermost datasets.
    ///
    /// A slot holding only a UUID is looked up in `referred`. Pairs where
    /// nothing resolves are dropped.
    pub async fn to_dataset_pool(&self, referred: Option<&DatasetPoolExchanged>) -> DatasetPool {
        let mut pool = DatasetPool::new();
        for pair in &self.pairs {
            let mut local = DatasetPair::default();
            for slot in PairSlot::ALL {
                let (dataset, uuid) = resolve_slot(pair, slot, referred).await;
                match slot {
                    PairSlot::Training => (local.training, local.training_uuid) = (dataset, uuid),
                    PairSlot::Testing => (local.testing, local.testing_uuid) = (dataset, uuid),
                    PairSlot::Whole => (local.whole, local.whole_uuid) = (dataset, uuid),
                }
            }

            if PairSlot::ALL.iter().any(|&slot| local.dataset(slot).is_some()) {
                pool.add(local);
            }
        }

        pool
    }

    /// A local pool over shared wrappers, for the client side.
    ///
    /// Datasets that are not wrapped yet get a non-exclusive wrapper, so
    /// clearing the client pool never clears what the server holds.
    pub fn to_dataset_pool_client(&self) -> DatasetPool {
        let mut pool = DatasetPool::new();
        for pair in &self.pairs {
            let mut local = DatasetPair::default();
            for slot in PairSlot::ALL {
                let dataset = pair.remote(slot).map(|remote| match remote.as_wrapper() {
                    Some(_) => remote.dataset(),
                    None => Arc::new(DatasetRemoteWrapper::new(remote.clone(), false)) as SharedDataset,
                });
                let uuid = dataset.as_ref().and(pair.uuid(slot));

                match slot {
                    PairSlot::Training => (local.training, local.training_uuid) = (dataset, uuid),
                    PairSlot::Testing => (local.testing, local.testing_uuid) = (dataset, uuid),
                    PairSlot::Whole => (local.whole, local.whole_uuid) = (dataset, uuid),
                }
            }

            if PairSlot::ALL.iter().any(|&slot| local.dataset(slot).is_some()) {
                pool.add(local);
            }
        }

        pool
    }

    /// Reconciles this pool with a client's view of it.
    ///
    /// Pairs whose key the client no longer has are force-unexported and
    /// removed. Then the client's pairs not present
    /// here are added, if they are complete.
    pub async fn sync_with_client_pool(&mut self, client: &DatasetPoolExchanged) {
        let client_keys: HashSet<PairKey> = client.pairs.iter().map(|pair| pair.key()).collect();

        let (kept, removed): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pairs)
            .into_iter()
            .partition(|pair| client_keys.contains(&pair.key()));
        self.pairs = kept;

        for pair in &removed {
            let _ = pair.unexport(true).await;
        }

        let mut keys: HashSet<PairKey> = self.pairs.iter().map(|pair| pair.key()).collect();
        let mut added = 0;
        for pair in &client.pairs {
            let complete = pair.validate() || (pair.whole.is_some() && pair.whole_uuid.is_some());
            if complete && keys.insert(pair.key()) {
                self.pairs.push(pair.clone());
                added += 1;
            }
        }

        tracing::debug!(
            target: TRACING_TARGET_POOLS,
            removed = removed.len(),
            added,
            "pool synced with client"
        );
    }

    /// Serializable form: the stub and UUID of every slot.
    pub async fn manifest(&self) -> PoolManifest {
        let mut manifest = PoolManifest::default();
        for pair in &self.pairs {
            let mut entry = PairManifest::default();
            for slot in PairSlot::ALL {
                let stub = match pair.remote(slot) {
                    Some(remote) => slot_stub(remote).await,
                    None => None,
                };
                *entry.slot_mut(slot) = SlotManifest {
                    stub,
                    uuid: pair.uuid(slot),
                };
            }
            manifest.pairs.push(entry);
        }

        manifest
    }

    /// Rebuilds a pool from a manifest, reaching its stubs through
    /// `registry`.
    pub fn bind(manifest: &PoolManifest, registry: &Arc<Registry>) -> Self {
        manifest
            .pairs
            .iter()
            .map(|entry| {
                let mut pair = DatasetPairExchanged::default();
                for slot in PairSlot::ALL {
                    let SlotManifest { stub, uuid } = *entry.slot(slot);
                    let (remote, slot_uuid) = pair.slot_mut(slot);
                    *remote = stub.map(|stub| DatasetRemote::connect(stub, registry.clone()));
                    *slot_uuid = uuid;
                }
                pair
            })
            .collect()
    }
}

async fn resolve_slot(
    pair: &DatasetPairExchanged,
    slot: PairSlot,
    referred: Option<&DatasetPoolExchanged>,
) -> (Option<SharedDataset>, Option<Uuid>) {
    let source = match pair.remote(slot) {
        Some(remote) => Some((remote, pair.uuid(slot))),
        None => pair
            .uuid(slot)
            .and_then(|uuid| referred?.find_by_uuid(slot, uuid))
            .and_then(|found| Some((found.remote(slot)?, found.uuid(slot)))),
    };

    let Some((remote, uuid)) = source else {
        return (None, None);
    };

    match remote.innermost().await {
        Some(dataset) => (Some(dataset), uuid),
        None => (None, None),
    }
}

impl FromIterator<DatasetPairExchanged> for DatasetPoolExchanged {
    fn from_iter<I: IntoIterator<Item = DatasetPairExchanged>>(iter: I) -> Self {
        Self {
            pairs: iter.into_iter().collect(),
        }
    }
}

/// Stub and UUID of one slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stub: Option<Stub>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairManifest {
    #[serde(default)]
    pub training: SlotManifest,
    #[serde(default)]
    pub testing: SlotManifest,
    #[serde(default)]
    pub whole: SlotManifest,
}

impl PairManifest {
    pub fn slot(&self, slot: PairSlot) -> &SlotManifest {
        match slot {
            PairSlot::Training => &self.training,
            PairSlot::Testing => &self.testing,
            PairSlot::Whole => &self.whole,
        }
    }

    fn slot_mut(&mut self, slot: PairSlot) -> &mut SlotManifest {
        match slot {
            PairSlot::Training => &mut self.training,
            PairSlot::Testing => &mut self.testing,
            PairSlot::Whole => &mut self.whole,
        }
    }
}

/// What a pool looks like on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolManifest {
    pub pairs: Vec<PairManifest>,
}

#[cfg(test)]
mod tests {
    use hudup_core::config::DataConfig;
    use hudup_core::types::RatingTriple;
    use hudup_data::dataset::same_dataset;
    use hudup_data::snapshot::Snapshot;

    use super::*;
    use crate::config::RegistryConfig;

    fn snapshot(uri: &str) -> SharedDataset {
        Arc::new(Snapshot::from_triples(
            Some(DataConfig::with_store_uri(uri)),
            [RatingTriple::new(1, 10, 4.0)],
        ))
    }

    fn pool() -> DatasetPool {
        DatasetPool::from_pairs([DatasetPair::new(
            snapshot("mem://training"),
            snapshot("mem://testing"),
        )])
    }

    #[test]
    fn from_pool_names_every_dataset() {
        let exchanged = DatasetPoolExchanged::from_pool(&pool());
        let pair = exchanged.get(0).unwrap();

        assert!(pair.training_uuid.is_some());
        assert!(pair.testing_uuid.is_some());
        assert!(pair.whole_uuid.is_none());
    }

    #[tokio::test]
    async fn uuid_only_slots_resolve_through_the_referred_pool() {
        let referred = DatasetPoolExchanged::from_pool(&pool());
        let source = referred.get(0).unwrap();

        let partial: DatasetPoolExchanged = [DatasetPairExchanged {
            training_uuid: source.training_uuid,
            ..DatasetPairExchanged::default()
        }]
        .into_iter()
        .collect();

        let rebuilt = partial.to_dataset_pool(Some(&referred)).await;
        assert_eq!(rebuilt.len(), 1);

        let pair = rebuilt.get(0).unwrap();
        let expected = source.training.as_ref().unwrap().dataset();
        assert!(same_dataset(pair.training.as_ref().unwrap(), &expected));
        assert_eq!(pair.training_uuid, source.training_uuid);
        assert!(pair.testing.is_none());
    }

    #[tokio::test]
    async fn unresolved_pairs_are_dropped() {
        let referred = DatasetPoolExchanged::from_pool(&pool());
        let partial: DatasetPoolExchanged = [DatasetPairExchanged {
            training_uuid: Some(Uuid::new_v4()),
            ..DatasetPairExchanged::default()
        }]
        .into_iter()
        .collect();

        assert!(partial.to_dataset_pool(Some(&referred)).await.is_empty());
        assert!(partial.to_dataset_pool(None).await.is_empty());
    }

    #[tokio::test]
    async fn exported_pool_crosses_as_a_manifest() {
        let registry = Registry::new(RegistryConfig::default());
        let local = DatasetPoolExchanged::from_pool(&pool());
        let exported = local.export(&registry, 0, false).await;
        assert_eq!(registry.len().await, 2);

        let manifest = exported.manifest().await;
        let frame = serde_json::to_string(&manifest).unwrap();
        let manifest: PoolManifest = serde_json::from_str(&frame).unwrap();

        let bound = DatasetPoolExchanged::bind(&manifest, &registry);
        assert_eq!(bound.get(0).unwrap().key(), local.get(0).unwrap().key());

        // Served by this registry, so the client side resolves to the
        // served datasets.
        let rebuilt = bound.to_dataset_pool(None).await;
        let expected = local.get(0).unwrap().training.as_ref().unwrap().dataset();
        assert!(same_dataset(
            rebuilt.get(0).unwrap().training.as_ref().unwrap(),
            &expected
        ));

        let client = bound.to_dataset_pool_client();
        let training = client.get(0).unwrap().training.clone().unwrap();
        assert!(!training.is_exclusive().await);
        assert!(training.rating(1, 10).await.unwrap().is_some());

        // Shared wrappers leave the served datasets alone unless forced.
        exported.unexport(false).await.unwrap();
        assert_eq!(registry.len().await, 2);

        let exported = local.export(&registry, 0, false).await;
        exported.unexport(true).await.unwrap();
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn sync_drops_missing_pairs_then_adds_new_ones() {
        let registry = Registry::new(RegistryConfig::default());
        let mut server = DatasetPoolExchanged::from_pool(&DatasetPool::from_pairs([
            DatasetPair::new(snapshot("mem://a"), snapshot("mem://b")),
            DatasetPair::new(snapshot("mem://c"), snapshot("mem://d")),
        ]))
        .export(&registry, 0, false)
        .await;
        assert_eq!(registry.len().await, 4);

        let kept = server.get(0).unwrap().clone();
        let incoming = DatasetPoolExchanged::from_pool(&DatasetPool::from_pairs([DatasetPair::new(
            snapshot("mem://e"),
            snapshot("mem://f"),
        )]));
        let incomplete = DatasetPairExchanged {
            training_uuid: Some(Uuid::new_v4()),
            ..DatasetPairExchanged::default()
        };

        let client: DatasetPoolExchanged = [kept.clone(), incoming.get(0).unwrap().clone(), incomplete]
            .into_iter()
            .collect();

        server.sync_with_client_pool(&client).await;

        assert_eq!(server.len(), 2);
        assert_eq!(server.get(0).unwrap().key(), kept.key());
        assert_eq!(server.get(1).unwrap().key(), incoming.get(0).unwrap().key());
        // The dropped pair's datasets were withdrawn from the registry.
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn whole_only_pairs_are_kept_apart() {
        let whole_only = |uri: &str| DatasetPair {
            whole: Some(snapshot(uri)),
            ..DatasetPair::default()
        };
        let client = DatasetPoolExchanged::from_pool(&DatasetPool::from_pairs([
            whole_only("mem://whole_a"),
            whole_only("mem://whole_b"),
        ]));
        assert_ne!(client.get(0).unwrap().key(), client.get(1).unwrap().key());

        let mut server = DatasetPoolExchanged::new();
        server.sync_with_client_pool(&client).await;
        assert_eq!(server.len(), 2);

        let shrunk: DatasetPoolExchanged = [client.get(1).unwrap().clone()].into_iter().collect();
        server.sync_with_client_pool(&shrunk).await;
        assert_eq!(server.len(), 1);
        assert_eq!(server.get(0).unwrap().whole_uuid, client.get(1).unwrap().whole_uuid);
    }
}
