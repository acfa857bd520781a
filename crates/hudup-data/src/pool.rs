//! Ordered collections of dataset pairs.

use hudup_core::Result;

use crate::dataset::SharedDataset;
use crate::loader::DatasetLoader;
use crate::pair::{DatasetPair, PairSlot};

/// An ordered list of [`DatasetPair`]s.
///
/// Removing or replacing pairs clears their datasets.
#[derive(Debug, Clone, Default)]
pub struct DatasetPool {
    pairs: Vec<DatasetPair>,
}

impl DatasetPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = DatasetPair>) -> Self {
        Self {
            pairs: pairs.into_iter().collect(),
        }
    }

    pub fn add(&mut self, pair: DatasetPair) {
        self.pairs.push(pair);
    }

    pub fn get(&self, index: usize) -> Option<&DatasetPair> {
        self.pairs.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut DatasetPair> {
        self.pairs.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DatasetPair> {
        self.pairs.iter()
    }

    pub fn into_pairs(self) -> Vec<DatasetPair> {
        self.pairs
    }

    /// Removes the pair at `index` and clears it.
    pub async fn remove(&mut self, index: usize) -> bool {
        if index >= self.pairs.len() {
            return false;
        }

        self.pairs.remove(index).clear().await;
        true
    }

    /// Replaces the contents, clearing the pairs held so far.
    pub async fn fill(&mut self, pairs: impl IntoIterator<Item = DatasetPair>) {
        self.clear().await;
        self.pairs.extend(pairs);
    }

    /// Clears every pair and empties the pool.
    pub async fn clear(&mut self) {
        for mut pair in self.pairs.drain(..) {
            pair.clear().await;
        }
    }

    /// Reloads every pair, returning the first failure.
    pub async fn reload(&mut self, loader: &dyn DatasetLoader) -> Result<()> {
        let mut outcome = Ok(());
        for pair in &mut self.pairs {
            let reloaded = pair.reload(loader).await;
            if outcome.is_ok() {
                outcome = reloaded;
            }
        }
        outcome
    }

    pub async fn total_users(&self, slot: PairSlot) -> usize {
        let mut total = 0;
        for pair in &self.pairs {
            total += pair.user_count(slot).await;
        }
        total
    }

    pub async fn total_items(&self, slot: PairSlot) -> usize {
        let mut total = 0;
        for pair in &self.pairs {
            total += pair.item_count(slot).await;
        }
        total
    }

    /// First pair whose training and testing datasets have the given store
    /// identifiers.
    pub async fn find_training_testing(
        &self,
        training_id: &str,
        testing_id: &str,
    ) -> Option<&DatasetPair> {
        for pair in &self.pairs {
            if has_uri_id(pair.training.as_ref(), training_id).await
                && has_uri_id(pair.testing.as_ref(), testing_id).await
            {
                return Some(pair);
            }
        }
        None
    }

    pub async fn find_training(&self, training_id: &str) -> Option<&DatasetPair> {
        for pair in &self.pairs {
            if has_uri_id(pair.training.as_ref(), training_id).await {
                return Some(pair);
            }
        }
        None
    }

    pub async fn find_whole(&self, whole_id: &str) -> Option<&DatasetPair> {
        for pair in &self.pairs {
            if has_uri_id(pair.whole.as_ref(), whole_id).await {
                return Some(pair);
            }
        }
        None
    }
}

async fn has_uri_id(dataset: Option<&SharedDataset>, uri_id: &str) -> bool {
    let Some(dataset) = dataset else {
        return false;
    };

    dataset
        .config()
        .await
        .and_then(|config| config.uri_id())
        .is_some_and(|id| id == uri_id)
}

impl FromIterator<DatasetPair> for DatasetPool {
    fn from_iter<T: IntoIterator<Item = DatasetPair>>(iter: T) -> Self {
        Self::from_pairs(iter)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use hudup_core::config::DataConfig;
    use hudup_core::types::RatingTriple;

    use super::*;
    use crate::snapshot::Snapshot;

    fn snapshot(uri: &str, users: &[i32]) -> SharedDataset {
        let triples = users.iter().map(|&user| RatingTriple::new(user, 10, 3.0));
        Arc::new(Snapshot::from_triples(Some(DataConfig::with_store_uri(uri)), triples))
    }

    fn pool() -> DatasetPool {
        DatasetPool::from_pairs([
            DatasetPair::new(snapshot("mem://a", &[1, 2]), snapshot("mem://a_test", &[1])),
            DatasetPair::new(snapshot("mem://b", &[3]), snapshot("mem://b_test", &[3]))
                .with_whole(snapshot("mem://b_whole", &[3, 4])),
        ])
    }

    #[tokio::test]
    async fn totals_sum_over_pairs() {
        let pool = pool();
        assert_eq!(pool.total_users(PairSlot::Training).await, 3);
        assert_eq!(pool.total_users(PairSlot::Whole).await, 2);
        assert_eq!(pool.total_items(PairSlot::Testing).await, 2);
    }

    #[tokio::test]
    async fn finds_pairs_by_store_identifier() {
        let pool = pool();

        let found = pool.find_training_testing("mem://b", "mem://b_test").await;
        assert!(found.is_some_and(|pair| pair.whole.is_some()));
        assert!(pool.find_training_testing("mem://a", "mem://b_test").await.is_none());
        assert!(pool.find_training("mem://a").await.is_some());
        assert!(pool.find_whole("mem://b_whole").await.is_some());
        assert!(pool.find_whole("mem://a").await.is_none());
    }

    #[tokio::test]
    async fn remove_clears_the_pair() {
        let mut pool = pool();
        let training = pool.get(0).and_then(|p| p.training.clone()).unwrap();

        assert!(pool.remove(0).await);
        assert!(!pool.remove(5).await);
        assert_eq!(pool.len(), 1);
        assert!(training.config().await.is_none());
    }

    #[tokio::test]
    async fn fill_replaces_and_clears() {
        let mut pool = pool();
        let old = pool.get(1).and_then(|p| p.whole.clone()).unwrap();

        pool.fill([DatasetPair::new(snapshot("mem://c", &[]), snapshot("mem://c_test", &[]))])
            .await;

        assert_eq!(pool.len(), 1);
        assert!(old.config().await.is_none());
        assert!(pool.find_training("mem://c").await.is_some());
    }
}
