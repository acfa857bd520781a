//! Training, testing and whole datasets used together for evaluation.

use hudup_core::fetcher::BoxFetcher;
use hudup_core::{Id, Result};
use strum::{AsRefStr, IntoStaticStr};
use uuid::Uuid;

use crate::TRACING_TARGET_POOL;
use crate::dataset::SharedDataset;
use crate::loader::DatasetLoader;
use crate::pointer::NullPointer;

/// One of the three datasets of a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum PairSlot {
    Training,
    Testing,
    Whole,
}

impl PairSlot {
    pub const ALL: [PairSlot; 3] = [PairSlot::Training, PairSlot::Testing, PairSlot::Whole];
}

/// A (training, testing, whole) triple of datasets.
///
/// Each slot also carries a UUID naming it across a network split, for when
/// only one side holds the dataset itself. A pair is valid when both its
/// training and testing datasets are present.
#[derive(Debug, Clone, Default)]
pub struct DatasetPair {
    pub training: Option<SharedDataset>,
    pub testing: Option<SharedDataset>,
    pub whole: Option<SharedDataset>,
    pub training_uuid: Option<Uuid>,
    pub testing_uuid: Option<Uuid>,
    pub whole_uuid: Option<Uuid>,
}

impl DatasetPair {
    pub fn new(training: SharedDataset, testing: SharedDataset) -> Self {
        Self {
            training: Some(training),
            testing: Some(testing),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_whole(mut self, whole: SharedDataset) -> Self {
        self.whole = Some(whole);
        self
    }

    pub fn validate(&self) -> bool {
        self.training.is_some() && self.testing.is_some()
    }

    pub fn dataset(&self, slot: PairSlot) -> Option<&SharedDataset> {
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

    fn slot_mut(&mut self, slot: PairSlot) -> (&mut Option<SharedDataset>, &mut Option<Uuid>) {
        match slot {
            PairSlot::Training => (&mut self.training, &mut self.training_uuid),
            PairSlot::Testing => (&mut self.testing, &mut self.testing_uuid),
            PairSlot::Whole => (&mut self.whole, &mut self.whole_uuid),
        }
    }

    /// Gives a fresh UUID to every present dataset that has none.
    pub fn fill_missing_uuid(&mut self) {
        for slot in PairSlot::ALL {
            let (dataset, uuid) = self.slot_mut(slot);
            if dataset.is_some() && uuid.is_none() {
                *uuid = Some(Uuid::new_v4());
            }
        }
    }

    /// Number of users in a slot; zero when empty or unreadable.
    pub async fn user_count(&self, slot: PairSlot) -> usize {
        match self.dataset(slot) {
            Some(dataset) => count(slot, "users", dataset.fetch_user_ids().await).await,
            None => 0,
        }
    }

    /// Number of items in a slot; zero when empty or unreadable.
    pub async fn item_count(&self, slot: PairSlot) -> usize {
        match self.dataset(slot) {
            Some(dataset) => count(slot, "items", dataset.fetch_item_ids().await).await,
            None => 0,
        }
    }

    /// Clears every dataset and empties the slots. UUIDs are kept.
    pub async fn clear(&mut self) {
        for slot in PairSlot::ALL {
            if let Some(dataset) = self.slot_mut(slot).0.take() {
                dataset.clear().await;
            }
        }
    }

    /// Rebuilds each dataset from its configuration.
    ///
    /// A [`NullPointer`] testing set is left alone. A slot that fails to
    /// load is left empty; every slot is attempted and the first failure is
    /// returned.
    pub async fn reload(&mut self, loader: &dyn DatasetLoader) -> Result<()> {
        let mut outcome = Ok(());
        for slot in PairSlot::ALL {
            let (dataset, _) = self.slot_mut(slot);
            let Some(current) = dataset.take() else {
                continue;
            };
            if slot == PairSlot::Testing && current.as_any().is::<NullPointer>() {
                *dataset = Some(current);
                continue;
            }

            let config = current.config().await.unwrap_or_default();
            current.clear().await;

            match loader.load(&config).await {
                Ok(reloaded) => *dataset = Some(reloaded),
                Err(error) => {
                    tracing::warn!(
                        target: TRACING_TARGET_POOL,
                        slot = slot.as_ref(),
                        error = %error,
                        "failed to reload dataset"
                    );
                    if outcome.is_ok() {
                        outcome = Err(error);
                    }
                }
            }
        }

        outcome
    }
}

async fn count(slot: PairSlot, what: &str, fetcher: Result<BoxFetcher<Id>>) -> usize {
    let mut fetcher = match fetcher {
        Ok(fetcher) => fetcher,
        Err(error) => {
            tracing::warn!(
                target: TRACING_TARGET_POOL,
                slot = slot.as_ref(),
                what,
                error = %error,
                "failed to count"
            );
            return 0;
        }
    };

    let size = fetcher.metadata().size;
    if let Err(error) = fetcher.close().await {
        tracing::warn!(target: TRACING_TARGET_POOL, error = %error, "failed to close fetcher");
    }
    size
}
