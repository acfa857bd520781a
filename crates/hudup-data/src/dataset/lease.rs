use super::SharedDataset;
use crate::TRACING_TARGET_DATASET;

/// Scoped ownership of a dataset by one consumer.
///
/// [`DatasetLease::release`] clears the dataset if it is exclusive. A lease
/// dropped without being released schedules the same teardown on the
/// current runtime and logs it, since that path is a missed release.
#[derive(Debug)]
pub struct DatasetLease {
    dataset: Option<SharedDataset>,
}

impl DatasetLease {
    pub fn new(dataset: SharedDataset) -> Self {
        Self {
            dataset: Some(dataset),
        }
    }

    pub fn dataset(&self) -> Option<&SharedDataset> {
        self.dataset.as_ref()
    }

    /// Ends the lease, clearing an exclusive dataset.
    pub async fn release(mut self) {
        if let Some(dataset) = self.dataset.take() {
            release_dataset(dataset).await;
        }
    }

    /// Ends the lease without clearing anything.
    pub fn into_inner(mut self) -> Option<SharedDataset> {
        self.dataset.take()
    }
}

async fn release_dataset(dataset: SharedDataset) {
    if dataset.is_exclusive().await {
        dataset.clear().await;
    }
}

impl Drop for DatasetLease {
    fn drop(&mut self) {
        let Some(dataset) = self.dataset.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::warn!(
                    target: TRACING_TARGET_DATASET,
                    kind = dataset.kind().as_ref(),
                    "dataset lease dropped without release"
                );
                handle.spawn(release_dataset(dataset));
            }
            Err(_) => {
                tracing::error!(
                    target: TRACING_TARGET_DATASET,
                    kind = dataset.kind().as_ref(),
                    "dataset lease dropped outside a runtime, dataset not cleared"
                );
            }
        }
    }
}
