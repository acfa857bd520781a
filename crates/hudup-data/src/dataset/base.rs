use std::sync::atomic::{AtomicBool, Ordering};

use hudup_core::config::DataConfig;
use hudup_core::export::ExportSlot;
use tokio::sync::RwLock;

use crate::TRACING_TARGET_DATASET;

/// State shared by every dataset shape: configuration, exclusivity and the
/// export slot.
#[derive(Debug, Default)]
pub struct DatasetBase {
    config: RwLock<Option<DataConfig>>,
    exclusive: AtomicBool,
    export: ExportSlot,
}

impl DatasetBase {
    pub fn new(config: Option<DataConfig>) -> Self {
        Self {
            config: RwLock::new(config),
            ..Self::default()
        }
    }

    pub async fn config(&self) -> Option<DataConfig> {
        self.config.read().await.clone()
    }

    pub async fn set_config(&self, config: Option<DataConfig>) {
        *self.config.write().await = config;
    }

    pub fn is_exclusive(&self) -> bool {
        self.exclusive.load(Ordering::SeqCst)
    }

    pub fn set_exclusive(&self, exclusive: bool) {
        self.exclusive.store(exclusive, Ordering::SeqCst);
    }

    pub fn export_slot(&self) -> &ExportSlot {
        &self.export
    }

    /// Unexports, forgets the configuration and drops exclusivity.
    ///
    /// Unexport failures are logged and swallowed.
    pub async fn clear(&self) {
        if let Err(error) = self.export.unexport().await {
            tracing::warn!(
                target: TRACING_TARGET_DATASET,
                error = %error,
                "failed to unexport dataset while clearing"
            );
        }

        *self.config.write().await = None;
        self.set_exclusive(false);
    }
}
