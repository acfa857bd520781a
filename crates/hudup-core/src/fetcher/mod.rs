//! Resettable, closable cursors over typed sequences.
//!
//! A fetcher is created per call by whoever produces the data and is owned by
//! the consumer, which must close it when done. [`drain`] closes on every exit
//! path and is the preferred way to consume a fetcher completely.

mod mem_fetcher;
mod meta_fetcher;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use self::mem_fetcher::MemFetcher;
pub use self::meta_fetcher::{Mapper, MetaFetcher};
use crate::TRACING_TARGET_FETCHER;
use crate::error::Result;

/// Boxed fetcher handed out by datasets and providers.
pub type BoxFetcher<E> = Box<dyn Fetcher<E>>;

/// Size hint of a fetcher. May be approximate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetcherMetadata {
    pub size: usize,
}

impl FetcherMetadata {
    pub fn new(size: usize) -> Self {
        Self { size }
    }
}

/// A cursor over a sequence of `E`.
///
/// States are fresh, exhausted and closed. `current` is meaningful only right
/// after `advance` returned true, and may still be `None` when the element is
/// absent. Advancing or resetting a closed fetcher fails with
/// [`ErrorKind::Closed`]; closing twice is a no-op.
///
/// [`ErrorKind::Closed`]: crate::ErrorKind::Closed
#[async_trait]
pub trait Fetcher<E>: Send {
    /// Moves to the next element, returning false once exhausted.
    async fn advance(&mut self) -> Result<bool>;

    /// The element under the cursor.
    fn current(&self) -> Option<&E>;

    /// Rewinds to the start.
    async fn reset(&mut self) -> Result<()>;

    fn metadata(&self) -> FetcherMetadata;

    /// Releases underlying resources.
    async fn close(&mut self) -> Result<()>;
}

impl<E> fmt::Debug for dyn Fetcher<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fetcher")
            .field("metadata", &self.metadata())
            .finish_non_exhaustive()
    }
}

/// Reads every remaining element, skipping absent ones.
async fn collect<E, F>(fetcher: &mut F) -> Result<Vec<E>>
where
    E: Clone + Send,
    F: Fetcher<E> + ?Sized,
{
    let mut items = Vec::with_capacity(fetcher.metadata().size);
    while fetcher.advance().await? {
        if let Some(item) = fetcher.current() {
            items.push(item.clone());
        }
    }
    Ok(items)
}

/// Reads every remaining element, then closes the fetcher.
///
/// The fetcher is closed even when reading fails; the read error wins.
pub async fn drain<E, F>(fetcher: &mut F) -> Result<Vec<E>>
where
    E: Clone + Send,
    F: Fetcher<E> + ?Sized,
{
    let collected = collect(fetcher).await;
    let closed = fetcher.close().await;

    if let (Err(error), Err(close_error)) = (&collected, &closed) {
        tracing::warn!(
            target: TRACING_TARGET_FETCHER,
            error = %error,
            close_error = %close_error,
            "fetcher failed while draining and could not be closed"
        );
    }

    let items = collected?;
    closed?;
    Ok(items)
}

/// Same as [`drain`], consuming a boxed fetcher.
pub async fn drain_boxed<E>(mut fetcher: BoxFetcher<E>) -> Result<Vec<E>>
where
    E: Clone + Send,
{
    drain(fetcher.as_mut()).await
}

/// Reads every remaining element and rewinds, leaving the fetcher open.
pub async fn drain_then_reset<E, F>(fetcher: &mut F) -> Result<Vec<E>>
where
    E: Clone + Send,
    F: Fetcher<E> + ?Sized,
{
    let items = collect(fetcher).await?;
    fetcher.reset().await?;
    Ok(items)
}
