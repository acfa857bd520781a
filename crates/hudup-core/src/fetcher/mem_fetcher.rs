use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Fetcher, FetcherMetadata};
use crate::error::{Error, Result};

/// Fetcher over an in-memory copy of a collection.
///
/// Only the elements are serialized. A deserialized fetcher is fresh and
/// rebuilds its cursor on the first `advance`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(serialize = "E: Serialize", deserialize = "E: Deserialize<'de>"))]
pub struct MemFetcher<E> {
    items: Vec<E>,
    #[serde(skip)]
    cursor: Option<usize>,
    #[serde(skip)]
    closed: bool,
}

impl<E> MemFetcher<E> {
    pub fn new(items: Vec<E>) -> Self {
        Self {
            items,
            cursor: None,
            closed: false,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// The stored elements, regardless of the cursor.
    pub fn items(&self) -> &[E] {
        &self.items
    }

    pub fn into_items(self) -> Vec<E> {
        self.items
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::closed().with_message("fetcher is closed"))
        } else {
            Ok(())
        }
    }
}

impl<E> Default for MemFetcher<E> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<E> From<Vec<E>> for MemFetcher<E> {
    fn from(items: Vec<E>) -> Self {
        Self::new(items)
    }
}

impl<E> FromIterator<E> for MemFetcher<E> {
    fn from_iter<I: IntoIterator<Item = E>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[async_trait]
impl<E: Send> Fetcher<E> for MemFetcher<E> {
    async fn advance(&mut self) -> Result<bool> {
        self.ensure_open()?;

        let next = self.cursor.map_or(0, |cursor| cursor + 1);
        if next < self.items.len() {
            self.cursor = Some(next);
            Ok(true)
        } else {
            self.cursor = Some(self.items.len());
            Ok(false)
        }
    }

    fn current(&self) -> Option<&E> {
        if self.closed {
            return None;
        }
        self.cursor.and_then(|cursor| self.items.get(cursor))
    }

    async fn reset(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.cursor = None;
        Ok(())
    }

    fn metadata(&self) -> FetcherMetadata {
        FetcherMetadata::new(self.items.len())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.cursor = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::fetcher::{BoxFetcher, drain, drain_then_reset};

    #[tokio::test]
    async fn reset_replays_same_sequence() {
        let mut fetcher = MemFetcher::new(vec![3, 1, 2]);

        let first = drain_then_reset(&mut fetcher).await.unwrap();
        let second = drain(&mut fetcher).await.unwrap();

        assert_eq!(first, vec![3, 1, 2]);
        assert_eq!(first, second);
        assert!(fetcher.is_closed());
    }

    #[tokio::test]
    async fn current_follows_advance() {
        let mut fetcher = MemFetcher::new(vec!["a"]);
        assert_eq!(fetcher.current(), None);

        assert!(fetcher.advance().await.unwrap());
        assert_eq!(fetcher.current(), Some(&"a"));

        assert!(!fetcher.advance().await.unwrap());
        assert_eq!(fetcher.current(), None);
        assert!(!fetcher.advance().await.unwrap());
    }

    #[tokio::test]
    async fn closed_fetcher_fails_loudly() {
        let mut fetcher = MemFetcher::new(vec![1]);
        fetcher.close().await.unwrap();
        fetcher.close().await.unwrap();

        assert_eq!(fetcher.advance().await.unwrap_err().kind(), ErrorKind::Closed);
        assert_eq!(fetcher.reset().await.unwrap_err().kind(), ErrorKind::Closed);
    }

    #[tokio::test]
    async fn deserialized_fetcher_starts_fresh() {
        let mut fetcher = MemFetcher::new(vec![7, 8]);
        fetcher.advance().await.unwrap();

        let json = serde_json::to_string(&fetcher).unwrap();
        let mut copy: MemFetcher<i32> = serde_json::from_str(&json).unwrap();

        assert_eq!(copy.current(), None);
        assert_eq!(drain(&mut copy).await.unwrap(), vec![7, 8]);
    }

    #[test]
    fn boxed_fetcher_debug_shows_size() {
        let fetcher: BoxFetcher<i32> = Box::new(MemFetcher::new(vec![1, 2, 3]));
        let failed: Result<BoxFetcher<i32>> = Err(Error::closed());

        assert!(format!("{fetcher:?}").contains("size: 3"));
        assert_eq!(failed.unwrap_err().kind(), ErrorKind::Closed);
    }
}
