use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;

use super::{BoxFetcher, Fetcher, FetcherMetadata};
use crate::error::{Error, Result};

/// Asynchronous projection applied to each element of a [`MetaFetcher`].
pub type Mapper<U, V> = Arc<dyn Fn(U) -> BoxFuture<'static, Result<Option<V>>> + Send + Sync>;

/// Projects every element of an inner fetcher through a mapper.
///
/// The mapper runs during `advance` and is never invoked for an absent
/// element. Everything else delegates to the inner fetcher.
pub struct MetaFetcher<U, V> {
    inner: BoxFetcher<U>,
    mapper: Mapper<U, V>,
    current: Option<V>,
}

impl<U, V> MetaFetcher<U, V>
where
    U: Clone + Send + 'static,
    V: Send + 'static,
{
    pub fn new(inner: BoxFetcher<U>, mapper: Mapper<U, V>) -> Self {
        Self {
            inner,
            mapper,
            current: None,
        }
    }

    /// Creates a fetcher with a synchronous projection.
    pub fn map<F>(inner: BoxFetcher<U>, f: F) -> Self
    where
        F: Fn(U) -> Option<V> + Send + Sync + 'static,
    {
        let mapper: Mapper<U, V> =
            Arc::new(move |u| futures::future::ready(Ok::<_, Error>(f(u))).boxed());
        Self::new(inner, mapper)
    }
}

#[async_trait]
impl<U, V> Fetcher<V> for MetaFetcher<U, V>
where
    U: Clone + Send + 'static,
    V: Send + 'static,
{
    async fn advance(&mut self) -> Result<bool> {
        self.current = None;
        if !self.inner.advance().await? {
            return Ok(false);
        }

        if let Some(element) = self.inner.current().cloned() {
            self.current = (self.mapper)(element).await?;
        }
        Ok(true)
    }

    fn current(&self) -> Option<&V> {
        self.current.as_ref()
    }

    async fn reset(&mut self) -> Result<()> {
        self.current = None;
        self.inner.reset().await
    }

    fn metadata(&self) -> FetcherMetadata {
        self.inner.metadata()
    }

    async fn close(&mut self) -> Result<()> {
        self.current = None;
        self.inner.close().await
    }
}

impl<U, V> fmt::Debug for MetaFetcher<U, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetaFetcher")
            .field("metadata", &self.inner.metadata())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::fetcher::{MemFetcher, drain};

    #[tokio::test]
    async fn maps_each_element() {
        let inner: BoxFetcher<i32> = Box::new(MemFetcher::new(vec![1, 2, 3]));
        let mut fetcher = MetaFetcher::map(inner, |v| (v != 2).then(|| v * 10));

        assert_eq!(fetcher.metadata().size, 3);
        assert_eq!(drain(&mut fetcher).await.unwrap(), vec![10, 30]);
    }

    #[tokio::test]
    async fn mapper_skips_absent_elements() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let ids: BoxFetcher<i32> = Box::new(MemFetcher::new(vec![1, 2]));
        let odd: BoxFetcher<i32> = Box::new(MetaFetcher::map(ids, |v| (v % 2 == 1).then_some(v)));
        let mut fetcher = MetaFetcher::map(odd, move |v: i32| {
            counter.fetch_add(1, Ordering::SeqCst);
            Some(v.to_string())
        });

        assert_eq!(drain(&mut fetcher).await.unwrap(), vec!["1".to_owned()]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn async_mapper_errors_surface_from_advance() {
        let inner: BoxFetcher<i32> = Box::new(MemFetcher::new(vec![1]));
        let mapper: Mapper<i32, i32> = Arc::new(|_: i32| {
            async { Err::<Option<i32>, _>(Error::provider().with_message("gone")) }.boxed()
        });
        let mut fetcher = MetaFetcher::new(inner, mapper);

        let error = fetcher.advance().await.unwrap_err();
        assert_eq!(error.kind(), crate::ErrorKind::Provider);
        fetcher.close().await.unwrap();
    }
}
