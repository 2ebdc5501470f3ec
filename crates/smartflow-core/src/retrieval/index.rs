//! RetrievalIndex trait and its type-erased wrapper.

use std::future::Future;
use std::pin::Pin;

use smartflow_types::error::RetrievalError;

/// A corpus index built once, then queried by substeps with `use_rag`.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait RetrievalIndex: Send + Sync {
    /// Return up to `k` passages most relevant to `query`, best first.
    fn search(
        &self,
        query: &str,
        k: usize,
    ) -> impl Future<Output = Result<Vec<String>, RetrievalError>> + Send;

    /// Number of indexed passages.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Object-safe version of [`RetrievalIndex`] with boxed futures.
pub trait RetrievalIndexDyn: Send + Sync {
    fn search_boxed<'a>(
        &'a self,
        query: &'a str,
        k: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, RetrievalError>> + Send + 'a>>;

    fn len_dyn(&self) -> usize;
}

impl<T: RetrievalIndex> RetrievalIndexDyn for T {
    fn search_boxed<'a>(
        &'a self,
        query: &'a str,
        k: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, RetrievalError>> + Send + 'a>> {
        Box::pin(self.search(query, k))
    }

    fn len_dyn(&self) -> usize {
        self.len()
    }
}

/// Type-erased retrieval index, attachable to substeps at runtime.
pub struct BoxRetrievalIndex {
    inner: Box<dyn RetrievalIndexDyn + Send + Sync>,
}

impl BoxRetrievalIndex {
    pub fn new<T: RetrievalIndex + 'static>(index: T) -> Self {
        Self {
            inner: Box::new(index),
        }
    }

    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<String>, RetrievalError> {
        self.inner.search_boxed(query, k).await
    }

    pub fn len(&self) -> usize {
        self.inner.len_dyn()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for BoxRetrievalIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxRetrievalIndex")
            .field("passages", &self.len())
            .finish()
    }
}
