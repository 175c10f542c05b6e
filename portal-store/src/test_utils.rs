// SPDX-License-Identifier: MIT OR Apache-2.0

//! Store wrappers for exercising concurrent writers in tests.
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use portal_core::{Row, Version};

use crate::filter::{Filter, Mutation};
use crate::traits::RecordStore;

pub use portal_core::test_utils::{ManualClock, setup_logging};

/// Store which hands control back to the async runtime before every operation.
///
/// Two writers joined on the same task interleave at every store access: both read the same
/// state before either of them writes. This reproduces the check-then-write race between
/// uncoordinated writers deterministically.
#[derive(Clone, Debug)]
pub struct InterleavingStore<S> {
    inner: S,
    rejected: Arc<AtomicUsize>,
}

impl<S> InterleavingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            rejected: Arc::default(),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of conditional appends which were refused because the head had moved.
    pub fn rejected_appends(&self) -> usize {
        self.rejected.load(Ordering::SeqCst)
    }
}

impl<S> RecordStore for InterleavingStore<S>
where
    S: RecordStore,
{
    type Error = S::Error;

    async fn insert(&self, rows: Vec<Row>) -> Result<usize, Self::Error> {
        tokio::task::yield_now().await;
        self.inner.insert(rows).await
    }

    async fn insert_if_head(
        &self,
        row: Row,
        expected: Option<&Version>,
    ) -> Result<bool, Self::Error> {
        tokio::task::yield_now().await;
        let appended = self.inner.insert_if_head(row, expected).await?;
        if !appended {
            self.rejected.fetch_add(1, Ordering::SeqCst);
        }
        Ok(appended)
    }

    async fn query(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, Self::Error> {
        tokio::task::yield_now().await;
        self.inner.query(table, filter).await
    }

    async fn bulk_mutate(
        &self,
        table: &str,
        filter: &Filter,
        mutation: Mutation,
    ) -> Result<u64, Self::Error> {
        tokio::task::yield_now().await;
        self.inner.bulk_mutate(table, filter, mutation).await
    }
}
