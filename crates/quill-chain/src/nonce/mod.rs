//! Durable nonce sequencing.
//!
//! Nonces are tracked in a SQLite pool so that abandoned nonces survive
//! restarts and are reused before new ones are minted. Admission to the pool
//! is limited by a semaphore sized to the RPC node's comfortable concurrency.

use std::sync::Arc;

use tokio::sync::{
    OwnedSemaphorePermit,
    Semaphore,
};
use tracing::{
    instrument,
    warn,
};

mod pool;

pub use pool::NoncePool;

/// Concurrent in-flight submissions the sequencer admits.
const BEST_GUESS_CONCURRENCY: usize = 32;
/// Hard ceiling on concurrent nonce requests; admission never grows past this.
pub const MAX_CONCURRENT_REQUESTS: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum NonceError {
    #[error("nonce storage query failed")]
    Storage(#[source] rusqlite::Error),
    #[error("failed migrating nonce database")]
    Migration(#[source] rusqlite_migration::Error),
    #[error("nonce admission limiter is closed")]
    LimiterClosed,
    #[error("nonce storage task panicked")]
    Join(#[source] tokio::task::JoinError),
}

/// Hands out unique, reusable transaction nonces backed by [`NoncePool`].
#[derive(Clone)]
pub struct NonceSequencer {
    pool: Arc<NoncePool>,
    limiter: Arc<Semaphore>,
}

impl NonceSequencer {
    #[must_use]
    pub fn new(pool: Arc<NoncePool>) -> Self {
        Self::with_concurrency(pool, BEST_GUESS_CONCURRENCY)
    }

    /// Admits at most `limit` concurrent reservations, clamped to
    /// [`MAX_CONCURRENT_REQUESTS`].
    #[must_use]
    pub fn with_concurrency(pool: Arc<NoncePool>, limit: usize) -> Self {
        Self {
            pool,
            limiter: Arc::new(Semaphore::new(limit.min(MAX_CONCURRENT_REQUESTS))),
        }
    }

    /// Reserves the lowest available nonce, waiting for admission if too many
    /// submissions are already in flight.
    ///
    /// # Errors
    /// Returns an error if the limiter is closed or the reservation fails.
    #[instrument(skip_all, err)]
    pub async fn get_nonce(&self) -> Result<NonceContext, NonceError> {
        let permit = self
            .limiter
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| NonceError::LimiterClosed)?;
        let pool = self.pool.clone();
        let nonce = blocking(move || pool.reserve_lowest()).await?;
        Ok(NonceContext {
            nonce,
            pool: self.pool.clone(),
            _permit: permit,
            settled: false,
        })
    }

    /// Aligns the pool with the chain: discards pooled nonces below `nonce`
    /// and moves the mint cursor up to it.
    #[instrument(skip_all, fields(nonce = nonce), err)]
    pub async fn fast_forward(&self, nonce: u64) -> Result<(), NonceError> {
        let pool = self.pool.clone();
        blocking(move || pool.fast_forward(nonce)).await
    }

    /// Ensures a batch of sequential placeholder nonces starting at `from`
    /// exists in the pool.
    #[instrument(skip_all, fields(from = from), err)]
    pub async fn replenish(&self, from: u64) -> Result<(), NonceError> {
        let pool = self.pool.clone();
        blocking(move || pool.replenish(from)).await
    }
}

/// A reserved nonce.
///
/// Must be settled exactly once: [`consume`](Self::consume) after the chain
/// accepted the nonce, [`cancel`](Self::cancel) to hand it back for reuse.
/// Dropping an unsettled context releases the reservation as a backstop.
pub struct NonceContext {
    nonce: u64,
    pool: Arc<NoncePool>,
    _permit: OwnedSemaphorePermit,
    settled: bool,
}

impl NonceContext {
    #[must_use]
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// Permanently removes the nonce from the pool; it was used on chain.
    ///
    /// # Errors
    /// If the removal fails the context is dropped unsettled, returning the
    /// nonce to the pool as if cancelled.
    pub async fn consume(mut self) -> Result<(), NonceError> {
        let pool = self.pool.clone();
        let nonce = self.nonce;
        blocking(move || pool.consume(nonce)).await?;
        self.settled = true;
        Ok(())
    }

    /// Returns the nonce to the pool for reuse.
    pub async fn cancel(mut self) -> Result<(), NonceError> {
        let pool = self.pool.clone();
        let nonce = self.nonce;
        blocking(move || pool.release(nonce)).await?;
        self.settled = true;
        Ok(())
    }
}

impl Drop for NonceContext {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let pool = self.pool.clone();
        let nonce = self.nonce;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || {
                    if let Err(error) = pool.release(nonce) {
                        warn!(
                            nonce,
                            error = &error as &dyn std::error::Error,
                            "failed releasing dropped nonce reservation"
                        );
                    }
                });
            }
            Err(_) => {
                if let Err(error) = pool.release(nonce) {
                    warn!(
                        nonce,
                        error = &error as &dyn std::error::Error,
                        "failed releasing dropped nonce reservation"
                    );
                }
            }
        }
    }
}

async fn blocking<T, F>(f: F) -> Result<T, NonceError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, NonceError> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(NonceError::Join)?
}

#[cfg(test)]
mod tests {
    use std::{
        collections::BTreeSet,
        sync::Arc,
    };

    use super::{
        pool::REPLENISH_SPAN,
        NoncePool,
        NonceSequencer,
        MAX_CONCURRENT_REQUESTS,
    };

    fn sequencer() -> NonceSequencer {
        NonceSequencer::new(Arc::new(NoncePool::open_in_memory().unwrap()))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_reservations_yield_unique_ascending_nonces() {
        let sequencer = sequencer();
        sequencer.fast_forward(100).await.unwrap();
        sequencer.replenish(100).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let sequencer = sequencer.clone();
            handles.push(tokio::spawn(async move {
                sequencer.get_nonce().await.unwrap()
            }));
        }
        let mut nonces = BTreeSet::new();
        let mut contexts = Vec::new();
        for handle in handles {
            let ctx = handle.await.unwrap();
            assert!(nonces.insert(ctx.nonce()), "nonce issued twice");
            contexts.push(ctx);
        }
        let expected: BTreeSet<u64> = (100..116).collect();
        assert_eq!(nonces, expected);
        for ctx in contexts {
            ctx.consume().await.unwrap();
        }
    }

    #[tokio::test]
    async fn cancelled_nonce_is_reused_before_minting() {
        let sequencer = sequencer();
        let first = sequencer.get_nonce().await.unwrap();
        let second = sequencer.get_nonce().await.unwrap();
        assert_eq!(first.nonce(), 0);
        assert_eq!(second.nonce(), 1);

        first.cancel().await.unwrap();
        let reissued = sequencer.get_nonce().await.unwrap();
        assert_eq!(reissued.nonce(), 0);
    }

    #[tokio::test]
    async fn consumed_nonce_is_never_reissued() {
        let sequencer = sequencer();
        let first = sequencer.get_nonce().await.unwrap();
        assert_eq!(first.nonce(), 0);
        first.consume().await.unwrap();
        let next = sequencer.get_nonce().await.unwrap();
        assert_eq!(next.nonce(), 1);
    }

    #[tokio::test]
    async fn dropped_context_releases_the_reservation() {
        let pool = Arc::new(NoncePool::open_in_memory().unwrap());
        let sequencer = NonceSequencer::new(pool.clone());
        {
            let ctx = sequencer.get_nonce().await.unwrap();
            assert_eq!(ctx.nonce(), 0);
        }
        // the drop backstop runs on the blocking pool; wait for it
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
        loop {
            if pool.free_nonces().unwrap().contains(&0) {
                break;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "dropped reservation was never released"
            );
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let reissued = sequencer.get_nonce().await.unwrap();
        assert_eq!(reissued.nonce(), 0);
    }

    #[tokio::test]
    async fn fast_forward_discards_below_and_is_idempotent() {
        let pool = Arc::new(NoncePool::open_in_memory().unwrap());
        let sequencer = NonceSequencer::new(pool.clone());
        sequencer.replenish(0).await.unwrap();

        sequencer.fast_forward(50).await.unwrap();
        sequencer.fast_forward(50).await.unwrap();

        let free = pool.free_nonces().unwrap();
        assert_eq!(free.first(), Some(&50));
        assert!(!pool.contains(49).unwrap());

        let ctx = sequencer.get_nonce().await.unwrap();
        assert_eq!(ctx.nonce(), 50);
        ctx.cancel().await.unwrap();
    }

    #[tokio::test]
    async fn replenish_is_idempotent_and_fills_gaps() {
        let pool = Arc::new(NoncePool::open_in_memory().unwrap());
        let sequencer = NonceSequencer::new(pool.clone());

        sequencer.replenish(10).await.unwrap();
        let before = pool.free_nonces().unwrap();
        assert_eq!(before.len() as u64, REPLENISH_SPAN);
        assert_eq!(before.first(), Some(&10));

        // consume a nonce in the middle; a replenish from the same point must
        // not resurrect it
        let ctx = sequencer.get_nonce().await.unwrap();
        assert_eq!(ctx.nonce(), 10);
        ctx.consume().await.unwrap();

        sequencer.replenish(11).await.unwrap();
        let after = pool.free_nonces().unwrap();
        assert!(!after.contains(&10));
        assert_eq!(after.first(), Some(&11));
    }

    #[tokio::test]
    async fn admission_blocks_until_a_reservation_settles() {
        let pool = Arc::new(NoncePool::open_in_memory().unwrap());
        let sequencer = NonceSequencer::with_concurrency(pool, 2);
        let first = sequencer.get_nonce().await.unwrap();
        let _second = sequencer.get_nonce().await.unwrap();

        let blocked = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            sequencer.get_nonce(),
        )
        .await;
        assert!(
            blocked.is_err(),
            "a reservation past the admission limit must wait"
        );

        let released = first.nonce();
        first.cancel().await.unwrap();
        let readmitted = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            sequencer.get_nonce(),
        )
        .await
        .expect("cancelling a reservation must admit a waiter")
        .unwrap();
        assert_eq!(readmitted.nonce(), released);
    }

    #[tokio::test]
    async fn consume_and_drop_release_admission_permits() {
        let pool = Arc::new(NoncePool::open_in_memory().unwrap());
        let sequencer = NonceSequencer::with_concurrency(pool, 1);

        let ctx = sequencer.get_nonce().await.unwrap();
        ctx.consume().await.unwrap();
        let ctx = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            sequencer.get_nonce(),
        )
        .await
        .expect("consuming a reservation must release its permit")
        .unwrap();

        drop(ctx);
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            sequencer.get_nonce(),
        )
        .await
        .expect("dropping a reservation must release its permit")
        .unwrap();
    }

    #[tokio::test]
    async fn concurrency_limit_is_clamped_to_the_hard_cap() {
        let pool = Arc::new(NoncePool::open_in_memory().unwrap());
        let sequencer = NonceSequencer::with_concurrency(pool, 1_000);
        assert_eq!(
            sequencer.limiter.available_permits(),
            MAX_CONCURRENT_REQUESTS
        );
    }

    #[tokio::test]
    async fn minting_resumes_above_replenished_range() {
        let pool = Arc::new(NoncePool::open_in_memory().unwrap());
        let sequencer = NonceSequencer::new(pool.clone());
        sequencer.replenish(0).await.unwrap();
        sequencer.fast_forward(REPLENISH_SPAN).await.unwrap();

        // pool is empty now; the next reservation mints from the cursor
        let ctx = sequencer.get_nonce().await.unwrap();
        assert_eq!(ctx.nonce(), REPLENISH_SPAN);
        ctx.cancel().await.unwrap();
    }
}
