use std::{
    sync::Arc,
    time::{
        Duration,
        Instant,
    },
};

use ethers::types::U256;
use tokio::sync::Mutex;
use tracing::warn;

use crate::client::ChainClient;

/// How long a fetched gas price stays fresh.
const PRICE_TTL: Duration = Duration::from_millis(250);
/// Safety margin added on top of the node's suggested price.
const PRICE_BUFFER_PERCENT: u64 = 10;

/// Fallback price when the node cannot be reached: 10 gwei.
pub const DEFAULT_FALLBACK_PRICE_WEI: u64 = 10_000_000_000;

/// A caching gas price oracle.
///
/// Refreshes from the node at most every [`PRICE_TTL`]; concurrent callers
/// during a refresh wait for the single in-flight fetch instead of issuing
/// their own. A failed refresh falls back to a fixed price so submission can
/// continue through transient RPC outages.
pub struct GasOracle<C> {
    client: Arc<C>,
    fallback_price: U256,
    cached: Mutex<Cached>,
}

struct Cached {
    updated_at: Option<Instant>,
    price: U256,
}

impl<C: ChainClient> GasOracle<C> {
    pub fn new(client: Arc<C>, fallback_price: U256) -> Self {
        Self {
            client,
            fallback_price,
            cached: Mutex::new(Cached {
                updated_at: None,
                price: U256::zero(),
            }),
        }
    }

    /// Returns the buffered gas price, refreshing the cache if it is stale.
    pub async fn gas_price(&self) -> U256 {
        let mut cached = self.cached.lock().await;
        if let Some(updated_at) = cached.updated_at {
            if updated_at.elapsed() < PRICE_TTL {
                return cached.price;
            }
        }
        let price = match self.client.gas_price().await {
            Ok(price) => with_buffer(price),
            Err(error) => {
                warn!(
                    error = AsRef::<dyn std::error::Error>::as_ref(&error),
                    fallback_price = %self.fallback_price,
                    "failed fetching gas price; falling back to fixed price"
                );
                self.fallback_price
            }
        };
        cached.updated_at = Some(Instant::now());
        cached.price = price;
        price
    }
}

fn with_buffer(price: U256) -> U256 {
    price.saturating_add(price / PRICE_BUFFER_PERCENT)
}
