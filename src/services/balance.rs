use crate::payments::error::PaymentResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

/// Where the authoritative credit balance lives.
#[async_trait]
pub trait BalanceSource: Send + Sync {
    async fn fetch_balance(&self) -> PaymentResult<u64>;
}

/// Caches the user's credit balance between refreshes.
pub struct BalanceService {
    source: Arc<dyn BalanceSource>,
    cached: AtomicU64,
    last_updated: RwLock<Option<DateTime<Utc>>>,
}

impl BalanceService {
    pub fn new(source: Arc<dyn BalanceSource>) -> Self {
        Self::with_initial(source, 0)
    }

    pub fn with_initial(source: Arc<dyn BalanceSource>, initial: u64) -> Self {
        Self {
            source,
            cached: AtomicU64::new(initial),
            last_updated: RwLock::new(None),
        }
    }

    /// Fetches the balance from the backend and updates the cache. On failure
    /// the cached value is left untouched.
    pub async fn refresh(&self) -> PaymentResult<u64> {
        match self.source.fetch_balance().await {
            Ok(credits) => {
                let previous = self.cached.swap(credits, Ordering::SeqCst);
                *self
                    .last_updated
                    .write()
                    .unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
                debug!(previous, credits, "credit balance refreshed");
                Ok(credits)
            }
            Err(e) => {
                warn!(error = %e, cached = self.current(), "credit balance refresh failed");
                Err(e)
            }
        }
    }

    /// Last value seen by [`refresh`](Self::refresh).
    pub fn current(&self) -> u64 {
        self.cached.load(Ordering::SeqCst)
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        *self
            .last_updated
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
