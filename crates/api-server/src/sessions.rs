//! Session carts keyed by session id, bounded by idle time and count.

use dashmap::DashMap;
use funnel_core::memory::InMemoryCart;
use funnel_core::Catalog;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

struct SessionCart {
    cart: InMemoryCart,
    touched: Instant,
    /// Monotonic use counter, orders sessions for eviction.
    last_use: u64,
}

pub struct SessionStore {
    carts: DashMap<String, SessionCart>,
    catalog: Arc<dyn Catalog>,
    max_sessions: usize,
    ttl: Duration,
    clock: AtomicU64,
}

impl SessionStore {
    pub fn new(catalog: Arc<dyn Catalog>, max_sessions: usize, ttl: Duration) -> Self {
        Self {
            carts: DashMap::new(),
            catalog,
            max_sessions: max_sessions.max(1),
            ttl,
            clock: AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.carts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.carts.is_empty()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.carts.contains_key(session_id)
    }

    /// Runs `f` against the session's cart, creating the cart on first use.
    pub fn with_cart<R>(&self, session_id: &str, f: impl FnOnce(&mut InMemoryCart) -> R) -> R {
        if !self.carts.contains_key(session_id) {
            self.make_room();
        }
        let last_use = self.clock.fetch_add(1, Ordering::Relaxed);
        let mut entry = self
            .carts
            .entry(session_id.to_string())
            .or_insert_with(|| SessionCart {
                cart: InMemoryCart::new(self.catalog.clone()),
                touched: Instant::now(),
                last_use,
            });
        entry.touched = Instant::now();
        entry.last_use = last_use;
        f(&mut entry.cart)
    }

    /// Drops carts idle for longer than the TTL. Returns how many went.
    pub fn sweep_expired(&self) -> usize {
        let before = self.carts.len();
        let now = Instant::now();
        self.carts
            .retain(|_, session| now.duration_since(session.touched) < self.ttl);
        let removed = before.saturating_sub(self.carts.len());
        if removed > 0 {
            debug!(removed, remaining = self.carts.len(), "Expired session carts dropped");
            metrics::counter!("api.sessions.expired").increment(removed as u64);
        }
        removed
    }

    fn make_room(&self) {
        if self.carts.len() < self.max_sessions {
            return;
        }
        self.sweep_expired();
        while self.carts.len() >= self.max_sessions {
            let oldest = self
                .carts
                .iter()
                .min_by_key(|entry| entry.last_use)
                .map(|entry| entry.key().clone());
            let Some(session_id) = oldest else { break };
            self.carts.remove(&session_id);
            debug!(session_id = %session_id, "Least recently used session cart evicted");
            metrics::counter!("api.sessions.evicted").increment(1);
        }
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("sessions", &self.carts.len())
            .field("max_sessions", &self.max_sessions)
            .field("ttl", &self.ttl)
            .finish()
    }
}
