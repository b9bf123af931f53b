//! Storage Engine with Per-Key Expiry
//!
//! The engine owns two maps that always change together:
//!
//! - the **key space**: `key -> value`
//! - the **expiry index**: `key -> pending timer`
//!
//! A key has an expiry index entry exactly while it was set with a timeout
//! that has neither fired nor been replaced by a later SET.
//!
//! ## Concurrency Model
//!
//! Connections run as tasks on a multi-threaded runtime, so both maps sit
//! behind one engine-wide `Mutex`. Every operation, including a timer firing,
//! takes the lock once and runs to completion under it. That gives the same
//! atomicity as a single-threaded event loop: a SET on a key and the firing
//! of that key's timer never interleave.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                StorageEngine                 │
//! │  ┌────────────────────────────────────────┐  │
//! │  │          Mutex<Keyspace>               │  │
//! │  │  data:     HashMap<Bytes, Bytes>       │  │
//! │  │  timeouts: HashMap<Bytes, Pending>     │  │
//! │  └────────────────────────────────────────┘  │
//! └──────────────────────┬───────────────────────┘
//!                        │ schedule / cancel
//!                        ▼
//!                 ┌─────────────┐
//!                 │ TimerService│
//!                 └─────────────┘
//! ```
//!
//! ## Stale Timers
//!
//! Every scheduled timer gets a fresh id that is stored in its expiry index
//! entry. When a timer fires it deletes the key only if the index still holds
//! that same id. A timer that lost the race against a SET (it woke up but the
//! SET took the lock first) therefore finds a different id, or none, and does
//! nothing.

use crate::storage::expiry::{TimerHandle, TimerService, TokioTimers};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tracing::{debug, trace};

/// Identity and statistics supplied by the hosting server, merged into INFO.
pub trait ServerInfo: Send + Sync {
    /// Ordered `(field, value)` pairs.
    fn info(&self) -> Vec<(String, String)>;
}

/// An expiry index entry: the timer plus the id it was scheduled with.
#[derive(Debug)]
struct PendingExpiry {
    id: u64,
    timer: TimerHandle,
}

#[derive(Debug, Default)]
struct Keyspace {
    data: HashMap<Bytes, Bytes>,
    timeouts: HashMap<Bytes, PendingExpiry>,
    next_timer_id: u64,
    expired: u64,
}

impl Keyspace {
    /// Cancels and forgets the pending timer for `key`, if any.
    fn cancel_expiry(&mut self, key: &[u8]) -> bool {
        match self.timeouts.remove(key) {
            Some(mut pending) => {
                pending.timer.cancel();
                true
            }
            None => false,
        }
    }

    /// Timer callback body. Removes `key` only if `id` is still current.
    fn expire(&mut self, key: &Bytes, id: u64) -> bool {
        match self.timeouts.get(key) {
            Some(pending) if pending.id == id => {
                self.timeouts.remove(key);
                self.data.remove(key);
                self.expired += 1;
                true
            }
            _ => false,
        }
    }
}

/// Point-in-time counters for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageStats {
    /// Live keys
    pub keys: u64,
    /// Keys with a pending expiry timer
    pub timeouts: u64,
    /// Keys removed by timers since startup
    pub expired: u64,
}

/// The shared key-value store.
///
/// Created once per server and shared by every connection through an `Arc`.
///
/// # Example
///
/// ```
/// use pulsekv::server::ServerMetadata;
/// use pulsekv::storage::StorageEngine;
/// use bytes::Bytes;
/// use std::sync::Arc;
///
/// let engine = StorageEngine::new(Arc::new(ServerMetadata::default()));
/// engine.set(Bytes::from("name"), Bytes::from("Ariz"), None);
/// assert_eq!(engine.get(b"name"), Some(Bytes::from("Ariz")));
/// ```
pub struct StorageEngine {
    keyspace: Arc<Mutex<Keyspace>>,
    timers: Arc<dyn TimerService>,
    server: Arc<dyn ServerInfo>,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("StorageEngine")
            .field("keys", &stats.keys)
            .field("timeouts", &stats.timeouts)
            .finish()
    }
}

impl StorageEngine {
    /// Creates an engine whose timers run on the ambient Tokio runtime.
    pub fn new(server: Arc<dyn ServerInfo>) -> Self {
        Self::with_timers(Arc::new(TokioTimers), server)
    }

    /// Creates an engine on an explicit timer facility.
    pub fn with_timers(timers: Arc<dyn TimerService>, server: Arc<dyn ServerInfo>) -> Self {
        Self {
            keyspace: Arc::new(Mutex::new(Keyspace::default())),
            timers,
            server,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Keyspace> {
        lock_keyspace(&self.keyspace)
    }

    /// Stores `value` under `key`.
    ///
    /// With `Some(ttl)` the key is (re)scheduled to expire after `ttl`, any
    /// earlier timer being cancelled first. With `None` any pending timer is
    /// cancelled and the key becomes persistent.
    pub fn set(&self, key: Bytes, value: Bytes, ttl: Option<Duration>) {
        let mut keyspace = self.lock();
        match ttl {
            Some(ttl) => self.schedule_expiry(&mut keyspace, key.clone(), ttl),
            None => {
                if keyspace.cancel_expiry(&key) {
                    trace!(key = ?key, "Timeout cleared");
                }
            }
        }
        keyspace.data.insert(key, value);
    }

    /// Looks up a single key.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.lock().data.get(key).cloned()
    }

    /// Looks up several keys under one lock, preserving request order.
    pub fn get_many<K: AsRef<[u8]>>(&self, keys: &[K]) -> Vec<Option<Bytes>> {
        let keyspace = self.lock();
        keys.iter()
            .map(|k| keyspace.data.get(k.as_ref()).cloned())
            .collect()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.lock().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().data.is_empty()
    }

    /// Number of keys carrying a pending expiry timer.
    pub fn pending_expiries(&self) -> usize {
        self.lock().timeouts.len()
    }

    /// Whether `key` currently has a pending expiry timer.
    pub fn has_expiry(&self, key: &[u8]) -> bool {
        self.lock().timeouts.contains_key(key)
    }

    pub fn stats(&self) -> StorageStats {
        let keyspace = self.lock();
        StorageStats {
            keys: keyspace.data.len() as u64,
            timeouts: keyspace.timeouts.len() as u64,
            expired: keyspace.expired,
        }
    }

    /// Server metadata followed by the store's own counters.
    pub fn info(&self) -> Vec<(String, String)> {
        let mut info = self.server.info();
        let stats = self.stats();
        info.push(("keys".to_string(), stats.keys.to_string()));
        info.push(("timeouts".to_string(), stats.timeouts.to_string()));
        info.push(("expired_keys".to_string(), stats.expired.to_string()));
        info
    }

    /// Replaces any timer for `key` with a new one firing after `ttl`.
    ///
    /// Called with the keyspace lock held; the timer service only queues the
    /// callback, which takes the lock itself when it runs.
    fn schedule_expiry(&self, keyspace: &mut Keyspace, key: Bytes, ttl: Duration) {
        keyspace.cancel_expiry(&key);

        let id = keyspace.next_timer_id;
        keyspace.next_timer_id += 1;

        let weak: Weak<Mutex<Keyspace>> = Arc::downgrade(&self.keyspace);
        let timer_key = key.clone();
        let timer = self.timers.schedule(
            ttl,
            Box::new(move || {
                // Engine already dropped
                let Some(keyspace) = weak.upgrade() else {
                    return;
                };
                if lock_keyspace(&keyspace).expire(&timer_key, id) {
                    debug!(key = ?timer_key, "Key expired");
                }
            }),
        );

        keyspace.timeouts.insert(key, PendingExpiry { id, timer });
    }
}

fn lock_keyspace(keyspace: &Mutex<Keyspace>) -> MutexGuard<'_, Keyspace> {
    keyspace.lock().unwrap_or_else(PoisonError::into_inner)
}
