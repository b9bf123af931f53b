//! Storage Engine Module
//!
//! The in-memory key space plus its expiry index, and the timer facility
//! that drives per-key expiration.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                StorageEngine                │
//! │   key space  +  expiry index (one Mutex)    │
//! └──────────────────────┬──────────────────────┘
//!                        │ one-shot timer per key
//!                        ▼
//!            ┌────────────────────────┐
//!            │  TimerService          │
//!            │  (TokioTimers: spawned │
//!            │   sleep + AbortHandle) │
//!            └────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use pulsekv::server::ServerMetadata;
//! use pulsekv::storage::StorageEngine;
//! use bytes::Bytes;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let engine = StorageEngine::new(Arc::new(ServerMetadata::default()));
//!
//! engine.set(Bytes::from("session"), Bytes::from("token"), Some(Duration::from_secs(60)));
//! assert_eq!(engine.pending_expiries(), 1);
//!
//! // Overwriting without a timeout makes the key persistent again
//! engine.set(Bytes::from("session"), Bytes::from("token2"), None);
//! assert_eq!(engine.pending_expiries(), 0);
//! # }
//! ```

pub mod engine;
pub mod expiry;

pub use engine::{ServerInfo, StorageEngine, StorageStats};
pub use expiry::{TimerCallback, TimerHandle, TimerService, TokioTimers};
