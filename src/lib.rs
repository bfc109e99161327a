//! buildwright library
//!
//! Kubernetes controller that turns BuildRequests into image builds and
//! rebuilds them when a watched repository receives a push.
//! It can be used both as a binary and as a library for testing.

pub mod cli;
pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod kube;
pub mod models;
pub mod providers;
pub mod store;
pub mod webhook;

// Re-export commonly used types for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::{ControllerSettings, ReconcileOutcome, Reconciler, TriggerPolicy};
pub use error::BuildError;
pub use store::{KubeStore, MemoryStore, RetryPolicy, Store, StoreError};
