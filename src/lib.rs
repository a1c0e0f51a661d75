//! Admission control for LLM inference slots.
//!
//! An inference backend exposes a small, fixed number of concurrent
//! execution slots. Interactive streaming requests need one of those slots
//! quickly or their time-to-first-token suffers; batch requests can wait,
//! but must not wait forever. [`HybridPrioritySemaphore`] arbitrates between
//! the two classes:
//!
//! - slots reserved for real-time (RT) traffic,
//! - aging and promotion so parked best-effort (BE) work gains priority over
//!   time instead of starving,
//! - cooperative preemption signals asking running BE work to step aside
//!   when RT is blocked,
//! - guaranteed bandwidth forcing BE progress under continuous RT load,
//! - bounded queueing with back-pressure, and
//! - held-slot tracking with leak detection.
//!
//! The semaphore is a library component: callers `acquire` before invoking
//! the model and `release` in a guaranteed-exit block afterwards. Telemetry
//! is emitted through `tracing`; wiring a subscriber is the embedding
//! application's job.

pub mod config;
pub mod error;
pub mod semaphore;

pub use config::{GateConfig, RtSchedulingMode};
pub use error::{AcquireError, ConfigError};
pub use semaphore::{
    HeldSlot, HybridPrioritySemaphore, LeakReport, QueueStatus, SlotClass, SlotGrant,
};
