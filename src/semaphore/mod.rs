//! The hybrid RT/BE priority semaphore.
//!
//! One coordinating mutex owns all mutable gate state.
//! The lock is held only across bookkeeping and heap surgery; a parked
//! `acquire` waits on a oneshot outside the lock, and `release` wakes it by
//! sending the granted pool class through that channel. `oneshot::Sender::
//! send` is synchronous and thread-safe, so releases may run on any runtime
//! thread without losing wake-ups.

mod aging;
mod clock;
mod gate;
mod preemption;
mod queue;
mod slots;

pub use gate::QueueStatus;
pub use slots::{HeldSlot, LeakReport, SlotClass};

use std::sync::Arc;

use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{GateConfig, RtSchedulingMode};
use crate::error::{AcquireError, ConfigError};
use clock::Clock;
use gate::GateState;
use queue::QueuedRequest;

/// Queue waits longer than this warn-log on the acquire path.
const LONG_WAIT_WARN_SECS: f64 = 10.0;

/// A granted slot: how long the caller was parked, and the id to pass back
/// to [`release`](HybridPrioritySemaphore::release).
#[derive(Debug, Clone, Copy)]
pub struct SlotGrant {
    /// Seconds spent queued; 0.0 for an immediate grant.
    pub wait_seconds: f64,
    pub slot_id: u64,
}

/// Hybrid RT/BE semaphore with reserved slots, aging, priority promotion,
/// cooperative preemption, and guaranteed bandwidth.
///
/// Cloning is cheap — clones share the same underlying state via Arc.
#[derive(Debug, Clone)]
pub struct HybridPrioritySemaphore {
    config: Arc<GateConfig>,
    clock: Clock,
    state: Arc<Mutex<GateState>>,
}

impl HybridPrioritySemaphore {
    pub fn new(config: GateConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        info!(
            total_slots = config.total_slots,
            rt_reserved = config.rt_reserved_slots,
            be_slots = config.be_slots(),
            aging_threshold = config.aging_threshold_secs,
            aging_boost = config.aging_boost,
            promotion_threshold = config.promotion_threshold_secs,
            preemption_enabled = config.preemption_enabled,
            preemption_wait_threshold = config.preemption_wait_threshold_secs,
            guaranteed_be_ratio = config.guaranteed_be_ratio,
            max_queue_depth = config.max_queue_depth,
            rt_scheduling_mode = ?config.rt_scheduling_mode,
            leak_threshold = config.leak_threshold_secs,
            "Hybrid priority semaphore initialized"
        );
        let state = GateState::new(&config);
        Ok(Self {
            config: Arc::new(config),
            clock: Clock::new(),
            state: Arc::new(Mutex::new(state)),
        })
    }

    /// Acquire a slot.
    ///
    /// Returns immediately when a slot is grantable for the class (including
    /// the cross-class fallbacks for degenerate reservations); otherwise the
    /// caller is parked on the matching queue until a release hands it a
    /// slot. Dropping the returned future while parked cancels the wait
    /// cleanly: the queue entry is purged and a wake that raced with the
    /// drop is re-deposited rather than lost.
    pub async fn acquire(&self, high_priority: bool) -> Result<SlotGrant, AcquireError> {
        let start = self.clock.now();

        let rx = {
            let mut state = self.state.lock().await;

            if self.config.max_queue_depth > 0 {
                let depth = state.queued_depth();
                if depth >= self.config.max_queue_depth
                    && !state.slot_available(&self.config, high_priority)
                {
                    warn!(
                        current_depth = depth,
                        max_queue_depth = self.config.max_queue_depth,
                        high_priority,
                        "Queue full, rejecting request"
                    );
                    return Err(AcquireError::QueueFull {
                        depth,
                        max: self.config.max_queue_depth,
                    });
                }
            }

            if let Some((granted, context)) = state.try_immediate(&self.config, high_priority) {
                state.last_wait_time = 0.0;
                let slot_id =
                    state
                        .tracker
                        .track(self.clock.now(), high_priority, granted, context);
                return Ok(SlotGrant {
                    wait_seconds: 0.0,
                    slot_id,
                });
            }

            // Blocked RT may ask the oldest running BE to step aside. The
            // slot is not freed synchronously; we still park below.
            if high_priority && self.config.preemption_enabled && state.active.has_preemptable_be()
            {
                info!(
                    active_requests = state.active.len(),
                    "RT request blocked, triggering preemption"
                );
                state.active.preempt_oldest_be(self.clock.now());
            }

            let (tx, rx) = oneshot::channel();
            let priority_score = aging::priority_score(&self.config, high_priority, 0.0);
            let enqueue_time =
                if high_priority && self.config.rt_scheduling_mode == RtSchedulingMode::Lifo {
                    -start
                } else {
                    start
                };
            let request = QueuedRequest {
                request_id: Uuid::new_v4(),
                priority_score,
                enqueue_time,
                high_priority,
                waker: tx,
            };
            if high_priority {
                state.rt_queue.push(request);
                info!(
                    queue_size = state.rt_queue.len(),
                    priority_score, "RT request queued"
                );
            } else {
                state.be_queue.push(request);
                info!(
                    queue_size = state.be_queue.len(),
                    priority_score, "BE request queued"
                );
            }
            rx
        };

        // Wait outside the lock.
        let mut parked = ParkedWaiter {
            state: Arc::clone(&self.state),
            config: Arc::clone(&self.config),
            rx,
            finished: false,
        };
        let granted = match (&mut parked.rx).await {
            Ok(class) => {
                parked.finished = true;
                class
            }
            Err(_) => {
                parked.finished = true;
                return Err(AcquireError::Cancelled);
            }
        };

        let wait_seconds = self.clock.now() - start;
        let slot_id = {
            let mut state = self.state.lock().await;
            state.last_wait_time = wait_seconds;
            state
                .tracker
                .track(self.clock.now(), high_priority, granted, "queued")
        };
        if wait_seconds > LONG_WAIT_WARN_SECS {
            warn!(
                wait_time_seconds = wait_seconds,
                high_priority, "Long queue wait detected"
            );
        }
        Ok(SlotGrant {
            wait_seconds,
            slot_id,
        })
    }

    /// Release a slot and wake the next waiter.
    ///
    /// `was_high_priority` is the class the caller originally requested; it
    /// drives the guaranteed-bandwidth accounting and the legacy
    /// oldest-match untracking. The pool-return destination comes from the
    /// accountant's own record of which pool the slot was drawn from.
    ///
    /// Never fails: releases run in guaranteed-exit paths, so bookkeeping
    /// inconsistencies are logged instead of raised.
    pub async fn release(&self, was_high_priority: bool, slot_id: Option<u64>) {
        let now = self.clock.now();
        let mut state = self.state.lock().await;

        let granted = match slot_id {
            Some(id) => match state.tracker.untrack(id) {
                Some(slot) => slot.granted,
                None => {
                    warn!(
                        slot_id = id,
                        "Release for unknown slot id, using caller-reported class"
                    );
                    SlotClass::from_priority(was_high_priority)
                }
            },
            None => match state.tracker.untrack_oldest(was_high_priority) {
                Some(slot) => slot.granted,
                None => {
                    warn!(
                        was_high_priority,
                        "Release with no tracked slot of matching class"
                    );
                    SlotClass::from_priority(was_high_priority)
                }
            },
        };

        state.apply_aging(&self.config, now);

        // Guaranteed bandwidth: count consecutive RT releases while BE
        // waits; past the ratio, the selection below is forced to BE.
        let mut force_be = false;
        if self.config.guaranteed_be_ratio > 0 && !state.be_queue.is_empty() && was_high_priority {
            state.consecutive_rt_releases += 1;
            if state.consecutive_rt_releases > self.config.guaranteed_be_ratio {
                force_be = true;
                info!(
                    consecutive_rt_releases = state.consecutive_rt_releases,
                    guaranteed_be_ratio = self.config.guaranteed_be_ratio,
                    be_queue_size = state.be_queue.len(),
                    "Guaranteed bandwidth triggered: forcing BE wake"
                );
            }
        }

        state.hand_off_or_return(&self.config, granted, force_be);
    }

    /// Publish that a request is executing work and can be asked to exit.
    /// Call after `acquire` succeeds, before the work starts.
    pub async fn register_active_request(
        &self,
        task_id: &str,
        cancel: CancellationToken,
        high_priority: bool,
    ) {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        state.active.register(task_id, cancel, now, high_priority);
    }

    /// Remove a request from the preemption registry. Call in the same
    /// guaranteed-exit block as `release`, before it.
    pub async fn unregister_active_request(&self, task_id: &str) {
        let mut state = self.state.lock().await;
        state.active.unregister(task_id);
    }

    /// Consistent snapshot of queue depths and availability.
    pub async fn queue_status(&self) -> QueueStatus {
        let state = self.state.lock().await;
        state.status(&self.config)
    }

    /// Scan held slots for potential leaks. Observational: nothing is
    /// released.
    pub async fn check_leaks(&self) -> Vec<LeakReport> {
        let now = self.clock.now();
        let state = self.state.lock().await;
        state.tracker.leaks(now, self.config.leak_threshold_secs)
    }

    /// Queue wait observed by the most recent successful acquire, in
    /// seconds. Telemetry only.
    pub async fn last_wait_time(&self) -> f64 {
        self.state.lock().await.last_wait_time
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }
}

/// Guard for a parked acquire.
///
/// If the acquire future is dropped before the wake is observed, the guard
/// purges dead entries from the queues and, when a wake raced with the
/// drop, re-deposits the handed-off slot so it is not lost.
struct ParkedWaiter {
    state: Arc<Mutex<GateState>>,
    config: Arc<GateConfig>,
    rx: oneshot::Receiver<SlotClass>,
    finished: bool,
}

impl Drop for ParkedWaiter {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let salvaged = self.rx.try_recv().ok();
        let state = Arc::clone(&self.state);
        let config = Arc::clone(&self.config);
        // Cleanup needs the async lock; spawn it since drop can't await.
        tokio::spawn(async move {
            let mut state = state.lock().await;
            state.purge_cancelled();
            if let Some(granted) = salvaged {
                info!(granted = ?granted, "Waiter cancelled after wake, re-depositing slot");
                state.hand_off_or_return(&config, granted, false);
            }
        });
    }
}
