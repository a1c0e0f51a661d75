use serde::Serialize;
use tracing::{debug, info};

use super::aging::{self, AgingOutcome};
use super::preemption::ActiveRequests;
use super::queue::WaitQueue;
use super::slots::{SlotClass, SlotTracker};
use crate::config::GateConfig;

/// Point-in-time view of the gate, taken under the coordinating lock.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub rt_queue: usize,
    pub be_queue: usize,
    pub total_slots: u32,
    pub available_slots: u32,
    pub accepting: bool,
    pub max_queue_depth: usize,
    pub acquired_slots: usize,
}

/// All mutable gate state. Every transition happens with this struct behind
/// the semaphore's single mutex; nothing here suspends.
#[derive(Debug)]
pub(crate) struct GateState {
    pub rt_available: u32,
    pub be_available: u32,
    pub rt_queue: WaitQueue,
    pub be_queue: WaitQueue,
    pub active: ActiveRequests,
    pub tracker: SlotTracker,
    pub consecutive_rt_releases: u32,
    pub last_wait_time: f64,
}

impl GateState {
    pub fn new(config: &GateConfig) -> Self {
        Self {
            rt_available: config.rt_reserved_slots,
            be_available: config.be_slots(),
            rt_queue: WaitQueue::new(),
            be_queue: WaitQueue::new(),
            active: ActiveRequests::default(),
            tracker: SlotTracker::default(),
            consecutive_rt_releases: 0,
            last_wait_time: 0.0,
        }
    }

    pub fn queued_depth(&self) -> usize {
        self.rt_queue.len() + self.be_queue.len()
    }

    /// Whether a slot could be granted right now for the given class,
    /// counting the cross-class fallbacks.
    pub fn slot_available(&self, config: &GateConfig, high_priority: bool) -> bool {
        if high_priority {
            self.rt_available > 0 || (config.rt_reserved_slots == 0 && self.be_available > 0)
        } else {
            self.be_available > 0 || (config.be_slots() == 0 && self.rt_available > 0)
        }
    }

    /// The immediate-grant fast paths. On success returns the pool class the
    /// slot was drawn from and the context tag for the accountant.
    pub fn try_immediate(
        &mut self,
        config: &GateConfig,
        high_priority: bool,
    ) -> Option<(SlotClass, &'static str)> {
        if high_priority {
            if self.rt_available > 0 {
                self.rt_available -= 1;
                debug!(rt_available = self.rt_available, "RT slot acquired immediately");
                return Some((SlotClass::RealTime, "rt_immediate"));
            }
            // No reservation configured: RT may draw from the BE pool.
            if config.rt_reserved_slots == 0 && self.be_available > 0 {
                self.be_available -= 1;
                debug!(
                    be_available = self.be_available,
                    "High priority acquired BE slot (no RT reserved)"
                );
                return Some((SlotClass::BestEffort, "hp_be_fallback"));
            }
        } else {
            if self.be_available > 0 {
                self.be_available -= 1;
                debug!(be_available = self.be_available, "BE slot acquired immediately");
                return Some((SlotClass::BestEffort, "be_immediate"));
            }
            // Every slot RT-reserved: without this path BE would deadlock.
            if config.be_slots() == 0 && self.rt_available > 0 {
                self.rt_available -= 1;
                debug!(
                    rt_available = self.rt_available,
                    "Low priority acquired RT slot (no BE slots configured)"
                );
                return Some((SlotClass::RealTime, "lp_rt_fallback"));
            }
        }
        None
    }

    /// Return a slot to the pool it was drawn from, clamped to the pool cap.
    pub fn return_to_pool(&mut self, config: &GateConfig, class: SlotClass) {
        match class {
            SlotClass::RealTime => {
                self.rt_available = (self.rt_available + 1).min(config.rt_reserved_slots);
            }
            SlotClass::BestEffort => {
                self.be_available = (self.be_available + 1).min(config.be_slots());
            }
        }
    }

    /// Recompute BE scores and migrate promoted entries into the RT queue.
    pub fn apply_aging(&mut self, config: &GateConfig, now: f64) -> AgingOutcome {
        aging::apply_aging(config, now, &mut self.rt_queue, &mut self.be_queue)
    }

    /// Pop waiters from `queue` until one accepts the handed-off slot.
    /// Entries whose receiver is gone are discarded.
    fn wake_one(queue: &mut WaitQueue, granted: SlotClass) -> bool {
        while let Some(request) = queue.pop() {
            match request.waker.send(granted) {
                Ok(()) => {
                    debug!(request_id = %request.request_id, "Woke parked waiter");
                    return true;
                }
                // Waiter cancelled while parked; try the next entry.
                Err(_) => continue,
            }
        }
        false
    }

    /// Selection step of a release: hand the freed slot to the next eligible
    /// waiter, or return it to its pool. `force_be` comes from the
    /// guaranteed-bandwidth counter.
    pub fn hand_off_or_return(&mut self, config: &GateConfig, granted: SlotClass, force_be: bool) {
        if force_be && Self::wake_one(&mut self.be_queue, granted) {
            self.consecutive_rt_releases = 0;
            debug!("Woke BE waiter (guaranteed bandwidth)");
            return;
        }
        if Self::wake_one(&mut self.rt_queue, granted) {
            debug!("Woke RT waiter");
            return;
        }
        if Self::wake_one(&mut self.be_queue, granted) {
            self.consecutive_rt_releases = 0;
            debug!("Woke BE waiter");
            return;
        }
        self.return_to_pool(config, granted);
    }

    /// Drop queue entries whose waiter has gone away.
    pub fn purge_cancelled(&mut self) {
        let purged = self.rt_queue.purge_closed() + self.be_queue.purge_closed();
        if purged > 0 {
            info!(
                purged,
                rt_queue_size = self.rt_queue.len(),
                be_queue_size = self.be_queue.len(),
                "Purged cancelled requests from queues"
            );
        }
    }

    pub fn status(&self, config: &GateConfig) -> QueueStatus {
        let available = self.rt_available + self.be_available;
        let depth = self.queued_depth();
        let accepting =
            config.max_queue_depth == 0 || depth < config.max_queue_depth || available > 0;
        QueueStatus {
            rt_queue: self.rt_queue.len(),
            be_queue: self.be_queue.len(),
            total_slots: config.total_slots,
            available_slots: available,
            accepting,
            max_queue_depth: config.max_queue_depth,
            acquired_slots: self.tracker.held_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::queue::QueuedRequest;
    use super::*;
    use tokio::sync::oneshot;
    use uuid::Uuid;

    fn config(total: u32, rt_reserved: u32) -> GateConfig {
        GateConfig {
            total_slots: total,
            rt_reserved_slots: rt_reserved,
            ..GateConfig::default()
        }
    }

    fn park(
        queue: &mut WaitQueue,
        score: f64,
        enqueue_time: f64,
        high_priority: bool,
    ) -> oneshot::Receiver<SlotClass> {
        let (tx, rx) = oneshot::channel();
        queue.push(QueuedRequest {
            request_id: Uuid::new_v4(),
            priority_score: score,
            enqueue_time,
            high_priority,
            waker: tx,
        });
        rx
    }

    #[test]
    fn rt_fast_path_decrements_reserved_pool() {
        let cfg = config(2, 1);
        let mut state = GateState::new(&cfg);

        let (class, context) = state.try_immediate(&cfg, true).unwrap();
        assert_eq!(class, SlotClass::RealTime);
        assert_eq!(context, "rt_immediate");
        assert_eq!(state.rt_available, 0);
        assert_eq!(state.be_available, 1);

        // RT pool exhausted and a reservation exists: no fallback.
        assert!(state.try_immediate(&cfg, true).is_none());
    }

    #[test]
    fn be_fast_path_decrements_be_pool() {
        let cfg = config(2, 1);
        let mut state = GateState::new(&cfg);

        let (class, context) = state.try_immediate(&cfg, false).unwrap();
        assert_eq!(class, SlotClass::BestEffort);
        assert_eq!(context, "be_immediate");
        assert_eq!(state.be_available, 0);
        assert!(state.try_immediate(&cfg, false).is_none());
    }

    #[test]
    fn rt_falls_back_to_be_pool_when_no_reservation() {
        let cfg = config(2, 0);
        let mut state = GateState::new(&cfg);

        let (class, context) = state.try_immediate(&cfg, true).unwrap();
        assert_eq!(class, SlotClass::BestEffort);
        assert_eq!(context, "hp_be_fallback");
        assert_eq!(state.be_available, 1);
    }

    #[test]
    fn be_falls_back_to_rt_pool_when_fully_reserved() {
        let cfg = config(2, 2);
        let mut state = GateState::new(&cfg);

        let (class, context) = state.try_immediate(&cfg, false).unwrap();
        assert_eq!(class, SlotClass::RealTime);
        assert_eq!(context, "lp_rt_fallback");
        assert_eq!(state.rt_available, 1);
    }

    #[test]
    fn slot_available_counts_fallbacks() {
        let cfg = config(2, 0);
        let state = GateState::new(&cfg);
        assert!(state.slot_available(&cfg, true));

        let cfg_full = config(2, 2);
        let state_full = GateState::new(&cfg_full);
        assert!(state_full.slot_available(&cfg_full, false));
    }

    #[test]
    fn return_to_pool_is_clamped() {
        let cfg = config(2, 1);
        let mut state = GateState::new(&cfg);

        state.return_to_pool(&cfg, SlotClass::RealTime);
        assert_eq!(state.rt_available, 1);
        state.return_to_pool(&cfg, SlotClass::BestEffort);
        assert_eq!(state.be_available, 1);
    }

    #[test]
    fn hand_off_prefers_rt_waiters() {
        let cfg = config(1, 1);
        let mut state = GateState::new(&cfg);

        let mut be_rx = park(&mut state.be_queue, 1.0, 1.0, false);
        let mut rt_rx = park(&mut state.rt_queue, 0.0, 2.0, true);

        state.hand_off_or_return(&cfg, SlotClass::RealTime, false);
        assert_eq!(rt_rx.try_recv().unwrap(), SlotClass::RealTime);
        assert!(be_rx.try_recv().is_err());
    }

    #[test]
    fn forced_be_skips_rt_waiters_and_resets_counter() {
        let cfg = config(1, 1);
        let mut state = GateState::new(&cfg);
        state.consecutive_rt_releases = 6;

        let mut be_rx = park(&mut state.be_queue, 1.0, 1.0, false);
        let mut rt_rx = park(&mut state.rt_queue, 0.0, 2.0, true);

        state.hand_off_or_return(&cfg, SlotClass::RealTime, true);
        assert_eq!(be_rx.try_recv().unwrap(), SlotClass::RealTime);
        assert!(rt_rx.try_recv().is_err());
        assert_eq!(state.consecutive_rt_releases, 0);
    }

    #[test]
    fn hand_off_skips_dead_waiters() {
        let cfg = config(1, 1);
        let mut state = GateState::new(&cfg);

        let dead_rx = park(&mut state.rt_queue, 0.0, 1.0, true);
        let mut live_rx = park(&mut state.rt_queue, 0.0, 2.0, true);
        drop(dead_rx);

        state.hand_off_or_return(&cfg, SlotClass::RealTime, false);
        assert_eq!(live_rx.try_recv().unwrap(), SlotClass::RealTime);
        assert!(state.rt_queue.is_empty());
    }

    #[test]
    fn hand_off_without_waiters_refills_pool() {
        let cfg = config(1, 1);
        let mut state = GateState::new(&cfg);
        state.rt_available = 0;

        state.hand_off_or_return(&cfg, SlotClass::RealTime, false);
        assert_eq!(state.rt_available, 1);
    }

    #[test]
    fn status_reflects_depth_cap() {
        let cfg = GateConfig {
            max_queue_depth: 1,
            ..config(1, 1)
        };
        let mut state = GateState::new(&cfg);
        state.rt_available = 0;

        let _rx = park(&mut state.rt_queue, 0.0, 1.0, true);
        let status = state.status(&cfg);
        assert_eq!(status.rt_queue, 1);
        assert_eq!(status.available_slots, 0);
        assert!(!status.accepting);
    }

    #[test]
    fn status_accepts_while_under_cap() {
        let cfg = GateConfig {
            max_queue_depth: 4,
            ..config(2, 1)
        };
        let state = GateState::new(&cfg);
        let status = state.status(&cfg);
        assert!(status.accepting);
        assert_eq!(status.available_slots, 2);
        assert_eq!(status.acquired_slots, 0);
    }
}
