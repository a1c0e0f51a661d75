use tracing::{debug, info, warn};

use super::queue::WaitQueue;
use crate::config::GateConfig;

/// Score below which an aged BE request cannot fall. Only promotion into
/// the RT queue grants true RT priority.
const AGED_SCORE_FLOOR: f64 = 0.1;

/// Compute the scheduling score for a request that has been waiting
/// `waited_secs`. Lower is better.
///
/// RT requests always score 0.0. BE requests start at 1.0 and decay toward
/// the 0.1 floor once their wait passes the aging threshold; at the
/// promotion threshold the score collapses to 0.0 (RT level).
pub(crate) fn priority_score(config: &GateConfig, high_priority: bool, waited_secs: f64) -> f64 {
    if high_priority {
        return 0.0;
    }
    if waited_secs >= config.promotion_threshold_secs {
        return 0.0;
    }
    if waited_secs >= config.aging_threshold_secs {
        let boost = (waited_secs - config.aging_threshold_secs) * config.aging_boost / 60.0;
        return (1.0 - boost).max(AGED_SCORE_FLOOR);
    }
    1.0
}

/// Outcome of one aging pass, for logging and tests.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct AgingOutcome {
    pub promoted: usize,
    pub purged: usize,
}

/// Rebuild the BE queue with recomputed scores. Entries whose wait crossed
/// the promotion threshold move into the RT queue permanently; entries
/// whose waiter has gone away are dropped.
///
/// Applied only on release: selection happens right after, so scores are
/// always fresh where they matter.
pub(crate) fn apply_aging(
    config: &GateConfig,
    now: f64,
    rt_queue: &mut WaitQueue,
    be_queue: &mut WaitQueue,
) -> AgingOutcome {
    let mut outcome = AgingOutcome::default();
    if be_queue.is_empty() {
        return outcome;
    }

    for mut request in be_queue.drain() {
        if request.waker.is_closed() {
            outcome.purged += 1;
            continue;
        }

        let waited = now - request.enqueue_time;
        if waited >= config.promotion_threshold_secs {
            request.priority_score = 0.0;
            request.high_priority = true;
            warn!(
                request_id = %request.request_id,
                wait_time_seconds = waited,
                promotion_threshold = config.promotion_threshold_secs,
                "BE request promoted to RT queue due to long wait"
            );
            rt_queue.push(request);
            outcome.promoted += 1;
        } else {
            let new_score = priority_score(config, false, waited);
            if (new_score - request.priority_score).abs() > f64::EPSILON {
                debug!(
                    request_id = %request.request_id,
                    old_score = request.priority_score,
                    new_score,
                    wait_time_seconds = waited,
                    "Aging applied to BE request"
                );
            }
            request.priority_score = new_score;
            be_queue.push(request);
        }
    }

    if outcome.purged > 0 {
        info!(
            purged = outcome.purged,
            "Purged cancelled waiters during aging pass"
        );
    }
    if outcome.promoted > 0 {
        info!(
            promoted = outcome.promoted,
            remaining_be_queue = be_queue.len(),
            rt_queue = rt_queue.len(),
            "BE requests promoted to RT queue"
        );
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::super::queue::QueuedRequest;
    use super::super::slots::SlotClass;
    use super::*;
    use tokio::sync::oneshot;
    use uuid::Uuid;

    fn config() -> GateConfig {
        GateConfig {
            aging_threshold_secs: 60.0,
            aging_boost: 0.5,
            promotion_threshold_secs: 600.0,
            ..GateConfig::default()
        }
    }

    fn be_request(enqueue_time: f64) -> (QueuedRequest, oneshot::Receiver<SlotClass>) {
        let (tx, rx) = oneshot::channel();
        let request = QueuedRequest {
            request_id: Uuid::new_v4(),
            priority_score: 1.0,
            enqueue_time,
            high_priority: false,
            waker: tx,
        };
        (request, rx)
    }

    #[test]
    fn rt_always_scores_zero() {
        let cfg = config();
        assert_eq!(priority_score(&cfg, true, 0.0), 0.0);
        assert_eq!(priority_score(&cfg, true, 10_000.0), 0.0);
    }

    #[test]
    fn fresh_be_scores_one() {
        let cfg = config();
        assert_eq!(priority_score(&cfg, false, 0.0), 1.0);
        assert_eq!(priority_score(&cfg, false, 59.9), 1.0);
    }

    #[test]
    fn aged_be_decays_gradually() {
        let cfg = config();
        // 120s waited = 60s past the threshold: boost = 60 * 0.5 / 60 = 0.5
        let score = priority_score(&cfg, false, 120.0);
        assert!((score - 0.5).abs() < 1e-9);
        // Still above a fresh RT request.
        assert!(score > 0.0);
    }

    #[test]
    fn aged_be_never_falls_below_floor() {
        let cfg = config();
        let score = priority_score(&cfg, false, 599.0);
        assert!((score - 0.1).abs() < 1e-9);
    }

    #[test]
    fn promotion_threshold_collapses_score() {
        let cfg = config();
        assert_eq!(priority_score(&cfg, false, 600.0), 0.0);
        assert_eq!(priority_score(&cfg, false, 10_000.0), 0.0);
    }

    #[test]
    fn aging_pass_recomputes_scores() {
        let cfg = GateConfig {
            aging_threshold_secs: 1.0,
            aging_boost: 6.0,
            promotion_threshold_secs: 100.0,
            ..GateConfig::default()
        };
        let mut rt = WaitQueue::new();
        let mut be = WaitQueue::new();
        let (request, _rx) = be_request(0.0);
        be.push(request);

        // 11s in: boost = 10 * 6 / 60 = 1.0, clamped to the floor.
        let outcome = apply_aging(&cfg, 11.0, &mut rt, &mut be);
        assert_eq!(outcome, AgingOutcome::default());
        let aged = be.pop().unwrap();
        assert!((aged.priority_score - AGED_SCORE_FLOOR).abs() < 1e-9);
    }

    #[test]
    fn aging_pass_promotes_long_waiters() {
        let cfg = GateConfig {
            aging_threshold_secs: 1.0,
            promotion_threshold_secs: 5.0,
            ..GateConfig::default()
        };
        let mut rt = WaitQueue::new();
        let mut be = WaitQueue::new();
        let (old, _rx_old) = be_request(0.0);
        let (fresh, _rx_fresh) = be_request(9.5);
        be.push(old);
        be.push(fresh);

        let outcome = apply_aging(&cfg, 10.0, &mut rt, &mut be);
        assert_eq!(outcome.promoted, 1);
        assert_eq!(rt.len(), 1);
        assert_eq!(be.len(), 1);

        let promoted = rt.pop().unwrap();
        assert_eq!(promoted.priority_score, 0.0);
        assert!(promoted.high_priority);
    }

    #[test]
    fn aging_pass_purges_dead_waiters() {
        let cfg = config();
        let mut rt = WaitQueue::new();
        let mut be = WaitQueue::new();
        let (dead, rx_dead) = be_request(0.0);
        let (live, _rx_live) = be_request(0.0);
        be.push(dead);
        be.push(live);
        drop(rx_dead);

        let outcome = apply_aging(&cfg, 1.0, &mut rt, &mut be);
        assert_eq!(outcome.purged, 1);
        assert_eq!(be.len(), 1);
    }

    #[test]
    fn empty_be_queue_is_untouched() {
        let cfg = config();
        let mut rt = WaitQueue::new();
        let mut be = WaitQueue::new();
        let outcome = apply_aging(&cfg, 1.0, &mut rt, &mut be);
        assert_eq!(outcome, AgingOutcome::default());
        assert!(be.is_empty());
    }
}
