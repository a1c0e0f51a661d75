use std::collections::HashMap;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A request currently executing work, registered so a blocked RT arrival
/// can ask it to step aside.
#[derive(Debug, Clone)]
pub(crate) struct ActiveRequest {
    pub task_id: String,
    pub cancel: CancellationToken,
    /// Clock seconds at registration.
    pub started_at: f64,
    pub high_priority: bool,
}

/// Registry of running requests. Registration is the caller's choice; only
/// registered BE work is preemptable. RT work is never preempted.
#[derive(Debug, Default)]
pub(crate) struct ActiveRequests {
    map: HashMap<String, ActiveRequest>,
}

impl ActiveRequests {
    pub fn register(
        &mut self,
        task_id: &str,
        cancel: CancellationToken,
        started_at: f64,
        high_priority: bool,
    ) {
        self.map.insert(
            task_id.to_string(),
            ActiveRequest {
                task_id: task_id.to_string(),
                cancel,
                started_at,
                high_priority,
            },
        );
        debug!(task_id, high_priority, "Registered active request");
    }

    pub fn unregister(&mut self, task_id: &str) {
        if self.map.remove(task_id).is_some() {
            debug!(task_id, "Unregistered active request");
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn has_preemptable_be(&self) -> bool {
        self.map.values().any(|request| !request.high_priority)
    }

    /// Signal the oldest running BE request to exit. Returns whether a
    /// signal was sent.
    ///
    /// The slot is not freed here: the running caller is trusted to observe
    /// the token, stop its work, release, and unregister.
    pub fn preempt_oldest_be(&self, now: f64) -> bool {
        let Some(oldest) = self
            .map
            .values()
            .filter(|request| !request.high_priority)
            .min_by(|a, b| a.started_at.total_cmp(&b.started_at))
        else {
            return false;
        };

        warn!(
            task_id = %oldest.task_id,
            running_time_seconds = now - oldest.started_at,
            "Preempting BE request for RT priority"
        );
        oldest.cancel.cancel();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_unregister() {
        let mut active = ActiveRequests::default();
        active.register("task-1", CancellationToken::new(), 0.0, false);
        assert_eq!(active.len(), 1);

        active.unregister("task-1");
        assert_eq!(active.len(), 0);
    }

    #[test]
    fn unregister_nonexistent_is_noop() {
        let mut active = ActiveRequests::default();
        active.unregister("ghost");
        assert_eq!(active.len(), 0);
    }

    #[test]
    fn rt_work_is_not_preemptable() {
        let mut active = ActiveRequests::default();
        active.register("rt-1", CancellationToken::new(), 0.0, true);
        assert!(!active.has_preemptable_be());
        assert!(!active.preempt_oldest_be(1.0));
    }

    #[test]
    fn preempts_the_oldest_be() {
        let mut active = ActiveRequests::default();
        let young = CancellationToken::new();
        let old = CancellationToken::new();
        active.register("be-young", young.clone(), 5.0, false);
        active.register("be-old", old.clone(), 1.0, false);
        active.register("rt-1", CancellationToken::new(), 0.0, true);

        assert!(active.has_preemptable_be());
        assert!(active.preempt_oldest_be(10.0));
        assert!(old.is_cancelled());
        assert!(!young.is_cancelled());
    }

    #[test]
    fn preempt_with_no_be_returns_false() {
        let active = ActiveRequests::default();
        assert!(!active.preempt_oldest_be(0.0));
    }
}
