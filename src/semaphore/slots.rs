use std::collections::HashMap;

use serde::Serialize;
use tracing::warn;

/// The pool a slot was drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotClass {
    RealTime,
    BestEffort,
}

impl SlotClass {
    pub(crate) fn from_priority(high_priority: bool) -> Self {
        if high_priority {
            Self::RealTime
        } else {
            Self::BestEffort
        }
    }
}

/// A slot currently out to a caller, tracked until release for leak
/// detection.
#[derive(Debug, Clone, Serialize)]
pub struct HeldSlot {
    pub slot_id: u64,
    /// Clock seconds at acquisition.
    pub acquired_at: f64,
    /// Class the caller asked for.
    pub high_priority: bool,
    /// Pool the slot was actually drawn from. Differs from the requested
    /// class after a cross-class fallback or a queue handoff.
    pub granted: SlotClass,
    /// Tag describing the grant path, for diagnostics.
    pub context: &'static str,
}

/// Diagnostic record for a slot held past the leak threshold.
#[derive(Debug, Clone, Serialize)]
pub struct LeakReport {
    pub slot_id: u64,
    pub held_for_seconds: f64,
    pub high_priority: bool,
    pub granted: SlotClass,
    pub context: &'static str,
    /// Wall-clock scan time (RFC 3339), for correlating with external logs.
    pub detected_at: String,
}

/// Slot bookkeeping: a monotonic id counter plus the registry of held
/// slots. Ids are never reused.
#[derive(Debug, Default)]
pub(crate) struct SlotTracker {
    counter: u64,
    held: HashMap<u64, HeldSlot>,
}

impl SlotTracker {
    pub fn track(
        &mut self,
        now: f64,
        high_priority: bool,
        granted: SlotClass,
        context: &'static str,
    ) -> u64 {
        self.counter += 1;
        let slot_id = self.counter;
        self.held.insert(
            slot_id,
            HeldSlot {
                slot_id,
                acquired_at: now,
                high_priority,
                granted,
                context,
            },
        );
        slot_id
    }

    pub fn untrack(&mut self, slot_id: u64) -> Option<HeldSlot> {
        self.held.remove(&slot_id)
    }

    /// Remove the oldest held slot whose requested class matches. Legacy
    /// path for callers that do not thread slot ids through.
    pub fn untrack_oldest(&mut self, high_priority: bool) -> Option<HeldSlot> {
        let oldest = self
            .held
            .values()
            .filter(|slot| slot.high_priority == high_priority)
            .min_by(|a, b| a.acquired_at.total_cmp(&b.acquired_at))
            .map(|slot| slot.slot_id)?;
        self.held.remove(&oldest)
    }

    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    /// Report slots held longer than `threshold_secs`. Observational only:
    /// nothing is released.
    pub fn leaks(&self, now: f64, threshold_secs: f64) -> Vec<LeakReport> {
        let detected_at = chrono::Utc::now().to_rfc3339();
        let mut leaked = Vec::new();
        for slot in self.held.values() {
            let held_for = now - slot.acquired_at;
            if held_for > threshold_secs {
                warn!(
                    slot_id = slot.slot_id,
                    hold_time_seconds = held_for,
                    threshold_seconds = threshold_secs,
                    high_priority = slot.high_priority,
                    context = slot.context,
                    "Potential semaphore slot leak detected"
                );
                leaked.push(LeakReport {
                    slot_id: slot.slot_id,
                    held_for_seconds: held_for,
                    high_priority: slot.high_priority,
                    granted: slot.granted,
                    context: slot.context,
                    detected_at: detected_at.clone(),
                });
            }
        }
        leaked
    }
}
