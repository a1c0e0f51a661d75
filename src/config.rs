use crate::error::ConfigError;

/// How the RT queue orders waiters with equal priority scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RtSchedulingMode {
    /// Oldest RT arrival is served first.
    #[default]
    Fifo,
    /// Newest RT arrival is served first. Useful when a fresh streaming
    /// request should win over a stale one.
    Lifo,
}

impl RtSchedulingMode {
    /// Parse the deployment string form ("fifo" / "lifo", case-insensitive).
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "fifo" => Some(Self::Fifo),
            "lifo" => Some(Self::Lifo),
            _ => None,
        }
    }
}

/// Scheduling knobs for the semaphore. Immutable after construction.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Total concurrent admission capacity (backend parallelism).
    pub total_slots: u32,

    /// Slots reserved for real-time requests. BE traffic cannot take these
    /// unless every slot is RT-reserved (deadlock-avoidance fallback).
    pub rt_reserved_slots: u32,

    /// Seconds a BE request waits before its priority starts improving.
    pub aging_threshold_secs: f64,

    /// Magnitude of the per-minute score boost applied past the threshold.
    pub aging_boost: f64,

    /// Seconds after which a waiting BE request is moved into the RT queue.
    pub promotion_threshold_secs: f64,

    /// Whether a blocked RT arrival may signal running BE work to exit.
    pub preemption_enabled: bool,

    /// Informational only; preemption triggers on RT blockage, not on this.
    pub preemption_wait_threshold_secs: f64,

    /// Force a BE wake after this many consecutive RT releases with BE
    /// queued. 0 disables the guarantee.
    pub guaranteed_be_ratio: u32,

    /// Combined cap over both wait queues. 0 disables back-pressure.
    pub max_queue_depth: usize,

    /// Ordering discipline for the RT queue.
    pub rt_scheduling_mode: RtSchedulingMode,

    /// Seconds a held slot may age before the leak scan reports it.
    pub leak_threshold_secs: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            total_slots: 2,
            rt_reserved_slots: 1,
            aging_threshold_secs: 60.0,
            aging_boost: 0.5,
            promotion_threshold_secs: 600.0,
            preemption_enabled: true,
            preemption_wait_threshold_secs: 2.0,
            guaranteed_be_ratio: 5,
            max_queue_depth: 0,
            rt_scheduling_mode: RtSchedulingMode::Fifo,
            leak_threshold_secs: 300.0,
        }
    }
}

impl GateConfig {
    /// Load configuration from the environment, falling back to defaults for
    /// missing or unparseable values. Key names follow the gateway
    /// deployment convention.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            total_slots: env_parse("REQUEST_CONCURRENCY", defaults.total_slots),
            rt_reserved_slots: env_parse(
                "SCHEDULING_RT_RESERVED_SLOTS",
                defaults.rt_reserved_slots,
            ),
            aging_threshold_secs: env_parse(
                "SCHEDULING_AGING_THRESHOLD_SECONDS",
                defaults.aging_threshold_secs,
            ),
            aging_boost: env_parse("SCHEDULING_AGING_BOOST", defaults.aging_boost),
            promotion_threshold_secs: env_parse(
                "SCHEDULING_PRIORITY_PROMOTION_THRESHOLD_SECONDS",
                defaults.promotion_threshold_secs,
            ),
            preemption_enabled: std::env::var("SCHEDULING_PREEMPTION_ENABLED")
                .map(|v| !v.eq_ignore_ascii_case("false"))
                .unwrap_or(defaults.preemption_enabled),
            preemption_wait_threshold_secs: env_parse(
                "SCHEDULING_PREEMPTION_WAIT_THRESHOLD_SECONDS",
                defaults.preemption_wait_threshold_secs,
            ),
            guaranteed_be_ratio: env_parse(
                "SCHEDULING_GUARANTEED_BE_RATIO",
                defaults.guaranteed_be_ratio,
            ),
            max_queue_depth: env_parse("SCHEDULING_MAX_QUEUE_DEPTH", defaults.max_queue_depth),
            rt_scheduling_mode: std::env::var("SCHEDULING_RT_MODE")
                .ok()
                .and_then(|v| RtSchedulingMode::parse(&v))
                .unwrap_or(defaults.rt_scheduling_mode),
            leak_threshold_secs: env_parse(
                "SCHEDULING_LEAK_THRESHOLD_SECONDS",
                defaults.leak_threshold_secs,
            ),
        }
    }

    /// Check the construction preconditions.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.total_slots < 1 {
            return Err(ConfigError::ZeroSlots);
        }
        if self.rt_reserved_slots > self.total_slots {
            return Err(ConfigError::ReservationExceedsTotal {
                rt_reserved: self.rt_reserved_slots,
                total: self.total_slots,
            });
        }
        Ok(())
    }

    /// Slots not reserved for RT. Zero when every slot is RT-reserved.
    pub fn be_slots(&self) -> u32 {
        self.total_slots.saturating_sub(self.rt_reserved_slots)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = GateConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.total_slots, 2);
        assert_eq!(cfg.rt_reserved_slots, 1);
        assert_eq!(cfg.be_slots(), 1);
        assert_eq!(cfg.guaranteed_be_ratio, 5);
        assert_eq!(cfg.rt_scheduling_mode, RtSchedulingMode::Fifo);
    }

    #[test]
    fn zero_slots_rejected() {
        let cfg = GateConfig {
            total_slots: 0,
            rt_reserved_slots: 0,
            ..GateConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroSlots));
    }

    #[test]
    fn reservation_exceeding_total_rejected() {
        let cfg = GateConfig {
            total_slots: 2,
            rt_reserved_slots: 3,
            ..GateConfig::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::ReservationExceedsTotal {
                rt_reserved: 3,
                total: 2
            })
        );
    }

    #[test]
    fn all_slots_reserved_is_valid() {
        let cfg = GateConfig {
            total_slots: 2,
            rt_reserved_slots: 2,
            ..GateConfig::default()
        };
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.be_slots(), 0);
    }

    #[test]
    fn scheduling_mode_parses_case_insensitively() {
        assert_eq!(RtSchedulingMode::parse("fifo"), Some(RtSchedulingMode::Fifo));
        assert_eq!(RtSchedulingMode::parse("LIFO"), Some(RtSchedulingMode::Lifo));
        assert_eq!(RtSchedulingMode::parse("round_robin"), None);
    }
}
