use thiserror::Error;

/// Configuration rejected at construction time. Fatal to the semaphore.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("total_slots must be >= 1")]
    ZeroSlots,

    #[error("rt_reserved_slots ({rt_reserved}) cannot exceed total_slots ({total})")]
    ReservationExceedsTotal { rt_reserved: u32, total: u32 },
}

/// Failure modes of [`acquire`](crate::HybridPrioritySemaphore::acquire).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AcquireError {
    /// The combined queue depth cap was reached and no slot was immediately
    /// grantable. Callers should shed load; the semaphore does not retry.
    #[error("queue depth {depth} >= max {max}")]
    QueueFull { depth: usize, max: usize },

    /// The wait ended without a grant because the semaphore abandoned the
    /// waker. Callers cancelling their own wait simply drop the `acquire`
    /// future and never observe this variant.
    #[error("wait abandoned before a slot was granted")]
    Cancelled,
}
