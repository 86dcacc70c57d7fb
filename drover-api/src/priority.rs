//! Priority constants for scheduling units of work
//!
//! Priority only affects queue position at admission time; it never preempts
//! work that is already running. Within one priority level the pending queue
//! is stable FIFO.
//!
//! # Usage
//!
//! ```rust,ignore
//! use drover_api::priority::{HIGH, NORMAL};
//!
//! pool.schedule_work(job, HIGH, None);
//! pool.schedule_work(cleanup_job, NORMAL, None);
//! ```

/// Background priority (10): housekeeping, cleanup sweeps
pub const BACKGROUND: u8 = 10;

/// Low priority (30)
pub const LOW: u8 = 30;

/// Normal priority (50): the default for scheduled work
pub const NORMAL: u8 = 50;

/// High priority (70)
pub const HIGH: u8 = 70;

/// Critical priority (90): operator-initiated corrective actions
pub const CRITICAL: u8 = 90;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(BACKGROUND < LOW);
        assert!(LOW < NORMAL);
        assert!(NORMAL < HIGH);
        assert!(HIGH < CRITICAL);
    }
}
