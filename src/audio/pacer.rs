//! Outbound playback pacing
//!
//! Devices drain a small playback buffer: sending much faster than real
//! time overruns it, sending slower starves it. The pacer spaces chunk
//! sends so the transmit rate tracks the audio clock. There is no catch-up
//! speed-up when a send runs long — the playback buffer absorbs minor
//! drift but not bursts.

use std::time::{Duration, Instant};

/// Consecutive behind-schedule chunks between throughput warnings
const BEHIND_WARN_INTERVAL: u32 = 16;

/// Per-stream pacing clock
#[derive(Debug)]
pub struct Pacer {
    bytes_per_second: u32,
    multiplier: f64,
    started: Instant,
    expected: Duration,
    slept: Duration,
    bytes_sent: u64,
    behind_streak: u32,
}

/// Totals accumulated over one outbound stream, for drift diagnostics
#[derive(Debug, Clone, Copy)]
pub struct PacerReport {
    /// Audio bytes handed to the transport
    pub bytes_sent: u64,
    /// Wall-clock time since the pacer was created
    pub actual: Duration,
    /// Sum of ideal per-chunk intervals
    pub expected: Duration,
    /// Time actually spent sleeping
    pub slept: Duration,
}

impl Pacer {
    /// Create a pacer for the target format's throughput and a tuning
    /// multiplier (1.0 = real time)
    #[must_use]
    pub fn new(bytes_per_second: u32, multiplier: f64) -> Self {
        Self {
            bytes_per_second,
            multiplier,
            started: Instant::now(),
            expected: Duration::ZERO,
            slept: Duration::ZERO,
            bytes_sent: 0,
            behind_streak: 0,
        }
    }

    /// Ideal transmission interval for a chunk of `len` bytes
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn ideal_interval(&self, len: usize) -> Duration {
        if self.bytes_per_second == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(len as f64 / f64::from(self.bytes_per_second) * self.multiplier)
    }

    /// Remaining sleep after `elapsed` has already passed; never negative
    #[must_use]
    pub fn sleep_needed(ideal: Duration, elapsed: Duration) -> Duration {
        ideal.saturating_sub(elapsed)
    }

    /// Account for a sent chunk and sleep out the rest of its interval.
    ///
    /// `elapsed` is the time between recording the send start and the chunk
    /// being handed to the transport. Zero-length chunks are skipped without
    /// touching any counter.
    pub async fn pace(&mut self, len: usize, elapsed: Duration) {
        if len == 0 {
            return;
        }

        let ideal = self.ideal_interval(len);
        self.bytes_sent += len as u64;
        self.expected += ideal;

        let sleep = Self::sleep_needed(ideal, elapsed);
        if sleep.is_zero() {
            self.behind_streak += 1;
            if self.behind_streak % BEHIND_WARN_INTERVAL == 0 {
                tracing::warn!(
                    chunks = self.behind_streak,
                    elapsed_us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
                    "send path running behind real time; no pacing sleep applied"
                );
            }
        } else {
            self.behind_streak = 0;
            self.slept += sleep;
            tokio::time::sleep(sleep).await;
        }
    }

    /// Drift report for end-of-stream diagnostics
    #[must_use]
    pub fn report(&self) -> PacerReport {
        PacerReport {
            bytes_sent: self.bytes_sent,
            actual: self.started.elapsed(),
            expected: self.expected,
            slept: self.slept,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sleep_is_never_negative() {
        let ideal = Duration::from_millis(10);
        assert_eq!(
            Pacer::sleep_needed(ideal, Duration::from_millis(3)),
            Duration::from_millis(7)
        );
        assert_eq!(Pacer::sleep_needed(ideal, ideal), Duration::ZERO);
        assert_eq!(
            Pacer::sleep_needed(ideal, Duration::from_millis(25)),
            Duration::ZERO
        );
    }

    #[test]
    fn ideal_interval_scales_with_length_and_multiplier() {
        let pacer = Pacer::new(32_000, 1.0);
        assert_eq!(pacer.ideal_interval(3200), Duration::from_millis(100));

        let halved = Pacer::new(32_000, 0.5);
        assert_eq!(halved.ideal_interval(3200), Duration::from_millis(50));
    }

    #[test]
    fn zero_bytes_per_second_never_sleeps() {
        let pacer = Pacer::new(0, 1.0);
        assert_eq!(pacer.ideal_interval(4096), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_length_chunk_is_skipped() {
        let mut pacer = Pacer::new(32_000, 1.0);
        pacer.pace(0, Duration::from_millis(5)).await;

        let report = pacer.report();
        assert_eq!(report.bytes_sent, 0);
        assert_eq!(report.expected, Duration::ZERO);
        assert_eq!(report.slept, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn expected_accumulates_even_without_sleep() {
        let mut pacer = Pacer::new(32_000, 1.0);
        // Already behind schedule: no sleep, but the interval still counts.
        pacer.pace(3200, Duration::from_millis(200)).await;
        pacer.pace(3200, Duration::ZERO).await;

        let report = pacer.report();
        assert_eq!(report.bytes_sent, 6400);
        assert_eq!(report.expected, Duration::from_millis(200));
        assert_eq!(report.slept, Duration::from_millis(100));
    }
}
