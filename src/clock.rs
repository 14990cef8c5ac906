use std::time::{SystemTime, UNIX_EPOCH};

/// Backtest clock: advances through a fixed, sorted series of historical
/// timestamps (§4.1, §5 "Backtest performs no suspension"). Adapted from
/// the original simulation clock — same `advance`/`tick_index` contract,
/// generalized to the engine's tick type.
pub struct SimClock {
    timestamps: Vec<u64>,
    current_idx: usize,
}

impl SimClock {
    pub fn new(mut timestamps: Vec<u64>) -> Self {
        timestamps.sort_unstable();
        timestamps.dedup();
        Self {
            timestamps,
            current_idx: 0,
        }
    }

    /// Evenly spaced ticks between `start` and `end`, `step` seconds apart —
    /// used when a fixture supplies no explicit timestamp series.
    pub fn uniform(start: u64, end: u64, step: u64) -> Self {
        let timestamps: Vec<u64> = (start..=end).step_by(step.max(1) as usize).collect();
        Self {
            timestamps,
            current_idx: 0,
        }
    }

    pub fn current_timestamp(&self) -> u64 {
        self.timestamps.get(self.current_idx).copied().unwrap_or(0)
    }

    /// Advance to the next tick. Returns `false` once exhausted.
    pub fn advance(&mut self) -> bool {
        if self.current_idx + 1 < self.timestamps.len() {
            self.current_idx += 1;
            true
        } else {
            false
        }
    }

    pub fn tick_index(&self) -> usize {
        self.current_idx
    }

    pub fn total_ticks(&self) -> usize {
        self.timestamps.len()
    }

    pub fn first_timestamp(&self) -> u64 {
        self.timestamps.first().copied().unwrap_or(0)
    }

    pub fn last_timestamp(&self) -> u64 {
        self.timestamps.last().copied().unwrap_or(0)
    }

    pub fn is_exhausted(&self) -> bool {
        self.timestamps.is_empty() || self.current_idx + 1 >= self.timestamps.len()
    }
}

/// Live clock: ticks on a fixed wall-clock cadence rather than a
/// pre-recorded series (§5 "the venue interface call ... may block on I/O
/// in live mode"). `current_timestamp` is always the real unix time at the
/// moment of the call, distinct from backtest's replayed series — this is
/// the source of the event log's `real_time` field (§4.10) coinciding with
/// `timestamp` in live mode and diverging from it in backtest.
pub struct LiveClock {
    cadence: std::time::Duration,
    tick_count: u64,
}

impl LiveClock {
    pub fn new(cadence: std::time::Duration) -> Self {
        Self {
            cadence,
            tick_count: 0,
        }
    }

    pub fn now_unix() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    pub fn current_timestamp(&self) -> u64 {
        Self::now_unix()
    }

    pub fn tick_index(&self) -> u64 {
        self.tick_count
    }

    /// Sleep until the next cadence boundary, then mark the tick advanced.
    /// This is the core's only live-mode suspension point besides the venue
    /// call and the reconciliation backoff sleep (§5).
    pub async fn wait_for_next_tick(&mut self) {
        tokio::time::sleep(self.cadence).await;
        self.tick_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_clock_advances_through_sorted_dedup_series() {
        let mut clock = SimClock::new(vec![300, 100, 200, 200]);
        assert_eq!(clock.current_timestamp(), 100);
        assert!(clock.advance());
        assert_eq!(clock.current_timestamp(), 200);
        assert!(clock.advance());
        assert_eq!(clock.current_timestamp(), 300);
        assert!(!clock.advance());
        assert!(clock.is_exhausted());
    }

    #[test]
    fn uniform_clock_steps_evenly() {
        let clock = SimClock::uniform(0, 100, 25);
        assert_eq!(clock.total_ticks(), 5);
        assert_eq!(clock.last_timestamp(), 100);
    }
}
