//! Fixed-window counter shared by the sliding-window and quota strategies.
//!
//! Both strategies are the same mechanics at different scales: a hard
//! admission ceiling per window, with the counter zeroed when the window
//! rolls over. The window boundary only ever moves forward.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedWindow {
    pub window_start_ms: u64,
    pub count: u64,
}

impl FixedWindow {
    pub fn starting_at(now_ms: u64) -> Self {
        Self {
            window_start_ms: now_ms,
            count: 0,
        }
    }

    /// Reset the counter if the window has elapsed.
    pub fn roll(&mut self, window_ms: u64, now_ms: u64) {
        if now_ms.saturating_sub(self.window_start_ms) >= window_ms {
            self.window_start_ms = now_ms;
            self.count = 0;
        }
    }

    /// Admit `cost` requests if they fit under `max`. Assumes `roll` ran
    /// first.
    pub fn try_admit(&mut self, cost: u64, max: u64) -> bool {
        match self.count.checked_add(cost) {
            Some(next) if next <= max => {
                self.count = next;
                true
            }
            _ => false,
        }
    }

    pub fn remaining(&self, max: u64) -> u64 {
        max.saturating_sub(self.count)
    }

    /// When the current window expires.
    pub fn reset_at_ms(&self, window_ms: u64) -> u64 {
        self.window_start_ms + window_ms
    }

    /// Milliseconds until the current window expires.
    pub fn retry_after_ms(&self, window_ms: u64, now_ms: u64) -> u64 {
        self.reset_at_ms(window_ms).saturating_sub(now_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admits_up_to_max_then_rejects() {
        let mut w = FixedWindow::starting_at(0);
        for _ in 0..3 {
            assert!(w.try_admit(1, 3));
        }
        assert!(!w.try_admit(1, 3));
        assert_eq!(w.remaining(3), 0);
    }

    #[test]
    fn test_roll_resets_counter_after_window() {
        let mut w = FixedWindow::starting_at(0);
        w.try_admit(3, 3);
        w.roll(60_000, 59_999);
        assert_eq!(w.count, 3); // window not yet elapsed
        w.roll(60_000, 60_000);
        assert_eq!(w.count, 0);
        assert_eq!(w.window_start_ms, 60_000);
    }

    #[test]
    fn test_boundary_only_moves_forward() {
        let mut w = FixedWindow::starting_at(10_000);
        w.roll(1_000, 5_000); // clock going backwards must not rewind
        assert_eq!(w.window_start_ms, 10_000);
    }

    #[test]
    fn test_retry_after_counts_down() {
        let mut w = FixedWindow::starting_at(0);
        w.try_admit(1, 1);
        assert_eq!(w.retry_after_ms(60_000, 15_000), 45_000);
        assert_eq!(w.reset_at_ms(60_000), 60_000);
    }

    #[test]
    fn test_admit_near_u64_max_does_not_wrap() {
        let mut w = FixedWindow::starting_at(0);
        assert!(w.try_admit(u64::MAX, u64::MAX));
        // count + cost would wrap past zero; must reject, not admit
        assert!(!w.try_admit(1, u64::MAX));
        assert_eq!(w.count, u64::MAX);
    }

    #[test]
    fn test_cost_larger_than_max_never_fits() {
        let mut w = FixedWindow::starting_at(0);
        assert!(!w.try_admit(5, 3));
        assert_eq!(w.count, 0);
    }
}
