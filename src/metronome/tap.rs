//! Tap tempo
//!
//! Derives a tempo from the spacing of user taps. A gap longer than
//! [`TAP_RESET`] starts a new sequence; the tempo is the average interval of
//! the most recent [`TAP_WINDOW`] taps.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::scheduler::clamp_bpm;

/// Silence after which taps start a fresh sequence
pub const TAP_RESET: Duration = Duration::from_secs(2);
/// Number of taps averaged
pub const TAP_WINDOW: usize = 4;

#[derive(Debug, Default)]
pub struct TapTempo {
    taps: VecDeque<Instant>,
    count: usize,
}

impl TapTempo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tap now
    pub fn tap(&mut self) -> Option<u32> {
        self.tap_at(Instant::now())
    }

    /// Register a tap at `at`; returns the new tempo once two taps are in
    pub fn tap_at(&mut self, at: Instant) -> Option<u32> {
        let expired = self
            .taps
            .back()
            .map(|&last| at.saturating_duration_since(last) > TAP_RESET)
            .unwrap_or(true);
        if expired {
            self.taps.clear();
            self.count = 0;
        }

        self.taps.push_back(at);
        if self.taps.len() > TAP_WINDOW {
            self.taps.pop_front();
        }
        self.count += 1;

        if self.taps.len() < 2 {
            return None;
        }

        let (first, last) = (self.taps.front()?, self.taps.back()?);
        let span = last.saturating_duration_since(*first).as_secs_f64() * 1000.0;
        let avg_ms = span / (self.taps.len() - 1) as f64;
        if avg_ms <= 0.0 {
            return None;
        }
        let bpm = (60_000.0 / avg_ms).round().min(u32::MAX as f64) as u32;
        Some(clamp_bpm(bpm))
    }

    /// Taps in the current sequence
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn reset(&mut self) {
        self.taps.clear();
        self.count = 0;
    }
}
