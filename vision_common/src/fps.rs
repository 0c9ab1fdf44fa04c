//! Sliding-window throughput counter.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Measures the average rate of `tick()` calls over a trailing time window.
pub struct FpsCounter {
    window: Duration,
    ticks: VecDeque<Instant>,
}

impl FpsCounter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            ticks: VecDeque::new(),
        }
    }

    /// Record one processed frame.
    pub fn tick(&mut self) {
        let now = Instant::now();
        self.ticks.push_back(now);
        while let Some(&front) = self.ticks.front() {
            if now.duration_since(front) > self.window {
                self.ticks.pop_front();
            } else {
                break;
            }
        }
    }

    /// Current frames-per-second over the window; 0.0 until two ticks exist.
    pub fn fps(&self) -> f32 {
        if self.ticks.len() < 2 {
            return 0.0;
        }
        let span = self
            .ticks
            .back()
            .unwrap()
            .duration_since(*self.ticks.front().unwrap());
        if span.is_zero() {
            return 0.0;
        }
        (self.ticks.len() - 1) as f32 / span.as_secs_f32()
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn empty_counter_reports_zero() {
        let counter = FpsCounter::default();
        assert_eq!(counter.fps(), 0.0);
    }

    #[test]
    fn single_tick_reports_zero() {
        let mut counter = FpsCounter::default();
        counter.tick();
        assert_eq!(counter.fps(), 0.0);
    }

    #[test]
    fn steady_ticks_report_plausible_rate() {
        let mut counter = FpsCounter::default();
        for _ in 0..5 {
            counter.tick();
            sleep(Duration::from_millis(10));
        }
        let fps = counter.fps();
        assert!(fps > 20.0 && fps < 200.0, "unexpected fps {fps}");
    }

    #[test]
    fn ticks_outside_window_are_evicted() {
        let mut counter = FpsCounter::new(Duration::from_millis(20));
        counter.tick();
        sleep(Duration::from_millis(40));
        counter.tick();
        // The first tick aged out, so only one sample remains.
        assert_eq!(counter.fps(), 0.0);
    }
}
