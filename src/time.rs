//! Frame timing and the fixed-step accumulator.
//!
//! [`FrameClock`] measures wall-clock frame deltas. [`FixedStep`] turns those
//! deltas into a bounded number of fixed sub-steps.
//!
//! # Example
//!
//! ```ignore
//! use debris::time::{FixedStep, FrameClock};
//!
//! let mut clock = FrameClock::new();
//! let mut stepper = FixedStep::new(1.0 / 60.0, 4);
//!
//! // In your frame loop:
//! let dt = clock.tick();
//! for _ in 0..stepper.advance(dt) {
//!     // one sub-step
//! }
//! ```

use std::time::Instant;

/// Fixed-timestep accumulator with a per-frame step cap.
///
/// Each frame adds its duration to the accumulator, then whole timesteps are
/// consumed until either the accumulator runs dry or the cap is reached. Time
/// left over when the cap is hit is carried into the next frame, so a slow
/// frame turns into slow motion rather than a stall. The carried backlog never
/// exceeds one frame's budget (`max_steps × timestep`).
#[derive(Debug, Clone, PartialEq)]
pub struct FixedStep {
    timestep: f32,
    max_steps: u32,
    remaining: f32,
}

impl FixedStep {
    pub fn new(timestep: f32, max_steps: u32) -> Self {
        Self {
            timestep,
            max_steps,
            remaining: 0.0,
        }
    }

    /// Add `frame_time` seconds and return how many sub-steps to run now.
    ///
    /// A frame exactly one timestep long runs exactly one step.
    pub fn advance(&mut self, frame_time: f32) -> u32 {
        if frame_time.is_finite() && frame_time > 0.0 {
            self.remaining += frame_time;
        }

        let mut steps = 0;
        while steps < self.max_steps && self.remaining >= self.timestep {
            self.remaining -= self.timestep;
            steps += 1;
        }

        let budget = self.timestep * self.max_steps as f32;
        if self.remaining > budget {
            log::debug!(
                "Sub-step backlog {:.4}s exceeds one frame budget, clamping to {:.4}s",
                self.remaining,
                budget
            );
            self.remaining = budget;
        }
        steps
    }

    /// Seconds accumulated but not yet simulated.
    #[inline]
    pub fn remaining(&self) -> f32 {
        self.remaining
    }

    #[inline]
    pub fn timestep(&self) -> f32 {
        self.timestep
    }

    #[inline]
    pub fn max_steps(&self) -> u32 {
        self.max_steps
    }

    /// Drop any accumulated time.
    pub fn reset(&mut self) {
        self.remaining = 0.0;
    }
}

/// Wall-clock frame timer.
#[derive(Debug)]
pub struct FrameClock {
    start: Instant,
    last_frame: Instant,
    delta_secs: f32,
    frame_count: u64,
    paused: bool,
    /// Time scale multiplier (1.0 = normal speed).
    time_scale: f32,
}

impl FrameClock {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_frame: now,
            delta_secs: 0.0,
            frame_count: 0,
            paused: false,
            time_scale: 1.0,
        }
    }

    /// Advance one frame and return its scaled duration in seconds.
    ///
    /// Returns 0 while paused.
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let raw = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;
        self.frame_count += 1;

        self.delta_secs = if self.paused {
            0.0
        } else {
            raw * self.time_scale
        };
        self.delta_secs
    }

    /// Duration of the last frame in seconds.
    #[inline]
    pub fn delta(&self) -> f32 {
        self.delta_secs
    }

    /// Unscaled seconds since the clock was created.
    #[inline]
    pub fn since_start(&self) -> f32 {
        self.start.elapsed().as_secs_f32()
    }

    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame_count
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    #[inline]
    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        if self.paused {
            self.last_frame = Instant::now();
            self.paused = false;
        }
    }

    /// Set time scale multiplier.
    ///
    /// - `1.0` = normal speed
    /// - `0.5` = half speed (slow motion)
    pub fn set_time_scale(&mut self, scale: f32) {
        self.time_scale = scale.max(0.0);
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}
