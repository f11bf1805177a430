//! Sample-accurate parameter smoothing.
//!
//! Every control that can change while a voice is audible is routed through a
//! [`SmoothParam`] so that block-granularity control messages never produce a
//! per-sample discontinuity.

/// A linearly-ramped parameter value.
///
/// `advance` must be called exactly once per audio sample per logical use of
/// the parameter; components that share a value share one `SmoothParam` by
/// reference rather than advancing their own copies.
#[derive(Debug, Clone)]
pub struct SmoothParam {
    current: f32,
    target: f32,
    step: f32,
    steps_remaining: u32,
    sample_rate: f32,
    completing: bool,
    completed: bool,
}

impl SmoothParam {
    pub fn new(value: f32, sample_rate: f32) -> Self {
        Self {
            current: value,
            target: value,
            step: 0.0,
            steps_remaining: 0,
            sample_rate,
            completing: false,
            completed: false,
        }
    }

    /// Jump to `value` with no transition.
    pub fn set_immediate(&mut self, value: f32) {
        self.current = value;
        self.target = value;
        self.step = 0.0;
        self.steps_remaining = 0;
        self.completing = false;
    }

    /// Start a linear transition to `value` over `duration` seconds.
    ///
    /// A no-op if `value` is already the target (a transition in flight keeps
    /// its step). Durations shorter than one sample apply immediately.
    pub fn ramp_to(&mut self, value: f32, duration: f32) {
        if value == self.target {
            return;
        }
        self.target = value;
        let steps = (duration * self.sample_rate).ceil();
        if steps >= 1.0 {
            self.step = (value - self.current) / steps;
            self.steps_remaining = steps as u32;
            self.completing = true;
        } else {
            self.current = value;
            self.step = 0.0;
            self.steps_remaining = 0;
            self.completing = false;
        }
    }

    /// Produce the value for the current sample.
    #[inline(always)]
    pub fn advance(&mut self) -> f32 {
        if self.steps_remaining > 0 {
            let previous = self.current;
            self.current += self.step;
            self.steps_remaining -= 1;
            // The step count is authoritative; the sign test catches any
            // overshoot from accumulated rounding before the count runs out.
            if self.steps_remaining == 0
                || (self.target - self.current) * (self.target - previous) <= 0.0
            {
                self.current = self.target;
                self.steps_remaining = 0;
                if self.completing {
                    self.completing = false;
                    self.completed = true;
                }
            }
        }
        self.current
    }

    /// Read-and-clear the completion latch. Reads true exactly once per ramp
    /// request, on the sample the ramp lands on its target.
    pub fn take_completed(&mut self) -> bool {
        let fired = self.completed;
        self.completed = false;
        fired
    }

    pub fn is_ramping(&self) -> bool {
        self.steps_remaining > 0
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }
}
