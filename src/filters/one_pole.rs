//! One-pole filter stage (after Will Pirkle's synth book).
//!
//! Usable stand-alone as a 6 dB low/high-pass, but the extra coefficients
//! (`beta`, `gamma`, `delta`, `epsilon`, `a0`) exist so four stages can be
//! wired into a ladder with inter-stage feedback resolved without a unit
//! delay.

#[derive(Debug, Clone)]
pub struct OnePole {
    pi_over_sample_rate: f32,
    /// Feed-forward coefficient derived from the cutoff.
    pub alpha: f32,
    pub beta: f32,
    pub gamma: f32,
    pub delta: f32,
    pub epsilon: f32,
    pub a0: f32,
    feedback: f32,
    z1: f32,
}

impl OnePole {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            pi_over_sample_rate: std::f32::consts::PI / sample_rate,
            alpha: 1.0,
            beta: 0.0,
            gamma: 1.0,
            delta: 0.0,
            epsilon: 0.0,
            a0: 1.0,
            feedback: 0.0,
            z1: 0.0,
        }
    }

    /// Set the cutoff via the bilinear-transform tangent warp.
    pub fn set_cutoff(&mut self, cutoff: f32) {
        let g = (cutoff * self.pi_over_sample_rate).tan();
        self.alpha = g / (1.0 + g);
    }

    /// Feedback input from the next stage up the ladder.
    #[inline(always)]
    pub fn set_feedback(&mut self, feedback: f32) {
        self.feedback = feedback;
    }

    /// This stage's contribution to the ladder's feedback network.
    #[inline(always)]
    pub fn feedback_output(&self) -> f32 {
        self.beta * (self.z1 + self.feedback * self.delta)
    }

    pub fn reset(&mut self) {
        self.feedback = 0.0;
        self.z1 = 0.0;
    }

    #[inline(always)]
    pub fn render_lpf(&mut self, input: f32) -> f32 {
        let x = input * self.gamma + self.feedback + self.epsilon * self.feedback_output();
        let vn = (self.a0 * x - self.z1) * self.alpha;
        let out = vn + self.z1;
        self.z1 = vn + out;
        out
    }

    #[inline(always)]
    pub fn render_hpf(&mut self, input: f32) -> f32 {
        input - self.render_lpf(input)
    }
}
