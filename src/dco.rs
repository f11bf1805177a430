//! Digitally-controlled oscillator.
//!
//! One phase accumulator drives three waveform taps: a tanh-shaped sawtooth
//! (mimicking the charging capacitor of the hardware DCO), a pulse comparator
//! with modulated width, and a square sub-oscillator one octave down. Each
//! discontinuity is corrected with a second-order polynomial band-limited
//! step (PolyBLEP) to keep aliasing down.

use crate::params::SmoothParam;
use crate::tuning::note_to_frequency;

const PWM_MIN: f32 = 0.02;
const PWM_MAX: f32 = 0.98;

/// PolyBLEP residual for a unit step of `height` at phase 0, given the
/// current phase and per-sample increment.
///
/// Zero outside the two samples adjacent to the discontinuity.
#[inline(always)]
pub fn poly_blep(phase: f32, increment: f32, height: f32) -> f32 {
    if phase < increment {
        // Just after the transition.
        let t = phase / increment;
        height * (t + t - t * t - 1.0)
    } else if phase + increment > 1.0 {
        // Just before the next transition.
        let t = (phase - 1.0) / increment;
        height * (t * t + (t + t) + 1.0)
    } else {
        0.0
    }
}

#[derive(Debug, Clone)]
pub struct Dco {
    sample_rate: f32,
    time_per_sample: f32,
    phase: f32,
    sub_output: f32,
    pwm_level: f32,

    // Pitch controls, all in (fractional) semitones except the Hz offset.
    pub(crate) note: SmoothParam,
    pub(crate) transpose: SmoothParam,
    pub(crate) detune_hz: SmoothParam,
    pub(crate) pitch_lfo_depth: SmoothParam,
    pub(crate) pitch_env_depth: SmoothParam,
    pub(crate) bend_depth: SmoothParam,

    // Mixer levels for the three taps.
    pub(crate) saw_level: SmoothParam,
    pub(crate) pulse_level: SmoothParam,
    pub(crate) sub_level: SmoothParam,

    // Pulse-width controls: a manual offset from the 50% midpoint plus LFO
    // and envelope modulation depths. The patch routes the PWM slider to
    // exactly one of the three.
    pub(crate) pwm_width: SmoothParam,
    pub(crate) pwm_lfo_depth: SmoothParam,
    pub(crate) pwm_env_depth: SmoothParam,
}

impl Dco {
    pub fn new(note_number: f32, sample_rate: f32) -> Self {
        let param = |value: f32| SmoothParam::new(value, sample_rate);
        Self {
            sample_rate,
            time_per_sample: 1.0 / sample_rate,
            // The hardware powers up three quarters through the cycle.
            phase: 0.75,
            sub_output: -1.0,
            pwm_level: 0.5,

            note: param(note_number),
            transpose: param(0.0),
            detune_hz: param(0.0),
            pitch_lfo_depth: param(0.0),
            pitch_env_depth: param(0.0),
            bend_depth: param(0.0),

            saw_level: param(0.0),
            pulse_level: param(0.0),
            sub_level: param(0.0),

            pwm_width: param(0.0),
            pwm_lfo_depth: param(0.0),
            pwm_env_depth: param(0.0),
        }
    }

    /// Phase increment for the pitch implied by all ramped controls plus the
    /// per-sample modulation inputs.
    #[inline(always)]
    fn phase_increment(&mut self, lfo_value: f32, env_value: f32, bend_value: f32) -> f32 {
        let note = self.note.advance()
            + self.transpose.advance()
            + lfo_value * self.pitch_lfo_depth.advance()
            + env_value * self.pitch_env_depth.advance()
            + bend_value * self.bend_depth.advance();
        let freq = (note_to_frequency(note) + self.detune_hz.advance())
            .clamp(0.0, self.sample_rate * 0.49);
        freq * self.time_per_sample
    }

    /// Pulse-width comparison level candidate for this sample. The ramps
    /// advance every sample; the result is latched at the cycle wrap so the
    /// width never jumps mid-pulse.
    #[inline(always)]
    fn pwm_candidate(&mut self, lfo_value: f32, env_value: f32) -> f32 {
        let level = 0.5
            + self.pwm_width.advance()
            + lfo_value * self.pwm_lfo_depth.advance()
            + env_value * self.pwm_env_depth.advance();
        level.clamp(PWM_MIN, PWM_MAX)
    }

    /// Render one sample of the summed saw + pulse + sub mix.
    pub fn process(&mut self, lfo_value: f32, env_value: f32, bend_value: f32) -> f32 {
        let previous_sub = self.sub_output;
        let mut sub = previous_sub;

        let increment = self.phase_increment(lfo_value, env_value, bend_value);
        let pwm_candidate = self.pwm_candidate(lfo_value, env_value);

        self.phase += increment;
        if self.phase > 1.0 {
            self.phase -= 1.0;
            self.pwm_level = pwm_candidate;
            // The sub flips once per cycle: a square one octave down.
            sub = if sub > 0.0 { -1.0 } else { 1.0 };
            self.sub_output = sub;
        }

        // Phat sawtooth: a saturating ramp, stepped back down at the wrap.
        let mut saw = self.phase.tanh() * 2.626 - 1.0;
        saw -= poly_blep(self.phase, increment, 1.0);

        // Pulse: comparator against the latched width, corrected at both
        // the wrap and the width-crossing edge.
        let mut pulse = if self.phase > self.pwm_level { 1.0 } else { -1.0 };
        pulse -= poly_blep(self.phase, increment, 1.0);
        let edge_phase = self.phase - self.pwm_level;
        pulse += poly_blep(
            if edge_phase < 0.0 {
                edge_phase + 1.0
            } else {
                edge_phase
            },
            increment,
            1.0,
        );

        // The sub's flip height depends on the direction it flipped from.
        sub -= poly_blep(self.phase, increment, previous_sub);

        saw * self.saw_level.advance()
            + pulse * self.pulse_level.advance()
            + sub * self.sub_level.advance()
    }
}
