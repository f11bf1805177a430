//! Low-frequency oscillator with an onset contour.
//!
//! The LFO is a free-running phase accumulator whose output is shaped by a
//! private delay+attack envelope (the hardware's LFO delay behaviour). The
//! contour is an amplitude fade, not a note envelope: it holds at full level
//! until released and fades out over a fixed time.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::envelope::Envelope;
use crate::utils::interpolated_lookup;

/// Rate slider (0..1) to frequency in Hz, measured from the hardware.
const RATE_CURVE: [f32; 5] = [0.3, 0.85, 3.39, 11.49, 22.22];
/// Delay slider (0..1) to contour delay in seconds.
const DELAY_CURVE: [f32; 5] = [0.0, 0.0639, 0.85, 1.2, 2.685];
/// Delay slider (0..1) to contour fade-in in seconds.
const ATTACK_CURVE: [f32; 5] = [0.0, 0.053, 0.188, 0.348, 1.15];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LfoWaveform {
    #[default]
    Triangle,
    Sine,
    Square,
    /// A single-sample 1.0 pulse at each cycle restart; useful as an
    /// auto-retrigger source.
    Pulse,
    /// Random level redrawn once per cycle.
    SampleHold,
    /// Random level redrawn every sample.
    Noise,
}

#[derive(Debug, Clone)]
pub struct Lfo {
    sample_rate: f32,
    phase: f32,
    increment: f32,
    waveform: LfoWaveform,
    value: f32,
    restarted: bool,
    contour: Envelope,
    rng: SmallRng,
}

impl Lfo {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            // Start at the end of a cycle so the first active sample counts
            // as a restart.
            phase: 1.0,
            increment: 0.0,
            waveform: LfoWaveform::default(),
            value: 0.0,
            restarted: false,
            contour: Envelope::lfo_contour(sample_rate),
            // Deterministic: the random waveforms repeat across renders.
            rng: SmallRng::seed_from_u64(0x4C46_4F00),
        }
    }

    pub fn set_waveform(&mut self, waveform: LfoWaveform) {
        self.waveform = waveform;
    }

    /// Configure from direct values: frequency in Hz, contour delay and
    /// fade-in in seconds.
    pub fn set_values(&mut self, frequency: f32, delay: f32, attack: f32) {
        self.increment = frequency.max(0.0) / self.sample_rate;
        self.contour.set_contour(delay, attack);
    }

    /// Configure from the hardware's normalized rate/delay sliders.
    pub fn set_sliders(&mut self, rate: f32, delay: f32) {
        let frequency = interpolated_lookup(rate * (RATE_CURVE.len() - 1) as f32, &RATE_CURVE);
        let delay_duration =
            interpolated_lookup(delay * (DELAY_CURVE.len() - 1) as f32, &DELAY_CURVE);
        let attack_duration =
            interpolated_lookup(delay * (ATTACK_CURVE.len() - 1) as f32, &ATTACK_CURVE);
        self.set_values(frequency, delay_duration, attack_duration);
    }

    /// Trigger (or retrigger) the contour. The phase only rewinds when the
    /// LFO was silent, so overlapping notes do not yank an audible LFO.
    pub fn trigger(&mut self) {
        if !self.contour.is_active() {
            self.phase = 1.0;
            self.value = 0.0;
        }
        self.contour.trigger();
    }

    pub fn release(&mut self) {
        self.contour.release();
    }

    pub fn shutdown(&mut self) {
        self.contour.shutdown();
    }

    pub fn is_active(&self) -> bool {
        self.contour.is_active()
    }

    /// True if the latest `process` call wrapped the phase.
    pub fn restarted(&self) -> bool {
        self.restarted
    }

    /// Produce the next LFO value (contour x waveform, in [-1, 1]).
    pub fn process(&mut self) -> f32 {
        if !self.contour.is_active() {
            return 0.0;
        }

        self.restarted = false;
        self.phase += self.increment;
        if self.phase > 1.0 {
            self.restarted = true;
            self.phase -= 1.0;
        }

        let contour = self.contour.process();
        if contour == 0.0 {
            return 0.0;
        }

        let value = match self.waveform {
            LfoWaveform::Triangle => {
                let mut v = self.phase * 4.0;
                if v > 1.0 {
                    v = 2.0 - v;
                }
                if v < -1.0 {
                    v = -2.0 - v;
                }
                v
            }
            LfoWaveform::Sine => (self.phase * std::f32::consts::TAU).sin(),
            LfoWaveform::Square => {
                if self.phase > 0.5 {
                    -1.0
                } else {
                    1.0
                }
            }
            LfoWaveform::Pulse => {
                if self.restarted {
                    1.0
                } else {
                    0.0
                }
            }
            LfoWaveform::SampleHold => {
                if self.restarted {
                    self.rng.random::<f32>() * 2.0 - 1.0
                } else {
                    self.value
                }
            }
            LfoWaveform::Noise => self.rng.random::<f32>() * 2.0 - 1.0,
        };

        self.value = value;
        contour * value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: f32 = 48000.0;

    #[test]
    fn silent_until_triggered() {
        let mut lfo = Lfo::new(SAMPLE_RATE);
        lfo.set_values(5.0, 0.0, 0.0);
        for _ in 0..100 {
            assert_eq!(lfo.process(), 0.0);
        }
    }

    #[test]
    fn delay_defers_onset_then_fades_in() {
        let mut lfo = Lfo::new(SAMPLE_RATE);
        lfo.set_values(50.0, 0.01, 0.005);
        lfo.trigger();

        let delay_samples = (SAMPLE_RATE * 0.01) as usize;
        let mut peak_during_delay = 0.0f32;
        for _ in 0..delay_samples - 2 {
            peak_during_delay = peak_during_delay.max(lfo.process().abs());
        }
        assert_eq!(peak_during_delay, 0.0);

        let mut peak_after = 0.0f32;
        for _ in 0..(SAMPLE_RATE * 0.1) as usize {
            peak_after = peak_after.max(lfo.process().abs());
        }
        assert!(peak_after > 0.9, "LFO reached only {}", peak_after);
    }

    #[test]
    fn triangle_covers_full_bipolar_range() {
        let mut lfo = Lfo::new(SAMPLE_RATE);
        lfo.set_values(10.0, 0.0, 0.0);
        lfo.trigger();
        let mut min = f32::MAX;
        let mut max = f32::MIN;
        // Skip the fade-in, then measure a few cycles.
        for _ in 0..(SAMPLE_RATE * 0.5) as usize {
            lfo.process();
        }
        for _ in 0..(SAMPLE_RATE * 0.5) as usize {
            let v = lfo.process();
            min = min.min(v);
            max = max.max(v);
        }
        assert!(max > 0.95 && min < -0.95, "range was {}..{}", min, max);
    }

    #[test]
    fn restart_flag_fires_once_per_cycle() {
        let mut lfo = Lfo::new(SAMPLE_RATE);
        lfo.set_values(100.0, 0.0, 0.0);
        lfo.trigger();
        let samples = SAMPLE_RATE as usize; // one second
        let mut restarts = 0;
        for _ in 0..samples {
            lfo.process();
            if lfo.restarted() {
                restarts += 1;
            }
        }
        // 100 Hz for one second: 100 restarts, give or take the first.
        assert!((99..=101).contains(&restarts), "saw {} restarts", restarts);
    }

    #[test]
    fn sample_hold_changes_only_on_restart() {
        let mut lfo = Lfo::new(SAMPLE_RATE);
        lfo.set_waveform(LfoWaveform::SampleHold);
        lfo.set_values(10.0, 0.0, 0.0);
        lfo.trigger();
        // Let the contour settle at full level.
        for _ in 0..(SAMPLE_RATE * 0.5) as usize {
            lfo.process();
        }
        let mut held = lfo.process();
        for _ in 0..(SAMPLE_RATE * 0.2) as usize {
            let v = lfo.process();
            if lfo.restarted() {
                held = v;
            } else {
                assert_eq!(v, held, "level must hold between restarts");
            }
        }
    }

    #[test]
    fn release_fades_back_to_silence() {
        let mut lfo = Lfo::new(SAMPLE_RATE);
        lfo.set_values(5.0, 0.0, 0.0);
        lfo.trigger();
        for _ in 0..(SAMPLE_RATE * 0.2) as usize {
            lfo.process();
        }
        lfo.release();
        for _ in 0..(SAMPLE_RATE * 0.5) as usize {
            lfo.process();
        }
        assert!(!lfo.is_active());
        assert_eq!(lfo.process(), 0.0);
    }

    #[test]
    fn slider_curves_hit_documented_endpoints() {
        let mut lfo = Lfo::new(SAMPLE_RATE);
        lfo.set_sliders(1.0, 0.0);
        assert!((lfo.increment * SAMPLE_RATE - 22.22).abs() < 0.01);
        lfo.set_sliders(0.0, 0.0);
        assert!((lfo.increment * SAMPLE_RATE - 0.3).abs() < 0.01);
    }
}
