//! Ensemble chorus: a modulated multi-tap delay line.
//!
//! The hardware's chorus is a bucket-brigade delay whose read position sweeps
//! with a triangle LFO. Two taps symmetric around a fixed centre offset give
//! the stereo spread; the slow modes collapse to one tap on both channels.
//!
//! Mode changes never happen while the effect is audible: the wet factor
//! ramps to zero first, the mode parameters swap, then the wet factor ramps
//! back up.

use crate::params::SmoothParam;

/// Longest delay the ring buffer must hold, in seconds.
const MAX_DELAY_SECONDS: f32 = 0.0054;
/// Centre of the swept read position, relative to the write head.
const CENTER_OFFSET_SECONDS: f32 = 0.003_505;
/// Wet factor ramp used to gate mode changes.
const MODE_FADE_SECONDS: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChorusMode {
    #[default]
    Off,
    /// Mild chorus.
    ModeI,
    /// Deeper, richer chorus.
    ModeII,
    /// Fast shallow sweep, similar to a rotary speaker.
    ModeIII,
}

impl ChorusMode {
    pub fn from_index(index: u8) -> Self {
        match index {
            1 => ChorusMode::ModeI,
            2 => ChorusMode::ModeII,
            3 => ChorusMode::ModeIII,
            _ => ChorusMode::Off,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ModeParams {
    sweep_freq: f32,
    max_offset_seconds: f32,
    mono: bool,
    wet: f32,
}

fn mode_params(mode: ChorusMode) -> ModeParams {
    match mode {
        ChorusMode::Off => ModeParams {
            sweep_freq: 0.0,
            max_offset_seconds: 0.0,
            mono: false,
            wet: 0.0,
        },
        ChorusMode::ModeI => ModeParams {
            sweep_freq: 0.513,
            max_offset_seconds: 0.001_845,
            mono: true,
            wet: 0.5,
        },
        ChorusMode::ModeII => ModeParams {
            sweep_freq: 0.863,
            max_offset_seconds: 0.001_845,
            mono: true,
            wet: 0.5,
        },
        ChorusMode::ModeIII => ModeParams {
            sweep_freq: 15.175,
            max_offset_seconds: 0.000_2,
            mono: false,
            wet: 0.5,
        },
    }
}

#[derive(Debug, Clone)]
pub struct Chorus {
    ring: Vec<f32>,
    write_index: usize,
    read_offset: f32,
    wet: SmoothParam,
    mode: ChorusMode,
    pending: Option<ModeParams>,

    mono: bool,
    /// LFO state: current offset in (fractional) samples, bouncing between
    /// +/-max_offset by reversing direction rather than wrapping.
    lfo_offset: f32,
    lfo_direction: f32,
    lfo_rate_factor: f32,
    max_offset: f32,
}

impl Chorus {
    pub fn new(sample_rate: f32) -> Self {
        let ring_len = ((sample_rate * MAX_DELAY_SECONDS) as usize).max(4);
        Self {
            ring: vec![0.0; ring_len],
            write_index: 0,
            read_offset: CENTER_OFFSET_SECONDS * sample_rate,
            wet: SmoothParam::new(0.0, sample_rate),
            mode: ChorusMode::Off,
            pending: None,
            mono: false,
            lfo_offset: 0.0,
            lfo_direction: 1.0,
            lfo_rate_factor: 0.0,
            max_offset: 0.0,
        }
    }

    pub fn mode(&self) -> ChorusMode {
        self.mode
    }

    /// Ring length in samples; doubles as the effect's tail length.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Select a chorus mode. The swap is deferred until the wet factor has
    /// ramped to zero; when the effect is already fully dry it applies at
    /// once.
    pub fn set_mode(&mut self, mode: ChorusMode) {
        if mode == self.mode && self.pending.is_none() {
            return;
        }
        self.mode = mode;
        let params = mode_params(mode);
        if self.wet.current() == 0.0 && !self.wet.is_ramping() {
            self.apply(params);
            self.pending = None;
            if params.wet > 0.0 {
                self.wet.ramp_to(params.wet, MODE_FADE_SECONDS);
            }
        } else {
            self.pending = Some(params);
            self.wet.ramp_to(0.0, MODE_FADE_SECONDS);
        }
    }

    fn apply(&mut self, params: ModeParams) {
        let sample_rate = self.wet.sample_rate();
        self.mono = params.mono;
        self.max_offset = params.max_offset_seconds * sample_rate;
        // Per-sample LFO step: a full triangle period covers 4x the depth.
        self.lfo_rate_factor = 4.0 * params.max_offset_seconds * params.sweep_freq;
    }

    pub fn reset(&mut self) {
        self.ring.fill(0.0);
        self.lfo_offset = 0.0;
        self.lfo_direction = 1.0;
    }

    /// Process one dry sample into a stereo pair.
    #[inline]
    pub fn process(&mut self, dry: f32) -> (f32, f32) {
        self.ring[self.write_index] = dry;
        self.write_index += 1;
        if self.write_index >= self.ring.len() {
            self.write_index = 0;
        }

        let wet = self.wet.advance();
        if self.wet.take_completed() {
            if let Some(params) = self.pending.take() {
                self.apply(params);
                if params.wet > 0.0 {
                    self.wet.ramp_to(params.wet, MODE_FADE_SECONDS);
                }
            }
        }

        if wet == 0.0 {
            return (dry, dry);
        }

        let offset = self.advance_lfo();
        let center = self.write_index as f32 + self.read_offset;
        let left = self.read_interpolated(center - offset);
        let right = if self.mono {
            left
        } else {
            self.read_interpolated(center + offset)
        };

        let dry_part = dry * (1.0 - wet);
        (dry_part + left * wet, dry_part + right * wet)
    }

    /// Triangle sweep of the read offset, phase-continuous under parameter
    /// changes because overshoot reverses direction instead of wrapping.
    #[inline(always)]
    fn advance_lfo(&mut self) -> f32 {
        let step = self.lfo_rate_factor;
        let mut offset = self.lfo_offset;
        if self.lfo_direction > 0.0 {
            offset += step;
            if offset > self.max_offset {
                self.lfo_direction = -1.0;
                offset = self.lfo_offset - step;
            }
        } else {
            offset -= step;
            if offset < -self.max_offset {
                self.lfo_direction = 1.0;
                offset = self.lfo_offset + step;
            }
        }
        self.lfo_offset = offset;
        offset
    }

    #[inline(always)]
    fn read_interpolated(&self, index: f32) -> f32 {
        let len = self.ring.len();
        let whole = index as usize;
        let fraction = index - whole as f32;
        let first = self.ring[whole % len];
        let second = self.ring[(whole + 1) % len];
        first * (1.0 - fraction) + second * fraction
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: f32 = 48000.0;

    #[test]
    fn off_mode_passes_dry_through() {
        let mut chorus = Chorus::new(SAMPLE_RATE);
        for i in 0..100 {
            let x = (i as f32 * 0.1).sin();
            let (l, r) = chorus.process(x);
            assert_eq!(l, x);
            assert_eq!(r, x);
        }
    }

    #[test]
    fn ring_round_trip_reproduces_written_sequence() {
        let mut chorus = Chorus::new(SAMPLE_RATE);
        let len = chorus.len();
        let n = len / 2;
        let sequence: Vec<f32> = (0..n).map(|i| (i as f32 * 0.37).sin()).collect();
        for &s in &sequence {
            chorus.process(s);
        }
        // After n writes, the sample written k steps ago sits at
        // write_index - k; read it back through the interpolated tap.
        for k in 1..=n {
            let index = chorus.write_index as f32 - k as f32 + chorus.len() as f32;
            let got = chorus.read_interpolated(index);
            let want = sequence[n - k];
            assert!(
                (got - want).abs() < 1e-5,
                "sample {} back: got {} want {}",
                k,
                got,
                want
            );
        }
    }

    #[test]
    fn mode_change_waits_for_wet_to_reach_zero() {
        let mut chorus = Chorus::new(SAMPLE_RATE);
        chorus.set_mode(ChorusMode::ModeI);
        // Let the wet factor ramp fully up.
        for _ in 0..(SAMPLE_RATE * 0.05) as usize {
            chorus.process(0.0);
        }
        assert!(chorus.wet.current() > 0.4);

        chorus.set_mode(ChorusMode::ModeIII);
        assert!(chorus.pending.is_some(), "swap must be deferred");
        assert!(chorus.mono, "old mode params must persist until dry");

        let mut swapped_at_wet = f32::NAN;
        for _ in 0..(SAMPLE_RATE * 0.1) as usize {
            chorus.process(0.0);
            if chorus.pending.is_none() && swapped_at_wet.is_nan() {
                // The up-ramp starts on the *next* sample, so right after the
                // swap the wet factor must still read zero.
                swapped_at_wet = chorus.wet.current();
            }
        }
        assert!(
            swapped_at_wet <= f32::EPSILON,
            "mode swapped while wet was {}",
            swapped_at_wet
        );
        assert!(!chorus.mono, "new mode params must be live");
        assert!(chorus.wet.current() > 0.4, "wet must ramp back up");
    }

    #[test]
    fn immediate_swap_when_already_dry() {
        let mut chorus = Chorus::new(SAMPLE_RATE);
        chorus.set_mode(ChorusMode::ModeII);
        assert!(chorus.pending.is_none());
        assert!(chorus.mono);
    }

    #[test]
    fn slow_modes_are_mono_fast_mode_is_stereo() {
        let mut chorus = Chorus::new(SAMPLE_RATE);
        chorus.set_mode(ChorusMode::ModeI);
        let mut seed = 3u32;
        for _ in 0..(SAMPLE_RATE * 0.1) as usize {
            let (l, r) = chorus.process(rand_ish(&mut seed));
            assert_eq!(l, r, "mode I must be mono");
        }

        let mut chorus = Chorus::new(SAMPLE_RATE);
        chorus.set_mode(ChorusMode::ModeIII);
        let mut seed = 7u32;
        let mut diverged = false;
        for _ in 0..(SAMPLE_RATE * 0.2) as usize {
            let (l, r) = chorus.process(rand_ish(&mut seed));
            if (l - r).abs() > 1e-6 {
                diverged = true;
            }
        }
        assert!(diverged, "mode III must produce a stereo spread");
    }

    fn rand_ish(state: &mut u32) -> f32 {
        *state = state.wrapping_mul(1664525).wrapping_add(1013904223);
        (*state >> 16) as f32 / 32768.0 - 1.0
    }

    #[test]
    fn lfo_offset_bounces_within_depth() {
        let mut chorus = Chorus::new(SAMPLE_RATE);
        chorus.set_mode(ChorusMode::ModeII);
        for _ in 0..(SAMPLE_RATE * 2.0) as usize {
            chorus.process(0.5);
            assert!(
                chorus.lfo_offset.abs() <= chorus.max_offset + chorus.lfo_rate_factor,
                "offset escaped: {} vs max {}",
                chorus.lfo_offset,
                chorus.max_offset
            );
        }
    }
}
