//! A single polyphony slot.
//!
//! Each voice composes one DCO, one noise source, one diode-ladder filter
//! and two envelopes (VCA and modulation). The VCA envelope's phase *is* the
//! voice lifecycle: idle, triggered, released, shutting-down.

use crate::dco::Dco;
use crate::envelope::Envelope;
use crate::filters::DiodeLadder;
use crate::noise::Noise;
use crate::params::SmoothParam;
use crate::patch::{Patch, PwmMod, VcaType};

/// Ramp length for patch-driven targets while the voice is audible.
const UPDATE_RAMP_SAMPLES: f32 = 128.0;
/// Pitch-bend lever range in semitones.
const BEND_RANGE_SEMITONES: f32 = 2.0;
/// Envelope-to-cutoff depth at full slider, in octaves.
const VCF_ENV_OCTAVES: f32 = 5.0;
/// LFO-to-cutoff depth at full slider, in octaves.
const VCF_LFO_OCTAVES: f32 = 2.0;

/// Map the normalized cutoff slider onto 20 Hz .. 20 kHz.
fn vcf_cutoff_hz(slider: f32) -> f32 {
    20.0 * 1000f32.powf(slider)
}

/// The hardware's nonlinear slider-to-seconds taper for envelope times.
fn attack_seconds(slider: f32) -> f32 {
    0.001 + ((slider * 5.0).exp() - 1.0) / (5f32.exp() - 1.0) * 3.25
}

fn decay_seconds(slider: f32) -> f32 {
    0.002 + ((slider * 4.0).exp() - 1.0) / (4f32.exp() - 1.0) * slider * 19.78
}

#[derive(Debug)]
pub struct Voice {
    sample_rate: f32,
    note_number: u8,
    trigger_velocity: u8,
    release_velocity: u8,
    triggered_at: u64,
    released_at: u64,

    dco: Dco,
    noise: Noise,
    filter: DiodeLadder,
    vca_env: Envelope,
    mod_env: Envelope,

    // Filter controls; the per-sample cutoff combines these with the
    // modulation inputs before it reaches the ladder.
    cutoff: SmoothParam,
    resonance: SmoothParam,
    env_depth: SmoothParam,
    lfo_depth: SmoothParam,
    key_depth: SmoothParam,
}

impl Voice {
    pub fn new(sample_rate: f32, index: usize) -> Self {
        let param = |value: f32| SmoothParam::new(value, sample_rate);
        Self {
            sample_rate,
            note_number: 0,
            trigger_velocity: 64,
            release_velocity: 64,
            triggered_at: 0,
            released_at: 0,
            dco: Dco::new(60.0, sample_rate),
            // Decorrelate the noise sources across the pool.
            noise: Noise::new(sample_rate, (index as u16).wrapping_mul(0x2717) ^ 0x1c3),
            filter: DiodeLadder::new(sample_rate),
            vca_env: Envelope::adsr(sample_rate),
            mod_env: Envelope::adsr(sample_rate),
            cutoff: param(1000.0),
            resonance: param(0.0),
            env_depth: param(0.0),
            lfo_depth: param(0.0),
            key_depth: param(0.0),
        }
    }

    pub fn note_number(&self) -> u8 {
        self.note_number
    }

    pub fn trigger_velocity(&self) -> u8 {
        self.trigger_velocity
    }

    pub fn release_velocity(&self) -> u8 {
        self.release_velocity
    }

    pub fn triggered_at(&self) -> u64 {
        self.triggered_at
    }

    pub fn released_at(&self) -> u64 {
        self.released_at
    }

    pub fn is_active(&self) -> bool {
        self.vca_env.is_active()
    }

    pub fn is_released(&self) -> bool {
        self.vca_env.is_released()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.vca_env.is_shutting_down()
    }

    /// Start (or retrigger) a note on this voice.
    pub fn note_on(&mut self, note: u8, velocity: u8, now: u64, patch: &Patch) {
        self.note_number = note;
        self.trigger_velocity = velocity;
        self.release_velocity = 64;
        self.triggered_at = now;
        self.update(patch);
        self.vca_env.trigger();
        self.mod_env.trigger();
    }

    /// Release the note held by this voice.
    pub fn note_off(&mut self, velocity: u8, now: u64, patch: &Patch) {
        self.release_velocity = velocity;
        self.released_at = now;
        self.update(patch);
        self.vca_env.release();
        self.mod_env.release();
    }

    /// Force the voice silent within the fixed shutdown fade. Used for
    /// voice stealing and all-notes-off.
    pub fn shutdown(&mut self) {
        self.vca_env.shutdown();
    }

    /// Clear the filter's recursive state (non-finite containment).
    pub fn reset_filter(&mut self) {
        self.filter.reset();
    }

    /// Recompute every ramped target from the patch. Changes smooth over
    /// ~128 samples while the voice is audible and apply instantly when it
    /// is not.
    pub fn update(&mut self, patch: &Patch) {
        let ramp = if self.vca_env.is_active() {
            UPDATE_RAMP_SAMPLES / self.sample_rate
        } else {
            0.0
        };

        self.dco.note.ramp_to(self.note_number as f32, ramp);
        self.dco.bend_depth.ramp_to(BEND_RANGE_SEMITONES, ramp);
        self.dco.pitch_lfo_depth.ramp_to(patch.dco.lfo, ramp);
        self.dco.pitch_env_depth.ramp_to(0.0, ramp);

        // The range switch quantizes to 16' / 8' / 4'.
        let transpose = if patch.dco.range < 0.25 {
            -12.0
        } else if patch.dco.range > 0.75 {
            12.0
        } else {
            0.0
        };
        self.dco.transpose.ramp_to(transpose, ramp);

        // The PWM slider drives exactly one of the three width controls.
        let pwm_depth = patch.dco.pwm * 0.48;
        let (manual, lfo_depth, env_depth) = match patch.dco.pwm_mod {
            PwmMod::Manual => (pwm_depth, 0.0, 0.0),
            PwmMod::Lfo => (0.0, pwm_depth, 0.0),
            PwmMod::Env => (0.0, 0.0, pwm_depth),
        };
        self.dco.pwm_width.ramp_to(manual, ramp);
        self.dco.pwm_lfo_depth.ramp_to(lfo_depth, ramp);
        self.dco.pwm_env_depth.ramp_to(env_depth, ramp);

        // Relative source volumes, compressed when several run at once.
        let saw_level = if patch.dco.saw { 0.2 } else { 0.0 };
        let pulse_level = if patch.dco.pulse { 0.2 } else { 0.0 };
        let sub_level = if patch.dco.sub {
            patch.dco.sub_amount * 0.195
        } else {
            0.0
        };
        let noise_level = patch.dco.noise * 0.21;
        let sum = saw_level + pulse_level + sub_level + noise_level;
        let mix_factor = if sum > 0.3 {
            2.0 - (sum - 0.3) * 1.5
        } else {
            2.0
        };
        self.dco.saw_level.ramp_to(saw_level * mix_factor, ramp);
        self.dco.pulse_level.ramp_to(pulse_level * mix_factor, ramp);
        self.dco.sub_level.ramp_to(sub_level * mix_factor, ramp);
        self.noise.level.ramp_to(noise_level * mix_factor, ramp);

        self.cutoff.ramp_to(vcf_cutoff_hz(patch.vcf.frequency), ramp);
        self.resonance.ramp_to(patch.vcf.resonance, ramp);
        let env_sign = if patch.vcf.mod_positive { 1.0 } else { -1.0 };
        self.env_depth
            .ramp_to(env_sign * patch.vcf.env_mod * VCF_ENV_OCTAVES, ramp);
        self.lfo_depth
            .ramp_to(patch.vcf.lfo_mod * VCF_LFO_OCTAVES, ramp);
        self.key_depth.ramp_to(patch.vcf.key_mod, ramp);

        let attack = attack_seconds(patch.env.attack);
        let decay = decay_seconds(patch.env.decay);
        let sustain = patch.env.sustain;
        let release = decay_seconds(patch.env.release);

        match patch.vca_type {
            VcaType::Gate => {
                // Gate mode ignores the sliders: fast attack, full sustain,
                // fast release. Retriggering during the sustain is inaudible,
                // so only a non-releasing envelope is restarted.
                self.vca_env.set_adsr(0.003, 1.0, 1.0, 0.006);
                if self.vca_env.is_active() && !self.vca_env.is_released() {
                    self.vca_env.trigger();
                }
            }
            VcaType::Env => {
                self.vca_env.set_adsr(attack, decay, sustain, release);
            }
        }
        self.mod_env.set_adsr(attack, decay, sustain, release);
    }

    /// Render one sample. Idle voices return immediately.
    #[inline]
    pub fn process(&mut self, lfo_value: f32, bend_value: f32) -> f32 {
        let vca_value = self.vca_env.process();
        if !self.vca_env.is_active() {
            return 0.0;
        }

        let mod_env_value = self.mod_env.process();

        let mut sample = self.dco.process(lfo_value, mod_env_value, bend_value);
        sample += self.noise.process();

        let base_cutoff = self.cutoff.advance();
        let octaves = mod_env_value * self.env_depth.advance()
            + lfo_value * self.lfo_depth.advance()
            + (self.note_number as f32 - 60.0) / 12.0 * self.key_depth.advance();
        self.filter.set_cutoff(base_cutoff * octaves.exp2());
        self.filter.set_resonance(self.resonance.advance());
        sample = self.filter.process(sample);

        sample * vca_value
    }
}
