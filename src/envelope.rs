//! Multi-segment analog-style envelopes.
//!
//! Segments model the charge/discharge of an RC network toward a target that
//! lies beyond the segment's usable range, so the curve still has slope when
//! the segment hands over. An [`Envelope`] chains four segments into the
//! attack/decay-sustain/release/shutdown state machine used by the VCA and
//! modulation envelopes, and (with a delay segment) by the LFO fade-in
//! contour.

/// Time constant for the VCA/mod envelope attack curve.
const ADSR_ATTACK_TCO: f32 = 0.632;
/// Time constant for the VCA/mod envelope decay and release curves.
const ADSR_DECAY_TCO: f32 = 0.007_083_4; // exp(-4.95)
/// Forced-silence fade used for voice stealing and all-notes-off.
const ADSR_SHUTDOWN_SECONDS: f32 = 0.002;

const CONTOUR_ATTACK_TCO: f32 = 0.03;
const CONTOUR_RELEASE_TCO: f32 = 0.025;
const CONTOUR_RELEASE_SECONDS: f32 = 0.1;
const CONTOUR_SHUTDOWN_SECONDS: f32 = 0.001;

/// One phase of an envelope. Produces the next value from the previous one;
/// completion is judged separately, on the candidate value, so that a single
/// sample crosses at most one segment boundary.
#[derive(Debug, Clone)]
enum Segment {
    Attack {
        tco: f32,
        coeff: f32,
        offset: f32,
        target: f32,
        /// Clamp at the target and never complete: the segment doubles as a
        /// hold phase (used by the LFO contour).
        hold_at_target: bool,
    },
    Decay {
        tco: f32,
        coeff: f32,
        offset: f32,
        target: f32,
        /// Clamp at the target and never complete: this is the sustain.
        sustain_at_end: bool,
    },
    Delay {
        total_samples: i64,
        remaining: i64,
    },
    Shutdown {
        rate: f32,
    },
}

impl Segment {
    fn attack(tco: f32, target: f32, hold_at_target: bool) -> Self {
        Segment::Attack {
            tco,
            coeff: 0.0,
            offset: 0.0,
            target,
            hold_at_target,
        }
    }

    fn decay(tco: f32, target: f32, sustain_at_end: bool) -> Self {
        Segment::Decay {
            tco,
            coeff: 0.0,
            offset: 0.0,
            target,
            sustain_at_end,
        }
    }

    fn delay() -> Self {
        Segment::Delay {
            total_samples: 0,
            remaining: 0,
        }
    }

    fn shutdown(seconds: f32, sample_rate: f32) -> Self {
        Segment::Shutdown {
            rate: 1.0 / (seconds * sample_rate),
        }
    }

    /// Configure the segment to span `seconds` over its full 0..1 (attack)
    /// or 1..0 (decay) range. Delay segments may be zero-length; the curved
    /// segments clamp to at least one sample.
    fn set_duration(&mut self, seconds: f32, sample_rate: f32) {
        let samples = (sample_rate * seconds).max(1.0);
        match self {
            Segment::Attack {
                tco, coeff, offset, ..
            } => {
                *coeff = (-((1.0 + *tco) / *tco).ln() / samples).exp();
                *offset = (1.0 + *tco) * (1.0 - *coeff);
            }
            Segment::Decay {
                tco,
                coeff,
                offset,
                target,
                ..
            } => {
                *coeff = (-((1.0 + *tco) / *tco).ln() / samples).exp();
                *offset = (*target - *tco) * (1.0 - *coeff);
            }
            Segment::Delay {
                total_samples,
                remaining,
            } => {
                let new_total = (sample_rate * seconds).max(0.0) as i64;
                // Keep an in-flight countdown consistent with the new length.
                *remaining += new_total - *total_samples;
                *total_samples = new_total;
            }
            Segment::Shutdown { rate } => {
                *rate = 1.0 / samples;
            }
        }
    }

    /// Retarget a decay segment (its offset depends on the target).
    fn set_target(&mut self, new_target: f32) {
        if let Segment::Decay { target, .. } = self {
            *target = new_target;
        }
    }

    fn reset(&mut self) {
        if let Segment::Delay {
            total_samples,
            remaining,
        } = self
        {
            *remaining = *total_samples;
        }
    }

    #[inline(always)]
    fn advance(&mut self, previous: f32) -> f32 {
        match self {
            Segment::Attack {
                coeff,
                offset,
                target,
                hold_at_target,
                ..
            } => {
                let value = previous * *coeff + *offset;
                if *hold_at_target && value > *target {
                    *target
                } else {
                    value
                }
            }
            Segment::Decay {
                coeff,
                offset,
                target,
                sustain_at_end,
                ..
            } => {
                let value = previous * *coeff + *offset;
                if *sustain_at_end && value < *target {
                    *target
                } else {
                    value
                }
            }
            Segment::Delay { remaining, .. } => {
                *remaining -= 1;
                previous
            }
            Segment::Shutdown { rate } => previous - *rate,
        }
    }

    #[inline(always)]
    fn is_complete(&self, value: f32) -> bool {
        match self {
            Segment::Attack { target, .. } => value > *target,
            Segment::Decay { target, .. } => value < *target,
            Segment::Delay { remaining, .. } => *remaining <= 0,
            Segment::Shutdown { .. } => value <= 0.0,
        }
    }
}

/// Ordered segment sequence forming an envelope state machine.
///
/// The phase is `None` when inactive and otherwise indexes the current
/// segment; it is mutated only by `trigger`, `release`, `shutdown` and the
/// per-sample `process`.
#[derive(Debug, Clone)]
pub struct Envelope {
    segments: [Segment; 4],
    phase: Option<usize>,
    current: f32,
    sample_rate: f32,
}

impl Envelope {
    /// Attack / decay-to-sustain / release / shutdown, the voice envelope.
    pub fn adsr(sample_rate: f32) -> Self {
        Self {
            segments: [
                Segment::attack(ADSR_ATTACK_TCO, 1.0, false),
                Segment::decay(ADSR_DECAY_TCO, 0.0, true),
                Segment::decay(ADSR_DECAY_TCO, 0.0, false),
                Segment::shutdown(ADSR_SHUTDOWN_SECONDS, sample_rate),
            ],
            phase: None,
            current: 0.0,
            sample_rate,
        }
    }

    /// Delay / fade-in-and-hold / release / shutdown, the LFO onset contour.
    pub fn lfo_contour(sample_rate: f32) -> Self {
        let mut env = Self {
            segments: [
                Segment::delay(),
                Segment::attack(CONTOUR_ATTACK_TCO, 1.0, true),
                Segment::decay(CONTOUR_RELEASE_TCO, 0.0, false),
                Segment::shutdown(CONTOUR_SHUTDOWN_SECONDS, sample_rate),
            ],
            phase: None,
            current: 0.0,
            sample_rate,
        };
        env.segments[2].set_duration(CONTOUR_RELEASE_SECONDS, sample_rate);
        env
    }

    /// Configure attack/decay/release durations (seconds) and sustain level.
    pub fn set_adsr(&mut self, attack: f32, decay: f32, sustain: f32, release: f32) {
        let sample_rate = self.sample_rate;
        self.segments[0].set_duration(attack, sample_rate);
        self.segments[1].set_target(sustain);
        self.segments[1].set_duration(decay, sample_rate);
        self.segments[2].set_duration(release, sample_rate);
    }

    /// Configure the contour's delay and fade-in durations (seconds).
    pub fn set_contour(&mut self, delay: f32, attack: f32) {
        let sample_rate = self.sample_rate;
        self.segments[0].set_duration(delay, sample_rate);
        self.segments[1].set_duration(attack, sample_rate);
    }

    /// Start (or restart) the envelope from its first segment. The running
    /// value is kept, so a retrigger picks up from the current level without
    /// a step.
    pub fn trigger(&mut self) {
        for segment in &mut self.segments {
            segment.reset();
        }
        self.phase = Some(0);
    }

    /// Jump to the release segment. A no-op when inactive.
    pub fn release(&mut self) {
        if self.phase.is_some() {
            self.phase = Some(self.segments.len() - 2);
        }
    }

    /// Force the shutdown segment, reaching silence in bounded time from any
    /// phase. A no-op when inactive.
    pub fn shutdown(&mut self) {
        if self.phase.is_some() {
            self.phase = Some(self.segments.len() - 1);
        }
    }

    /// Produce the envelope value for the current sample.
    ///
    /// A completed segment hands the *previous* value to its successor within
    /// the same sample, so segments of zero effective duration cannot stall.
    #[inline]
    pub fn process(&mut self) -> f32 {
        if let Some(mut phase) = self.phase {
            loop {
                let candidate = self.segments[phase].advance(self.current);
                if self.segments[phase].is_complete(candidate) {
                    phase += 1;
                    if phase >= self.segments.len() {
                        self.current = 0.0;
                        self.phase = None;
                        break;
                    }
                    self.phase = Some(phase);
                } else {
                    self.current = candidate;
                    self.phase = Some(phase);
                    break;
                }
            }
        }
        self.current
    }

    pub fn is_active(&self) -> bool {
        self.phase.is_some()
    }

    /// True once the envelope has left its attack/sustain phases (release or
    /// shutdown).
    pub fn is_released(&self) -> bool {
        matches!(self.phase, Some(p) if p >= self.segments.len() - 2)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.phase == Some(self.segments.len() - 1)
    }

    pub fn value(&self) -> f32 {
        self.current
    }
}
