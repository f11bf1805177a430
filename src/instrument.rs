//! The instrument: voice pool, note allocation and the output chain.
//!
//! Owns every voice exclusively. Control messages are drained once per block
//! (block granularity for control, per-sample ramps for smoothness); audio is
//! summed across voices, scaled by the master VCA, tone-shaped by the
//! high-pass, then spread to stereo by the chorus.

use heapless::Deque;

use crate::chorus::{Chorus, ChorusMode};
use crate::filters::Biquad;
use crate::lfo::{Lfo, LfoWaveform};
use crate::messages::{
    ControlMessage, CC_ALL_NOTES_OFF, CC_SUSTAIN_PEDAL, SUSTAIN_ON_THRESHOLD,
};
use crate::params::SmoothParam;
use crate::patch::Patch;
use crate::voice::Voice;

pub const DEFAULT_VOICE_COUNT: usize = 6;

/// Notes that arrive with no free voice wait here. Bounded; overflow drops
/// the oldest waiting note.
const MAX_WAITING_NOTES: usize = 16;
/// Control-change smoothing window (pitch bend, master VCA).
const CONTROL_RAMP_SAMPLES: f32 = 128.0;

#[derive(Debug, Clone, Copy)]
struct PendingNote {
    note: u8,
    velocity: u8,
}

type UnhandledControlHook = Box<dyn FnMut(u8, u8) + Send>;

pub struct Instrument {
    sample_rate: f32,
    voices: Vec<Voice>,
    waiting: Deque<PendingNote, MAX_WAITING_NOTES>,
    patch: Patch,
    pending_patch: Option<Box<Patch>>,

    lfo: Lfo,
    pitch_bend: SmoothParam,
    vca_level: SmoothParam,
    hpf: Biquad,
    hpf_enabled: bool,
    chorus: Chorus,

    /// Note-offs received while the pedal is held, recorded per note number.
    sustained: [bool; 128],
    pedal_down: bool,

    /// Sample clock; voice timestamps come from here.
    clock: u64,
    /// Keepalive countdown that lets the chorus tail drain after silence.
    tail_samples: u32,

    on_unhandled_control: Option<UnhandledControlHook>,
}

impl Instrument {
    pub fn new(sample_rate: f32, voice_count: usize, patch: Patch) -> Self {
        let voice_count = if voice_count == 0 {
            DEFAULT_VOICE_COUNT
        } else {
            voice_count
        };
        let mut instrument = Self {
            sample_rate,
            voices: (0..voice_count)
                .map(|index| Voice::new(sample_rate, index))
                .collect(),
            waiting: Deque::new(),
            patch: Patch::default(),
            pending_patch: None,
            lfo: Lfo::new(sample_rate),
            pitch_bend: SmoothParam::new(0.0, sample_rate),
            vca_level: SmoothParam::new(0.5, sample_rate),
            hpf: Biquad::new(sample_rate),
            hpf_enabled: false,
            chorus: Chorus::new(sample_rate),
            sustained: [false; 128],
            pedal_down: false,
            clock: 0,
            tail_samples: 0,
            on_unhandled_control: None,
        };
        instrument.apply_patch(patch);
        instrument
    }

    /// Install a hook for control changes the engine does not interpret.
    /// They are forwarded here rather than dropped.
    pub fn set_unhandled_control_hook(&mut self, hook: UnhandledControlHook) {
        self.on_unhandled_control = Some(hook);
    }

    pub fn patch(&self) -> &Patch {
        &self.patch
    }

    /// The LFO waveform is a front-panel switch rather than a patch field.
    pub fn set_lfo_waveform(&mut self, waveform: LfoWaveform) {
        self.lfo.set_waveform(waveform);
    }

    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|v| v.is_active()).count()
    }

    pub fn waiting_notes(&self) -> usize {
        self.waiting.len()
    }

    pub fn handle_message(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::NoteOn { note, velocity } => self.note_on(note, velocity),
            ControlMessage::NoteOff { note, velocity } => self.note_off(note, velocity),
            ControlMessage::PitchBend { value } => {
                let ramp = CONTROL_RAMP_SAMPLES / self.sample_rate;
                self.pitch_bend.ramp_to(value.clamp(-1.0, 1.0), ramp);
            }
            ControlMessage::ControlChange { control, value } => {
                self.control_change(control, value)
            }
            ControlMessage::ShutdownAll => self.shutdown_all(),
            ControlMessage::UpdatePatch(patch) => self.pending_patch = Some(patch),
        }
    }

    fn control_change(&mut self, control: u8, value: u8) {
        match control {
            CC_SUSTAIN_PEDAL => self.set_pedal(value >= SUSTAIN_ON_THRESHOLD),
            CC_ALL_NOTES_OFF => self.shutdown_all(),
            _ => match &mut self.on_unhandled_control {
                Some(hook) => hook(control, value),
                None => log::debug!("unhandled control change {} = {}", control, value),
            },
        }
    }

    pub fn note_on(&mut self, note: u8, velocity: u8) {
        // Some devices send note-on with zero velocity to mean note-off.
        if velocity == 0 {
            self.note_off(note, 64);
            return;
        }
        let note = note.min(127);
        // A fresh press cancels any pedal-held release for the same key.
        self.sustained[note as usize] = false;

        if self.patch.lfo.auto_trigger && self.voices.iter().all(|v| !v.is_active()) {
            self.lfo.trigger();
        }

        // Same note already sounding: retrigger it in place.
        for voice in &mut self.voices {
            if voice.note_number() == note && voice.is_active() && !voice.is_shutting_down() {
                voice.note_on(note, velocity, self.clock, &self.patch);
                return;
            }
        }

        // Any idle voice takes it directly.
        for voice in &mut self.voices {
            if !voice.is_active() {
                voice.note_on(note, velocity, self.clock, &self.patch);
                return;
            }
        }

        // Otherwise the note waits; stealing happens at the block boundary.
        if self.waiting.is_full() {
            let dropped = self.waiting.pop_front();
            if let Some(dropped) = dropped {
                log::warn!("waiting-note queue full, dropping note {}", dropped.note);
            }
        }
        let _ = self.waiting.push_back(PendingNote { note, velocity });
    }

    pub fn note_off(&mut self, note: u8, velocity: u8) {
        let note = note.min(127);
        if self.pedal_down {
            // Recorded once per note number, flushed when the pedal lifts.
            self.sustained[note as usize] = true;
            return;
        }

        for voice in &mut self.voices {
            if voice.note_number() == note && voice.is_active() && !voice.is_shutting_down() {
                voice.note_off(velocity, self.clock, &self.patch);
            }
        }

        // A note that never reached a voice just leaves the queue.
        self.remove_waiting(note);
    }

    fn remove_waiting(&mut self, note: u8) {
        let mut kept: Deque<PendingNote, MAX_WAITING_NOTES> = Deque::new();
        let mut removed = false;
        while let Some(pending) = self.waiting.pop_front() {
            if !removed && pending.note == note {
                removed = true;
            } else {
                let _ = kept.push_back(pending);
            }
        }
        self.waiting = kept;
    }

    fn set_pedal(&mut self, down: bool) {
        if down {
            self.pedal_down = true;
            return;
        }
        if !self.pedal_down {
            return;
        }
        self.pedal_down = false;
        // Flush each deferred release exactly once.
        for note in 0..self.sustained.len() {
            if self.sustained[note] {
                self.sustained[note] = false;
                self.note_off(note as u8, 64);
            }
        }
    }

    pub fn shutdown_all(&mut self) {
        for voice in &mut self.voices {
            voice.shutdown();
        }
        self.waiting.clear();
        self.sustained = [false; 128];
        self.pedal_down = false;
        self.lfo.release();
    }

    fn apply_patch(&mut self, patch: Patch) {
        self.patch = patch;
        let ramp = CONTROL_RAMP_SAMPLES / self.sample_rate;
        for voice in &mut self.voices {
            voice.update(&self.patch);
        }

        self.vca_level.ramp_to(self.patch.vca, ramp);

        self.hpf_enabled = self.patch.hpf > 0.0;
        if self.hpf_enabled {
            // Tone-control taper: 45 Hz at the bottom of the slider's
            // effective range up to ~2.9 kHz.
            self.hpf.set_single_pole_lp(45.0 * (self.patch.hpf * 6.0).exp2());
        }

        self.lfo
            .set_sliders(self.patch.lfo.frequency, self.patch.lfo.delay);
        if !self.patch.lfo.auto_trigger {
            // Without auto-trigger the LFO free-runs at full contour.
            self.lfo.trigger();
        }

        self.chorus
            .set_mode(ChorusMode::from_index(self.patch.chorus));
    }

    /// Voice stealing: runs once per block, after the message drain. When the
    /// waiting notes outnumber the voices that are free (idle or already
    /// fading out), the least valuable sounding voices are forced into their
    /// shutdown fade; the per-sample loop assigns the waiting notes as those
    /// voices reach silence.
    fn steal_voices(&mut self) {
        if self.waiting.is_empty() {
            return;
        }
        let available = self
            .voices
            .iter()
            .filter(|v| !v.is_active() || v.is_shutting_down())
            .count();
        let deficit = self.waiting.len().saturating_sub(available);
        for _ in 0..deficit {
            match self.steal_candidate() {
                Some(index) => self.voices[index].shutdown(),
                None => break,
            }
        }
    }

    /// Prefer a released voice (oldest release first); among still-sustaining
    /// voices take the oldest trigger.
    fn steal_candidate(&self) -> Option<usize> {
        let mut best: Option<(usize, bool, u64)> = None;
        for (index, voice) in self.voices.iter().enumerate() {
            if !voice.is_active() || voice.is_shutting_down() {
                continue;
            }
            let released = voice.is_released();
            let age = if released {
                voice.released_at()
            } else {
                voice.triggered_at()
            };
            let candidate = (index, released, age);
            best = match best {
                None => Some(candidate),
                Some((_, best_released, best_age)) => {
                    let better = (released && !best_released)
                        || (released == best_released && age < best_age);
                    if better {
                        Some(candidate)
                    } else {
                        best
                    }
                }
            };
        }
        best.map(|(index, _, _)| index)
    }

    /// Render one block. Returns whether the host should keep scheduling:
    /// false only once every voice is silent, nothing is waiting, and the
    /// chorus tail has drained.
    pub fn render(&mut self, left: &mut [f32], right: &mut [f32]) -> bool {
        if let Some(patch) = self.pending_patch.take() {
            self.apply_patch(*patch);
        }
        self.steal_voices();

        let frames = left.len().min(right.len());
        for frame in 0..frames {
            let lfo_value = self.lfo.process();
            let bend_value = self.pitch_bend.advance();

            let mut mono = 0.0;
            for voice in &mut self.voices {
                mono += voice.process(lfo_value, bend_value);
                // The moment a voice falls idle it adopts a waiting note and
                // contributes in the same sample.
                if !voice.is_active() {
                    if let Some(pending) = self.waiting.pop_front() {
                        voice.note_on(pending.note, pending.velocity, self.clock, &self.patch);
                        mono += voice.process(lfo_value, bend_value);
                    }
                }
            }

            mono *= self.vca_level.advance();
            if self.hpf_enabled {
                mono = self.hpf.high_pass(mono);
            }

            let (mut out_left, mut out_right) = self.chorus.process(mono);

            // Containment: never let a non-finite value reach the host.
            if !out_left.is_finite() || !out_right.is_finite() {
                self.panic_silence();
                out_left = 0.0;
                out_right = 0.0;
            }

            left[frame] = out_left;
            right[frame] = out_right;
            self.clock += 1;
        }

        let sounding = self.voices.iter().any(|v| v.is_active()) || !self.waiting.is_empty();
        if sounding {
            self.tail_samples = self.chorus.len() as u32;
            true
        } else if self.tail_samples > 0 {
            self.tail_samples = self.tail_samples.saturating_sub(frames as u32);
            true
        } else {
            // Auto-triggered LFOs release once the pool is silent so the
            // next phrase restarts the delay contour.
            if self.patch.lfo.auto_trigger && self.lfo.is_active() {
                self.lfo.release();
            }
            false
        }
    }

    /// Degrade to silence after a detected inconsistency: fade everything
    /// out and flush the recursive state that could hold the bad value.
    fn panic_silence(&mut self) {
        self.shutdown_all();
        for voice in &mut self.voices {
            voice.reset_filter();
        }
        self.hpf.reset();
        self.chorus.reset();
        log::warn!("non-finite sample detected, forcing shutdown");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: f32 = 48000.0;
    const BLOCK: usize = 128;

    fn quick_patch() -> Patch {
        let mut patch = Patch::default();
        patch.env.attack = 0.0;
        patch.env.release = 0.0;
        patch.chorus = 0;
        patch.lfo.auto_trigger = false;
        patch
    }

    fn render_blocks(instrument: &mut Instrument, blocks: usize) -> bool {
        let mut left = [0.0f32; BLOCK];
        let mut right = [0.0f32; BLOCK];
        let mut keep = true;
        for _ in 0..blocks {
            keep = instrument.render(&mut left, &mut right);
        }
        keep
    }

    #[test]
    fn seven_notes_on_six_voices_queues_the_seventh() {
        let mut instrument = Instrument::new(SAMPLE_RATE, 6, quick_patch());
        for note in 60..66 {
            instrument.note_on(note, 100);
        }
        assert_eq!(instrument.active_voices(), 6);
        assert_eq!(instrument.waiting_notes(), 0);

        instrument.note_on(66, 100);
        assert_eq!(instrument.active_voices(), 6);
        assert_eq!(instrument.waiting_notes(), 1);
    }

    #[test]
    fn queued_note_is_adopted_once_a_voice_frees_up() {
        let mut instrument = Instrument::new(SAMPLE_RATE, 6, quick_patch());
        for note in 60..66 {
            instrument.note_on(note, 100);
        }
        instrument.note_on(66, 100);
        assert_eq!(instrument.waiting_notes(), 1);

        // Release one sounding note; with a near-instant release the voice
        // frees within a few blocks and must adopt the waiting note.
        instrument.note_off(62, 64);
        render_blocks(&mut instrument, 40);
        assert_eq!(instrument.waiting_notes(), 0);
        assert!(instrument
            .voices
            .iter()
            .any(|v| v.note_number() == 66 && v.is_active()));
    }

    #[test]
    fn duplicate_note_on_retriggers_in_place() {
        let mut instrument = Instrument::new(SAMPLE_RATE, 6, quick_patch());
        instrument.note_on(60, 100);
        render_blocks(&mut instrument, 4);
        instrument.note_on(60, 80);
        assert_eq!(instrument.active_voices(), 1, "must reuse the same voice");
    }

    #[test]
    fn note_off_for_waiting_note_dequeues_it() {
        let mut instrument = Instrument::new(SAMPLE_RATE, 6, quick_patch());
        for note in 60..66 {
            instrument.note_on(note, 100);
        }
        instrument.note_on(70, 100);
        assert_eq!(instrument.waiting_notes(), 1);
        instrument.note_off(70, 64);
        assert_eq!(instrument.waiting_notes(), 0);
    }

    #[test]
    fn stealing_prefers_released_voices_with_oldest_release() {
        let mut instrument = Instrument::new(SAMPLE_RATE, 2, quick_patch());
        let mut patch = quick_patch();
        patch.env.release = 0.9; // long release keeps voices audible
        instrument.handle_message(ControlMessage::UpdatePatch(Box::new(patch)));
        render_blocks(&mut instrument, 1);

        instrument.note_on(60, 100);
        render_blocks(&mut instrument, 2);
        instrument.note_on(61, 100);
        render_blocks(&mut instrument, 2);

        // Release note 60 first: it becomes the oldest released voice.
        instrument.note_off(60, 64);
        render_blocks(&mut instrument, 2);
        instrument.note_off(61, 64);
        render_blocks(&mut instrument, 2);

        instrument.note_on(64, 100);
        // The steal pass runs at the next render; the shutdown fade ends and
        // the new note is adopted inside that same block.
        render_blocks(&mut instrument, 1);
        assert!(
            instrument
                .voices
                .iter()
                .any(|v| v.note_number() == 64 && v.is_active()),
            "waiting note must land on the stolen voice"
        );
        assert!(
            instrument
                .voices
                .iter()
                .any(|v| v.note_number() == 61 && v.is_active()),
            "the more recently released voice (61) must survive"
        );
    }

    #[test]
    fn still_sustaining_voices_are_stolen_oldest_first_when_none_released() {
        let mut instrument = Instrument::new(SAMPLE_RATE, 2, quick_patch());
        instrument.note_on(60, 100);
        render_blocks(&mut instrument, 2);
        instrument.note_on(61, 100);
        render_blocks(&mut instrument, 2);

        instrument.note_on(64, 100);
        render_blocks(&mut instrument, 1);
        // Note 60 was triggered first and nothing is released: it goes, and
        // the newer sustaining note 61 survives.
        assert!(
            instrument
                .voices
                .iter()
                .any(|v| v.note_number() == 64 && v.is_active()),
            "waiting note must land on the stolen voice"
        );
        assert!(
            instrument
                .voices
                .iter()
                .any(|v| v.note_number() == 61 && v.is_active() && !v.is_shutting_down()),
            "the newer sustaining voice (61) must survive"
        );
    }

    #[test]
    fn sustain_pedal_defers_note_off_and_flushes_once() {
        let mut instrument = Instrument::new(SAMPLE_RATE, 6, quick_patch());
        instrument.note_on(60, 100);
        render_blocks(&mut instrument, 2);

        instrument.control_change(CC_SUSTAIN_PEDAL, 127);
        instrument.note_off(60, 64);
        instrument.note_off(60, 64); // released twice while held: recorded once
        render_blocks(&mut instrument, 4);
        assert_eq!(instrument.active_voices(), 1, "pedal must hold the note");
        assert!(!instrument.voices[0].is_released());

        instrument.control_change(CC_SUSTAIN_PEDAL, 0);
        assert!(
            instrument.voices[0].is_released(),
            "pedal release must flush the deferred note-off"
        );
        render_blocks(&mut instrument, 40);
        assert_eq!(instrument.active_voices(), 0);
    }

    #[test]
    fn all_notes_off_control_forces_shutdown() {
        let mut instrument = Instrument::new(SAMPLE_RATE, 6, quick_patch());
        for note in 60..64 {
            instrument.note_on(note, 100);
        }
        instrument.control_change(CC_ALL_NOTES_OFF, 0);
        assert!(instrument.voices.iter().all(|v| !v.is_active() || v.is_shutting_down()));
        render_blocks(&mut instrument, 4);
        assert_eq!(instrument.active_voices(), 0);
    }

    #[test]
    fn unhandled_controls_reach_the_hook() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;

        let seen = Arc::new(AtomicU32::new(0));
        let seen_inner = Arc::clone(&seen);
        let mut instrument = Instrument::new(SAMPLE_RATE, 6, quick_patch());
        instrument.set_unhandled_control_hook(Box::new(move |control, value| {
            seen_inner.store(((control as u32) << 8) | value as u32, Ordering::SeqCst);
        }));
        instrument.control_change(1, 99);
        assert_eq!(seen.load(Ordering::SeqCst), (1 << 8) | 99);
    }

    #[test]
    fn render_reports_silence_after_tail_drains() {
        let mut instrument = Instrument::new(SAMPLE_RATE, 6, quick_patch());
        instrument.note_on(60, 100);
        assert!(render_blocks(&mut instrument, 2));
        instrument.note_off(60, 64);

        // Drain release plus chorus tail; must eventually report done.
        let mut keep = true;
        for _ in 0..2000 {
            keep = render_blocks(&mut instrument, 1);
            if !keep {
                break;
            }
        }
        assert!(!keep, "render must report silence eventually");
    }

    #[test]
    fn pending_patch_applies_at_block_boundary() {
        let mut instrument = Instrument::new(SAMPLE_RATE, 6, quick_patch());
        let mut patch = quick_patch();
        patch.name = "swap".to_string();
        patch.vcf.frequency = 0.2;
        instrument.handle_message(ControlMessage::UpdatePatch(Box::new(patch)));
        assert_eq!(instrument.patch().name, "Init Strings");
        render_blocks(&mut instrument, 1);
        assert_eq!(instrument.patch().name, "swap");
    }

    #[test]
    fn output_is_nonzero_while_notes_sound() {
        let mut instrument = Instrument::new(SAMPLE_RATE, 6, quick_patch());
        instrument.note_on(57, 100);
        let mut left = [0.0f32; BLOCK];
        let mut right = [0.0f32; BLOCK];
        let mut energy = 0.0;
        for _ in 0..50 {
            instrument.render(&mut left, &mut right);
            energy += left.iter().map(|s| s * s).sum::<f32>();
        }
        assert!(energy > 0.0, "sounding instrument produced silence");
    }
}
