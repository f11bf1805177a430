//! The engine's two ends of the control queue.
//!
//! [`SynthController`] lives on the non-real-time side: it validates patches,
//! applies path-based edits, and pushes messages. [`SynthEngine`] lives on
//! the audio thread: it drains the queue once per block and renders. The
//! queue is a lock-free single-producer single-consumer ring; neither side
//! ever blocks the other.

use rtrb::{Consumer, Producer, RingBuffer};

use crate::instrument::Instrument;
use crate::messages::ControlMessage;
use crate::patch::{self, Patch};

/// Capacity of the control queue, in messages.
const CONTROL_QUEUE_CAPACITY: usize = 256;

/// Build a connected controller/engine pair.
pub fn create(
    sample_rate: f32,
    voice_count: usize,
    patch: Patch,
) -> (SynthController, SynthEngine) {
    let (producer, consumer) = RingBuffer::new(CONTROL_QUEUE_CAPACITY);
    let controller = SynthController {
        producer,
        patch: patch.clone(),
    };
    let engine = SynthEngine {
        instrument: Instrument::new(sample_rate, voice_count, patch),
        consumer,
    };
    (controller, engine)
}

/// Non-real-time handle: everything the host binding needs to drive the
/// engine. Keeps a shadow copy of the patch so path-based edits can be
/// validated and sent as whole-record replacements.
pub struct SynthController {
    producer: Producer<ControlMessage>,
    patch: Patch,
}

impl SynthController {
    fn send(&mut self, message: ControlMessage) -> Result<(), String> {
        self.producer
            .push(message)
            .map_err(|_| "control queue full".to_string())
    }

    pub fn note_on(&mut self, note: u8, velocity: u8) -> Result<(), String> {
        self.send(ControlMessage::NoteOn { note, velocity })
    }

    pub fn note_off(&mut self, note: u8, velocity: u8) -> Result<(), String> {
        self.send(ControlMessage::NoteOff { note, velocity })
    }

    pub fn pitch_bend(&mut self, value: f32) -> Result<(), String> {
        self.send(ControlMessage::PitchBend {
            value: value.clamp(-1.0, 1.0),
        })
    }

    pub fn control_change(&mut self, control: u8, value: u8) -> Result<(), String> {
        self.send(ControlMessage::ControlChange { control, value })
    }

    pub fn shutdown_all(&mut self) -> Result<(), String> {
        self.send(ControlMessage::ShutdownAll)
    }

    /// The controller's shadow of the last accepted patch.
    pub fn patch(&self) -> &Patch {
        &self.patch
    }

    /// Replace the whole patch. Values are clamped before they ship.
    pub fn update_patch(&mut self, mut patch: Patch) -> Result<(), String> {
        patch.sanitize();
        self.patch = patch.clone();
        self.send(ControlMessage::UpdatePatch(Box::new(patch)))
    }

    /// Replace the whole patch from JSON. A malformed document rejects the
    /// update and the previous patch stays in force.
    pub fn update_patch_json(&mut self, json: &str) -> Result<(), String> {
        let patch = Patch::from_json(json)?;
        self.patch = patch.clone();
        self.send(ControlMessage::UpdatePatch(Box::new(patch)))
    }

    /// Apply one path-addressed edit (`"vcf.frequency"` style) and ship the
    /// resulting patch.
    pub fn set_param(&mut self, path: &str, value: f32) -> Result<(), String> {
        patch::set_param(&mut self.patch, path, value)?;
        let snapshot = self.patch.clone();
        self.send(ControlMessage::UpdatePatch(Box::new(snapshot)))
    }
}

/// Real-time handle: owns the instrument and the consuming end of the queue.
pub struct SynthEngine {
    instrument: Instrument,
    consumer: Consumer<ControlMessage>,
}

impl SynthEngine {
    /// Render one block into the left/right buffers. Drains the control
    /// queue exactly once, then processes sample by sample. Returns whether
    /// the host should keep scheduling blocks.
    pub fn process(&mut self, left: &mut [f32], right: &mut [f32]) -> bool {
        while let Ok(message) = self.consumer.pop() {
            self.instrument.handle_message(message);
        }
        self.instrument.render(left, right)
    }

    pub fn active_voices(&self) -> usize {
        self.instrument.active_voices()
    }

    pub fn waiting_notes(&self) -> usize {
        self.instrument.waiting_notes()
    }

    pub fn instrument_mut(&mut self) -> &mut Instrument {
        &mut self.instrument
    }
}
