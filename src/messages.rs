//! Control-plane messages.
//!
//! Messages originate on a non-real-time thread and cross into the render
//! thread through a single-producer single-consumer queue, drained once per
//! audio block.

use crate::patch::Patch;

/// MIDI control number for the sustain pedal.
pub const CC_SUSTAIN_PEDAL: u8 = 64;
/// MIDI control number for "all notes off".
pub const CC_ALL_NOTES_OFF: u8 = 123;
/// Pedal values at or above this mean "down".
pub const SUSTAIN_ON_THRESHOLD: u8 = 64;

#[derive(Debug, Clone)]
pub enum ControlMessage {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8, velocity: u8 },
    /// Bend in -1.0..1.0; smoothed over ~128 samples inside the engine.
    PitchBend { value: f32 },
    ControlChange { control: u8, value: u8 },
    /// Force every voice into its shutdown fade.
    ShutdownAll,
    /// Replace the current patch at the next block boundary.
    UpdatePatch(Box<Patch>),
}
