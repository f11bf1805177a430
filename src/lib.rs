//! A Juno-60 style polyphonic analog-modeling synthesizer voice engine.
//!
//! The render path is deterministic and allocation-free: control events
//! arrive through a lock-free queue drained once per block, and every
//! audible parameter change is smoothed by a per-sample ramp.

pub mod chorus;
pub mod dco;
pub mod engine;
pub mod envelope;
pub mod filters;
pub mod instrument;
pub mod lfo;
pub mod messages;
pub mod noise;
pub mod params;
pub mod patch;
pub mod tuning;
pub mod utils;
pub mod voice;

pub use chorus::{Chorus, ChorusMode};
pub use dco::Dco;
pub use engine::{create, SynthController, SynthEngine};
pub use envelope::Envelope;
pub use filters::{Biquad, DiodeLadder, OnePole};
pub use instrument::{Instrument, DEFAULT_VOICE_COUNT};
pub use lfo::{Lfo, LfoWaveform};
pub use messages::ControlMessage;
pub use noise::Noise;
pub use params::SmoothParam;
pub use patch::{Patch, PwmMod, VcaType};
pub use voice::Voice;
