//! Offline renderer: plays a short phrase through the engine and writes the
//! result to a stereo WAV file.
//!
//! Usage: `render_wav [output.wav]`

use anyhow::{Context, Result};
use hound::{SampleFormat, WavSpec, WavWriter};

use junox::{create, Patch};

const SAMPLE_RATE: u32 = 48000;
const BLOCK_SIZE: usize = 128;

/// (start_seconds, duration_seconds, note)
const PHRASE: &[(f32, f32, u8)] = &[
    (0.0, 1.6, 45), // A minor, held bass
    (0.0, 0.7, 57),
    (0.0, 0.7, 60),
    (0.0, 0.7, 64),
    (0.8, 0.7, 55),
    (0.8, 0.7, 59),
    (0.8, 0.7, 62),
    (1.6, 1.2, 57),
    (1.6, 1.2, 60),
    (1.6, 1.2, 65),
];

fn main() -> Result<()> {
    env_logger::init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "junox_demo.wav".to_string());

    let mut patch = Patch::default();
    patch.chorus = 2;
    let (mut controller, mut engine) = create(SAMPLE_RATE as f32, 6, patch);

    let spec = WavSpec {
        channels: 2,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(&path, spec)
        .with_context(|| format!("creating {}", path))?;

    let mut left = [0.0f32; BLOCK_SIZE];
    let mut right = [0.0f32; BLOCK_SIZE];
    let mut frame = 0usize;
    let mut keep_rendering = true;

    // Events sorted by time: (frame, note, on)
    let mut events: Vec<(usize, u8, bool)> = Vec::new();
    for &(start, duration, note) in PHRASE {
        events.push(((start * SAMPLE_RATE as f32) as usize, note, true));
        events.push((((start + duration) * SAMPLE_RATE as f32) as usize, note, false));
    }
    events.sort_by_key(|&(at, _, _)| at);
    let mut next_event = 0usize;
    let phrase_end = events.last().map(|&(at, _, _)| at).unwrap_or(0);

    while keep_rendering || frame <= phrase_end {
        while next_event < events.len() && events[next_event].0 <= frame {
            let (_, note, on) = events[next_event];
            if on {
                controller.note_on(note, 96).map_err(anyhow::Error::msg)?;
            } else {
                controller.note_off(note, 64).map_err(anyhow::Error::msg)?;
            }
            next_event += 1;
        }

        keep_rendering = engine.process(&mut left, &mut right);
        for i in 0..BLOCK_SIZE {
            writer.write_sample((left[i].clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
            writer.write_sample((right[i].clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
        }
        frame += BLOCK_SIZE;
    }

    writer.finalize()?;
    println!(
        "Rendered {:.2}s to {}",
        frame as f32 / SAMPLE_RATE as f32,
        path
    );
    Ok(())
}
