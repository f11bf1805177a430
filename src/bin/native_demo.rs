//! Live playback demo: drives the engine through cpal and plays a looping
//! chord progression until interrupted.
//!
//! Build with `--features native-host`.

use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SizedSample, StreamConfig};
use dasp_sample::FromSample;

use junox::{create, Patch, SynthController, SynthEngine};

const BLOCK_SIZE: usize = 128;

fn main() -> Result<()> {
    env_logger::init();

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .context("no default output device")?;
    let supported = device
        .default_output_config()
        .context("querying output config")?;
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.into();
    let sample_rate = config.sample_rate.0 as f32;

    println!(
        "Playing on '{}' at {} Hz, {} channels",
        device.name().unwrap_or_else(|_| "unknown".into()),
        sample_rate,
        config.channels
    );

    let mut patch = Patch::default();
    patch.chorus = 1;
    let (controller, engine) = create(sample_rate, 6, patch);

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, engine)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, engine)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, engine)?,
        other => anyhow::bail!("unsupported sample format: {:?}", other),
    };
    stream.play().context("starting stream")?;

    println!("Chord loop in A minor. Press Ctrl+C to stop.");
    play_progression(controller)
}

fn play_progression(mut controller: SynthController) -> Result<()> {
    const CHORDS: &[&[u8]] = &[
        &[45, 57, 60, 64],
        &[41, 53, 57, 60],
        &[43, 55, 59, 62],
        &[45, 57, 60, 64],
    ];
    loop {
        for chord in CHORDS {
            for &note in *chord {
                let _ = controller.note_on(note, 96);
            }
            thread::sleep(Duration::from_millis(1400));
            for &note in *chord {
                let _ = controller.note_off(note, 64);
            }
            thread::sleep(Duration::from_millis(350));
        }
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut engine: SynthEngine,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let mut left = [0.0f32; BLOCK_SIZE];
    let mut right = [0.0f32; BLOCK_SIZE];
    let mut cursor = BLOCK_SIZE; // force a render on the first callback

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _| {
                for frame in data.chunks_mut(channels) {
                    if cursor >= BLOCK_SIZE {
                        engine.process(&mut left, &mut right);
                        cursor = 0;
                    }
                    for (channel, sample) in frame.iter_mut().enumerate() {
                        let value = match channel {
                            0 => left[cursor],
                            1 => right[cursor],
                            _ => 0.0,
                        };
                        *sample = T::from_sample(value);
                    }
                    cursor += 1;
                }
            },
            move |err| {
                eprintln!("stream error: {}", err);
            },
            None,
        )
        .context("building output stream")?;
    Ok(stream)
}
