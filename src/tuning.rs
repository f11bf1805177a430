//! Equal-tempered pitch lookup.
//!
//! Note-to-frequency conversion runs once per voice per sample, so it avoids
//! `powf` in favour of two small interpolated tables: one holding the factor
//! for each semitone over ten octaves, one holding per-cent factors for the
//! fractional part. Inputs outside the table fold by whole octaves.

use once_cell::sync::Lazy;

use crate::utils::interpolated_lookup;

/// Frequency of MIDI note 0.
const NOTE_0_HZ: f64 = 8.175_798_915_644;

const NOTE_SPAN: f32 = 120.0;
/// 2^(120/12): the frequency ratio of one full table span.
const SPAN_RATIO: f32 = 1024.0;

static NOTE_TABLE: Lazy<[f32; 121]> = Lazy::new(|| {
    let mut table = [0.0; 121];
    let factor = 2f64.powf(1.0 / 12.0);
    let mut value = 1.0f64;
    for entry in table.iter_mut() {
        *entry = value as f32;
        value *= factor;
    }
    table
});

static CENT_TABLE: Lazy<[f32; 101]> = Lazy::new(|| {
    let mut table = [0.0; 101];
    let factor = 2f64.powf(1.0 / 1200.0);
    let mut value = 1.0f64;
    for entry in table.iter_mut() {
        *entry = value as f32;
        value *= factor;
    }
    table
});

/// Convert a (fractional) MIDI note number into a frequency in Hz.
#[inline]
pub fn note_to_frequency(note_number: f32) -> f32 {
    let mut note = note_number;
    let mut freq = NOTE_0_HZ as f32;

    while note >= NOTE_SPAN {
        note -= NOTE_SPAN;
        freq *= SPAN_RATIO;
    }
    while note < 0.0 {
        note += NOTE_SPAN;
        freq /= SPAN_RATIO;
    }

    let whole = note.floor();
    freq *= interpolated_lookup(whole, &*NOTE_TABLE);

    let cents = (note - whole) * 100.0;
    if cents != 0.0 {
        freq *= interpolated_lookup(cents, &*CENT_TABLE);
    }

    freq
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(note: f32) -> f32 {
        440.0 * 2f32.powf((note - 69.0) / 12.0)
    }

    #[test]
    fn concert_pitch() {
        assert!((note_to_frequency(69.0) - 440.0).abs() < 0.01);
    }

    #[test]
    fn matches_reference_across_keyboard() {
        for note in 0..=127 {
            let n = note as f32;
            let got = note_to_frequency(n);
            let want = reference(n);
            assert!(
                (got - want).abs() / want < 1e-4,
                "note {}: got {} want {}",
                note,
                got,
                want
            );
        }
    }

    #[test]
    fn fractional_notes_interpolate() {
        let lower = note_to_frequency(60.0);
        let mid = note_to_frequency(60.5);
        let upper = note_to_frequency(61.0);
        assert!(lower < mid && mid < upper);
        let want = reference(60.5);
        assert!((mid - want).abs() / want < 1e-3);
    }

    #[test]
    fn out_of_range_notes_fold_by_octaves() {
        let high = note_to_frequency(129.0);
        assert!((high - reference(129.0)).abs() / high < 1e-3);
        let low = note_to_frequency(-12.0);
        assert!((low - reference(-12.0)).abs() / low < 1e-3);
    }
}
