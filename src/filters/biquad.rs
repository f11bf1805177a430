//! General second-order section, transposed direct form II.
//!
//! Not meant for heavy per-sample modulation; the ladder handles the VCF.
//! The single-pole low-pass configuration backs the instrument's high-pass
//! tone control (high-pass = input minus low-pass).

#[derive(Debug, Clone)]
pub struct Biquad {
    pi_over_sample_rate: f32,
    a0: f32,
    a1: f32,
    a2: f32,
    b1: f32,
    b2: f32,
    z1: f32,
    z2: f32,
}

impl Biquad {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            pi_over_sample_rate: std::f32::consts::PI / sample_rate,
            a0: 1.0,
            a1: 0.0,
            a2: 0.0,
            b1: 0.0,
            b2: 0.0,
            z1: 0.0,
            z2: 0.0,
        }
    }

    pub fn set_coefficients(&mut self, a0: f32, a1: f32, a2: f32, b1: f32, b2: f32) {
        self.a0 = a0;
        self.a1 = a1;
        self.a2 = a2;
        self.b1 = b1;
        self.b2 = b2;
    }

    /// Configure as a single-pole low-pass (6 dB/octave) at `cutoff` Hz.
    pub fn set_single_pole_lp(&mut self, cutoff: f32) {
        let b1 = -(-2.0 * cutoff * self.pi_over_sample_rate).exp();
        self.set_coefficients(1.0 + b1, 0.0, 0.0, b1, 0.0);
    }

    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }

    #[inline(always)]
    pub fn process(&mut self, input: f32) -> f32 {
        let out = input * self.a0 + self.z1;
        self.z1 = input * self.a1 + self.z2 - self.b1 * out;
        self.z2 = input * self.a2 - self.b2 * out;
        out
    }

    /// High-pass rendering built on the low-pass configuration.
    #[inline(always)]
    pub fn high_pass(&mut self, input: f32) -> f32 {
        input - self.process(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: f32 = 48000.0;

    fn rms<F: FnMut(&mut Biquad, f32) -> f32>(f: &mut Biquad, freq: f32, mut render: F) -> f32 {
        let mut acc = 0.0;
        let n = 4800;
        for i in 0..n {
            let x = (std::f32::consts::TAU * freq * i as f32 / SAMPLE_RATE).sin();
            let y = render(f, x);
            acc += y * y;
        }
        (acc / n as f32).sqrt()
    }

    #[test]
    fn identity_coefficients_pass_through() {
        let mut f = Biquad::new(SAMPLE_RATE);
        for x in [0.0f32, 0.5, -0.25, 1.0] {
            assert_eq!(f.process(x), x);
        }
    }

    #[test]
    fn single_pole_lp_attenuates_high_frequencies() {
        let mut f = Biquad::new(SAMPLE_RATE);
        f.set_single_pole_lp(500.0);
        let low = rms(&mut f, 50.0, |f, x| f.process(x));
        f.reset();
        let high = rms(&mut f, 8000.0, |f, x| f.process(x));
        assert!(low > high * 2.0, "low {} high {}", low, high);
    }

    #[test]
    fn high_pass_blocks_dc() {
        let mut f = Biquad::new(SAMPLE_RATE);
        f.set_single_pole_lp(200.0);
        let mut last = 1.0;
        for _ in 0..48000 {
            last = f.high_pass(1.0);
        }
        assert!(last.abs() < 1e-3, "DC leaked through: {}", last);
    }

    #[test]
    fn reset_clears_state() {
        let mut f = Biquad::new(SAMPLE_RATE);
        f.set_single_pole_lp(500.0);
        for _ in 0..100 {
            f.process(1.0);
        }
        f.reset();
        f.set_coefficients(1.0, 0.0, 0.0, 0.0, 0.0);
        assert_eq!(f.process(0.0), 0.0);
    }
}
