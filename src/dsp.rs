use std::f32::consts::PI;

// ── Noise ─────────────────────────────────────────────────────────────────────

/// Fast XOR-shift PRNG.  Returns values uniformly in [-1, 1].
#[inline(always)]
pub fn xorshift(state: &mut u32) -> f32 {
    *state ^= *state << 13;
    *state ^= *state >> 17;
    *state ^= *state << 5;
    (*state as i32 as f32) * (1.0 / i32::MAX as f32)
}

/// Advance an LCG seed so consecutive triggers get distinct noise.
#[inline]
pub fn next_seed(seed: u32) -> u32 {
    seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223)
}

// ── Biquad filter (RBJ Audio EQ Cookbook) ────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FilterMode { LowPass, BandPass }

/// Fixed-coefficient two-pole filter.  Voices build one per trigger, so the
/// coefficients are computed once up front.
#[derive(Clone, Debug)]
pub struct Biquad {
    b0: f32, b1: f32, b2: f32, a1: f32, a2: f32,
    // Direct Form I delay state
    x1: f32, x2: f32, y1: f32, y2: f32,
}

impl Biquad {
    pub fn new(mode: FilterMode, sample_rate: f32, cutoff: f32, q: f32) -> Self {
        let w0    = 2.0 * PI * cutoff.clamp(20.0, sample_rate * 0.499) / sample_rate;
        let cos_w = w0.cos();
        let sin_w = w0.sin();
        let alpha = sin_w / (2.0 * q.max(0.1));

        let (b0, b1, b2) = match mode {
            FilterMode::LowPass  => { let h = (1.0 - cos_w) / 2.0; (h, 1.0 - cos_w, h) }
            FilterMode::BandPass => { let h = sin_w / 2.0; (h, 0.0, -h) }
        };
        let a0 = 1.0 + alpha;
        Self {
            b0: b0 / a0, b1: b1 / a0, b2: b2 / a0,
            a1: -2.0 * cos_w / a0,
            a2: (1.0 - alpha) / a0,
            x1: 0.0, x2: 0.0, y1: 0.0, y2: 0.0,
        }
    }

    pub fn low_pass(sample_rate: f32, cutoff: f32) -> Self {
        Self::new(FilterMode::LowPass, sample_rate, cutoff, 0.707)
    }

    pub fn band_pass(sample_rate: f32, center: f32, q: f32) -> Self {
        Self::new(FilterMode::BandPass, sample_rate, center, q)
    }

    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        let y = self.b0 * x + self.b1 * self.x1 + self.b2 * self.x2
                             - self.a1 * self.y1 - self.a2 * self.y2;
        self.x2 = self.x1;  self.x1 = x;
        self.y2 = self.y1;  self.y1 = y;
        y
    }
}

pub fn note_to_freq(note: u8) -> f32 {
    440.0 * 2f32.powf((note as f32 - 69.0) / 12.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xorshift_stays_in_range() {
        let mut s = 0xBEEF_CAFE;
        for _ in 0..10_000 {
            let v = xorshift(&mut s);
            assert!((-1.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn test_low_pass_passes_dc() {
        let mut f = Biquad::low_pass(44_100.0, 1_000.0);
        let mut y = 0.0;
        for _ in 0..4_000 { y = f.process(1.0); }
        assert!((y - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_band_pass_blocks_dc() {
        let mut f = Biquad::band_pass(44_100.0, 2_000.0, 1.2);
        let mut y = 1.0;
        for _ in 0..4_000 { y = f.process(1.0); }
        assert!(y.abs() < 1e-3);
    }

    #[test]
    fn test_note_to_freq() {
        assert!((note_to_freq(69) - 440.0).abs() < 1e-3);
        assert!((note_to_freq(57) - 220.0).abs() < 1e-3);
    }
}
