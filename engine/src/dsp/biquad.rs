use std::f32::consts::PI;

/// Response shapes offered by the filter effects.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FilterType {
    LowPass,
    HighPass,
    BandPass,
}

/// Biquad filter after the Audio EQ Cookbook, Direct Form II Transposed:
/// out = b0*x[n] + w[0]
/// w[0] = b1*x[n] - a1*out + w[1]
/// w[1] = b2*x[n] - a2*out
#[derive(Clone, Copy, Debug)]
pub struct BiquadFilter {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    w0: f32,
    w1: f32,
}

impl Default for BiquadFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl BiquadFilter {
    /// Unity-gain pass-through.
    pub fn new() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            w0: 0.0,
            w1: 0.0,
        }
    }

    pub fn reset(&mut self) {
        self.w0 = 0.0;
        self.w1 = 0.0;
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let output = self.b0 * input + self.w0;
        self.w0 = self.b1 * input - self.a1 * output + self.w1;
        self.w1 = self.b2 * input - self.a2 * output;
        output
    }

    pub fn set(&mut self, filter_type: FilterType, freq: f32, q: f32, sample_rate: f32) {
        let freq = freq.clamp(10.0, sample_rate * 0.49);
        let q = q.max(0.05);
        let omega = 2.0 * PI * freq / sample_rate;
        let sin_omega = omega.sin();
        let cos_omega = omega.cos();
        let alpha = sin_omega / (2.0 * q);

        let (b0, b1, b2) = match filter_type {
            FilterType::LowPass => {
                let b = (1.0 - cos_omega) / 2.0;
                (b, 1.0 - cos_omega, b)
            }
            FilterType::HighPass => {
                let b = (1.0 + cos_omega) / 2.0;
                (b, -(1.0 + cos_omega), b)
            }
            FilterType::BandPass => (alpha, 0.0, -alpha),
        };
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_omega;
        let a2 = 1.0 - alpha;

        let inv_a0 = 1.0 / a0;
        self.b0 = b0 * inv_a0;
        self.b1 = b1 * inv_a0;
        self.b2 = b2 * inv_a0;
        self.a1 = a1 * inv_a0;
        self.a2 = a2 * inv_a0;
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct StereoBiquadFilter {
    left: BiquadFilter,
    right: BiquadFilter,
}

impl StereoBiquadFilter {
    pub fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }

    #[inline]
    pub fn process(&mut self, left_in: f32, right_in: f32) -> (f32, f32) {
        (self.left.process(left_in), self.right.process(right_in))
    }

    pub fn set(&mut self, filter_type: FilterType, freq: f32, q: f32, sample_rate: f32) {
        self.left.set(filter_type, freq, q, sample_rate);
        self.right.set(filter_type, freq, q, sample_rate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settle(filter: &mut BiquadFilter, input: impl Fn(usize) -> f32) -> f32 {
        let mut peak = 0.0f32;
        for n in 0..4000 {
            let y = filter.process(input(n));
            if n > 3000 {
                peak = peak.max(y.abs());
            }
        }
        peak
    }

    #[test]
    fn lowpass_passes_dc_and_blocks_nyquist() {
        let mut lp = BiquadFilter::new();
        lp.set(FilterType::LowPass, 500.0, 0.707, 44100.0);
        assert!((settle(&mut lp, |_| 1.0) - 1.0).abs() < 1e-3);

        lp.reset();
        let alternating = |n: usize| if n % 2 == 0 { 1.0 } else { -1.0 };
        assert!(settle(&mut lp, alternating) < 1e-2);
    }

    #[test]
    fn highpass_blocks_dc() {
        let mut hp = BiquadFilter::new();
        hp.set(FilterType::HighPass, 500.0, 0.707, 44100.0);
        assert!(settle(&mut hp, |_| 1.0) < 1e-3);
    }
}
