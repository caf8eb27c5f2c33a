//! Single-input single-output digital filters for the control paths.
//! Every variant is allocation-free and deterministic; state lives inside
//! the filter value itself.

use core::f32::consts::PI;

#[cfg(not(any(test, feature = "std")))]
use micromath::F32Ext;

/// One-pole low-pass, exponential smoothing with gain derived from the
/// cutoff frequency and the sample period.
#[derive(Copy, Clone, Debug, Default)]
pub struct Pt1 {
    k: f32,
    state: f32,
}

impl Pt1 {
    pub fn new(cutoff: f32, dt: f32) -> Self {
        let rc = 1.0 / (2.0 * PI * cutoff);
        Self { k: dt / (rc + dt), state: 0.0 }
    }

    pub fn apply(&mut self, input: f32) -> f32 {
        self.state += self.k * (input - self.state);
        self.state
    }

    pub fn reset(&mut self) {
        self.state = 0.0;
    }
}

/// Q of a notch centered at `center` with lower cutoff `cutoff`.
pub fn notch_q(center: f32, cutoff: f32) -> f32 {
    center * cutoff / (center * center - cutoff * cutoff)
}

/// Second-order IIR in direct form 2 transposed, two delay registers.
#[derive(Copy, Clone, Debug, Default)]
pub struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    d1: f32,
    d2: f32,
}

impl Biquad {
    pub fn lowpass(cutoff: f32, sample_rate: f32) -> Self {
        let omega = 2.0 * PI * cutoff / sample_rate;
        let (sn, cs) = (omega.sin(), omega.cos());
        let alpha = sn / (2.0 * core::f32::consts::FRAC_1_SQRT_2);
        let a0 = 1.0 + alpha;
        let b1 = 1.0 - cs;
        let b0 = b1 * 0.5;
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b0 / a0,
            a1: -2.0 * cs / a0,
            a2: (1.0 - alpha) / a0,
            d1: 0.0,
            d2: 0.0,
        }
    }

    pub fn notch(center: f32, sample_rate: f32, q: f32) -> Self {
        let omega = 2.0 * PI * center / sample_rate;
        let (sn, cs) = (omega.sin(), omega.cos());
        let alpha = sn / (2.0 * q);
        let a0 = 1.0 + alpha;
        Self {
            b0: 1.0 / a0,
            b1: -2.0 * cs / a0,
            b2: 1.0 / a0,
            a1: -2.0 * cs / a0,
            a2: (1.0 - alpha) / a0,
            d1: 0.0,
            d2: 0.0,
        }
    }

    pub fn apply(&mut self, input: f32) -> f32 {
        let output = self.b0 * input + self.d1;
        self.d1 = self.b1 * input - self.a1 * output + self.d2;
        self.d2 = self.b2 * input - self.a2 * output;
        output
    }

    /// Clears the delay registers, coefficients are kept.
    pub fn reset(&mut self) {
        self.d1 = 0.0;
        self.d2 = 0.0;
    }
}

pub const DENOISE_MAX_WINDOW: usize = 120;

/// Weighted moving average over a window sized by cutoff frequency, used to
/// knock down quantization noise without the phase lag of an IIR stage.
/// Averages over the filled portion until the window wraps once.
#[derive(Copy, Clone, Debug)]
pub struct Denoise {
    window: [f32; DENOISE_MAX_WINDOW],
    length: usize,
    index: usize,
    filled: usize,
    sum: f32,
}

impl Denoise {
    pub fn new(cutoff: f32, sample_rate: f32) -> Self {
        let length = ((sample_rate / cutoff + 0.5) as usize).clamp(1, DENOISE_MAX_WINDOW);
        Self { window: [0.0; DENOISE_MAX_WINDOW], length, index: 0, filled: 0, sum: 0.0 }
    }

    pub fn apply(&mut self, input: f32) -> f32 {
        self.window[self.index] = input;
        self.sum += input;
        self.index += 1;
        if self.index == self.length {
            self.index = 0;
        }
        self.sum -= self.window[self.index];
        if self.filled < self.length {
            self.filled += 1;
        }
        self.sum / self.filled as f32
    }

    pub fn reset(&mut self) {
        self.window = [0.0; DENOISE_MAX_WINDOW];
        self.index = 0;
        self.filled = 0;
        self.sum = 0.0;
    }
}

/// Closed set of filters a signal path may be configured with; `Pass` is the
/// zero-cost choice for a disabled or unachievable path.
#[derive(Copy, Clone, Debug)]
pub enum Filter {
    Pass,
    Pt1(Pt1),
    Biquad(Biquad),
    Denoise(Denoise),
}

impl Filter {
    pub fn apply(&mut self, input: f32) -> f32 {
        match self {
            Self::Pass => input,
            Self::Pt1(filter) => filter.apply(input),
            Self::Biquad(filter) => filter.apply(input),
            Self::Denoise(filter) => filter.apply(input),
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    /// Drops accumulated state so a corrupted sample cannot recirculate
    /// through the delay registers.
    pub fn reset(&mut self) {
        match self {
            Self::Pass => (),
            Self::Pt1(filter) => filter.reset(),
            Self::Biquad(filter) => filter.reset(),
            Self::Denoise(filter) => filter.reset(),
        }
    }
}

impl Default for Filter {
    fn default() -> Self {
        Self::Pass
    }
}

mod test {
    #[test]
    fn test_pt1() {
        use super::Pt1;

        let mut pt1 = Pt1::new(10.0, 0.001);
        let value0 = pt1.apply(1.0);
        assert!(0.0 < value0 && value0 < 1.0);
        let value1 = pt1.apply(1.0);
        assert!(value0 < value1 && value1 < 1.0);
        // Converges onto a constant input
        for _ in 0..10_000 {
            pt1.apply(1.0);
        }
        assert!((pt1.apply(1.0) - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_biquad_lowpass_dc_gain() {
        use super::Biquad;

        let mut lpf = Biquad::lowpass(100.0, 1000.0);
        let mut value = 0.0;
        for _ in 0..10_000 {
            value = lpf.apply(1.0);
        }
        assert!((value - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_biquad_notch_passes_dc() {
        use super::{notch_q, Biquad};

        let q = notch_q(260.0, 160.0);
        assert!(q > 0.0);
        let mut notch = Biquad::notch(260.0, 8000.0, q);
        let mut value = 0.0;
        for _ in 0..10_000 {
            value = notch.apply(1.0);
        }
        assert!((value - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_denoise_window() {
        use super::Denoise;

        // 1kHz sample rate at 250Hz cutoff gives a 4 sample window
        let mut denoise = Denoise::new(250.0, 1000.0);
        assert_eq!(denoise.length, 4);
        // Partial window averages over the samples seen so far
        assert_eq!(denoise.apply(4.0), 4.0);
        assert_eq!(denoise.apply(8.0), 6.0);
        assert_eq!(denoise.apply(0.0), 4.0);
        // On wrap the slot about to be overwritten leaves the running sum
        assert_eq!(denoise.apply(0.0), 2.0);
        assert_eq!(denoise.apply(0.0), 0.0);
        assert_eq!(denoise.apply(0.0), 0.0);
    }

    #[test]
    fn test_denoise_window_bounds() {
        use super::{Denoise, DENOISE_MAX_WINDOW};

        assert_eq!(Denoise::new(9000.0, 8000.0).length, 1);
        assert_eq!(Denoise::new(1.0, 8000.0).length, DENOISE_MAX_WINDOW);
    }

    #[test]
    fn test_reset_clears_poisoned_state() {
        use super::{Biquad, Denoise, Filter, Pt1};

        let filters = [
            Filter::Pt1(Pt1::new(100.0, 0.001)),
            Filter::Biquad(Biquad::lowpass(100.0, 1000.0)),
            Filter::Denoise(Denoise::new(250.0, 1000.0)),
        ];
        for mut filter in filters {
            filter.apply(f32::NAN);
            assert!(!filter.apply(1.0).is_finite());
            filter.reset();
            let mut value = 0.0;
            for _ in 0..10_000 {
                value = filter.apply(1.0);
            }
            assert!((value - 1.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_pass() {
        use super::Filter;

        let mut filter = Filter::Pass;
        assert_eq!(filter.apply(42.0), 42.0);
        assert!(filter.is_pass());
    }
}
