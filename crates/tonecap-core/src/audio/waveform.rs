//! Periodic waveform synthesis
//!
//! Maps a waveform description and a frame index to a single sample value.
//! Every function here is pure: no allocation, no locking, no I/O, so it can
//! be called directly from the playback callback.
//!
//! ## Shapes
//!
//! With phase `θ = 2π·f·n/rate`:
//! - sine: `a·sin(θ)`
//! - square: `a·sign(sin(θ))`, where `sign(0) = +1`
//! - triangle: `a·(2/π)·asin(sin(θ))`
//! - sawtooth: `a·(2/π)·atan(tan(θ))`
//!
//! The sawtooth keeps the tangent construction, which folds the ramp every
//! half period (discontinuities at `θ = π/2 + kπ`).

use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_2_PI, TAU};
use std::fmt;

/// Supported periodic waveform shapes
///
/// Deserializes through [`WaveformKind::from_name`], so an unknown name in a
/// config file or journal reads as sine instead of failing the whole record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum WaveformKind {
    /// Pure sine tone
    #[default]
    Sine,
    /// Square wave built from the sign of the sine
    Square,
    /// Triangle wave
    Triangle,
    /// Sawtooth built from `atan(tan(θ))`
    Sawtooth,
}

impl WaveformKind {
    /// All supported kinds, in menu order
    pub const ALL: [WaveformKind; 4] = [
        WaveformKind::Sine,
        WaveformKind::Square,
        WaveformKind::Triangle,
        WaveformKind::Sawtooth,
    ];

    /// Parse a waveform name, falling back to [`WaveformKind::Sine`]
    ///
    /// Matching is case-insensitive. Unknown names are not an error.
    ///
    /// # Example
    /// ```
    /// use tonecap_core::audio::waveform::WaveformKind;
    ///
    /// assert_eq!(WaveformKind::from_name("Square"), WaveformKind::Square);
    /// assert_eq!(WaveformKind::from_name("noise"), WaveformKind::Sine);
    /// ```
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "sine" | "sin" => WaveformKind::Sine,
            "square" => WaveformKind::Square,
            "triangle" => WaveformKind::Triangle,
            "sawtooth" | "saw" => WaveformKind::Sawtooth,
            other => {
                tracing::warn!(kind = other, "Unknown waveform kind, using sine");
                WaveformKind::Sine
            }
        }
    }

    /// Lowercase name of this kind
    pub fn name(&self) -> &'static str {
        match self {
            WaveformKind::Sine => "sine",
            WaveformKind::Square => "square",
            WaveformKind::Triangle => "triangle",
            WaveformKind::Sawtooth => "sawtooth",
        }
    }

    /// Unit-amplitude shape value at phase `theta` (radians)
    ///
    /// Result is always within `[-1.0, 1.0]`.
    pub fn shape(&self, theta: f64) -> f64 {
        let value = match self {
            WaveformKind::Sine => theta.sin(),
            WaveformKind::Square => {
                if theta.sin() >= 0.0 {
                    1.0
                } else {
                    -1.0
                }
            }
            WaveformKind::Triangle => FRAC_2_PI * theta.sin().asin(),
            WaveformKind::Sawtooth => FRAC_2_PI * theta.tan().atan(),
        };
        // asin/atan can land one ulp past ±π/2
        value.clamp(-1.0, 1.0)
    }
}

impl From<String> for WaveformKind {
    fn from(name: String) -> Self {
        WaveformKind::from_name(&name)
    }
}

impl fmt::Display for WaveformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable description of the tone to synthesize
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaveformSpec {
    /// Waveform shape
    pub kind: WaveformKind,
    /// Tone frequency in Hz (must be positive)
    pub frequency_hz: f64,
    /// Peak amplitude in `[0.0, 1.0]`
    pub amplitude: f32,
    /// Sample rate in Hz (must be positive)
    pub sample_rate: u32,
}

impl WaveformSpec {
    /// Create a new waveform spec
    pub fn new(kind: WaveformKind, frequency_hz: f64, amplitude: f32, sample_rate: u32) -> Self {
        Self {
            kind,
            frequency_hz,
            amplitude,
            sample_rate,
        }
    }

    /// Sine tone at the default amplitude and sample rate
    pub fn sine(frequency_hz: f64) -> Self {
        Self::new(
            WaveformKind::Sine,
            frequency_hz,
            crate::DEFAULT_AMPLITUDE,
            crate::DEFAULT_SAMPLE_RATE,
        )
    }

    /// Nyquist frequency for this spec's sample rate
    pub fn nyquist_hz(&self) -> f64 {
        self.sample_rate as f64 / 2.0
    }

    /// Whether the tone is above Nyquist and will alias
    ///
    /// Aliasing is reported, never rejected.
    pub fn aliases(&self) -> bool {
        self.frequency_hz >= self.nyquist_hz()
    }

    /// Phase in radians at the given frame index
    pub fn phase(&self, frame_index: u64) -> f64 {
        TAU * self.frequency_hz * frame_index as f64 / self.sample_rate as f64
    }
}

/// Sample value of `spec` at `frame_index`
///
/// Output always lies within `[-amplitude, amplitude]`. Safe to call from a
/// real-time callback.
///
/// # Example
/// ```
/// use tonecap_core::audio::waveform::{sample, WaveformKind, WaveformSpec};
///
/// let spec = WaveformSpec::new(WaveformKind::Square, 440.0, 0.5, 44100);
/// assert_eq!(sample(&spec, 0), 0.5);
/// ```
#[inline]
pub fn sample(spec: &WaveformSpec, frame_index: u64) -> f32 {
    let unit = spec.kind.shape(spec.phase(frame_index));
    (spec.amplitude as f64 * unit) as f32
}

/// Fill `buffer` with consecutive samples starting at `start_frame`
///
/// Returns the frame index following the last written sample.
pub fn fill(spec: &WaveformSpec, start_frame: u64, buffer: &mut [f32]) -> u64 {
    let mut frame = start_frame;
    for out in buffer.iter_mut() {
        *out = sample(spec, frame);
        frame += 1;
    }
    frame
}
