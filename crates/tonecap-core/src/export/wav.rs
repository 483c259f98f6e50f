//! WAV export of captured audio using hound
//!
//! Captures are written as mono 16-bit PCM: each sample is clamped to
//! `[-1.0, 1.0]` and scaled by 32767.

use crate::session::{CaptureExport, SessionMode};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};

/// Full-scale value for 16-bit PCM
const I16_SCALE: f32 = 32767.0;

/// Writes captures into a recordings directory
#[derive(Debug, Clone)]
pub struct WavExporter {
    dir: PathBuf,
}

impl WavExporter {
    /// Export into `dir`, created on first write
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Target directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for a capture started at `at`
    ///
    /// Combined mode names carry the tone frequency as a float, so whole
    /// values keep their `.0` (`audio_record_20240101_120000_440.0Hz.wav`);
    /// record-only captures are `environment_record_20240101_120000.wav`.
    pub fn file_name(mode: SessionMode, frequency_hz: f64, at: DateTime<Local>) -> String {
        let stamp = at.format("%Y%m%d_%H%M%S");
        match mode {
            SessionMode::RecordOnly => format!("environment_record_{}.wav", stamp),
            _ => format!("audio_record_{}_{:?}Hz.wav", stamp, frequency_hz),
        }
    }

    /// Write `capture` as `name` inside the recordings directory
    pub fn write(&self, capture: &CaptureExport<'_>, name: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| {
                format!("Failed to create recordings directory {}", self.dir.display())
            })?;
        let path = self.dir.join(name);
        write_wav_file(capture, &path)?;
        tracing::info!(
            path = %path.display(),
            samples = capture.samples.len(),
            sample_rate = capture.sample_rate,
            "Recording saved"
        );
        Ok(path)
    }

    /// Write `capture` under the conventional name for `mode`, stamped now
    pub fn write_session(
        &self,
        capture: &CaptureExport<'_>,
        mode: SessionMode,
        frequency_hz: f64,
    ) -> Result<PathBuf> {
        let name = Self::file_name(mode, frequency_hz, Local::now());
        self.write(capture, &name)
    }
}

fn wav_spec(capture: &CaptureExport<'_>) -> Result<WavSpec> {
    if capture.bit_depth != 16 {
        bail!("Unsupported bit depth {}; only 16-bit PCM is written", capture.bit_depth);
    }
    if capture.channels == 0 || capture.sample_rate == 0 {
        bail!(
            "Invalid capture format: {} channel(s) at {} Hz",
            capture.channels,
            capture.sample_rate
        );
    }
    Ok(WavSpec {
        channels: capture.channels,
        sample_rate: capture.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    })
}

fn write_samples<W: Write + Seek>(writer: &mut WavWriter<W>, samples: &[f32]) -> Result<()> {
    for &sample in samples {
        let clamped = if sample.is_nan() { 0.0 } else { sample.clamp(-1.0, 1.0) };
        writer
            .write_sample((clamped * I16_SCALE) as i16)
            .context("Failed to write WAV sample")?;
    }
    Ok(())
}

/// Encode `capture` to a WAV file at `path`
pub fn write_wav_file(capture: &CaptureExport<'_>, path: &Path) -> Result<()> {
    let spec = wav_spec(capture)?;
    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create WAV file {}", path.display()))?;
    write_samples(&mut writer, capture.samples)?;
    writer.finalize().context("Failed to finalize WAV file")?;
    Ok(())
}

/// Encode `capture` to WAV bytes in memory
pub fn encode_wav_memory(capture: &CaptureExport<'_>) -> Result<Vec<u8>> {
    let spec = wav_spec(capture)?;
    let mut buffer = Vec::new();
    {
        let cursor = std::io::Cursor::new(&mut buffer);
        let mut writer = WavWriter::new(cursor, spec).context("Failed to create WAV writer")?;
        write_samples(&mut writer, capture.samples)?;
        writer.finalize().context("Failed to finalize WAV data")?;
    }
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn capture(samples: &[f32]) -> CaptureExport<'_> {
        CaptureExport {
            samples,
            sample_rate: 44100,
            channels: 1,
            bit_depth: 16,
        }
    }

    #[test]
    fn test_file_names() {
        let at = Local.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap();
        assert_eq!(
            WavExporter::file_name(SessionMode::PlayAndRecord, 440.0, at),
            "audio_record_20240305_140709_440.0Hz.wav"
        );
        assert_eq!(
            WavExporter::file_name(SessionMode::PlayAndRecord, 1000.5, at),
            "audio_record_20240305_140709_1000.5Hz.wav"
        );
        assert_eq!(
            WavExporter::file_name(SessionMode::RecordOnly, 440.0, at),
            "environment_record_20240305_140709.wav"
        );
    }

    #[test]
    fn test_write_clamps_and_scales() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = WavExporter::new(dir.path().join("recordings"));
        let path = exporter
            .write(&capture(&[0.0, 0.5, -0.5, 1.0, -1.0, 2.0, -3.0]), "t.wav")
            .unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 44100);
        assert_eq!(spec.bits_per_sample, 16);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0, 16383, -16383, 32767, -32767, 32767, -32767]);
    }

    #[test]
    fn test_memory_encoding_has_riff_header() {
        let bytes = encode_wav_memory(&capture(&[0.25; 100])).unwrap();
        assert_eq!(&bytes[..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(bytes.len(), 44 + 200);
    }

    #[test]
    fn test_rejects_unsupported_format() {
        let mut export = capture(&[0.0]);
        export.bit_depth = 24;
        assert!(encode_wav_memory(&export).is_err());
    }
}
