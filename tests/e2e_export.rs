//! E2E tests for the outbound collaborators
//!
//! Runs a session on the simulated device, writes the capture as WAV, and
//! journals the session event.

use approx::assert_abs_diff_eq;
use tonecap::{
    EngineConfig, RecordingSession, SessionJournal, SessionMode, SessionRequest, SessionStatus,
    SimulatedBackend, WavExporter, WaveformKind, WaveformSpec,
};

fn run(mode: SessionMode, secs: f64) -> tonecap::SessionResult {
    let tone = WaveformSpec::new(WaveformKind::Sine, 440.0, 0.5, 44100);
    let backend = SimulatedBackend::new()
        .with_time_scale(20.0)
        .with_input_signal(tone);
    RecordingSession::with_config(
        SessionRequest::new(tone, secs, mode),
        Box::new(backend),
        EngineConfig {
            poll_interval_ms: 10,
            ..Default::default()
        },
    )
    .unwrap()
    .run()
}

#[test]
fn test_capture_written_as_pcm16() {
    let result = run(SessionMode::RecordOnly, 0.5);
    assert_eq!(result.status, SessionStatus::Ok, "{:?}", result.error);

    let dir = tempfile::tempdir().unwrap();
    let exporter = WavExporter::new(dir.path().join("recordings"));
    let capture = result.export().unwrap();
    let path = exporter
        .write_session(&capture, SessionMode::RecordOnly, 440.0)
        .unwrap();

    let name = path.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("environment_record_"), "{}", name);
    assert!(name.ends_with(".wav"));

    let mut reader = hound::WavReader::open(&path).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_rate, 44100);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(spec.sample_format, hound::SampleFormat::Int);

    let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(samples.len(), result.captured_samples.len());
    for (&written, &captured) in samples.iter().zip(&result.captured_samples) {
        assert_abs_diff_eq!(written as f32 / 32767.0, captured, epsilon = 1.0 / 16000.0);
    }
    let peak = samples.iter().map(|s| s.unsigned_abs()).max().unwrap();
    assert!(peak > 16000 && peak <= 16384, "peak {}", peak);
}

#[test]
fn test_combined_capture_named_by_frequency() {
    let result = run(SessionMode::PlayAndRecord, 0.25);
    let dir = tempfile::tempdir().unwrap();
    let path = WavExporter::new(dir.path())
        .write_session(&result.export().unwrap(), SessionMode::PlayAndRecord, 440.0)
        .unwrap();
    let name = path.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("audio_record_") && name.ends_with("_440.0Hz.wav"), "{}", name);
}

#[test]
fn test_session_events_journaled() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("recordings").join("sessions.jsonl");
    let mut journal = SessionJournal::new(&path);

    let play = run(SessionMode::PlayOnly, 0.2);
    let record = run(SessionMode::RecordOnly, 0.2);
    journal.append(&play.event).unwrap();
    journal.append(&record.event).unwrap();

    let events = SessionJournal::load(&path).unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0], play.event);
    assert_eq!(events[1].mode, SessionMode::RecordOnly);
    assert_eq!(events[1].captured_samples, 8820);

    let line = std::fs::read_to_string(&path).unwrap();
    let first: serde_json::Value = serde_json::from_str(line.lines().next().unwrap()).unwrap();
    assert_eq!(first["mode"], "play_only");
    assert_eq!(first["status"], "ok");
    assert_eq!(first["dropped_block_count"], 0);
    assert!(first["start_timestamp"].as_str().unwrap().contains('T'));
}
