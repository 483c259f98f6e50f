//! Tonecap - tone playback and capture
//!
//! Entry point for the command-line front end.

use anyhow::Result;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tonecap::cli::{self, Command, RunOptions};
use tonecap::{
    AppConfig, AudioBackend, CpalBackend, RecordingSession, SessionControl, SessionJournal,
    SessionMode, SessionRequest, SessionResult, SimulatedBackend, WavExporter, WaveformSpec,
};
use tracing::{error, info, warn};

/// Session currently reachable from the Ctrl+C handler
type ActiveSession = Arc<Mutex<Option<SessionControl>>>;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new("tonecap=info,tonecap_core=info")
                }),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let opts = match cli::parse_args(&args) {
        Ok(Command::List) => return list_devices(),
        Ok(Command::Version) => {
            println!("tonecap {} ({})", tonecap::VERSION, tonecap::BUILD_DATE);
            return Ok(());
        }
        Ok(Command::Help) => {
            print_help();
            return Ok(());
        }
        Ok(Command::Run(opts)) => opts,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            return Ok(());
        }
    };

    println!("╔════════════════════════════════════════════════════════════╗");
    println!("║                 Tonecap v{} - Tone Player                 ║", tonecap::VERSION);
    println!("╚════════════════════════════════════════════════════════════╝");
    println!();

    let config = match &opts.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };

    // Ctrl+C stops whichever session is running
    let active: ActiveSession = Arc::new(Mutex::new(None));
    let handler_slot = Arc::clone(&active);
    if let Err(e) = ctrlc::set_handler(move || {
        if let Ok(slot) = handler_slot.lock() {
            match slot.as_ref() {
                Some(control) => control.request_stop(),
                None => std::process::exit(130),
            }
        }
    }) {
        warn!(error = %e, "Failed to install Ctrl+C handler");
    }

    let mut journal = SessionJournal::new(&config.journal_file);

    match opts.mode {
        Some(mode) => {
            let request = build_request(
                &opts,
                &config,
                mode,
                opts.duration_or_default(),
                opts.record_duration,
            );
            run_session(request, &opts, &config, &active, &mut journal)
        }
        None => interactive_mode(&opts, &config, &active, &mut journal),
    }
}

fn print_help() {
    println!("Usage: tonecap [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -l, --list                 List available audio devices");
    println!("  -m, --mode MODE            play, record, or both");
    println!("  -f, --frequency HZ         Tone frequency (default: 440)");
    println!("  -d, --duration SECS        Play duration, or record duration when recording");
    println!("                             only (default: 1)");
    println!("      --record-duration SECS Record duration in both mode");
    println!("                             (default: play duration + 1)");
    println!("  -w, --waveform NAME        sine, square, triangle, or sawtooth");
    println!("  -a, --amplitude LEVEL      Tone amplitude 0.0-1.0 (default: 0.5)");
    println!("  -r, --sample-rate RATE     Sample rate (default: 44100)");
    println!("  -s, --simulate             Use a virtual device instead of audio hardware");
    println!("  -c, --config PATH          Config file (default: <data dir>/tonecap/config.json)");
    println!("  -v, --version              Show version");
    println!("  -h, --help                 Show this help");
    println!();
    println!("Examples:");
    println!("  tonecap --mode play -f 1000 -d 3");
    println!("  tonecap --mode both -f 440 -d 2 --record-duration 4");
    println!("  tonecap --list");
    println!();
    println!("Without --mode, starts in interactive mode.");
}

fn list_devices() -> Result<()> {
    println!("Scanning for audio devices...");
    println!();

    match CpalBackend::list_devices() {
        Ok(devices) => {
            if devices.is_empty() {
                println!("No audio devices found.");
            } else {
                println!("Found {} device(s):", devices.len());
                println!();
                for (i, device) in devices.iter().enumerate() {
                    let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
                    println!("  {}. {}{}", i + 1, device.name, default_marker);
                    println!(
                        "     Channels: {} in, {} out",
                        device.input_channels, device.output_channels
                    );
                    if !device.sample_rates.is_empty() {
                        println!("     Sample rates: {:?}", device.sample_rates);
                    }
                    println!();
                }
            }
        }
        Err(e) => {
            error!("Failed to list devices: {}", e);
            println!("Error: {}", e);
        }
    }

    Ok(())
}

fn build_request(
    opts: &RunOptions,
    config: &AppConfig,
    mode: SessionMode,
    duration: f64,
    record_duration: Option<f64>,
) -> SessionRequest {
    let spec = WaveformSpec::new(
        opts.waveform.unwrap_or(config.waveform),
        opts.frequency_or_default(),
        opts.amplitude.unwrap_or(config.amplitude),
        opts.sample_rate.unwrap_or(config.sample_rate),
    );
    let request = SessionRequest::new(spec, duration, mode);
    match record_duration {
        Some(secs) if mode == SessionMode::PlayAndRecord => request.with_record_duration(secs),
        _ => request,
    }
}

fn backend(opts: &RunOptions, config: &AppConfig, spec: &WaveformSpec) -> Box<dyn AudioBackend> {
    if opts.simulate {
        // Loop the tone back so simulated captures are not silent
        return Box::new(SimulatedBackend::new().with_input_signal(*spec));
    }
    let mut backend = CpalBackend::new();
    if let Some(name) = &config.input_device {
        backend = backend.with_input_device(name.clone());
    }
    if let Some(name) = &config.output_device {
        backend = backend.with_output_device(name.clone());
    }
    Box::new(backend)
}

fn run_session(
    request: SessionRequest,
    opts: &RunOptions,
    config: &AppConfig,
    active: &ActiveSession,
    journal: &mut SessionJournal,
) -> Result<()> {
    let session = match RecordingSession::with_config(
        request,
        backend(opts, config, &request.spec),
        config.engine.clone(),
    ) {
        Ok(session) => session,
        Err(e) => {
            println!("Error: {}", e);
            return Ok(());
        }
    };

    let control = session.control();
    let total_frames = session.play_frames().max(session.record_frames());
    if let Ok(mut slot) = active.lock() {
        *slot = Some(control.clone());
    }

    println!(
        "{} {} Hz {} for {:.1}s. Press Ctrl+C to stop.",
        match request.mode {
            SessionMode::PlayOnly => "Playing",
            SessionMode::RecordOnly => "Recording",
            SessionMode::PlayAndRecord => "Playing and recording",
        },
        request.spec.frequency_hz,
        request.spec.kind,
        total_frames as f64 / request.spec.sample_rate as f64,
    );

    let worker = std::thread::Builder::new()
        .name("tonecap-session".to_string())
        .spawn(move || session.run())?;

    monitor(&control, request.mode);

    let result = worker.join();
    if let Ok(mut slot) = active.lock() {
        *slot = None;
    }
    let result = match result {
        Ok(result) => result,
        Err(_) => {
            error!("Session thread panicked");
            return Ok(());
        }
    };

    report(&result);
    save_outputs(&result, request, config, journal);
    Ok(())
}

/// Print a status line while the session runs, only when it changes
fn monitor(control: &SessionControl, mode: SessionMode) {
    let mut last_status = String::new();
    while !control.is_finished() {
        let mut status_line = format!(
            "State: {:?} | Played: {:>8}",
            control.state(),
            control.played_frames()
        );
        if mode.records() {
            let recent = control.live_snapshot(4096);
            let peak = recent.iter().fold(0.0f32, |m, s| m.max(s.abs()));
            status_line.push_str(&format!(" | Input peak: {:>5.3}", peak));
        }
        if status_line != last_status {
            println!("{}", status_line);
            last_status = status_line;
        }
        std::thread::sleep(Duration::from_millis(200));
    }
}

fn report(result: &SessionResult) {
    println!();
    println!("Status: {:?}", result.status);
    println!("Played frames: {}", result.played_frame_count);
    println!("Captured samples: {}", result.captured_samples.len());
    if result.dropped_block_count > 0 {
        println!("Dropped blocks: {}", result.dropped_block_count);
    }
    if let Some(release) = result.barrier_release {
        println!("Streams aligned after {:.1} ms", release.as_secs_f64() * 1000.0);
    }
    if let Some(detail) = result.error_detail() {
        println!("Error: {}", detail);
    }
    println!("Elapsed: {:.2}s", result.elapsed.as_secs_f64());
}

fn save_outputs(
    result: &SessionResult,
    request: SessionRequest,
    config: &AppConfig,
    journal: &mut SessionJournal,
) {
    if let Some(capture) = result.export() {
        let exporter = WavExporter::new(&config.recordings_dir);
        match exporter.write_session(&capture, request.mode, request.spec.frequency_hz) {
            Ok(path) => println!("Recording saved: {}", path.display()),
            Err(e) => error!("Failed to save recording: {:#}", e),
        }
    }
    if let Err(e) = journal.append(&result.event) {
        error!("Failed to write session journal: {:#}", e);
    }
}

fn interactive_mode(
    opts: &RunOptions,
    config: &AppConfig,
    active: &ActiveSession,
    journal: &mut SessionJournal,
) -> Result<()> {
    loop {
        println!();
        println!("=== Tone Playback and Recording ===");
        println!("1. Play tone with specified frequency");
        println!("2. Record environmental sound");
        println!("3. Play and record simultaneously");
        println!("4. Exit");

        let Some(choice) = prompt_line("\nSelect operation (1-4): ")? else {
            return Ok(());
        };

        let request = match choice.as_str() {
            "1" => {
                let Some(freq) = prompt_number("Enter frequency (Hz): ")? else { continue };
                let Some(duration) = prompt_number("Enter duration (seconds): ")? else { continue };
                let opts = RunOptions {
                    frequency: Some(freq),
                    ..opts.clone()
                };
                build_request(&opts, config, SessionMode::PlayOnly, duration, None)
            }
            "2" => {
                let Some(duration) = prompt_number("Enter recording duration (seconds): ")? else {
                    continue;
                };
                build_request(opts, config, SessionMode::RecordOnly, duration, None)
            }
            "3" => {
                let Some(freq) = prompt_number("Enter frequency (Hz): ")? else { continue };
                let Some(duration) = prompt_number("Enter playback duration (seconds): ")? else {
                    continue;
                };
                let record = prompt_line("Enter recording duration (seconds, blank for default): ")?
                    .filter(|s| !s.is_empty())
                    .and_then(|s| s.parse::<f64>().ok());
                let opts = RunOptions {
                    frequency: Some(freq),
                    ..opts.clone()
                };
                build_request(&opts, config, SessionMode::PlayAndRecord, duration, record)
            }
            "4" => {
                println!("Exiting.");
                return Ok(());
            }
            _ => {
                println!("Invalid selection, please try again.");
                continue;
            }
        };

        run_session(request, opts, config, active, journal)?;
        info!(journal = %journal.path().display(), "Session recorded");
    }
}

/// Read one trimmed line; `None` at end of input
fn prompt_line(label: &str) -> Result<Option<String>> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut input = String::new();
    if io::stdin().read_line(&mut input)? == 0 {
        return Ok(None);
    }
    Ok(Some(input.trim().to_string()))
}

/// Read a number; `None` at end of input or on a parse error
fn prompt_number(label: &str) -> Result<Option<f64>> {
    let Some(line) = prompt_line(label)? else {
        return Ok(None);
    };
    match line.parse() {
        Ok(value) => Ok(Some(value)),
        Err(_) => {
            println!("Invalid number: {}", line);
            Ok(None)
        }
    }
}
