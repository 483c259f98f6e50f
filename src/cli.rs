//! Command-line argument parsing
//!
//! Flags are parsed by hand. Anything not given on the command line falls
//! back to the persistent [`AppConfig`](crate::AppConfig).

use std::path::PathBuf;
use thiserror::Error;
use tonecap_core::{SessionMode, WaveformKind};

/// Tone frequency when none is given
pub const DEFAULT_FREQUENCY_HZ: f64 = 440.0;

/// Play or record duration when none is given
pub const DEFAULT_DURATION_SECS: f64 = 1.0;

/// Argument errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ArgError {
    #[error("{0} requires a value")]
    MissingValue(String),

    #[error("Invalid value for {flag}: {value}")]
    InvalidValue { flag: String, value: String },

    #[error("Unknown argument: {0}")]
    Unknown(String),
}

/// Options for one session run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOptions {
    /// Mode; `None` starts the interactive menu
    pub mode: Option<SessionMode>,
    pub frequency: Option<f64>,
    pub duration: Option<f64>,
    pub record_duration: Option<f64>,
    pub waveform: Option<WaveformKind>,
    pub amplitude: Option<f32>,
    pub sample_rate: Option<u32>,
    /// Use the virtual device instead of audio hardware
    pub simulate: bool,
    /// Config file instead of the default location
    pub config: Option<PathBuf>,
}

impl RunOptions {
    /// Frequency or the default
    pub fn frequency_or_default(&self) -> f64 {
        self.frequency.unwrap_or(DEFAULT_FREQUENCY_HZ)
    }

    /// Duration or the default
    pub fn duration_or_default(&self) -> f64 {
        self.duration.unwrap_or(DEFAULT_DURATION_SECS)
    }
}

/// What the binary was asked to do
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    List,
    Version,
    Help,
    Run(RunOptions),
}

/// Parse a mode name
pub fn parse_mode(name: &str) -> Option<SessionMode> {
    match name.to_ascii_lowercase().as_str() {
        "play" => Some(SessionMode::PlayOnly),
        "record" => Some(SessionMode::RecordOnly),
        "both" | "play-record" => Some(SessionMode::PlayAndRecord),
        _ => None,
    }
}

fn value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str, ArgError> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| ArgError::MissingValue(flag.to_string()))
}

fn parsed<T: std::str::FromStr>(args: &[String], i: usize, flag: &str) -> Result<T, ArgError> {
    let raw = value(args, i, flag)?;
    raw.parse().map_err(|_| ArgError::InvalidValue {
        flag: flag.to_string(),
        value: raw.to_string(),
    })
}

/// Parse `args`, where `args[0]` is the program name
pub fn parse_args(args: &[String]) -> Result<Command, ArgError> {
    let mut opts = RunOptions::default();
    let mut i = 1;

    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--list" | "-l" => return Ok(Command::List),
            "--version" | "-v" => return Ok(Command::Version),
            "--help" | "-h" => return Ok(Command::Help),
            "--simulate" | "-s" => {
                opts.simulate = true;
                i += 1;
                continue;
            }
            "--mode" | "-m" => {
                let raw = value(args, i, flag)?;
                opts.mode = Some(parse_mode(raw).ok_or_else(|| ArgError::InvalidValue {
                    flag: flag.to_string(),
                    value: raw.to_string(),
                })?);
            }
            "--frequency" | "-f" => opts.frequency = Some(parsed(args, i, flag)?),
            "--duration" | "-d" => opts.duration = Some(parsed(args, i, flag)?),
            "--record-duration" => opts.record_duration = Some(parsed(args, i, flag)?),
            "--waveform" | "-w" => {
                opts.waveform = Some(WaveformKind::from_name(value(args, i, flag)?))
            }
            "--amplitude" | "-a" => opts.amplitude = Some(parsed(args, i, flag)?),
            "--sample-rate" | "-r" => opts.sample_rate = Some(parsed(args, i, flag)?),
            "--config" | "-c" => opts.config = Some(PathBuf::from(value(args, i, flag)?)),
            other => return Err(ArgError::Unknown(other.to_string())),
        }
        i += 2;
    }

    Ok(Command::Run(opts))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("tonecap")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_no_args_is_interactive() {
        assert_eq!(parse_args(&args(&[])), Ok(Command::Run(RunOptions::default())));
    }

    #[test]
    fn test_full_run() {
        let cmd = parse_args(&args(&[
            "--mode", "both", "-f", "1000", "--duration", "2.5", "--record-duration", "4",
            "--waveform", "triangle", "-a", "0.8", "-r", "48000", "--simulate",
        ]))
        .unwrap();
        let Command::Run(opts) = cmd else {
            panic!("expected run, got {:?}", cmd);
        };
        assert_eq!(opts.mode, Some(SessionMode::PlayAndRecord));
        assert_eq!(opts.frequency, Some(1000.0));
        assert_eq!(opts.duration, Some(2.5));
        assert_eq!(opts.record_duration, Some(4.0));
        assert_eq!(opts.waveform, Some(WaveformKind::Triangle));
        assert_eq!(opts.amplitude, Some(0.8));
        assert_eq!(opts.sample_rate, Some(48000));
        assert!(opts.simulate);
    }

    #[test]
    fn test_info_commands_short_circuit() {
        assert_eq!(parse_args(&args(&["--list", "--bogus"])), Ok(Command::List));
        assert_eq!(parse_args(&args(&["-v"])), Ok(Command::Version));
        assert_eq!(parse_args(&args(&["--help"])), Ok(Command::Help));
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            parse_args(&args(&["--frequency"])),
            Err(ArgError::MissingValue("--frequency".into()))
        );
        assert!(matches!(
            parse_args(&args(&["--mode", "loop"])),
            Err(ArgError::InvalidValue { .. })
        ));
        assert!(matches!(
            parse_args(&args(&["-r", "fast"])),
            Err(ArgError::InvalidValue { .. })
        ));
        assert_eq!(parse_args(&args(&["--nope"])), Err(ArgError::Unknown("--nope".into())));
    }

    #[test]
    fn test_defaults() {
        let opts = RunOptions::default();
        assert_eq!(opts.frequency_or_default(), 440.0);
        assert_eq!(opts.duration_or_default(), 1.0);
    }
}
