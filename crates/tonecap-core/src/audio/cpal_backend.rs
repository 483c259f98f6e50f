//! cpal backend for real audio devices
//!
//! Provides:
//! - Enumerating devices on the default host
//! - Selecting input/output devices by name
//! - Building 32-bit float streams that drive the shared callbacks
//!
//! Streams are mono on the tonecap side: the tone is written to every output
//! channel and channel 0 of the input is captured.

use super::callback::{CaptureCallback, PlaybackCallback};
use super::engine::{
    AudioBackend, Direction, EngineError, FaultReporter, StreamHandle, StreamSettings,
};
use anyhow::Result;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Host, SampleRate, Stream, StreamConfig};

/// Common sample rates probed when listing devices
const COMMON_RATES: [u32; 6] = [44100, 48000, 88200, 96000, 176400, 192000];

/// Audio device information
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Device name
    pub name: String,
    /// Whether this is the default input or output device
    pub is_default: bool,
    /// Supported sample rates among [`COMMON_RATES`]
    pub sample_rates: Vec<u32>,
    /// Number of input channels
    pub input_channels: u16,
    /// Number of output channels
    pub output_channels: u16,
}

/// Backend using the platform's default cpal host
#[derive(Debug, Clone, Default)]
pub struct CpalBackend {
    input_device: Option<String>,
    output_device: Option<String>,
}

impl CpalBackend {
    /// Backend using the host's default devices
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the input device named `name` instead of the default
    pub fn with_input_device(mut self, name: impl Into<String>) -> Self {
        self.input_device = Some(name.into());
        self
    }

    /// Use the output device named `name` instead of the default
    pub fn with_output_device(mut self, name: impl Into<String>) -> Self {
        self.output_device = Some(name.into());
        self
    }

    /// List available devices on the default host
    ///
    /// # Returns
    /// Vector of device information for every device the host reports
    pub fn list_devices() -> Result<Vec<DeviceInfo>> {
        let host = cpal::default_host();
        let mut devices = Vec::new();

        let default_input = host.default_input_device().and_then(|d| d.name().ok());
        let default_output = host.default_output_device().and_then(|d| d.name().ok());

        for device in host.devices()? {
            let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
            let is_default = default_input.as_deref() == Some(name.as_str())
                || default_output.as_deref() == Some(name.as_str());

            let input_channels = device
                .default_input_config()
                .map(|c| c.channels())
                .unwrap_or(0);
            let output_channels = device
                .default_output_config()
                .map(|c| c.channels())
                .unwrap_or(0);

            let mut sample_rates = Vec::new();
            let ranges = device
                .supported_output_configs()
                .map(|c| c.collect::<Vec<_>>())
                .or_else(|_| device.supported_input_configs().map(|c| c.collect()))
                .unwrap_or_default();
            for config in ranges {
                for &rate in &COMMON_RATES {
                    if (config.min_sample_rate().0..=config.max_sample_rate().0).contains(&rate)
                        && !sample_rates.contains(&rate)
                    {
                        sample_rates.push(rate);
                    }
                }
            }
            sample_rates.sort();

            devices.push(DeviceInfo {
                name,
                is_default,
                sample_rates,
                input_channels,
                output_channels,
            });
        }

        Ok(devices)
    }

    fn resolve_device(
        host: &Host,
        direction: Direction,
        name: Option<&str>,
    ) -> Result<Device, EngineError> {
        let Some(name) = name else {
            let device = match direction {
                Direction::Output => host.default_output_device(),
                Direction::Input => host.default_input_device(),
            };
            return device.ok_or(EngineError::NoDevice(direction));
        };

        let devices = match direction {
            Direction::Output => host.output_devices().map(|d| d.collect::<Vec<_>>()),
            Direction::Input => host.input_devices().map(|d| d.collect::<Vec<_>>()),
        }
        .map_err(|e| EngineError::OpenFailed {
            direction,
            reason: e.to_string(),
        })?;

        devices
            .into_iter()
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| EngineError::DeviceNotFound(name.to_string()))
    }

    fn stream_config(
        device: &Device,
        direction: Direction,
        settings: &StreamSettings,
    ) -> Result<StreamConfig, EngineError> {
        let default = match direction {
            Direction::Output => device.default_output_config(),
            Direction::Input => device.default_input_config(),
        }
        .map_err(|e| EngineError::OpenFailed {
            direction,
            reason: e.to_string(),
        })?;

        if default.sample_rate().0 != settings.sample_rate {
            tracing::info!(
                %direction,
                device_rate = default.sample_rate().0,
                requested_rate = settings.sample_rate,
                "Requesting non-default sample rate"
            );
        }

        Ok(StreamConfig {
            channels: default.channels(),
            sample_rate: SampleRate(settings.sample_rate),
            buffer_size: settings
                .block_frames
                .map_or(cpal::BufferSize::Default, cpal::BufferSize::Fixed),
        })
    }
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &str {
        "cpal"
    }

    fn open_output(
        &self,
        settings: &StreamSettings,
        callback: PlaybackCallback,
        faults: FaultReporter,
    ) -> Result<Box<dyn StreamHandle>, EngineError> {
        let direction = Direction::Output;
        let host = cpal::default_host();
        let device = Self::resolve_device(&host, direction, self.output_device.as_deref())?;
        let config = Self::stream_config(&device, direction, settings)?;
        let mut callback = callback.bind_channels(config.channels);

        tracing::info!(
            device = %device.name().unwrap_or_default(),
            channels = config.channels,
            sample_rate = settings.sample_rate,
            "Opening output device"
        );

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| callback.process(data),
                move |err| {
                    tracing::error!("Output stream error: {}", err);
                    faults.report(direction, err.to_string());
                },
                None,
            )
            .map_err(|e| EngineError::OpenFailed {
                direction,
                reason: e.to_string(),
            })?;

        Ok(Box::new(CpalStream {
            direction,
            stream: Some(stream),
        }))
    }

    fn open_input(
        &self,
        settings: &StreamSettings,
        callback: CaptureCallback,
        faults: FaultReporter,
    ) -> Result<Box<dyn StreamHandle>, EngineError> {
        let direction = Direction::Input;
        let host = cpal::default_host();
        let device = Self::resolve_device(&host, direction, self.input_device.as_deref())?;
        let config = Self::stream_config(&device, direction, settings)?;
        let mut callback = callback.bind_channels(config.channels);

        tracing::info!(
            device = %device.name().unwrap_or_default(),
            channels = config.channels,
            sample_rate = settings.sample_rate,
            "Opening input device"
        );

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| callback.process(data),
                move |err| {
                    tracing::error!("Input stream error: {}", err);
                    faults.report(direction, err.to_string());
                },
                None,
            )
            .map_err(|e| EngineError::OpenFailed {
                direction,
                reason: e.to_string(),
            })?;

        Ok(Box::new(CpalStream {
            direction,
            stream: Some(stream),
        }))
    }
}

struct CpalStream {
    direction: Direction,
    stream: Option<Stream>,
}

impl StreamHandle for CpalStream {
    fn direction(&self) -> Direction {
        self.direction
    }

    fn start(&mut self) -> Result<(), EngineError> {
        let stream = self.stream.as_ref().ok_or_else(|| EngineError::StartFailed {
            direction: self.direction,
            reason: "stream already closed".to_string(),
        })?;
        stream.play().map_err(|e| EngineError::StartFailed {
            direction: self.direction,
            reason: e.to_string(),
        })
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                tracing::warn!(
                    direction = %self.direction,
                    error = %e,
                    "Failed to pause stream before close"
                );
            }
        }
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        self.close();
    }
}
