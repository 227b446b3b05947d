//! Platform audio streams
//!
//! Every capture component talks to the hardware through [`AudioBackend`].
//! Input streams deliver mono `f32` blocks to a callback; output streams
//! pull mono `f32` blocks from a render callback and fan them out to every
//! device channel. The returned [`StreamHandle`] owns the device: dropping
//! it stops the stream and releases the microphone or output.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::error::{AudioError, Result};

/// Receives captured audio, downmixed to mono
pub type InputCallback = Box<dyn FnMut(&[f32]) + Send + 'static>;

/// Fills a mono output block; the second argument is the stream sample rate
pub type RenderCallback = Box<dyn FnMut(&mut [f32], u32) + Send + 'static>;

/// Negotiated stream format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Pause/resume control over a live stream
pub trait StreamControl {
    fn pause(&self) -> Result<()>;
    fn resume(&self) -> Result<()>;
}

/// Exclusive ownership of one live device stream
pub struct StreamHandle {
    info: StreamInfo,
    control: Box<dyn StreamControl>,
}

impl StreamHandle {
    pub fn new(info: StreamInfo, control: Box<dyn StreamControl>) -> Self {
        Self { info, control }
    }

    pub fn info(&self) -> StreamInfo {
        self.info
    }

    pub fn pause(&self) -> Result<()> {
        self.control.pause()
    }

    pub fn resume(&self) -> Result<()> {
        self.control.resume()
    }
}

/// Source of input and output streams
pub trait AudioBackend: Send + Sync {
    /// Open a capture stream; fails with `PermissionDenied` or `CaptureUnavailable`
    fn open_input(&self, on_samples: InputCallback) -> Result<StreamHandle>;

    /// Open a playback stream driven by `render`
    fn open_output(&self, render: RenderCallback) -> Result<StreamHandle>;
}

/// [`AudioBackend`] backed by the default cpal host
#[derive(Debug, Clone, Default)]
pub struct CpalBackend {
    /// Input device name; `None` selects the host default
    input_device: Option<String>,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture from the named device instead of the host default
    pub fn with_input_device(name: impl Into<String>) -> Self {
        Self {
            input_device: Some(name.into()),
        }
    }

    /// Names of the available input devices
    pub fn input_device_names() -> Vec<String> {
        let host = cpal::default_host();
        host.input_devices()
            .map(|devices| devices.filter_map(|d| d.name().ok()).collect())
            .unwrap_or_default()
    }

    fn input_device(&self, host: &cpal::Host) -> Result<cpal::Device> {
        match &self.input_device {
            None => host.default_input_device().ok_or_else(|| {
                AudioError::CaptureUnavailable("No input device available".to_string())
            }),
            Some(name) => {
                let mut devices = host
                    .input_devices()
                    .map_err(|e| AudioError::from_platform(e.to_string()))?;
                devices
                    .find(|d| d.name().map(|n| &n == name).unwrap_or(false))
                    .ok_or_else(|| {
                        AudioError::CaptureUnavailable(format!("Input device not found: {}", name))
                    })
            }
        }
    }
}

impl AudioBackend for CpalBackend {
    fn open_input(&self, on_samples: InputCallback) -> Result<StreamHandle> {
        let host = cpal::default_host();
        let device = self.input_device(&host)?;

        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        log::info!("Using input device: {}", device_name);

        let config = device
            .default_input_config()
            .map_err(|e| AudioError::from_platform(e.to_string()))?;
        log::debug!("Input config: {:?}", config);

        let info = StreamInfo {
            sample_rate: config.sample_rate().0,
            channels: config.channels(),
        };
        let channels = info.channels as usize;
        let sample_format = config.sample_format();
        let stream_config: cpal::StreamConfig = config.into();

        let stream = match sample_format {
            cpal::SampleFormat::F32 => {
                build_input::<f32>(&device, &stream_config, channels, on_samples, |s| s)
            }
            cpal::SampleFormat::I16 => {
                build_input::<i16>(&device, &stream_config, channels, on_samples, |s| {
                    s as f32 / 32768.0
                })
            }
            cpal::SampleFormat::U16 => {
                build_input::<u16>(&device, &stream_config, channels, on_samples, |s| {
                    (s as f32 - 32768.0) / 32768.0
                })
            }
            format => {
                return Err(AudioError::CaptureUnavailable(format!(
                    "Unsupported input format: {:?}",
                    format
                )))
            }
        }
        .map_err(|e| AudioError::from_platform(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioError::from_platform(e.to_string()))?;

        log::info!(
            "Capture started: {} Hz, {} channel(s)",
            info.sample_rate,
            info.channels
        );
        Ok(StreamHandle::new(info, Box::new(CpalStream(stream))))
    }

    fn open_output(&self, render: RenderCallback) -> Result<StreamHandle> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or_else(|| {
            AudioError::CaptureUnavailable("No output device available".to_string())
        })?;

        let config = device
            .default_output_config()
            .map_err(|e| AudioError::from_platform(e.to_string()))?;
        log::debug!("Output config: {:?}", config);

        let info = StreamInfo {
            sample_rate: config.sample_rate().0,
            channels: config.channels(),
        };
        let channels = info.channels as usize;
        let sample_format = config.sample_format();
        let stream_config: cpal::StreamConfig = config.into();

        let stream = match sample_format {
            cpal::SampleFormat::F32 => {
                build_output::<f32>(&device, &stream_config, info, render, |s| s)
            }
            cpal::SampleFormat::I16 => {
                build_output::<i16>(&device, &stream_config, info, render, |s| {
                    (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
                })
            }
            cpal::SampleFormat::U16 => {
                build_output::<u16>(&device, &stream_config, info, render, |s| {
                    (s.clamp(-1.0, 1.0) * 32767.0 + 32768.0) as u16
                })
            }
            format => {
                return Err(AudioError::CaptureUnavailable(format!(
                    "Unsupported output format: {:?}",
                    format
                )))
            }
        }
        .map_err(|e| AudioError::from_platform(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioError::from_platform(e.to_string()))?;

        log::info!("Output started: {} Hz, {} channel(s)", info.sample_rate, channels);
        Ok(StreamHandle::new(info, Box::new(CpalStream(stream))))
    }
}

struct CpalStream(cpal::Stream);

impl StreamControl for CpalStream {
    fn pause(&self) -> Result<()> {
        self.0
            .pause()
            .map_err(|e| AudioError::from_platform(e.to_string()))
    }

    fn resume(&self) -> Result<()> {
        self.0
            .play()
            .map_err(|e| AudioError::from_platform(e.to_string()))
    }
}

fn build_input<T: cpal::SizedSample + 'static>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    mut on_samples: InputCallback,
    to_f32: fn(T) -> f32,
) -> std::result::Result<cpal::Stream, cpal::BuildStreamError> {
    let channels = channels.max(1);
    let mut mono: Vec<f32> = Vec::with_capacity(4096);
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            mono.clear();
            for frame in data.chunks(channels) {
                let sum: f32 = frame.iter().map(|&s| to_f32(s)).sum();
                mono.push(sum / frame.len() as f32);
            }
            on_samples(&mono);
        },
        |err| log::error!("Audio input error: {}", err),
        None,
    )
}

fn build_output<T: cpal::SizedSample + 'static>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    info: StreamInfo,
    mut render: RenderCallback,
    from_f32: fn(f32) -> T,
) -> std::result::Result<cpal::Stream, cpal::BuildStreamError> {
    let channels = (info.channels as usize).max(1);
    let sample_rate = info.sample_rate;
    let mut mono: Vec<f32> = Vec::with_capacity(4096);
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let frames = data.len() / channels;
            mono.clear();
            mono.resize(frames, 0.0);
            render(&mut mono, sample_rate);
            for (frame, &sample) in data.chunks_mut(channels).zip(mono.iter()) {
                for ch in frame.iter_mut() {
                    *ch = from_f32(sample);
                }
            }
        },
        |err| log::error!("Audio output error: {}", err),
        None,
    )
}
