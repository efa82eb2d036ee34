//! Sound-card host backed by CPAL.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use super::host::{AudioHost, CaptureSink, LiveGraph};
use crate::dsp::pitch_shift::StreamSpec;
use crate::error::{Result, ToneError};

/// A running CPAL stream. Dropping it stops the stream and releases the
/// device.
pub struct CpalStream {
    _stream: cpal::Stream,
}

/// Opens the system's input and output devices, by name or default.
pub struct CpalHost {
    host: cpal::Host,
    input_device: Option<String>,
    output_device: Option<String>,
}

impl Default for CpalHost {
    fn default() -> Self {
        Self::new()
    }
}

impl CpalHost {
    pub fn new() -> Self {
        CpalHost {
            host: cpal::default_host(),
            input_device: None,
            output_device: None,
        }
    }

    pub fn with_input_device(mut self, name: impl Into<String>) -> Self {
        self.input_device = Some(name.into());
        self
    }

    pub fn with_output_device(mut self, name: impl Into<String>) -> Self {
        self.output_device = Some(name.into());
        self
    }

    pub fn input_device_names(&self) -> Result<Vec<String>> {
        Ok(self
            .host
            .input_devices()
            .map_err(device_error)?
            .filter_map(|d| d.name().ok())
            .collect())
    }

    pub fn output_device_names(&self) -> Result<Vec<String>> {
        Ok(self
            .host
            .output_devices()
            .map_err(device_error)?
            .filter_map(|d| d.name().ok())
            .collect())
    }

    fn input(&self) -> Result<cpal::Device> {
        match &self.input_device {
            Some(name) => find_by_name(self.host.input_devices().map_err(device_error)?, name),
            None => self
                .host
                .default_input_device()
                .ok_or_else(|| ToneError::DeviceAcquisition("no input device available".into())),
        }
    }

    fn output(&self) -> Result<cpal::Device> {
        match &self.output_device {
            Some(name) => find_by_name(self.host.output_devices().map_err(device_error)?, name),
            None => self
                .host
                .default_output_device()
                .ok_or_else(|| ToneError::DeviceAcquisition("no output device available".into())),
        }
    }
}

impl AudioHost for CpalHost {
    type Input = CpalStream;
    type Output = CpalStream;

    fn open_input(&mut self, spec: StreamSpec, sink: CaptureSink) -> Result<CpalStream> {
        let device = self.input()?;
        let supported = device.default_input_config().map_err(device_error)?;
        let config = stream_config(supported.channels(), spec);
        log::debug!(
            "opening input {:?}: {} ch @ {} Hz, {:?}",
            device.name().unwrap_or_default(),
            config.channels,
            spec.sample_rate,
            supported.sample_format()
        );

        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => build_input::<f32>(&device, &config, sink)?,
            cpal::SampleFormat::I16 => build_input::<i16>(&device, &config, sink)?,
            cpal::SampleFormat::U16 => build_input::<u16>(&device, &config, sink)?,
            format => {
                return Err(ToneError::DeviceAcquisition(format!(
                    "unsupported input sample format {format:?}"
                )));
            }
        };
        stream.play().map_err(device_error)?;
        Ok(CpalStream { _stream: stream })
    }

    fn open_output(&mut self, spec: StreamSpec, graph: LiveGraph) -> Result<CpalStream> {
        let device = self.output()?;
        let supported = device.default_output_config().map_err(device_error)?;
        let config = stream_config(supported.channels(), spec);
        log::debug!(
            "opening output {:?}: {} ch @ {} Hz, {:?}",
            device.name().unwrap_or_default(),
            config.channels,
            spec.sample_rate,
            supported.sample_format()
        );

        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => build_output::<f32>(&device, &config, graph)?,
            cpal::SampleFormat::I16 => build_output::<i16>(&device, &config, graph)?,
            cpal::SampleFormat::U16 => build_output::<u16>(&device, &config, graph)?,
            format => {
                return Err(ToneError::DeviceAcquisition(format!(
                    "unsupported output sample format {format:?}"
                )));
            }
        };
        stream.play().map_err(device_error)?;
        Ok(CpalStream { _stream: stream })
    }
}

fn device_error(e: impl std::fmt::Display) -> ToneError {
    ToneError::DeviceAcquisition(e.to_string())
}

fn find_by_name(mut devices: impl Iterator<Item = cpal::Device>, name: &str) -> Result<cpal::Device> {
    devices
        .find(|d| d.name().map(|n| n == name).unwrap_or(false))
        .ok_or_else(|| ToneError::DeviceAcquisition(format!("device '{name}' not found")))
}

/// Device channel count at the graph's sample rate.
fn stream_config(channels: u16, spec: StreamSpec) -> cpal::StreamConfig {
    cpal::StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(spec.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    }
}

fn build_input<T>(device: &cpal::Device, config: &cpal::StreamConfig, mut sink: CaptureSink) -> Result<cpal::Stream>
where
    T: cpal::SizedSample,
    f32: cpal::FromSample<T>,
{
    let channels = config.channels as usize;
    // Grows on the first callback, then stable
    let mut scratch = Vec::<f32>::new();

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                scratch.clear();
                scratch.extend(data.iter().map(|s| cpal::Sample::to_sample::<f32>(*s)));
                sink.push_frames(&scratch, channels);
            },
            |err| log::warn!("input stream error: {err}"),
            None,
        )
        .map_err(device_error)
}

fn build_output<T>(device: &cpal::Device, config: &cpal::StreamConfig, mut graph: LiveGraph) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels as usize;
    let mut scratch = Vec::<f32>::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if scratch.len() != data.len() {
                    scratch.resize(data.len(), 0.0);
                }
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    graph.render_frames(&mut scratch, channels);
                }));
                if result.is_err() {
                    scratch.fill(0.0);
                }
                for (out, s) in data.iter_mut().zip(&scratch) {
                    *out = <T as cpal::Sample>::from_sample(*s);
                }
            },
            |err| log::warn!("output stream error: {err}"),
            None,
        )
        .map_err(device_error)
}
