//! Sampler backed by the default `cpal` input device.
//!
//! Each input frame becomes one reading; device channels beyond
//! `NUM_CHANNELS` are ignored and missing ones read as zero. The cpal stream
//! is not `Send`, so it lives on its own thread for as long as the sampler
//! exists.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{error, info};

use crate::error::SamplerError;
use crate::sampler::Sampler;

const FRAME_QUEUE_LEN: usize = 48000;

pub struct AudioSampler<const NUM_CHANNELS: usize> {
    frames: mpsc::Receiver<[f64; NUM_CHANNELS]>,
    timeout: Duration,
    // dropping this ends the stream thread
    _stop: mpsc::Sender<()>,
}

impl<const NUM_CHANNELS: usize> AudioSampler<NUM_CHANNELS> {
    pub fn open_default(timeout: Duration) -> Result<Self, SamplerError> {
        let (frame_tx, frame_rx) = mpsc::sync_channel(FRAME_QUEUE_LEN);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (ready_tx, ready_rx) = mpsc::channel();

        thread::spawn(move || {
            let stream = match build_stream::<NUM_CHANNELS>(frame_tx) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));

            // blocks until the sampler is dropped
            let _ = stop_rx.recv();
            drop(stream);
        });

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(AudioSampler {
                frames: frame_rx,
                timeout,
                _stop: stop_tx,
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(SamplerError::Disconnected),
        }
    }
}

fn build_stream<const NUM_CHANNELS: usize>(
    frame_tx: mpsc::SyncSender<[f64; NUM_CHANNELS]>,
) -> Result<cpal::Stream, SamplerError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| SamplerError::Device("no input device".to_string()))?;
    let supported = device
        .default_input_config()
        .map_err(|e| SamplerError::Device(e.to_string()))?;

    if supported.sample_format() != cpal::SampleFormat::F32 {
        return Err(SamplerError::Device(format!(
            "unsupported sample format {:?}",
            supported.sample_format()
        )));
    }

    let config: cpal::StreamConfig = supported.config();
    let device_channels = config.channels as usize;
    info!(
        "audio input: {} channels at {} Hz",
        device_channels, config.sample_rate.0
    );

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                for frame in data.chunks(device_channels) {
                    let mut arr = [0.0; NUM_CHANNELS];
                    for (value, input) in arr.iter_mut().zip(frame) {
                        *value = *input as f64;
                    }
                    // a full queue means the reader fell behind; the frame is dropped
                    let _ = frame_tx.try_send(arr);
                }
            },
            |err| error!("audio input stream error: {}", err),
            None,
        )
        .map_err(|e| SamplerError::Device(e.to_string()))?;

    stream
        .play()
        .map_err(|e| SamplerError::Device(e.to_string()))?;
    Ok(stream)
}

impl<const NUM_CHANNELS: usize> Sampler<NUM_CHANNELS> for AudioSampler<NUM_CHANNELS> {
    fn read_sample(&mut self) -> Result<[f64; NUM_CHANNELS], SamplerError> {
        match self.frames.recv_timeout(self.timeout) {
            Ok(frame) => Ok(frame),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(SamplerError::Timeout),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(SamplerError::Disconnected),
        }
    }
}
