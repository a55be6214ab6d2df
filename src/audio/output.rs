// Clip output. CpalSink drives the default device through a ring buffer,
// NullSink only waits out the clip's duration.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::HeapRb;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::convert::{self, ConvertError};
use super::Pcm;

const RING_BUFFER_SIZE: usize = 48000 * 2 / 4; // ~250ms of stereo audio at 48kHz
const POLL_INTERVAL: Duration = Duration::from_millis(5);
/// Time for the device to play out its last callback buffer
const DRAIN_TAIL: Duration = Duration::from_millis(100);

type RingConsumer = ringbuf::HeapCons<f32>;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("no audio output device available")]
    NoDevice,
    #[error("failed to get default output config: {0}")]
    Config(#[from] cpal::DefaultStreamConfigError),
    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to build output stream: {0}")]
    Build(#[from] cpal::BuildStreamError),
    #[error("failed to start stream: {0}")]
    Play(#[from] cpal::PlayStreamError),
    #[error("audio stream error: {0}")]
    Stream(String),
    #[error(transparent)]
    Convert(#[from] ConvertError),
    #[error("failed to spawn playback thread: {0}")]
    Thread(#[source] std::io::Error),
    #[error("no async runtime to time playback on")]
    NoRuntime,
    #[error("audio output ended without reporting a result")]
    Closed,
}

/// Resolves once the clip has played to its end or its stop token fired
pub type Playback = oneshot::Receiver<Result<(), OutputError>>;

/// Something that can play one decoded clip at a time per call
pub trait AudioSink: Send + Sync + 'static {
    /// Begin playing `pcm`. Cancelling `stop` silences the clip and releases
    /// the output as soon as the sink notices.
    fn start(&self, pcm: Pcm, stop: CancellationToken) -> Result<Playback, OutputError>;
}

/// Plays through the default cpal output device
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalSink;

impl AudioSink for CpalSink {
    fn start(&self, pcm: Pcm, stop: CancellationToken) -> Result<Playback, OutputError> {
        let (tx, rx) = oneshot::channel();

        // cpal streams are not Send on every platform, so each clip owns a thread
        thread::Builder::new()
            .name("diktat-clip".into())
            .spawn(move || {
                let result = play_blocking(pcm, &stop);
                if let Err(e) = &result {
                    error!("clip output failed: {e}");
                }
                let _ = tx.send(result);
            })
            .map_err(OutputError::Thread)?;

        Ok(rx)
    }
}

fn play_blocking(pcm: Pcm, stop: &CancellationToken) -> Result<(), OutputError> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(OutputError::NoDevice)?;
    let supported = device.default_output_config()?;
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.into();

    let pcm = convert::adapt(pcm, config.sample_rate.0, config.channels)?;
    debug!(
        frames = pcm.frames(),
        rate = pcm.sample_rate,
        channels = pcm.channels,
        "clip adapted to output device"
    );

    let rb = HeapRb::<f32>::new(RING_BUFFER_SIZE);
    let (mut producer, consumer) = rb.split();
    let (err_tx, err_rx) = mpsc::channel();

    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, consumer, err_tx)?,
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, consumer, err_tx)?,
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, consumer, err_tx)?,
        format => return Err(OutputError::UnsupportedFormat(format!("{format:?}"))),
    };
    stream.play()?;

    let mut remaining = &pcm.samples[..];
    while !remaining.is_empty() {
        if stop.is_cancelled() {
            return Ok(());
        }
        check_stream(&err_rx)?;

        let written = producer.push_slice(remaining);
        remaining = &remaining[written..];
        if written == 0 {
            thread::sleep(POLL_INTERVAL);
        }
    }

    while !producer.is_empty() {
        if stop.is_cancelled() {
            return Ok(());
        }
        check_stream(&err_rx)?;
        thread::sleep(POLL_INTERVAL);
    }

    if !stop.is_cancelled() {
        thread::sleep(DRAIN_TAIL);
    }
    drop(stream);
    Ok(())
}

fn check_stream(err_rx: &mpsc::Receiver<String>) -> Result<(), OutputError> {
    match err_rx.try_recv() {
        Ok(msg) => Err(OutputError::Stream(msg)),
        Err(_) => Ok(()),
    }
}

fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut consumer: RingConsumer,
    err_tx: mpsc::Sender<String>,
) -> Result<Stream, OutputError> {
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            for sample in data.iter_mut() {
                *sample = T::from_sample(consumer.try_pop().unwrap_or(0.0));
            }
        },
        move |err| {
            let _ = err_tx.send(err.to_string());
        },
        None,
    )?;

    Ok(stream)
}

/// Silent sink: waits for the clip's duration (or a fixed one) on the tokio
/// timer. Tracks how many clips overlap.
#[derive(Debug, Default, Clone)]
pub struct NullSink {
    fixed: Option<Duration>,
    counters: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    started: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every clip lasts `duration` regardless of its content
    pub fn with_duration(duration: Duration) -> Self {
        Self {
            fixed: Some(duration),
            counters: Arc::default(),
        }
    }

    pub fn started(&self) -> usize {
        self.counters.started.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.counters.active.load(Ordering::SeqCst)
    }

    /// Highest number of clips that were ever playing at once
    pub fn peak_active(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }
}

impl AudioSink for NullSink {
    fn start(&self, pcm: Pcm, stop: CancellationToken) -> Result<Playback, OutputError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| OutputError::NoRuntime)?;
        let duration = self.fixed.unwrap_or_else(|| pcm.duration());
        let counters = self.counters.clone();

        counters.started.fetch_add(1, Ordering::SeqCst);
        let now_active = counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        counters.peak.fetch_max(now_active, Ordering::SeqCst);

        let (tx, rx) = oneshot::channel();
        handle.spawn(async move {
            tokio::select! {
                biased;
                _ = stop.cancelled() => {}
                _ = tokio::time::sleep(duration) => {}
            }
            counters.active.fetch_sub(1, Ordering::SeqCst);
            let _ = tx.send(Ok(()));
        });

        Ok(rx)
    }
}
