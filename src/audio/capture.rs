//! Audio Capture using cpal
//!
//! One capture session per answer: start opens the default input device at
//! its native config, samples accumulate on a capture thread, and stop
//! finalizes them into a single 16 kHz mono WAV artifact delivered through a
//! completion channel.

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;

/// Finished artifact of one recording attempt.
#[derive(Debug, Clone)]
pub struct RecordedAudio {
    /// Complete WAV file bytes (16 kHz mono 16-bit PCM).
    pub wav: Vec<u8>,
    /// Captured duration after conversion.
    pub duration_ms: u64,
}

/// Seam between the orchestrator and the microphone, so the state machine
/// can be exercised without audio hardware.
#[allow(async_fn_in_trait)]
pub trait AudioSource {
    /// Begin a recording session. No-op when one is already active; an
    /// error means capture could not start (for example, no input device)
    /// and must be surfaced to the user as a notice.
    fn begin(&mut self) -> Result<()>;

    /// End the session and await the finalized artifact. Returns `None`
    /// when no session was active.
    async fn finish(&mut self) -> Result<Option<RecordedAudio>>;

    fn is_recording(&self) -> bool;
}

/// cpal-backed [`AudioSource`].
pub struct MicCapture {
    is_recording: Arc<AtomicBool>,
    target_rate: u32,
    flush_timeout: Duration,
    artifact_rx: Option<oneshot::Receiver<Result<RecordedAudio>>>,
}

impl MicCapture {
    pub fn new(target_rate: u32, flush_timeout: Duration) -> Self {
        Self {
            is_recording: Arc::new(AtomicBool::new(false)),
            target_rate,
            flush_timeout,
            artifact_rx: None,
        }
    }
}

impl AudioSource for MicCapture {
    fn begin(&mut self) -> Result<()> {
        if self.is_recording.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // Check the device up front so a missing/denied microphone surfaces
        // as a notice instead of a dead capture thread.
        let host = cpal::default_host();
        if host.default_input_device().is_none() {
            self.is_recording.store(false, Ordering::SeqCst);
            return Err(anyhow!("no input device available"));
        }

        let (artifact_tx, artifact_rx) = oneshot::channel();
        self.artifact_rx = Some(artifact_rx);

        let is_recording = self.is_recording.clone();
        let target_rate = self.target_rate;

        thread::spawn(move || {
            let result = run_capture(is_recording.clone(), target_rate);
            if let Err(ref e) = result {
                tracing::error!("capture thread failed: {e}");
            }
            is_recording.store(false, Ordering::SeqCst);
            let _ = artifact_tx.send(result);
        });

        tracing::info!("audio capture started");
        Ok(())
    }

    async fn finish(&mut self) -> Result<Option<RecordedAudio>> {
        let Some(rx) = self.artifact_rx.take() else {
            return Ok(None);
        };

        self.is_recording.store(false, Ordering::SeqCst);

        let artifact = tokio::time::timeout(self.flush_timeout, rx)
            .await
            .map_err(|_| anyhow!("capture finalization timed out"))?
            .map_err(|_| anyhow!("capture thread dropped without an artifact"))??;

        tracing::info!(
            duration_ms = artifact.duration_ms,
            bytes = artifact.wav.len(),
            "audio capture finished"
        );
        Ok(Some(artifact))
    }

    fn is_recording(&self) -> bool {
        self.is_recording.load(Ordering::SeqCst)
    }
}

fn run_capture(is_recording: Arc<AtomicBool>, target_rate: u32) -> Result<RecordedAudio> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("no input device available"))?;

    tracing::debug!("input device: {}", device.name().unwrap_or_default());

    // Use the device's exact native config; conversion happens afterwards.
    let supported_config = device.default_input_config()?;
    let native_rate = supported_config.sample_rate().0;
    let native_channels = supported_config.channels();
    let sample_format = supported_config.sample_format();
    let config = supported_config.config();

    tracing::debug!(
        "native config: {} Hz, {} channels, {:?}",
        native_rate,
        native_channels,
        sample_format
    );

    let (frame_tx, frame_rx) = std_mpsc::channel::<Vec<i16>>();

    let gate = is_recording.clone();
    let err_fn = |err| {
        tracing::error!("input stream error: {err}");
    };

    let stream = match sample_format {
        SampleFormat::I16 => {
            let tx = frame_tx.clone();
            device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    if !gate.load(Ordering::SeqCst) {
                        return;
                    }
                    let _ = tx.send(data.to_vec());
                },
                err_fn,
                None,
            )?
        }
        SampleFormat::F32 => {
            let tx = frame_tx.clone();
            device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if !gate.load(Ordering::SeqCst) {
                        return;
                    }
                    let samples: Vec<i16> = data.iter().map(|s| (*s * 32767.0) as i16).collect();
                    let _ = tx.send(samples);
                },
                err_fn,
                None,
            )?
        }
        format => {
            return Err(anyhow!("unsupported sample format: {format:?}"));
        }
    };

    stream.play()?;
    drop(frame_tx);

    let mut samples: Vec<i16> = Vec::new();
    while is_recording.load(Ordering::SeqCst) {
        match frame_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(frame) => samples.extend_from_slice(&frame),
            Err(std_mpsc::RecvTimeoutError::Timeout) => {}
            Err(std_mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    // Drain whatever the callback produced before the flag flipped.
    while let Ok(frame) = frame_rx.try_recv() {
        samples.extend_from_slice(&frame);
    }
    drop(stream);

    let mono = downmix(&samples, native_channels);
    let resampled = resample(&mono, native_rate, target_rate);
    let duration_ms = (resampled.len() as u64 * 1000) / u64::from(target_rate.max(1));
    let wav = encode_wav(&resampled, target_rate)?;

    Ok(RecordedAudio { wav, duration_ms })
}

/// Average interleaved channels down to mono.
fn downmix(samples: &[i16], channels: u16) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks(channels as usize)
        .map(|chunk| {
            let sum: i32 = chunk.iter().map(|&s| i32::from(s)).sum();
            (sum / chunk.len() as i32) as i16
        })
        .collect()
}

/// Nearest-neighbour resample; good enough for speech going to Whisper.
fn resample(mono: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || mono.is_empty() {
        return mono.to_vec();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = (mono.len() as f64 / ratio) as usize;
    (0..out_len)
        .map(|i| {
            let src = ((i as f64 * ratio) as usize).min(mono.len() - 1);
            mono[src]
        })
        .collect()
}

fn encode_wav(mono: &[i16], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).context("failed to create WAV writer")?;
        for &sample in mono {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}
