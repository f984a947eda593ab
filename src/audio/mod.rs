use crate::error::PlayerError;
use anyhow::{Context, Result};
use rodio::Source;
use rodio::cpal::traits::{DeviceTrait, HostTrait};
use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink};
#[cfg(unix)]
use std::ffi::CString;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub trait AudioEngine {
    fn load(&mut self, path: &Path) -> Result<()>;
    /// After `stop` this restarts the loaded track.
    fn play(&mut self) -> Result<()>;
    fn pause(&mut self);
    /// Keeps the loaded path.
    fn stop(&mut self);
    fn set_volume(&mut self, volume: u8);
    fn volume(&self) -> u8;
    fn loaded_track(&self) -> Option<&Path>;
    fn position(&self) -> Option<Duration>;
    fn duration(&self) -> Option<Duration>;
    fn has_ended(&self) -> bool;
    fn is_healthy(&self) -> bool;
    fn recover(&mut self) -> Result<()>;
}

impl<E: AudioEngine + ?Sized> AudioEngine for Box<E> {
    fn load(&mut self, path: &Path) -> Result<()> {
        (**self).load(path)
    }

    fn play(&mut self) -> Result<()> {
        (**self).play()
    }

    fn pause(&mut self) {
        (**self).pause()
    }

    fn stop(&mut self) {
        (**self).stop()
    }

    fn set_volume(&mut self, volume: u8) {
        (**self).set_volume(volume)
    }

    fn volume(&self) -> u8 {
        (**self).volume()
    }

    fn loaded_track(&self) -> Option<&Path> {
        (**self).loaded_track()
    }

    fn position(&self) -> Option<Duration> {
        (**self).position()
    }

    fn duration(&self) -> Option<Duration> {
        (**self).duration()
    }

    fn has_ended(&self) -> bool {
        (**self).has_ended()
    }

    fn is_healthy(&self) -> bool {
        (**self).is_healthy()
    }

    fn recover(&mut self) -> Result<()> {
        (**self).recover()
    }
}

pub fn bind_engine(silent: bool) -> Result<Box<dyn AudioEngine>, PlayerError> {
    if silent {
        debug!("binding null audio engine");
        return Ok(Box::new(NullAudioEngine::new()));
    }

    match RodioAudioEngine::new() {
        Ok(engine) => Ok(Box::new(engine)),
        Err(err) => {
            warn!("audio output unavailable: {err:#}");
            Err(PlayerError::BackendUnavailable(format!("{err:#}")))
        }
    }
}

fn volume_gain(volume: u8) -> f32 {
    f32::from(volume.min(100)) / 100.0
}

pub struct RodioAudioEngine {
    stream: OutputStream,
    sink: Sink,
    current: Option<PathBuf>,
    track_duration: Option<Duration>,
    volume: u8,
    stopped: bool,
    stream_failed: Arc<AtomicBool>,
}

impl RodioAudioEngine {
    pub fn new() -> Result<Self> {
        let stream_failed = Arc::new(AtomicBool::new(false));
        let stream = Self::open_output_stream(Arc::clone(&stream_failed))?;
        let sink = Sink::connect_new(stream.mixer());

        Ok(Self {
            stream,
            sink,
            current: None,
            track_duration: None,
            volume: 80,
            stopped: true,
            stream_failed,
        })
    }

    fn open_output_stream(failed: Arc<AtomicBool>) -> Result<OutputStream> {
        let mut stream = with_silenced_stderr(|| {
            let default_failed = Arc::clone(&failed);
            let default = OutputStreamBuilder::from_default_device()
                .context("failed to open default system output stream")
                .and_then(|builder| {
                    builder
                        .with_error_callback(move |_| default_failed.store(true, Ordering::SeqCst))
                        .open_stream_or_fallback()
                        .context("failed to start default output stream")
                });

            let default_err = match default {
                Ok(stream) => return Ok(stream),
                Err(err) => err,
            };

            let host = rodio::cpal::default_host();
            let mut candidates: Vec<String> = host
                .output_devices()
                .ok()
                .into_iter()
                .flatten()
                .filter_map(|device| device.name().ok())
                .collect();
            candidates.sort_by_cached_key(|name| {
                let lower = name.to_ascii_lowercase();
                let rank = if lower.contains("pulse") {
                    0_u8
                } else if lower.contains("pipewire") {
                    1_u8
                } else if lower.contains("default") {
                    2_u8
                } else {
                    3_u8
                };
                (rank, lower)
            });
            candidates.dedup();

            for candidate in candidates {
                let Some(device) = host
                    .output_devices()
                    .ok()
                    .into_iter()
                    .flatten()
                    .find(|entry| entry.name().ok().as_deref() == Some(candidate.as_str()))
                else {
                    continue;
                };
                let fallback_failed = Arc::clone(&failed);
                let opened = OutputStreamBuilder::from_device(device)
                    .context("failed to open fallback output device")
                    .and_then(|builder| {
                        builder
                            .with_error_callback(move |_| {
                                fallback_failed.store(true, Ordering::SeqCst)
                            })
                            .open_stream_or_fallback()
                            .context("failed to start fallback output stream")
                    });
                if let Ok(stream) = opened {
                    debug!(device = %candidate, "opened fallback output device");
                    return Ok(stream);
                }
            }

            Err(default_err.context("unable to start any audio output stream"))
        })?;
        stream.log_on_drop(false);
        Ok(stream)
    }

    fn decode_into_fresh_sink(&mut self, path: &Path) -> Result<()> {
        self.sink.stop();
        self.sink = Sink::connect_new(self.stream.mixer());
        self.sink.pause();

        let file =
            File::open(path).with_context(|| format!("failed to open track {}", path.display()))?;
        let source = Decoder::try_from(file)
            .with_context(|| format!("failed to decode {}", path.display()))?;
        self.track_duration = source.total_duration().filter(|d| !d.is_zero());
        self.sink.append(source);
        self.sink.set_volume(volume_gain(self.volume));
        Ok(())
    }
}

impl AudioEngine for RodioAudioEngine {
    fn load(&mut self, path: &Path) -> Result<()> {
        self.current = None;
        self.track_duration = None;
        self.decode_into_fresh_sink(path)?;
        self.current = Some(path.to_path_buf());
        self.stopped = false;
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        let Some(path) = self.current.clone() else {
            anyhow::bail!("no track loaded");
        };

        if self.stopped || self.sink.empty() {
            self.decode_into_fresh_sink(&path)?;
        }
        self.stopped = false;
        self.sink.play();
        Ok(())
    }

    fn pause(&mut self) {
        self.sink.pause();
    }

    fn stop(&mut self) {
        self.sink.stop();
        self.stopped = true;
    }

    fn set_volume(&mut self, volume: u8) {
        self.volume = volume.min(100);
        self.sink.set_volume(volume_gain(self.volume));
    }

    fn volume(&self) -> u8 {
        self.volume
    }

    fn loaded_track(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    fn position(&self) -> Option<Duration> {
        self.current.as_ref()?;
        if self.stopped {
            return Some(Duration::ZERO);
        }
        Some(self.sink.get_pos())
    }

    fn duration(&self) -> Option<Duration> {
        self.track_duration
    }

    fn has_ended(&self) -> bool {
        self.current.is_some() && !self.stopped && !self.sink.is_paused() && self.sink.empty()
    }

    fn is_healthy(&self) -> bool {
        !self.stream_failed.load(Ordering::SeqCst)
    }

    fn recover(&mut self) -> Result<()> {
        self.sink.stop();
        self.current = None;
        self.track_duration = None;
        self.stopped = true;

        let failed = Arc::new(AtomicBool::new(false));
        self.stream = Self::open_output_stream(Arc::clone(&failed))?;
        self.sink = Sink::connect_new(self.stream.mixer());
        self.sink.set_volume(volume_gain(self.volume));
        self.stream_failed = failed;
        debug!("audio output reopened");
        Ok(())
    }
}

#[cfg(unix)]
fn with_silenced_stderr<T>(operation: impl FnOnce() -> T) -> T {
    let saved = unsafe { libc::dup(libc::STDERR_FILENO) };
    if saved < 0 {
        return operation();
    }

    let devnull = CString::new("/dev/null")
        .ok()
        .map(|path| unsafe { libc::open(path.as_ptr(), libc::O_WRONLY) })
        .unwrap_or(-1);

    if devnull >= 0 {
        unsafe {
            libc::dup2(devnull, libc::STDERR_FILENO);
            libc::close(devnull);
        }
    }

    let result = operation();

    unsafe {
        libc::dup2(saved, libc::STDERR_FILENO);
        libc::close(saved);
    }

    result
}

#[cfg(not(unix))]
fn with_silenced_stderr<T>(operation: impl FnOnce() -> T) -> T {
    operation()
}

pub struct NullAudioEngine {
    current: Option<PathBuf>,
    playing: bool,
    volume: u8,
    started_at: Option<Instant>,
    position_offset: Duration,
    track_duration: Option<Duration>,
}

impl NullAudioEngine {
    pub fn new() -> Self {
        Self {
            current: None,
            playing: false,
            volume: 80,
            started_at: None,
            position_offset: Duration::ZERO,
            track_duration: None,
        }
    }

    fn estimate_duration(path: &Path) -> Option<Duration> {
        let file = File::open(path).ok()?;
        let source = Decoder::try_from(file).ok()?;
        source
            .total_duration()
            .filter(|duration| !duration.is_zero())
    }

    fn current_position(&self) -> Duration {
        let mut position = self.position_offset;
        if self.playing
            && let Some(started_at) = self.started_at
        {
            position = position.saturating_add(started_at.elapsed());
        }
        if let Some(duration) = self.track_duration {
            return position.min(duration);
        }
        position
    }
}

impl Default for NullAudioEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioEngine for NullAudioEngine {
    fn load(&mut self, path: &Path) -> Result<()> {
        self.current = Some(path.to_path_buf());
        self.playing = false;
        self.started_at = None;
        self.position_offset = Duration::ZERO;
        self.track_duration = Self::estimate_duration(path);
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        if self.current.is_none() {
            anyhow::bail!("no track loaded");
        }
        if !self.playing {
            self.started_at = Some(Instant::now());
            self.playing = true;
        }
        Ok(())
    }

    fn pause(&mut self) {
        self.position_offset = self.current_position();
        self.started_at = None;
        self.playing = false;
    }

    fn stop(&mut self) {
        self.playing = false;
        self.started_at = None;
        self.position_offset = Duration::ZERO;
    }

    fn set_volume(&mut self, volume: u8) {
        self.volume = volume.min(100);
    }

    fn volume(&self) -> u8 {
        self.volume
    }

    fn loaded_track(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    fn position(&self) -> Option<Duration> {
        self.current.as_ref()?;
        Some(self.current_position())
    }

    fn duration(&self) -> Option<Duration> {
        self.track_duration
    }

    fn has_ended(&self) -> bool {
        let Some(duration) = self.track_duration else {
            return false;
        };
        self.current.is_some() && self.playing && self.current_position() >= duration
    }

    fn is_healthy(&self) -> bool {
        true
    }

    fn recover(&mut self) -> Result<()> {
        self.current = None;
        self.stop();
        Ok(())
    }
}
