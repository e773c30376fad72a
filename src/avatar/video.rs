//! Looping local video
//!
//! A worker thread pulls frames from a `FrameSource` and pushes them to a
//! `FrameSink`, rewinding at end of stream. The cancel flag is checked
//! before every frame.

use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::{Error, Result};

/// How long `stop` waits for the worker before releasing the display
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(1);

const FALLBACK_FPS: f64 = 25.0;

/// Decoded frames of one video file
pub trait FrameSource: Send {
    /// Next frame, or `None` at end of stream
    ///
    /// # Errors
    ///
    /// Returns error if decoding fails
    fn next_frame(&mut self) -> Result<Option<Vec<u8>>>;

    /// Seek back to the first frame
    ///
    /// # Errors
    ///
    /// Returns error if the decoder cannot restart
    fn rewind(&mut self) -> Result<()>;

    /// Time between frames
    fn frame_interval(&self) -> Duration;
}

/// Window that displays frames
pub trait FrameSink: Send + Sync {
    /// Display one frame
    ///
    /// # Errors
    ///
    /// Returns error if the window is gone
    fn show(&self, frame: &[u8]) -> Result<()>;

    /// Close the window; calling again is a no-op
    ///
    /// Must not wait on a `show` in progress. A `show` blocked on the
    /// window fails once the window is released.
    fn release(&self);
}

/// Opens a video file for looping playback
pub trait VideoBackend: Send + Sync {
    /// Open `path`, returning its frame source and a display for it
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be decoded or displayed
    fn open(&self, path: &Path) -> Result<(Box<dyn FrameSource>, Arc<dyn FrameSink>)>;
}

/// One playback run; flags are per run so an abandoned worker cannot be
/// revived by the next `start`
struct Worker {
    handle: JoinHandle<()>,
    done_rx: mpsc::Receiver<()>,
    sink: Arc<dyn FrameSink>,
    cancel: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
}

/// Plays one local video on a loop until stopped
pub struct LoopingVideo {
    backend: Arc<dyn VideoBackend>,
    path: Mutex<Option<PathBuf>>,
    worker: Mutex<Option<Worker>>,
}

impl LoopingVideo {
    /// Create a player with no video selected
    #[must_use]
    pub fn new(backend: Arc<dyn VideoBackend>) -> Self {
        Self {
            backend,
            path: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }

    /// Select the video file; returns false if it does not exist
    pub fn set_path(&self, path: &Path) -> bool {
        if !path.is_file() {
            tracing::warn!(path = %path.display(), "video file not found");
            return false;
        }
        *self.path.lock().unwrap_or_else(PoisonError::into_inner) = Some(path.to_path_buf());
        tracing::info!(path = %path.display(), "video selected");
        true
    }

    /// Selected video file
    #[must_use]
    pub fn path(&self) -> Option<PathBuf> {
        self.path
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether the loop is running
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|w| w.running.load(Ordering::Acquire))
    }

    /// Start looping the selected video, restarting it if already playing
    ///
    /// # Errors
    ///
    /// Returns error if no video is selected or it cannot be opened
    pub fn start(&self) -> Result<()> {
        let path = self
            .path()
            .ok_or_else(|| Error::Video("no video selected".to_string()))?;

        self.stop();

        let (source, sink) = self.backend.open(&path)?;
        let (done_tx, done_rx) = mpsc::channel();
        let cancel = Arc::new(AtomicBool::new(false));
        let running = Arc::new(AtomicBool::new(true));

        let worker_cancel = Arc::clone(&cancel);
        let worker_running = Arc::clone(&running);
        let worker_sink = Arc::clone(&sink);
        let handle = std::thread::Builder::new()
            .name("idms-video".to_string())
            .spawn(move || {
                run_loop(source, worker_sink.as_ref(), &worker_cancel);
                worker_sink.release();
                worker_running.store(false, Ordering::Release);
                let _ = done_tx.send(());
            })
            .map_err(|e| {
                sink.release();
                Error::Video(format!("failed to start video thread: {e}"))
            })?;

        *self.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(Worker {
            handle,
            done_rx,
            sink,
            cancel,
            running,
        });

        tracing::debug!(path = %path.display(), "video loop started");
        Ok(())
    }

    /// Stop the loop; returns false if nothing was playing
    ///
    /// Waits up to `JOIN_TIMEOUT` for the worker, then releases the display
    /// regardless.
    pub fn stop(&self) -> bool {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(worker) = worker else {
            return false;
        };

        worker.cancel.store(true, Ordering::Release);

        match worker.done_rx.recv_timeout(JOIN_TIMEOUT) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.handle.join().is_err() {
                    tracing::warn!("video thread panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!("video thread did not stop in time, releasing display");
            }
        }

        worker.sink.release();
        worker.running.store(false, Ordering::Release);
        tracing::debug!("video loop stopped");
        true
    }
}

impl Drop for LoopingVideo {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop(mut source: Box<dyn FrameSource>, sink: &dyn FrameSink, cancel: &AtomicBool) {
    let mut frames_since_rewind = 0usize;

    while !cancel.load(Ordering::Acquire) {
        let started = Instant::now();

        match source.next_frame() {
            Ok(Some(frame)) => {
                frames_since_rewind += 1;
                if let Err(e) = sink.show(&frame) {
                    tracing::warn!(error = %e, "video display failed");
                    return;
                }
            }
            Ok(None) => {
                if frames_since_rewind == 0 {
                    tracing::warn!("video has no frames");
                    return;
                }
                if let Err(e) = source.rewind() {
                    tracing::warn!(error = %e, "video rewind failed");
                    return;
                }
                frames_since_rewind = 0;
                continue;
            }
            Err(e) => {
                tracing::warn!(error = %e, "video decode failed");
                return;
            }
        }

        if let Some(remaining) = source.frame_interval().checked_sub(started.elapsed()) {
            std::thread::sleep(remaining);
        }
    }
}

/// Decodes with `ffmpeg` and displays with `ffplay`
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    ffplay: PathBuf,
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Deserialize)]
struct ProbeStream {
    width: u32,
    height: u32,
    #[serde(default)]
    r_frame_rate: String,
}

impl FfmpegBackend {
    /// Find `ffmpeg`, `ffprobe` and `ffplay` on `PATH`
    #[must_use]
    pub fn detect() -> Option<Self> {
        Some(Self {
            ffmpeg: which::which("ffmpeg").ok()?,
            ffprobe: which::which("ffprobe").ok()?,
            ffplay: which::which("ffplay").ok()?,
        })
    }

    fn probe(&self, path: &Path) -> Result<(u32, u32, f64)> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height,r_frame_rate",
                "-of",
                "json",
            ])
            .arg(path)
            .stderr(Stdio::null())
            .output()?;

        if !output.status.success() {
            return Err(Error::Video(format!("ffprobe failed for {}", path.display())));
        }

        let probe: ProbeOutput = serde_json::from_slice(&output.stdout)?;
        let stream = probe
            .streams
            .into_iter()
            .next()
            .ok_or_else(|| Error::Video(format!("no video stream in {}", path.display())))?;

        Ok((stream.width, stream.height, parse_frame_rate(&stream.r_frame_rate)))
    }
}

impl VideoBackend for FfmpegBackend {
    fn open(&self, path: &Path) -> Result<(Box<dyn FrameSource>, Arc<dyn FrameSink>)> {
        let (width, height, fps) = self.probe(path)?;
        tracing::debug!(width, height, fps, "video probed");

        let frame_len = usize::try_from(u64::from(width) * u64::from(height) * 3)
            .map_err(|_| Error::Video(format!("frame size {width}x{height} too large")))?;
        if frame_len == 0 {
            return Err(Error::Video(format!("invalid frame size {width}x{height}")));
        }

        let source = FfmpegSource::spawn(
            self.ffmpeg.clone(),
            path.to_path_buf(),
            frame_len,
            Duration::from_secs_f64(1.0 / fps),
        )?;
        let sink = FfplaySink::spawn(&self.ffplay, width, height, fps)?;

        Ok((Box::new(source), Arc::new(sink)))
    }
}

/// Parse an ffprobe rational like `30000/1001`
fn parse_frame_rate(rate: &str) -> f64 {
    let parsed = match rate.split_once('/') {
        Some((num, den)) => match (num.parse::<f64>(), den.parse::<f64>()) {
            (Ok(n), Ok(d)) if d > 0.0 => n / d,
            _ => 0.0,
        },
        None => rate.parse().unwrap_or(0.0),
    };

    if parsed.is_finite() && parsed > 0.0 {
        parsed
    } else {
        FALLBACK_FPS
    }
}

struct FfmpegSource {
    ffmpeg: PathBuf,
    path: PathBuf,
    frame_len: usize,
    interval: Duration,
    child: Child,
    stdout: ChildStdout,
}

impl FfmpegSource {
    fn spawn(ffmpeg: PathBuf, path: PathBuf, frame_len: usize, interval: Duration) -> Result<Self> {
        let (child, stdout) = spawn_decoder(&ffmpeg, &path)?;
        Ok(Self {
            ffmpeg,
            path,
            frame_len,
            interval,
            child,
            stdout,
        })
    }
}

fn spawn_decoder(ffmpeg: &Path, path: &Path) -> Result<(Child, ChildStdout)> {
    let mut child = Command::new(ffmpeg)
        .args(["-v", "error", "-i"])
        .arg(path)
        .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| Error::Video(format!("failed to start ffmpeg: {e}")))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::Video("ffmpeg stdout unavailable".to_string()))?;
    Ok((child, stdout))
}

fn kill_child(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

impl FrameSource for FfmpegSource {
    fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        let mut frame = vec![0u8; self.frame_len];
        match self.stdout.read_exact(&mut frame) {
            Ok(()) => Ok(Some(frame)),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn rewind(&mut self) -> Result<()> {
        kill_child(&mut self.child);
        let (child, stdout) = spawn_decoder(&self.ffmpeg, &self.path)?;
        self.child = child;
        self.stdout = stdout;
        Ok(())
    }

    fn frame_interval(&self) -> Duration {
        self.interval
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        kill_child(&mut self.child);
    }
}

struct FfplaySink {
    child: Mutex<Option<Child>>,
    stdin: Mutex<Option<ChildStdin>>,
    released: AtomicBool,
}

impl FfplaySink {
    fn spawn(ffplay: &Path, width: u32, height: u32, fps: f64) -> Result<Self> {
        let mut child = Command::new(ffplay)
            .args(["-v", "error", "-f", "rawvideo", "-pixel_format", "rgb24"])
            .arg("-video_size")
            .arg(format!("{width}x{height}"))
            .arg("-framerate")
            .arg(format!("{fps:.3}"))
            .args(["-window_title", "IDMS Assistant", "-i", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::Video(format!("failed to start ffplay: {e}")))?;

        Ok(Self::from_child(child))
    }

    fn from_child(mut child: Child) -> Self {
        let stdin = child.stdin.take();
        Self {
            child: Mutex::new(Some(child)),
            stdin: Mutex::new(stdin),
            released: AtomicBool::new(false),
        }
    }
}

impl FrameSink for FfplaySink {
    fn show(&self, frame: &[u8]) -> Result<()> {
        // The pipe is taken out for the write so `release` never waits on it
        let mut pipe = self
            .stdin
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| Error::Video("video window closed".to_string()))?;

        let written = pipe.write_all(frame);
        if !self.released.load(Ordering::Acquire) {
            *self.stdin.lock().unwrap_or_else(PoisonError::into_inner) = Some(pipe);
        }
        written?;
        Ok(())
    }

    fn release(&self) {
        self.released.store(true, Ordering::Release);
        // Killing ffplay first turns a blocked write into a broken pipe
        if let Some(mut child) = self
            .child
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            kill_child(&mut child);
        }
        drop(self.stdin.lock().unwrap_or_else(PoisonError::into_inner).take());
    }
}
