//! Frame sources and sinks.
//!
//! The ffmpeg-backed implementations drive `ffprobe`/`ffmpeg` as child
//! processes and exchange raw RGB24 frames over pipes:
//!   - `probe_video`  : stream width/height/frame rate/frame count via ffprobe
//!   - `FfmpegSource` : decoder child writing frames to its stdout
//!   - `FfmpegSink`   : encoder child reading frames from its stdin
//!
//! Both kill or finalize their child on drop, so a run that bails out early
//! never leaves a process behind. Child stderr is drained on a helper thread
//! and only its tail is kept for error messages.

use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};

use crate::error::ConversionError;

/// A decoded source frame, RGB8, source resolution.
pub type SourceFrame = RgbImage;
/// A rendered frame, RGB8, output resolution.
pub type OutputFrame = RgbImage;

/// Frame rate assumed when the source does not report one.
pub const FALLBACK_FPS: f64 = 24.0;

/// Bytes of child stderr kept for error messages.
const STDERR_TAIL_BYTES: usize = 4096;

/// Stream properties of an opened source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoProperties {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Total frames, when the container records it.
    pub frame_count: Option<usize>,
}

/// Sequential frame producer.
pub trait FrameSource {
    fn properties(&self) -> VideoProperties;

    /// Next frame, `Ok(None)` at end of stream.
    fn read_frame(&mut self) -> Result<Option<SourceFrame>, ConversionError>;

    /// Release the underlying decoder. Safe to call more than once.
    fn close(&mut self);
}

/// Sequential frame consumer. Frames must arrive in source order.
pub trait FrameSink {
    fn write_frame(&mut self, frame: &OutputFrame) -> Result<(), ConversionError>;

    /// Flush and release the encoder. Safe to call more than once.
    fn finish(&mut self) -> Result<(), ConversionError>;
}

/// External tool locations and codec choices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FfmpegConfig {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub video_codec: String,
    pub audio_codec: String,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
        }
    }
}

impl FfmpegConfig {
    pub fn ffmpeg_cmd(&self) -> &Path {
        &self.ffmpeg
    }

    pub fn ffprobe_cmd(&self) -> &Path {
        &self.ffprobe
    }
}

/// Query the first video stream of `path`.
pub fn probe_video(config: &FfmpegConfig, path: &Path) -> Result<VideoProperties, ConversionError> {
    let open_err = |reason: String| ConversionError::SourceOpen {
        path: path.to_path_buf(),
        reason,
    };

    let output = Command::new(config.ffprobe_cmd())
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,r_frame_rate,avg_frame_rate,nb_frames",
            "-of",
            "default=noprint_wrappers=1",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| open_err(format!("running {}: {}", config.ffprobe_cmd().display(), e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(open_err(format!("ffprobe failed: {}", stderr.trim())));
    }

    let props = parse_probe_output(&String::from_utf8_lossy(&output.stdout));
    let props = props.ok_or_else(|| open_err("no video stream found".to_string()))?;
    log::info!(
        "probed {}: {}x{} @ {:.3}fps, {} frames",
        path.display(),
        props.width,
        props.height,
        props.fps,
        props.frame_count.map(|n| n.to_string()).unwrap_or_else(|| "unknown".to_string())
    );
    Ok(props)
}

/// Parse `key=value` lines printed by ffprobe. Returns `None` when no
/// width/height pair is present.
pub(crate) fn parse_probe_output(text: &str) -> Option<VideoProperties> {
    let mut width = None;
    let mut height = None;
    let mut r_rate = None;
    let mut avg_rate = None;
    let mut frame_count = None;

    for line in text.lines() {
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        match key {
            "width" => width = value.parse::<u32>().ok(),
            "height" => height = value.parse::<u32>().ok(),
            "r_frame_rate" => r_rate = parse_rate(value),
            "avg_frame_rate" => avg_rate = parse_rate(value),
            "nb_frames" => frame_count = value.parse::<usize>().ok().filter(|&n| n > 0),
            _ => {}
        }
    }

    let (width, height) = (width?, height?);
    let fps = avg_rate.or(r_rate).unwrap_or_else(|| {
        log::warn!("frame rate unavailable, assuming {} fps", FALLBACK_FPS);
        FALLBACK_FPS
    });
    Some(VideoProperties {
        width,
        height,
        fps,
        frame_count,
    })
}

/// `"30000/1001"` or `"25"` to frames per second; zero or unparsable rates
/// yield `None`.
fn parse_rate(value: &str) -> Option<f64> {
    let value = value.trim();
    let rate = match value.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => value.parse().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

/// Decoder child producing raw RGB24 frames.
pub struct FfmpegSource {
    path: PathBuf,
    props: VideoProperties,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    stderr_tail: Option<JoinHandle<String>>,
    frames_read: usize,
}

impl FfmpegSource {
    pub fn open(config: &FfmpegConfig, path: &Path) -> Result<Self, ConversionError> {
        let props = probe_video(config, path)?;
        let mut child = Command::new(config.ffmpeg_cmd())
            .args(decoder_args(path, &props))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ConversionError::SourceOpen {
                path: path.to_path_buf(),
                reason: format!("spawning {}: {}", config.ffmpeg_cmd().display(), e),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| ConversionError::SourceOpen {
            path: path.to_path_buf(),
            reason: "decoder stdout unavailable".to_string(),
        })?;
        let stderr_tail = child.stderr.take().map(drain_stderr);

        Ok(Self {
            path: path.to_path_buf(),
            props,
            child: Some(child),
            stdout: Some(stdout),
            stderr_tail,
            frames_read: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn decode_error(&self, reason: String) -> ConversionError {
        ConversionError::Decode {
            frame: self.frames_read,
            reason,
        }
    }

    /// Reap the decoder after its stdout hit EOF and report a failed exit.
    fn finish_stream(&mut self) -> Result<(), ConversionError> {
        self.stdout = None;
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child.wait();
        let stderr = join_tail(self.stderr_tail.take());
        let status = status.map_err(|e| self.decode_error(format!("waiting for decoder: {}", e)))?;
        if status.success() {
            Ok(())
        } else {
            Err(self.decode_error(format!("decoder exited with {}: {}", status, stderr)))
        }
    }
}

impl FrameSource for FfmpegSource {
    fn properties(&self) -> VideoProperties {
        self.props
    }

    fn read_frame(&mut self) -> Result<Option<SourceFrame>, ConversionError> {
        let frame_len = self.props.width as usize * self.props.height as usize * 3;
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };

        let mut buf = vec![0u8; frame_len];
        let filled = match read_full(stdout, &mut buf) {
            Ok(n) => n,
            Err(e) => return Err(self.decode_error(format!("reading decoder output: {}", e))),
        };

        if filled == 0 {
            self.finish_stream()?;
            return Ok(None);
        }
        if filled < frame_len {
            let _ = self.finish_stream();
            return Err(self.decode_error(format!("truncated frame ({} of {} bytes)", filled, frame_len)));
        }

        let frame = RgbImage::from_raw(self.props.width, self.props.height, buf)
            .ok_or_else(|| self.decode_error("frame buffer size mismatch".to_string()))?;
        self.frames_read += 1;
        Ok(Some(frame))
    }

    fn close(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        join_tail(self.stderr_tail.take());
    }
}

/// Decoder arguments: first video stream as raw RGB24 on stdout.
///
/// Rotation metadata is ignored and the frame is scaled to the probed size,
/// so every frame on the pipe has exactly the layout `read_frame` expects.
pub(crate) fn decoder_args(path: &Path, props: &VideoProperties) -> Vec<String> {
    vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-nostdin".into(),
        "-noautorotate".into(),
        "-i".into(),
        path.to_string_lossy().into_owned(),
        "-map".into(),
        "0:v:0".into(),
        "-vf".into(),
        format!("scale={}:{}:flags=bilinear", props.width, props.height),
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        "rgb24".into(),
        "-".into(),
    ]
}

/// Read a child's stderr to EOF on a helper thread so the child never
/// blocks on a full pipe.
fn drain_stderr(stderr: ChildStderr) -> JoinHandle<String> {
    thread::spawn(move || read_tail(stderr, STDERR_TAIL_BYTES))
}

/// Consume `reader` to EOF, returning at most its last `limit` bytes.
fn read_tail(mut reader: impl Read, limit: usize) -> String {
    let mut tail: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                tail.extend_from_slice(&chunk[..n]);
                if tail.len() > limit {
                    let excess = tail.len() - limit;
                    tail.drain(..excess);
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
    String::from_utf8_lossy(&tail).trim().to_string()
}

fn join_tail(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

/// Read until `buf` is full or the stream ends; returns the bytes read.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.close();
    }
}

/// Encoder child consuming raw RGB24 frames into a video-only file.
pub struct FfmpegSink {
    path: PathBuf,
    width: u32,
    height: u32,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_tail: Option<JoinHandle<String>>,
    frames_written: usize,
}

impl FfmpegSink {
    pub fn open(config: &FfmpegConfig, path: &Path, width: u32, height: u32, fps: f64) -> Result<Self, ConversionError> {
        let open_err = |reason: String| ConversionError::SinkOpen {
            path: path.to_path_buf(),
            reason,
        };
        if width == 0 || height == 0 {
            return Err(open_err(format!("invalid frame size {}x{}", width, height)));
        }
        let fps = if fps.is_finite() && fps > 0.0 { fps } else { FALLBACK_FPS };

        let mut child = Command::new(config.ffmpeg_cmd())
            .args(encoder_args(config, width, height, fps))
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| open_err(format!("spawning {}: {}", config.ffmpeg_cmd().display(), e)))?;

        let stdin = child.stdin.take().ok_or_else(|| open_err("encoder stdin unavailable".to_string()))?;
        let stderr_tail = child.stderr.take().map(drain_stderr);

        Ok(Self {
            path: path.to_path_buf(),
            width,
            height,
            child: Some(child),
            stdin: Some(stdin),
            stderr_tail,
            frames_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames_written(&self) -> usize {
        self.frames_written
    }

    fn write_error(&self, reason: String) -> ConversionError {
        ConversionError::SinkWrite {
            frame: self.frames_written,
            reason,
        }
    }
}

/// Arguments before the output path: raw RGB24 on stdin, padded to even
/// dimensions for yuv420p.
pub(crate) fn encoder_args(config: &FfmpegConfig, width: u32, height: u32, fps: f64) -> Vec<String> {
    vec![
        "-y".into(),
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        "rgb24".into(),
        "-s".into(),
        format!("{}x{}", width, height),
        "-r".into(),
        format!("{}", fps),
        "-i".into(),
        "-".into(),
        "-an".into(),
        "-vf".into(),
        "pad=ceil(iw/2)*2:ceil(ih/2)*2".into(),
        "-c:v".into(),
        config.video_codec.clone(),
        "-pix_fmt".into(),
        "yuv420p".into(),
    ]
}

impl FrameSink for FfmpegSink {
    fn write_frame(&mut self, frame: &OutputFrame) -> Result<(), ConversionError> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(self.write_error(format!(
                "frame is {}x{}, encoder expects {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }
        if self.stdin.is_none() {
            return Err(self.write_error("encoder already closed".to_string()));
        }
        let result = match self.stdin.as_mut() {
            Some(stdin) => stdin.write_all(frame.as_raw()),
            None => Ok(()),
        };
        result.map_err(|e| self.write_error(format!("piping frame to encoder: {}", e)))?;
        self.frames_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ConversionError> {
        drop(self.stdin.take());
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child.wait();
        let stderr = join_tail(self.stderr_tail.take());
        let status = status.map_err(|e| self.write_error(format!("waiting for encoder: {}", e)))?;
        if status.success() {
            log::debug!("encoder finished {} after {} frames", self.path.display(), self.frames_written);
            Ok(())
        } else {
            Err(self.write_error(format!("encoder exited with {}: {}", status, stderr)))
        }
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        // Closing stdin lets ffmpeg finalize whatever was already written.
        let _ = self.finish();
    }
}
