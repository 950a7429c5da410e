//! Reattach the source audio to the rendered video.

use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::ConversionError;
use crate::video::FfmpegConfig;

/// Arguments for copying video stream 0 of `video_only` and transcoding
/// audio stream 0 of `audio_source` into `final_output`.
pub(crate) fn remux_args(config: &FfmpegConfig, video_only: &Path, audio_source: &Path, final_output: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-i".into(),
        video_only.to_string_lossy().into_owned(),
        "-i".into(),
        audio_source.to_string_lossy().into_owned(),
        "-c:v".into(),
        "copy".into(),
        "-c:a".into(),
        config.audio_codec.clone(),
        "-map".into(),
        "0:v:0".into(),
        "-map".into(),
        "1:a:0".into(),
        final_output.to_string_lossy().into_owned(),
    ]
}

/// Mux `video_only` with the first audio stream of `audio_source`.
///
/// `video_only` is never touched here: on failure it is the fallback
/// artifact named in [`ConversionError::Remux`]. A source without audio
/// makes ffmpeg reject the `1:a:0` mapping and surfaces as the same error.
pub fn remux(config: &FfmpegConfig, video_only: &Path, audio_source: &Path, final_output: &Path) -> Result<(), ConversionError> {
    let fail = |reason: String| ConversionError::Remux {
        fallback: video_only.to_path_buf(),
        reason,
    };

    if !video_only.is_file() {
        return Err(fail(format!("video file {} is missing", video_only.display())));
    }

    log::info!("muxing audio from {} into {}", audio_source.display(), final_output.display());
    let output = Command::new(config.ffmpeg_cmd())
        .args(remux_args(config, video_only, audio_source, final_output))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| fail(format!("running {}: {}", config.ffmpeg_cmd().display(), e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(fail(format!("ffmpeg exited with {}: {}", output.status, stderr.trim())));
    }
    if !final_output.is_file() {
        return Err(fail(format!("ffmpeg produced no file at {}", final_output.display())));
    }
    Ok(())
}
