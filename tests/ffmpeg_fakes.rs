//! ffmpeg-backed sources and the full conversion, driven through small
//! shell scripts standing in for `ffprobe` and `ffmpeg`.
#![cfg(unix)]

use asciivid::params::{resolve_output, silent_video_path};
use asciivid::*;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

// Scripts are written then executed; serializing the tests keeps another
// test's fork from holding a script open for writing (ETXTBSY).
static SERIAL: Mutex<()> = Mutex::new(());

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn probe_script(dir: &Path, width: u32, height: u32) -> PathBuf {
    write_script(
        dir,
        "ffprobe",
        &format!("printf 'width={}\\nheight={}\\navg_frame_rate=25/1\\nnb_frames=2\\n'", width, height),
    )
}

/// Fake ffmpeg: decodes two black 8x8 frames, encodes by copying stdin to the
/// output path, and runs `remux` for the audio step.
fn ffmpeg_script(dir: &Path, remux: &str) -> PathBuf {
    let body = format!(
        r#"for a in "$@"; do last="$a"; done
case " $* " in
  *" -c:v copy "*) {remux} ;;
  *" -an "*) cat > "$last" ;;
  *) head -c 384 /dev/zero ;;
esac"#
    );
    write_script(dir, "ffmpeg", &body)
}

fn converter(ffmpeg: PathBuf, ffprobe: PathBuf) -> AsciiVideoConverter {
    AsciiVideoConverter::with_config(AppConfig {
        ffmpeg: FfmpegConfig {
            ffmpeg,
            ffprobe,
            ..FfmpegConfig::default()
        },
        ..AppConfig::default()
    })
}

fn options() -> ConversionOptions {
    ConversionOptions::default().with_columns(4)
}

// ==================== Full conversion ====================

#[test]
fn test_failed_remux_keeps_silent_render() {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();
    let converter = converter(ffmpeg_script(dir.path(), "exit 1"), probe_script(dir.path(), 8, 8));
    let input = dir.path().join("clip.mp4");
    fs::write(&input, b"").unwrap();
    let output = resolve_output(&input, None);
    let silent = silent_video_path(&output);

    let err = converter.convert_video(&input, &output, &options(), |_| {}).unwrap_err();
    match &err {
        ConversionError::Remux { fallback, .. } => assert_eq!(fallback, &silent),
        other => panic!("expected remux error, got {:?}", other),
    }
    // 4x2 grid of 6x12 cells: two 24x24 RGB frames.
    assert_eq!(fs::metadata(&silent).unwrap().len(), 2 * 24 * 24 * 3);
    assert!(!output.exists());
}

#[test]
fn test_successful_remux_removes_silent_render() {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();
    let converter = converter(ffmpeg_script(dir.path(), r#": > "$last""#), probe_script(dir.path(), 8, 8));
    let input = dir.path().join("clip.mp4");
    fs::write(&input, b"").unwrap();
    let output = dir.path().join("render.mp4");

    let report = converter.convert_video(&input, &output, &options(), |_| {}).unwrap();
    assert_eq!(report.frames, 2);
    assert!(report.with_audio);
    assert_eq!((report.plan.grid_width, report.plan.grid_height), (4, 2));
    assert!(output.exists());
    assert!(!silent_video_path(&output).exists());
}

#[test]
fn test_without_audio_encodes_straight_to_output() {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();
    let converter = converter(ffmpeg_script(dir.path(), "exit 1"), probe_script(dir.path(), 8, 8));
    let input = dir.path().join("clip.mp4");
    fs::write(&input, b"").unwrap();
    let output = dir.path().join("render.mp4");

    let report = converter.convert_video(&input, &output, &options().with_audio(false), |_| {}).unwrap();
    assert!(!report.with_audio);
    assert_eq!(fs::metadata(&output).unwrap().len(), 2 * 24 * 24 * 3);
    assert!(!silent_video_path(&output).exists());
}

// ==================== Decoder ====================

#[test]
fn test_noisy_decoder_does_not_stall() {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();
    let config = FfmpegConfig {
        ffmpeg: write_script(
            dir.path(),
            "ffmpeg",
            r"yes 'error while decoding MB' | head -c 200000 >&2
printf '\001\002\003\004\005\006\007\010\011\012\013\014'",
        ),
        ffprobe: probe_script(dir.path(), 2, 2),
        ..FfmpegConfig::default()
    };
    let input = dir.path().join("noisy.mp4");

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let result = FfmpegSource::open(&config, &input).and_then(|mut source| {
            let first = source.read_frame()?;
            let second = source.read_frame()?;
            Ok((first, second))
        });
        let _ = tx.send(result);
    });

    let (first, second) = rx
        .recv_timeout(Duration::from_secs(30))
        .expect("decoder stalled")
        .unwrap();
    let frame = first.unwrap();
    assert_eq!(frame.dimensions(), (2, 2));
    assert_eq!(frame.get_pixel(0, 0).0, [1, 2, 3]);
    assert_eq!(frame.get_pixel(1, 1).0, [10, 11, 12]);
    assert!(second.is_none());
}

#[test]
fn test_decoder_failure_reports_stderr() {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();
    let config = FfmpegConfig {
        ffmpeg: write_script(dir.path(), "ffmpeg", "echo 'moov atom not found' >&2\nexit 1"),
        ffprobe: probe_script(dir.path(), 2, 2),
        ..FfmpegConfig::default()
    };

    let mut source = FfmpegSource::open(&config, &dir.path().join("broken.mp4")).unwrap();
    match source.read_frame() {
        Err(ConversionError::Decode { frame, reason }) => {
            assert_eq!(frame, 0);
            assert!(reason.contains("moov atom not found"), "{}", reason);
        }
        other => panic!("expected decode error, got {:?}", other),
    }
}
