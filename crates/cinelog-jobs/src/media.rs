//! Media inspection and extraction via `ffprobe`/`ffmpeg` subprocesses.
//!
//! Every subprocess runs under a hard timeout so a wedged decode cannot
//! stall the worker loop indefinitely.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::debug;

use cinelog_core::defaults::MEDIA_CMD_TIMEOUT_SECS;
use cinelog_core::{Error, Result};

/// Technical facts about a media file, as reported by `ffprobe`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeData {
    /// Duration in seconds.
    pub duration_sec: Option<f64>,
    /// File size in bytes.
    pub file_size: Option<i64>,
    /// Frames per second of the first video stream.
    pub fps: Option<f64>,
    /// Resolution as "WIDTHxHEIGHT".
    pub resolution: Option<String>,
    /// Codec name of the first video stream.
    pub codec: Option<String>,
}

#[derive(Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

#[derive(Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<i64>,
    height: Option<i64>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
}

#[derive(Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
}

/// Probe a media file for duration, size, fps, resolution, and codec.
pub async fn probe_media(path: &Path) -> Result<ProbeData> {
    let mut cmd = Command::new("ffprobe");
    cmd.arg("-v")
        .arg("quiet")
        .arg("-print_format")
        .arg("json")
        .arg("-show_format")
        .arg("-show_streams")
        .arg(path);

    let output = run_command(cmd, "ffprobe").await?;
    if !output.status.success() {
        return Err(Error::Media(format!(
            "ffprobe exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    parse_probe_output(&String::from_utf8_lossy(&output.stdout))
}

fn parse_probe_output(raw: &str) -> Result<ProbeData> {
    let parsed: FfprobeOutput = serde_json::from_str(raw)
        .map_err(|e| Error::Media(format!("failed to parse ffprobe output: {e}")))?;

    let mut probe = ProbeData::default();

    if let Some(format) = parsed.format {
        probe.duration_sec = format.duration.as_deref().and_then(|d| d.parse().ok());
        probe.file_size = format.size.as_deref().and_then(|s| s.parse().ok());
    }

    if let Some(stream) = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
    {
        probe.codec = stream.codec_name.clone();
        if let (Some(w), Some(h)) = (stream.width, stream.height) {
            probe.resolution = Some(format!("{w}x{h}"));
        }
        probe.fps = stream
            .r_frame_rate
            .as_deref()
            .and_then(parse_frame_rate)
            .or_else(|| stream.avg_frame_rate.as_deref().and_then(parse_frame_rate));
    }

    Ok(probe)
}

/// Parse an ffprobe frame rate, either rational ("30000/1001") or plain.
fn parse_frame_rate(raw: &str) -> Option<f64> {
    match raw.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                None
            } else {
                Some(num / den)
            }
        }
        None => raw.trim().parse().ok(),
    }
}

/// Evenly spaced keyframe timestamps strictly inside `(0, duration)`.
///
/// For duration D and count K the step is D/(K+1), so the first frame is
/// never the (often black) opening frame and the last is never the tail.
pub fn keyframe_timestamps(duration_sec: f64, count: usize) -> Vec<f64> {
    if duration_sec <= 0.0 || count == 0 {
        return Vec::new();
    }
    let step = duration_sec / (count as f64 + 1.0);
    (1..=count).map(|i| step * i as f64).collect()
}

/// Extract the audio track as 16 kHz mono PCM WAV.
pub async fn extract_audio_wav(input: &Path, output: &Path) -> Result<()> {
    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-i")
        .arg(input)
        .arg("-vn")
        .arg("-acodec")
        .arg("pcm_s16le")
        .arg("-ar")
        .arg("16000")
        .arg("-ac")
        .arg("1")
        .arg("-y")
        .arg(output);

    let result = run_command(cmd, "ffmpeg").await?;
    if !result.status.success() {
        return Err(Error::Media(format!(
            "audio extraction failed: {}",
            String::from_utf8_lossy(&result.stderr).trim()
        )));
    }
    Ok(())
}

/// Extract a single frame at `timestamp_sec` as a JPEG.
pub async fn extract_keyframe(input: &Path, timestamp_sec: f64, output: &Path) -> Result<()> {
    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-ss")
        .arg(format!("{timestamp_sec:.3}"))
        .arg("-i")
        .arg(input)
        .arg("-frames:v")
        .arg("1")
        .arg("-q:v")
        .arg("2")
        .arg("-y")
        .arg(output);

    let result = run_command(cmd, "ffmpeg").await?;
    if !result.status.success() {
        return Err(Error::Media(format!(
            "keyframe extraction at {timestamp_sec:.3}s failed: {}",
            String::from_utf8_lossy(&result.stderr).trim()
        )));
    }
    Ok(())
}

/// Compute the SHA-256 of a file, streaming in chunks.
pub async fn sha256_file(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

async fn run_command(mut cmd: Command, program: &str) -> Result<std::process::Output> {
    cmd.stdin(Stdio::null()).kill_on_drop(true);

    debug!(
        subsystem = "jobs",
        component = "media",
        op = program,
        "Running media command"
    );

    match tokio::time::timeout(Duration::from_secs(MEDIA_CMD_TIMEOUT_SECS), cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(Error::Media(format!("{program} failed to run: {e}"))),
        Err(_) => Err(Error::Media(format!(
            "{program} timed out after {MEDIA_CMD_TIMEOUT_SECS}s"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate_rational() {
        let fps = parse_frame_rate("30000/1001").unwrap();
        assert!((fps - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("25/1"), Some(25.0));
    }

    #[test]
    fn test_parse_frame_rate_plain_and_invalid() {
        assert_eq!(parse_frame_rate("24"), Some(24.0));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("garbage"), None);
    }

    #[test]
    fn test_parse_probe_output_full() {
        let json = r#"{
            "streams": [
                {"codec_type": "audio", "codec_name": "aac"},
                {"codec_type": "video", "codec_name": "h264",
                 "width": 1920, "height": 1080, "r_frame_rate": "30000/1001"}
            ],
            "format": {"duration": "120.500000", "size": "104857600"}
        }"#;

        let probe = parse_probe_output(json).unwrap();
        assert_eq!(probe.duration_sec, Some(120.5));
        assert_eq!(probe.file_size, Some(104_857_600));
        assert_eq!(probe.resolution.as_deref(), Some("1920x1080"));
        assert_eq!(probe.codec.as_deref(), Some("h264"));
        assert!((probe.fps.unwrap() - 29.97).abs() < 0.01);
    }

    #[test]
    fn test_parse_probe_output_audio_only() {
        let json = r#"{
            "streams": [{"codec_type": "audio", "codec_name": "mp3"}],
            "format": {"duration": "30.0"}
        }"#;

        let probe = parse_probe_output(json).unwrap();
        assert_eq!(probe.duration_sec, Some(30.0));
        assert!(probe.codec.is_none());
        assert!(probe.resolution.is_none());
        assert!(probe.fps.is_none());
    }

    #[test]
    fn test_parse_probe_output_empty_object() {
        let probe = parse_probe_output("{}").unwrap();
        assert_eq!(probe, ProbeData::default());
    }

    #[test]
    fn test_parse_probe_output_malformed() {
        assert!(parse_probe_output("not json").is_err());
    }

    #[test]
    fn test_keyframe_timestamps_interior_and_increasing() {
        let ts = keyframe_timestamps(110.0, 10);
        assert_eq!(ts.len(), 10);
        assert!(ts[0] > 0.0);
        assert!(*ts.last().unwrap() < 110.0);
        for pair in ts.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        assert!((ts[0] - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_keyframe_timestamps_degenerate() {
        assert!(keyframe_timestamps(0.0, 10).is_empty());
        assert!(keyframe_timestamps(-5.0, 10).is_empty());
        assert!(keyframe_timestamps(60.0, 0).is_empty());
    }

    #[tokio::test]
    async fn test_sha256_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        tokio::fs::write(&path, b"hello world").await.unwrap();

        let hash = sha256_file(&path).await.unwrap();
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[tokio::test]
    async fn test_sha256_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(sha256_file(&dir.path().join("nope")).await.is_err());
    }
}
