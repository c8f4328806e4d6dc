//! Video container probing through `ffprobe`.

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::io::{self, Read};
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::ExtractorError;
use crate::extractor::VideoProbe;
use crate::media::{MediaInfo, MediaTrack};

/// Runs `ffprobe -show_format -show_streams` and maps its JSON report.
#[derive(Debug, Clone)]
pub struct FfprobeVideo {
    program: String,
    time_limit: Option<Duration>,
}

impl FfprobeVideo {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            time_limit: None,
        }
    }

    /// Kills the probe process once it has run for `limit`.
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }
}

impl Default for FfprobeVideo {
    fn default() -> Self {
        Self::new(core_runtime::config::DEFAULT_FFPROBE_PATH)
    }
}

impl VideoProbe for FfprobeVideo {
    fn name(&self) -> &'static str {
        "ffprobe"
    }

    fn parse_container(&self, path: &Path) -> Result<MediaInfo, ExtractorError> {
        debug!(program = %self.program, "probing video container");

        let mut command = Command::new(&self.program);
        command
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path);

        let output = run_with_limit(&mut command, self.time_limit)
            .map_err(|e| {
                ExtractorError::parse(format!("failed to execute {}: {}", self.program, e))
            })?
            .ok_or_else(|| {
                warn!(program = %self.program, "probe exceeded its time limit");
                ExtractorError::parse(format!("{} did not finish in time", self.program))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.trim();
            return Err(ExtractorError::parse(if detail.is_empty() {
                format!("{} could not read the container ({})", self.program, output.status)
            } else {
                format!("{} failed: {}", self.program, detail)
            }));
        }

        parse_probe_output(&String::from_utf8_lossy(&output.stdout))
    }
}

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runs `command` to completion, or kills it once `limit` has passed and
/// returns `None`. Output pipes are drained on their own threads so a chatty
/// child never blocks on a full pipe.
fn run_with_limit(command: &mut Command, limit: Option<Duration>) -> io::Result<Option<Output>> {
    let Some(limit) = limit else {
        return command.output().map(Some);
    };

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let deadline = Instant::now() + limit;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            // Already exited is fine.
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    };

    Ok(Some(Output {
        status,
        stdout: stdout.join().unwrap_or_default(),
        stderr: stderr.join().unwrap_or_default(),
    }))
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buffer);
        }
        buffer
    })
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    format_long_name: Option<String>,
    duration: Option<String>,
    size: Option<String>,
    bit_rate: Option<String>,
    nb_streams: Option<usize>,
    tags: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    codec_long_name: Option<String>,
    codec_tag_string: Option<String>,
    profile: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    bits_per_raw_sample: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u32>,
    bit_rate: Option<String>,
    tags: Option<HashMap<String, String>>,
}

/// Maps ffprobe's JSON report onto [`MediaInfo`].
pub fn parse_probe_output(json: &str) -> Result<MediaInfo, ExtractorError> {
    let report: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| ExtractorError::parse(format!("failed to parse ffprobe output: {}", e)))?;

    let general = report.format.as_ref().map(|format| MediaTrack {
        format: format.format_name.clone(),
        format_info: format.format_long_name.clone(),
        duration_secs: parse_num(&format.duration),
        file_size: parse_num(&format.size),
        bit_rate: parse_num(&format.bit_rate),
        tags: lowercase_tags(&format.tags),
        ..Default::default()
    });

    let mut info = MediaInfo {
        stream_count: report
            .format
            .as_ref()
            .and_then(|f| f.nb_streams)
            .unwrap_or(report.streams.len()),
        general,
        ..Default::default()
    };

    for stream in &report.streams {
        match stream.codec_type.as_deref() {
            Some("video") => info.video.push(video_track(stream)),
            Some("audio") => info.audio.push(audio_track(stream)),
            _ => {}
        }
    }

    Ok(info)
}

fn video_track(stream: &FfprobeStream) -> MediaTrack {
    let frame_rate = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rate));

    MediaTrack {
        format: stream.codec_name.clone(),
        format_info: stream.codec_long_name.clone(),
        profile: stream.profile.clone(),
        codec_id: stream.codec_tag_string.clone(),
        duration_secs: parse_num(&stream.duration),
        bit_rate: parse_num(&stream.bit_rate),
        width: stream.width,
        height: stream.height,
        frame_rate,
        bit_depth: parse_num(&stream.bits_per_raw_sample),
        frame_count: parse_num(&stream.nb_frames),
        internet_media_type: stream
            .codec_name
            .as_deref()
            .map(|codec| format!("video/{}", codec.to_ascii_uppercase())),
        tags: lowercase_tags(&stream.tags),
        ..Default::default()
    }
}

fn audio_track(stream: &FfprobeStream) -> MediaTrack {
    MediaTrack {
        format: stream.codec_name.clone(),
        format_info: stream.codec_long_name.clone(),
        profile: stream.profile.clone(),
        codec_id: stream.codec_tag_string.clone(),
        duration_secs: parse_num(&stream.duration),
        bit_rate: parse_num(&stream.bit_rate),
        channels: stream.channels,
        sample_rate: parse_num(&stream.sample_rate),
        compression_mode: stream.codec_name.as_deref().map(compression_mode),
        tags: lowercase_tags(&stream.tags),
        ..Default::default()
    }
}

fn compression_mode(codec: &str) -> String {
    match codec {
        "flac" | "alac" | "pcm_s16le" | "pcm_s24le" | "pcm_s32le" | "pcm_f32le" | "wavpack"
        | "truehd" => "Lossless".to_string(),
        _ => "Lossy".to_string(),
    }
}

fn parse_num<T: std::str::FromStr>(value: &Option<String>) -> Option<T> {
    value.as_deref().and_then(|v| v.trim().parse().ok())
}

/// `"30000/1001"` or `"25"`. A zero denominator (`"0/0"`) means unknown.
fn parse_rate(rate: &str) -> Option<f64> {
    match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            (den != 0.0 && num != 0.0).then(|| num / den)
        }
        None => rate.parse().ok(),
    }
}

fn lowercase_tags(tags: &Option<HashMap<String, String>>) -> BTreeMap<String, String> {
    tags.iter()
        .flatten()
        .map(|(key, value)| (key.to_ascii_lowercase(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::derive_fields;
    use crate::value::RawValue;

    const SAMPLE: &str = r#"{
        "streams": [
            {
                "codec_type": "video",
                "codec_name": "h264",
                "codec_long_name": "H.264 / AVC / MPEG-4 AVC / MPEG-4 part 10",
                "codec_tag_string": "avc1",
                "profile": "High",
                "width": 1920,
                "height": 1080,
                "r_frame_rate": "30000/1001",
                "avg_frame_rate": "30000/1001",
                "bits_per_raw_sample": "8",
                "nb_frames": "1798"
            },
            {
                "codec_type": "audio",
                "codec_name": "aac",
                "codec_tag_string": "mp4a",
                "sample_rate": "44100",
                "channels": 2,
                "bit_rate": "131072"
            }
        ],
        "format": {
            "format_name": "mov,mp4,m4a,3gp,3g2,mj2",
            "format_long_name": "QuickTime / MOV",
            "duration": "60.060000",
            "size": "10485760",
            "bit_rate": "1396659",
            "nb_streams": 2,
            "tags": {
                "com.apple.quicktime.make": "Apple",
                "com.apple.quicktime.location.ISO6709": "+48.8584+002.2945+035.000/",
                "creation_time": "2023-07-14T18:30:00.000000Z"
            }
        }
    }"#;

    #[test]
    fn test_parse_probe_output() {
        let info = parse_probe_output(SAMPLE).unwrap();
        assert_eq!(info.stream_count, 2);
        assert_eq!(info.video.len(), 1);
        assert_eq!(info.audio.len(), 1);

        let general = info.general.as_ref().unwrap();
        assert_eq!(general.file_size, Some(10_485_760));
        assert_eq!(general.tag("com.apple.quicktime.make"), Some("Apple"));

        let video = &info.video[0];
        assert!((video.frame_rate.unwrap() - 29.97).abs() < 0.01);
        assert_eq!(video.bit_depth, Some(8));
        assert_eq!(video.frame_count, Some(1798));
    }

    #[test]
    fn test_probe_output_feeds_derivation() {
        let info = parse_probe_output(SAMPLE).unwrap();
        let metadata = derive_fields(&info).unwrap();

        assert_eq!(metadata.get("File Size"), Some(&RawValue::from("10.00 MB")));
        assert_eq!(metadata.get("Duration"), Some(&RawValue::from("1 min 0 sec")));
        assert_eq!(metadata.get("Framerate"), Some(&RawValue::from("29.97 fps")));
        assert_eq!(metadata.get("Audio Sample Rate"), Some(&RawValue::from("44.10 KHz")));
        assert_eq!(metadata.get("Compression Mode"), Some(&RawValue::from("Lossy")));
        assert_eq!(
            metadata.get("Location"),
            Some(&RawValue::from(
                "https://www.google.com/maps/search/?api=1&query=48.8584,002.2945"
            ))
        );
    }

    #[test]
    fn test_garbage_output_is_parse_error() {
        assert!(matches!(
            parse_probe_output("not json"),
            Err(ExtractorError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_program_is_parse_error() {
        let probe = FfprobeVideo::new("/nonexistent/ffprobe-binary");
        let err = probe.parse_container(Path::new("clip.mp4")).unwrap_err();
        assert!(err.to_string().contains("failed to execute"));
    }

    #[cfg(unix)]
    fn script(dir: &tempfile::TempDir, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("fake-ffprobe");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[test]
    fn test_hung_probe_is_killed_at_time_limit() {
        let dir = tempfile::tempdir().unwrap();
        let probe = FfprobeVideo::new(script(&dir, "exec sleep 5"))
            .with_time_limit(Duration::from_millis(200));

        let started = Instant::now();
        let err = probe.parse_container(Path::new("clip.mp4")).unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(err.to_string().contains("did not finish in time"));
    }

    #[cfg(unix)]
    #[test]
    fn test_time_limited_probe_still_reads_output() {
        let dir = tempfile::tempdir().unwrap();
        let probe = FfprobeVideo::new(script(
            &dir,
            r#"echo '{"format": {"format_name": "matroska,webm"}, "streams": []}'"#,
        ))
        .with_time_limit(Duration::from_secs(5));

        let info = probe.parse_container(Path::new("clip.mkv")).unwrap();
        assert_eq!(
            info.general.unwrap().format.as_deref(),
            Some("matroska,webm")
        );
    }

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate("25"), Some(25.0));
        assert_eq!(parse_rate("0/0"), None);
        assert_eq!(parse_rate("x/1"), None);
    }
}
