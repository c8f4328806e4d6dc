//! Parsed video container structure and the field mapping derived from it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ExtractorError;
use crate::formatter;
use crate::value::{RawMetadata, RawValue};

/// One stream (or the container itself) as reported by a media probe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaTrack {
    /// Short format name, e.g. `mov,mp4,m4a` or `h264`.
    pub format: Option<String>,
    pub format_info: Option<String>,
    pub profile: Option<String>,
    pub codec_id: Option<String>,
    pub duration_secs: Option<f64>,
    pub file_size: Option<u64>,
    pub bit_rate: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<f64>,
    pub bit_depth: Option<u32>,
    pub frame_count: Option<u64>,
    pub channels: Option<u32>,
    pub sample_rate: Option<f64>,
    pub internet_media_type: Option<String>,
    pub compression_mode: Option<String>,
    /// Free-form container or stream tags with lowercased keys.
    pub tags: BTreeMap<String, String>,
}

impl MediaTrack {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

/// Result of the first video step: the container's tracks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub general: Option<MediaTrack>,
    pub video: Vec<MediaTrack>,
    pub audio: Vec<MediaTrack>,
    /// Total number of streams in the container.
    pub stream_count: usize,
}

const LOCATION_TAGS: &[&str] = &["com.apple.quicktime.location.iso6709", "location"];

fn first_tag<'a>(track: &'a MediaTrack, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| track.tag(key))
}

/// Second video step: maps tracks to display fields.
///
/// Fails with a derive error when the container has no general track.
pub fn derive_fields(info: &MediaInfo) -> Result<RawMetadata, ExtractorError> {
    let general = info
        .general
        .as_ref()
        .ok_or_else(|| ExtractorError::derive("container has no general track"))?;

    let mut metadata = RawMetadata::new();
    metadata.insert("Count", info.stream_count);
    metadata.insert("File Size", formatter::format_size(general.file_size));
    metadata.insert("Format", general.format.clone());
    metadata.insert("Duration", formatter::format_duration(general.duration_secs));

    let location = first_tag(general, LOCATION_TAGS);
    metadata.insert(
        "Location",
        location.map(|loc| formatter::format_gps_iso6709(Some(loc))),
    );
    metadata.insert("Creation Date", first_tag(general, &["creation_time"]).map(str::to_string));
    metadata.insert(
        "Modification Date",
        first_tag(general, &["modification_time", "date"]).map(str::to_string),
    );
    metadata.insert("Writing Library", first_tag(general, &["encoder"]).map(str::to_string));
    metadata.insert(
        "Encoded Date",
        first_tag(general, &["encoded_date", "creation_time"]).map(str::to_string),
    );
    metadata.insert("Tagged Date", first_tag(general, &["tagged_date"]).map(str::to_string));
    metadata.insert(
        "Device Make",
        first_tag(general, &["com.apple.quicktime.make", "make"]).map(str::to_string),
    );
    metadata.insert(
        "Device Model",
        first_tag(general, &["com.apple.quicktime.model", "model"]).map(str::to_string),
    );
    metadata.insert(
        "Device Version",
        first_tag(general, &["com.apple.quicktime.software", "software"]).map(str::to_string),
    );

    if let Some(video) = info.video.first() {
        metadata.insert("Video Format", video.format.clone());
        metadata.insert("Video Format Info", video.format_info.clone());
        metadata.insert("Format Profile", video.profile.clone());
        metadata.insert("Internet Media Type", video.internet_media_type.clone());
        metadata.insert("Video Codec", video.codec_id.clone());
        let resolution = match (video.width, video.height) {
            (Some(w), Some(h)) => RawValue::Text(format!("{}x{}", w, h)),
            _ => RawValue::Null,
        };
        metadata.insert("Resolution", resolution);
        metadata.insert("Framerate", formatter::format_framerate(video.frame_rate));
        metadata.insert("Bit Depth", video.bit_depth);
        metadata.insert("Frame Count", video.frame_count);
        metadata.insert("Stream Count", info.video.len());
    }

    if let Some(audio) = info.audio.first() {
        metadata.insert("Audio Format", audio.format.clone());
        metadata.insert("Audio Format Info", audio.format_info.clone());
        metadata.insert("Audio Codec", audio.codec_id.clone());
        metadata.insert("Audio Bitrate", formatter::format_bitrate(audio.bit_rate));
        metadata.insert("Audio Channels", audio.channels);
        metadata.insert("Audio Sample Rate", formatter::format_samplerate(audio.sample_rate));
        metadata.insert("Compression Mode", audio.compression_mode.clone());
    }

    Ok(metadata)
}
