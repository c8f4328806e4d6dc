//! EXIF metadata for JPEG and PNG images.

use exif::{Exif, Field, In, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

use crate::error::ExtractorError;
use crate::extractor::MetadataExtractor;
use crate::formatter::{self, Rational};
use crate::value::{RawMetadata, RawValue};

pub const GPS_NOT_AVAILABLE: &str = "GPS Not Available";

#[derive(Debug, Default, Clone, Copy)]
pub struct ExifExtractor;

impl MetadataExtractor for ExifExtractor {
    fn name(&self) -> &'static str {
        "exif"
    }

    fn extract(&self, path: &Path) -> Result<RawMetadata, ExtractorError> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let exif = match exif::Reader::new().read_from_container(&mut reader) {
            Ok(exif) => Some(exif),
            Err(exif::Error::NotFound(_)) => {
                debug!("image carries no EXIF block");
                None
            }
            Err(err) => {
                return Err(ExtractorError::parse(format!(
                    "failed to read EXIF data: {}",
                    err
                )))
            }
        };

        Ok(build_metadata(size, exif.as_ref()))
    }
}

fn build_metadata(size: u64, exif: Option<&Exif>) -> RawMetadata {
    let get = |tag: Tag, ifd: In| exif.and_then(|exif| exif.get_field(tag, ifd));
    let primary = |tag: Tag| get(tag, In::PRIMARY);
    let thumbnail = |tag: Tag| get(tag, In::THUMBNAIL);

    let mut metadata = RawMetadata::new();
    metadata.insert("File Size", formatter::format_size(Some(size)));
    metadata.insert("Camera Make", display(primary(Tag::Make)));
    metadata.insert("Camera Model", display(primary(Tag::Model)));
    metadata.insert("Date and Time", display(primary(Tag::DateTimeOriginal)));

    let resolution = match (
        uint(primary(Tag::PixelXDimension)),
        uint(primary(Tag::PixelYDimension)),
    ) {
        (Some(width), Some(height)) => RawValue::Text(format!("{} x {}", width, height)),
        _ => RawValue::Null,
    };
    metadata.insert("Resolution", resolution);
    metadata.insert("Compression", display(thumbnail(Tag::Compression)));
    metadata.insert("LensMake", display(primary(Tag::LensMake)));
    metadata.insert("LensModel", display(primary(Tag::LensModel)));

    let latitude = gps_dmm(primary(Tag::GPSLatitude), primary(Tag::GPSLatitudeRef));
    let longitude = gps_dmm(primary(Tag::GPSLongitude), primary(Tag::GPSLongitudeRef));
    let coordinates = match (latitude, longitude) {
        (Some(lat), Some(lon)) => format!("{}, {}", lat, lon),
        _ => GPS_NOT_AVAILABLE.to_string(),
    };
    metadata.insert("GPS Coordinates", coordinates);

    metadata.insert("SceneType", display(primary(Tag::SceneType)));
    metadata.insert("SceneCaptureType", display(primary(Tag::SceneCaptureType)));
    metadata.insert("ISO", display(primary(Tag::PhotographicSensitivity)));
    metadata.insert(
        "Exposure Time",
        formatter::format_exposure_time(rational(primary(Tag::ExposureTime))),
    );
    metadata.insert("Exposure Program", display(primary(Tag::ExposureProgram)));
    metadata.insert("ExposureBiasValue", display(primary(Tag::ExposureBiasValue)));
    metadata.insert("ExposureMode", display(primary(Tag::ExposureMode)));
    metadata.insert(
        "Thumbnail ResolutionUnit",
        display(thumbnail(Tag::ResolutionUnit)),
    );
    metadata.insert(
        "Thumbnail JPEGInterchangeFormat",
        display(thumbnail(Tag::JPEGInterchangeFormat)),
    );
    metadata.insert(
        "Thumbnail JPEGInterchangeFormatLength",
        display(thumbnail(Tag::JPEGInterchangeFormatLength)),
    );
    metadata.insert("FNumber", display(primary(Tag::FNumber)));
    metadata.insert("ExifVersion", display(primary(Tag::ExifVersion)));
    metadata.insert("OffsetTime", display(primary(Tag::OffsetTime)));
    metadata.insert(
        "ComponentsConfiguration",
        display(primary(Tag::ComponentsConfiguration)),
    );
    metadata.insert(
        "ShutterSpeedValue",
        formatter::format_shutter_speed(rational(primary(Tag::ShutterSpeedValue))),
    );
    metadata.insert(
        "ApertureValue",
        formatter::format_aperture_value(rational(primary(Tag::ApertureValue))),
    );
    metadata.insert(
        "BrightnessValue",
        formatter::format_brightness_value(rational(primary(Tag::BrightnessValue))),
    );
    metadata.insert("MeteringMode", display(primary(Tag::MeteringMode)));
    metadata.insert("Flash", display(primary(Tag::Flash)));
    metadata.insert(
        "FocalLength",
        formatter::format_focal_length(rational(primary(Tag::FocalLength))),
    );
    metadata.insert("FlashPixVersion", display(primary(Tag::FlashpixVersion)));
    metadata.insert("ColorSpace", display(primary(Tag::ColorSpace)));
    metadata.insert("SensingMethod", display(primary(Tag::SensingMethod)));
    metadata.insert("WhiteBalance", display(primary(Tag::WhiteBalance)));
    metadata.insert(
        "FocalLengthIn35mmFilm",
        display(primary(Tag::FocalLengthIn35mmFilm)),
    );

    metadata
}

/// ASCII values without quotes or padding; everything else via the
/// library's own rendering.
fn display(field: Option<&Field>) -> Option<String> {
    let field = field?;
    match &field.value {
        Value::Ascii(parts) => {
            let text = parts
                .iter()
                .map(|part| String::from_utf8_lossy(part).trim_end_matches('\0').trim().to_string())
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join(", ");
            Some(text)
        }
        _ => Some(field.display_value().to_string()),
    }
}

fn uint(field: Option<&Field>) -> Option<u32> {
    field.and_then(|field| field.value.get_uint(0))
}

fn rational(field: Option<&Field>) -> Option<Rational> {
    match &field?.value {
        Value::Rational(values) => values
            .first()
            .map(|r| Rational::new(r.num.into(), r.denom.into())),
        Value::SRational(values) => values
            .first()
            .map(|r| Rational::new(r.num.into(), r.denom.into())),
        _ => None,
    }
}

/// `D°M.MMMM'R` from a degrees/minutes/seconds triple and its reference.
fn gps_dmm(triple: Option<&Field>, reference: Option<&Field>) -> Option<String> {
    let Value::Rational(parts) = &triple?.value else {
        return None;
    };
    if parts.len() < 3 {
        return None;
    }
    let direction = display(reference)?;
    if direction.is_empty() {
        return None;
    }
    Some(formatter::convert_gps(
        Some(parts[0].to_f64()),
        Some(parts[1].to_f64()),
        Some(parts[2].to_f64()),
        Some(&direction),
    ))
}
