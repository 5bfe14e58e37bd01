//! EXIF metadata collaborator: tag dump, GPS position, orientation.
//!
//! Extraction is an explicit call, never bundled into payload loading.
//! Files without readable EXIF simply yield `None`.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use exif::{In, Tag, Value};

pub struct ImageMetadata {
    /// Formatted tag dump, one `tag: value` line per field.
    pub tags: String,
    /// Decimal degrees (latitude, longitude).
    pub gps: Option<(f64, f64)>,
    /// Raw EXIF orientation code.
    pub orientation: Option<u16>,
}

/// Initial rotation angle for an EXIF orientation code. Only the four
/// rotation-only codes map to an angle; mirrored and unknown codes get 0.
pub fn rotation_for_orientation(orientation: u16) -> i32 {
    match orientation {
        3 => 180,
        6 => 90,
        8 => -90,
        _ => 0,
    }
}

pub fn read_metadata(path: &Path) -> Option<ImageMetadata> {
    let file = File::open(path).ok()?;
    let mut reader = BufReader::new(&file);
    let exif = exif::Reader::new().read_from_container(&mut reader).ok()?;

    let mut tags = String::new();
    for field in exif.fields() {
        tags.push_str(&format!(
            "{}: {}\n",
            field.tag,
            field.display_value().with_unit(&exif)
        ));
    }

    let orientation = exif
        .get_field(Tag::Orientation, In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .map(|v| v as u16);

    Some(ImageMetadata {
        tags,
        gps: extract_gps(&exif),
        orientation,
    })
}

fn extract_gps(exif: &exif::Exif) -> Option<(f64, f64)> {
    let lat_field = exif.get_field(Tag::GPSLatitude, In::PRIMARY)?;
    let lon_field = exif.get_field(Tag::GPSLongitude, In::PRIMARY)?;

    let mut lat = parse_gps_coordinate(&lat_field.value)?;
    let mut lon = parse_gps_coordinate(&lon_field.value)?;

    if ref_is(exif, Tag::GPSLatitudeRef, "S") {
        lat = -lat;
    }
    if ref_is(exif, Tag::GPSLongitudeRef, "W") {
        lon = -lon;
    }
    Some((lat, lon))
}

fn ref_is(exif: &exif::Exif, tag: Tag, hemisphere: &str) -> bool {
    exif.get_field(tag, In::PRIMARY)
        .map(|f| {
            f.value
                .display_as(tag)
                .to_string()
                .trim()
                .eq_ignore_ascii_case(hemisphere)
        })
        .unwrap_or(false)
}

/// DMS rationals to decimal degrees. Always positive; the hemisphere ref
/// supplies the sign.
fn parse_gps_coordinate(value: &Value) -> Option<f64> {
    if let Value::Rational(rats) = value {
        if rats.len() >= 3 {
            if rats[0].denom == 0 || rats[1].denom == 0 || rats[2].denom == 0 {
                return None;
            }
            let degrees = rats[0].to_f64();
            let minutes = rats[1].to_f64();
            let seconds = rats[2].to_f64();
            return Some(degrees + minutes / 60.0 + seconds / 3600.0);
        }
    }
    None
}
