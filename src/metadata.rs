use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use exif::{In, Reader, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::SystemTime;
use tracing::debug;

/// Outcome of a capture-time lookup. `NotAvailable` is normal (videos, files
/// stripped of EXIF); `Failed` means the file could not be read or parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    Found(NaiveDateTime),
    NotAvailable,
    Failed(String),
}

pub trait MetadataExtractor: Send + Sync {
    fn extract_capture_time(&self, path: &Path, mime_hint: &str) -> Extracted;
}

/// Reads `DateTimeOriginal` (or `DateTimeDigitized`) from EXIF, including the
/// sub-second field when present so burst frames keep their order.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExifExtractor;

impl MetadataExtractor for ExifExtractor {
    fn extract_capture_time(&self, path: &Path, mime_hint: &str) -> Extracted {
        if !mime_hint.starts_with("image/") {
            return Extracted::NotAvailable;
        }

        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) => return Extracted::Failed(err.to_string()),
        };
        let mut buffer = BufReader::new(file);
        let exif = match Reader::new().read_from_container(&mut buffer) {
            Ok(exif) => exif,
            Err(exif::Error::NotFound(_)) => return Extracted::NotAvailable,
            Err(err) => return Extracted::Failed(err.to_string()),
        };

        let (field, subsec_tag) = match exif.get_field(Tag::DateTimeOriginal, In::PRIMARY) {
            Some(field) => (field, Tag::SubSecTimeOriginal),
            None => match exif.get_field(Tag::DateTimeDigitized, In::PRIMARY) {
                Some(field) => (field, Tag::SubSecTimeDigitized),
                None => return Extracted::NotAvailable,
            },
        };

        let ascii = match &field.value {
            Value::Ascii(values) if !values.is_empty() => &values[0],
            _ => return Extracted::Failed(format!("malformed {} field", field.tag)),
        };
        let mut stamp = match exif::DateTime::from_ascii(ascii) {
            Ok(stamp) => stamp,
            Err(err) => return Extracted::Failed(err.to_string()),
        };
        if let Some(subsec) = exif.get_field(subsec_tag, In::PRIMARY) {
            if let Value::Ascii(values) = &subsec.value {
                if let Some(bytes) = values.first() {
                    apply_subsec(&mut stamp, bytes, path);
                }
            }
        }

        match to_naive(&stamp) {
            Some(at) => Extracted::Found(at),
            None => Extracted::Failed(format!("out-of-range capture time {}", stamp)),
        }
    }
}

/// A malformed sub-second field leaves the stamp at whole seconds.
fn apply_subsec(stamp: &mut exif::DateTime, bytes: &[u8], path: &Path) {
    if let Err(err) = stamp.parse_subsec(bytes) {
        debug!("Ignoring sub-second time of {}: {}", path.display(), err);
    }
}

fn to_naive(stamp: &exif::DateTime) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(stamp.year as i32, stamp.month as u32, stamp.day as u32)?
        .and_hms_nano_opt(
            stamp.hour as u32,
            stamp.minute as u32,
            stamp.second as u32,
            stamp.nanosecond.unwrap_or(0),
        )
}

/// Modification time as local wall-clock time, comparable with EXIF stamps.
pub fn local_time(time: SystemTime) -> NaiveDateTime {
    DateTime::<Local>::from(time).naive_local()
}

pub fn mime_hint(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "heic" | "heif" | "hif" => "image/heic",
        "png" => "image/png",
        "webp" => "image/webp",
        "tif" | "tiff" | "nef" | "arw" | "dng" | "cr2" => "image/tiff",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mts" | "m2ts" => "video/mp2t",
        _ => "application/octet-stream",
    }
}
