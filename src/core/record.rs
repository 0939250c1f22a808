use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// Metadata tags the matcher knows how to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    CreateDate,
    SubSecTime,
    SubSecTimeOriginal,
    SubSecTimeDigitized,
    OffsetTime,
    OffsetTimeOriginal,
    OffsetTimeDigitized,
    DateCreated,
    TimeCreated,
    ShutterCount,
    MechanicalShutterCount,
    ImageNumber,
    FileNumber,
    SerialNumber,
    CameraSerialNumber,
    BodySerialNumber,
    LensID,
    LensModel,
    PreservedFileName,
}

impl Tag {
    /// Tag name as exiftool prints it in JSON output.
    pub const fn name(self) -> &'static str {
        match self {
            Tag::CreateDate => "CreateDate",
            Tag::SubSecTime => "SubSecTime",
            Tag::SubSecTimeOriginal => "SubSecTimeOriginal",
            Tag::SubSecTimeDigitized => "SubSecTimeDigitized",
            Tag::OffsetTime => "OffsetTime",
            Tag::OffsetTimeOriginal => "OffsetTimeOriginal",
            Tag::OffsetTimeDigitized => "OffsetTimeDigitized",
            Tag::DateCreated => "DateCreated",
            Tag::TimeCreated => "TimeCreated",
            Tag::ShutterCount => "ShutterCount",
            Tag::MechanicalShutterCount => "MechanicalShutterCount",
            Tag::ImageNumber => "ImageNumber",
            Tag::FileNumber => "FileNumber",
            Tag::SerialNumber => "SerialNumber",
            Tag::CameraSerialNumber => "CameraSerialNumber",
            Tag::BodySerialNumber => "BodySerialNumber",
            Tag::LensID => "LensID",
            Tag::LensModel => "LensModel",
            Tag::PreservedFileName => "PreservedFileName",
        }
    }

    /// Command-line selector for this tag (`-CreateDate`).
    pub fn arg(self) -> String {
        format!("-{}", self.name())
    }
}

const TIMESTAMP_TAGS: [Tag; 9] = [
    Tag::CreateDate,
    Tag::SubSecTime,
    Tag::SubSecTimeOriginal,
    Tag::SubSecTimeDigitized,
    Tag::OffsetTime,
    Tag::OffsetTimeOriginal,
    Tag::OffsetTimeDigitized,
    Tag::DateCreated,
    Tag::TimeCreated,
];

const IDENTITY_TAGS: [Tag; 5] = [
    Tag::SerialNumber,
    Tag::CameraSerialNumber,
    Tag::BodySerialNumber,
    Tag::LensID,
    Tag::LensModel,
];

/// Tags read from every RAW file while indexing.
pub fn raw_tags() -> Vec<Tag> {
    let mut tags = TIMESTAMP_TAGS.to_vec();
    tags.extend([
        Tag::ShutterCount,
        Tag::MechanicalShutterCount,
        Tag::ImageNumber,
        Tag::FileNumber,
    ]);
    tags.extend(IDENTITY_TAGS);
    tags
}

/// Tags read from every JPEG that should receive GPS data.
pub fn jpeg_tags() -> Vec<Tag> {
    let mut tags = TIMESTAMP_TAGS.to_vec();
    tags.extend([
        Tag::ShutterCount,
        Tag::MechanicalShutterCount,
        Tag::ImageNumber,
        Tag::PreservedFileName,
    ]);
    tags.extend(IDENTITY_TAGS);
    tags
}

/// Tags read from a reference JPEG on demand. Same set as the JPEG population.
pub fn reference_tags() -> Vec<Tag> {
    jpeg_tags()
}

/// Union of the RAW and JPEG tag sets, used by `inspect`.
pub fn all_tags() -> Vec<Tag> {
    let mut tags = raw_tags();
    for tag in jpeg_tags() {
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

const SOURCE_FILE: &str = "SourceFile";
const ERROR: &str = "Error";

/// Flat tag/value record for one file, as returned by exiftool `-json`.
///
/// Every tag is optional. Values may be strings or numbers depending on the
/// camera and on exiftool's `-n` conversion, so accessors are permissive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataRecord(Map<String, Value>);

impl MetadataRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_file(path: impl AsRef<Path>) -> Self {
        let mut record = Self::new();
        record.0.insert(
            SOURCE_FILE.to_string(),
            Value::String(path.as_ref().to_string_lossy().into_owned()),
        );
        record
    }

    /// Builder-style setter.
    pub fn with(mut self, tag: Tag, value: impl Into<Value>) -> Self {
        self.set(tag, value);
        self
    }

    pub fn set(&mut self, tag: Tag, value: impl Into<Value>) {
        self.0.insert(tag.name().to_string(), value.into());
    }

    pub fn source_path(&self) -> Option<&Path> {
        match self.0.get(SOURCE_FILE) {
            Some(Value::String(s)) if !s.is_empty() => Some(Path::new(s)),
            _ => None,
        }
    }

    /// Error message exiftool attached to this file, if any.
    pub fn error(&self) -> Option<&str> {
        self.0.get(ERROR).and_then(Value::as_str)
    }

    /// True when at least one tag besides `SourceFile` was read.
    pub fn has_tags(&self) -> bool {
        self.0.keys().any(|k| k != SOURCE_FILE && k != ERROR)
    }

    /// String form of a tag. Empty strings and non-scalar values count as absent.
    pub fn text(&self, tag: Tag) -> Option<String> {
        match self.0.get(tag.name())? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// First present tag in precedence order.
    pub fn first_text(&self, tags: &[Tag]) -> Option<String> {
        tags.iter().find_map(|&tag| self.text(tag))
    }

    /// Integer value of a tag. Anything that does not parse as an integer
    /// after trimming is treated as absent.
    pub fn integer(&self, tag: Tag) -> Option<i64> {
        match self.0.get(tag.name())? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Camera shot counter: shutter count, then mechanical shutter count,
    /// then image number.
    pub fn frame_counter(&self) -> Option<i64> {
        self.integer(Tag::ShutterCount)
            .or_else(|| self.integer(Tag::MechanicalShutterCount))
            .or_else(|| self.integer(Tag::ImageNumber))
    }

    pub fn lens(&self) -> Option<String> {
        self.first_text(&[Tag::LensID, Tag::LensModel])
    }

    pub fn body_serial(&self) -> Option<String> {
        self.first_text(&[
            Tag::SerialNumber,
            Tag::CameraSerialNumber,
            Tag::BodySerialNumber,
        ])
    }

    pub fn preserved_file_name(&self) -> Option<String> {
        self.text(Tag::PreservedFileName)
    }
}
