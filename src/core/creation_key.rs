//! Composite "moment of capture" key.
//!
//! The key is an opaque string built from the camera-local timestamp plus
//! whatever sub-second and UTC-offset fields the file carries. It is never
//! parsed as a date; two files of the same shot simply produce the same text.

use super::record::{MetadataRecord, Tag};

const OFFSET_TAGS: [Tag; 3] = [
    Tag::OffsetTimeDigitized,
    Tag::OffsetTimeOriginal,
    Tag::OffsetTime,
];

const EXIF_SUBSEC_TAGS: [Tag; 3] = [
    Tag::SubSecTimeDigitized,
    Tag::SubSecTimeOriginal,
    Tag::SubSecTime,
];

const IPTC_SUBSEC_TAGS: [Tag; 3] = [
    Tag::SubSecTime,
    Tag::SubSecTimeDigitized,
    Tag::SubSecTimeOriginal,
];

/// Derive the creation key of a record, or `None` when it has neither
/// `CreateDate` nor the IPTC `DateCreated`/`TimeCreated` pair.
pub fn compose_creation_key(record: &MetadataRecord) -> Option<String> {
    if let Some(create_date) = record.text(Tag::CreateDate) {
        return Some(augment(create_date, record, &EXIF_SUBSEC_TAGS));
    }

    let date = record.text(Tag::DateCreated)?;
    let time = record.text(Tag::TimeCreated)?;
    Some(augment(format!("{date} {time}"), record, &IPTC_SUBSEC_TAGS))
}

fn augment(mut key: String, record: &MetadataRecord, subsec_tags: &[Tag]) -> String {
    if !has_subsec(&key) {
        if let Some(subsec) = record.first_text(subsec_tags) {
            key.push('.');
            key.push_str(&subsec);
        }
    }
    if !has_offset(&key) {
        if let Some(offset) = record.first_text(&OFFSET_TAGS) {
            key.push_str(&offset);
        }
    }
    key
}

fn has_subsec(key: &str) -> bool {
    key.contains('.')
}

/// `...+02:00` / `...-05:30` style suffix.
fn has_offset(key: &str) -> bool {
    let mut tail = key.chars().rev();
    let third = tail.nth(2);
    let sixth = tail.nth(2);
    matches!((third, sixth), (Some(':'), Some('+' | '-')))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_date(value: &str) -> MetadataRecord {
        MetadataRecord::new().with(Tag::CreateDate, value)
    }

    #[test]
    fn test_appends_subsec() {
        let record = create_date("2024:05:01 10:00:00").with(Tag::SubSecTimeOriginal, "123");
        assert_eq!(
            compose_creation_key(&record).as_deref(),
            Some("2024:05:01 10:00:00.123")
        );
    }

    #[test]
    fn test_subsec_precedence() {
        let record = create_date("2024:05:01 10:00:00")
            .with(Tag::SubSecTime, "1")
            .with(Tag::SubSecTimeOriginal, "2")
            .with(Tag::SubSecTimeDigitized, "3");
        assert_eq!(
            compose_creation_key(&record).as_deref(),
            Some("2024:05:01 10:00:00.3")
        );
    }

    #[test]
    fn test_existing_subsec_not_doubled() {
        let record = create_date("2024:05:01 10:00:00.456").with(Tag::SubSecTime, "789");
        assert_eq!(
            compose_creation_key(&record).as_deref(),
            Some("2024:05:01 10:00:00.456")
        );
    }

    #[test]
    fn test_appends_offset_verbatim() {
        let record = create_date("2024:05:01 10:00:00")
            .with(Tag::SubSecTimeOriginal, "12")
            .with(Tag::OffsetTime, "+01:00")
            .with(Tag::OffsetTimeOriginal, "+02:00");
        assert_eq!(
            compose_creation_key(&record).as_deref(),
            Some("2024:05:01 10:00:00.12+02:00")
        );
    }

    #[test]
    fn test_existing_offset_not_doubled() {
        let record = create_date("2024:05:01 10:00:00.50-05:00").with(Tag::OffsetTime, "+02:00");
        assert_eq!(
            compose_creation_key(&record).as_deref(),
            Some("2024:05:01 10:00:00.50-05:00")
        );
    }

    #[test]
    fn test_iptc_fallback() {
        let record = MetadataRecord::new()
            .with(Tag::DateCreated, "2024:05:01")
            .with(Tag::TimeCreated, "10:00:00");
        assert_eq!(
            compose_creation_key(&record).as_deref(),
            Some("2024:05:01 10:00:00")
        );
    }

    #[test]
    fn test_iptc_fallback_uses_generic_subsec_first() {
        let record = MetadataRecord::new()
            .with(Tag::DateCreated, "2024:05:01")
            .with(Tag::TimeCreated, "10:00:00+02:00")
            .with(Tag::SubSecTimeDigitized, "9")
            .with(Tag::SubSecTime, "7")
            .with(Tag::OffsetTime, "+03:00");
        // The sub-second lands after the offset; the key is opaque, only
        // equality matters.
        assert_eq!(
            compose_creation_key(&record).as_deref(),
            Some("2024:05:01 10:00:00+02:00.7+03:00")
        );
    }

    #[test]
    fn test_no_key_without_timestamp() {
        assert_eq!(compose_creation_key(&MetadataRecord::new()), None);
        let only_date = MetadataRecord::new().with(Tag::DateCreated, "2024:05:01");
        assert_eq!(compose_creation_key(&only_date), None);
    }

    #[test]
    fn test_deterministic() {
        let record = create_date("2024:05:01 10:00:00")
            .with(Tag::SubSecTimeDigitized, "01")
            .with(Tag::OffsetTimeDigitized, "+09:00");
        let first = compose_creation_key(&record);
        let second = compose_creation_key(&record.clone());
        assert_eq!(first, second);
        assert_eq!(first.as_deref(), Some("2024:05:01 10:00:00.01+09:00"));
    }

    #[test]
    fn test_has_offset() {
        assert!(has_offset("10:00:00+02:00"));
        assert!(has_offset("10:00:00-05:30"));
        assert!(!has_offset("10:00:00"));
        assert!(!has_offset(":00"));
    }
}
