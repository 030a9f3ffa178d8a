use std::fmt;
use std::path::Path;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};

use crate::domain::activity::{Activity, ResourceKind};
use crate::domain::lesson_number::LessonNumber;

use super::errors::ImportError;

/// One validated spreadsheet row, as exported one JSON object per line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRow {
    #[serde(default, deserialize_with = "lenient_string")]
    pub lesson_number: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub activity_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub level: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub time: String,
    #[serde(default)]
    pub video: String,
    #[serde(default)]
    pub music: String,
    #[serde(default)]
    pub backing: String,
    #[serde(default)]
    pub resource: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub vocals: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub unit_name: String,
}

impl ImportRow {
    pub fn into_activity(self) -> Result<Activity, ImportError> {
        let name = self.activity_name.trim();
        if name.is_empty() {
            return Err(ImportError::InvalidRecord(
                "row requires a non-empty activityName".to_string(),
            ));
        }
        let category = self.category.trim();
        if category.is_empty() {
            return Err(ImportError::InvalidRecord(format!(
                "activity '{}' has no category",
                name
            )));
        }

        let time = self.time.trim();
        let minutes = if time.is_empty() {
            0
        } else {
            time.parse::<u32>().map_err(|_| {
                ImportError::InvalidRecord(format!(
                    "activity '{}' has invalid time '{}', expected whole minutes",
                    name, time
                ))
            })?
        };

        let raw_number = self.lesson_number.trim();
        let lesson_number = if raw_number.is_empty() {
            None
        } else {
            Some(raw_number.parse::<LessonNumber>().map_err(|err| {
                ImportError::InvalidRecord(format!("activity '{}': {}", name, err))
            })?)
        };

        let mut activity = Activity::new(name, category, minutes);
        activity.description = self.description;
        activity.level = self.level.trim().to_string();
        activity.unit_name = self.unit_name.trim().to_string();
        activity.lesson_number = lesson_number;
        for (kind, url) in [
            (ResourceKind::Video, &self.video),
            (ResourceKind::Music, &self.music),
            (ResourceKind::Backing, &self.backing),
            (ResourceKind::Worksheet, &self.resource),
            (ResourceKind::Link, &self.link),
            (ResourceKind::Vocals, &self.vocals),
            (ResourceKind::Image, &self.image),
        ] {
            activity.set_resource(kind, url);
        }
        Ok(activity)
    }
}

/// Spreadsheet exports carry numbers either as JSON numbers or as text.
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    struct LenientVisitor;

    impl Visitor<'_> for LenientVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a string or a non-negative number")
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
            Ok(value.to_string())
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
            Ok(value.to_string())
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
            Ok(value.to_string())
        }

        fn visit_f64<E: de::Error>(self, value: f64) -> Result<Self::Value, E> {
            if value.fract() == 0.0 {
                Ok(format!("{}", value as i64))
            } else {
                Ok(value.to_string())
            }
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(String::new())
        }
    }

    deserializer.deserialize_any(LenientVisitor)
}

pub fn normalize_path(raw: &str) -> Result<String, ImportError> {
    let path = Path::new(raw);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    let normalized = if absolute.exists() {
        absolute.canonicalize().unwrap_or(absolute)
    } else {
        absolute
    };
    Ok(normalized.to_string_lossy().to_string())
}

pub fn source_key(class_id: &str, source_ref: &str) -> String {
    format!("jsonl:{}:{}", class_id, source_ref)
}

#[cfg(test)]
mod tests {
    use super::ImportRow;
    use crate::domain::activity::ResourceKind;
    use crate::domain::lesson_number::LessonNumber;

    #[test]
    fn numeric_cells_and_resource_columns_are_accepted() {
        let row: ImportRow = serde_json::from_str(
            r#"{"lessonNumber": 3, "category": "Welcome", "activityName": "Hello",
                "time": 5.0, "resource": "sheet.pdf", "video": "", "unitName": " Pulse "}"#,
        )
        .expect("row should parse");
        let activity = row.into_activity().expect("row should be valid");
        assert_eq!(activity.lesson_number, LessonNumber::new(3));
        assert_eq!(activity.duration_minutes, 5);
        assert_eq!(activity.unit_name, "Pulse");
        assert_eq!(activity.resource(ResourceKind::Worksheet), Some("sheet.pdf"));
        assert_eq!(activity.resource(ResourceKind::Video), None);
    }

    #[test]
    fn rows_without_name_or_with_bad_numbers_are_invalid() {
        let missing = ImportRow {
            category: "Welcome".to_string(),
            ..ImportRow::default()
        };
        assert!(missing
            .into_activity()
            .expect_err("name is required")
            .to_string()
            .contains("activityName"));

        let bad_time = ImportRow {
            activity_name: "Hello".to_string(),
            category: "Welcome".to_string(),
            time: "ten".to_string(),
            ..ImportRow::default()
        };
        assert!(bad_time.into_activity().is_err());

        let bad_lesson = ImportRow {
            activity_name: "Hello".to_string(),
            category: "Welcome".to_string(),
            lesson_number: "0".to_string(),
            ..ImportRow::default()
        };
        assert!(bad_lesson.into_activity().is_err());
    }
}
