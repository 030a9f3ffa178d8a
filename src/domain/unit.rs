use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::lesson_number::LessonNumber;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Unit {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,
    #[serde(default)]
    pub lesson_numbers: Vec<LessonNumber>,
    pub created_at: String,
    pub updated_at: String,
}

impl Unit {
    pub fn new(name: &str, color: &str, term: Option<String>, now: &str) -> Self {
        Self {
            id: format!("unit-{}", Uuid::now_v7()),
            name: name.trim().to_string(),
            description: String::new(),
            color: color.trim().to_string(),
            term,
            lesson_numbers: Vec::new(),
            created_at: now.to_string(),
            updated_at: now.to_string(),
        }
    }
}
