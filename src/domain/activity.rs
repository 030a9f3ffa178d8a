use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::lesson_number::{blank_as_none, LessonNumber};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Video,
    Music,
    Backing,
    #[serde(alias = "resource")]
    Worksheet,
    Link,
    Vocals,
    Image,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 7] = [
        ResourceKind::Video,
        ResourceKind::Music,
        ResourceKind::Backing,
        ResourceKind::Worksheet,
        ResourceKind::Link,
        ResourceKind::Vocals,
        ResourceKind::Image,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Video => "video",
            ResourceKind::Music => "music",
            ResourceKind::Backing => "backing",
            ResourceKind::Worksheet => "worksheet",
            ResourceKind::Link => "link",
            ResourceKind::Vocals => "vocals",
            ResourceKind::Image => "image",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "resource" => Some(ResourceKind::Worksheet),
            other => Self::ALL.into_iter().find(|kind| kind.as_str() == other),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub kind: ResourceKind,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    /// Remote row id; wins over `local_id` once the activity has been stored remotely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "_id", default = "new_local_id")]
    pub local_id: String,
    #[serde(rename = "activity")]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: String,
    #[serde(rename = "time", default)]
    pub duration_minutes: u32,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub unit_name: String,
    #[serde(default, with = "blank_as_none")]
    pub lesson_number: Option<LessonNumber>,
    #[serde(default)]
    pub standards: BTreeSet<String>,
}

/// Composite upsert key shared by the remote activities table and bulk import.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MergeKey {
    pub name: String,
    pub category: String,
    pub lesson_number: Option<LessonNumber>,
}

fn new_local_id() -> String {
    Uuid::now_v7().to_string()
}

impl Activity {
    pub fn new(name: impl Into<String>, category: impl Into<String>, duration_minutes: u32) -> Self {
        Self {
            id: None,
            local_id: new_local_id(),
            name: name.into(),
            description: String::new(),
            category: category.into(),
            duration_minutes,
            level: String::new(),
            resources: Vec::new(),
            unit_name: String::new(),
            lesson_number: None,
            standards: BTreeSet::new(),
        }
    }

    pub fn stable_id(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.local_id)
    }

    pub fn matches_id(&self, id: &str) -> bool {
        self.id.as_deref() == Some(id) || self.local_id == id
    }

    pub fn merge_key(&self) -> MergeKey {
        MergeKey {
            name: self.name.trim().to_string(),
            category: self.category.trim().to_string(),
            lesson_number: self.lesson_number,
        }
    }

    /// Copy for embedding in a lesson or plan. It gets a fresh local id and no
    /// remote id, so later edits and removals address exactly this copy.
    pub fn detached_copy(&self) -> Self {
        let mut copy = self.clone();
        copy.id = None;
        copy.local_id = new_local_id();
        copy
    }

    pub fn resource(&self, kind: ResourceKind) -> Option<&str> {
        self.resources
            .iter()
            .find(|resource| resource.kind == kind)
            .map(|resource| resource.url.as_str())
    }

    pub fn set_resource(&mut self, kind: ResourceKind, url: &str) {
        let url = url.trim();
        self.resources.retain(|resource| resource.kind != kind);
        if !url.is_empty() {
            self.resources.push(Resource {
                kind,
                url: url.to_string(),
            });
            self.resources.sort_by_key(|resource| resource.kind);
        }
    }

    pub fn missing_field(&self) -> Option<&'static str> {
        if self.name.trim().is_empty() {
            Some("activity")
        } else if self.category.trim().is_empty() {
            Some("category")
        } else {
            None
        }
    }
}

/// Sum of durations in minutes, saturating at `u32::MAX`.
pub fn total_minutes<'a>(activities: impl IntoIterator<Item = &'a Activity>) -> u32 {
    activities
        .into_iter()
        .fold(0, |total: u32, activity| total.saturating_add(activity.duration_minutes))
}
