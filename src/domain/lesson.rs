use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::activity::{total_minutes, Activity};
use super::lesson_number::LessonNumber;

pub type LessonsData = BTreeMap<LessonNumber, LessonRecord>;
pub type StandardsMap = BTreeMap<LessonNumber, Vec<String>>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub grouped: BTreeMap<String, Vec<Activity>>,
    #[serde(default)]
    pub category_order: Vec<String>,
    #[serde(default)]
    pub total_time: u32,
    #[serde(default)]
    pub standards: Vec<String>,
}

impl LessonRecord {
    pub fn new(title: Option<String>) -> Self {
        Self {
            title,
            ..Self::default()
        }
    }

    pub fn activities(&self) -> impl Iterator<Item = &Activity> {
        self.grouped.values().flatten()
    }

    pub fn activity_count(&self) -> usize {
        self.grouped.values().map(Vec::len).sum()
    }

    pub fn add_activity(&mut self, mut activity: Activity, number: LessonNumber, categories: &[String]) {
        activity.lesson_number = Some(number);
        self.grouped
            .entry(activity.category.clone())
            .or_default()
            .push(activity);
        self.recompute(categories);
    }

    pub fn remove_activity(&mut self, id: &str, categories: &[String]) -> Option<Activity> {
        let mut removed = None;
        for activities in self.grouped.values_mut() {
            if let Some(index) = activities.iter().position(|activity| activity.matches_id(id)) {
                removed = Some(activities.remove(index));
                break;
            }
        }
        if removed.is_some() {
            self.recompute(categories);
        }
        removed
    }

    /// Rewrites the lesson number carried by every contained activity.
    pub fn relabel(&mut self, number: LessonNumber) {
        for activity in self.grouped.values_mut().flatten() {
            activity.lesson_number = Some(number);
        }
    }

    pub fn recompute(&mut self, categories: &[String]) {
        self.grouped.retain(|_, activities| !activities.is_empty());
        self.total_time = total_minutes(self.activities());
        self.category_order = category_display_order(self.grouped.keys(), categories);
    }

    pub fn computed_total(&self) -> u32 {
        total_minutes(self.activities())
    }
}

/// Configured categories first in their configured order, then any others alphabetically.
pub fn category_display_order<'a>(
    present: impl IntoIterator<Item = &'a String>,
    configured: &[String],
) -> Vec<String> {
    let mut present: Vec<&String> = present.into_iter().collect();
    present.sort_by_key(|category| {
        let rank = configured
            .iter()
            .position(|known| known.eq_ignore_ascii_case(category))
            .unwrap_or(usize::MAX);
        (rank, category.to_ascii_lowercase())
    });
    present.into_iter().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::{category_display_order, LessonRecord};
    use crate::domain::activity::Activity;
    use crate::domain::lesson_number::LessonNumber;

    fn categories() -> Vec<String> {
        vec!["Welcome".to_string(), "Singing".to_string()]
    }

    #[test]
    fn add_and_remove_keep_totals_and_order_current() {
        let number = LessonNumber::new(2).expect("lesson number");
        let mut record = LessonRecord::new(Some("Pulse".to_string()));
        let drum = Activity::new("Drum circle", "Rhythm", 10);
        let hello = Activity::new("Hello", "Welcome", 5);
        let hello_id = hello.local_id.clone();
        record.add_activity(drum, number, &categories());
        record.add_activity(hello, number, &categories());

        assert_eq!(record.total_time, 15);
        assert_eq!(record.category_order, vec!["Welcome", "Rhythm"]);
        assert!(record.activities().all(|a| a.lesson_number == Some(number)));

        let removed = record
            .remove_activity(&hello_id, &categories())
            .expect("activity should be removed");
        assert_eq!(removed.name, "Hello");
        assert_eq!(record.total_time, 10);
        assert_eq!(record.category_order, vec!["Rhythm"]);
        assert!(!record.grouped.contains_key("Welcome"));
    }

    #[test]
    fn unknown_categories_sort_alphabetically_after_configured() {
        let present = vec![
            "zither".to_string(),
            "Singing".to_string(),
            "Art".to_string(),
        ];
        assert_eq!(
            category_display_order(&present, &categories()),
            vec!["Singing", "Art", "zither"]
        );
    }
}
