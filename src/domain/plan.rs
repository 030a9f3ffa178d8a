use std::error::Error;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::activity::{total_minutes, Activity};
use super::lesson_number::LessonNumber;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Draft,
    Planned,
    Completed,
    Cancelled,
}

impl PlanStatus {
    pub const ALL: [PlanStatus; 4] = [
        PlanStatus::Draft,
        PlanStatus::Planned,
        PlanStatus::Completed,
        PlanStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PlanStatus::Draft => "draft",
            PlanStatus::Planned => "planned",
            PlanStatus::Completed => "completed",
            PlanStatus::Cancelled => "cancelled",
        }
    }

    pub fn can_transition_to(self, next: PlanStatus) -> bool {
        if self == next {
            return true;
        }

        matches!(
            (self, next),
            (PlanStatus::Draft, PlanStatus::Planned)
                | (PlanStatus::Draft, PlanStatus::Cancelled)
                | (PlanStatus::Planned, PlanStatus::Draft)
                | (PlanStatus::Planned, PlanStatus::Completed)
                | (PlanStatus::Planned, PlanStatus::Cancelled)
                | (PlanStatus::Cancelled, PlanStatus::Draft)
        )
    }

    pub fn validate_transition(
        self,
        next: PlanStatus,
        force: bool,
    ) -> Result<(), InvalidStatusTransition> {
        if force || self.can_transition_to(next) {
            return Ok(());
        }

        Err(InvalidStatusTransition {
            from: self,
            to: next,
        })
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanStatus {
    type Err = ParsePlanStatusError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        let status = match normalized.as_str() {
            "draft" => PlanStatus::Draft,
            "planned" | "scheduled" => PlanStatus::Planned,
            "completed" | "done" => PlanStatus::Completed,
            "cancelled" | "canceled" => PlanStatus::Cancelled,
            _ => {
                return Err(ParsePlanStatusError {
                    value: value.to_string(),
                });
            }
        };
        Ok(status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsePlanStatusError {
    value: String,
}

impl fmt::Display for ParsePlanStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid plan status '{}': expected one of {}",
            self.value,
            PlanStatus::ALL
                .iter()
                .map(|status| status.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

impl Error for ParsePlanStatusError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidStatusTransition {
    pub from: PlanStatus,
    pub to: PlanStatus,
}

impl fmt::Display for InvalidStatusTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid plan status transition: {} -> {}", self.from, self.to)
    }
}

impl Error for InvalidStatusTransition {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonPlan {
    pub id: String,
    pub class_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default)]
    pub activities: Vec<Activity>,
    #[serde(default)]
    pub duration: u32,
    #[serde(default)]
    pub notes: String,
    pub status: PlanStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lesson_number: Option<LessonNumber>,
    pub created_at: String,
    pub updated_at: String,
}

impl LessonPlan {
    pub fn new(class_id: &str, title: &str, date: Option<String>, now: &str) -> Self {
        Self {
            id: format!("plan-{}", Uuid::now_v7()),
            class_id: class_id.to_string(),
            title: title.trim().to_string(),
            date,
            activities: Vec::new(),
            duration: 0,
            notes: String::new(),
            status: PlanStatus::Draft,
            lesson_number: None,
            created_at: now.to_string(),
            updated_at: now.to_string(),
        }
    }

    /// Adds a deep copy so later library edits never rewrite a planned lesson.
    pub fn add_activity(&mut self, activity: &Activity) -> String {
        let mut copy = activity.detached_copy();
        copy.lesson_number = self.lesson_number;
        let id = copy.local_id.clone();
        self.activities.push(copy);
        self.recompute();
        id
    }

    pub fn remove_activity(&mut self, id: &str) -> Option<Activity> {
        let index = self
            .activities
            .iter()
            .position(|activity| activity.matches_id(id))?;
        let removed = self.activities.remove(index);
        self.recompute();
        Some(removed)
    }

    pub fn set_lesson_number(&mut self, number: Option<LessonNumber>) {
        self.lesson_number = number;
        for activity in &mut self.activities {
            activity.lesson_number = number;
        }
    }

    pub fn recompute(&mut self) {
        self.duration = total_minutes(&self.activities);
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::{LessonPlan, PlanStatus};
    use crate::domain::activity::Activity;

    #[test]
    fn status_parsing_accepts_aliases() {
        assert_eq!(PlanStatus::from_str("Canceled").ok(), Some(PlanStatus::Cancelled));
        assert_eq!(PlanStatus::from_str(" done ").ok(), Some(PlanStatus::Completed));
        let err = PlanStatus::from_str("archived").expect_err("unknown status should fail");
        assert!(err.to_string().contains("draft, planned, completed, cancelled"));
    }

    #[test]
    fn completed_is_terminal_unless_forced() {
        assert!(PlanStatus::Completed
            .validate_transition(PlanStatus::Draft, false)
            .is_err());
        assert!(PlanStatus::Completed
            .validate_transition(PlanStatus::Draft, true)
            .is_ok());
        assert!(PlanStatus::Draft
            .validate_transition(PlanStatus::Completed, false)
            .is_err());
    }

    #[test]
    fn activities_are_deep_copied_and_duration_recomputed() {
        let mut plan = LessonPlan::new("year-3", "Week 1", None, "2026-09-01T09:00:00Z");
        let mut library = Activity::new("Hello", "Welcome", 5);
        let copy_id = plan.add_activity(&library);
        plan.add_activity(&Activity::new("Beat", "Rhythm", 7));
        assert_eq!(plan.duration, 12);

        library.duration_minutes = 50;
        assert_eq!(plan.activities[0].duration_minutes, 5);
        assert_ne!(copy_id, library.local_id);

        plan.remove_activity(&copy_id).expect("copy should be removable");
        assert_eq!(plan.duration, 7);
        assert!(plan.remove_activity(&library.local_id).is_none());
    }
}
