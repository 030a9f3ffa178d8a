use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::domain::activity::{Activity, MergeKey, ResourceKind};
use crate::domain::lesson::LessonRecord;
use crate::domain::lesson_number::{sorted_unique, LessonNumber};
use crate::domain::unit::Unit;
use crate::persistence::CollectionKey;

use super::{Change, Engine, Scratch, ValidationError};

#[derive(Debug, Clone, Default)]
pub struct ActivityPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub duration_minutes: Option<u32>,
    pub level: Option<String>,
    pub unit_name: Option<String>,
    pub resources: Vec<(ResourceKind, String)>,
    pub add_standards: Vec<String>,
    pub remove_standards: Vec<String>,
}

impl ActivityPatch {
    fn has_changes(&self) -> bool {
        self.name.is_some()
            || self.description.is_some()
            || self.category.is_some()
            || self.duration_minutes.is_some()
            || self.level.is_some()
            || self.unit_name.is_some()
            || !self.resources.is_empty()
            || !self.add_standards.is_empty()
            || !self.remove_standards.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeSummary {
    pub inserted: u64,
    pub updated: u64,
    pub lessons_created: Vec<LessonNumber>,
}

impl Engine {
    pub fn add_activity(&mut self, activity: Activity) -> Result<Change<String>, ValidationError> {
        self.transact(|scratch| {
            if let Some(field) = activity.missing_field() {
                return Err(ValidationError::MissingField(field));
            }
            let id = activity.stable_id().to_string();
            let mut touched = vec![CollectionKey::Activities];
            if let Some(number) = activity.lesson_number {
                scratch.ensure_lesson(number)?;
                scratch.add_to_lesson(number, activity.detached_copy());
                touched.push(CollectionKey::Lessons);
            }
            scratch.state.activities.push(activity);
            Ok(Change::new(id, touched))
        })
    }

    /// Edits the library entry only; copies already placed in lessons or plans keep their values.
    pub fn update_activity(
        &mut self,
        id: &str,
        patch: ActivityPatch,
    ) -> Result<Change<Activity>, ValidationError> {
        if !patch.has_changes() {
            return Err(ValidationError::MissingField("field to update"));
        }
        self.transact(|scratch| {
            let activity = scratch
                .state
                .activities
                .iter_mut()
                .find(|activity| activity.matches_id(id))
                .ok_or_else(|| ValidationError::ActivityNotFound(id.to_string()))?;
            if let Some(name) = patch.name {
                activity.name = name.trim().to_string();
            }
            if let Some(description) = patch.description {
                activity.description = description;
            }
            if let Some(category) = patch.category {
                activity.category = category.trim().to_string();
            }
            if let Some(minutes) = patch.duration_minutes {
                activity.duration_minutes = minutes;
            }
            if let Some(level) = patch.level {
                activity.level = level;
            }
            if let Some(unit_name) = patch.unit_name {
                activity.unit_name = unit_name;
            }
            for (kind, url) in &patch.resources {
                activity.set_resource(*kind, url);
            }
            for standard in patch.add_standards {
                activity.standards.insert(standard);
            }
            for standard in &patch.remove_standards {
                activity.standards.remove(standard);
            }
            if let Some(field) = activity.missing_field() {
                return Err(ValidationError::MissingField(field));
            }
            Ok(Change::new(activity.clone(), [CollectionKey::Activities]))
        })
    }

    pub fn delete_activity(&mut self, id: &str) -> Result<Change<Activity>, ValidationError> {
        self.transact(|scratch| {
            let index = scratch
                .state
                .activities
                .iter()
                .position(|activity| activity.matches_id(id))
                .ok_or_else(|| ValidationError::ActivityNotFound(id.to_string()))?;
            let removed = scratch.state.activities.remove(index);
            Ok(Change::new(removed, [CollectionKey::Activities]))
        })
    }

    pub fn create_lesson(
        &mut self,
        title: Option<String>,
    ) -> Result<Change<LessonNumber>, ValidationError> {
        self.transact(|scratch| {
            let number = scratch.state.next_lesson_number();
            scratch
                .state
                .lessons
                .insert(number, LessonRecord::new(title.filter(|t| !t.trim().is_empty())));
            Ok(Change::new(number, [CollectionKey::Lessons]))
        })
    }

    /// Copies a library activity into a lesson. The lesson may be new only if it
    /// is the next number in sequence.
    pub fn add_activity_to_lesson(
        &mut self,
        number: LessonNumber,
        activity_id: &str,
    ) -> Result<Change<String>, ValidationError> {
        self.transact(|scratch| {
            let copy = scratch
                .state
                .find_activity(activity_id)
                .ok_or_else(|| ValidationError::ActivityNotFound(activity_id.to_string()))?
                .detached_copy();
            let copy_id = copy.local_id.clone();
            scratch.ensure_lesson(number)?;
            scratch.add_to_lesson(number, copy);
            Ok(Change::new(copy_id, [CollectionKey::Lessons]))
        })
    }

    pub fn remove_activity_from_lesson(
        &mut self,
        number: LessonNumber,
        activity_id: &str,
    ) -> Result<Change<Activity>, ValidationError> {
        self.transact(|scratch| {
            let categories = scratch.categories;
            let record = scratch
                .state
                .lessons
                .get_mut(&number)
                .ok_or(ValidationError::LessonNotFound(number))?;
            let removed = record
                .remove_activity(activity_id, categories)
                .ok_or_else(|| ValidationError::ActivityNotFound(activity_id.to_string()))?;
            Ok(Change::new(removed, [CollectionKey::Lessons]))
        })
    }

    pub fn set_lesson_title(
        &mut self,
        number: LessonNumber,
        title: Option<String>,
    ) -> Result<Change<()>, ValidationError> {
        self.transact(|scratch| {
            let record = scratch
                .state
                .lessons
                .get_mut(&number)
                .ok_or(ValidationError::LessonNotFound(number))?;
            record.title = title.filter(|t| !t.trim().is_empty());
            Ok(Change::new((), [CollectionKey::Lessons]))
        })
    }

    /// Replaces the lesson-level standards and mirrors them into the standards map.
    pub fn set_lesson_standards(
        &mut self,
        number: LessonNumber,
        standards: Vec<String>,
    ) -> Result<Change<()>, ValidationError> {
        self.transact(|scratch| {
            let standards: Vec<String> = standards
                .into_iter()
                .map(|standard| standard.trim().to_string())
                .filter(|standard| !standard.is_empty())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let record = scratch
                .state
                .lessons
                .get_mut(&number)
                .ok_or(ValidationError::LessonNotFound(number))?;
            record.standards = standards.clone();
            if standards.is_empty() {
                scratch.state.standards.remove(&number);
            } else {
                scratch.state.standards.insert(number, standards);
            }
            Ok(Change::new((), [CollectionKey::Lessons, CollectionKey::Standards]))
        })
    }

    pub fn create_unit(
        &mut self,
        name: &str,
        color: &str,
        term: Option<String>,
    ) -> Result<Change<Unit>, ValidationError> {
        self.transact(|scratch| {
            if name.trim().is_empty() {
                return Err(ValidationError::MissingField("name"));
            }
            let unit = Unit::new(name, color, term, &scratch.now);
            scratch.state.units.push(unit.clone());
            Ok(Change::new(unit, [CollectionKey::Units]))
        })
    }

    pub fn assign_unit_lessons(
        &mut self,
        unit_id: &str,
        numbers: &[LessonNumber],
    ) -> Result<Change<Unit>, ValidationError> {
        self.transact(|scratch| {
            let existing = scratch.state.lesson_numbers();
            if let Some(missing) = numbers.iter().find(|number| !existing.contains(number)) {
                return Err(ValidationError::LessonNotFound(*missing));
            }
            let now = scratch.now.clone();
            let unit = scratch
                .state
                .units
                .iter_mut()
                .find(|unit| unit.id == unit_id)
                .ok_or_else(|| ValidationError::UnitNotFound(unit_id.to_string()))?;
            unit.lesson_numbers = sorted_unique(numbers.iter().copied());
            unit.updated_at = now;
            Ok(Change::new(unit.clone(), [CollectionKey::Units]))
        })
    }

    pub fn delete_unit(&mut self, unit_id: &str) -> Result<Change<Unit>, ValidationError> {
        self.transact(|scratch| {
            let index = scratch
                .state
                .units
                .iter()
                .position(|unit| unit.id == unit_id)
                .ok_or_else(|| ValidationError::UnitNotFound(unit_id.to_string()))?;
            Ok(Change::new(
                scratch.state.units.remove(index),
                [CollectionKey::Units],
            ))
        })
    }

    /// Unions imported activities into the library keyed by `(name, category,
    /// lessonNumber)`, later rows winning, and files numbered ones into their lessons.
    pub fn merge_imported(
        &mut self,
        imported: Vec<Activity>,
    ) -> Result<Change<MergeSummary>, ValidationError> {
        self.transact(|scratch| {
            let numbers = sorted_unique(
                scratch
                    .state
                    .lesson_numbers()
                    .into_iter()
                    .chain(imported.iter().filter_map(|activity| activity.lesson_number)),
            );
            let missing = missing_numbers(&numbers);
            if !missing.is_empty() {
                return Err(ValidationError::NotDense { missing });
            }

            let mut summary = MergeSummary::default();
            let mut lessons_touched = false;
            let mut by_key: HashMap<MergeKey, usize> = scratch
                .state
                .activities
                .iter()
                .enumerate()
                .map(|(index, activity)| (activity.merge_key(), index))
                .collect();

            for mut activity in imported {
                let key = activity.merge_key();
                match by_key.get(&key).copied() {
                    Some(index) => {
                        let existing = &scratch.state.activities[index];
                        activity.id = activity.id.or_else(|| existing.id.clone());
                        activity.local_id = existing.local_id.clone();
                        scratch.state.activities[index] = activity.clone();
                        summary.updated += 1;
                    }
                    None => {
                        by_key.insert(key.clone(), scratch.state.activities.len());
                        scratch.state.activities.push(activity.clone());
                        summary.inserted += 1;
                    }
                }

                if let Some(number) = activity.lesson_number {
                    lessons_touched = true;
                    if !scratch.state.lessons.contains_key(&number) {
                        scratch.state.lessons.insert(number, LessonRecord::default());
                        summary.lessons_created.push(number);
                    }
                    let categories = scratch.categories;
                    if let Some(record) = scratch.state.lessons.get_mut(&number) {
                        for group in record.grouped.values_mut() {
                            group.retain(|placed| placed.merge_key() != key);
                        }
                        record.add_activity(activity.detached_copy(), number, categories);
                    }
                }
            }

            if summary.inserted + summary.updated == 0 {
                return Ok(Change::untouched(summary));
            }
            let mut touched = vec![CollectionKey::Activities];
            if lessons_touched {
                touched.push(CollectionKey::Lessons);
            }
            Ok(Change::new(summary, touched))
        })
    }
}

impl Scratch<'_> {
    /// Existing lesson, or a fresh record when `number` is exactly the next one.
    pub(super) fn ensure_lesson(&mut self, number: LessonNumber) -> Result<(), ValidationError> {
        if self.state.lessons.contains_key(&number) {
            return Ok(());
        }
        let next = self.state.next_lesson_number();
        if number != next && !self.state.lesson_numbers().contains(&number) {
            return Err(ValidationError::LessonGap {
                requested: number,
                next,
            });
        }
        self.state.lessons.insert(number, LessonRecord::default());
        Ok(())
    }

    pub(super) fn add_to_lesson(&mut self, number: LessonNumber, activity: Activity) {
        let categories = self.categories;
        if let Some(record) = self.state.lessons.get_mut(&number) {
            record.add_activity(activity, number, categories);
        }
    }
}

fn missing_numbers(sorted: &[LessonNumber]) -> Vec<LessonNumber> {
    let Some(max) = sorted.last() else {
        return Vec::new();
    };
    (1..=max.get())
        .filter_map(LessonNumber::new)
        .filter(|number| sorted.binary_search(number).is_err())
        .collect()
}
