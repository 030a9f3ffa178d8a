use serde::de::{DeserializeOwned, Error as _};
use serde::Serialize;

use crate::domain::activity::Activity;
use crate::domain::class_state::ClassState;
use crate::domain::half_term::{default_half_terms, HalfTerm};
use crate::domain::lesson::{LessonRecord, LessonsData, StandardsMap};
use crate::domain::lesson_number::LessonNumber;
use crate::domain::plan::LessonPlan;
use crate::domain::unit::Unit;
use crate::remote::{RemoteRow, RowKey};

use super::{CollectionKey, Defaults};

/// One persisted collection of a class: its cache blob shape and its remote row shape.
pub trait Collection: Serialize + DeserializeOwned + Default + Sized {
    const KEY: CollectionKey;

    fn is_empty(&self) -> bool;

    fn initial(_defaults: &Defaults) -> Self {
        Self::default()
    }

    fn to_rows(&self) -> Result<Vec<RemoteRow>, serde_json::Error>;

    fn from_rows(rows: Vec<RemoteRow>) -> Result<Self, serde_json::Error>;

    /// Restores an order the remote does not keep.
    fn arrange(&mut self, _defaults: &Defaults) {}
}

/// Object-safe view used when the collection type is only known at runtime.
pub trait Snapshot {
    fn key(&self) -> CollectionKey;

    fn encode(&self) -> Result<String, serde_json::Error>;

    fn rows(&self) -> Result<Vec<RemoteRow>, serde_json::Error>;
}

impl<C: Collection> Snapshot for C {
    fn key(&self) -> CollectionKey {
        C::KEY
    }

    fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    fn rows(&self) -> Result<Vec<RemoteRow>, serde_json::Error> {
        self.to_rows()
    }
}

pub fn snapshot_of(state: &ClassState, key: CollectionKey) -> &dyn Snapshot {
    match key {
        CollectionKey::Activities => &state.activities,
        CollectionKey::Lessons => &state.lessons,
        CollectionKey::LessonPlans => &state.plans,
        CollectionKey::HalfTerms => &state.half_terms,
        CollectionKey::Units => &state.units,
        CollectionKey::Standards => &state.standards,
    }
}

fn numbers_as_strings(numbers: impl IntoIterator<Item = LessonNumber>) -> Vec<String> {
    numbers.into_iter().map(|number| number.to_string()).collect()
}

fn lesson_key(key: &RowKey) -> Result<LessonNumber, serde_json::Error> {
    match key {
        RowKey::Id(raw) => raw
            .parse()
            .map_err(|err| serde_json::Error::custom(format!("row id '{}': {}", raw, err))),
        other => Err(serde_json::Error::custom(format!(
            "expected a lesson number row id, got {:?}",
            other
        ))),
    }
}

fn decode_all<T: DeserializeOwned>(rows: Vec<RemoteRow>) -> Result<Vec<T>, serde_json::Error> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row.data))
        .collect()
}

impl Collection for Vec<Activity> {
    const KEY: CollectionKey = CollectionKey::Activities;

    fn is_empty(&self) -> bool {
        <[Activity]>::is_empty(self)
    }

    fn to_rows(&self) -> Result<Vec<RemoteRow>, serde_json::Error> {
        self.iter()
            .map(|activity| {
                let key = RowKey::Activity {
                    name: activity.name.trim().to_string(),
                    category: activity.category.trim().to_string(),
                    lesson_number: activity
                        .lesson_number
                        .map(|number| number.to_string())
                        .unwrap_or_default(),
                };
                Ok(RemoteRow::new(key, serde_json::to_value(activity)?))
            })
            .collect()
    }

    fn from_rows(rows: Vec<RemoteRow>) -> Result<Self, serde_json::Error> {
        rows.into_iter()
            .map(|row| {
                let mut activity: Activity = serde_json::from_value(row.data)?;
                if row.remote_id.is_some() {
                    activity.id = row.remote_id;
                }
                Ok(activity)
            })
            .collect()
    }
}

impl Collection for LessonsData {
    const KEY: CollectionKey = CollectionKey::Lessons;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn to_rows(&self) -> Result<Vec<RemoteRow>, serde_json::Error> {
        self.iter()
            .map(|(number, record)| {
                Ok(
                    RemoteRow::new(RowKey::Id(number.to_string()), serde_json::to_value(record)?)
                        .with_lesson_numbers(vec![number.to_string()]),
                )
            })
            .collect()
    }

    fn from_rows(rows: Vec<RemoteRow>) -> Result<Self, serde_json::Error> {
        rows.into_iter()
            .map(|row| {
                let number = lesson_key(&row.key)?;
                let record: LessonRecord = serde_json::from_value(row.data)?;
                Ok((number, record))
            })
            .collect()
    }
}

impl Collection for Vec<LessonPlan> {
    const KEY: CollectionKey = CollectionKey::LessonPlans;

    fn is_empty(&self) -> bool {
        <[LessonPlan]>::is_empty(self)
    }

    fn to_rows(&self) -> Result<Vec<RemoteRow>, serde_json::Error> {
        self.iter()
            .map(|plan| {
                Ok(
                    RemoteRow::new(RowKey::Id(plan.id.clone()), serde_json::to_value(plan)?)
                        .with_lesson_numbers(numbers_as_strings(plan.lesson_number)),
                )
            })
            .collect()
    }

    fn from_rows(rows: Vec<RemoteRow>) -> Result<Self, serde_json::Error> {
        decode_all(rows)
    }
}

impl Collection for Vec<HalfTerm> {
    const KEY: CollectionKey = CollectionKey::HalfTerms;

    fn is_empty(&self) -> bool {
        <[HalfTerm]>::is_empty(self)
    }

    fn initial(defaults: &Defaults) -> Self {
        default_half_terms(&defaults.half_terms)
    }

    fn to_rows(&self) -> Result<Vec<RemoteRow>, serde_json::Error> {
        self.iter()
            .map(|term| {
                Ok(
                    RemoteRow::new(RowKey::Id(term.id.clone()), serde_json::to_value(term)?)
                        .with_lesson_numbers(numbers_as_strings(term.lessons.iter().copied())),
                )
            })
            .collect()
    }

    fn from_rows(rows: Vec<RemoteRow>) -> Result<Self, serde_json::Error> {
        decode_all(rows)
    }

    /// Seeded half-terms come first in configured order; unknown ids keep their row order.
    fn arrange(&mut self, defaults: &Defaults) {
        self.sort_by_key(|term| {
            defaults
                .half_terms
                .iter()
                .position(|seed| seed.id == term.id)
                .unwrap_or(usize::MAX)
        });
    }
}

impl Collection for Vec<Unit> {
    const KEY: CollectionKey = CollectionKey::Units;

    fn is_empty(&self) -> bool {
        <[Unit]>::is_empty(self)
    }

    fn to_rows(&self) -> Result<Vec<RemoteRow>, serde_json::Error> {
        self.iter()
            .map(|unit| {
                Ok(
                    RemoteRow::new(RowKey::Id(unit.id.clone()), serde_json::to_value(unit)?)
                        .with_lesson_numbers(numbers_as_strings(
                            unit.lesson_numbers.iter().copied(),
                        )),
                )
            })
            .collect()
    }

    fn from_rows(rows: Vec<RemoteRow>) -> Result<Self, serde_json::Error> {
        decode_all(rows)
    }
}

impl Collection for StandardsMap {
    const KEY: CollectionKey = CollectionKey::Standards;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn to_rows(&self) -> Result<Vec<RemoteRow>, serde_json::Error> {
        self.iter()
            .map(|(number, standards)| {
                Ok(
                    RemoteRow::new(RowKey::Id(number.to_string()), serde_json::to_value(standards)?)
                        .with_lesson_numbers(vec![number.to_string()]),
                )
            })
            .collect()
    }

    fn from_rows(rows: Vec<RemoteRow>) -> Result<Self, serde_json::Error> {
        rows.into_iter()
            .map(|row| {
                let number = lesson_key(&row.key)?;
                let standards: Vec<String> = serde_json::from_value(row.data)?;
                Ok((number, standards))
            })
            .collect()
    }
}
