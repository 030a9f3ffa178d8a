use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::lesson_number::LessonNumber;
use crate::persistence::CollectionKey;

use super::{Change, Engine, Scratch, ValidationError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Renumbering {
    pub deleted: Option<LessonNumber>,
    /// `(old, new)` for every lesson whose number changed.
    pub mapping: Vec<(LessonNumber, LessonNumber)>,
}

/// Walks the remaining numbers in numeric order and hands out `1..M`, keeping
/// only the pairs that actually move.
pub fn compute_mapping(
    numbers: &[LessonNumber],
    deleted: LessonNumber,
) -> Vec<(LessonNumber, LessonNumber)> {
    let mut remaining: Vec<LessonNumber> = numbers
        .iter()
        .copied()
        .filter(|number| *number != deleted)
        .collect();
    remaining.sort_unstable();
    remaining.dedup();

    remaining
        .into_iter()
        .zip(1u32..)
        .filter_map(|(old, index)| {
            let new = LessonNumber::new(index)?;
            (old != new).then_some((old, new))
        })
        .collect()
}

impl Engine {
    pub fn delete_lesson(
        &mut self,
        number: LessonNumber,
    ) -> Result<Change<Renumbering>, ValidationError> {
        let change = self.transact(|scratch| scratch.delete_lesson(number))?;
        tracing::info!(
            class = %self.state.class_id,
            deleted = %number,
            moved = change.value.mapping.len(),
            "lesson deleted and later lessons renumbered"
        );
        Ok(change)
    }

    /// Deleting a numbered plan deletes its lesson; an unnumbered plan is simply removed.
    pub fn delete_plan(&mut self, plan_id: &str) -> Result<Change<Renumbering>, ValidationError> {
        self.transact(|scratch| scratch.delete_plan(plan_id))
    }
}

impl Scratch<'_> {
    pub(super) fn delete_lesson(
        &mut self,
        deleted: LessonNumber,
    ) -> Result<Change<Renumbering>, ValidationError> {
        let numbers = self.state.lesson_numbers();
        if !numbers.contains(&deleted) {
            return Err(ValidationError::LessonNotFound(deleted));
        }

        self.state
            .plans
            .retain(|plan| plan.lesson_number != Some(deleted));
        let mapping = compute_mapping(&numbers, deleted);
        self.apply_mapping(deleted, &mapping);

        Ok(Change::new(
            Renumbering {
                deleted: Some(deleted),
                mapping,
            },
            CollectionKey::LESSON_CASCADE,
        ))
    }

    pub(super) fn delete_plan(
        &mut self,
        plan_id: &str,
    ) -> Result<Change<Renumbering>, ValidationError> {
        let number = self
            .state
            .find_plan(plan_id)
            .ok_or_else(|| ValidationError::PlanNotFound(plan_id.to_string()))?
            .lesson_number;

        match number {
            Some(number) => self.delete_lesson(number),
            None => {
                self.state.plans.retain(|plan| plan.id != plan_id);
                Ok(Change::new(
                    Renumbering {
                        deleted: None,
                        mapping: Vec::new(),
                    },
                    [CollectionKey::LessonPlans],
                ))
            }
        }
    }

    fn apply_mapping(&mut self, deleted: LessonNumber, mapping: &[(LessonNumber, LessonNumber)]) {
        let lookup: BTreeMap<LessonNumber, LessonNumber> = mapping.iter().copied().collect();
        let relocate = |number: LessonNumber| lookup.get(&number).copied().unwrap_or(number);

        self.state.lessons.remove(&deleted);
        let moved: Vec<_> = mapping
            .iter()
            .filter_map(|(old, new)| self.state.lessons.remove(old).map(|record| (*new, record)))
            .collect();
        for (new, mut record) in moved {
            record.relabel(new);
            self.state.lessons.insert(new, record);
        }

        self.state.standards.remove(&deleted);
        let moved: Vec<_> = mapping
            .iter()
            .filter_map(|(old, new)| self.state.standards.remove(old).map(|entry| (*new, entry)))
            .collect();
        self.state.standards.extend(moved);

        for plan in &mut self.state.plans {
            if let Some(number) = plan.lesson_number {
                plan.set_lesson_number(Some(relocate(number)));
            }
        }

        for term in &mut self.state.half_terms {
            term.remove(deleted);
            for number in &mut term.lessons {
                *number = relocate(*number);
            }
        }

        for unit in &mut self.state.units {
            unit.lesson_numbers.retain(|number| *number != deleted);
            for number in &mut unit.lesson_numbers {
                *number = relocate(*number);
            }
        }

        for activity in &mut self.state.activities {
            match activity.lesson_number {
                Some(number) if number == deleted => activity.lesson_number = None,
                Some(number) => activity.lesson_number = Some(relocate(number)),
                None => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::compute_mapping;
    use crate::domain::lesson_number::LessonNumber;

    fn n(value: u32) -> LessonNumber {
        LessonNumber::new(value).expect("lesson number")
    }

    fn numbers(values: &[u32]) -> Vec<LessonNumber> {
        values.iter().map(|value| n(*value)).collect()
    }

    #[test]
    fn only_lessons_after_the_deleted_one_move() {
        let mapping = compute_mapping(&numbers(&[1, 2, 3, 4, 5]), n(3));
        assert_eq!(mapping, vec![(n(4), n(3)), (n(5), n(4))]);
    }

    #[test]
    fn deleting_the_last_lesson_moves_nothing() {
        assert!(compute_mapping(&numbers(&[1, 2, 3]), n(3)).is_empty());
    }

    #[test]
    fn unsorted_input_is_walked_numerically() {
        let mapping = compute_mapping(&numbers(&[10, 2, 1, 9, 3, 4, 5, 6, 7, 8]), n(1));
        assert_eq!(mapping.len(), 9);
        assert_eq!(mapping[0], (n(2), n(1)));
        assert_eq!(mapping[8], (n(10), n(9)));
    }
}
