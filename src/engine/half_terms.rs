use serde::Serialize;

use crate::domain::lesson_number::LessonNumber;
use crate::persistence::CollectionKey;

use super::{Change, Engine, Scratch, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignOutcome {
    Assigned,
    AlreadyAssigned,
}

impl Engine {
    pub fn assign_half_term(
        &mut self,
        number: LessonNumber,
        half_term_id: &str,
    ) -> Result<Change<AssignOutcome>, ValidationError> {
        self.transact(|scratch| scratch.assign_half_term(number, half_term_id))
    }

    /// Removes the lesson from whichever half-term holds it; returns that half-term's id.
    pub fn unassign_half_term(
        &mut self,
        number: LessonNumber,
    ) -> Result<Change<Option<String>>, ValidationError> {
        self.transact(|scratch| {
            let Some(term) = scratch
                .state
                .half_terms
                .iter_mut()
                .find(|term| term.contains(number))
            else {
                return Ok(Change::untouched(None));
            };
            term.remove(number);
            Ok(Change::new(Some(term.id.clone()), [CollectionKey::HalfTerms]))
        })
    }

    pub fn set_half_term_complete(
        &mut self,
        half_term_id: &str,
        complete: bool,
    ) -> Result<Change<()>, ValidationError> {
        self.transact(|scratch| {
            let term = scratch
                .state
                .half_terms
                .iter_mut()
                .find(|term| term.id.eq_ignore_ascii_case(half_term_id))
                .ok_or_else(|| ValidationError::UnknownHalfTerm(half_term_id.to_string()))?;
            if term.is_complete == complete {
                return Ok(Change::untouched(()));
            }
            term.is_complete = complete;
            Ok(Change::new((), [CollectionKey::HalfTerms]))
        })
    }
}

impl Scratch<'_> {
    fn assign_half_term(
        &mut self,
        number: LessonNumber,
        half_term_id: &str,
    ) -> Result<Change<AssignOutcome>, ValidationError> {
        let target = self
            .state
            .half_terms
            .iter()
            .position(|term| term.id.eq_ignore_ascii_case(half_term_id))
            .ok_or_else(|| ValidationError::UnknownHalfTerm(half_term_id.to_string()))?;
        if let Some((index, holder)) = self
            .state
            .half_terms
            .iter()
            .enumerate()
            .find(|(_, term)| term.contains(number))
        {
            if index == target {
                return Ok(Change::untouched(AssignOutcome::AlreadyAssigned));
            }
            return Err(ValidationError::HalfTermConflict {
                lesson: number,
                half_term_id: holder.id.clone(),
                half_term_name: holder.name.clone(),
                position: holder.position_of(number).unwrap_or_default(),
            });
        }

        if !self.state.lesson_numbers().contains(&number) {
            return Err(ValidationError::LessonNotFound(number));
        }
        self.state.half_terms[target].lessons.push(number);
        Ok(Change::new(AssignOutcome::Assigned, [CollectionKey::HalfTerms]))
    }
}
