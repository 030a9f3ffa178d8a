use std::collections::BTreeMap;
use std::fmt;

use super::activity::Activity;
use super::half_term::HalfTerm;
use super::lesson::{LessonsData, StandardsMap};
use super::lesson_number::{is_dense, sorted_unique, LessonNumber};
use super::plan::LessonPlan;
use super::unit::Unit;

/// Every collection for one class, held in memory. Stores only ever see snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassState {
    pub class_id: String,
    pub activities: Vec<Activity>,
    pub lessons: LessonsData,
    pub plans: Vec<LessonPlan>,
    pub half_terms: Vec<HalfTerm>,
    pub units: Vec<Unit>,
    pub standards: StandardsMap,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Violation {
    NotDense(Vec<LessonNumber>),
    DuplicatePlanNumber(LessonNumber),
    PlanWithoutRecord(LessonNumber),
    MultipleHalfTerms(LessonNumber),
    ActivityNumberMismatch(LessonNumber),
    TotalTimeMismatch(LessonNumber),
    OrphanStandards(LessonNumber),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::NotDense(numbers) => write!(
                f,
                "lesson numbers are not a gapless sequence from 1: [{}]",
                numbers
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Violation::DuplicatePlanNumber(n) => {
                write!(f, "lesson {} is claimed by more than one lesson plan", n)
            }
            Violation::PlanWithoutRecord(n) => {
                write!(f, "lesson plan for lesson {} has no lesson record", n)
            }
            Violation::MultipleHalfTerms(n) => {
                write!(f, "lesson {} appears in more than one half-term", n)
            }
            Violation::ActivityNumberMismatch(n) => write!(
                f,
                "lesson {} contains activities labelled with another lesson number",
                n
            ),
            Violation::TotalTimeMismatch(n) => {
                write!(f, "lesson {} total time disagrees with its activities", n)
            }
            Violation::OrphanStandards(n) => {
                write!(f, "standards are recorded for missing lesson {}", n)
            }
        }
    }
}

impl Violation {
    /// A gap is one standing condition however the number set changes around it.
    fn already_in(&self, before: &[Violation]) -> bool {
        match self {
            Violation::NotDense(_) => before
                .iter()
                .any(|violation| matches!(violation, Violation::NotDense(_))),
            other => before.contains(other),
        }
    }
}

impl ClassState {
    pub fn empty(class_id: &str) -> Self {
        Self {
            class_id: class_id.to_string(),
            ..Self::default()
        }
    }

    /// Numbers of every lesson in the class, sorted numerically.
    pub fn lesson_numbers(&self) -> Vec<LessonNumber> {
        sorted_unique(
            self.lessons
                .keys()
                .copied()
                .chain(self.plans.iter().filter_map(|plan| plan.lesson_number)),
        )
    }

    pub fn next_lesson_number(&self) -> LessonNumber {
        self.lesson_numbers()
            .last()
            .map(|max| max.next())
            .unwrap_or(LessonNumber::FIRST)
    }

    pub fn half_term_of(&self, number: LessonNumber) -> Option<&HalfTerm> {
        self.half_terms.iter().find(|term| term.contains(number))
    }

    pub fn find_activity(&self, id: &str) -> Option<&Activity> {
        self.activities.iter().find(|activity| activity.matches_id(id))
    }

    pub fn find_plan(&self, id: &str) -> Option<&LessonPlan> {
        self.plans.iter().find(|plan| plan.id == id)
    }

    pub fn violations(&self) -> Vec<Violation> {
        let mut out = Vec::new();

        let numbers = self.lesson_numbers();
        if !is_dense(&numbers) {
            out.push(Violation::NotDense(numbers));
        }

        let mut plan_claims: BTreeMap<LessonNumber, usize> = BTreeMap::new();
        for number in self.plans.iter().filter_map(|plan| plan.lesson_number) {
            *plan_claims.entry(number).or_default() += 1;
        }
        for (number, count) in plan_claims {
            if count > 1 {
                out.push(Violation::DuplicatePlanNumber(number));
            }
            if !self.lessons.contains_key(&number) {
                out.push(Violation::PlanWithoutRecord(number));
            }
        }

        let mut term_claims: BTreeMap<LessonNumber, usize> = BTreeMap::new();
        for number in self.half_terms.iter().flat_map(|term| term.lessons.iter()) {
            *term_claims.entry(*number).or_default() += 1;
        }
        out.extend(
            term_claims
                .into_iter()
                .filter(|(_, count)| *count > 1)
                .map(|(number, _)| Violation::MultipleHalfTerms(number)),
        );

        for (number, record) in &self.lessons {
            if record
                .activities()
                .any(|activity| activity.lesson_number != Some(*number))
            {
                out.push(Violation::ActivityNumberMismatch(*number));
            }
            if record.total_time != record.computed_total() {
                out.push(Violation::TotalTimeMismatch(*number));
            }
        }

        out.extend(
            self.standards
                .keys()
                .filter(|number| !self.lessons.contains_key(number))
                .map(|number| Violation::OrphanStandards(*number)),
        );

        out.sort();
        out
    }

    /// Violations present in `self` that were not already present in `before`.
    pub fn new_violations(&self, before: &[Violation]) -> Vec<Violation> {
        self.violations()
            .into_iter()
            .filter(|violation| !violation.already_in(before))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{ClassState, Violation};
    use crate::domain::half_term::{HalfTerm, HalfTermSeed};
    use crate::domain::lesson::LessonRecord;
    use crate::domain::lesson_number::LessonNumber;

    fn n(value: u32) -> LessonNumber {
        LessonNumber::new(value).expect("lesson number")
    }

    fn term(id: &str, lessons: &[u32]) -> HalfTerm {
        let mut term = HalfTerm::from_seed(&HalfTermSeed {
            id: id.to_string(),
            name: id.to_string(),
        });
        term.lessons = lessons.iter().map(|value| n(*value)).collect();
        term
    }

    #[test]
    fn next_lesson_number_is_max_plus_one() {
        let mut state = ClassState::empty("c");
        assert_eq!(state.next_lesson_number(), n(1));
        state.lessons.insert(n(1), LessonRecord::default());
        state.lessons.insert(n(2), LessonRecord::default());
        assert_eq!(state.next_lesson_number(), n(3));
    }

    #[test]
    fn reports_gaps_and_double_assignment() {
        let mut state = ClassState::empty("c");
        state.lessons.insert(n(1), LessonRecord::default());
        state.lessons.insert(n(3), LessonRecord::default());
        state.half_terms = vec![term("A1", &[1]), term("A2", &[1, 3])];

        let violations = state.violations();
        assert!(violations.contains(&Violation::NotDense(vec![n(1), n(3)])));
        assert!(violations.contains(&Violation::MultipleHalfTerms(n(1))));
    }

    #[test]
    fn new_violations_ignores_pre_existing_ones() {
        let mut state = ClassState::empty("c");
        state.lessons.insert(n(2), LessonRecord::default());
        let before = state.violations();
        assert_eq!(before.len(), 1);
        assert!(state.new_violations(&before).is_empty());

        state.lessons.insert(n(3), LessonRecord::default());
        assert!(state.new_violations(&before).is_empty());

        state.half_terms = vec![term("A1", &[2]), term("A2", &[2])];
        assert_eq!(
            state.new_violations(&before),
            vec![Violation::MultipleHalfTerms(n(2))]
        );
    }
}
