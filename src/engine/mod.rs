use std::collections::BTreeSet;
use std::error::Error;
use std::fmt;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::domain::class_state::{ClassState, Violation};
use crate::domain::lesson_number::LessonNumber;
use crate::domain::plan::InvalidStatusTransition;
use crate::persistence::CollectionKey;

mod half_terms;
mod library;
mod plans;
mod renumber;

pub use half_terms::AssignOutcome;
pub use library::{ActivityPatch, MergeSummary};
pub use renumber::{compute_mapping, Renumbering};

/// Result of one intent: its value plus the collections it modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change<T> {
    pub value: T,
    pub touched: BTreeSet<CollectionKey>,
}

impl<T> Change<T> {
    fn new(value: T, touched: impl IntoIterator<Item = CollectionKey>) -> Self {
        Self {
            value,
            touched: touched.into_iter().collect(),
        }
    }

    fn untouched(value: T) -> Self {
        Self {
            value,
            touched: BTreeSet::new(),
        }
    }
}

/// Owns the live collections of one class. Every intent takes `&mut self`, runs
/// against a scratch copy, and only replaces the live state when the class
/// invariants still hold afterwards.
pub struct Engine {
    state: ClassState,
    categories: Vec<String>,
    clock: fn() -> String,
}

impl Engine {
    pub fn new(state: ClassState, categories: Vec<String>) -> Self {
        Self {
            state,
            categories,
            clock: now_utc_rfc3339,
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: fn() -> String) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> &ClassState {
        &self.state
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn next_lesson_number(&self) -> LessonNumber {
        self.state.next_lesson_number()
    }

    pub fn lesson_numbers(&self) -> Vec<LessonNumber> {
        self.state.lesson_numbers()
    }

    fn transact<T>(
        &mut self,
        op: impl FnOnce(&mut Scratch<'_>) -> Result<Change<T>, ValidationError>,
    ) -> Result<Change<T>, ValidationError> {
        let before = self.state.violations();
        let mut scratch = Scratch {
            state: self.state.clone(),
            categories: &self.categories,
            now: (self.clock)(),
        };
        let change = op(&mut scratch)?;
        let introduced = scratch.state.new_violations(&before);
        if !introduced.is_empty() {
            tracing::error!(
                class = %self.state.class_id,
                violations = ?introduced,
                "intent rejected: it would break class invariants"
            );
            return Err(ValidationError::InvariantViolation(introduced));
        }
        if !change.touched.is_empty() {
            self.state = scratch.state;
        }
        Ok(change)
    }
}

/// Working copy handed to an intent.
struct Scratch<'a> {
    state: ClassState,
    categories: &'a [String],
    now: String,
}

pub fn now_utc_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .expect("RFC3339 formatting for UTC timestamp should never fail")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    MissingField(&'static str),
    LessonNotFound(LessonNumber),
    ActivityNotFound(String),
    PlanNotFound(String),
    UnitNotFound(String),
    UnknownHalfTerm(String),
    HalfTermConflict {
        lesson: LessonNumber,
        half_term_id: String,
        half_term_name: String,
        position: usize,
    },
    LessonGap {
        requested: LessonNumber,
        next: LessonNumber,
    },
    NotDense {
        missing: Vec<LessonNumber>,
    },
    InvalidTransition(InvalidStatusTransition),
    InvariantViolation(Vec<Violation>),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::MissingField(field) => write!(f, "'{}' is required", field),
            ValidationError::LessonNotFound(number) => write!(f, "lesson {} not found", number),
            ValidationError::ActivityNotFound(id) => write!(f, "activity '{}' not found", id),
            ValidationError::PlanNotFound(id) => write!(f, "lesson plan '{}' not found", id),
            ValidationError::UnitNotFound(id) => write!(f, "unit '{}' not found", id),
            ValidationError::UnknownHalfTerm(id) => write!(f, "unknown half-term '{}'", id),
            ValidationError::HalfTermConflict {
                lesson,
                half_term_id,
                half_term_name,
                position,
            } => write!(
                f,
                "lesson {} is already assigned to {} ({}) as lesson {} of that half-term; \
                 remove it there first",
                lesson, half_term_name, half_term_id, position
            ),
            ValidationError::LessonGap { requested, next } => write!(
                f,
                "lesson {} would leave a gap; the next lesson number is {}",
                requested, next
            ),
            ValidationError::NotDense { missing } => write!(
                f,
                "lesson numbers would not be sequential; missing lessons: {}",
                missing
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            ValidationError::InvalidTransition(err) => write!(f, "{}", err),
            ValidationError::InvariantViolation(violations) => write!(
                f,
                "internal consistency check failed, nothing was changed: {}",
                violations
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ")
            ),
        }
    }
}

impl Error for ValidationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ValidationError::InvalidTransition(err) => Some(err),
            _ => None,
        }
    }
}

impl From<InvalidStatusTransition> for ValidationError {
    fn from(value: InvalidStatusTransition) -> Self {
        ValidationError::InvalidTransition(value)
    }
}
