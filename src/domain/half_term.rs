use serde::{Deserialize, Serialize};

use super::lesson_number::{sorted_unique, LessonNumber};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HalfTerm {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub lessons: Vec<LessonNumber>,
    #[serde(default)]
    pub is_complete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HalfTermSeed {
    pub id: String,
    pub name: String,
}

impl HalfTerm {
    pub fn from_seed(seed: &HalfTermSeed) -> Self {
        Self {
            id: seed.id.clone(),
            name: seed.name.clone(),
            lessons: Vec::new(),
            is_complete: false,
        }
    }

    pub fn contains(&self, number: LessonNumber) -> bool {
        self.lessons.contains(&number)
    }

    /// 1-based position among this half-term's lessons sorted numerically.
    /// Derived on every call; never stored.
    pub fn position_of(&self, number: LessonNumber) -> Option<usize> {
        sorted_unique(self.lessons.iter().copied())
            .iter()
            .position(|candidate| *candidate == number)
            .map(|index| index + 1)
    }

    pub fn remove(&mut self, number: LessonNumber) -> bool {
        let before = self.lessons.len();
        self.lessons.retain(|candidate| *candidate != number);
        before != self.lessons.len()
    }
}

pub fn default_half_terms(seeds: &[HalfTermSeed]) -> Vec<HalfTerm> {
    seeds.iter().map(HalfTerm::from_seed).collect()
}

#[cfg(test)]
mod tests {
    use super::{HalfTerm, HalfTermSeed};
    use crate::domain::lesson_number::LessonNumber;

    fn n(value: u32) -> LessonNumber {
        LessonNumber::new(value).expect("lesson number")
    }

    #[test]
    fn position_is_rank_among_sorted_lessons_not_raw_number() {
        let mut term = HalfTerm::from_seed(&HalfTermSeed {
            id: "A1".to_string(),
            name: "Autumn 1".to_string(),
        });
        term.lessons = vec![n(9), n(3), n(7)];
        assert_eq!(term.position_of(n(3)), Some(1));
        assert_eq!(term.position_of(n(7)), Some(2));
        assert_eq!(term.position_of(n(9)), Some(3));
        assert_eq!(term.position_of(n(4)), None);

        assert!(term.remove(n(3)));
        assert_eq!(term.position_of(n(7)), Some(1));
        assert!(!term.remove(n(3)));
    }
}
