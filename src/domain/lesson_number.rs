use std::error::Error;
use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Dense, 1-based lesson identifier within a class. Persisted in its string
/// form (`"7"`) so cache blobs and remote rows keep their historical shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LessonNumber(u32);

impl LessonNumber {
    pub const FIRST: LessonNumber = LessonNumber(1);

    pub fn new(value: u32) -> Option<Self> {
        (value > 0).then_some(Self(value))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Parses loosely: blank or non-numeric input is "no lesson number".
    pub fn parse_optional(raw: &str) -> Option<Self> {
        raw.parse().ok()
    }
}

impl fmt::Display for LessonNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LessonNumber {
    type Err = ParseLessonNumberError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value
            .trim()
            .parse::<u32>()
            .ok()
            .and_then(LessonNumber::new)
            .ok_or_else(|| ParseLessonNumberError {
                value: value.to_string(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseLessonNumberError {
    value: String,
}

impl fmt::Display for ParseLessonNumberError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid lesson number '{}': expected a positive integer",
            self.value
        )
    }
}

impl Error for ParseLessonNumberError {}

impl Serialize for LessonNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LessonNumber {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(LessonNumberVisitor)
    }
}

struct LessonNumberVisitor;

impl Visitor<'_> for LessonNumberVisitor {
    type Value = LessonNumber;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a positive integer or its string form")
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
        u32::try_from(value)
            .ok()
            .and_then(LessonNumber::new)
            .ok_or_else(|| E::custom(format!("invalid lesson number {value}")))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
        u64::try_from(value)
            .map_err(|_| E::custom(format!("invalid lesson number {value}")))
            .and_then(|value| self.visit_u64(value))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
        value.parse().map_err(E::custom)
    }
}

/// Serde adapter for `Option<LessonNumber>` fields that historically store an
/// empty string instead of null.
pub mod blank_as_none {
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    use super::LessonNumber;

    pub fn serialize<S: Serializer>(
        value: &Option<LessonNumber>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(number) => serializer.collect_str(number),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<LessonNumber>, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Ok(match raw {
            Value::String(text) => LessonNumber::parse_optional(&text),
            Value::Number(number) => number
                .as_u64()
                .and_then(|value| u32::try_from(value).ok())
                .and_then(LessonNumber::new),
            _ => None,
        })
    }
}

/// Sorts numerically and removes duplicates.
pub fn sorted_unique(numbers: impl IntoIterator<Item = LessonNumber>) -> Vec<LessonNumber> {
    let mut out: Vec<LessonNumber> = numbers.into_iter().collect();
    out.sort_unstable();
    out.dedup();
    out
}

/// True when the numbers are exactly `{1..N}` for some `N >= 0`.
pub fn is_dense(numbers: &[LessonNumber]) -> bool {
    let sorted = sorted_unique(numbers.iter().copied());
    sorted.len() == numbers.len()
        && sorted
            .iter()
            .enumerate()
            .all(|(index, number)| number.get() as usize == index + 1)
}

#[cfg(test)]
mod tests {
    use super::{is_dense, LessonNumber};

    fn n(value: u32) -> LessonNumber {
        LessonNumber::new(value).expect("positive lesson number")
    }

    #[test]
    fn parses_trimmed_positive_integers_only() {
        assert_eq!(" 12 ".parse::<LessonNumber>().ok(), Some(n(12)));
        assert!("0".parse::<LessonNumber>().is_err());
        assert!("-3".parse::<LessonNumber>().is_err());
        assert!("".parse::<LessonNumber>().is_err());
        assert!("lesson 4".parse::<LessonNumber>().is_err());
        assert_eq!(LessonNumber::parse_optional(""), None);
    }

    #[test]
    fn serializes_as_string_and_reads_numbers_too() {
        let json = serde_json::to_string(&vec![n(1), n(10)]).expect("serialize");
        assert_eq!(json, r#"["1","10"]"#);
        let parsed: Vec<LessonNumber> =
            serde_json::from_str(r#"["2", 3]"#).expect("mixed forms should parse");
        assert_eq!(parsed, vec![n(2), n(3)]);
    }

    #[test]
    fn density_requires_gapless_sequence_from_one() {
        assert!(is_dense(&[]));
        assert!(is_dense(&[n(2), n(1), n(3)]));
        assert!(!is_dense(&[n(1), n(3)]));
        assert!(!is_dense(&[n(2)]));
        assert!(!is_dense(&[n(1), n(1)]));
    }
}
