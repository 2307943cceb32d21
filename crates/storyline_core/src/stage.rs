//! Stage values derived from variable values.

use serde::{Deserialize, Serialize};

/// Rounds a variable value to one decimal place.
///
/// # Examples
///
/// ```
/// use storyline_core::round_one_decimal;
///
/// assert_eq!(round_one_decimal(2.26), 2.3);
/// assert_eq!(round_one_decimal(-0.04), 0.0);
/// ```
pub fn round_one_decimal(value: f64) -> f64 {
    let rounded = (value * 10.0).round() / 10.0;
    // Avoid persisting negative zero.
    if rounded == 0.0 { 0.0 } else { rounded }
}

/// Discrete stage of a stage-independent variable.
///
/// Ladder stages and two-entry cycles yield a single index; longer cycles yield one
/// digit per cycle level, most significant first.
///
/// # Examples
///
/// ```
/// use storyline_core::StageValue;
///
/// let single: StageValue = serde_json::from_str("3").unwrap();
/// assert_eq!(single, StageValue::Single(3));
/// assert_eq!(single.as_scalar(), Some(3));
///
/// let tuple = StageValue::Tuple(vec![1, 4]);
/// assert_eq!(tuple.parts(), vec![1, 4]);
/// assert_eq!(tuple.to_string(), "(1, 4)");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StageValue {
    /// One stage index
    Single(i64),
    /// One digit per cycle level
    Tuple(Vec<i64>),
}

impl StageValue {
    /// The scalar stage, if this is not a tuple.
    pub fn as_scalar(&self) -> Option<i64> {
        match self {
            StageValue::Single(value) => Some(*value),
            StageValue::Tuple(_) => None,
        }
    }

    /// Flattened digits.
    pub fn parts(&self) -> Vec<i64> {
        match self {
            StageValue::Single(value) => vec![*value],
            StageValue::Tuple(values) => values.clone(),
        }
    }
}

impl std::fmt::Display for StageValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageValue::Single(value) => write!(f, "{}", value),
            StageValue::Tuple(values) => {
                let joined = values
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "({})", joined)
            }
        }
    }
}

/// Human-readable description matching a [`StageValue`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StageDescription {
    /// Description of a single stage
    Single(String),
    /// One description per cycle digit
    Tuple(Vec<String>),
}

impl StageDescription {
    /// Flattened descriptions.
    pub fn parts(&self) -> Vec<String> {
        match self {
            StageDescription::Single(text) => vec![text.clone()],
            StageDescription::Tuple(texts) => texts.clone(),
        }
    }
}

impl std::fmt::Display for StageDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageDescription::Single(text) => write!(f, "{}", text),
            StageDescription::Tuple(texts) => write!(f, "({})", texts.join(", ")),
        }
    }
}

/// Stage change produced by a commit, persisted as `[old, new]`.
///
/// # Examples
///
/// ```
/// use storyline_core::{StageTransition, StageValue};
///
/// assert!(StageTransition::between(StageValue::Single(1), StageValue::Single(1)).is_none());
///
/// let change = StageTransition::between(StageValue::Single(1), StageValue::Single(2)).unwrap();
/// assert_eq!(serde_json::to_string(&change).unwrap(), "[1,2]");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StageTransition(StageValue, StageValue);

impl StageTransition {
    /// A transition, or `None` when the stage did not change.
    pub fn between(before: StageValue, after: StageValue) -> Option<Self> {
        if before == after {
            None
        } else {
            Some(Self(before, after))
        }
    }

    /// Stage before the commit.
    pub fn before(&self) -> &StageValue {
        &self.0
    }

    /// Stage after the commit.
    pub fn after(&self) -> &StageValue {
        &self.1
    }
}
