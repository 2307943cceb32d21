//! Stage calculation.
//!
//! A stage-independent variable maps its value onto discrete stages. Two methods
//! exist:
//!
//! - **Ladder**: ascending thresholds. The stage is the first index whose threshold
//!   is not below the value, or one past the last threshold when the value exceeds
//!   them all.
//! - **Cycle**: mixed-radix digits. The value is first divided by the base unit
//!   `config[0]`; each further entry is the radix of one digit. With two entries the
//!   stage is a single digit; with more it is a tuple, most significant digit first.
//!
//! Stages are never cached: [`StageTrack::compute`] is a pure function of the value.

use serde::{Deserialize, Serialize};
use storyline_core::{StageDescription, StageValue};
use storyline_error::{VariableError, VariableErrorKind};

/// Stage method of a stage-independent variable.
///
/// Parsed from either the symbolic name or the value, in any case.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum StageMethod {
    /// Mixed-radix digits
    Cycle,
    /// Ascending thresholds
    Ladder,
}

/// Human-readable stage names.
///
/// Ladders use a flat list indexed by stage. Cycles use one list per digit; a
/// two-entry cycle may also use a flat list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StageDescriptions {
    /// One name per stage
    Flat(Vec<String>),
    /// One list of names per cycle digit
    Nested(Vec<Vec<String>>),
}

fn fallback_label(stage: i64) -> String {
    format!("stage {}", stage)
}

fn lookup(names: &[String], stage: i64) -> String {
    usize::try_from(stage)
        .ok()
        .and_then(|i| names.get(i))
        .cloned()
        .unwrap_or_else(|| fallback_label(stage))
}

/// Validated stage configuration of one variable.
#[derive(Debug, Clone, PartialEq)]
pub struct StageTrack {
    label: String,
    method: StageMethod,
    config: Vec<f64>,
    descriptions: StageDescriptions,
}

impl StageTrack {
    /// Validates and builds a stage track for the variable `name`.
    ///
    /// # Errors
    ///
    /// - ladders need at least one threshold and flat descriptions
    /// - cycles need at least two entries, a positive base unit and positive
    ///   integral radices; cycles with more than two entries need nested
    ///   descriptions
    pub fn new(
        name: &str,
        label: impl Into<String>,
        method: StageMethod,
        config: Vec<f64>,
        descriptions: StageDescriptions,
    ) -> Result<Self, VariableError> {
        let invalid = |message: String| {
            VariableError::new(VariableErrorKind::InvalidStageConfig {
                name: name.to_string(),
                message,
            })
        };

        if config.iter().any(|c| !c.is_finite()) {
            return Err(invalid("stage config entries must be finite".to_string()));
        }

        match method {
            StageMethod::Ladder => {
                if config.is_empty() {
                    return Err(invalid("ladder needs at least one threshold".to_string()));
                }
                if matches!(descriptions, StageDescriptions::Nested(_)) {
                    return Err(invalid("ladder descriptions must be a flat list".to_string()));
                }
            }
            StageMethod::Cycle => {
                if config.len() < 2 {
                    return Err(invalid(format!(
                        "cycle needs at least 2 entries, found {}",
                        config.len()
                    )));
                }
                if config[0] <= 0.0 {
                    return Err(invalid("cycle base unit must be positive".to_string()));
                }
                if let Some(bad) = config[1..].iter().find(|c| **c < 1.0 || c.fract() != 0.0) {
                    return Err(invalid(format!(
                        "cycle radix {} must be a positive integer",
                        bad
                    )));
                }
                if config.len() > 2 && matches!(descriptions, StageDescriptions::Flat(_)) {
                    return Err(invalid(
                        "cycles with more than two entries need one description list per digit"
                            .to_string(),
                    ));
                }
            }
        }

        Ok(Self {
            label: label.into(),
            method,
            config,
            descriptions,
        })
    }

    /// Human name of the stage track.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Stage method.
    pub fn method(&self) -> StageMethod {
        self.method
    }

    /// Whether [`compute`](Self::compute) yields a single index.
    pub fn is_scalar(&self) -> bool {
        match self.method {
            StageMethod::Ladder => true,
            StageMethod::Cycle => self.config.len() == 2,
        }
    }

    /// Stage value and description for `value`.
    ///
    /// # Examples
    ///
    /// ```
    /// use storyline_core::StageValue;
    /// use storyline_variables::{StageDescriptions, StageMethod, StageTrack};
    ///
    /// let ladder = StageTrack::new(
    ///     "trust",
    ///     "Trust",
    ///     StageMethod::Ladder,
    ///     vec![10.0, 20.0, 30.0],
    ///     StageDescriptions::Flat(vec!["wary".into(), "neutral".into()]),
    /// )
    /// .unwrap();
    ///
    /// assert_eq!(ladder.compute(25.0).0, StageValue::Single(2));
    /// assert_eq!(ladder.compute(35.0).0, StageValue::Single(3));
    /// assert_eq!(ladder.compute(5.0).1.to_string(), "wary");
    /// assert_eq!(ladder.compute(25.0).1.to_string(), "stage 2");
    /// ```
    pub fn compute(&self, value: f64) -> (StageValue, StageDescription) {
        match self.method {
            StageMethod::Ladder => self.ladder(value),
            StageMethod::Cycle => self.cycle(value),
        }
    }

    fn ladder(&self, value: f64) -> (StageValue, StageDescription) {
        let index = self
            .config
            .iter()
            .position(|threshold| value <= *threshold)
            .unwrap_or(self.config.len()) as i64;

        let description = match &self.descriptions {
            StageDescriptions::Flat(names) => lookup(names, index),
            StageDescriptions::Nested(_) => fallback_label(index),
        };
        (
            StageValue::Single(index),
            StageDescription::Single(description),
        )
    }

    fn cycle(&self, value: f64) -> (StageValue, StageDescription) {
        // digits[i] is the remainder at level i, least significant first.
        let mut quotient = (value / self.config[0]).floor() as i64;
        let mut digits = Vec::with_capacity(self.config.len() - 1);
        for radix in &self.config[1..] {
            let radix = *radix as i64;
            digits.push(quotient.rem_euclid(radix));
            quotient = quotient.div_euclid(radix);
        }

        let names: Vec<String> = digits
            .iter()
            .enumerate()
            .map(|(level, digit)| match &self.descriptions {
                StageDescriptions::Flat(names) if level == 0 => lookup(names, *digit),
                StageDescriptions::Nested(lists) => lists
                    .get(level)
                    .map(|names| lookup(names, *digit))
                    .unwrap_or_else(|| fallback_label(*digit)),
                StageDescriptions::Flat(_) => fallback_label(*digit),
            })
            .collect();

        if digits.len() == 1 {
            (
                StageValue::Single(digits[0]),
                StageDescription::Single(names[0].clone()),
            )
        } else {
            (
                StageValue::Tuple(digits.into_iter().rev().collect()),
                StageDescription::Tuple(names.into_iter().rev().collect()),
            )
        }
    }
}
