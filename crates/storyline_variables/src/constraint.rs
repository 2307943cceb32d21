//! Update constraints.
//!
//! A constraint set gates a variable's update rule on the stages of other
//! variables. Top-level elements are ANDed; an OR group holds when any of its
//! conditions holds. All comparisons are strict.
//!
//! Declarative form (JSON):
//!
//! ```json
//! [
//!   [1, "trust", 3],
//!   {"or": [["season", 2], [0, "mood"]]}
//! ]
//! ```
//!
//! Bounds are numbers or the strings `"inf"` / `"-inf"`.

use serde_json::Value;
use storyline_error::{StorylineResult, VariableError, VariableErrorKind};

/// Looks up the scalar stage of a variable by name.
pub trait StageLookup {
    /// Scalar stage of `name`, or `None` if the variable is unknown or has no
    /// scalar stage.
    fn scalar_stage(&self, name: &str) -> Option<i64>;
}

/// A single range condition on another variable's stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `lower < stage < upper`
    Between {
        /// Exclusive lower bound
        lower: f64,
        /// Referenced variable
        variable: String,
        /// Exclusive upper bound
        upper: f64,
    },
    /// `lower < stage`
    Above {
        /// Exclusive lower bound
        lower: f64,
        /// Referenced variable
        variable: String,
    },
    /// `stage < upper`
    Below {
        /// Referenced variable
        variable: String,
        /// Exclusive upper bound
        upper: f64,
    },
}

impl Condition {
    /// Name of the referenced variable.
    pub fn variable(&self) -> &str {
        match self {
            Condition::Between { variable, .. }
            | Condition::Above { variable, .. }
            | Condition::Below { variable, .. } => variable,
        }
    }

    fn holds(&self, stage: i64) -> bool {
        let stage = stage as f64;
        match self {
            Condition::Between { lower, upper, .. } => *lower < stage && stage < *upper,
            Condition::Above { lower, .. } => *lower < stage,
            Condition::Below { upper, .. } => stage < *upper,
        }
    }
}

/// One top-level constraint element.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintElement {
    /// Must hold
    All(Condition),
    /// At least one must hold
    Any(Vec<Condition>),
}

/// Ordered, ANDed constraint elements. Empty means unconstrained.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConstraintSet {
    elements: Vec<ConstraintElement>,
}

impl ConstraintSet {
    /// Builds a set from validated elements.
    pub fn new(elements: Vec<ConstraintElement>) -> Self {
        Self { elements }
    }

    /// Whether the set has no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Every variable name referenced by the set.
    pub fn referenced_variables(&self) -> impl Iterator<Item = &str> {
        self.elements.iter().flat_map(|element| {
            let conditions: Vec<&Condition> = match element {
                ConstraintElement::All(condition) => vec![condition],
                ConstraintElement::Any(group) => group.iter().collect(),
            };
            conditions.into_iter().map(Condition::variable)
        })
    }

    /// Evaluates the set against current stages.
    ///
    /// # Errors
    ///
    /// Fails if a referenced variable has no scalar stage in `lookup`.
    pub fn satisfied(&self, lookup: &impl StageLookup) -> StorylineResult<bool> {
        let check = |condition: &Condition| -> StorylineResult<bool> {
            let stage = lookup.scalar_stage(condition.variable()).ok_or_else(|| {
                VariableError::new(VariableErrorKind::ScalarStageRequired(
                    condition.variable().to_string(),
                ))
            })?;
            Ok(condition.holds(stage))
        };

        for element in &self.elements {
            let holds = match element {
                ConstraintElement::All(condition) => check(condition)?,
                ConstraintElement::Any(group) => {
                    let mut any = false;
                    for condition in group {
                        if check(condition)? {
                            any = true;
                            break;
                        }
                    }
                    any
                }
            };
            if !holds {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Decodes the declarative form for the variable `owner`.
    ///
    /// # Errors
    ///
    /// Fails on any element that is not a 2- or 3-element array or an `{"or": [...]}`
    /// object of such arrays.
    pub fn from_json(owner: &str, raw: &[Value]) -> Result<Self, VariableError> {
        let elements = raw
            .iter()
            .map(|element| match element {
                Value::Object(map) => {
                    let group = map.get("or").and_then(Value::as_array).ok_or_else(|| {
                        malformed(owner, format!("expected {{\"or\": [...]}}, found {}", element))
                    })?;
                    if map.len() != 1 {
                        return Err(malformed(owner, format!("unexpected keys in {}", element)));
                    }
                    let conditions = group
                        .iter()
                        .map(|inner| parse_condition(owner, inner))
                        .collect::<Result<Vec<_>, _>>()?;
                    if conditions.is_empty() {
                        return Err(malformed(owner, "empty or-group".to_string()));
                    }
                    Ok(ConstraintElement::Any(conditions))
                }
                other => parse_condition(owner, other).map(ConstraintElement::All),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { elements })
    }
}

fn malformed(owner: &str, message: String) -> VariableError {
    VariableError::new(VariableErrorKind::MalformedConstraint {
        name: owner.to_string(),
        message,
    })
}

/// Parses a bound: a number or an infinity keyword.
fn parse_bound(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "inf" | "+inf" | "infinity" => Some(f64::INFINITY),
            "-inf" | "-infinity" => Some(f64::NEG_INFINITY),
            _ => None,
        },
        _ => None,
    }
}

/// A variable reference: a string that is not a bound keyword.
fn parse_name(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if parse_bound(value).is_none() && !s.trim().is_empty() => {
            Some(s.clone())
        }
        _ => None,
    }
}

fn parse_condition(owner: &str, value: &Value) -> Result<Condition, VariableError> {
    let items = value
        .as_array()
        .ok_or_else(|| malformed(owner, format!("expected an array, found {}", value)))?;

    match items.as_slice() {
        [lower, variable, upper] => {
            match (parse_bound(lower), parse_name(variable), parse_bound(upper)) {
                (Some(lower), Some(variable), Some(upper)) => Ok(Condition::Between {
                    lower,
                    variable,
                    upper,
                }),
                _ => Err(malformed(
                    owner,
                    format!("expected [lower, \"variable\", upper], found {}", value),
                )),
            }
        }
        [first, second] => match (parse_name(first), parse_name(second)) {
            (None, Some(variable)) => parse_bound(first)
                .map(|lower| Condition::Above { lower, variable })
                .ok_or_else(|| malformed(owner, format!("invalid lower bound in {}", value))),
            (Some(variable), None) => parse_bound(second)
                .map(|upper| Condition::Below { variable, upper })
                .ok_or_else(|| malformed(owner, format!("invalid upper bound in {}", value))),
            _ => Err(malformed(
                owner,
                format!(
                    "expected [lower, \"variable\"] or [\"variable\", upper], found {}",
                    value
                ),
            )),
        },
        _ => Err(malformed(
            owner,
            format!("condition must have 2 or 3 elements, found {}", value),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    struct Stages(HashMap<&'static str, i64>);

    impl StageLookup for Stages {
        fn scalar_stage(&self, name: &str) -> Option<i64> {
            self.0.get(name).copied()
        }
    }

    fn set(raw: Value) -> ConstraintSet {
        let items = raw.as_array().cloned().unwrap_or_default();
        ConstraintSet::from_json("owner", &items).unwrap()
    }

    #[test]
    fn test_empty_set_is_satisfied() {
        let stages = Stages(HashMap::new());
        assert!(ConstraintSet::default().satisfied(&stages).unwrap());
    }

    #[test]
    fn test_between_is_strict() {
        let constraint = set(json!([[1, "trust", 3]]));
        let at = |stage| Stages(HashMap::from([("trust", stage)]));
        assert!(constraint.satisfied(&at(2)).unwrap());
        assert!(!constraint.satisfied(&at(3)).unwrap());
        assert!(!constraint.satisfied(&at(1)).unwrap());
    }

    #[test]
    fn test_or_group_with_one_true_branch() {
        let constraint = set(json!([{"or": [["trust", 0], [4, "trust"], [1, "season", 5]]}]));
        let stages = Stages(HashMap::from([("trust", 2), ("season", 3)]));
        assert!(constraint.satisfied(&stages).unwrap());

        let stages = Stages(HashMap::from([("trust", 2), ("season", 7)]));
        assert!(!constraint.satisfied(&stages).unwrap());
    }

    #[test]
    fn test_elements_are_anded() {
        let constraint = set(json!([[0, "trust"], ["season", 2]]));
        let stages = Stages(HashMap::from([("trust", 1), ("season", 1)]));
        assert!(constraint.satisfied(&stages).unwrap());
        let stages = Stages(HashMap::from([("trust", 1), ("season", 2)]));
        assert!(!constraint.satisfied(&stages).unwrap());
    }

    #[test]
    fn test_infinite_bounds() {
        let constraint = set(json!([["-inf", "trust", "inf"]]));
        let stages = Stages(HashMap::from([("trust", -40)]));
        assert!(constraint.satisfied(&stages).unwrap());
        assert_eq!(constraint.referenced_variables().collect::<Vec<_>>(), vec!["trust"]);
    }

    #[test]
    fn test_malformed_shapes_rejected() {
        for raw in [
            json!([[1]]),
            json!([[1, 2, 3, 4]]),
            json!([[1, 2]]),
            json!([["a", "b"]]),
            json!([{"and": [[1, "a"]]}]),
            json!([{"or": []}]),
            json!(["trust"]),
        ] {
            let items = raw.as_array().cloned().unwrap_or_default();
            assert!(ConstraintSet::from_json("owner", &items).is_err(), "{}", raw);
        }
    }

    #[test]
    fn test_unknown_reference_is_an_error() {
        let constraint = set(json!([[0, "ghost"]]));
        assert!(constraint.satisfied(&Stages(HashMap::new())).is_err());
    }
}
