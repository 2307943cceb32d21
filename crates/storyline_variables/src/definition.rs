//! Declarative variable definitions.
//!
//! Definitions are a JSON document: either a top-level array of variables or an
//! object with a `variables` array. Each entry is decoded into a strict
//! intermediate struct, then validated into a [`Variable`]. Loading is two-pass:
//! every variable is built first, then constraint references are checked against
//! the complete set.
//!
//! ```json
//! {
//!   "variables": [
//!     {
//!       "name": "trust",
//!       "var_type": "stage_independent",
//!       "update_type": "llm_fuzzy",
//!       "update_config": "tasks/trust.txt",
//!       "pre_update": false,
//!       "min_value": 0,
//!       "max_value": 100,
//!       "stage_label": "Trust",
//!       "stage_method": "ladder",
//!       "stage_config": [20, 50, 80],
//!       "stage_descriptions": ["wary", "cordial", "close", "devoted"]
//!     }
//!   ]
//! }
//! ```

use crate::{
    ConstraintSet, KeywordGroup, ResetKind, ResetRule, StageDescriptions, StageMethod, StageTrack,
    UpdateKind, UpdateRule, Variable, VariableKind,
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use storyline_core::Phase;
use storyline_error::{JsonError, StorylineResult, VariableError, VariableErrorKind};
use storyline_interface::{TaskDefinition, TaskSource};
use tracing::{debug, instrument, warn};

/// A number, or one of the strings `inf` / `-inf`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum JsonNumber {
    Number(f64),
    Text(String),
}

/// Inline keyword groups or a reference to a keyword table or task file.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum JsonUpdateConfig {
    Groups(BTreeMap<String, KeywordGroup>),
    Reference(String),
}

/// Inline reset keywords or a reference to a keyword table or task file.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum JsonResetConfig {
    Keywords { keywords: Vec<String> },
    Reference(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct JsonVariable {
    name: String,
    #[serde(default)]
    var_type: Option<String>,
    update_type: String,
    #[serde(default)]
    update_config: Option<JsonUpdateConfig>,
    #[serde(default = "default_pre_update")]
    pre_update: bool,
    #[serde(default)]
    initial_value: Option<JsonNumber>,
    #[serde(default)]
    min_value: Option<JsonNumber>,
    #[serde(default)]
    max_value: Option<JsonNumber>,
    #[serde(default)]
    reset_type: Option<String>,
    #[serde(default)]
    reset_config: Option<JsonResetConfig>,
    #[serde(default)]
    reset_value: Option<JsonNumber>,
    #[serde(default)]
    update_constraint: Option<Vec<Value>>,
    #[serde(default, alias = "relative_name")]
    stage_label: Option<String>,
    #[serde(default, alias = "relative_method")]
    stage_method: Option<String>,
    #[serde(default, alias = "relative_stage_config")]
    stage_config: Option<Vec<f64>>,
    #[serde(default, alias = "relative_description")]
    stage_descriptions: Option<StageDescriptions>,
    // Derived from the value on load.
    #[serde(default, rename = "relative_value")]
    _stage_value: Option<Value>,
    #[serde(default, rename = "relative_current_description")]
    _stage_description: Option<Value>,
}

fn default_pre_update() -> bool {
    true
}

fn definition_error(name: &str, message: impl Into<String>) -> VariableError {
    VariableError::new(VariableErrorKind::Definition {
        name: name.to_string(),
        message: message.into(),
    })
}

fn undefined_reference(name: &str, reference: String) -> VariableError {
    VariableError::new(VariableErrorKind::UndefinedReference {
        name: name.to_string(),
        reference,
    })
}

fn number(name: &str, field: &str, raw: Option<&JsonNumber>, default: f64) -> Result<f64, VariableError> {
    match raw {
        None => Ok(default),
        Some(JsonNumber::Number(n)) => Ok(*n),
        Some(JsonNumber::Text(text)) => match text.trim().to_ascii_lowercase().as_str() {
            "inf" | "+inf" | "infinity" => Ok(f64::INFINITY),
            "-inf" | "-infinity" => Ok(f64::NEG_INFINITY),
            other => other
                .parse::<f64>()
                .map_err(|_| definition_error(name, format!("{} is not a number: {:?}", field, text))),
        },
    }
}

/// Parses an enum spelled by symbolic name or value, in any case.
fn spelled<T: std::str::FromStr>(name: &str, field: &str, raw: &str) -> Result<T, VariableError> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| definition_error(name, format!("unknown {} {:?}", field, raw)))
}

/// Decodes and validates a definition document.
///
/// Task and keyword-table references are resolved through `source`.
///
/// # Errors
///
/// Fails on malformed JSON, unknown fields, invalid enum spellings, duplicate
/// names, invalid stage settings, malformed constraints, and references that do
/// not resolve.
#[instrument(skip_all, fields(length = json.len()))]
pub fn load_variables(json: &str, source: &dyn TaskSource) -> StorylineResult<Vec<Variable>> {
    let document: Value = serde_json::from_str(json)
        .map_err(|e| JsonError::new(format!("Failed to parse variable definitions: {}", e)))?;

    let entries = match document {
        Value::Array(entries) => entries,
        Value::Object(mut map) => match map.remove("variables") {
            Some(Value::Array(entries)) => entries,
            Some(_) => {
                return Err(definition_error("variables", "expected an array").into());
            }
            None => Vec::new(),
        },
        _ => {
            return Err(JsonError::new(
                "Variable definitions must be an array or an object with a 'variables' array",
            )
            .into());
        }
    };

    let mut variables: Vec<Variable> = Vec::with_capacity(entries.len());
    let mut constraints: Vec<Vec<Value>> = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        let raw: JsonVariable = serde_json::from_value(entry)
            .map_err(|e| definition_error(&format!("#{}", index), e.to_string()))?;
        if variables.iter().any(|v| v.name == raw.name) {
            return Err(VariableError::new(VariableErrorKind::DuplicateName(raw.name)).into());
        }
        constraints.push(raw.update_constraint.clone().unwrap_or_default());
        variables.push(build_variable(raw, source)?);
    }

    resolve_constraints(&mut variables, constraints)?;
    debug!(count = variables.len(), "Loaded variable definitions");
    Ok(variables)
}

fn build_variable(raw: JsonVariable, source: &dyn TaskSource) -> Result<Variable, VariableError> {
    let name = raw.name.trim().to_string();
    if name.is_empty() {
        return Err(definition_error(&raw.name, "name must not be empty"));
    }

    let kind = match raw.var_type.as_deref() {
        None => VariableKind::Record,
        Some(text) => spelled::<VariableKind>(&name, "var_type", text)?,
    };

    let min = number(&name, "min_value", raw.min_value.as_ref(), f64::NEG_INFINITY)?;
    let max = number(&name, "max_value", raw.max_value.as_ref(), f64::INFINITY)?;
    if min > max {
        return Err(definition_error(
            &name,
            format!("min_value {} exceeds max_value {}", min, max),
        ));
    }
    let initial = number(&name, "initial_value", raw.initial_value.as_ref(), 0.0)?;
    let reset_value = number(&name, "reset_value", raw.reset_value.as_ref(), 0.0)?;

    let update_kind = spelled::<UpdateKind>(&name, "update_type", &raw.update_type)?;
    let update = update_rule(&name, update_kind, raw.update_config.as_ref(), source)?;

    let reset = match raw.reset_type.as_deref() {
        None => {
            if raw.reset_config.is_some() {
                warn!(variable = %name, "reset_config ignored without reset_type");
            }
            None
        }
        Some(text) => {
            let reset_kind = spelled::<ResetKind>(&name, "reset_type", text)?;
            Some(reset_rule(&name, reset_kind, raw.reset_config.as_ref(), source)?)
        }
    };

    let stage = stage_track(&name, kind, &raw)?;

    let mut variable = Variable {
        name,
        initial,
        value: initial,
        min,
        max,
        phase: Phase::from_pre_update(raw.pre_update),
        update,
        reset,
        reset_value,
        constraints: ConstraintSet::default(),
        stage,
        stage_transition: None,
    };
    variable.initial = variable.normalize(initial);
    variable.value = variable.initial;
    Ok(variable)
}

fn stage_track(
    name: &str,
    kind: VariableKind,
    raw: &JsonVariable,
) -> Result<Option<StageTrack>, VariableError> {
    let has_stage_fields = raw.stage_label.is_some()
        || raw.stage_method.is_some()
        || raw.stage_config.is_some()
        || raw.stage_descriptions.is_some();

    if kind == VariableKind::Record {
        if has_stage_fields {
            return Err(definition_error(
                name,
                "stage fields require var_type stage_independent",
            ));
        }
        return Ok(None);
    }

    let missing = |field: &str| {
        VariableError::new(VariableErrorKind::MissingStageField {
            name: name.to_string(),
            field: field.to_string(),
        })
    };
    let label = raw.stage_label.clone().ok_or_else(|| missing("stage_label"))?;
    let method_text = raw.stage_method.as_deref().ok_or_else(|| missing("stage_method"))?;
    let method = spelled::<StageMethod>(name, "stage_method", method_text)?;
    let config = raw.stage_config.clone().ok_or_else(|| missing("stage_config"))?;
    let descriptions = raw
        .stage_descriptions
        .clone()
        .unwrap_or(StageDescriptions::Flat(Vec::new()));

    StageTrack::new(name, label, method, config, descriptions).map(Some)
}

/// Reads a JSON keyword table and returns the entry under `key`, if present.
fn table_entry(
    name: &str,
    reference: &str,
    key: &str,
    source: &dyn TaskSource,
) -> Result<Option<Value>, VariableError> {
    let text = source
        .load_text(reference)
        .map_err(|e| undefined_reference(name, format!("{}: {}", reference, e)))?;
    let mut table: serde_json::Map<String, Value> = serde_json::from_str(&text)
        .map_err(|e| definition_error(name, format!("keyword table {}: {}", reference, e)))?;
    let entry = table.remove(key);
    if entry.is_none() {
        warn!(variable = %name, reference, key, "Keyword table has no entry for variable");
    }
    Ok(entry)
}

fn task_definition(
    name: &str,
    reference: &str,
    source: &dyn TaskSource,
) -> Result<TaskDefinition, VariableError> {
    let task = source
        .load(reference)
        .map_err(|e| undefined_reference(name, format!("{}: {}", reference, e)))?;
    if task.name().is_empty() {
        return Err(definition_error(
            name,
            format!("task {} has no <name> tag", reference),
        ));
    }
    Ok(task)
}

fn is_table(reference: &str) -> bool {
    reference.to_ascii_lowercase().ends_with(".json")
}

fn update_rule(
    name: &str,
    kind: UpdateKind,
    config: Option<&JsonUpdateConfig>,
    source: &dyn TaskSource,
) -> Result<UpdateRule, VariableError> {
    let config = config.ok_or_else(|| definition_error(name, "update_config is required"))?;

    match kind {
        UpdateKind::KeywordCount | UpdateKind::KeywordAppear => {
            let groups: Vec<KeywordGroup> = match config {
                JsonUpdateConfig::Groups(groups) => groups.values().cloned().collect(),
                JsonUpdateConfig::Reference(reference) if is_table(reference) => {
                    let key = format!("{}_keywords", name);
                    match table_entry(name, reference, &key, source)? {
                        Some(entry) => serde_json::from_value::<BTreeMap<String, KeywordGroup>>(entry)
                            .map_err(|e| definition_error(name, format!("{}: {}", key, e)))?
                            .into_values()
                            .collect(),
                        None => Vec::new(),
                    }
                }
                JsonUpdateConfig::Reference(reference) => {
                    return Err(definition_error(
                        name,
                        format!("keyword rules need groups or a .json table, found {}", reference),
                    ));
                }
            };
            Ok(if kind == UpdateKind::KeywordCount {
                UpdateRule::KeywordCount(groups)
            } else {
                UpdateRule::KeywordAppear(groups)
            })
        }
        UpdateKind::LlmFuzzy => match config {
            JsonUpdateConfig::Reference(reference) => {
                task_definition(name, reference, source).map(UpdateRule::LlmFuzzy)
            }
            JsonUpdateConfig::Groups(_) => Err(definition_error(
                name,
                "llm_fuzzy update_config must reference a task file",
            )),
        },
    }
}

fn reset_rule(
    name: &str,
    kind: ResetKind,
    config: Option<&JsonResetConfig>,
    source: &dyn TaskSource,
) -> Result<ResetRule, VariableError> {
    let config = config.ok_or_else(|| definition_error(name, "reset_config is required"))?;

    match kind {
        ResetKind::Keyword => match config {
            JsonResetConfig::Keywords { keywords } => Ok(ResetRule::Keyword(keywords.clone())),
            JsonResetConfig::Reference(reference) if is_table(reference) => {
                let key = format!("{}_reset", name);
                #[derive(Deserialize)]
                struct ResetEntry {
                    #[serde(default)]
                    keywords: Vec<String>,
                }
                let keywords = match table_entry(name, reference, &key, source)? {
                    Some(entry) => {
                        serde_json::from_value::<ResetEntry>(entry)
                            .map_err(|e| definition_error(name, format!("{}: {}", key, e)))?
                            .keywords
                    }
                    None => Vec::new(),
                };
                Ok(ResetRule::Keyword(keywords))
            }
            JsonResetConfig::Reference(reference) => Err(definition_error(
                name,
                format!("keyword resets need keywords or a .json table, found {}", reference),
            )),
        },
        ResetKind::Llm => match config {
            JsonResetConfig::Reference(reference) => {
                task_definition(name, reference, source).map(ResetRule::Llm)
            }
            JsonResetConfig::Keywords { .. } => Err(definition_error(
                name,
                "llm reset_config must reference a task file",
            )),
        },
    }
}

/// Second pass: decode constraints now that every variable exists.
fn resolve_constraints(
    variables: &mut [Variable],
    raw: Vec<Vec<Value>>,
) -> Result<(), VariableError> {
    let scalar: HashMap<String, bool> = variables
        .iter()
        .map(|v| {
            (
                v.name.clone(),
                v.stage.as_ref().is_some_and(StageTrack::is_scalar),
            )
        })
        .collect();

    for (variable, raw) in variables.iter_mut().zip(raw) {
        let set = ConstraintSet::from_json(&variable.name, &raw)?;
        for reference in set.referenced_variables() {
            match scalar.get(reference) {
                None => {
                    return Err(undefined_reference(&variable.name, reference.to_string()));
                }
                Some(false) => {
                    return Err(VariableError::new(VariableErrorKind::ScalarStageRequired(
                        reference.to_string(),
                    )));
                }
                Some(true) => {}
            }
        }
        variable.constraints = set;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use storyline_storage::InlineTaskSource;

    fn load(document: Value, source: &InlineTaskSource) -> StorylineResult<Vec<Variable>> {
        load_variables(&document.to_string(), source)
    }

    #[test]
    fn test_accepts_array_and_wrapped_documents() {
        let entry = json!({
            "name": "anger",
            "update_type": "KEYWORD_APPEAR",
            "update_config": {"rage": {"keywords": ["hate"], "min_value": 1, "max_value": 2}},
            "min_value": 0,
            "max_value": "inf"
        });
        let source = InlineTaskSource::new();
        let a = load(json!([entry.clone()]), &source).unwrap();
        let b = load(json!({"variables": [entry]}), &source).unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].bounds(), (0.0, f64::INFINITY));
        assert_eq!(a[0].update_rule().kind(), UpdateKind::KeywordAppear);
        assert_eq!(a[0].phase(), Phase::Pre);
    }

    #[test]
    fn test_rejects_unknown_fields_and_duplicates() {
        let source = InlineTaskSource::new();
        let unknown = json!([{"name": "a", "update_type": "keyword_count", "update_config": {}, "colour": 1}]);
        assert!(load(unknown, &source).is_err());

        let entry = json!({"name": "a", "update_type": "keyword_count", "update_config": {}});
        assert!(load(json!([entry.clone(), entry]), &source).is_err());
    }

    #[test]
    fn test_references_resolve_through_source() {
        let source = InlineTaskSource::new()
            .with("tasks/trust.txt", "<name>trust_up</name><description>Rate trust</description>")
            .with("tasks/trust_reset.txt", "<name>trust_reset</name>")
            .with(
                "keywords.json",
                json!({
                    "mood_keywords": {"up": {"keywords": ["smile"], "min_value": 1, "max_value": 1}},
                    "mood_reset": {"keywords": ["sleep"]}
                })
                .to_string(),
            );
        let document = json!([
            {
                "name": "trust",
                "var_type": "STAGE_INDEPENDENT",
                "update_type": "llm_fuzzy",
                "update_config": "tasks/trust.txt",
                "reset_type": "LLM",
                "reset_config": "tasks/trust_reset.txt",
                "pre_update": false,
                "stage_label": "Trust",
                "stage_method": "Ladder",
                "stage_config": [20, 50]
            },
            {
                "name": "mood",
                "update_type": "keyword_count",
                "update_config": "keywords.json",
                "reset_type": "keyword",
                "reset_config": "keywords.json",
                "update_constraint": [[0, "trust"]]
            }
        ]);

        let variables = load(document, &source).unwrap();
        assert_eq!(variables[0].kind(), VariableKind::StageIndependent);
        assert_eq!(variables[0].phase(), Phase::Post);
        assert!(matches!(variables[0].update_rule(), UpdateRule::LlmFuzzy(t) if t.name() == "trust_up"));
        assert!(matches!(variables[1].update_rule(), UpdateRule::KeywordCount(g) if g.len() == 1));
        assert_eq!(
            variables[1].reset_rule(),
            Some(&ResetRule::Keyword(vec!["sleep".to_string()]))
        );
        assert!(!variables[1].constraints().is_empty());
    }

    #[test]
    fn test_missing_references_fail() {
        let source = InlineTaskSource::new();
        let document = json!([{"name": "a", "update_type": "llm_fuzzy", "update_config": "missing.txt"}]);
        assert!(load(document, &source).is_err());
    }

    #[test]
    fn test_constraint_targets_are_validated() {
        let source = InlineTaskSource::new();
        let record_target = json!([
            {"name": "a", "update_type": "keyword_count", "update_config": {}},
            {"name": "b", "update_type": "keyword_count", "update_config": {}, "update_constraint": [[0, "a"]]}
        ]);
        assert!(load(record_target, &source).is_err());

        let undefined = json!([
            {"name": "b", "update_type": "keyword_count", "update_config": {}, "update_constraint": [[0, "ghost"]]}
        ]);
        assert!(load(undefined, &source).is_err());

        let tuple_target = json!([
            {
                "name": "clock",
                "var_type": "stage_independent",
                "update_type": "keyword_count",
                "update_config": {},
                "stage_label": "Time",
                "stage_method": "cycle",
                "stage_config": [1, 24, 7],
                "stage_descriptions": [[], []]
            },
            {"name": "b", "update_type": "keyword_count", "update_config": {}, "update_constraint": [[0, "clock"]]}
        ]);
        assert!(load(tuple_target, &source).is_err());
    }

    #[test]
    fn test_stage_fields_only_on_stage_variables() {
        let source = InlineTaskSource::new();
        let stray = json!([{
            "name": "a", "update_type": "keyword_count", "update_config": {}, "stage_method": "ladder"
        }]);
        assert!(load(stray, &source).is_err());

        let missing = json!([{
            "name": "a", "var_type": "stage_independent", "update_type": "keyword_count",
            "update_config": {}, "stage_label": "A", "stage_method": "ladder"
        }]);
        assert!(load(missing, &source).is_err());
    }

    #[test]
    fn test_initial_value_is_clamped() {
        let source = InlineTaskSource::new();
        let document = json!([{
            "name": "a", "update_type": "keyword_count", "update_config": {},
            "min_value": 0, "max_value": 10, "initial_value": 12.345
        }]);
        let variables = load(document, &source).unwrap();
        assert_eq!(variables[0].value(), 10.0);
    }

    #[test]
    fn test_accepts_relative_spellings_and_null_constraint() {
        let source = InlineTaskSource::new();
        let document = json!([{
            "name": "anger",
            "var_type": "stage_independent",
            "update_type": "keyword_appear",
            "update_config": {},
            "min_value": 0,
            "max_value": 20,
            "update_constraint": null,
            "relative_name": "Anger",
            "relative_method": "ladder",
            "relative_stage_config": [3, 6],
            "relative_value": 0,
            "relative_description": ["calm", "irritated", "furious"],
            "relative_current_description": "calm"
        }]);
        let variables = load(document, &source).unwrap();
        let track = variables[0].stage_track().unwrap();
        assert_eq!(track.label(), "Anger");
        assert_eq!(track.method(), StageMethod::Ladder);
        assert!(variables[0].constraints().is_empty());
        assert_eq!(
            variables[0].stage_description(),
            Some(storyline_core::StageDescription::Single("calm".to_string()))
        );
    }
}
