//! Positional lore injection.
//!
//! Lore entries are configured per prompt position. An entry activates when one
//! of its keywords occurs in the history summary. Simple entries contribute fixed
//! text. Bound entries follow the stages of stage-independent variables: their
//! stage digits select one text per binding part, the variables' stage
//! descriptions fill `{element_N}` markers, and a stage transition from the last
//! commit produces a change hint for the narrator.

use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use storyline_core::{BindingPart, BoundLore, LoreConfig, PositionLore, SimpleLore};
use storyline_error::{StorylineResult, WorkflowError, WorkflowErrorKind};
use storyline_variables::Registry;
use tracing::{debug, instrument, warn};

/// Rendered lore for one narrative prompt.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoreInjection {
    /// Content for `{position_0}`
    pub position_0: String,
    /// Content for `{position_1}`
    pub position_1: String,
    /// Change hints for `{temporary_hint}`
    pub temporary_hint: String,
}

/// Renders both lore positions against the history summary.
///
/// # Errors
///
/// Fails when a bound entry references `{element_N}` beyond the descriptions of
/// its variables.
#[instrument(skip_all, fields(history = history.len()))]
pub fn inject_lore(
    lore: &LoreConfig,
    registry: &Registry,
    history: &str,
) -> StorylineResult<LoreInjection> {
    let (content_0, mut hints) = render_position(&lore.position_0, registry, history)?;
    let (content_1, hints_1) = render_position(&lore.position_1, registry, history)?;
    hints.extend(hints_1);

    debug!(
        position_0 = content_0.len(),
        position_1 = content_1.len(),
        hints = hints.len(),
        "Rendered lore"
    );
    Ok(LoreInjection {
        position_0: content_0.join("\n\n"),
        position_1: content_1.join("\n\n"),
        temporary_hint: hints.join("\n\n"),
    })
}

enum Entry<'a> {
    Simple(&'a SimpleLore),
    Bound(&'a BoundLore),
}

fn activated(keywords: &[String], history: &str) -> bool {
    keywords
        .iter()
        .any(|keyword| !keyword.is_empty() && history.contains(keyword.as_str()))
}

/// Entries by ascending depth; within a depth simple entries come before bound
/// ones, each sorted by key.
fn render_position(
    position: &PositionLore,
    registry: &Registry,
    history: &str,
) -> StorylineResult<(Vec<String>, Vec<String>)> {
    let mut entries: Vec<(u32, u8, &str, Entry<'_>)> = Vec::new();
    entries.extend(
        position
            .simple
            .iter()
            .map(|(key, entry)| (entry.depth, 0, key.as_str(), Entry::Simple(entry))),
    );
    entries.extend(
        position
            .bound
            .iter()
            .map(|(key, entry)| (entry.depth, 1, key.as_str(), Entry::Bound(entry))),
    );
    entries.sort_by_key(|(depth, rank, _, _)| (*depth, *rank));

    let mut content = Vec::new();
    let mut hints = Vec::new();
    for (_, _, key, entry) in entries {
        match entry {
            Entry::Simple(simple) => {
                if !activated(&simple.keywords, history) {
                    continue;
                }
                let text = simple.content.trim();
                if !text.is_empty() {
                    debug!(entry = key, "Simple lore activated");
                    content.push(text.to_string());
                }
            }
            Entry::Bound(bound) => {
                if !activated(&bound.keywords, history) {
                    continue;
                }
                if let Some(rendered) = render_bound(key, bound, registry)? {
                    debug!(entry = key, hint = rendered.hint.is_some(), "Bound lore activated");
                    content.push(rendered.content);
                    hints.extend(rendered.hint);
                }
            }
        }
    }
    Ok((content, hints))
}

struct RenderedBound {
    content: String,
    hint: Option<String>,
}

fn part_indices(part: &BindingPart) -> Vec<usize> {
    match part {
        BindingPart::Index(index) => vec![*index],
        BindingPart::Group(indices) => indices.clone(),
    }
}

fn stage_key(part: &BindingPart, digits: &[i64]) -> Option<String> {
    let selected: Vec<String> = part_indices(part)
        .into_iter()
        .filter_map(|i| digits.get(i).map(|d| d.to_string()))
        .collect();
    if selected.is_empty() {
        None
    } else {
        Some(format!("stage_{}", selected.join("_")))
    }
}

fn stage_text<'a>(bound: &'a BoundLore, part: usize, key: &str) -> Option<&'a str> {
    bound
        .stages
        .get(&format!("part_{}", part))?
        .get(key)
        .map(|text| text.trim())
        .filter(|text| !text.is_empty())
}

fn render_bound(
    key: &str,
    bound: &BoundLore,
    registry: &Registry,
) -> StorylineResult<Option<RenderedBound>> {
    let base = bound.base.trim();
    if base.is_empty() || bound.binding.is_empty() {
        warn!(entry = key, "Bound lore needs a base and a binding");
        return Ok(None);
    }

    let mut digits = Vec::new();
    let mut descriptions = Vec::new();
    let mut changes: BTreeMap<usize, (i64, i64)> = BTreeMap::new();
    for name in &bound.variables {
        let Some(variable) = registry.get(name) else {
            warn!(entry = key, variable = %name, "Bound lore variable is not registered");
            continue;
        };
        let Some(stage) = variable.stage_value() else {
            warn!(entry = key, variable = %name, "Bound lore variable has no stage");
            continue;
        };
        let parts = stage.parts();
        if let Some(transition) = variable.stage_transition() {
            let before = transition.before().parts();
            let after = transition.after().parts();
            for (offset, (old, new)) in before.into_iter().zip(after).enumerate() {
                if old != new && offset < parts.len() {
                    changes.insert(digits.len() + offset, (old, new));
                }
            }
        }
        digits.extend(parts);
        if let Some(description) = variable.stage_description() {
            descriptions.extend(description.parts());
        }
    }
    if digits.is_empty() {
        return Ok(None);
    }

    let stage_content = bound
        .binding
        .iter()
        .enumerate()
        .filter_map(|(part, selector)| {
            let key = stage_key(selector, &digits)?;
            stage_text(bound, part, &key)
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    let hint = if changes.is_empty() {
        None
    } else {
        change_hint(bound, &digits, &changes)
    };

    let mut combined = base.to_string();
    if !stage_content.is_empty() {
        combined.push_str("\n\n\n");
        combined.push_str(&stage_content);
    }
    if let Some(tag) = leading_xml_tag(base)? {
        combined.push_str(&format!("\n</{}>", tag));
    }

    Ok(Some(RenderedBound {
        content: substitute_elements(&combined, &descriptions)?,
        hint,
    }))
}

fn change_hint(
    bound: &BoundLore,
    digits: &[i64],
    changes: &BTreeMap<usize, (i64, i64)>,
) -> Option<String> {
    let mut old_digits = digits.to_vec();
    let mut new_digits = digits.to_vec();
    for (index, (old, new)) in changes {
        old_digits[*index] = *old;
        new_digits[*index] = *new;
    }

    let affected: BTreeSet<usize> = bound
        .binding
        .iter()
        .enumerate()
        .filter(|(_, selector)| part_indices(selector).iter().any(|i| changes.contains_key(i)))
        .map(|(part, _)| part)
        .collect();

    let mut old_texts = Vec::new();
    let mut new_texts = Vec::new();
    for part in affected {
        let selector = &bound.binding[part];
        if let Some(text) =
            stage_key(selector, &old_digits).and_then(|k| stage_text(bound, part, &k))
        {
            old_texts.push(text);
        }
        if let Some(text) =
            stage_key(selector, &new_digits).and_then(|k| stage_text(bound, part, &k))
        {
            new_texts.push(text);
        }
    }

    let old = old_texts.join("\n\n");
    let new = new_texts.join("\n\n");
    match (old.is_empty(), new.is_empty()) {
        (false, false) if old != new => Some(format!(
            "[Change]\nNote: the setting changed from\n{}\nto\n{}\nDescribe this change in the narrative.",
            old, new
        )),
        (true, false) => Some(format!(
            "[Change]\nNote: the following setting was added:\n{}\nDescribe this change in the narrative.",
            new
        )),
        (false, true) => Some(format!(
            "[Change]\nNote: the following setting no longer applies:\n{}\nDescribe this change in the narrative.",
            old
        )),
        _ => None,
    }
}

fn leading_xml_tag(text: &str) -> StorylineResult<Option<String>> {
    let re = Regex::new(r"^<([a-zA-Z_][\w\-]*)(?:\s[^>]*)?>").map_err(|e| {
        WorkflowError::new(WorkflowErrorKind::Template(format!(
            "Invalid tag regex: {}",
            e
        )))
    })?;
    Ok(re.captures(text).map(|cap| cap[1].to_string()))
}

fn substitute_elements(text: &str, descriptions: &[String]) -> StorylineResult<String> {
    let re = Regex::new(r"\{element_(\d+)\}").map_err(|e| {
        WorkflowError::new(WorkflowErrorKind::Template(format!(
            "Invalid element regex: {}",
            e
        )))
    })?;

    let mut result = String::with_capacity(text.len());
    let mut last = 0;
    for cap in re.captures_iter(text) {
        let whole = cap.get(0).map_or(0..0, |m| m.range());
        let index: usize = cap[1].parse().map_err(|_| {
            WorkflowError::new(WorkflowErrorKind::Template(format!(
                "Element index out of range: {}",
                &cap[0]
            )))
        })?;
        let description = descriptions.get(index).ok_or_else(|| {
            WorkflowError::new(WorkflowErrorKind::Template(format!(
                "{} exceeds the {} available stage descriptions",
                &cap[0],
                descriptions.len()
            )))
        })?;
        result.push_str(&text[last..whole.start]);
        result.push_str(description);
        last = whole.end;
    }
    result.push_str(&text[last..]);
    Ok(result)
}
