//! Conversation records and the variable snapshots they carry.

use crate::{Phase, Speaker, StageTransition};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Persisted state of one variable inside a snapshot section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// Committed value, rounded to one decimal
    pub value: f64,
    /// Stage change caused by the commit that produced this entry
    #[serde(default, rename = "relative_is_upgrade", alias = "stage_transition")]
    pub stage_transition: Option<StageTransition>,
}

/// Variable name to persisted entry.
pub type SnapshotSection = BTreeMap<String, SnapshotEntry>;

/// The `pre` and `post` captures held by an assistant record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct VariableSnapshot {
    /// Values committed by the pre-update phase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre: Option<SnapshotSection>,
    /// Values committed by the post-update phase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post: Option<SnapshotSection>,
}

impl VariableSnapshot {
    /// The section written by the given phase.
    pub fn section(&self, phase: Phase) -> Option<&SnapshotSection> {
        match phase {
            Phase::Pre => self.pre.as_ref(),
            Phase::Post => self.post.as_ref(),
        }
    }

    /// Replaces the section written by the given phase.
    pub fn set_section(&mut self, phase: Phase, section: SnapshotSection) {
        match phase {
            Phase::Pre => self.pre = Some(section),
            Phase::Post => self.post = Some(section),
        }
    }
}

/// One turn entry in the conversation log.
///
/// Records are stored oldest first. A user record and the assistant record that
/// answers it share a layer; the opening assistant record sits alone on layer 1.
///
/// The id is not part of the serialized body. Persisted logs key each record by
/// its id instead.
///
/// # Examples
///
/// ```
/// use storyline_core::{ConversationRecord, Speaker};
///
/// let record = ConversationRecord::placeholder(4, 2);
/// assert_eq!(*record.speaker(), Speaker::Assistant);
/// assert!(record.is_placeholder());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters)]
pub struct ConversationRecord {
    /// Monotonic record identifier
    #[serde(skip)]
    id: u64,
    /// Turn index
    layer: u32,
    /// Author
    speaker: Speaker,
    /// Main text
    #[serde(default)]
    content: String,
    /// Scene heading for assistant narrative
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scene: Option<String>,
    /// Short summary used once the record falls out of the memory window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
    /// Reasoning emitted while generating
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reasoning: Option<String>,
    /// Variable state captured for this turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    variable_snapshot: Option<VariableSnapshot>,
}

impl ConversationRecord {
    /// A user record.
    pub fn user(id: u64, layer: u32, content: impl Into<String>) -> Self {
        Self {
            id,
            layer,
            speaker: Speaker::User,
            content: content.into(),
            scene: None,
            summary: None,
            reasoning: None,
            variable_snapshot: None,
        }
    }

    /// An assistant record with narrative fields filled.
    pub fn assistant(
        id: u64,
        layer: u32,
        content: impl Into<String>,
        scene: Option<String>,
        summary: Option<String>,
    ) -> Self {
        Self {
            id,
            layer,
            speaker: Speaker::Assistant,
            content: content.into(),
            scene,
            summary,
            reasoning: None,
            variable_snapshot: None,
        }
    }

    /// The same record under another id.
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    /// An empty assistant record awaiting generated content.
    pub fn placeholder(id: u64, layer: u32) -> Self {
        Self::assistant(id, layer, String::new(), None, None)
    }

    /// Whether this is an assistant record without content.
    pub fn is_placeholder(&self) -> bool {
        self.speaker == Speaker::Assistant && self.content.is_empty()
    }

    /// Fills generated narrative into this record.
    pub fn fill(
        &mut self,
        content: impl Into<String>,
        scene: Option<String>,
        summary: Option<String>,
        reasoning: Option<String>,
    ) {
        self.content = content.into();
        self.scene = scene;
        self.summary = summary;
        self.reasoning = reasoning;
    }

    /// Mutable access to the snapshot, creating an empty one if absent.
    pub fn snapshot_mut(&mut self) -> &mut VariableSnapshot {
        self.variable_snapshot.get_or_insert_with(VariableSnapshot::default)
    }

    /// The snapshot section for a phase, if present.
    pub fn section(&self, phase: Phase) -> Option<&SnapshotSection> {
        self.variable_snapshot
            .as_ref()
            .and_then(|snapshot| snapshot.section(phase))
    }

    /// Content rendered with its scene heading, as `(scene)content`.
    pub fn scene_prefixed_content(&self, separator: &str) -> String {
        match self.scene.as_deref().filter(|s| !s.is_empty()) {
            Some(scene) => format!("({}){}{}", scene, separator, self.content),
            None => self.content.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StageValue;

    #[test]
    fn test_snapshot_serializes_transition_as_pair() {
        let mut record = ConversationRecord::placeholder(2, 1);
        let mut section = SnapshotSection::new();
        section.insert(
            "anger".to_string(),
            SnapshotEntry {
                value: 12.5,
                stage_transition: StageTransition::between(
                    StageValue::Single(1),
                    StageValue::Single(2),
                ),
            },
        );
        record.snapshot_mut().set_section(Phase::Post, section);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json["variable_snapshot"]["post"]["anger"]["relative_is_upgrade"],
            serde_json::json!([1, 2])
        );
        assert!(json["variable_snapshot"].get("pre").is_none());
        assert!(json.get("id").is_none());

        let back: ConversationRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back.with_id(2), record);
    }

    #[test]
    fn test_scene_prefix() {
        let record = ConversationRecord::assistant(
            1,
            1,
            "The rain starts.",
            Some("Harbor".to_string()),
            None,
        );
        assert_eq!(record.scene_prefixed_content("\n"), "(Harbor)\nThe rain starts.");
        assert_eq!(record.scene_prefixed_content(""), "(Harbor)The rain starts.");
    }
}
