//! Rolling history summary.

use storyline_core::{ChatMethod, ConversationRecord, Speaker};

fn with_scene(scene: Option<&str>, body: &str) -> String {
    match scene.filter(|s| !s.is_empty()) {
        Some(scene) => format!("({})\n{}", scene, body),
        None => body.to_string(),
    }
}

/// Renders the conversation before the newest layer.
///
/// The newest layer is the turn being worked on and is never included. Of the
/// remaining layers the last `memory_depth` render in full; older layers render
/// only their assistant summaries.
///
/// Guided conversations render narrative only, separated by blank lines.
/// Interactive conversations render one quoted line per speaker, preceded by an
/// `Earlier summary:` heading when older layers were summarised.
pub fn history_summary(
    records: &[ConversationRecord],
    memory_depth: u32,
    method: ChatMethod,
) -> String {
    let Some(newest) = records.iter().map(|r| *r.layer()).max() else {
        return String::new();
    };

    let mut kept: Vec<&ConversationRecord> =
        records.iter().filter(|r| *r.layer() < newest).collect();
    let Some(max_layer) = kept.iter().map(|r| *r.layer()).max() else {
        return String::new();
    };
    kept.sort_by_key(|r| *r.layer());

    let summarised = max_layer.saturating_sub(memory_depth);
    let mut lines = Vec::new();

    if method == ChatMethod::Interactive && summarised > 0 {
        lines.push("Earlier summary:".to_string());
    }

    for record in kept.iter().filter(|r| *r.layer() <= summarised) {
        if *record.speaker() != Speaker::Assistant {
            continue;
        }
        if let Some(summary) = record.summary().as_deref().filter(|s| !s.is_empty()) {
            lines.push(with_scene(record.scene().as_deref(), summary));
        }
    }

    for record in kept.iter().filter(|r| *r.layer() > summarised) {
        let content = record.content();
        match (method, record.speaker()) {
            (ChatMethod::Guided, Speaker::Assistant) if !content.is_empty() => {
                lines.push(with_scene(record.scene().as_deref(), content));
            }
            (ChatMethod::Guided, _) => {}
            (ChatMethod::Interactive, Speaker::User) => {
                lines.push(format!("User: \"{}\"", content));
            }
            (ChatMethod::Interactive, Speaker::Assistant) => {
                lines.push(with_scene(
                    record.scene().as_deref(),
                    &format!("Assistant: \"{}\"", content),
                ));
            }
        }
    }

    let separator = match method {
        ChatMethod::Guided => "\n\n",
        ChatMethod::Interactive => "\n",
    };
    lines.join(separator)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation(layers: u32) -> Vec<ConversationRecord> {
        let mut records = vec![ConversationRecord::assistant(
            1,
            1,
            "Opening",
            Some("Gate".to_string()),
            Some("It began.".to_string()),
        )];
        let mut id = 2;
        for layer in 2..=layers {
            records.push(ConversationRecord::user(id, layer, format!("input {}", layer)));
            records.push(ConversationRecord::assistant(
                id + 1,
                layer,
                format!("passage {}", layer),
                None,
                Some(format!("recap {}", layer)),
            ));
            id += 2;
        }
        records
    }

    #[test]
    fn test_newest_layer_is_ignored() {
        let records = conversation(2);
        assert_eq!(
            history_summary(&records, 4, ChatMethod::Guided),
            "(Gate)\nOpening"
        );
        assert_eq!(history_summary(&records[..1], 4, ChatMethod::Guided), "");
    }

    #[test]
    fn test_guided_summarises_older_layers() {
        let records = conversation(5);
        let summary = history_summary(&records, 2, ChatMethod::Guided);
        assert_eq!(
            summary,
            "(Gate)\nIt began.\n\nrecap 2\n\npassage 3\n\npassage 4"
        );
    }

    #[test]
    fn test_interactive_renders_dialogue() {
        let records = conversation(4);
        let summary = history_summary(&records, 1, ChatMethod::Interactive);
        assert_eq!(
            summary,
            "Earlier summary:\n(Gate)\nIt began.\nrecap 2\nUser: \"input 3\"\nAssistant: \"passage 3\""
        );
    }

    #[test]
    fn test_interactive_without_summary_has_no_heading() {
        let records = conversation(3);
        let summary = history_summary(&records, 5, ChatMethod::Interactive);
        assert!(summary.starts_with("(Gate)\nAssistant: \"Opening\""));
        assert!(!summary.contains("Earlier summary:"));
    }
}
