//! Live filter for streamed narrative.
//!
//! The narrator is asked to wrap its output in a fixed set of tags. While
//! streaming, only the text inside those tags reaches the display; planning and
//! passage sections get a short heading, and the text between top-level sections
//! is dropped.

use std::sync::{Arc, Mutex};
use storyline_interface::TokenSink;

/// Tags whose content is shown.
pub const SYSTEM_TAGS: [&str; 4] = ["preparation", "main_body", "scene", "summary"];

/// Character-level tag filter.
///
/// # Examples
///
/// ```
/// use storyline_workflow::StreamFilter;
///
/// let mut filter = StreamFilter::new();
/// let mut shown = filter.push("noise<main_body>The ");
/// shown.push_str(&filter.push("door <em>creaks</em>.</main_body>tail"));
/// assert_eq!(shown, "Narrative:\nThe door <em>creaks.\n");
/// ```
#[derive(Debug, Clone, Default)]
pub struct StreamFilter {
    in_tag: bool,
    open: bool,
    tag: String,
    stack: Vec<String>,
}

impl StreamFilter {
    /// Creates a filter that shows nothing until a system tag opens.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns the text to display.
    pub fn push(&mut self, chunk: &str) -> String {
        let mut shown = String::new();
        for c in chunk.chars() {
            match c {
                '<' => {
                    self.in_tag = true;
                    self.tag.clear();
                }
                '>' if self.in_tag => {
                    self.in_tag = false;
                    let tag = std::mem::take(&mut self.tag);
                    self.complete_tag(&tag, &mut shown);
                }
                _ if self.in_tag => self.tag.push(c),
                _ => {
                    if self.open {
                        shown.push(c);
                    }
                }
            }
        }
        shown
    }

    fn complete_tag(&mut self, tag: &str, shown: &mut String) {
        if let Some(name) = tag.strip_prefix('/') {
            if SYSTEM_TAGS.contains(&name) && self.stack.last().map(String::as_str) == Some(name) {
                self.stack.pop();
                if self.stack.is_empty() {
                    self.open = false;
                    shown.push('\n');
                }
            }
            return;
        }

        if SYSTEM_TAGS.contains(&tag) {
            self.stack.push(tag.to_string());
            self.open = true;
            match tag {
                "preparation" => shown.push_str("Plan:\n"),
                "main_body" => shown.push_str("Narrative:\n"),
                _ => {}
            }
        } else if self.open {
            shown.push('<');
            shown.push_str(tag);
            shown.push('>');
        }
    }

    /// Wraps a content sink so it only receives filtered text.
    pub fn wrap(downstream: TokenSink) -> TokenSink {
        let filter = Arc::new(Mutex::new(Self::new()));
        Arc::new(move |token: &str| {
            let shown = match filter.lock() {
                Ok(mut filter) => filter.push(token),
                Err(poisoned) => poisoned.into_inner().push(token),
            };
            if !shown.is_empty() {
                downstream(&shown);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(chunks: &[&str]) -> String {
        let mut filter = StreamFilter::new();
        chunks.iter().map(|c| filter.push(c)).collect()
    }

    #[test]
    fn test_text_outside_system_tags_is_dropped() {
        assert_eq!(run(&["hello <b>world</b>"]), "");
    }

    #[test]
    fn test_sections_get_headings_and_newlines() {
        let shown = run(&[
            "<preparation>think</preparation>",
            "<main_body>story</main_body>",
            "<scene>Pier</scene>",
        ]);
        assert_eq!(shown, "Plan:\nthink\nNarrative:\nstory\nPier\n");
    }

    #[test]
    fn test_tags_split_across_chunks() {
        assert_eq!(run(&["<sce", "ne>Mil", "l</sc", "ene>"]), "Mill\n");
    }

    #[test]
    fn test_nested_system_tags_close_once() {
        assert_eq!(
            run(&["<main_body>a<scene>b</scene>c</main_body>"]),
            "Narrative:\nabc\n"
        );
    }

    #[test]
    fn test_mismatched_close_is_ignored() {
        assert_eq!(run(&["<main_body>a</scene>b</main_body>"]), "Narrative:\nab\n");
    }

    #[test]
    fn test_wrap_forwards_only_shown_text() {
        let seen = Arc::new(Mutex::new(String::new()));
        let sink_seen = Arc::clone(&seen);
        let sink: TokenSink = Arc::new(move |t: &str| sink_seen.lock().unwrap().push_str(t));
        let wrapped = StreamFilter::wrap(sink);
        wrapped("skip<summary>");
        wrapped("kept</summary>");
        assert_eq!(seen.lock().unwrap().as_str(), "kept\n");
    }
}
