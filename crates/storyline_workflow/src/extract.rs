//! Tagged fields in generated narrative.

/// Text between the first `<tag>` and the following `</tag>`, trimmed.
///
/// # Examples
///
/// ```
/// use storyline_workflow::tagged_field;
///
/// let text = "<scene> Harbor </scene><main_body>Gulls circle.</main_body>";
/// assert_eq!(tagged_field(text, "scene").as_deref(), Some("Harbor"));
/// assert_eq!(tagged_field(text, "summary"), None);
/// ```
pub fn tagged_field(text: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = text.find(&open)? + open.len();
    let end = text[start..].find(&close)? + start;
    Some(text[start..end].trim().to_string())
}

/// The narrative fields written into an assistant record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NarrativeFields {
    /// Passage text from `<main_body>`
    pub main_body: String,
    /// Location heading from `<scene>`
    pub scene: Option<String>,
    /// One-line recap from `<summary>`
    pub summary: Option<String>,
}

impl NarrativeFields {
    /// Reads the fields of a generated response. Missing tags leave fields empty.
    pub fn parse(text: &str) -> Self {
        Self {
            main_body: tagged_field(text, "main_body").unwrap_or_default(),
            scene: tagged_field(text, "scene").filter(|s| !s.is_empty()),
            summary: tagged_field(text, "summary").filter(|s| !s.is_empty()),
        }
    }

    /// Reads an opening narrative after substituting `{user}`.
    ///
    /// Text without a `<main_body>` tag is used whole as the passage.
    pub fn opening(text: &str, user_name: &str) -> Self {
        let text = text.replace("{user}", user_name);
        let mut fields = Self::parse(&text);
        if tagged_field(&text, "main_body").is_none() {
            fields.main_body = text.trim().to_string();
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_takes_first_occurrence() {
        let text = "<preparation>plan</preparation>\
                    <main_body> First </main_body><main_body>Second</main_body>\
                    <scene>Docks</scene><summary></summary>";
        let fields = NarrativeFields::parse(text);
        assert_eq!(fields.main_body, "First");
        assert_eq!(fields.scene.as_deref(), Some("Docks"));
        assert_eq!(fields.summary, None);
    }

    #[test]
    fn test_missing_main_body_is_empty() {
        assert_eq!(NarrativeFields::parse("just prose").main_body, "");
    }

    #[test]
    fn test_opening_substitutes_user() {
        let fields = NarrativeFields::opening(
            "<scene>Gate</scene><main_body>{user} arrives.</main_body><summary>{user} came.</summary>",
            "Mira",
        );
        assert_eq!(fields.main_body, "Mira arrives.");
        assert_eq!(fields.summary.as_deref(), Some("Mira came."));

        let plain = NarrativeFields::opening("  {user} wakes.  ", "Mira");
        assert_eq!(plain.main_body, "Mira wakes.");
        assert_eq!(plain.scene, None);
    }
}
