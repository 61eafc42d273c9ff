//! Message content classification.
//!
//! Classifies a message body as [`ContentType::Code`], [`ContentType::Command`],
//! or [`ContentType::Text`] by walking an ordered rule table top-to-bottom.
//! The first matching rule wins, so code markers take precedence over
//! command shapes.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::ContentType;

/// Ordered `(pattern, classification)` rules.
pub static CONTENT_RULES: LazyLock<Vec<(Regex, ContentType)>> = LazyLock::new(|| {
    [
        // fenced block
        (r"```", ContentType::Code),
        // inline backtick span
        (r"`[^`\n]+`", ContentType::Code),
        // shell prompt
        (r"\$\s+\w+", ContentType::Command),
        (r"\b(?:npm|yarn|pnpm|git|python|node)\s+\w+", ContentType::Command),
        (r"--\w+", ContentType::Command),
        // blockquote-style line
        (r"(?m)^>", ContentType::Command),
    ]
    .into_iter()
    .map(|(pattern, kind)| (Regex::new(pattern).expect("valid content rule"), kind))
    .collect()
});

/// Classifies message content. Never fails; no signal means `Text`.
pub fn classify_content(content: &str) -> ContentType {
    CONTENT_RULES
        .iter()
        .find(|(pattern, _)| pattern.is_match(content))
        .map(|(_, kind)| *kind)
        .unwrap_or(ContentType::Text)
}
