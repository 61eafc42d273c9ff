//! Heuristic command extraction from message text.
//!
//! Two independent passes run over a message and their results are
//! concatenated without deduplication:
//!
//! - **Backtick spans**: every inline `` `...` `` span that is short enough
//!   and matches at least one entry of [`COMMAND_SHAPES`].
//! - **Prompt lines**: every line starting with a `$` prompt.
//!
//! This is a best-effort extractor, not a shell parser. It never fails; text
//! without any signal simply yields no candidates.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::{Command, CommandType};

/// Confidence assigned to accepted backtick spans.
pub const BACKTICK_CONFIDENCE: f64 = 0.9;
/// Confidence assigned to `$`-prompt lines.
pub const PROMPT_CONFIDENCE: f64 = 0.9;

/// Context radius used while ingesting.
pub const INGEST_CONTEXT_LINES: usize = 1;
/// Context radius used by query-time scan fallbacks.
pub const SCAN_CONTEXT_LINES: usize = 2;

/// Accepted span length bounds, exclusive, in chars.
const SPAN_MIN_EXCLUSIVE: usize = 3;
const SPAN_MAX_EXCLUSIVE: usize = 150;

/// Overall bounds, inclusive, for a string to look like a command.
const COMMAND_MIN_LEN: usize = 3;
const COMMAND_MAX_LEN: usize = 200;

static BACKTICK_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`\n]+)`").expect("valid span pattern"));

static PROMPT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\$\s*(.+)$").expect("valid prompt pattern"));

/// Strings containing braces or parens must consist only of these chars.
static RESTRICTED_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w\s\-=./]+$").expect("valid charset pattern"));

/// Ordered shape indicators. A candidate must match at least one.
pub static COMMAND_SHAPES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        (
            "known_tool",
            r"^(?:npm|yarn|pnpm|git|python|py|node|tsx|docker|curl|wget|cd|ls|mkdir|cp|mv|rm|firebase|memex)\s",
        ),
        ("word_with_flag", r"\w+\s+--?\w+"),
        ("shell_prompt", r"^\$\s"),
        ("sudo", r"^sudo\s"),
        ("script_file", r"\.(?:sh|py|js|ts)$"),
        (
            "verb_subcommand",
            r"^[A-Za-z_][\w-]*\s+(?:install|build|start|deploy|login|init|create|run|test)\b",
        ),
    ]
    .into_iter()
    .map(|(name, pattern)| (name, Regex::new(pattern).expect("valid shape pattern")))
    .collect()
});

/// Ordered `(pattern, type)` rules; falls through to [`CommandType::Code`].
pub static COMMAND_TYPE_RULES: LazyLock<Vec<(Regex, CommandType)>> = LazyLock::new(|| {
    [
        (
            r"^(?:npm|yarn|git|python|node|docker|curl|firebase|memex)\b",
            CommandType::Cli,
        ),
        (r"(?:^|\s)--?[A-Za-z]", CommandType::Config),
    ]
    .into_iter()
    .map(|(pattern, kind)| (Regex::new(pattern).expect("valid type pattern"), kind))
    .collect()
});

/// A command found in a message, before it is tied to a conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandCandidate {
    pub command: String,
    pub command_type: CommandType,
    pub context: String,
    pub confidence: f64,
}

/// Returns the trimmed text of `lines[i - radius ..= i + radius]`, clamped
/// to the slice bounds.
pub fn context_window(lines: &[&str], index: usize, radius: usize) -> String {
    if lines.is_empty() {
        return String::new();
    }
    let start = index.saturating_sub(radius);
    let end = (index + radius + 1).min(lines.len());
    if start >= end {
        return String::new();
    }
    lines[start..end].join("\n").trim().to_string()
}

/// Whether a string has the overall shape of a shell command.
pub fn looks_like_command(text: &str) -> bool {
    let len = text.chars().count();
    if !(COMMAND_MIN_LEN..=COMMAND_MAX_LEN).contains(&len) {
        return false;
    }

    if text.contains(['{', '}', '(', ')']) && !RESTRICTED_CHARS.is_match(text) {
        return false;
    }

    COMMAND_SHAPES
        .iter()
        .any(|(_, pattern)| pattern.is_match(text))
}

/// Classifies an accepted command string.
pub fn command_type_of(command: &str) -> CommandType {
    COMMAND_TYPE_RULES
        .iter()
        .find(|(pattern, _)| pattern.is_match(command))
        .map(|(_, kind)| *kind)
        .unwrap_or(CommandType::Code)
}

/// Runs both extraction passes over `content` with the given context radius.
pub fn extract_candidates(content: &str, context_lines: usize) -> Vec<CommandCandidate> {
    let lines: Vec<&str> = content.lines().collect();
    let mut candidates = backtick_candidates(content, &lines, context_lines);
    candidates.extend(prompt_candidates(&lines, context_lines));
    candidates
}

fn backtick_candidates(
    content: &str,
    lines: &[&str],
    context_lines: usize,
) -> Vec<CommandCandidate> {
    let mut out = Vec::new();

    for caps in BACKTICK_SPAN.captures_iter(content) {
        let span = caps[1].trim();
        let len = span.chars().count();
        if len <= SPAN_MIN_EXCLUSIVE || len >= SPAN_MAX_EXCLUSIVE {
            continue;
        }
        if !looks_like_command(span) {
            continue;
        }

        let quoted = &caps[0];
        let line_index = lines
            .iter()
            .position(|line| line.contains(quoted))
            .unwrap_or(0);

        out.push(CommandCandidate {
            command: span.to_string(),
            command_type: command_type_of(span),
            context: context_window(lines, line_index, context_lines),
            confidence: BACKTICK_CONFIDENCE,
        });
    }

    out
}

fn prompt_candidates(lines: &[&str], context_lines: usize) -> Vec<CommandCandidate> {
    lines
        .iter()
        .enumerate()
        .filter_map(|(i, line)| {
            let caps = PROMPT_LINE.captures(line)?;
            let command = caps[1].trim();
            if command.is_empty() {
                return None;
            }
            Some(CommandCandidate {
                command: command.to_string(),
                command_type: CommandType::Cli,
                context: context_window(lines, i, context_lines),
                confidence: PROMPT_CONFIDENCE,
            })
        })
        .collect()
}

/// Extracts commands from one message, tagged with their provenance.
///
/// Command ids are `{conversation_id}:{message_index}:{ordinal}`, stable for
/// a given message body.
pub fn extract_commands(conversation_id: &str, message_index: i64, content: &str) -> Vec<Command> {
    extract_candidates(content, INGEST_CONTEXT_LINES)
        .into_iter()
        .enumerate()
        .map(|(ordinal, c)| Command {
            id: format!("{}:{}:{}", conversation_id, message_index, ordinal),
            conversation_id: conversation_id.to_string(),
            message_index,
            command: c.command,
            command_type: c.command_type,
            context: c.context,
            confidence: c.confidence,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn firebase_setup_yields_two_cli_commands() {
        let content = "Run `npm install -g firebase-tools` then `firebase login`";
        let commands = extract_commands("conv-1", 3, content);

        let npm = commands
            .iter()
            .find(|c| c.command == "npm install -g firebase-tools")
            .expect("npm command extracted");
        assert_eq!(npm.command_type, CommandType::Cli);
        assert!(npm.confidence >= 0.9);

        let login = commands
            .iter()
            .find(|c| c.command == "firebase login")
            .expect("firebase login extracted");
        assert_eq!(login.command_type, CommandType::Cli);
        assert!(login.confidence >= 0.9);

        assert_eq!(npm.message_index, 3);
        assert_eq!(npm.conversation_id, "conv-1");
    }

    #[test]
    fn code_call_without_backticks_yields_nothing() {
        assert!(extract_candidates("const x = foo(bar, baz)", 1).is_empty());
    }

    #[test]
    fn code_call_in_backticks_is_rejected() {
        assert!(!looks_like_command("foo(bar, baz)"));
        assert!(extract_candidates("try `run_it(x)` now", 1).is_empty());
    }

    #[test]
    fn short_and_long_spans_are_rejected() {
        assert!(extract_candidates("use `ls` here", 1).is_empty());
        let long = format!("`npm run {}`", "x".repeat(160));
        assert!(extract_candidates(&long, 1).is_empty());
    }

    #[test]
    fn shape_indicators() {
        assert!(looks_like_command("cargo --version"));
        assert!(looks_like_command("$ make all"));
        assert!(looks_like_command("sudo apt update"));
        assert!(looks_like_command("scripts/deploy.sh"));
        assert!(looks_like_command("vercel deploy"));
        assert!(!looks_like_command("just some words"));
    }

    #[test]
    fn type_rules_in_order() {
        assert_eq!(command_type_of("git status"), CommandType::Cli);
        assert_eq!(command_type_of("docker compose up -d"), CommandType::Cli);
        assert_eq!(command_type_of("cargo build --release"), CommandType::Config);
        assert_eq!(command_type_of("ls -la"), CommandType::Config);
        assert_eq!(command_type_of("scripts/deploy.sh"), CommandType::Code);
        // word boundary: "gitlab-runner" does not count as git
        assert_eq!(command_type_of("gitlab-runner register"), CommandType::Code);
    }

    #[test]
    fn prompt_lines_are_cli() {
        let content = "First:\n$ cargo test --all\nthen check output";
        let candidates = extract_candidates(content, 1);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].command, "cargo test --all");
        assert_eq!(candidates[0].command_type, CommandType::Cli);
        assert_eq!(
            candidates[0].context,
            "First:\n$ cargo test --all\nthen check output"
        );
    }

    #[test]
    fn prices_mid_sentence_are_not_prompts() {
        assert!(extract_candidates("it costs $20 per month", 1).is_empty());
    }

    #[test]
    fn passes_are_concatenated_not_deduplicated() {
        let content = "`git status --short`\n$ git status --short";
        let candidates = extract_candidates(content, 1);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].command, candidates[1].command);
    }

    #[test]
    fn backtick_context_uses_first_matching_line() {
        let content = "line zero\nline one\nuse `git pull --rebase` now\nline three\nline four";
        let candidates = extract_candidates(content, 1);
        assert_eq!(candidates.len(), 1);
        assert_eq!(
            candidates[0].context,
            "line one\nuse `git pull --rebase` now\nline three"
        );
    }

    #[test]
    fn context_window_clamps() {
        let lines = vec!["a", "b", "c", "d", "e"];
        assert_eq!(context_window(&lines, 0, 1), "a\nb");
        assert_eq!(context_window(&lines, 2, 1), "b\nc\nd");
        assert_eq!(context_window(&lines, 4, 2), "c\nd\ne");
        assert_eq!(context_window(&lines, 9, 1), "");
        assert_eq!(context_window(&[], 0, 1), "");
    }

    #[test]
    fn ids_are_ordinal_per_message() {
        let commands = extract_commands("c", 7, "$ ls -la\n$ pwd now");
        let ids: Vec<&str> = commands.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c:7:0", "c:7:1"]);
    }
}
