//! In-memory approximate matching over a snapshot of the store.
//!
//! Each [`FuzzyIndex`] holds the items of one entity type plus a list of
//! weighted text fields. A field's distance to a query is `0.0` when the
//! field contains the query (case-insensitive); otherwise it is the best
//! `1 - normalized_levenshtein` between the query and any run of words in
//! the field with the same word count as the query.
//!
//! Item score is the minimum over fields of
//! `distance + (1 - weight) * 0.1`, clamped to `[0, 1]`, so a hit in a
//! low-weight field ranks slightly behind the same hit in a primary field.
//! Lower is better; items scoring at or under the index threshold match.

use strsim::normalized_levenshtein;

use crate::config::FuzzyConfig;
use crate::models::{Command, Conversation, Message, SearchHit};

/// Longer fields are truncated to this many words before matching.
pub const MAX_FIELD_WORDS: usize = 500;

/// Penalty scale for secondary fields.
const WEIGHT_PENALTY: f64 = 0.1;

/// A searchable text field of `T`.
pub struct FieldSpec<T> {
    pub name: &'static str,
    pub weight: f64,
    pub get: fn(&T) -> &str,
}

struct PreparedField {
    lower: String,
    words: Vec<String>,
}

impl PreparedField {
    fn new(text: &str) -> Self {
        let words: Vec<String> = text
            .split_whitespace()
            .take(MAX_FIELD_WORDS)
            .map(str::to_lowercase)
            .collect();
        Self {
            lower: words.join(" "),
            words,
        }
    }

    fn distance(&self, query: &str, query_words: usize) -> f64 {
        if self.words.is_empty() {
            return 1.0;
        }
        if self.lower.contains(query) {
            return 0.0;
        }
        if self.words.len() <= query_words {
            return 1.0 - normalized_levenshtein(query, &self.lower);
        }

        let best = self
            .words
            .windows(query_words)
            .map(|window| normalized_levenshtein(query, &window.join(" ")))
            .fold(0.0_f64, f64::max);
        1.0 - best
    }
}

/// Approximate-match index over one entity type.
pub struct FuzzyIndex<T> {
    items: Vec<T>,
    fields: Vec<FieldSpec<T>>,
    prepared: Vec<Vec<PreparedField>>,
    threshold: f64,
}

impl<T: Clone> FuzzyIndex<T> {
    pub fn new(items: Vec<T>, fields: Vec<FieldSpec<T>>, threshold: f64) -> Self {
        let prepared = items
            .iter()
            .map(|item| {
                fields
                    .iter()
                    .map(|field| PreparedField::new((field.get)(item)))
                    .collect()
            })
            .collect();
        Self {
            items,
            fields,
            prepared,
            threshold,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    fn score(&self, prepared: &[PreparedField], query: &str, query_words: usize) -> f64 {
        self.fields
            .iter()
            .zip(prepared)
            .map(|(def, field)| {
                field.distance(query, query_words) + (1.0 - def.weight) * WEIGHT_PENALTY
            })
            .fold(f64::INFINITY, f64::min)
            .clamp(0.0, 1.0)
    }

    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchHit<T>> {
        self.search_where(query, limit, |_| true)
    }

    /// Like [`search`](Self::search), restricted to items accepted by `keep`.
    pub fn search_where(
        &self,
        query: &str,
        limit: usize,
        keep: impl Fn(&T) -> bool,
    ) -> Vec<SearchHit<T>> {
        let query = query.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        if query.is_empty() || limit == 0 {
            return Vec::new();
        }
        let query_words = query.split(' ').count();

        let mut hits: Vec<SearchHit<T>> = self
            .items
            .iter()
            .zip(&self.prepared)
            .filter(|(item, _)| keep(item))
            .filter_map(|(item, prepared)| {
                let score = self.score(prepared, &query, query_words);
                (score <= self.threshold).then(|| SearchHit::new(item.clone(), score))
            })
            .collect();

        hits.sort_by(|a, b| a.score.total_cmp(&b.score));
        hits.truncate(limit);
        hits
    }
}

fn conversation_title(c: &Conversation) -> &str {
    &c.title
}
fn conversation_summary(c: &Conversation) -> &str {
    &c.summary
}
fn conversation_project(c: &Conversation) -> &str {
    c.project.as_deref().unwrap_or("")
}
fn message_content(m: &Message) -> &str {
    &m.content
}
fn command_text(k: &Command) -> &str {
    &k.command
}
fn command_context(k: &Command) -> &str {
    &k.context
}

pub fn conversation_fields() -> Vec<FieldSpec<Conversation>> {
    vec![
        FieldSpec {
            name: "title",
            weight: 1.0,
            get: conversation_title,
        },
        FieldSpec {
            name: "summary",
            weight: 0.7,
            get: conversation_summary,
        },
        FieldSpec {
            name: "project",
            weight: 0.5,
            get: conversation_project,
        },
    ]
}

pub fn message_fields() -> Vec<FieldSpec<Message>> {
    vec![FieldSpec {
        name: "content",
        weight: 1.0,
        get: message_content,
    }]
}

pub fn command_fields() -> Vec<FieldSpec<Command>> {
    vec![
        FieldSpec {
            name: "command",
            weight: 1.0,
            get: command_text,
        },
        FieldSpec {
            name: "context",
            weight: 0.5,
            get: command_context,
        },
    ]
}

/// Immutable fuzzy state produced by one build.
pub struct FuzzySnapshot {
    pub conversations: FuzzyIndex<Conversation>,
    pub messages: FuzzyIndex<Message>,
    pub commands: FuzzyIndex<Command>,
}

impl FuzzySnapshot {
    pub fn build(
        conversations: Vec<Conversation>,
        messages: Vec<Message>,
        commands: Vec<Command>,
        config: &FuzzyConfig,
    ) -> Self {
        Self {
            conversations: FuzzyIndex::new(
                conversations,
                conversation_fields(),
                config.conversation_threshold,
            ),
            messages: FuzzyIndex::new(messages, message_fields(), config.message_threshold),
            commands: FuzzyIndex::new(commands, command_fields(), config.command_threshold),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CommandType;

    fn command(id: &str, text: &str, context: &str, kind: CommandType) -> Command {
        Command {
            id: id.to_string(),
            conversation_id: "c".to_string(),
            message_index: 0,
            command: text.to_string(),
            command_type: kind,
            context: context.to_string(),
            confidence: 0.9,
        }
    }

    fn commands_index(threshold: f64) -> FuzzyIndex<Command> {
        FuzzyIndex::new(
            vec![
                command("1", "docker compose up -d", "start the stack", CommandType::Cli),
                command("2", "npm run build", "then run `npm run build`", CommandType::Cli),
                command("3", "cargo build --release", "release build", CommandType::Config),
            ],
            command_fields(),
            threshold,
        )
    }

    #[test]
    fn substring_in_primary_field_scores_zero() {
        let hits = commands_index(0.3).search("COMPOSE", 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].item.id, "1");
        assert_eq!(hits[0].score, 0.0);
    }

    #[test]
    fn secondary_field_hit_carries_weight_penalty() {
        let hits = commands_index(0.3).search("stack", 10);
        assert_eq!(hits.len(), 1);
        assert!((hits[0].score - 0.05).abs() < 1e-9);
    }

    #[test]
    fn misspelling_matches_within_threshold() {
        let hits = commands_index(0.3).search("dokcer compose", 10);
        assert!(!hits.is_empty());
        assert_eq!(hits[0].item.id, "1");
        assert!(hits[0].score > 0.0);
    }

    #[test]
    fn unrelated_query_matches_nothing() {
        assert!(commands_index(0.3).search("kubernetes", 10).is_empty());
    }

    #[test]
    fn results_sorted_and_limited() {
        let index = commands_index(1.0);
        let hits = index.search("build", 10);
        assert!(hits.windows(2).all(|w| w[0].score <= w[1].score));
        assert_eq!(index.search("build", 1).len(), 1);
        assert!(index.search("   ", 10).is_empty());
    }

    #[test]
    fn filter_restricts_candidates() {
        let hits =
            commands_index(0.3).search_where("build", 10, |c| c.command_type == CommandType::Config);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].item.id, "3");
    }

    #[test]
    fn long_fields_are_capped() {
        let mut text = "word ".repeat(MAX_FIELD_WORDS);
        text.push_str("needle");
        let field = PreparedField::new(&text);
        assert_eq!(field.words.len(), MAX_FIELD_WORDS);
        assert!(field.distance("needle", 1) > 0.0);
    }
}
