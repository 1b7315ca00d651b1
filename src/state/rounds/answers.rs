use indexmap::IndexMap;
use serde_json::{Value, json};

/// Collects one answer per player for rounds judged after the fact.
///
/// Rounds own one of these instead of sharing a base type; it only knows about
/// names and answer text, scoring stays with the round.
#[derive(Debug, Default)]
pub struct AnswerCollector {
    answers: IndexMap<String, String>,
    open: bool,
}

impl AnswerCollector {
    /// Start accepting answers, discarding previous ones.
    pub fn open(&mut self) {
        self.answers.clear();
        self.open = true;
    }

    /// Stop accepting answers; collected ones are kept for judging.
    pub fn close(&mut self) {
        self.open = false;
    }

    /// Record or replace `player`'s answer. Returns `false` when closed.
    pub fn submit(&mut self, player: &str, answer: &str) -> bool {
        if !self.open {
            return false;
        }
        self.answers
            .insert(player.to_string(), answer.trim().to_string());
        true
    }

    /// Number of players who answered.
    pub fn len(&self) -> usize {
        self.answers.len()
    }

    /// Whether nobody answered.
    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    /// Players whose answer matches `expected`, ignoring case and surrounding whitespace.
    pub fn matching(&self, expected: &str) -> Vec<String> {
        let expected = expected.trim().to_lowercase();
        self.answers
            .iter()
            .filter(|(_, answer)| answer.to_lowercase() == expected)
            .map(|(player, _)| player.clone())
            .collect()
    }

    /// `{ <name>: { "answer": ... } }` for per-player views.
    pub fn per_player_info(&self) -> Value {
        Value::Object(
            self.answers
                .iter()
                .map(|(player, answer)| (player.clone(), json!({ "answer": answer })))
                .collect(),
        )
    }
}
