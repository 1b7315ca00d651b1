use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::state::{
    bus::Payload,
    players::PlayerRegistry,
    rounds::{AnswerCollector, RoundError, general_info},
    state_machine::{GameState, RoundContext},
};

/// Settings accepted by the `question` round.
#[derive(Debug, Clone, Deserialize)]
pub struct QuestionSettings {
    /// Question text shown on every screen.
    pub question: String,
    /// Expected answer; without one the round is scored by the admin.
    #[serde(default)]
    pub answer: Option<String>,
    /// Points awarded to each correct answer.
    #[serde(default = "default_points")]
    pub points: i64,
}

fn default_points() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
struct AnswerMessage {
    answer: String,
}

/// Open question: players submit free-text answers while the round is active
/// and matching answers score when the round ends.
pub struct Question {
    settings: QuestionSettings,
    answers: AnswerCollector,
}

impl Question {
    /// Registry tag.
    pub const KIND: &'static str = "question";

    /// Question round with an empty answer sheet.
    pub fn new(settings: QuestionSettings) -> Self {
        Self {
            settings,
            answers: AnswerCollector::default(),
        }
    }
}

impl GameState for Question {
    fn name(&self) -> &str {
        Self::KIND
    }

    fn begin_active(&mut self, _ctx: &mut RoundContext<'_>) {
        self.answers.open();
    }

    fn end_active(&mut self, ctx: &mut RoundContext<'_>) {
        self.answers.close();
        let Some(expected) = &self.settings.answer else {
            return;
        };

        let winners = self.answers.matching(expected);
        info!(
            question = %self.settings.question,
            answers = self.answers.len(),
            winners = winners.len(),
            "question closed"
        );
        if !winners.is_empty() {
            let points = self.settings.points;
            if let Err(err) = ctx
                .players()
                .update_scores(winners.iter().map(|name| (name, points)), true)
            {
                warn!(question = %self.settings.question, error = %err, "points were not awarded");
            }
        }
    }

    fn status_message(&self, _players: &PlayerRegistry) -> Payload {
        let mut payload = general_info(json!({
            "question": self.settings.question,
            "points": self.settings.points,
            "answers_received": self.answers.len(),
        }));
        payload.insert(
            "player_specific_info".to_string(),
            self.answers.per_player_info(),
        );
        payload
    }

    fn on_player_message(
        &mut self,
        ctx: &mut RoundContext<'_>,
        player: &str,
        message: &Value,
    ) -> Result<(), RoundError> {
        let AnswerMessage { answer } = serde_json::from_value(message.clone())
            .map_err(|_| RoundError::Rejected("expected an `answer` field".into()))?;

        match ctx.players().get(player) {
            None => return Err(RoundError::Rejected(format!("unknown player `{player}`"))),
            Some(entry) if !entry.isplaying => {
                return Err(RoundError::Rejected(format!(
                    "player `{player}` is no longer playing"
                )));
            }
            Some(_) => {}
        }
        if !self.answers.submit(player, &answer) {
            return Err(RoundError::Rejected("answers are closed".into()));
        }

        let status = self.status_message(ctx.players());
        ctx.publish(status);
        Ok(())
    }
}
