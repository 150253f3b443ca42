use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use chatgpt::client::ChatGPT;
use chatgpt::config::ChatGPTEngine;
use chatgpt::types::CompletionResponse;
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::quiz::round::{GameRound, Suggestion};
use crate::quiz::{OptionLetter, Question};

/// Something that can look at a question and suggest an answer.
///
/// Failures are folded into `None`; a missing suggestion never ends a round.
#[async_trait]
pub trait AssistanceProvider: Send + Sync {
    async fn suggest(&self, question: &Question) -> Option<Suggestion>;
}

const EXPERT_TIMEOUT: Duration = Duration::from_secs(15);

pub struct ChemistryExpert {
    chat_gpt: ChatGPT,
}

impl ChemistryExpert {
    pub fn new(api_key: impl Into<String>) -> Result<Self, chatgpt::err::Error> {
        let mut chat_gpt = ChatGPT::new(api_key)?;
        chat_gpt.config.engine = ChatGPTEngine::Gpt35Turbo;
        Ok(Self { chat_gpt })
    }

    fn prompt(question: &Question) -> String {
        format!(
            "You are an expert in Chemistry. Analyze the following multiple-choice question from a quiz game and determine the most likely correct answer.

            Question: \"{}\"

            Options:
            A. {}
            B. {}
            C. {}
            D. {}

            Provide your answer as a JSON object with two keys: 'suggestedAnswer' (which should be 'A', 'B', 'C', or 'D') and 'confidence' (a number between 0 and 100 representing your certainty). Reply with the JSON object only.",
            question.question,
            question.options[0],
            question.options[1],
            question.options[2],
            question.options[3],
        )
    }
}

#[async_trait]
impl AssistanceProvider for ChemistryExpert {
    async fn suggest(&self, question: &Question) -> Option<Suggestion> {
        debug!("Asking the expert about question {}", question.id);
        let prompt = Self::prompt(question);

        let request = self.chat_gpt.send_message(&prompt);
        let response: CompletionResponse = match timeout(EXPERT_TIMEOUT, request).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                warn!("Expert request for {} failed: {}", question.id, err);
                return None;
            }
            Err(_) => {
                warn!("Expert request for {} timed out", question.id);
                return None;
            }
        };
        let content = response.message().clone().content;
        debug!("Completion: {:?}", content);

        let suggestion = parse_suggestion(&content);
        if suggestion.is_none() {
            warn!("Expert reply for {} was not usable: {:?}", question.id, content);
        }
        suggestion
    }
}

#[derive(serde::Deserialize)]
struct RawSuggestion {
    #[serde(rename = "suggestedAnswer")]
    suggested_answer: String,
    confidence: f64,
}

/// Pulls the JSON object out of a model reply, tolerating prose or code
/// fences around it.
pub fn parse_suggestion(reply: &str) -> Option<Suggestion> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end < start {
        return None;
    }
    let raw: RawSuggestion = serde_json::from_str(&reply[start..=end]).ok()?;

    let option = OptionLetter::parse(&raw.suggested_answer)?;
    if !raw.confidence.is_finite() {
        return None;
    }
    let confidence = raw.confidence.round().clamp(0.0, 100.0) as u8;
    Some(Suggestion::new(option, confidence))
}

/// Stand-in used when no API key is configured: a plausible random guess.
/// The guess is not guaranteed to be right, same as the real expert.
pub struct GuessingExpert {
    rng: StdMutex<StdRng>,
}

impl GuessingExpert {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng: StdMutex::new(rng),
        }
    }
}

#[async_trait]
impl AssistanceProvider for GuessingExpert {
    async fn suggest(&self, question: &Question) -> Option<Suggestion> {
        let mut rng = match self.rng.lock() {
            Ok(rng) => rng,
            Err(poisoned) => poisoned.into_inner(),
        };
        let option = OptionLetter::from_index(rng.gen_range(0..OptionLetter::ALL.len()))?;
        let confidence = rng.gen_range(75..95);
        debug!("Guessing {} ({}%) for {}", option, confidence, question.id);
        Some(Suggestion::new(option, confidence))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpertOutcome {
    /// Lifeline already used this round.
    Spent,
    /// The round is not waiting for an answer right now.
    Busy,
    /// The round moved past the question before the expert replied.
    Discarded,
    Applied(Option<Suggestion>),
}

/// Runs the ask-the-expert lifeline against a shared round. The lock is
/// released while the provider works so timers and answers keep flowing.
pub async fn ask_expert(
    round: &Mutex<GameRound>,
    provider: &dyn AssistanceProvider,
) -> ExpertOutcome {
    let request = {
        let mut round = round.lock().await;
        if !round.lifelines().ask_expert {
            return ExpertOutcome::Spent;
        }
        match round.use_ask_expert() {
            Some(request) => request,
            None => return ExpertOutcome::Busy,
        }
    };

    let suggestion = provider.suggest(&request.question).await;

    let mut round = round.lock().await;
    if round.resolve_assistance(request.question_index, suggestion) {
        ExpertOutcome::Applied(suggestion)
    } else {
        ExpertOutcome::Discarded
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::quiz::prizes::PrizeLadder;
    use crate::quiz::round::Assistance;

    fn round() -> GameRound {
        let questions = vec![
            Question::new("q0", "Q0?", ["a", "b", "c", "d"], 1, None),
            Question::new("q1", "Q1?", ["a", "b", "c", "d"], 2, None),
        ];
        GameRound::new("Minh", questions, PrizeLadder::default(), 30).unwrap()
    }

    struct FixedExpert(Option<Suggestion>);

    #[async_trait]
    impl AssistanceProvider for FixedExpert {
        async fn suggest(&self, _question: &Question) -> Option<Suggestion> {
            self.0
        }
    }

    /// Answers the question itself while "thinking", so the reply arrives late.
    struct SlowExpert {
        round: Arc<Mutex<GameRound>>,
    }

    #[async_trait]
    impl AssistanceProvider for SlowExpert {
        async fn suggest(&self, _question: &Question) -> Option<Suggestion> {
            let mut round = self.round.lock().await;
            round.submit_answer(Some(1));
            round.proceed();
            Some(Suggestion::new(OptionLetter::B, 99))
        }
    }

    #[test]
    fn parses_plain_and_fenced_replies() {
        assert_eq!(
            parse_suggestion(r#"{"suggestedAnswer": "C", "confidence": 82}"#),
            Some(Suggestion::new(OptionLetter::C, 82))
        );
        assert_eq!(
            parse_suggestion("```json\n{\"suggestedAnswer\":\"a\",\"confidence\":64.6}\n```"),
            Some(Suggestion::new(OptionLetter::A, 65))
        );
        assert_eq!(
            parse_suggestion(r#"{"suggestedAnswer": "B", "confidence": 140}"#),
            Some(Suggestion::new(OptionLetter::B, 100))
        );
    }

    #[test]
    fn rejects_malformed_replies() {
        assert_eq!(parse_suggestion("I think it's B"), None);
        assert_eq!(
            parse_suggestion(r#"{"suggestedAnswer": "E", "confidence": 50}"#),
            None
        );
        assert_eq!(
            parse_suggestion(r#"{"suggestedAnswer": "A", "confidence": "high"}"#),
            None
        );
    }

    #[tokio::test]
    async fn guessing_expert_stays_in_range() {
        let expert = GuessingExpert::new(Some(5));
        let question = Question::new("q", "Q?", ["a", "b", "c", "d"], 0, None);
        for _ in 0..20 {
            let suggestion = expert.suggest(&question).await.unwrap();
            assert!((75..95).contains(&suggestion.confidence));
        }
    }

    #[tokio::test]
    async fn suggestion_is_applied_to_the_round() {
        let round = Mutex::new(round());
        let expected = Suggestion::new(OptionLetter::B, 70);
        let outcome = ask_expert(&round, &FixedExpert(Some(expected))).await;
        assert_eq!(outcome, ExpertOutcome::Applied(Some(expected)));
        assert_eq!(round.lock().await.assistance(), Assistance::Ready(expected));

        let again = ask_expert(&round, &FixedExpert(Some(expected))).await;
        assert_eq!(again, ExpertOutcome::Spent);
    }

    #[tokio::test]
    async fn expert_waits_out_the_reveal() {
        let round = Mutex::new(round());
        round.lock().await.submit_answer(Some(0));
        let outcome = ask_expert(&round, &FixedExpert(None)).await;
        assert_eq!(outcome, ExpertOutcome::Busy);
        assert!(round.lock().await.lifelines().ask_expert);
    }

    #[tokio::test]
    async fn provider_failure_shows_nothing() {
        let round = Mutex::new(round());
        let outcome = ask_expert(&round, &FixedExpert(None)).await;
        assert_eq!(outcome, ExpertOutcome::Applied(None));
        let round = round.lock().await;
        assert_eq!(round.assistance(), Assistance::None);
        assert!(round.is_awaiting_answer());
    }

    #[tokio::test]
    async fn late_reply_does_not_touch_the_next_question() {
        let shared = Arc::new(Mutex::new(round()));
        let expert = SlowExpert {
            round: shared.clone(),
        };
        let outcome = ask_expert(&shared, &expert).await;
        assert_eq!(outcome, ExpertOutcome::Discarded);

        let round = shared.lock().await;
        assert_eq!(round.current_index(), 1);
        assert_eq!(round.assistance(), Assistance::None);
    }
}
