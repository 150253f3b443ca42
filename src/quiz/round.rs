//! One playthrough of the prize ladder.
//!
//! A [`GameRound`] owns the questions drawn for the round and moves through
//! three phases: waiting for an answer, showing the evaluation of an answer,
//! and the terminal phase that carries the final [`ScoreRecord`]. Every
//! operation checks the phase first and is ignored (returns `None`/`false`)
//! when it does not apply, so timer callbacks and button presses can race
//! freely without corrupting the round.

use std::collections::BTreeSet;

use log::debug;
use rand::seq::SliceRandom;
use rand::Rng;

use super::prizes::PrizeLadder;
use super::{OptionLetter, Question, OPTION_COUNT};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RoundError {
    #[error("a round needs at least one question")]
    NoQuestions,
    #[error("{questions} questions do not fit a ladder of {tiers} tiers")]
    TooManyQuestions { questions: usize, tiers: usize },
    #[error("question '{0}' has no valid answer index")]
    InvalidAnswer(String),
    #[error("time per question must be positive")]
    ZeroTimeLimit,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ScoreRecord {
    pub name: String,
    /// Prize amount reached
    pub score: u64,
    /// Number of questions answered correctly
    pub question: usize,
    /// Elapsed round time in seconds
    pub time: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Suggestion {
    pub option: OptionLetter,
    /// 0..=100
    pub confidence: u8,
}

impl Suggestion {
    pub fn new(option: OptionLetter, confidence: u8) -> Self {
        Self {
            option,
            confidence: confidence.min(100),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    AwaitingAnswer,
    Evaluating {
        selected: Option<usize>,
        correct: bool,
    },
    Terminal(ScoreRecord),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assistance {
    None,
    Pending { question_index: usize },
    Ready(Suggestion),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifelines {
    pub fifty_fifty: bool,
    pub ask_expert: bool,
    pub skip: bool,
}

impl Default for Lifelines {
    fn default() -> Self {
        Self {
            fifty_fifty: true,
            ask_expert: true,
            skip: true,
        }
    }
}

/// Result of an answer (or a timeout) on the current question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub question_index: usize,
    pub selected: Option<usize>,
    pub correct_option: usize,
    pub correct: bool,
}

impl Evaluation {
    pub fn timed_out(&self) -> bool {
        self.selected.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    Next(usize),
    Finished(ScoreRecord),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipOutcome {
    Skipped(usize),
    Stopped(ScoreRecord),
}

/// Issued by [`GameRound::use_ask_expert`]; the answer must come back
/// through [`GameRound::resolve_assistance`] with the same index.
#[derive(Debug, Clone)]
pub struct AssistRequest {
    pub question_index: usize,
    pub question: Question,
}

#[derive(Debug)]
pub struct GameRound {
    player: String,
    questions: Vec<Question>,
    ladder: PrizeLadder,
    seconds_per_question: u32,
    current: usize,
    countdown: u32,
    elapsed: u64,
    lifelines: Lifelines,
    hidden: BTreeSet<usize>,
    assistance: Assistance,
    phase: Phase,
}

impl GameRound {
    pub fn new(
        player: impl Into<String>,
        questions: Vec<Question>,
        ladder: PrizeLadder,
        seconds_per_question: u32,
    ) -> Result<Self, RoundError> {
        if questions.is_empty() {
            return Err(RoundError::NoQuestions);
        }
        if questions.len() > ladder.len() {
            return Err(RoundError::TooManyQuestions {
                questions: questions.len(),
                tiers: ladder.len(),
            });
        }
        if seconds_per_question == 0 {
            return Err(RoundError::ZeroTimeLimit);
        }
        if let Some(bad) = questions.iter().find(|q| q.answer >= OPTION_COUNT) {
            return Err(RoundError::InvalidAnswer(bad.id.clone()));
        }

        Ok(Self {
            player: player.into(),
            questions,
            ladder,
            seconds_per_question,
            current: 0,
            countdown: seconds_per_question,
            elapsed: 0,
            lifelines: Lifelines::default(),
            hidden: BTreeSet::new(),
            assistance: Assistance::None,
            phase: Phase::AwaitingAnswer,
        })
    }

    pub fn player(&self) -> &str {
        &self.player
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn is_awaiting_answer(&self) -> bool {
        matches!(self.phase, Phase::AwaitingAnswer)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, Phase::Terminal(_))
    }

    pub fn score(&self) -> Option<&ScoreRecord> {
        match &self.phase {
            Phase::Terminal(score) => Some(score),
            _ => None,
        }
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    pub fn current_question(&self) -> &Question {
        &self.questions[self.current]
    }

    pub fn countdown(&self) -> u32 {
        self.countdown
    }

    pub fn seconds_per_question(&self) -> u32 {
        self.seconds_per_question
    }

    pub fn elapsed(&self) -> u64 {
        self.elapsed
    }

    pub fn lifelines(&self) -> Lifelines {
        self.lifelines
    }

    pub fn hidden_options(&self) -> &BTreeSet<usize> {
        &self.hidden
    }

    pub fn assistance(&self) -> Assistance {
        self.assistance
    }

    pub fn ladder(&self) -> &PrizeLadder {
        &self.ladder
    }

    /// What the player walks away with if they stop now.
    pub fn banked_prize(&self) -> u64 {
        self.ladder.prize_for_completed(self.current)
    }

    fn is_last_question(&self) -> bool {
        self.current + 1 == self.questions.len()
    }

    /// `None` is a timeout and always counts as wrong.
    pub fn submit_answer(&mut self, selected: Option<usize>) -> Option<Evaluation> {
        if !self.is_awaiting_answer() {
            return None;
        }
        if let Some(index) = selected {
            if index >= OPTION_COUNT || self.hidden.contains(&index) {
                return None;
            }
        }

        let correct_option = self.current_question().answer;
        let correct = selected == Some(correct_option);
        debug!(
            "{}: question {} answered {:?}, correct={}",
            self.player, self.current, selected, correct
        );
        self.phase = Phase::Evaluating { selected, correct };

        Some(Evaluation {
            question_index: self.current,
            selected,
            correct_option,
            correct,
        })
    }

    /// Completes the evaluation started by `submit_answer` or a timeout.
    pub fn proceed(&mut self) -> Option<Progress> {
        let correct = match self.phase {
            Phase::Evaluating { correct, .. } => correct,
            _ => return None,
        };

        if !correct {
            let record = self.finish(self.banked_prize(), self.current);
            return Some(Progress::Finished(record));
        }
        if self.is_last_question() {
            let record = self.finish(self.ladder.top_prize(), self.questions.len());
            return Some(Progress::Finished(record));
        }

        self.advance();
        Some(Progress::Next(self.current))
    }

    /// One second of the per-question countdown.
    pub fn tick(&mut self) -> Option<Evaluation> {
        if !self.is_awaiting_answer() {
            return None;
        }
        self.countdown = self.countdown.saturating_sub(1);
        if self.countdown == 0 {
            debug!("{}: question {} timed out", self.player, self.current);
            return self.submit_answer(None);
        }
        None
    }

    /// One second of total round time; runs independently of the countdown.
    pub fn advance_clock(&mut self) {
        if !self.is_terminal() {
            self.elapsed += 1;
        }
    }

    /// Keeps the correct option and one random wrong option visible.
    pub fn use_fifty_fifty<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        if !self.lifelines.fifty_fifty || !self.is_awaiting_answer() {
            return false;
        }
        self.lifelines.fifty_fifty = false;

        let answer = self.current_question().answer;
        let wrong: Vec<usize> = (0..OPTION_COUNT).filter(|i| *i != answer).collect();
        // wrong always has three entries
        let kept = *wrong.choose(rng).unwrap_or(&wrong[0]);
        self.hidden = wrong.into_iter().filter(|i| *i != kept).collect();
        true
    }

    pub fn use_ask_expert(&mut self) -> Option<AssistRequest> {
        if !self.lifelines.ask_expert || !self.is_awaiting_answer() {
            return None;
        }
        self.lifelines.ask_expert = false;
        self.assistance = Assistance::Pending {
            question_index: self.current,
        };

        Some(AssistRequest {
            question_index: self.current,
            question: self.current_question().clone(),
        })
    }

    /// Applies an expert answer unless the round has moved on since it was
    /// requested. Returns whether the suggestion was applied.
    pub fn resolve_assistance(
        &mut self,
        question_index: usize,
        suggestion: Option<Suggestion>,
    ) -> bool {
        let pending_here = self.assistance == Assistance::Pending { question_index };
        if !self.is_awaiting_answer() || self.current != question_index || !pending_here {
            debug!(
                "{}: discarding stale assistance for question {}",
                self.player, question_index
            );
            return false;
        }
        self.assistance = match suggestion {
            Some(s) => Assistance::Ready(s),
            None => Assistance::None,
        };
        true
    }

    pub fn use_skip(&mut self) -> Option<SkipOutcome> {
        if !self.lifelines.skip || !self.is_awaiting_answer() {
            return None;
        }
        self.lifelines.skip = false;

        if self.is_last_question() {
            let record = self.finish(self.banked_prize(), self.current);
            return Some(SkipOutcome::Stopped(record));
        }
        self.advance();
        Some(SkipOutcome::Skipped(self.current))
    }

    pub fn stop(&mut self) -> Option<ScoreRecord> {
        if !self.is_awaiting_answer() {
            return None;
        }
        Some(self.finish(self.banked_prize(), self.current))
    }

    fn advance(&mut self) {
        self.current += 1;
        self.countdown = self.seconds_per_question;
        self.hidden.clear();
        self.assistance = Assistance::None;
        self.phase = Phase::AwaitingAnswer;
    }

    fn finish(&mut self, prize: u64, questions_correct: usize) -> ScoreRecord {
        let record = ScoreRecord {
            name: self.player.clone(),
            score: prize,
            question: questions_correct,
            time: self.elapsed,
        };
        debug!("{}: round over with {:?}", self.player, record);
        self.phase = Phase::Terminal(record.clone());
        record
    }
}
