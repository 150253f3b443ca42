use std::fs::File;
use std::io::{BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{error, info, warn};
use rand::seq::SliceRandom;
use rand::RngCore;

use crate::quiz::{self, store, Question};

#[derive(Debug, thiserror::Error)]
pub enum BankError {
    #[error("question bank I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("question bank is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("question '{0}' is incomplete")]
    InvalidQuestion(String),
    #[error("no question with id '{0}'")]
    UnknownQuestion(String),
}

/// Supplies the questions for a new round.
pub trait QuestionSource {
    fn draw_round(&self, count: usize, rng: &mut dyn RngCore) -> Vec<Question>;
}

pub struct QuestionBank {
    path: PathBuf,
    questions: Vec<Question>,
}

impl QuestionBank {
    /// Loads the bank, falling back to the starter questions when the file
    /// is missing or unreadable.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let questions = match read_questions(&path) {
            Ok(questions) => {
                let questions = keep_well_formed(questions, &path);
                info!("Loaded {} questions from {}", questions.len(), path.display());
                questions
            }
            Err(BankError::Io(err)) if err.kind() == ErrorKind::NotFound => {
                info!("No question bank at {}, using the starter set", path.display());
                quiz::initial_questions()
            }
            Err(err) => {
                error!("Could not read {}: {}", path.display(), err);
                quiz::initial_questions()
            }
        };
        Self { path, questions }
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }

    /// Distinct topics in the order they first appear.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = Vec::new();
        for topic in self.questions.iter().filter_map(|q| q.topic.as_ref()) {
            if !topics.contains(topic) {
                topics.push(topic.clone());
            }
        }
        topics
    }

    pub fn by_topic<'a>(&'a self, topic: &'a str) -> impl Iterator<Item = &'a Question> + 'a {
        self.questions
            .iter()
            .filter(move |q| q.topic.as_deref() == Some(topic))
    }

    /// Adds questions, giving fresh ids to those without one. Returns how
    /// many were added.
    pub fn add_all(&mut self, questions: Vec<Question>) -> Result<usize, BankError> {
        if let Some(bad) = questions.iter().find(|q| !q.is_well_formed()) {
            return Err(BankError::InvalidQuestion(bad.question.clone()));
        }

        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let added = questions.len();
        for (k, mut question) in questions.into_iter().enumerate() {
            if question.id.trim().is_empty() || self.get(&question.id).is_some() {
                question.id = self.fresh_id(stamp, k);
            }
            self.questions.push(question);
        }
        Ok(added)
    }

    pub fn add(&mut self, question: Question) -> Result<String, BankError> {
        self.add_all(vec![question])?;
        // add_all always pushes
        Ok(self
            .questions
            .last()
            .map(|q| q.id.clone())
            .unwrap_or_default())
    }

    pub fn update(&mut self, question: Question) -> Result<(), BankError> {
        if !question.is_well_formed() {
            return Err(BankError::InvalidQuestion(question.id));
        }
        match self.questions.iter_mut().find(|q| q.id == question.id) {
            Some(slot) => {
                *slot = question;
                Ok(())
            }
            None => Err(BankError::UnknownQuestion(question.id)),
        }
    }

    pub fn remove(&mut self, id: &str) -> Result<Question, BankError> {
        let position = self
            .questions
            .iter()
            .position(|q| q.id == id)
            .ok_or_else(|| BankError::UnknownQuestion(id.to_string()))?;
        Ok(self.questions.remove(position))
    }

    pub fn save(&self) -> Result<(), BankError> {
        store::save_json(&self.path, &self.questions)?;
        Ok(())
    }

    fn fresh_id(&self, stamp: u128, k: usize) -> String {
        let mut k = k;
        loop {
            let id = format!("q_{}_{}", stamp, k);
            if self.get(&id).is_none() {
                return id;
            }
            k += 1;
        }
    }
}

impl QuestionSource for QuestionBank {
    fn draw_round(&self, count: usize, rng: &mut dyn RngCore) -> Vec<Question> {
        let mut shuffled = self.questions.clone();
        shuffled.shuffle(rng);
        shuffled.truncate(count);
        if shuffled.len() < count {
            warn!(
                "Bank holds {} questions, round wanted {}",
                shuffled.len(),
                count
            );
        }
        shuffled
    }
}

/// Hand-edited files may hold records no round can use.
fn keep_well_formed(questions: Vec<Question>, path: &Path) -> Vec<Question> {
    questions
        .into_iter()
        .filter(|q| {
            let ok = q.is_well_formed();
            if !ok {
                warn!(
                    "Skipping malformed question '{}' in {}",
                    q.id,
                    path.display()
                );
            }
            ok
        })
        .collect()
}

fn read_questions(path: &Path) -> Result<Vec<Question>, BankError> {
    let reader = BufReader::new(File::open(path)?);
    let questions: Vec<Question> = serde_json::from_reader(reader)?;
    Ok(questions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::prizes::PrizeLadder;
    use crate::quiz::round::GameRound;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn blank(question: &str, topic: Option<&str>) -> Question {
        Question::new("", question, ["a", "b", "c", "d"], 0, topic)
    }

    #[test]
    fn missing_file_falls_back_to_starter_set() {
        let dir = tempfile::tempdir().unwrap();
        let bank = QuestionBank::load(dir.path().join("questions.json"));
        assert_eq!(bank.questions(), quiz::initial_questions().as_slice());
    }

    #[test]
    fn corrupt_file_falls_back_to_starter_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("questions.json");
        std::fs::write(&path, "not json").unwrap();
        let bank = QuestionBank::load(&path);
        assert_eq!(bank.len(), quiz::initial_questions().len());
    }

    #[test]
    fn malformed_records_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("questions.json");
        std::fs::write(
            &path,
            r#"[
                {"id": "ok", "question": "Q?", "options": ["a", "b", "c", "d"], "answer": 1},
                {"id": "bad", "question": "Q?", "options": ["a", "b", "c", "d"], "answer": 7},
                {"id": "blank", "question": "Q?", "options": ["a", "", "c", "d"], "answer": 0}
            ]"#,
        )
        .unwrap();

        let bank = QuestionBank::load(&path);
        assert_eq!(bank.len(), 1);
        assert!(bank.get("ok").is_some());

        for seed in 0..20 {
            let drawn = bank.draw_round(15, &mut StdRng::seed_from_u64(seed));
            let round = GameRound::new("An", drawn, PrizeLadder::default(), 30);
            assert!(round.is_ok());
        }
    }

    #[test]
    fn edits_survive_a_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("questions.json");

        let mut bank = QuestionBank::load(&path);
        let id = bank.add(blank("Nước có công thức là gì?", Some("Vô cơ"))).unwrap();
        assert!(id.starts_with("q_"));
        bank.remove("chem11_1").unwrap();
        let mut edited = bank.get("chem11_2").unwrap().clone();
        edited.answer = 3;
        bank.update(edited).unwrap();
        bank.save().unwrap();

        let reloaded = QuestionBank::load(&path);
        assert_eq!(reloaded.len(), 15);
        assert!(reloaded.get("chem11_1").is_none());
        assert_eq!(reloaded.get("chem11_2").unwrap().answer, 3);
        assert_eq!(reloaded.get(&id).unwrap().topic.as_deref(), Some("Vô cơ"));
    }

    #[test]
    fn batch_ids_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let mut bank = QuestionBank::load(dir.path().join("q.json"));
        let added = bank
            .add_all(vec![blank("X?", None), blank("Y?", None), blank("Z?", None)])
            .unwrap();
        assert_eq!(added, 3);
        let mut ids: Vec<_> = bank.questions().iter().map(|q| q.id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 18);
    }

    #[test]
    fn rejects_incomplete_questions() {
        let dir = tempfile::tempdir().unwrap();
        let mut bank = QuestionBank::load(dir.path().join("q.json"));
        let mut missing_option = blank("X?", None);
        missing_option.options[2] = " ".to_string();
        assert!(matches!(
            bank.add(missing_option),
            Err(BankError::InvalidQuestion(_))
        ));
        assert!(matches!(
            bank.remove("nope"),
            Err(BankError::UnknownQuestion(_))
        ));
        assert_eq!(bank.len(), 15);
    }

    #[test]
    fn topics_keep_first_seen_order() {
        let dir = tempfile::tempdir().unwrap();
        let bank = QuestionBank::load(dir.path().join("q.json"));
        assert_eq!(
            bank.topics(),
            vec!["Sự điện li & pH", "Hóa học hữu cơ", "Nitơ - Photpho"]
        );
        assert_eq!(bank.by_topic("Nitơ - Photpho").count(), 5);
    }

    #[test]
    fn draw_round_is_a_shuffled_subset() {
        let dir = tempfile::tempdir().unwrap();
        let bank = QuestionBank::load(dir.path().join("q.json"));
        let mut rng = StdRng::seed_from_u64(42);

        let drawn = bank.draw_round(10, &mut rng);
        assert_eq!(drawn.len(), 10);
        let mut ids: Vec<_> = drawn.iter().map(|q| q.id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 10);

        let everything = bank.draw_round(40, &mut rng);
        assert_eq!(everything.len(), 15);
    }
}
