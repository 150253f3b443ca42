use std::fs::File;
use std::io::{BufReader, ErrorKind};
use std::path::PathBuf;
use std::sync::Mutex;

use log::{error, info};

use crate::quiz::round::ScoreRecord;
use crate::quiz::store;

const MAX_ENTRIES: usize = 999;

#[derive(Debug, thiserror::Error)]
pub enum LeaderboardError {
    #[error("leaderboard I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("leaderboard CSV failed: {0}")]
    Csv(#[from] csv::Error),
}

/// Receives the final score of every round.
pub trait ScoreSink: Send + Sync {
    fn record(&self, score: &ScoreRecord);
}

pub struct Leaderboard {
    path: PathBuf,
    entries: Mutex<Vec<ScoreRecord>>,
}

impl Leaderboard {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match File::open(&path) {
            Ok(file) => match serde_json::from_reader(BufReader::new(file)) {
                Ok(entries) => entries,
                Err(err) => {
                    error!("Could not load leaderboard {}: {}", path.display(), err);
                    Vec::new()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => Vec::new(),
            Err(err) => {
                error!("Could not open leaderboard {}: {}", path.display(), err);
                Vec::new()
            }
        };
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, Vec<ScoreRecord>> {
        match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn top(&self, n: usize) -> Vec<ScoreRecord> {
        self.entries().iter().take(n).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Inserts the score in rank order and persists the board. Returns the
    /// 1-based rank, or `None` when the score fell off the end.
    pub fn insert(&self, score: ScoreRecord) -> Result<Option<usize>, LeaderboardError> {
        let mut entries = self.entries();
        // Higher prize first, faster time breaks ties; equal entries keep arrival order.
        let rank = entries
            .iter()
            .position(|e| e.score < score.score || (e.score == score.score && e.time > score.time))
            .unwrap_or(entries.len());
        entries.insert(rank, score);
        entries.truncate(MAX_ENTRIES);

        store::save_json(&self.path, &*entries)?;
        Ok((rank < entries.len()).then_some(rank + 1))
    }

    pub fn export_csv(&self) -> Result<Vec<u8>, LeaderboardError> {
        let mut out = Vec::new();
        let mut writer = csv::Writer::from_writer(&mut out);
        writer.write_record([
            "Thứ hạng",
            "Tên người chơi",
            "Điểm",
            "Số câu đúng",
            "Thời gian (giây)",
        ])?;
        for (i, entry) in self.entries().iter().enumerate() {
            writer.write_record([
                (i + 1).to_string(),
                entry.name.clone(),
                entry.score.to_string(),
                entry.question.to_string(),
                entry.time.to_string(),
            ])?;
        }
        writer.flush()?;
        drop(writer);
        Ok(out)
    }
}

impl ScoreSink for Leaderboard {
    fn record(&self, score: &ScoreRecord) {
        match self.insert(score.clone()) {
            Ok(Some(rank)) => info!("{} placed #{} with {}", score.name, rank, score.score),
            Ok(None) => info!("{} did not make the leaderboard", score.name),
            Err(err) => error!("Could not save score for {}: {}", score.name, err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(name: &str, score: u64, time: u64) -> ScoreRecord {
        ScoreRecord {
            name: name.to_string(),
            score,
            question: 0,
            time,
        }
    }

    #[test]
    fn orders_by_prize_then_time() {
        let dir = tempfile::tempdir().unwrap();
        let board = Leaderboard::load(dir.path().join("board.json"));
        assert_eq!(board.insert(score("An", 1000, 90)).unwrap(), Some(1));
        assert_eq!(board.insert(score("Bình", 1000, 60)).unwrap(), Some(1));
        assert_eq!(board.insert(score("Chi", 16000, 300)).unwrap(), Some(1));
        assert_eq!(board.insert(score("Dũng", 0, 5)).unwrap(), Some(4));
        assert_eq!(board.insert(score("Em", 1000, 60)).unwrap(), Some(3));

        let names: Vec<_> = board.top(10).into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["Chi", "Bình", "Em", "An", "Dũng"]);
        assert_eq!(board.top(2).len(), 2);
    }

    #[test]
    fn persists_between_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("board.json");
        let board = Leaderboard::load(&path);
        board.record(&score("An", 500, 40));

        let reloaded = Leaderboard::load(&path);
        assert_eq!(reloaded.top(1), vec![score("An", 500, 40)]);
    }

    #[test]
    fn caps_the_board() {
        let dir = tempfile::tempdir().unwrap();
        let board = Leaderboard::load(dir.path().join("board.json"));
        for i in 0..MAX_ENTRIES {
            board.insert(score("x", 100, i as u64)).unwrap();
        }
        assert_eq!(board.insert(score("slow", 100, 5000)).unwrap(), None);
        assert_eq!(board.len(), MAX_ENTRIES);
        assert_eq!(board.insert(score("fast", 200, 5000)).unwrap(), Some(1));
        assert_eq!(board.len(), MAX_ENTRIES);
    }

    #[test]
    fn unwritable_board_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let board = Leaderboard::load(dir.path().join("missing").join("board.json"));
        board.record(&score("An", 500, 40));
        assert_eq!(board.len(), 1);
    }

    #[test]
    fn csv_lists_ranks() {
        let dir = tempfile::tempdir().unwrap();
        let board = Leaderboard::load(dir.path().join("board.json"));
        board.insert(score("An", 500, 40)).unwrap();
        board.insert(score("Bình", 1000, 40)).unwrap();
        let text = String::from_utf8(board.export_csv().unwrap()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "Thứ hạng,Tên người chơi,Điểm,Số câu đúng,Thời gian (giây)");
        assert_eq!(lines[1], "1,Bình,1000,0,40");
        assert_eq!(lines[2], "2,An,500,0,40");
    }
}
