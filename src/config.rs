use std::path::PathBuf;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be a positive number of seconds, got '{value}'")]
    InvalidSeconds { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub chatgpt_api_key: Option<String>,
    pub admin_password: String,
    pub seconds_per_question: u32,
    pub questions_path: PathBuf,
    pub leaderboard_path: PathBuf,
    pub dialogue_db: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str, default: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let seconds = var("QUESTION_SECONDS", "30");
        let seconds_per_question = seconds
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|s| *s > 0)
            .ok_or(ConfigError::InvalidSeconds {
                name: "QUESTION_SECONDS",
                value: seconds.clone(),
            })?;

        Ok(Self {
            chatgpt_api_key: lookup("CHATGPT_API_KEY").filter(|k| !k.trim().is_empty()),
            admin_password: var("ADMIN_PASSWORD", "123456"),
            seconds_per_question,
            questions_path: var("QUESTIONS_PATH", "questions.json").into(),
            leaderboard_path: var("LEADERBOARD_PATH", "leaderboard.json").into(),
            dialogue_db: var("DIALOGUE_DB", "db.sqlite"),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config(&[]).unwrap();
        assert_eq!(config.chatgpt_api_key, None);
        assert_eq!(config.admin_password, "123456");
        assert_eq!(config.seconds_per_question, 30);
        assert_eq!(config.questions_path, PathBuf::from("questions.json"));
        assert_eq!(config.dialogue_db, "db.sqlite");
    }

    #[test]
    fn reads_overrides() {
        let config = config(&[
            ("CHATGPT_API_KEY", "sk-test"),
            ("ADMIN_PASSWORD", "hoahoc"),
            ("QUESTION_SECONDS", "45"),
            ("LEADERBOARD_PATH", "/tmp/board.json"),
        ])
        .unwrap();
        assert_eq!(config.chatgpt_api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.admin_password, "hoahoc");
        assert_eq!(config.seconds_per_question, 45);
        assert_eq!(config.leaderboard_path, PathBuf::from("/tmp/board.json"));
    }

    #[test]
    fn blank_api_key_means_no_key() {
        let config = config(&[("CHATGPT_API_KEY", "  ")]).unwrap();
        assert_eq!(config.chatgpt_api_key, None);
    }

    #[test]
    fn rejects_bad_time_limits() {
        for bad in ["0", "-3", "soon"] {
            assert_eq!(
                config(&[("QUESTION_SECONDS", bad)]).unwrap_err(),
                ConfigError::InvalidSeconds {
                    name: "QUESTION_SECONDS",
                    value: bad.to_string(),
                }
            );
        }
    }
}
