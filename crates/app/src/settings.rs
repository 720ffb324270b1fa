use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File};
use quiz_core::selection::QuizOptions;
use serde::Deserialize;

/// Runtime settings for the `quizmaker` binary.
///
/// Sources, later ones winning: built-in defaults, an optional
/// `quizmaker.toml` in the working directory, `QUIZ_*` environment variables
/// (a `.env` file is loaded first). Command-line flags are applied on top by
/// the caller.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AppConfig {
    pub db_url: String,
    pub question_pool: PathBuf,
    pub total_questions: usize,
    pub min_difficulty: i32,
    pub max_difficulty: i32,
    pub question_timeout_secs: u32,
}

impl AppConfig {
    /// # Errors
    ///
    /// Returns `ConfigError` if a source is malformed or a value has the wrong type.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        with_defaults()?
            .add_source(File::with_name("quizmaker").required(false))
            .add_source(Environment::with_prefix("QUIZ"))
            .build()?
            .try_deserialize()
    }

    #[must_use]
    pub fn quiz_options(&self) -> QuizOptions {
        QuizOptions {
            total_questions: self.total_questions,
            min_difficulty: self.min_difficulty,
            max_difficulty: self.max_difficulty,
            question_timeout_secs: self.question_timeout_secs,
        }
    }
}

fn with_defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
    let defaults = QuizOptions::default();
    Config::builder()
        .set_default("db_url", "sqlite://quizmaker.sqlite3")?
        .set_default("question_pool", "question_pool.yaml")?
        .set_default("total_questions", to_i64(defaults.total_questions))?
        .set_default("min_difficulty", i64::from(defaults.min_difficulty))?
        .set_default("max_difficulty", i64::from(defaults.max_difficulty))?
        .set_default(
            "question_timeout_secs",
            i64::from(defaults.question_timeout_secs),
        )
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
