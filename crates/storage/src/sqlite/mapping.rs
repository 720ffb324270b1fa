use quiz_core::model::{Email, Question, QuestionId, QuestionKind, Session, SessionQuestion};
use sqlx::Row;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

/// Like [`conn`], but a unique-constraint violation is a `Conflict`.
pub(crate) fn write_err(e: sqlx::Error) -> StorageError {
    match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict,
        other => conn(other),
    }
}

fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn question_id_to_i64(id: QuestionId) -> Result<i64, StorageError> {
    i64::try_from(id.value())
        .map_err(|_| StorageError::Serialization("question_id overflow".into()))
}

pub(crate) fn question_id_from_i64(v: i64) -> Result<QuestionId, StorageError> {
    u64::try_from(v)
        .map(QuestionId::new)
        .map_err(|_| StorageError::Serialization(format!("invalid question_id: {v}")))
}

/// Answers are stored as a JSON array of strings.
pub(crate) fn answers_to_json(answers: &[String]) -> Result<String, StorageError> {
    serde_json::to_string(answers).map_err(ser)
}

fn answers_from_json(raw: &str) -> Result<Vec<String>, StorageError> {
    serde_json::from_str(raw).map_err(ser)
}

pub(crate) fn map_session_row(row: &sqlx::sqlite::SqliteRow) -> Result<Session, StorageError> {
    let email = Email::parse(&row.try_get::<String, _>("email").map_err(ser)?).map_err(ser)?;
    let score_i64: i64 = row.try_get("score").map_err(ser)?;
    let score = u8::try_from(score_i64)
        .map_err(|_| StorageError::Serialization(format!("invalid score: {score_i64}")))?;

    Session::from_persisted(
        email,
        row.try_get("nickname").map_err(ser)?,
        score,
        row.try_get("complete").map_err(ser)?,
        row.try_get("created_at").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_question_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<SessionQuestion, StorageError> {
    let question = Question {
        text: row.try_get("text").map_err(ser)?,
        difficulty: row.try_get("difficulty").map_err(ser)?,
        kind: QuestionKind::new(row.try_get::<String, _>("kind").map_err(ser)?),
        right_answer: u32_from_i64("right_answer", row.try_get("right_answer").map_err(ser)?)?,
        answers: answers_from_json(&row.try_get::<String, _>("answers").map_err(ser)?)?,
        allowed_seconds: u32_from_i64(
            "allowed_seconds",
            row.try_get("allowed_seconds").map_err(ser)?,
        )?,
    };

    Ok(SessionQuestion::from_persisted(
        question_id_from_i64(row.try_get("id").map_err(ser)?)?,
        Email::parse(&row.try_get::<String, _>("session_email").map_err(ser)?).map_err(ser)?,
        u32_from_i64("position", row.try_get("position").map_err(ser)?)?,
        question,
        row.try_get("started_at").map_err(ser)?,
        u32_from_i64("user_answer", row.try_get("user_answer").map_err(ser)?)?,
    ))
}
