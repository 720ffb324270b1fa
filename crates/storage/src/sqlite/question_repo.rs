use quiz_core::model::{Email, NewSessionQuestion, QuestionId, SessionQuestion};

use super::SqliteRepository;
use super::mapping::{
    answers_to_json, conn, map_question_row, question_id_from_i64, question_id_to_i64, write_err,
};
use crate::repository::{QuestionRepository, StorageError};

const QUESTION_COLUMNS: &str = "id, session_email, position, text, difficulty, kind, answers, \
     right_answer, user_answer, allowed_seconds, started_at";

impl SqliteRepository {
    async fn question_exists(&self, id: i64) -> Result<bool, StorageError> {
        let row = sqlx::query("SELECT 1 FROM questions WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;
        Ok(row.is_some())
    }
}

#[async_trait::async_trait]
impl QuestionRepository for SqliteRepository {
    async fn append_questions(
        &self,
        email: &Email,
        questions: &[NewSessionQuestion],
    ) -> Result<Vec<SessionQuestion>, StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let session = sqlx::query("SELECT 1 FROM sessions WHERE email = ?1")
            .bind(email.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(conn)?;
        if session.is_none() {
            return Err(StorageError::NotFound);
        }

        let existing = sqlx::query("SELECT 1 FROM questions WHERE session_email = ?1 LIMIT 1")
            .bind(email.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(conn)?;
        if existing.is_some() {
            return Err(StorageError::Conflict);
        }

        let mut stored = Vec::with_capacity(questions.len());
        for new in questions {
            let res = sqlx::query(
                r"
                INSERT INTO questions (
                    session_email, position, text, difficulty, kind, answers,
                    right_answer, user_answer, allowed_seconds, started_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, NULL)
                ",
            )
            .bind(email.as_str())
            .bind(i64::from(new.index))
            .bind(new.question.text.as_str())
            .bind(new.question.difficulty)
            .bind(new.question.kind.as_str())
            .bind(answers_to_json(&new.question.answers)?)
            .bind(i64::from(new.question.right_answer))
            .bind(i64::from(new.question.allowed_seconds))
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;

            stored.push(SessionQuestion::from_persisted(
                question_id_from_i64(res.last_insert_rowid())?,
                email.clone(),
                new.index,
                new.question.clone(),
                None,
                0,
            ));
        }

        tx.commit().await.map_err(write_err)?;
        Ok(stored)
    }

    async fn save_question(&self, question: &SessionQuestion) -> Result<(), StorageError> {
        let id = question_id_to_i64(question.id())?;
        let res = sqlx::query(
            r"
            UPDATE questions SET
                started_at = COALESCE(started_at, ?2),
                user_answer = CASE WHEN user_answer = 0 THEN ?3 ELSE user_answer END
            WHERE id = ?1
            ",
        )
        .bind(id)
        .bind(question.started_at())
        .bind(i64::from(question.user_answer()))
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn record_answer(&self, id: QuestionId, answer: u32) -> Result<(), StorageError> {
        let id = question_id_to_i64(id)?;
        let res = sqlx::query("UPDATE questions SET user_answer = ?2 WHERE id = ?1 AND user_answer = 0")
            .bind(id)
            .bind(i64::from(answer))
            .execute(&self.pool)
            .await
            .map_err(conn)?;

        if res.rows_affected() == 1 {
            return Ok(());
        }
        if self.question_exists(id).await? {
            Err(StorageError::Conflict)
        } else {
            Err(StorageError::NotFound)
        }
    }

    async fn get_question(&self, id: QuestionId) -> Result<SessionQuestion, StorageError> {
        let sql = format!("SELECT {QUESTION_COLUMNS} FROM questions WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(question_id_to_i64(id)?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;

        map_question_row(&row)
    }

    async fn list_questions_for_session(
        &self,
        email: &Email,
    ) -> Result<Vec<SessionQuestion>, StorageError> {
        let sql = format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE session_email = ?1 ORDER BY position ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(email.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        rows.iter().map(map_question_row).collect()
    }
}
