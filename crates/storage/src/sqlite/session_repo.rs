use quiz_core::model::{Email, Session};

use super::SqliteRepository;
use super::mapping::{conn, map_session_row};
use crate::repository::{SessionRepository, StorageError};

#[async_trait::async_trait]
impl SessionRepository for SqliteRepository {
    async fn find_session_by_email(&self, email: &Email) -> Result<Option<Session>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT email, nickname, score, complete, created_at
            FROM sessions
            WHERE email = ?1
            ",
        )
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_session_row).transpose()
    }

    async fn save_session(&self, session: &Session) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO sessions (email, nickname, score, complete, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(email) DO UPDATE SET
                -- created_at stays from the original insert
                nickname = excluded.nickname,
                score = excluded.score,
                complete = excluded.complete
            ",
        )
        .bind(session.email().as_str())
        .bind(session.nickname())
        .bind(i64::from(session.cached_score()))
        .bind(session.is_complete())
        .bind(session.created_at())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<Session>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT email, nickname, score, complete, created_at
            FROM sessions
            ORDER BY created_at ASC, email ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_session_row).collect()
    }
}
