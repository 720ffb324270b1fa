use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quiz_core::model::{Email, NewSessionQuestion, QuestionId, Session, SessionQuestion};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Persistence of session rows. Questions live in [`QuestionRepository`].
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Fetch a session by its email, without questions.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures; a missing session is `Ok(None)`.
    async fn find_session_by_email(&self, email: &Email) -> Result<Option<Session>, StorageError>;

    /// Insert or update a session row. `created_at` is kept from the first insert.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the session cannot be stored.
    async fn save_session(&self, session: &Session) -> Result<(), StorageError>;

    /// All sessions, oldest first, without questions.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_sessions(&self) -> Result<Vec<Session>, StorageError>;
}

/// Persistence of per-session questions.
///
/// Started timers and recorded answers are write-once: adapters never reset
/// `started_at` or overwrite a non-zero `user_answer`.
#[async_trait]
pub trait QuestionRepository: Send + Sync {
    /// Store generated questions under an existing session and assign their ids.
    ///
    /// A session receives questions once: the emptiness check and the inserts
    /// are atomic, so of two racing calls only one stores anything.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the session does not exist, or
    /// `StorageError::Conflict` if it already has questions.
    async fn append_questions(
        &self,
        email: &Email,
        questions: &[NewSessionQuestion],
    ) -> Result<Vec<SessionQuestion>, StorageError>;

    /// Persist the progress fields of a stored question.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the question does not exist.
    async fn save_question(&self, question: &SessionQuestion) -> Result<(), StorageError>;

    /// Record an answer only if none was recorded yet.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the question already has an answer,
    /// or `StorageError::NotFound` if it does not exist.
    async fn record_answer(&self, id: QuestionId, answer: u32) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the question does not exist.
    async fn get_question(&self, id: QuestionId) -> Result<SessionQuestion, StorageError>;

    /// Questions of a session ordered by presentation index.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_questions_for_session(
        &self,
        email: &Email,
    ) -> Result<Vec<SessionQuestion>, StorageError>;
}

#[derive(Default)]
struct QuestionTable {
    next_id: u64,
    rows: BTreeMap<QuestionId, SessionQuestion>,
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    sessions: Arc<Mutex<HashMap<Email, Session>>>,
    questions: Arc<Mutex<QuestionTable>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_err<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn session_row(session: &Session, created_at: DateTime<Utc>) -> Result<Session, StorageError> {
    Session::from_persisted(
        session.email().clone(),
        session.nickname().map(str::to_owned),
        session.cached_score(),
        session.is_complete(),
        created_at,
    )
    .map_err(|e| StorageError::Serialization(e.to_string()))
}

fn with_progress(
    stored: &SessionQuestion,
    started_at: Option<DateTime<Utc>>,
    user_answer: u32,
) -> SessionQuestion {
    SessionQuestion::from_persisted(
        stored.id(),
        stored.session_email().clone(),
        stored.index(),
        stored.question().clone(),
        stored.started_at().or(started_at),
        if stored.user_answer() == 0 {
            user_answer
        } else {
            stored.user_answer()
        },
    )
}

#[async_trait]
impl SessionRepository for InMemoryRepository {
    async fn find_session_by_email(&self, email: &Email) -> Result<Option<Session>, StorageError> {
        let guard = self.sessions.lock().map_err(lock_err)?;
        Ok(guard.get(email).cloned())
    }

    async fn save_session(&self, session: &Session) -> Result<(), StorageError> {
        let mut guard = self.sessions.lock().map_err(lock_err)?;
        let created_at = guard
            .get(session.email())
            .map_or(session.created_at(), Session::created_at);
        guard.insert(session.email().clone(), session_row(session, created_at)?);
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<Session>, StorageError> {
        let guard = self.sessions.lock().map_err(lock_err)?;
        let mut sessions: Vec<Session> = guard.values().cloned().collect();
        sessions.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.email().cmp(b.email()))
        });
        Ok(sessions)
    }
}

#[async_trait]
impl QuestionRepository for InMemoryRepository {
    async fn append_questions(
        &self,
        email: &Email,
        questions: &[NewSessionQuestion],
    ) -> Result<Vec<SessionQuestion>, StorageError> {
        if !self.sessions.lock().map_err(lock_err)?.contains_key(email) {
            return Err(StorageError::NotFound);
        }

        let mut table = self.questions.lock().map_err(lock_err)?;
        if table.rows.values().any(|q| q.session_email() == email) {
            return Err(StorageError::Conflict);
        }

        let mut stored = Vec::with_capacity(questions.len());
        for new in questions {
            table.next_id += 1;
            let question = SessionQuestion::from_persisted(
                QuestionId::new(table.next_id),
                email.clone(),
                new.index,
                new.question.clone(),
                None,
                0,
            );
            table.rows.insert(question.id(), question.clone());
            stored.push(question);
        }
        Ok(stored)
    }

    async fn save_question(&self, question: &SessionQuestion) -> Result<(), StorageError> {
        let mut table = self.questions.lock().map_err(lock_err)?;
        let Some(existing) = table.rows.get(&question.id()) else {
            return Err(StorageError::NotFound);
        };
        let updated = with_progress(existing, question.started_at(), question.user_answer());
        table.rows.insert(updated.id(), updated);
        Ok(())
    }

    async fn record_answer(&self, id: QuestionId, answer: u32) -> Result<(), StorageError> {
        let mut table = self.questions.lock().map_err(lock_err)?;
        let Some(existing) = table.rows.get(&id) else {
            return Err(StorageError::NotFound);
        };
        if existing.user_answer() != 0 {
            return Err(StorageError::Conflict);
        }
        let updated = with_progress(existing, None, answer);
        table.rows.insert(id, updated);
        Ok(())
    }

    async fn get_question(&self, id: QuestionId) -> Result<SessionQuestion, StorageError> {
        let table = self.questions.lock().map_err(lock_err)?;
        table.rows.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn list_questions_for_session(
        &self,
        email: &Email,
    ) -> Result<Vec<SessionQuestion>, StorageError> {
        let table = self.questions.lock().map_err(lock_err)?;
        let mut questions: Vec<SessionQuestion> = table
            .rows
            .values()
            .filter(|q| q.session_email() == email)
            .cloned()
            .collect();
        questions.sort_by_key(|q| (q.index(), q.id()));
        Ok(questions)
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub sessions: Arc<dyn SessionRepository>,
    pub questions: Arc<dyn QuestionRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let sessions: Arc<dyn SessionRepository> = Arc::new(repo.clone());
        let questions: Arc<dyn QuestionRepository> = Arc::new(repo);
        Self {
            sessions,
            questions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use quiz_core::model::Question;
    use quiz_core::time::fixed_now;

    fn email() -> Email {
        Email::parse("ann@example.com").unwrap()
    }

    fn new_questions(n: u32) -> Vec<NewSessionQuestion> {
        (1..=n)
            .map(|index| NewSessionQuestion {
                index,
                question: Question {
                    text: format!("Q{index}"),
                    right_answer: 1,
                    answers: vec!["a".into(), "b".into()],
                    allowed_seconds: 30,
                    ..Question::default()
                },
            })
            .collect()
    }

    #[tokio::test]
    async fn save_session_keeps_first_created_at() {
        let repo = InMemoryRepository::new();
        let first = Session::new(email(), Some("Ann".into()), fixed_now());
        repo.save_session(&first).await.unwrap();

        let mut later = Session::new(email(), Some("Annie".into()), fixed_now() + Duration::days(1));
        later.refresh_cached_score(fixed_now());
        repo.save_session(&later).await.unwrap();

        let stored = repo.find_session_by_email(&email()).await.unwrap().unwrap();
        assert_eq!(stored.created_at(), fixed_now());
        assert_eq!(stored.nickname(), Some("Annie"));
    }

    #[tokio::test]
    async fn append_requires_existing_session() {
        let repo = InMemoryRepository::new();
        let err = repo.append_questions(&email(), &new_questions(2)).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }

    #[tokio::test]
    async fn appended_questions_get_ids_and_list_in_order() {
        let repo = InMemoryRepository::new();
        repo.save_session(&Session::new(email(), None, fixed_now())).await.unwrap();

        let stored = repo.append_questions(&email(), &new_questions(3)).await.unwrap();
        let ids: Vec<u64> = stored.iter().map(|q| q.id().value()).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let listed = repo.list_questions_for_session(&email()).await.unwrap();
        let indexes: Vec<u32> = listed.iter().map(SessionQuestion::index).collect();
        assert_eq!(indexes, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn questions_are_appended_once() {
        let repo = InMemoryRepository::new();
        repo.save_session(&Session::new(email(), None, fixed_now())).await.unwrap();
        repo.append_questions(&email(), &new_questions(2)).await.unwrap();

        let err = repo.append_questions(&email(), &new_questions(2)).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict));
        assert_eq!(repo.list_questions_for_session(&email()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn second_answer_conflicts() {
        let repo = InMemoryRepository::new();
        repo.save_session(&Session::new(email(), None, fixed_now())).await.unwrap();
        let stored = repo.append_questions(&email(), &new_questions(1)).await.unwrap();
        let id = stored[0].id();

        repo.record_answer(id, 2).await.unwrap();
        let err = repo.record_answer(id, 1).await.unwrap_err();

        assert!(matches!(err, StorageError::Conflict));
        assert_eq!(repo.get_question(id).await.unwrap().user_answer(), 2);
    }

    #[tokio::test]
    async fn save_question_never_resets_timer() {
        let repo = InMemoryRepository::new();
        repo.save_session(&Session::new(email(), None, fixed_now())).await.unwrap();
        let stored = repo.append_questions(&email(), &new_questions(1)).await.unwrap();

        let mut first = stored[0].clone();
        first.begin(fixed_now()).unwrap();
        repo.save_question(&first).await.unwrap();

        // a stale copy that was never started must not clear the timer
        repo.save_question(&stored[0]).await.unwrap();

        let fetched = repo.get_question(first.id()).await.unwrap();
        assert_eq!(fetched.started_at(), Some(fixed_now()));
    }

    #[tokio::test]
    async fn unknown_question_is_not_found() {
        let repo = InMemoryRepository::new();
        let err = repo.get_question(QuestionId::new(9)).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }
}
