use std::sync::Arc;

use quiz_core::model::{Email, QuestionId, Score, Session, SessionQuestion};
use quiz_core::pool::QuestionPool;
use quiz_core::selection::{Quiz, QuizGenerator, QuizOptions};
use storage::repository::{QuestionRepository, SessionRepository, Storage, StorageError};
use tracing::{debug, info, warn};

use crate::Clock;
use crate::error::{Missing, QuizError, ValidationError};
use crate::leaderboard::Leaderboard;

/// Orchestrates quiz generation, session lifecycle and answering.
///
/// Every time-dependent decision reads the injected [`Clock`], so a service
/// built with `Clock::fixed` behaves deterministically.
#[derive(Clone)]
pub struct QuizService {
    clock: Clock,
    sessions: Arc<dyn SessionRepository>,
    questions: Arc<dyn QuestionRepository>,
}

impl QuizService {
    #[must_use]
    pub fn new(
        clock: Clock,
        sessions: Arc<dyn SessionRepository>,
        questions: Arc<dyn QuestionRepository>,
    ) -> Self {
        Self {
            clock,
            sessions,
            questions,
        }
    }

    #[must_use]
    pub fn from_storage(clock: Clock, storage: &Storage) -> Self {
        Self::new(
            clock,
            Arc::clone(&storage.sessions),
            Arc::clone(&storage.questions),
        )
    }

    /// Same repositories, different clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn clock(&self) -> Clock {
        self.clock
    }

    //
    // ─── GENERATION ────────────────────────────────────────────────────────────
    //

    /// Build a balanced quiz from the valid questions of `pool`.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::NotEnoughQuestions` if the difficulty range holds
    /// fewer valid questions than requested.
    /// Returns `QuizError::Validation` for empty or inverted options.
    pub fn generate_quiz(pool: &QuestionPool, options: QuizOptions) -> Result<Quiz, QuizError> {
        Self::generate_with(&QuizGenerator::new(options), pool)
    }

    /// Build a quiz with an explicitly configured generator.
    ///
    /// # Errors
    ///
    /// Same as [`QuizService::generate_quiz`].
    pub fn generate_with(generator: &QuizGenerator, pool: &QuestionPool) -> Result<Quiz, QuizError> {
        let quiz = generator.generate(pool).inspect_err(|err| {
            warn!(error = %err, pool_size = pool.len(), "quiz generation failed");
        })?;
        debug!(questions = quiz.len(), "quiz generated");
        Ok(quiz)
    }

    //
    // ─── SESSIONS ──────────────────────────────────────────────────────────────
    //

    /// Return the session for `email` with its questions, creating an empty one
    /// if none exists.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::Validation` if `email` is malformed.
    /// Returns `QuizError::Persistence` if storage fails.
    pub async fn create_or_get_session(
        &self,
        email: &str,
        nickname: Option<String>,
    ) -> Result<Session, QuizError> {
        let email = Email::parse(email)?;
        if let Some(session) = self.find_session(&email).await? {
            return Ok(session);
        }
        self.create_session(email, nickname).await
    }

    /// Load a session with its questions, or `None` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::Persistence` if storage fails.
    pub async fn find_session(&self, email: &Email) -> Result<Option<Session>, QuizError> {
        match self.sessions.find_session_by_email(email).await? {
            Some(session) => Ok(Some(self.with_questions(session).await?)),
            None => Ok(None),
        }
    }

    /// Load a session with its questions.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::NotFound` if no session exists for `email`.
    /// Returns `QuizError::Persistence` if storage fails.
    pub async fn load_session(&self, email: &Email) -> Result<Session, QuizError> {
        self.find_session(email)
            .await?
            .ok_or_else(|| QuizError::NotFound(Missing::Session(email.clone())))
    }

    pub(crate) async fn create_session(
        &self,
        email: Email,
        nickname: Option<String>,
    ) -> Result<Session, QuizError> {
        let session = Session::new(email, nickname, self.clock.now());
        self.sessions.save_session(&session).await?;
        info!(email = %session.email(), "session created");
        Ok(session)
    }

    async fn with_questions(&self, session: Session) -> Result<Session, QuizError> {
        let questions = self
            .questions
            .list_questions_for_session(session.email())
            .await?;
        Ok(session.with_questions(questions))
    }

    /// Persist the questions of `quiz` under `session`, assigning ids and
    /// indexes starting at 1.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::QuizAlreadyAttached` if the session already
    /// has stored questions, including ones stored by a concurrent call.
    /// Returns `QuizError::NotFound` if the session row does not exist.
    /// Returns `QuizError::Persistence` if storage fails.
    pub async fn attach_quiz(&self, session: &mut Session, quiz: &Quiz) -> Result<(), QuizError> {
        let email = session.email().clone();
        let stored = match self
            .questions
            .append_questions(&email, &quiz.to_session_questions())
            .await
        {
            Ok(stored) => stored,
            Err(StorageError::Conflict) => {
                warn!(email = %email, "refusing to attach a second quiz");
                return Err(ValidationError::QuizAlreadyAttached(email).into());
            }
            Err(StorageError::NotFound) => {
                return Err(QuizError::NotFound(Missing::Session(email)));
            }
            Err(err) => return Err(err.into()),
        };
        info!(email = %email, questions = stored.len(), "quiz attached");
        session.set_questions(stored);
        self.refresh_score(session).await?;
        Ok(())
    }

    /// Generate and attach a quiz unless the session already has one.
    ///
    /// Returns `true` when a new quiz was attached.
    ///
    /// # Errors
    ///
    /// Any error from [`QuizService::generate_quiz`] or [`QuizService::attach_quiz`].
    pub async fn ensure_quiz(
        &self,
        session: &mut Session,
        pool: &QuestionPool,
        options: QuizOptions,
    ) -> Result<bool, QuizError> {
        if session.has_questions() {
            return Ok(false);
        }
        let quiz = Self::generate_quiz(pool, options)?;
        self.attach_quiz(session, &quiz).await?;
        Ok(true)
    }

    //
    // ─── QUESTIONS ─────────────────────────────────────────────────────────────
    //

    /// The question the visitor should see now: an active one first, otherwise
    /// the lowest-index unseen one.
    #[must_use]
    pub fn current_question<'a>(&self, session: &'a Session) -> Option<&'a SessionQuestion> {
        session.current_question(self.clock.now())
    }

    /// Start the timer of `question` if it has not started yet.
    ///
    /// The stored row is authoritative, as in [`QuizService::submit_answer`].
    /// Returns `true` when this call started the timer. On success `question`
    /// reflects the stored row; on error it is left untouched.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::AlreadyAnsweredOrExpired` for finished questions.
    /// Returns `QuizError::NotFound` if the question row is gone.
    /// Returns `QuizError::Persistence` if storage fails.
    pub async fn begin_question(&self, question: &mut SessionQuestion) -> Result<bool, QuizError> {
        let id = question.id();
        let mut stored = self.fetch_question(id).await?;
        let started = stored.begin(self.clock.now())?;

        if started {
            self.questions
                .save_question(&stored)
                .await
                .map_err(|err| question_error(err, id))?;
            // Another worker may have started it first; the stored timer wins.
            stored = self.fetch_question(id).await?;
            debug!(question = %id, "question started");
        }

        *question = stored;
        Ok(started)
    }

    /// Find the current question of `session`, start it and return a copy.
    ///
    /// # Errors
    ///
    /// Any error from [`QuizService::begin_question`].
    pub async fn present_current(
        &self,
        session: &mut Session,
    ) -> Result<Option<SessionQuestion>, QuizError> {
        let Some(id) = self.current_question(session).map(SessionQuestion::id) else {
            return Ok(None);
        };
        let Some(question) = session.question_mut(id) else {
            return Ok(None);
        };
        self.begin_question(question).await?;
        Ok(Some(question.clone()))
    }

    /// Record `answer` (1-based) for `question`.
    ///
    /// The stored row is authoritative: a concurrent answer or an elapsed timer
    /// rejects the submission even if `question` is stale.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::AlreadyAnsweredOrExpired` if the question is answered,
    /// expired, or was answered concurrently.
    /// Returns `ValidationError::Answer` if `answer` is out of range.
    /// Returns `QuizError::NotFound` if the question row is gone.
    /// Returns `QuizError::Persistence` if storage fails.
    pub async fn submit_answer(
        &self,
        question: &mut SessionQuestion,
        answer: u32,
    ) -> Result<(), QuizError> {
        let id = question.id();
        let mut stored = self.fetch_question(id).await?;
        stored
            .submit_answer(answer, self.clock.now())
            .inspect_err(|err| warn!(question = %id, error = %err, "answer rejected"))?;

        match self.questions.record_answer(id, answer).await {
            Ok(()) => {}
            Err(StorageError::Conflict) => {
                warn!(question = %id, "answer lost a race with another submission");
                return Err(QuizError::AlreadyAnsweredOrExpired);
            }
            Err(err) => return Err(question_error(err, id)),
        }

        debug!(question = %id, correct = stored.is_correct(), "answer recorded");
        *question = stored;
        Ok(())
    }

    /// Submit an answer for a question of `session` and refresh its score.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::ForeignQuestion` if `id` is not part of the session.
    /// Otherwise any error from [`QuizService::submit_answer`] or
    /// [`QuizService::refresh_score`].
    pub async fn answer(
        &self,
        session: &mut Session,
        id: QuestionId,
        answer: u32,
    ) -> Result<Score, QuizError> {
        let question = session
            .question_mut(id)
            .ok_or(ValidationError::ForeignQuestion(id))?;
        self.submit_answer(question, answer).await?;
        self.refresh_score(session).await
    }

    async fn fetch_question(&self, id: QuestionId) -> Result<SessionQuestion, QuizError> {
        self.questions
            .get_question(id)
            .await
            .map_err(|err| question_error(err, id))
    }

    //
    // ─── SCORING ───────────────────────────────────────────────────────────────
    //

    /// Score `session` as of now without touching storage.
    #[must_use]
    pub fn compute_score(&self, session: &Session) -> Score {
        session.score(self.clock.now())
    }

    /// Recompute the score, cache it on the session and persist the session row.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::Persistence` if storage fails.
    pub async fn refresh_score(&self, session: &mut Session) -> Result<Score, QuizError> {
        let was_complete = session.is_complete();
        let score = session.refresh_cached_score(self.clock.now());
        self.sessions.save_session(session).await?;
        if score.is_complete() && !was_complete {
            info!(
                email = %session.email(),
                score = score.percent,
                correct = score.correct,
                total = score.total,
                "session completed"
            );
        }
        Ok(score)
    }

    /// Completed and in-progress sessions with fresh scores.
    ///
    /// Sessions whose cached score went stale because timers ran out are
    /// refreshed and saved on the way.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::Persistence` if storage fails.
    pub async fn leaderboard(&self) -> Result<Leaderboard, QuizError> {
        let rows = self.sessions.list_sessions().await?;
        let mut sessions = Vec::with_capacity(rows.len());
        for row in rows {
            let mut session = self.with_questions(row).await?;
            let score = self.compute_score(&session);
            if score.percent != session.cached_score() || score.is_complete() != session.is_complete()
            {
                self.refresh_score(&mut session).await?;
            }
            sessions.push(session);
        }
        Ok(Leaderboard::build(&sessions))
    }
}

fn question_error(err: StorageError, id: QuestionId) -> QuizError {
    match err {
        StorageError::NotFound => QuizError::NotFound(Missing::Question(id)),
        other => other.into(),
    }
}
