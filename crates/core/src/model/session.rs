use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::model::{Email, QuestionId, QuestionState, SessionQuestion};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionError {
    #[error("score must be within 0..=100, got {0}")]
    InvalidScore(u8),
}

/// Outcome of scoring a session at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Score {
    /// Rounded share of correct answers among finished questions, 0 when none finished.
    pub percent: u8,
    pub correct: usize,
    /// Answered plus expired questions.
    pub finished: usize,
    pub total: usize,
}

impl Score {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.finished == self.total
    }
}

/// One visitor's quiz, keyed by email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    email: Email,
    nickname: Option<String>,
    score: u8,
    complete: bool,
    created_at: DateTime<Utc>,
    questions: Vec<SessionQuestion>,
}

impl Session {
    /// Start an empty session; questions are attached separately.
    #[must_use]
    pub fn new(email: Email, nickname: Option<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            email,
            nickname: normalize_nickname(nickname),
            score: 0,
            complete: false,
            created_at,
            questions: Vec::new(),
        }
    }

    /// Rehydrate a session row without its questions.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidScore` if the cached score exceeds 100.
    pub fn from_persisted(
        email: Email,
        nickname: Option<String>,
        score: u8,
        complete: bool,
        created_at: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        if score > 100 {
            return Err(SessionError::InvalidScore(score));
        }
        Ok(Self {
            email,
            nickname: normalize_nickname(nickname),
            score,
            complete,
            created_at,
            questions: Vec::new(),
        })
    }

    /// Attach loaded questions, ordered by their presentation index.
    #[must_use]
    pub fn with_questions(mut self, questions: Vec<SessionQuestion>) -> Self {
        self.set_questions(questions);
        self
    }

    pub fn set_questions(&mut self, mut questions: Vec<SessionQuestion>) {
        questions.sort_by_key(SessionQuestion::index);
        self.questions = questions;
    }

    #[must_use]
    pub fn email(&self) -> &Email {
        &self.email
    }

    #[must_use]
    pub fn nickname(&self) -> Option<&str> {
        self.nickname.as_deref()
    }

    /// Score cached by the last [`Session::refresh_cached_score`].
    #[must_use]
    pub fn cached_score(&self) -> u8 {
        self.score
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn questions(&self) -> &[SessionQuestion] {
        &self.questions
    }

    #[must_use]
    pub fn has_questions(&self) -> bool {
        !self.questions.is_empty()
    }

    #[must_use]
    pub fn question(&self, id: QuestionId) -> Option<&SessionQuestion> {
        self.questions.iter().find(|q| q.id() == id)
    }

    pub fn question_mut(&mut self, id: QuestionId) -> Option<&mut SessionQuestion> {
        self.questions.iter_mut().find(|q| q.id() == id)
    }

    /// The question the visitor should be looking at.
    ///
    /// An already started question wins over lower-indexed unseen ones so its
    /// timer does not run out in the background. `None` means the quiz is over.
    #[must_use]
    pub fn current_question(&self, now: DateTime<Utc>) -> Option<&SessionQuestion> {
        self.first_in_state(QuestionState::Active, now)
            .or_else(|| self.first_in_state(QuestionState::Unseen, now))
    }

    fn first_in_state(&self, state: QuestionState, now: DateTime<Utc>) -> Option<&SessionQuestion> {
        self.questions
            .iter()
            .filter(|q| q.state(now) == state)
            .min_by_key(|q| q.index())
    }

    #[must_use]
    pub fn has_expired_questions(&self, now: DateTime<Utc>) -> bool {
        self.questions.iter().any(|q| q.is_expired(now))
    }

    /// Score finished questions; expired ones count as wrong.
    #[must_use]
    pub fn score(&self, now: DateTime<Utc>) -> Score {
        let mut correct = 0;
        let mut finished = 0;
        for q in &self.questions {
            match q.state(now) {
                QuestionState::Answered => {
                    finished += 1;
                    if q.is_correct() {
                        correct += 1;
                    }
                }
                QuestionState::Expired => finished += 1,
                QuestionState::Unseen | QuestionState::Active => {}
            }
        }

        let percent = if finished == 0 {
            0
        } else {
            // round half up without going through floats
            u8::try_from((correct * 200 + finished) / (finished * 2)).unwrap_or(100)
        };

        Score {
            percent,
            correct,
            finished,
            total: self.questions.len(),
        }
    }

    /// Recompute and cache the score and completion flag.
    pub fn refresh_cached_score(&mut self, now: DateTime<Utc>) -> Score {
        let score = self.score(now);
        self.score = score.percent;
        self.complete = score.is_complete();
        score
    }
}

fn normalize_nickname(nickname: Option<String>) -> Option<String> {
    nickname
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
}
