use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Email, QuestionId};

/// Seconds granted on top of `allowed_seconds` to absorb rendering and network latency.
pub const ALLOWED_SECONDS_SLACK: i64 = 2;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AnswerError {
    #[error("answer {index} is out of range 1..={max}")]
    InvalidAnswer { index: u32, max: usize },

    #[error("question is already answered or expired")]
    AlreadyAnsweredOrExpired,
}

//
// ─── POOL QUESTION ─────────────────────────────────────────────────────────────
//

/// Free-form type tag such as `multiple-choice` or `boolean`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionKind(String);

impl QuestionKind {
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A question definition as read from a pool.
///
/// Missing fields take zero values. `right_answer` is 1-based; 0 means unset.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Question {
    pub text: String,
    pub difficulty: i32,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    pub right_answer: u32,
    pub answers: Vec<String>,
    pub allowed_seconds: u32,
}

impl Question {
    /// A question is usable only if its right answer points into `answers`.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.right_answer >= 1 && answer_in_range(self.right_answer, self.answers.len())
    }

    #[must_use]
    pub fn is_correct(&self, answer: u32) -> bool {
        answer != 0 && answer == self.right_answer
    }
}

fn answer_in_range(answer: u32, len: usize) -> bool {
    usize::try_from(answer).is_ok_and(|a| a >= 1 && a <= len)
}

/// A generated question ready to be stored under a session at position `index`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSessionQuestion {
    pub index: u32,
    pub question: Question,
}

//
// ─── SESSION QUESTION ──────────────────────────────────────────────────────────
//

/// Lifecycle of a session question, derived from its fields at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionState {
    Unseen,
    Active,
    Answered,
    Expired,
}

impl QuestionState {
    /// Answered and Expired questions count towards the score.
    #[must_use]
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Answered | Self::Expired)
    }
}

/// Per-session copy of a pool question, carrying the visitor's progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionQuestion {
    id: QuestionId,
    session_email: Email,
    index: u32,
    question: Question,
    started_at: Option<DateTime<Utc>>,
    user_answer: u32,
}

impl SessionQuestion {
    /// Rehydrate a stored question.
    #[must_use]
    pub fn from_persisted(
        id: QuestionId,
        session_email: Email,
        index: u32,
        question: Question,
        started_at: Option<DateTime<Utc>>,
        user_answer: u32,
    ) -> Self {
        Self {
            id,
            session_email,
            index,
            question,
            started_at,
            user_answer,
        }
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn session_email(&self) -> &Email {
        &self.session_email
    }

    /// 1-based presentation position within the session.
    #[must_use]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[must_use]
    pub fn question(&self) -> &Question {
        &self.question
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.question.text
    }

    #[must_use]
    pub fn difficulty(&self) -> i32 {
        self.question.difficulty
    }

    #[must_use]
    pub fn answers(&self) -> &[String] {
        &self.question.answers
    }

    #[must_use]
    pub fn right_answer(&self) -> u32 {
        self.question.right_answer
    }

    #[must_use]
    pub fn allowed_seconds(&self) -> u32 {
        self.question.allowed_seconds
    }

    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Submitted answer, 0 while unanswered.
    #[must_use]
    pub fn user_answer(&self) -> u32 {
        self.user_answer
    }

    #[must_use]
    pub fn state(&self, now: DateTime<Utc>) -> QuestionState {
        if self.user_answer != 0 {
            return QuestionState::Answered;
        }
        match self.started_at {
            None => QuestionState::Unseen,
            Some(started) => {
                let elapsed = (now - started).num_seconds();
                let budget = i64::from(self.question.allowed_seconds) + ALLOWED_SECONDS_SLACK;
                if elapsed > budget {
                    QuestionState::Expired
                } else {
                    QuestionState::Active
                }
            }
        }
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.state(now) == QuestionState::Expired
    }

    /// True when the question was answered with the right answer.
    #[must_use]
    pub fn is_correct(&self) -> bool {
        self.question.is_correct(self.user_answer)
    }

    /// Instant at which the visible countdown reaches zero (slack excluded).
    #[must_use]
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.started_at
            .map(|started| started + Duration::seconds(i64::from(self.question.allowed_seconds)))
    }

    /// Remaining time to show the visitor; `None` until the question is started.
    #[must_use]
    pub fn time_left(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.deadline()
            .map(|deadline| (deadline - now).max(Duration::zero()))
    }

    /// Start the timer if the question has not been shown yet.
    ///
    /// Returns `Ok(true)` when the timer was started and `Ok(false)` when the
    /// question was already active; an active timer is never reset.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError::AlreadyAnsweredOrExpired` for finished questions.
    pub fn begin(&mut self, now: DateTime<Utc>) -> Result<bool, AnswerError> {
        match self.state(now) {
            QuestionState::Unseen => {
                self.started_at = Some(now);
                Ok(true)
            }
            QuestionState::Active => Ok(false),
            QuestionState::Answered | QuestionState::Expired => {
                Err(AnswerError::AlreadyAnsweredOrExpired)
            }
        }
    }

    /// Record the visitor's answer.
    ///
    /// Expiry is judged against `now`, the server's time of submission.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError::AlreadyAnsweredOrExpired` if the question is finished,
    /// or `AnswerError::InvalidAnswer` if `answer` does not point into the answers.
    pub fn submit_answer(&mut self, answer: u32, now: DateTime<Utc>) -> Result<(), AnswerError> {
        if self.state(now).is_finished() {
            return Err(AnswerError::AlreadyAnsweredOrExpired);
        }
        if !answer_in_range(answer, self.question.answers.len()) {
            return Err(AnswerError::InvalidAnswer {
                index: answer,
                max: self.question.answers.len(),
            });
        }
        self.user_answer = answer;
        Ok(())
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn question(right_answer: u32, allowed_seconds: u32) -> Question {
        Question {
            text: "Capital of Greece?".into(),
            difficulty: 1,
            kind: QuestionKind::new("multiple-choice"),
            right_answer,
            answers: vec!["Athens".into(), "Sparta".into(), "Thebes".into()],
            allowed_seconds,
        }
    }

    fn session_question(allowed_seconds: u32) -> SessionQuestion {
        SessionQuestion::from_persisted(
            QuestionId::new(1),
            Email::parse("ann@example.com").unwrap(),
            1,
            question(1, allowed_seconds),
            None,
            0,
        )
    }

    #[test]
    fn validity_requires_right_answer_in_bounds() {
        assert!(question(1, 10).is_valid());
        assert!(question(3, 10).is_valid());
        assert!(!question(0, 10).is_valid());
        assert!(!question(4, 10).is_valid());
    }

    #[test]
    fn unseen_question_never_expires() {
        let q = session_question(10);
        let far_future = fixed_now() + Duration::days(365);
        assert_eq!(q.state(far_future), QuestionState::Unseen);
        assert!(!q.is_expired(far_future));
    }

    #[test]
    fn expiry_honours_slack() {
        let now = fixed_now();
        let mut q = session_question(10);
        q.begin(now).unwrap();

        assert_eq!(q.state(now + Duration::seconds(12)), QuestionState::Active);
        assert_eq!(q.state(now + Duration::seconds(13)), QuestionState::Expired);
    }

    #[test]
    fn begin_is_idempotent_and_keeps_timer() {
        let now = fixed_now();
        let mut q = session_question(10);

        assert!(q.begin(now).unwrap());
        assert!(!q.begin(now + Duration::seconds(5)).unwrap());
        assert_eq!(q.started_at(), Some(now));
    }

    #[test]
    fn begin_rejects_finished_question() {
        let now = fixed_now();
        let mut q = session_question(10);
        q.begin(now).unwrap();

        let err = q.begin(now + Duration::minutes(1)).unwrap_err();
        assert_eq!(err, AnswerError::AlreadyAnsweredOrExpired);
    }

    #[test]
    fn submit_on_expired_question_is_rejected_without_mutation() {
        let now = fixed_now();
        let mut q = session_question(10);
        q.begin(now).unwrap();

        let err = q.submit_answer(1, now + Duration::seconds(30)).unwrap_err();
        assert_eq!(err, AnswerError::AlreadyAnsweredOrExpired);
        assert_eq!(q.user_answer(), 0);
    }

    #[test]
    fn second_submission_is_rejected() {
        let now = fixed_now();
        let mut q = session_question(10);
        q.begin(now).unwrap();

        q.submit_answer(2, now + Duration::seconds(1)).unwrap();
        let err = q.submit_answer(1, now + Duration::seconds(2)).unwrap_err();

        assert_eq!(err, AnswerError::AlreadyAnsweredOrExpired);
        assert_eq!(q.user_answer(), 2);
        assert_eq!(q.state(now + Duration::hours(1)), QuestionState::Answered);
        assert!(!q.is_correct());
    }

    #[test]
    fn submit_rejects_out_of_range_answer() {
        let now = fixed_now();
        let mut q = session_question(10);
        q.begin(now).unwrap();

        assert_eq!(
            q.submit_answer(0, now).unwrap_err(),
            AnswerError::InvalidAnswer { index: 0, max: 3 }
        );
        assert_eq!(
            q.submit_answer(4, now).unwrap_err(),
            AnswerError::InvalidAnswer { index: 4, max: 3 }
        );
        assert_eq!(q.state(now), QuestionState::Active);
    }

    #[test]
    fn time_left_counts_down_to_zero() {
        let now = fixed_now();
        let mut q = session_question(30);
        assert_eq!(q.time_left(now), None);

        q.begin(now).unwrap();
        assert_eq!(q.time_left(now + Duration::seconds(10)), Some(Duration::seconds(20)));
        assert_eq!(q.time_left(now + Duration::seconds(45)), Some(Duration::zero()));
    }
}
