//! Shared error types for the services crate.

use std::fmt;

use thiserror::Error;

use quiz_core::model::{AnswerError, Email, EmailError, QuestionId};
use quiz_core::pool::PoolError;
use quiz_core::selection::SelectionError;
use storage::repository::StorageError;

/// Input the visitor or host got wrong.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValidationError {
    #[error(transparent)]
    Email(#[from] EmailError),
    #[error("answer {index} is out of range 1..={max}")]
    Answer { index: u32, max: usize },
    #[error("invalid quiz options: {0}")]
    Options(SelectionError),
    #[error("a quiz is already attached to {0}")]
    QuizAlreadyAttached(Email),
    #[error("question {0} does not belong to this session")]
    ForeignQuestion(QuestionId),
    #[error("identity has expired")]
    IdentityExpired,
    #[error("email has already been used")]
    EmailAlreadyUsed,
    #[error("already started with email {0}")]
    EmailMismatch(Email),
}

/// What a `NotFound` error refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Missing {
    Session(Email),
    Question(QuestionId),
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Missing::Session(email) => write!(f, "session {email}"),
            Missing::Question(id) => write!(f, "question {id}"),
        }
    }
}

/// Errors emitted by `QuizService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuizError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("not enough questions: requested {requested}, available {available}")]
    NotEnoughQuestions { requested: usize, available: usize },
    #[error("{0} not found")]
    NotFound(Missing),
    #[error("question is already answered or expired")]
    AlreadyAnsweredOrExpired,
    #[error(transparent)]
    Load(#[from] PoolError),
    #[error(transparent)]
    Persistence(#[from] StorageError),
}

impl QuizError {
    /// True for errors caused by the request rather than the system.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            QuizError::Validation(_) | QuizError::NotFound(_) | QuizError::AlreadyAnsweredOrExpired
        )
    }
}

impl From<EmailError> for QuizError {
    fn from(e: EmailError) -> Self {
        QuizError::Validation(e.into())
    }
}

impl From<SelectionError> for QuizError {
    fn from(e: SelectionError) -> Self {
        match e {
            SelectionError::NotEnoughQuestions {
                requested,
                available,
            } => QuizError::NotEnoughQuestions {
                requested,
                available,
            },
            other => QuizError::Validation(ValidationError::Options(other)),
        }
    }
}

impl From<AnswerError> for QuizError {
    fn from(e: AnswerError) -> Self {
        match e {
            AnswerError::InvalidAnswer { index, max } => {
                QuizError::Validation(ValidationError::Answer { index, max })
            }
            _ => QuizError::AlreadyAnsweredOrExpired,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_errors_split_by_kind() {
        let err: QuizError = SelectionError::NotEnoughQuestions {
            requested: 5,
            available: 2,
        }
        .into();
        assert!(matches!(
            err,
            QuizError::NotEnoughQuestions {
                requested: 5,
                available: 2
            }
        ));

        let err: QuizError = SelectionError::EmptyQuiz.into();
        assert!(matches!(err, QuizError::Validation(ValidationError::Options(_))));
    }

    #[test]
    fn answer_errors_map_to_quiz_errors() {
        let err: QuizError = AnswerError::InvalidAnswer { index: 9, max: 3 }.into();
        assert!(matches!(
            err,
            QuizError::Validation(ValidationError::Answer { index: 9, max: 3 })
        ));

        let err: QuizError = AnswerError::AlreadyAnsweredOrExpired.into();
        assert!(matches!(err, QuizError::AlreadyAnsweredOrExpired));
    }

    #[test]
    fn client_errors_are_flagged() {
        assert!(QuizError::AlreadyAnsweredOrExpired.is_client_error());
        assert!(QuizError::NotFound(Missing::Question(QuestionId::new(3))).is_client_error());
        assert!(!QuizError::Persistence(StorageError::Connection("down".into())).is_client_error());
    }

    #[test]
    fn not_found_names_the_missing_thing() {
        let err = QuizError::NotFound(Missing::Question(QuestionId::new(7)));
        assert_eq!(err.to_string(), "question 7 not found");
    }
}
