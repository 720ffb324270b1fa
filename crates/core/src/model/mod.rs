mod email;
mod ids;
mod question;
mod session;

pub use email::{Email, EmailError};
pub use ids::{ParseIdError, QuestionId};
pub use question::{
    ALLOWED_SECONDS_SLACK, AnswerError, NewSessionQuestion, Question, QuestionKind,
    QuestionState, SessionQuestion,
};
pub use session::{Score, Session, SessionError};
