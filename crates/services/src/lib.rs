#![forbid(unsafe_code)]

pub mod admission;
pub mod error;
pub mod leaderboard;
pub mod quiz_service;

pub use quiz_core::Clock;

pub use admission::{Admission, AdmissionPolicy, Identity, IdentityProvider};
pub use error::{Missing, QuizError, ValidationError};
pub use leaderboard::{Leaderboard, LeaderboardEntry};
pub use quiz_service::QuizService;
