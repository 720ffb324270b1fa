use chrono::{DateTime, Utc};
use quiz_core::model::Session;
use serde::Serialize;

/// One row of the public session list. Emails are obfuscated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    pub email: String,
    pub nickname: Option<String>,
    pub score: u8,
    pub created_at: DateTime<Utc>,
}

impl LeaderboardEntry {
    #[must_use]
    pub fn from_session(session: &Session) -> Self {
        Self {
            email: session.email().obfuscated(),
            nickname: session.nickname().map(str::to_owned),
            score: session.cached_score(),
            created_at: session.created_at(),
        }
    }

    /// Nickname if set, obfuscated email otherwise.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.nickname.as_deref().unwrap_or(&self.email)
    }
}

/// Completed sessions ranked by score, plus sessions still in progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Leaderboard {
    pub completed: Vec<LeaderboardEntry>,
    pub in_progress: Vec<LeaderboardEntry>,
}

impl Leaderboard {
    /// Split sessions by completion using their cached flags.
    ///
    /// Completed entries are ordered by score descending, earlier sessions first
    /// on ties. In-progress entries keep creation order.
    #[must_use]
    pub fn build(sessions: &[Session]) -> Self {
        let mut board = Self::default();
        for session in sessions {
            let entry = LeaderboardEntry::from_session(session);
            if session.is_complete() {
                board.completed.push(entry);
            } else {
                board.in_progress.push(entry);
            }
        }
        board.completed.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        board.in_progress.sort_by_key(|entry| entry.created_at);
        board
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.completed.is_empty() && self.in_progress.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use quiz_core::model::Email;
    use quiz_core::time::fixed_now;

    fn session(email: &str, score: u8, complete: bool, offset: i64) -> Session {
        Session::from_persisted(
            Email::parse(email).unwrap(),
            None,
            score,
            complete,
            fixed_now() + Duration::seconds(offset),
        )
        .unwrap()
    }

    #[test]
    fn completed_sorted_by_score_then_age() {
        let board = Leaderboard::build(&[
            session("first@example.com", 40, true, 0),
            session("second@example.com", 90, true, 10),
            session("third@example.com", 40, true, -10),
            session("fourth@example.com", 0, false, 5),
        ]);

        let scores: Vec<(u8, String)> = board
            .completed
            .iter()
            .map(|e| (e.score, e.email.clone()))
            .collect();
        assert_eq!(
            scores,
            vec![
                (90, "s....d@e.....e.com".to_owned()),
                (40, "t...d@e.....e.com".to_owned()),
                (40, "f...t@e.....e.com".to_owned()),
            ]
        );
        assert_eq!(board.in_progress.len(), 1);
    }

    #[test]
    fn display_name_prefers_nickname() {
        let with_nick = Session::new(
            Email::parse("ada@example.com").unwrap(),
            Some("Ada".into()),
            fixed_now(),
        );
        let entry = LeaderboardEntry::from_session(&with_nick);
        assert_eq!(entry.display_name(), "Ada");

        let plain = LeaderboardEntry::from_session(&session("bob@example.com", 0, false, 0));
        assert_eq!(plain.display_name(), "b.b@e.....e.com");
    }
}
