//! Who may start or resume a quiz.
//!
//! The host keeps a signed identity (for a web frontend, a cookie) that names
//! the email a visitor started with. The rules:
//!
//! - no identity and the email already has a session: rejected, someone else
//!   started with it;
//! - identity for a different email: rejected;
//! - identity older than the policy lifetime: rejected;
//! - identity but its session is gone: a fresh session is created.

use chrono::{DateTime, Duration, Utc};
use quiz_core::model::{Email, Session};
use tracing::{info, warn};

use crate::error::{QuizError, ValidationError};
use crate::quiz_service::QuizService;

/// Default identity lifetime, one hour.
pub const DEFAULT_IDENTITY_LIFETIME_SECS: i64 = 3600;

/// The email a visitor proved earlier, and when that proof was issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub email: Email,
    pub issued_at: DateTime<Utc>,
}

impl Identity {
    #[must_use]
    pub fn new(email: Email, issued_at: DateTime<Utc>) -> Self {
        Self { email, issued_at }
    }
}

/// Source of the visitor's identity, if they have one.
pub trait IdentityProvider {
    fn identity(&self) -> Option<Identity>;
}

impl IdentityProvider for Option<Identity> {
    fn identity(&self) -> Option<Identity> {
        self.clone()
    }
}

impl IdentityProvider for Identity {
    fn identity(&self) -> Option<Identity> {
        Some(self.clone())
    }
}

/// Outcome of a successful admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub session: Session,
    /// Set when a new session was created and the host should issue an identity.
    pub issue: Option<Identity>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionPolicy {
    lifetime: Duration,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_IDENTITY_LIFETIME_SECS))
    }
}

impl AdmissionPolicy {
    #[must_use]
    pub fn new(lifetime: Duration) -> Self {
        Self { lifetime }
    }

    #[must_use]
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// An identity is fresh while `now` is within the lifetime of `issued_at`.
    #[must_use]
    pub fn is_fresh(&self, identity: &Identity, now: DateTime<Utc>) -> bool {
        now <= identity.issued_at + self.lifetime
    }

    /// Resolve the session a visitor submitting `email` may use.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::Validation` with `EmailAlreadyUsed`, `EmailMismatch`
    /// or `IdentityExpired` per the module rules, or for a malformed email.
    /// Returns `QuizError::Persistence` if storage fails.
    pub async fn admit(
        &self,
        service: &QuizService,
        provider: &impl IdentityProvider,
        email: &str,
        nickname: Option<String>,
    ) -> Result<Admission, QuizError> {
        let email = Email::parse(email)?;
        let now = service.clock().now();

        let Some(identity) = provider.identity() else {
            if service.find_session(&email).await?.is_some() {
                warn!(email = %email, "email already used without identity");
                return Err(ValidationError::EmailAlreadyUsed.into());
            }
            return start(service, email, nickname, now).await;
        };

        if !self.is_fresh(&identity, now) {
            return Err(ValidationError::IdentityExpired.into());
        }
        if identity.email != email {
            warn!(identity = %identity.email, submitted = %email, "email mismatch");
            return Err(ValidationError::EmailMismatch(identity.email).into());
        }

        match service.find_session(&email).await? {
            Some(session) => Ok(Admission {
                session,
                issue: None,
            }),
            None => {
                info!(email = %email, "identity without session, starting over");
                start(service, email, nickname, now).await
            }
        }
    }
}

async fn start(
    service: &QuizService,
    email: Email,
    nickname: Option<String>,
    now: DateTime<Utc>,
) -> Result<Admission, QuizError> {
    let session = service.create_session(email.clone(), nickname).await?;
    Ok(Admission {
        session,
        issue: Some(Identity::new(email, now)),
    })
}
