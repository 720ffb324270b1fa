use chrono::Duration;
use quiz_core::model::Email;
use quiz_core::time::fixed_clock;
use services::{AdmissionPolicy, Identity, QuizError, QuizService, ValidationError};
use storage::repository::Storage;

fn service() -> QuizService {
    QuizService::from_storage(fixed_clock(), &Storage::in_memory())
}

fn no_identity() -> Option<Identity> {
    None
}

#[tokio::test]
async fn first_visit_creates_session_and_issues_identity() {
    let service = service();
    let policy = AdmissionPolicy::default();

    let admission = policy
        .admit(&service, &no_identity(), "Ada@Example.com", Some("ada".into()))
        .await
        .unwrap();

    let issued = admission.issue.expect("identity issued");
    assert_eq!(issued.email.as_str(), "ada@example.com");
    assert_eq!(issued.issued_at, service.clock().now());
    assert_eq!(admission.session.nickname(), Some("ada"));
}

#[tokio::test]
async fn used_email_without_identity_is_rejected() {
    let service = service();
    let policy = AdmissionPolicy::default();
    policy
        .admit(&service, &no_identity(), "ada@example.com", None)
        .await
        .unwrap();

    let err = policy
        .admit(&service, &no_identity(), "ADA@example.com", None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        QuizError::Validation(ValidationError::EmailAlreadyUsed)
    ));
}

#[tokio::test]
async fn matching_identity_resumes_session() {
    let service = service();
    let policy = AdmissionPolicy::default();
    let first = policy
        .admit(&service, &no_identity(), "ada@example.com", Some("ada".into()))
        .await
        .unwrap();
    let identity = first.issue.unwrap();

    let later = service.with_clock(fixed_clock().advanced(Duration::minutes(59)));
    let again = policy
        .admit(&later, &identity, "ada@example.com", Some("someone else".into()))
        .await
        .unwrap();

    assert!(again.issue.is_none());
    assert_eq!(again.session, first.session);
}

#[tokio::test]
async fn identity_for_other_email_is_rejected() {
    let service = service();
    let policy = AdmissionPolicy::default();
    let identity = Identity::new(
        Email::parse("ada@example.com").unwrap(),
        service.clock().now(),
    );

    let err = policy
        .admit(&service, &identity, "bob@example.com", None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        QuizError::Validation(ValidationError::EmailMismatch(ref e)) if e.as_str() == "ada@example.com"
    ));
}

#[tokio::test]
async fn stale_identity_is_rejected() {
    let service = service();
    let policy = AdmissionPolicy::new(Duration::seconds(60));
    let identity = Identity::new(
        Email::parse("ada@example.com").unwrap(),
        service.clock().now(),
    );

    let later = service.with_clock(fixed_clock().advanced(Duration::seconds(61)));
    let err = policy
        .admit(&later, &identity, "ada@example.com", None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        QuizError::Validation(ValidationError::IdentityExpired)
    ));
}

#[tokio::test]
async fn identity_without_session_starts_over() {
    let service = service();
    let identity = Identity::new(
        Email::parse("ada@example.com").unwrap(),
        service.clock().now(),
    );

    let admission = AdmissionPolicy::default()
        .admit(&service, &identity, "ada@example.com", None)
        .await
        .unwrap();

    assert!(admission.issue.is_some());
    assert!(!admission.session.has_questions());
    assert!(service
        .find_session(admission.session.email())
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn malformed_email_is_rejected_before_lookup() {
    let err = AdmissionPolicy::default()
        .admit(&service(), &no_identity(), "ada@", None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        QuizError::Validation(ValidationError::Email(_))
    ));
}
