use chrono::Duration;
use quiz_core::model::{Email, NewSessionQuestion, Question, QuestionKind, Session};
use quiz_core::time::fixed_now;
use storage::repository::{QuestionRepository, SessionRepository, StorageError};
use storage::sqlite::SqliteRepository;

async fn repo(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

fn email(raw: &str) -> Email {
    Email::parse(raw).unwrap()
}

fn quiz(n: u32) -> Vec<NewSessionQuestion> {
    (1..=n)
        .map(|index| NewSessionQuestion {
            index,
            question: Question {
                text: format!("Question {index}"),
                difficulty: i32::try_from(index).unwrap(),
                kind: QuestionKind::new("multiple-choice"),
                right_answer: 2,
                answers: vec!["one".into(), "two, with comma".into(), "three".into()],
                allowed_seconds: 30,
            },
        })
        .collect()
}

#[tokio::test]
async fn sqlite_roundtrips_sessions() {
    let repo = repo("memdb_sessions").await;
    let ann = email("ann@example.com");

    assert!(repo.find_session_by_email(&ann).await.unwrap().is_none());

    let session = Session::new(ann.clone(), Some("Ann".into()), fixed_now());
    repo.save_session(&session).await.unwrap();

    let mut updated = Session::new(ann.clone(), Some("Ann".into()), fixed_now() + Duration::hours(1));
    updated.refresh_cached_score(fixed_now());
    repo.save_session(&updated).await.unwrap();

    let fetched = repo.find_session_by_email(&ann).await.unwrap().expect("session");
    assert_eq!(fetched.email(), &ann);
    assert_eq!(fetched.nickname(), Some("Ann"));
    assert_eq!(fetched.created_at(), fixed_now());
    assert!(!fetched.is_complete());

    let bob = email("bob@example.com");
    repo.save_session(&Session::new(bob.clone(), None, fixed_now() + Duration::minutes(1)))
        .await
        .unwrap();
    let listed: Vec<Email> = repo
        .list_sessions()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.email().clone())
        .collect();
    assert_eq!(listed, vec![ann, bob]);
}

#[tokio::test]
async fn sqlite_roundtrips_questions_and_progress() {
    let repo = repo("memdb_questions").await;
    let ann = email("ann@example.com");
    repo.save_session(&Session::new(ann.clone(), None, fixed_now()))
        .await
        .unwrap();

    let stored = repo.append_questions(&ann, &quiz(3)).await.unwrap();
    assert_eq!(stored.len(), 3);

    let mut first = stored[0].clone();
    first.begin(fixed_now()).unwrap();
    repo.save_question(&first).await.unwrap();
    repo.record_answer(first.id(), 2).await.unwrap();

    let listed = repo.list_questions_for_session(&ann).await.unwrap();
    let indexes: Vec<u32> = listed.iter().map(|q| q.index()).collect();
    assert_eq!(indexes, vec![1, 2, 3]);

    let fetched = &listed[0];
    assert_eq!(fetched.id(), first.id());
    assert_eq!(fetched.started_at(), Some(fixed_now()));
    assert_eq!(fetched.user_answer(), 2);
    assert!(fetched.is_correct());
    assert_eq!(fetched.answers()[1], "two, with comma");
    assert_eq!(fetched.question().kind.as_str(), "multiple-choice");
    assert_eq!(fetched.allowed_seconds(), 30);
}

#[tokio::test]
async fn sqlite_keeps_first_answer() {
    let repo = repo("memdb_conflict").await;
    let ann = email("ann@example.com");
    repo.save_session(&Session::new(ann.clone(), None, fixed_now()))
        .await
        .unwrap();
    let stored = repo.append_questions(&ann, &quiz(1)).await.unwrap();
    let id = stored[0].id();

    repo.record_answer(id, 1).await.unwrap();
    let err = repo.record_answer(id, 2).await.unwrap_err();
    assert!(matches!(err, StorageError::Conflict));

    // a stale save cannot clear the recorded answer either
    repo.save_question(&stored[0]).await.unwrap();
    assert_eq!(repo.get_question(id).await.unwrap().user_answer(), 1);
}

#[tokio::test]
async fn sqlite_reports_missing_rows() {
    let repo = repo("memdb_missing").await;
    let ghost = email("ghost@example.com");

    let err = repo.append_questions(&ghost, &quiz(1)).await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound));

    let err = repo
        .get_question(quiz_core::model::QuestionId::new(404))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound));

    let err = repo
        .record_answer(quiz_core::model::QuestionId::new(404), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound));
}

#[tokio::test]
async fn sqlite_appends_a_quiz_once() {
    let repo = repo("memdb_append_once").await;
    let ann = email("ann@example.com");
    repo.save_session(&Session::new(ann.clone(), None, fixed_now()))
        .await
        .unwrap();

    repo.append_questions(&ann, &quiz(3)).await.unwrap();
    let err = repo.append_questions(&ann, &quiz(3)).await.unwrap_err();
    assert!(matches!(err, StorageError::Conflict));
    assert_eq!(repo.list_questions_for_session(&ann).await.unwrap().len(), 3);

    // the schema rejects a second question at a taken position on its own
    let dup = sqlx::query(
        "INSERT INTO questions (session_email, position, text, difficulty, kind, answers, right_answer, allowed_seconds) \
         VALUES (?1, 1, 'dup', 1, 'multiple-choice', '[]', 0, 30)",
    )
    .bind(ann.as_str())
    .execute(repo.pool())
    .await
    .unwrap_err();
    assert!(
        dup.as_database_error()
            .is_some_and(|db| db.is_unique_violation())
    );
}
