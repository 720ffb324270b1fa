use std::error::Error;
use std::io::Write as _;

use quiz_core::model::SessionQuestion;
use quiz_core::pool::QuestionPool;
use services::{Clock, QuizError, QuizService};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::settings::AppConfig;

pub type CommandResult = Result<(), Box<dyn Error>>;

/// Load the pool, report rejected questions, the difficulty spread and whether
/// the configured quiz can be generated from it.
pub fn check(config: &AppConfig) -> CommandResult {
    let pool = QuestionPool::from_file(&config.question_pool)?;
    let invalid = pool.invalid();

    println!(
        "{}: {} questions, {} valid, {} invalid",
        config.question_pool.display(),
        pool.len(),
        pool.len() - invalid.len(),
        invalid.len()
    );
    for (position, question) in &invalid {
        println!(
            "  #{position} {:?}: right answer {} of {} answers",
            question.text,
            question.right_answer,
            question.answers.len()
        );
    }

    println!("difficulty histogram:");
    for (difficulty, count) in pool.difficulty_histogram() {
        println!("  {difficulty:>3}: {count}");
    }

    let quiz = QuizService::generate_quiz(&pool, config.quiz_options())?;
    println!("ok: a {}-question quiz can be generated", quiz.len());
    Ok(())
}

/// Terminal quiz against the configured store. Resumes an existing session for
/// the same email.
pub async fn play(
    service: &QuizService,
    config: &AppConfig,
    email: &str,
    nickname: Option<String>,
) -> CommandResult {
    let mut session = service.create_or_get_session(email, nickname).await?;
    if !session.has_questions() {
        let pool = QuestionPool::from_file(&config.question_pool).map_err(QuizError::from)?;
        service
            .ensure_quiz(&mut session, &pool, config.quiz_options())
            .await?;
    }

    let total = session.questions().len();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(question) = service.present_current(&mut session).await? {
        show(&question, total, service.clock());
        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };
        let Ok(answer) = line.trim().parse::<u32>() else {
            println!("enter the number of an answer\n");
            continue;
        };

        match service.answer(&mut session, question.id(), answer).await {
            Ok(_) => {
                let correct = session
                    .question(question.id())
                    .is_some_and(SessionQuestion::is_correct);
                println!("{}\n", if correct { "correct" } else { "wrong" });
            }
            Err(QuizError::AlreadyAnsweredOrExpired) => println!("time is up\n"),
            Err(err) if err.is_client_error() => println!("{err}\n"),
            Err(err) => return Err(err.into()),
        }
    }

    let score = service.refresh_score(&mut session).await?;
    if score.is_complete() {
        println!(
            "finished: {}% ({} of {} correct)",
            score.percent, score.correct, score.total
        );
    } else {
        println!(
            "paused after {} of {} questions, {}% so far",
            score.finished, score.total, score.percent
        );
    }
    Ok(())
}

fn show(question: &SessionQuestion, total: usize, clock: Clock) {
    println!(
        "Question {}/{total} (difficulty {})",
        question.index(),
        question.difficulty()
    );
    println!("{}", question.text());
    for (n, answer) in (1..).zip(question.answers()) {
        println!("  {n}) {answer}");
    }
    match question.time_left(clock.now()) {
        Some(left) => print!("{}s left> ", left.num_seconds()),
        None => print!("> "),
    }
    // A failed flush only delays the prompt.
    let _ = std::io::stdout().flush();
}

pub async fn board(service: &QuizService) -> CommandResult {
    let board = service.leaderboard().await?;
    if board.is_empty() {
        println!("no sessions yet");
        return Ok(());
    }

    println!("Completed:");
    for (rank, entry) in (1..).zip(&board.completed) {
        println!(
            "{rank:>4}. {:<24} {:<32} {:>3}%",
            entry.display_name(),
            entry.email,
            entry.score
        );
    }
    println!("In progress:");
    for entry in &board.in_progress {
        println!("      {:<24} {}", entry.display_name(), entry.email);
    }
    Ok(())
}
