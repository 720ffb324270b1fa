use std::fmt;
use std::path::PathBuf;

use services::{Clock, QuizService};
use storage::repository::Storage;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;
mod settings;

use settings::AppConfig;

#[derive(Debug, PartialEq, Eq)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingEmail,
    UnknownArg(String),
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingEmail => write!(f, "play requires --email"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  quizmaker check [--question-pool <path>]");
    eprintln!(
        "  quizmaker play  --email <email> [--nickname <name>] [--db <sqlite_url>] [--question-pool <path>]"
    );
    eprintln!("  quizmaker board [--db <sqlite_url>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite://quizmaker.sqlite3");
    eprintln!("  --question-pool question_pool.yaml");
    eprintln!();
    eprintln!("Configuration:");
    eprintln!("  quizmaker.toml, .env, QUIZ_DB_URL, QUIZ_QUESTION_POOL, QUIZ_TOTAL_QUESTIONS,");
    eprintln!("  QUIZ_MIN_DIFFICULTY, QUIZ_MAX_DIFFICULTY, QUIZ_QUESTION_TIMEOUT_SECS");
    eprintln!("  RUST_LOG (default quizmaker=info,services=info)");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Check,
    Play,
    Board,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "check" => Some(Self::Check),
            "play" => Some(Self::Play),
            "board" => Some(Self::Board),
            _ => None,
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Args {
    db_url: Option<String>,
    question_pool: Option<PathBuf>,
    email: Option<String>,
    nickname: Option<String>,
}

impl Args {
    fn parse(cmd: Command, args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut parsed = Self::default();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    parsed.db_url = Some(value);
                }
                "--question-pool" => {
                    parsed.question_pool = Some(require_value(args, "--question-pool")?.into());
                }
                "--email" if cmd == Command::Play => {
                    parsed.email = Some(require_value(args, "--email")?);
                }
                "--nickname" if cmd == Command::Play => {
                    parsed.nickname = Some(require_value(args, "--nickname")?);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        if cmd == Command::Play && parsed.email.is_none() {
            return Err(ArgsError::MissingEmail);
        }
        Ok(parsed)
    }

    /// Flags override every other configuration source.
    fn apply(self, config: &mut AppConfig) {
        if let Some(db_url) = self.db_url {
            config.db_url = db_url;
        }
        if let Some(pool) = self.question_pool {
            config.question_pool = pool;
        }
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

async fn open_service(config: &AppConfig) -> Result<QuizService, Box<dyn std::error::Error>> {
    prepare_sqlite_file(&config.db_url)?;
    let storage = Storage::sqlite(&config.db_url).await?;
    tracing::debug!(db = %config.db_url, "storage ready");
    Ok(QuizService::from_storage(Clock::system(), &storage))
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let argv: Vec<String> = std::env::args().skip(1).collect();

    let cmd = match argv.first().map(String::as_str) {
        None | Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    let mut iter = argv.into_iter().skip(1);
    let args = Args::parse(cmd, &mut iter).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let mut config = AppConfig::load()?;
    let email = args.email.clone();
    let nickname = args.nickname.clone();
    args.apply(&mut config);
    config.db_url = normalize_sqlite_url(config.db_url);

    match cmd {
        Command::Check => commands::check(&config),
        Command::Play => {
            let service = open_service(&config).await?;
            let email = email.ok_or(ArgsError::MissingEmail)?;
            commands::play(&service, &config, &email, nickname).await
        }
        Command::Board => {
            let service = open_service(&config).await?;
            commands::board(&service).await
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quizmaker=info,services=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
