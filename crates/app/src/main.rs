mod logging;
mod telegram;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use course_core::{Clock, ProgressEngine};
use services::{FlowOrchestrator, ReminderService, SessionStore, Transport};
use storage::catalog::load_catalog;
use storage::repository::Storage;

use crate::logging::LogFormat;
use crate::telegram::TelegramClient;

const REMINDER_FIRST_RUN: Duration = Duration::from_secs(60);
const REMINDER_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidNumber { flag: &'static str, raw: String },
    InvalidDbUrl { raw: String },
    InvalidLogFormat { raw: String },
    MissingToken,
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidNumber { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidLogFormat { raw } => {
                write!(f, "invalid --log-format value: {raw} (expected json or pretty)")
            }
            ArgsError::MissingToken => {
                write!(f, "a bot token is required (--token or COURSE_BOT_TOKEN)")
            }
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

fn parse_number<T: std::str::FromStr>(flag: &'static str, raw: String) -> Result<T, ArgsError> {
    raw.trim()
        .parse()
        .map_err(|_| ArgsError::InvalidNumber { flag, raw })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  course-bot run   [--db <sqlite_url>] [--catalog <path>] [--token <token>]");
    eprintln!("                   [--api-base <url>]");
    eprintln!("                   [--continue-delay-ms <ms>] [--reminder-days <days>]");
    eprintln!("                   [--log-level <level>] [--log-format json|pretty]");
    eprintln!("  course-bot check [--catalog <path>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite:course.sqlite3");
    eprintln!("  --catalog course.json");
    eprintln!("  --continue-delay-ms 1500");
    eprintln!("  --reminder-days 3");
    eprintln!("  --log-level info");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  COURSE_BOT_DB_URL, COURSE_BOT_CATALOG, COURSE_BOT_TOKEN, COURSE_BOT_API_BASE,");
    eprintln!("  COURSE_BOT_CONTINUE_DELAY_MS, COURSE_BOT_REMINDER_DAYS,");
    eprintln!("  COURSE_BOT_LOG, COURSE_BOT_LOG_FORMAT, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Run,
    Check,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "run" => Some(Self::Run),
            "check" => Some(Self::Check),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Args {
    db_url: String,
    catalog: PathBuf,
    token: Option<String>,
    api_base: Option<String>,
    continue_delay: Duration,
    reminder_days: i64,
    log_level: String,
    log_format: LogFormat,
}

impl Args {
    fn parse(
        args: &mut impl Iterator<Item = String>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ArgsError> {
        let mut parsed = Self::from_env(&env)?;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    parsed.db_url = normalize_sqlite_url(value);
                }
                "--catalog" => parsed.catalog = require_value(args, "--catalog")?.into(),
                "--token" => parsed.token = Some(require_value(args, "--token")?),
                "--api-base" => parsed.api_base = Some(require_value(args, "--api-base")?),
                "--continue-delay-ms" => {
                    let value = require_value(args, "--continue-delay-ms")?;
                    parsed.continue_delay =
                        Duration::from_millis(parse_number("--continue-delay-ms", value)?);
                }
                "--reminder-days" => {
                    let value = require_value(args, "--reminder-days")?;
                    parsed.reminder_days = parse_number("--reminder-days", value)?;
                }
                "--log-level" => parsed.log_level = require_value(args, "--log-level")?,
                "--log-format" => {
                    let value = require_value(args, "--log-format")?;
                    parsed.log_format = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidLogFormat { raw: value })?;
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(parsed)
    }

    fn from_env(env: &impl Fn(&str) -> Option<String>) -> Result<Self, ArgsError> {
        let db_url = env("COURSE_BOT_DB_URL")
            .map_or_else(|| "sqlite://course.sqlite3".into(), normalize_sqlite_url);
        let catalog = env("COURSE_BOT_CATALOG").map_or_else(|| "course.json".into(), PathBuf::from);
        let continue_delay = match env("COURSE_BOT_CONTINUE_DELAY_MS") {
            Some(raw) => Duration::from_millis(parse_number("COURSE_BOT_CONTINUE_DELAY_MS", raw)?),
            None => services::flow::DEFAULT_CONTINUE_DELAY,
        };
        let reminder_days = match env("COURSE_BOT_REMINDER_DAYS") {
            Some(raw) => parse_number("COURSE_BOT_REMINDER_DAYS", raw)?,
            None => services::reminders::DEFAULT_INACTIVITY_DAYS,
        };
        let log_format = match env("COURSE_BOT_LOG_FORMAT") {
            Some(raw) => raw
                .parse()
                .map_err(|_| ArgsError::InvalidLogFormat { raw })?,
            None => LogFormat::default(),
        };

        Ok(Self {
            db_url,
            catalog,
            token: env("COURSE_BOT_TOKEN").filter(|t| !t.trim().is_empty()),
            api_base: env("COURSE_BOT_API_BASE"),
            continue_delay,
            reminder_days,
            log_level: env("COURSE_BOT_LOG").unwrap_or_else(|| "info".into()),
            log_format,
        })
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

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    // Without a subcommand the bot runs.
    let cmd = match argv.first().map(String::as_str) {
        None => Command::Run,
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with("--") => Command::Run,
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    if !argv.is_empty() && !argv[0].starts_with("--") {
        argv.remove(0);
    }

    let mut iter = argv.into_iter();
    let parsed = Args::parse(&mut iter, |key| std::env::var(key).ok()).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    logging::init(&parsed.log_level, parsed.log_format);
    let catalog = load_catalog(&parsed.catalog)?;

    if cmd == Command::Check {
        println!(
            "{}: {} course blocks ({} quizzes), {} final-test questions",
            parsed.catalog.display(),
            catalog.blocks().len(),
            catalog.course_quiz_count(),
            catalog.final_test().len()
        );
        return Ok(());
    }

    let token = parsed.token.clone().ok_or(ArgsError::MissingToken)?;

    // Open + migrate SQLite at startup; the library crates never touch the filesystem for it.
    prepare_sqlite_file(&parsed.db_url)?;
    let storage = Storage::sqlite(&parsed.db_url).await?;

    let mut client = TelegramClient::new(token)?;
    if let Some(api_base) = parsed.api_base.clone() {
        client = client.with_api_base(api_base);
    }
    let me = client.get_me().await?;
    tracing::info!(bot_id = me.id, username = ?me.username, "connected to Telegram");

    let clock = Clock::default_clock();
    let transport: Arc<dyn Transport> = Arc::new(client.clone());
    let sessions = Arc::new(SessionStore::new());
    let flow = FlowOrchestrator::new(
        ProgressEngine::new(Arc::new(catalog)),
        Arc::clone(&sessions),
        Arc::clone(&transport),
        Arc::clone(&storage.users),
        clock,
    )
    .with_continue_delay(parsed.continue_delay);
    let reminders = ReminderService::new(Arc::clone(&storage.users), sessions, transport, clock)
        .with_inactivity_days(parsed.reminder_days);

    let reminder_task = tokio::spawn(run_reminders(reminders));

    tokio::select! {
        () = telegram::updates::run_polling(client, flow) => {}
        res = shutdown_signal() => {
            res?;
            tracing::info!("shutdown requested");
        }
    }

    reminder_task.abort();
    Ok(())
}

async fn run_reminders(service: ReminderService) {
    let start = tokio::time::Instant::now() + REMINDER_FIRST_RUN;
    let mut ticker = tokio::time::interval_at(start, REMINDER_PERIOD);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if let Err(err) = service.run_once().await {
            tracing::warn!(error = %err, "reminder pass failed");
        }
    }
}

async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
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

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
