use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use assess_core::model::{Audience, Catalogue, ContentFile, LevelId};
use assess_core::placement::RuleTable;
use assess_core::routing::{PolicyKind, RoutingError, RoutingPolicy};
use services::{
    Clock, EngineConfig, HttpResultSink, HttpSinkConfig, ResultPublisher, report_to_json,
};
use storage::repository::Storage;
use tracing::info;

mod terminal;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidAudience { raw: String },
    InvalidPolicy { raw: String },
    InvalidLimit { raw: String },
    InvalidDbUrl { raw: String },
    MissingRules,
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidAudience { raw } => write!(f, "invalid --audience value: {raw}"),
            ArgsError::InvalidPolicy { raw } => write!(f, "invalid --policy value: {raw}"),
            ArgsError::InvalidLimit { raw } => write!(f, "invalid --limit value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::MissingRules => write!(f, "--policy sweep requires --rules <path>"),
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
    eprintln!("  assess run      [--content <path>] [--audience adult|young_people]");
    eprintln!("                  [--policy adaptive|sweep] [--rules <path>]");
    eprintln!("                  [--db <sqlite_url>] [--results-url <url>] [--report <path>]");
    eprintln!("  assess validate [--content <path>] [--audience ...] [--policy ...] [--rules <path>]");
    eprintln!("  assess results  [--db <sqlite_url>] [--limit <n>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --content data/questions.json");
    eprintln!("  --audience adult");
    eprintln!("  --policy adaptive");
    eprintln!("  --db sqlite://assess.sqlite3");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  ASSESS_CONTENT, ASSESS_AUDIENCE, ASSESS_POLICY, ASSESS_RULES,");
    eprintln!("  ASSESS_DB_URL, ASSESS_RESULTS_URL, ASSESS_REPORT, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Run,
    Validate,
    Results,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "run" => Some(Self::Run),
            "validate" => Some(Self::Validate),
            "results" => Some(Self::Results),
            _ => None,
        }
    }
}

struct Args {
    content: PathBuf,
    audience: Audience,
    policy: PolicyKind,
    rules: Option<PathBuf>,
    db_url: String,
    results_url: Option<String>,
    report_path: Option<PathBuf>,
    limit: u32,
}

fn parse_audience(raw: String) -> Result<Audience, ArgsError> {
    raw.parse()
        .map_err(|_| ArgsError::InvalidAudience { raw: raw.clone() })
}

fn parse_policy(raw: String) -> Result<PolicyKind, ArgsError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "adaptive" => Ok(PolicyKind::Adaptive),
        "sweep" => Ok(PolicyKind::Sweep),
        _ => Err(ArgsError::InvalidPolicy { raw }),
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut content = env_value("ASSESS_CONTENT")
            .map_or_else(|| PathBuf::from("data/questions.json"), PathBuf::from);
        let mut audience = env_value("ASSESS_AUDIENCE")
            .map(parse_audience)
            .transpose()?
            .unwrap_or(Audience::Adult);
        let mut policy = env_value("ASSESS_POLICY")
            .map(parse_policy)
            .transpose()?
            .unwrap_or(PolicyKind::Adaptive);
        let mut rules = env_value("ASSESS_RULES").map(PathBuf::from);
        let mut db_url = env_value("ASSESS_DB_URL")
            .map_or_else(|| "sqlite://assess.sqlite3".into(), normalize_sqlite_url);
        let mut results_url = HttpSinkConfig::from_env().map(|c| c.url);
        let mut report_path = env_value("ASSESS_REPORT").map(PathBuf::from);
        let mut limit = 20;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--content" => content = PathBuf::from(require_value(args, "--content")?),
                "--audience" => audience = parse_audience(require_value(args, "--audience")?)?,
                "--policy" => policy = parse_policy(require_value(args, "--policy")?)?,
                "--rules" => rules = Some(PathBuf::from(require_value(args, "--rules")?)),
                "--results-url" => results_url = Some(require_value(args, "--results-url")?),
                "--report" => report_path = Some(PathBuf::from(require_value(args, "--report")?)),
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--limit" => {
                    let value = require_value(args, "--limit")?;
                    limit = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidLimit { raw: value.clone() })?;
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            content,
            audience,
            policy,
            rules,
            db_url,
            results_url,
            report_path,
            limit,
        })
    }

    fn load_catalogue(&self) -> Result<Catalogue, Box<dyn std::error::Error>> {
        let raw = std::fs::read_to_string(&self.content)?;
        Ok(select_catalogue(&raw, self.audience)?)
    }

    fn engine_config(&self) -> Result<EngineConfig, Box<dyn std::error::Error>> {
        match self.policy {
            PolicyKind::Adaptive => Ok(EngineConfig::adaptive()),
            PolicyKind::Sweep => {
                let path = self.rules.as_ref().ok_or(ArgsError::MissingRules)?;
                let raw = std::fs::read_to_string(path)?;
                Ok(EngineConfig::sweep(RuleTable::from_json_str(&raw)?))
            }
        }
    }
}

fn select_catalogue(raw: &str, audience: Audience) -> Result<Catalogue, assess_core::Error> {
    Ok(ContentFile::from_json_str(raw)?.select(audience)?)
}

/// Checks that a session can start and, for the sweep policy, that every
/// catalogue level has a rule.
fn check_setup(catalogue: &Catalogue, config: &EngineConfig) -> Result<LevelId, assess_core::Error> {
    let start = config.policy.start_level(catalogue)?;
    if let RoutingPolicy::Sweep { rules } = &config.policy {
        if let Some(level) = catalogue
            .level_ids()
            .into_iter()
            .find(|&level| rules.min_score(level).is_none())
        {
            return Err(RoutingError::MissingRule(level).into());
        }
    }
    Ok(start)
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

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    // No subcommand runs an assessment.
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

    let parsed = Args::parse(&mut argv.into_iter()).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    init_logging();

    match cmd {
        Command::Validate => {
            let catalogue = parsed.load_catalogue()?;
            let config = parsed.engine_config()?;
            let start = check_setup(&catalogue, &config)?;
            for level in catalogue.levels() {
                println!(
                    "{:<7} {} tracks, {} questions",
                    level.id(),
                    level.tracks().len(),
                    level.question_count()
                );
            }
            println!(
                "{} content OK ({} policy, starts at {start})",
                catalogue.audience().label(),
                config.policy.kind()
            );
            Ok(())
        }
        Command::Results => {
            prepare_sqlite_file(&parsed.db_url)?;
            let storage = Storage::sqlite(&parsed.db_url).await?;
            let publisher = ResultPublisher::new(Arc::clone(&storage.results));
            for row in publisher.recent(parsed.limit).await? {
                let report = &row.report;
                println!(
                    "#{:<4} {}  {:<8} {:<13} {:<6} {}/{}",
                    row.id,
                    report.completed_at.format("%Y-%m-%d %H:%M"),
                    report.policy,
                    report.audience.label(),
                    report.placement,
                    report.total_correct(),
                    report.total_questions()
                );
            }
            Ok(())
        }
        Command::Run => {
            // Content problems abort before any session state is touched.
            let catalogue = Arc::new(parsed.load_catalogue()?);
            let config = parsed.engine_config()?;
            check_setup(&catalogue, &config)?;

            prepare_sqlite_file(&parsed.db_url)?;
            let storage = Storage::sqlite(&parsed.db_url).await?;
            info!(db = %parsed.db_url, content = %parsed.content.display(), "storage ready");

            let mut publisher = ResultPublisher::new(Arc::clone(&storage.results));
            if let Some(url) = parsed.results_url.clone() {
                publisher =
                    publisher.with_sink(Arc::new(HttpResultSink::new(HttpSinkConfig { url })));
            }

            let report =
                terminal::run_session(catalogue, config, Clock::system(), storage.sessions).await?;
            let Some(report) = report else {
                return Ok(());
            };

            let outcome = publisher.publish(&report).await?;
            info!(
                archive_id = outcome.archive_id,
                submitted = outcome.submitted,
                "result published"
            );
            if let Some(path) = &parsed.report_path {
                std::fs::write(path, report_to_json(&report)?)?;
                info!(path = %path.display(), "report written");
            }
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
