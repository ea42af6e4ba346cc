use std::fmt;
use std::path::PathBuf;

use mcq_core::model::{InstituteId, SectionId, TestId, UserId};
use services::{AppServices, AuthConfig, Clock, UserAccount};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingArgument { command: &'static str, name: &'static str },
    UnknownArg(String),
    UnknownCommand(String),
    InvalidQuestion { raw: String },
    InvalidDbUrl { raw: String },
    PracticeTarget,
    SignInDisabled { method: &'static str },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingArgument { command, name } => {
                write!(f, "{command} requires <{name}>")
            }
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown subcommand: {cmd}"),
            ArgsError::InvalidQuestion { raw } => write!(f, "invalid --question value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::PracticeTarget => {
                write!(f, "practice needs exactly one of --test <id> or --section <id>")
            }
            ArgsError::SignInDisabled { method } => {
                write!(f, "{method} sign-in is disabled")
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

#[derive(Debug, Clone, PartialEq, Eq)]
enum PracticeTarget {
    Test(TestId),
    Section(SectionId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Institutes,
    Tests {
        coaching: InstituteId,
    },
    Practice {
        coaching: InstituteId,
        target: PracticeTarget,
        quick: bool,
        question: Option<usize>,
    },
    Progress {
        coaching: InstituteId,
    },
    Toggle {
        coaching: InstituteId,
        test: TestId,
        section: SectionId,
    },
    Complete {
        coaching: InstituteId,
        test: TestId,
    },
    Uncomplete {
        coaching: InstituteId,
        test: TestId,
    },
    Sync,
    Saved {
        search: Option<String>,
        all: bool,
    },
    Notifications,
}

#[derive(Debug)]
struct Args {
    db_url: String,
    data_dir: PathBuf,
    state_path: PathBuf,
    user: Option<String>,
    anonymous: bool,
    command: Command,
}

/// Command-specific flags, collected before the subcommand is known.
#[derive(Debug, Default)]
struct CommandFlags {
    test: Option<String>,
    section: Option<String>,
    quick: bool,
    question: Option<usize>,
    search: Option<String>,
    all: bool,
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- [options] <command> [args]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  institutes");
    eprintln!("  tests <coaching>");
    eprintln!("  practice <coaching> (--test <id> | --section <id>) [--quick] [--question <n>]");
    eprintln!("  progress <coaching>");
    eprintln!("  toggle <coaching> <test> <section>");
    eprintln!("  complete <coaching> <test>");
    eprintln!("  uncomplete <coaching> <test>");
    eprintln!("  sync");
    eprintln!("  saved [--search <term>] [--all]");
    eprintln!("  notifications");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>   (default sqlite://mcq.sqlite3)");
    eprintln!("  --data <dir>        (default data)");
    eprintln!("  --state <file>      (default local_state.json)");
    eprintln!("  --user <uid>");
    eprintln!("  --anonymous");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  MCQ_DB_URL, MCQ_DATA_DIR, MCQ_LOCAL_STATE, MCQ_USER, MCQ_ANONYMOUS, MCQ_LOG");
}

impl Args {
    fn parse(argv: impl IntoIterator<Item = String>) -> Result<Self, ArgsError> {
        Self::parse_with_env(argv, |key| std::env::var(key).ok())
    }

    fn parse_with_env(
        argv: impl IntoIterator<Item = String>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ArgsError> {
        let mut db_url = env("MCQ_DB_URL")
            .map_or_else(|| "sqlite://mcq.sqlite3".into(), normalize_sqlite_url);
        let mut data_dir: PathBuf = env("MCQ_DATA_DIR").unwrap_or_else(|| "data".into()).into();
        let mut state_path: PathBuf = env("MCQ_LOCAL_STATE")
            .unwrap_or_else(|| "local_state.json".into())
            .into();
        let mut user = env("MCQ_USER").filter(|u| !u.trim().is_empty());
        let mut anonymous = env("MCQ_ANONYMOUS").as_deref() == Some("true");

        let mut flags = CommandFlags::default();
        let mut positional = Vec::new();
        let mut args = argv.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--data" => data_dir = require_value(&mut args, "--data")?.into(),
                "--state" => state_path = require_value(&mut args, "--state")?.into(),
                "--user" => user = Some(require_value(&mut args, "--user")?),
                "--anonymous" => anonymous = true,
                "--test" => flags.test = Some(require_value(&mut args, "--test")?),
                "--section" => flags.section = Some(require_value(&mut args, "--section")?),
                "--quick" => flags.quick = true,
                "--question" => {
                    let value = require_value(&mut args, "--question")?;
                    let parsed = value
                        .parse::<usize>()
                        .ok()
                        .filter(|n| *n > 0)
                        .ok_or_else(|| ArgsError::InvalidQuestion { raw: value.clone() })?;
                    flags.question = Some(parsed);
                }
                "--search" => flags.search = Some(require_value(&mut args, "--search")?),
                "--all" => flags.all = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                other if other.starts_with("--") => return Err(ArgsError::UnknownArg(arg)),
                _ => positional.push(arg),
            }
        }

        let command = Command::from_parts(positional, flags)?;
        Ok(Self {
            db_url,
            data_dir,
            state_path,
            user,
            anonymous,
            command,
        })
    }
}

impl Command {
    fn from_parts(positional: Vec<String>, flags: CommandFlags) -> Result<Self, ArgsError> {
        let mut parts = positional.into_iter();
        let Some(name) = parts.next() else {
            return Ok(Self::Institutes);
        };
        let command = match name.as_str() {
            "institutes" => Self::Institutes,
            "tests" => Self::Tests {
                coaching: InstituteId::new(take(&mut parts, "tests", "coaching")?),
            },
            "practice" => {
                let coaching = InstituteId::new(take(&mut parts, "practice", "coaching")?);
                let target = match (flags.test, flags.section) {
                    (Some(test), None) => PracticeTarget::Test(TestId::new(test)),
                    (None, Some(section)) => PracticeTarget::Section(SectionId::new(section)),
                    _ => return Err(ArgsError::PracticeTarget),
                };
                Self::Practice {
                    coaching,
                    target,
                    quick: flags.quick,
                    question: flags.question,
                }
            }
            "progress" => Self::Progress {
                coaching: InstituteId::new(take(&mut parts, "progress", "coaching")?),
            },
            "toggle" => Self::Toggle {
                coaching: InstituteId::new(take(&mut parts, "toggle", "coaching")?),
                test: TestId::new(take(&mut parts, "toggle", "test")?),
                section: SectionId::new(take(&mut parts, "toggle", "section")?),
            },
            "complete" => Self::Complete {
                coaching: InstituteId::new(take(&mut parts, "complete", "coaching")?),
                test: TestId::new(take(&mut parts, "complete", "test")?),
            },
            "uncomplete" => Self::Uncomplete {
                coaching: InstituteId::new(take(&mut parts, "uncomplete", "coaching")?),
                test: TestId::new(take(&mut parts, "uncomplete", "test")?),
            },
            "sync" => Self::Sync,
            "saved" => Self::Saved {
                search: flags.search,
                all: flags.all,
            },
            "notifications" => Self::Notifications,
            _ => return Err(ArgsError::UnknownCommand(name)),
        };
        if let Some(extra) = parts.next() {
            return Err(ArgsError::UnknownArg(extra));
        }
        Ok(command)
    }
}

fn take(
    parts: &mut impl Iterator<Item = String>,
    command: &'static str,
    name: &'static str,
) -> Result<String, ArgsError> {
    parts
        .next()
        .ok_or(ArgsError::MissingArgument { command, name })
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

/// Build the account for `--user`, honoring the enabled sign-in methods.
fn account_for(uid: &str, anonymous: bool, auth: &AuthConfig) -> Result<UserAccount, ArgsError> {
    let uid = UserId::new(uid);
    if anonymous {
        if !auth.anonymous {
            return Err(ArgsError::SignInDisabled { method: "anonymous" });
        }
        return Ok(UserAccount::anonymous(uid));
    }
    if !auth.allows_accounts() {
        return Err(ArgsError::SignInDisabled { method: "account" });
    }
    Ok(UserAccount::new(uid))
}

fn init_tracing() {
    let filter = std::env::var("MCQ_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse(std::env::args().skip(1)).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;
    debug!(?args, "parsed arguments");

    prepare_sqlite_file(&args.db_url)?;
    let app = AppServices::new_sqlite(
        &args.db_url,
        args.state_path.clone(),
        args.data_dir.clone(),
        Clock::System,
    )
    .await?;

    if let Some(uid) = &args.user {
        let auth = AuthConfig::from_env();
        debug!(methods = ?auth.enabled_methods(), "sign-in methods");
        let account = account_for(uid, args.anonymous, &auth)?;
        let report = app.sign_in(account).await;
        info!(
            sections = report.sections_synced,
            tests = report.tests_synced,
            "signed in"
        );
    }

    commands::execute(&app, args.command).await
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Result<Args, ArgsError> {
        Args::parse_with_env(argv.iter().map(|s| (*s).to_owned()), |_| None)
    }

    #[test]
    fn defaults_to_listing_institutes() {
        let args = parse(&[]).unwrap();
        assert_eq!(args.command, Command::Institutes);
        assert_eq!(args.db_url, "sqlite://mcq.sqlite3");
        assert_eq!(args.data_dir, PathBuf::from("data"));
        assert!(args.user.is_none());
    }

    #[test]
    fn practice_needs_exactly_one_target() {
        let args = parse(&["practice", "inst1", "--section", "1", "--question", "7", "--quick"])
            .unwrap();
        assert_eq!(
            args.command,
            Command::Practice {
                coaching: InstituteId::new("inst1"),
                target: PracticeTarget::Section(SectionId::new("1")),
                quick: true,
                question: Some(7),
            }
        );

        assert!(matches!(
            parse(&["practice", "inst1"]),
            Err(ArgsError::PracticeTarget)
        ));
        assert!(matches!(
            parse(&["practice", "inst1", "--test", "t", "--section", "s"]),
            Err(ArgsError::PracticeTarget)
        ));
        assert!(matches!(
            parse(&["practice", "inst1", "--test", "t", "--question", "0"]),
            Err(ArgsError::InvalidQuestion { .. })
        ));
    }

    #[test]
    fn flags_override_environment() {
        let args = Args::parse_with_env(
            ["--user", "u2", "toggle", "inst1", "t1", "s1"].map(String::from),
            |key| match key {
                "MCQ_USER" => Some("u1".into()),
                "MCQ_ANONYMOUS" => Some("true".into()),
                "MCQ_DB_URL" => Some("sqlite://env.sqlite3".into()),
                _ => None,
            },
        )
        .unwrap();
        assert_eq!(args.user.as_deref(), Some("u2"));
        assert!(args.anonymous);
        assert_eq!(args.db_url, "sqlite://env.sqlite3");
        assert!(matches!(args.command, Command::Toggle { .. }));
    }

    #[test]
    fn rejects_missing_and_extra_arguments() {
        assert!(matches!(
            parse(&["toggle", "inst1", "t1"]),
            Err(ArgsError::MissingArgument {
                command: "toggle",
                name: "section"
            })
        ));
        assert!(matches!(
            parse(&["sync", "now"]),
            Err(ArgsError::UnknownArg(_))
        ));
        assert!(matches!(
            parse(&["frobnicate"]),
            Err(ArgsError::UnknownCommand(_))
        ));
        assert!(matches!(parse(&["--db", " "]), Err(ArgsError::InvalidDbUrl { .. })));
    }

    #[test]
    fn saved_accepts_all_and_search() {
        let args = parse(&["saved", "--all", "--search", "newton"]).unwrap();
        assert_eq!(
            args.command,
            Command::Saved {
                search: Some("newton".into()),
                all: true,
            }
        );
    }

    #[test]
    fn sign_in_respects_enabled_methods() {
        let defaults = AuthConfig::default();
        assert!(!account_for("u1", false, &defaults).unwrap().anonymous);
        assert!(matches!(
            account_for("u1", true, &defaults),
            Err(ArgsError::SignInDisabled { method: "anonymous" })
        ));

        let anonymous_only = AuthConfig::from_lookup(|key| match key {
            "MCQ_AUTH_ANONYMOUS_ENABLED" => Some("true".into()),
            "MCQ_AUTH_EMAIL_ENABLED" | "MCQ_AUTH_GOOGLE_ENABLED" => Some("false".into()),
            _ => None,
        });
        assert!(account_for("u1", true, &anonymous_only).unwrap().anonymous);
        assert!(matches!(
            account_for("u1", false, &anonymous_only),
            Err(ArgsError::SignInDisabled { method: "account" })
        ));
    }

    #[test]
    fn normalizes_relative_sqlite_paths() {
        assert_eq!(normalize_sqlite_url("sqlite::memory:".into()), "sqlite::memory:");
        let url = normalize_sqlite_url("sqlite:data/mcq.db".into());
        assert!(url.starts_with("sqlite:///"));
        assert!(url.ends_with("data/mcq.db"));
    }
}
