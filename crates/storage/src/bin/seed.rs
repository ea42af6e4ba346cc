use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use mcq_core::model::{BROADCAST_RECIPIENT, NotificationData, NotificationKind};
use serde_json::{Value, json};
use storage::content::{INSTITUTES_FILE, SECTION_DIR};
use storage::repository::{Storage, to_document};

const FOLDER: &str = "demo";
const TEST_ID: &str = "mock-1";

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    data_dir: PathBuf,
    state_path: PathBuf,
    questions: u32,
    now: Option<DateTime<Utc>>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidQuestions { raw: String },
    InvalidDbUrl { raw: String },
    InvalidNow { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidQuestions { raw } => write!(f, "invalid --questions value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidNow { raw } => {
                write!(f, "invalid --now value (expected RFC3339): {raw}")
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

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("MCQ_DB_URL").unwrap_or_else(|_| "sqlite://mcq.sqlite3?mode=rwc".into());
        let mut data_dir: PathBuf = std::env::var("MCQ_DATA_DIR")
            .unwrap_or_else(|_| "data".into())
            .into();
        let mut state_path: PathBuf = std::env::var("MCQ_LOCAL_STATE")
            .unwrap_or_else(|_| "local_state.json".into())
            .into();
        let mut questions = std::env::var("MCQ_SEED_QUESTIONS")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(6);
        let mut now: Option<DateTime<Utc>> = None;

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--data" => {
                    data_dir = require_value(&mut args, "--data")?.into();
                }
                "--state" => {
                    state_path = require_value(&mut args, "--state")?.into();
                }
                "--questions" => {
                    let value = require_value(&mut args, "--questions")?;
                    questions = value
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidQuestions { raw: value.clone() })?;
                }
                "--now" => {
                    let value = require_value(&mut args, "--now")?;
                    let parsed = DateTime::parse_from_rfc3339(&value)
                        .map_err(|_| ArgsError::InvalidNow { raw: value.clone() })?
                        .with_timezone(&Utc);
                    now = Some(parsed);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            data_dir,
            state_path,
            questions,
            now,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite://mcq.sqlite3?mode=rwc)");
    eprintln!("  --data <dir>              Content directory to write (default: data)");
    eprintln!("  --state <file>            Local state file (default: local_state.json)");
    eprintln!("  --questions <n>           Sample questions in the demo test (default: 6)");
    eprintln!("  --now <rfc3339>           Fixed current time for deterministic seeding");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!("  MCQ_DB_URL, MCQ_DATA_DIR, MCQ_LOCAL_STATE, MCQ_SEED_QUESTIONS");
}

fn sample_question(index: u32) -> Value {
    let samples = [
        ("What is 12 x 12?", ["124", "144", "132", "154"], "2", "1"),
        ("Which number is prime?", ["21", "27", "29", "33"], "3", "1"),
        ("Find the odd one out.", ["Circle", "Square", "Triangle", "Cube"], "4", "2"),
        ("If A > B and B > C, then", ["C > A", "A > C", "A = C", "B > A"], "2", "2"),
        ("25% of 80 is", ["15", "20", "25", "30"], "2", "1"),
        ("Mirror image of 'b' is", ["d", "p", "q", "b"], "1", "2"),
    ];
    let (text, options, answer, section) = samples[index as usize % samples.len()];
    json!({
        "id": format!("q{}", index + 1),
        "test_id": TEST_ID,
        "question": format!("<p>{text}</p>"),
        "option_1": options[0],
        "option_2": options[1],
        "option_3": options[2],
        "option_4": options[3],
        "answer": answer,
        "solution_text": format!("<p>Correct option: {answer}</p>"),
        "section_id": section,
        "positive_marks": "2",
        "negative_marks": "0.5",
    })
}

async fn write_json(path: PathBuf, value: &Value) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&path, serde_json::to_vec_pretty(value)?).await?;
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let questions: Vec<Value> = (0..args.questions).map(sample_question).collect();
    let institutes = json!([{
        "id": "1",
        "name": "Demo Coaching",
        "logo": "",
        "folder_name": FOLDER,
        "tests": [{
            "id": TEST_ID,
            "title": "Demo Mock Test 1",
            "time": "30",
            "questions": args.questions.to_string(),
            "marks": (args.questions * 2).to_string(),
        }],
        "sectionMap": {"1": "Quantitative Aptitude", "2": "Reasoning"},
    }]);

    write_json(args.data_dir.join(INSTITUTES_FILE), &institutes).await?;
    write_json(
        args.data_dir.join(FOLDER).join(format!("{TEST_ID}.json")),
        &Value::Array(questions.clone()),
    )
    .await?;
    for section in ["1", "2"] {
        let in_section: Vec<Value> = questions
            .iter()
            .filter(|q| q["section_id"] == section)
            .cloned()
            .collect();
        write_json(
            args.data_dir
                .join(FOLDER)
                .join(SECTION_DIR)
                .join(format!("{section}.json")),
            &Value::Array(in_section),
        )
        .await?;
    }

    let storage = Storage::sqlite(
        &args.db_url,
        args.state_path.clone(),
        args.data_dir.clone(),
    )
    .await?;
    let welcome = NotificationData {
        recipient: BROADCAST_RECIPIENT.to_owned(),
        title: "Welcome".into(),
        message: "A demo test is ready to practice.".into(),
        kind: NotificationKind::Info,
        timestamp: args.now.unwrap_or_else(Utc::now),
        read: false,
    };
    storage
        .documents
        .add("notifications", to_document(&welcome)?)
        .await?;

    println!(
        "Seeded {} questions into {} and a welcome notification into {}",
        args.questions,
        args.data_dir.display(),
        args.db_url
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
