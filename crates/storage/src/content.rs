//! Read-only question content: the institute catalog and per-test /
//! per-section question dumps.
//!
//! On disk the layout is
//!
//! ```text
//! <root>/institutes.json
//! <root>/<folder>/<test_id>.json
//! <root>/<folder>/Section/<section_id>.json
//! ```
//!
//! Loading never fails: missing or unreadable content is reported as absent.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mcq_core::model::{
    Institute, InstituteId, OptionIndex, Question, QuestionId, SectionEntry, SectionId, TestId,
    TestInfo,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

pub const INSTITUTES_FILE: &str = "institutes.json";
pub const SECTION_DIR: &str = "Section";

#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn load_institutes(&self) -> Vec<Institute>;

    /// `None` when the test has no question file.
    async fn load_test_questions(&self, folder: &str, test_id: &TestId) -> Option<Vec<Question>>;

    /// Empty when the section has no question file.
    async fn load_section_questions(&self, folder: &str, section_id: &SectionId) -> Vec<Question>;
}

//
// ─── RAW FORMATS ───────────────────────────────────────────────────────────────
//
// The dumps were scraped from several test platforms; most scalars arrive as
// strings but some come through as numbers or null.

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

#[derive(Debug, Deserialize)]
struct RawQuestion {
    #[serde(deserialize_with = "lenient_string")]
    id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    test_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    section_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    question: String,
    #[serde(default, deserialize_with = "lenient_string")]
    option_1: String,
    #[serde(default, deserialize_with = "lenient_string")]
    option_2: String,
    #[serde(default, deserialize_with = "lenient_string")]
    option_3: String,
    #[serde(default, deserialize_with = "lenient_string")]
    option_4: String,
    #[serde(default, deserialize_with = "lenient_string")]
    answer: String,
    #[serde(default, deserialize_with = "lenient_string")]
    solution_text: String,
    #[serde(default, deserialize_with = "lenient_string")]
    positive_marks: String,
    #[serde(default, deserialize_with = "lenient_string")]
    negative_marks: String,
}

impl RawQuestion {
    fn into_question(self, fallback_test: Option<&TestId>) -> Option<Question> {
        if self.id.trim().is_empty() {
            warn!("skipping question without an id");
            return None;
        }
        let correct = match OptionIndex::parse_answer(&self.answer) {
            Ok(correct) => correct,
            Err(err) => {
                warn!(question_id = %self.id, error = %err, "skipping question with unusable answer");
                return None;
            }
        };
        let test_id = if self.test_id.trim().is_empty() {
            fallback_test.cloned().unwrap_or_else(|| TestId::new(""))
        } else {
            TestId::new(self.test_id)
        };
        let section = Some(SectionId::new(self.section_id));
        let solution = Some(self.solution_text);
        Some(
            Question::new(
                QuestionId::new(self.id),
                test_id,
                self.question,
                [self.option_1, self.option_2, self.option_3, self.option_4],
                correct,
            )
            .with_section(section)
            .with_marks(parse_number(&self.positive_marks), parse_number(&self.negative_marks))
            .with_solution(solution),
        )
    }
}

fn parse_number(raw: &str) -> f64 {
    raw.trim().parse().unwrap_or(0.0)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum QuestionFile {
    List(Vec<Value>),
    Wrapped {
        #[serde(alias = "data")]
        questions: Vec<Value>,
    },
}

impl QuestionFile {
    /// Rows are decoded one at a time so a bad row only drops itself.
    fn into_questions(self, fallback_test: Option<&TestId>) -> Vec<Question> {
        let rows = match self {
            Self::List(rows) | Self::Wrapped { questions: rows } => rows,
        };
        rows.into_iter()
            .enumerate()
            .filter_map(|(row, value)| match serde_json::from_value::<RawQuestion>(value) {
                Ok(raw) => raw.into_question(fallback_test),
                Err(err) => {
                    warn!(row, error = %err, "skipping malformed question row");
                    None
                }
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct RawTest {
    #[serde(deserialize_with = "lenient_string")]
    id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    title: String,
    #[serde(default, deserialize_with = "lenient_string")]
    time: String,
    #[serde(default, deserialize_with = "lenient_string")]
    questions: String,
    #[serde(default, deserialize_with = "lenient_string")]
    marks: String,
}

impl From<RawTest> for TestInfo {
    fn from(raw: RawTest) -> Self {
        Self {
            id: TestId::new(raw.id),
            title: raw.title,
            question_count: raw.questions.trim().parse().unwrap_or(0),
            marks: parse_number(&raw.marks),
            time_limit_minutes: raw.time.trim().parse().unwrap_or(0),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawInstitute {
    #[serde(deserialize_with = "lenient_string")]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    logo: Option<String>,
    #[serde(default)]
    folder_name: String,
    #[serde(default)]
    tests: Vec<RawTest>,
    #[serde(rename = "sectionMap", default)]
    section_map: serde_json::Map<String, Value>,
}

impl From<RawInstitute> for Institute {
    fn from(raw: RawInstitute) -> Self {
        let logo = raw
            .logo
            .filter(|l| !l.trim().is_empty())
            .and_then(|l| Url::parse(&l).ok());
        let sections = ordered_sections(raw.section_map);
        Institute::new(
            InstituteId::new(raw.id),
            raw.name,
            logo,
            raw.folder_name,
            raw.tests.into_iter().map(TestInfo::from).collect(),
            sections,
        )
    }
}

/// Section ids in object-key order: integer-like keys ascending, then the
/// remaining keys as written.
fn ordered_sections(map: serde_json::Map<String, Value>) -> Vec<SectionEntry> {
    let (mut numeric, named): (Vec<_>, Vec<_>) = map
        .into_iter()
        .map(|(id, name)| {
            let name = match name {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (id, name)
        })
        .partition(|(id, _)| is_index_key(id));
    numeric.sort_by_key(|(id, _)| id.parse::<u64>().unwrap_or(u64::MAX));
    numeric
        .into_iter()
        .chain(named)
        .map(|(id, name)| SectionEntry {
            id: SectionId::new(id),
            name,
        })
        .collect()
}

fn is_index_key(key: &str) -> bool {
    !key.is_empty()
        && key.bytes().all(|b| b.is_ascii_digit())
        && (key == "0" || !key.starts_with('0'))
        && key.parse::<u32>().is_ok()
}

//
// ─── FILESYSTEM SOURCE ─────────────────────────────────────────────────────────
//

/// Content read from a directory of JSON dumps.
#[derive(Debug, Clone)]
pub struct FsContentStore {
    root: PathBuf,
}

impl FsContentStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Option<T> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "content file not found");
                return None;
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read content file");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "malformed content file");
                None
            }
        }
    }
}

/// Reject path segments that would escape the content root.
fn safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains(['/', '\\'])
}

#[async_trait]
impl ContentSource for FsContentStore {
    async fn load_institutes(&self) -> Vec<Institute> {
        let path = self.root.join(INSTITUTES_FILE);
        self.read_json::<Vec<RawInstitute>>(&path)
            .await
            .map(|raw| raw.into_iter().map(Institute::from).collect())
            .unwrap_or_default()
    }

    async fn load_test_questions(&self, folder: &str, test_id: &TestId) -> Option<Vec<Question>> {
        if !safe_segment(folder) || !safe_segment(test_id.as_str()) {
            return None;
        }
        let path = self.root.join(folder).join(format!("{test_id}.json"));
        let file: QuestionFile = self.read_json(&path).await?;
        Some(file.into_questions(Some(test_id)))
    }

    async fn load_section_questions(&self, folder: &str, section_id: &SectionId) -> Vec<Question> {
        if !safe_segment(folder) || !safe_segment(section_id.as_str()) {
            return Vec::new();
        }
        let path = self
            .root
            .join(folder)
            .join(SECTION_DIR)
            .join(format!("{section_id}.json"));
        self.read_json::<QuestionFile>(&path)
            .await
            .map(|file| file.into_questions(None))
            .unwrap_or_default()
    }
}

//
// ─── IN-MEMORY SOURCE ──────────────────────────────────────────────────────────
//

/// Content held in memory; used by tests and demos.
#[derive(Debug, Clone, Default)]
pub struct StaticContent {
    institutes: Vec<Institute>,
    tests: HashMap<(String, TestId), Vec<Question>>,
    sections: HashMap<(String, SectionId), Vec<Question>>,
}

impl StaticContent {
    #[must_use]
    pub fn with_institute(mut self, institute: Institute) -> Self {
        self.institutes.push(institute);
        self
    }

    #[must_use]
    pub fn with_test_questions(
        mut self,
        folder: impl Into<String>,
        test_id: TestId,
        questions: Vec<Question>,
    ) -> Self {
        self.tests.insert((folder.into(), test_id), questions);
        self
    }

    #[must_use]
    pub fn with_section_questions(
        mut self,
        folder: impl Into<String>,
        section_id: SectionId,
        questions: Vec<Question>,
    ) -> Self {
        self.sections.insert((folder.into(), section_id), questions);
        self
    }
}

#[async_trait]
impl ContentSource for StaticContent {
    async fn load_institutes(&self) -> Vec<Institute> {
        self.institutes.clone()
    }

    async fn load_test_questions(&self, folder: &str, test_id: &TestId) -> Option<Vec<Question>> {
        self.tests.get(&(folder.to_owned(), test_id.clone())).cloned()
    }

    async fn load_section_questions(&self, folder: &str, section_id: &SectionId) -> Vec<Question> {
        self.sections
            .get(&(folder.to_owned(), section_id.clone()))
            .cloned()
            .unwrap_or_default()
    }
}
