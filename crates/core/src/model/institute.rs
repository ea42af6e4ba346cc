use serde::{Deserialize, Serialize};
use url::Url;

use crate::model::ids::{InstituteId, SectionId, TestId};

/// Catalog entry for a single test offered by an institute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestInfo {
    pub id: TestId,
    pub title: String,
    pub question_count: u32,
    pub marks: f64,
    pub time_limit_minutes: u32,
}

/// A named section of an institute's catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionEntry {
    pub id: SectionId,
    pub name: String,
}

/// A coaching institute and its read-only test catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Institute {
    id: InstituteId,
    name: String,
    logo: Option<Url>,
    folder_name: String,
    tests: Vec<TestInfo>,
    sections: Vec<SectionEntry>,
}

impl Institute {
    #[must_use]
    pub fn new(
        id: InstituteId,
        name: impl Into<String>,
        logo: Option<Url>,
        folder_name: impl Into<String>,
        tests: Vec<TestInfo>,
        sections: Vec<SectionEntry>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            logo,
            folder_name: folder_name.into(),
            tests,
            sections,
        }
    }

    #[must_use]
    pub fn id(&self) -> &InstituteId {
        &self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn logo(&self) -> Option<&Url> {
        self.logo.as_ref()
    }

    /// Content folder holding this institute's question dumps.
    #[must_use]
    pub fn folder_name(&self) -> &str {
        &self.folder_name
    }

    #[must_use]
    pub fn tests(&self) -> &[TestInfo] {
        &self.tests
    }

    #[must_use]
    pub fn test(&self, id: &TestId) -> Option<&TestInfo> {
        self.tests.iter().find(|t| &t.id == id)
    }

    /// Sections in catalog order.
    #[must_use]
    pub fn sections(&self) -> &[SectionEntry] {
        &self.sections
    }

    /// Human-readable section name, falling back to the raw id.
    #[must_use]
    pub fn section_name<'a>(&'a self, id: &'a SectionId) -> &'a str {
        self.sections
            .iter()
            .find(|s| &s.id == id)
            .map_or(id.as_str(), |s| s.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn institute() -> Institute {
        Institute::new(
            InstituteId::new("inst1"),
            "Alpha Coaching",
            Url::parse("https://example.com/logo.png").ok(),
            "alpha",
            vec![TestInfo {
                id: TestId::new("t1"),
                title: "Mock 1".into(),
                question_count: 100,
                marks: 200.0,
                time_limit_minutes: 60,
            }],
            vec![SectionEntry {
                id: SectionId::new("11"),
                name: "Quant".into(),
            }],
        )
    }

    #[test]
    fn section_name_falls_back_to_id() {
        let inst = institute();
        assert_eq!(inst.section_name(&SectionId::new("11")), "Quant");
        let unknown = SectionId::new("99");
        assert_eq!(inst.section_name(&unknown), "99");
    }

    #[test]
    fn finds_tests_by_id() {
        let inst = institute();
        assert_eq!(inst.test(&TestId::new("t1")).map(|t| t.question_count), Some(100));
        assert!(inst.test(&TestId::new("missing")).is_none());
    }
}
