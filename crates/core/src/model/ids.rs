use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error type for parsing an ID from a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    kind: &'static str,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} cannot be empty", self.kind)
    }
}

impl std::error::Error for ParseIdError {}

// Content ids are opaque strings issued by the content dumps or the document
// store, so every id is a thin string newtype with the same surface.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:?})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Err(ParseIdError {
                        kind: stringify!($name),
                    });
                }
                Ok(Self(trimmed.to_owned()))
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Identifier of a coaching institute (content dumps call it `coachingId`).
    InstituteId
);
string_id!(
    /// Identifier of a test within an institute.
    TestId
);
string_id!(
    /// Identifier of a subject section.
    SectionId
);
string_id!(
    /// Identifier of a question, unique within an institute.
    QuestionId
);
string_id!(
    /// Identifier of a signed-in account.
    UserId
);
string_id!(
    /// Identifier assigned by the document store.
    DocumentId
);

/// Section bucket used for questions without a section id.
pub const GENERAL_SECTION: &str = "general";

impl SectionId {
    /// The fallback section that collects questions without a section id.
    #[must_use]
    pub fn general() -> Self {
        Self::new(GENERAL_SECTION)
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_institute_id_display() {
        let id = InstituteId::new("inst1");
        assert_eq!(id.to_string(), "inst1");
    }

    #[test]
    fn test_id_from_str_trims() {
        let id: TestId = "  t-42 ".parse().unwrap();
        assert_eq!(id, TestId::new("t-42"));
    }

    #[test]
    fn test_id_from_str_rejects_blank() {
        let result = "   ".parse::<QuestionId>();
        assert!(result.is_err());
    }

    #[test]
    fn test_debug_names_the_kind() {
        let id = SectionId::new("secA");
        assert_eq!(format!("{id:?}"), "SectionId(\"secA\")");
    }

    #[test]
    fn test_serde_is_transparent() {
        let id = UserId::new("u1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"u1\"");
        let back: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
