//! Changed files and path classification.
//!
//! Classification is a deterministic ordered rule table: the first rule
//! whose pattern matches the path wins, and unmatched paths fall back to
//! [`FileTag::Other`]. Extending classification means appending rules,
//! never touching call sites.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Logical classification of a changed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileTag {
    FoundationData,
    DataAccess,
    BusinessLogic,
    Interface,
    Test,
    Fixture,
    Other,
}

impl FileTag {
    /// Short slug for branch names and summaries.
    pub fn slug(&self) -> &'static str {
        match self {
            FileTag::FoundationData => "foundation-data",
            FileTag::DataAccess => "data-access",
            FileTag::BusinessLogic => "business-logic",
            FileTag::Interface => "interface",
            FileTag::Test => "test",
            FileTag::Fixture => "fixture",
            FileTag::Other => "other",
        }
    }

    /// Human-readable label for commit messages.
    pub fn label(&self) -> &'static str {
        match self {
            FileTag::FoundationData => "Foundation data",
            FileTag::DataAccess => "Data access",
            FileTag::BusinessLogic => "Business logic",
            FileTag::Interface => "Interface",
            FileTag::Test => "Tests",
            FileTag::Fixture => "Fixtures",
            FileTag::Other => "Changes",
        }
    }

    /// Whether files with this tag are implementation code that should
    /// carry paired tests.
    pub fn is_implementation(&self) -> bool {
        matches!(
            self,
            FileTag::DataAccess | FileTag::BusinessLogic | FileTag::Interface
        )
    }
}

/// How the file changed relative to the base reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

/// One file in the changeset. Created by the analyzer; immutable after.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
    /// Repository-relative path.
    pub path: String,

    /// Classification tag from the rule table.
    pub tag: FileTag,

    /// Added/modified/deleted.
    pub kind: ChangeKind,

    /// Size in lines at the source reference (0 for deleted files).
    pub lines: u64,

    /// Paths of other changed files this file imports.
    pub imports: BTreeSet<String>,
}

/// One entry in the ordered classification rule table.
///
/// A rule matches when the path contains its pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifyRule {
    pub pattern: String,
    pub tag: FileTag,
}

impl ClassifyRule {
    pub fn new(pattern: impl Into<String>, tag: FileTag) -> Self {
        Self {
            pattern: pattern.into(),
            tag,
        }
    }

    fn matches(&self, path: &str) -> bool {
        path.contains(&self.pattern)
    }
}

/// Default classification rule table, evaluated top to bottom.
pub fn default_rules() -> Vec<ClassifyRule> {
    vec![
        // Tests and fixtures first: a test under services/ is still a test.
        ClassifyRule::new("/tests/", FileTag::Test),
        ClassifyRule::new("_test.", FileTag::Test),
        ClassifyRule::new("test_", FileTag::Test),
        ClassifyRule::new(".spec.", FileTag::Test),
        ClassifyRule::new("/fixtures/", FileTag::Fixture),
        ClassifyRule::new("fixture", FileTag::Fixture),
        ClassifyRule::new("migration", FileTag::FoundationData),
        ClassifyRule::new("schema", FileTag::FoundationData),
        ClassifyRule::new("/seeds/", FileTag::FoundationData),
        ClassifyRule::new("/models/", FileTag::DataAccess),
        ClassifyRule::new("/repositories/", FileTag::DataAccess),
        ClassifyRule::new("/dao/", FileTag::DataAccess),
        ClassifyRule::new("/store/", FileTag::DataAccess),
        ClassifyRule::new("/api/", FileTag::Interface),
        ClassifyRule::new("/handlers/", FileTag::Interface),
        ClassifyRule::new("/routes/", FileTag::Interface),
        ClassifyRule::new("/controllers/", FileTag::Interface),
        ClassifyRule::new("/views/", FileTag::Interface),
        ClassifyRule::new("/ui/", FileTag::Interface),
        ClassifyRule::new("/services/", FileTag::BusinessLogic),
        ClassifyRule::new("/domain/", FileTag::BusinessLogic),
        ClassifyRule::new("/core/", FileTag::BusinessLogic),
        ClassifyRule::new("/lib/", FileTag::BusinessLogic),
    ]
}

/// Classify a path against an ordered rule table. First match wins.
pub fn classify_path(path: &str, rules: &[ClassifyRule]) -> FileTag {
    rules
        .iter()
        .find(|rule| rule.matches(path))
        .map(|rule| rule.tag)
        .unwrap_or(FileTag::Other)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_match_wins() {
        let rules = default_rules();
        // A test file inside services/ classifies as Test, not BusinessLogic.
        assert_eq!(
            classify_path("src/services/billing_test.py", &rules),
            FileTag::Test
        );
        assert_eq!(
            classify_path("src/services/billing.py", &rules),
            FileTag::BusinessLogic
        );
    }

    #[test]
    fn test_default_tag_is_other() {
        let rules = default_rules();
        assert_eq!(classify_path("README.md", &rules), FileTag::Other);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let rules = default_rules();
        let a = classify_path("src/models/user.rs", &rules);
        let b = classify_path("src/models/user.rs", &rules);
        assert_eq!(a, b);
        assert_eq!(a, FileTag::DataAccess);
    }

    #[test]
    fn test_appended_rule_extends_table() {
        let mut rules = default_rules();
        rules.push(ClassifyRule::new(".proto", FileTag::FoundationData));
        assert_eq!(
            classify_path("idl/orders.proto", &rules),
            FileTag::FoundationData
        );
    }

    #[test]
    fn test_foundation_rules() {
        let rules = default_rules();
        assert_eq!(
            classify_path("db/migrations/0042_add_index.sql", &rules),
            FileTag::FoundationData
        );
        assert_eq!(
            classify_path("src/schema.rs", &rules),
            FileTag::FoundationData
        );
    }

    #[test]
    fn test_tag_serde_snake_case() {
        let json = serde_json::to_string(&FileTag::FoundationData).unwrap();
        assert_eq!(json, "\"foundation_data\"");
    }

    #[test]
    fn test_is_implementation() {
        assert!(FileTag::BusinessLogic.is_implementation());
        assert!(FileTag::Interface.is_implementation());
        assert!(!FileTag::Test.is_implementation());
        assert!(!FileTag::Other.is_implementation());
    }
}
