//! Failure-log classification against the fix taxonomy.

use regex::Regex;

use crate::domain::fix::FailureClass;

/// A classified validation failure: the taxonomy class plus the
/// artifact identity parsed out of the log, when one was recognizable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedFailure {
    pub class: FailureClass,
    pub artifact: Option<String>,
}

impl ClassifiedFailure {
    /// Whether an auto-fixer may act on this failure.
    pub fn actionable(&self) -> bool {
        self.class.is_fixable() && self.artifact.is_some()
    }
}

/// Classify a failure log. First matching pattern wins; anything
/// unrecognized is `Other` and never repaired.
pub fn classify_failure(log: &str) -> ClassifiedFailure {
    let patterns: &[(&str, FailureClass)] = &[
        // Missing module or file reference.
        (
            r"(?i)no module named ['\x60]?([A-Za-z0-9_./]+)",
            FailureClass::MissingReference,
        ),
        (
            r"(?i)cannot find module ['\x60]?([A-Za-z0-9_./@-]+)",
            FailureClass::MissingReference,
        ),
        (
            r"(?i)unresolved import \x60([A-Za-z0-9_:]+)\x60",
            FailureClass::MissingReference,
        ),
        // Missing test fixture or data file.
        (
            r"(?i)fixture ['\x60]?([A-Za-z0-9_./-]+)['\x60]? not found",
            FailureClass::MissingFixture,
        ),
        (
            r"(?i)no such file or directory[:,]? ['\x60]?([A-Za-z0-9_./-]+)",
            FailureClass::MissingFixture,
        ),
        (
            r"(?i)filenotfounderror.*['\x60]([A-Za-z0-9_./-]+)['\x60]",
            FailureClass::MissingFixture,
        ),
        // Undefined symbol.
        (
            r"(?i)name ['\x60]([A-Za-z0-9_]+)['\x60] is not defined",
            FailureClass::UndefinedSymbol,
        ),
        (
            r"(?i)cannot find (?:value|function|type) \x60([A-Za-z0-9_]+)\x60",
            FailureClass::UndefinedSymbol,
        ),
        (
            r"(?i)undefined reference to \x60?([A-Za-z0-9_]+)",
            FailureClass::UndefinedSymbol,
        ),
        (
            r"(?i)\x60?([A-Za-z0-9_]+)\x60? is not defined",
            FailureClass::UndefinedSymbol,
        ),
    ];

    for (pattern, class) in patterns {
        let re = Regex::new(pattern).unwrap_or_else(|_| unreachable!("static pattern"));
        if let Some(caps) = re.captures(log) {
            let artifact = caps.get(1).map(|m| m.as_str().trim_matches('\'').to_string());
            return ClassifiedFailure {
                class: *class,
                artifact,
            };
        }
    }

    ClassifiedFailure {
        class: FailureClass::Other,
        artifact: None,
    }
}
