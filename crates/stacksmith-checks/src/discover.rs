//! Check discovery from a declarative definition file.
//!
//! The definition is a TOML file with one `[[check]]` table per check.
//! The core only extracts invocable commands from it; anything else in
//! the file is ignored. When the file is absent, the builtin check set
//! is used instead.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::check::{BuiltinCheck, CheckConfig};

/// Default check definition filename, looked up at the repository root.
pub const DEFAULT_CHECK_FILE: &str = "stacksmith-checks.toml";

/// Parsed shape of the check definition file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckFile {
    /// Ordered check definitions.
    #[serde(rename = "check", default)]
    pub checks: Vec<CheckConfig>,
}

/// Discover the ordered check list for a repository.
///
/// Reads `<repo_root>/stacksmith-checks.toml` when present; otherwise
/// falls back to the builtin set. Disabled checks are filtered out but
/// the relative order of the remaining ones is preserved.
pub fn discover_checks(repo_root: &Path) -> anyhow::Result<Vec<CheckConfig>> {
    let path = repo_root.join(DEFAULT_CHECK_FILE);

    let checks = if path.exists() {
        let raw = std::fs::read_to_string(&path)?;
        let file: CheckFile = toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("malformed check definition {:?}: {}", path, e))?;
        if file.checks.is_empty() {
            anyhow::bail!("check definition {:?} declares no checks", path);
        }
        info!(path = %path.display(), count = file.checks.len(), "Discovered checks from definition file");
        file.checks
    } else {
        info!("No check definition file, using builtin checks");
        BuiltinCheck::all()
            .into_iter()
            .map(|c| CheckConfig::from_builtin(c, 600))
            .collect()
    };

    let enabled: Vec<CheckConfig> = checks.into_iter().filter(|c| c.enabled).collect();
    if enabled.is_empty() {
        anyhow::bail!("all discovered checks are disabled");
    }

    for check in &enabled {
        if check.command.is_empty() {
            anyhow::bail!("check '{}' has an empty command", check.name);
        }
    }

    Ok(enabled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_falls_back_to_builtins() {
        let dir = tempfile::tempdir().unwrap();
        let checks = discover_checks(dir.path()).unwrap();
        assert_eq!(checks.len(), 3);
        assert_eq!(checks[0].name, "format");
        assert_eq!(checks[2].name, "test");
    }

    #[test]
    fn test_discover_reads_definition_file_in_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(DEFAULT_CHECK_FILE),
            r#"
[[check]]
name = "lint"
command = ["cargo", "clippy", "--workspace"]

[[check]]
name = "unit"
command = ["cargo", "test"]
timeout_secs = 120
"#,
        )
        .unwrap();

        let checks = discover_checks(dir.path()).unwrap();
        assert_eq!(checks.len(), 2);
        assert_eq!(checks[0].name, "lint");
        assert_eq!(checks[1].name, "unit");
        assert_eq!(checks[1].timeout_secs, 120);
    }

    #[test]
    fn test_discover_filters_disabled_checks() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(DEFAULT_CHECK_FILE),
            r#"
[[check]]
name = "lint"
command = ["cargo", "clippy"]
enabled = false

[[check]]
name = "unit"
command = ["cargo", "test"]
"#,
        )
        .unwrap();

        let checks = discover_checks(dir.path()).unwrap();
        assert_eq!(checks.len(), 1);
        assert_eq!(checks[0].name, "unit");
    }

    #[test]
    fn test_discover_rejects_empty_definition() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(DEFAULT_CHECK_FILE), "").unwrap();
        assert!(discover_checks(dir.path()).is_err());
    }

    #[test]
    fn test_discover_rejects_empty_command() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(DEFAULT_CHECK_FILE),
            r#"
[[check]]
name = "broken"
command = []
"#,
        )
        .unwrap();
        assert!(discover_checks(dir.path()).is_err());
    }

    #[test]
    fn test_discover_rejects_malformed_toml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(DEFAULT_CHECK_FILE), "[[check\nname=").unwrap();
        assert!(discover_checks(dir.path()).is_err());
    }
}
