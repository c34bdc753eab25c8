//! Single check execution.

use std::path::Path;
use std::process::Stdio;
use std::time::Instant;

use tokio::process::Command;

use crate::check::CheckConfig;

/// Outcome of one check execution.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct CheckOutcome {
    /// Check name.
    pub name: String,

    /// Exit code (0 = success, -1 = spawn/timeout failure).
    pub exit_code: i32,

    /// Captured stdout and stderr, concatenated.
    pub log: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    /// Whether the check passed.
    pub passed: bool,
}

/// Execute a single check in `workdir` and return its outcome.
///
/// A spawn error or timeout is reported as a failed outcome rather than
/// an `Err` so the validation join always sees one outcome per check.
pub async fn run_check(config: &CheckConfig, workdir: &Path) -> anyhow::Result<CheckOutcome> {
    let start = Instant::now();

    if config.command.is_empty() {
        anyhow::bail!("check {} has an empty command", config.name);
    }

    let exe = &config.command[0];
    let args = &config.command[1..];

    let child = match Command::new(exe)
        .args(args)
        .current_dir(workdir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            return Ok(CheckOutcome {
                name: config.name.clone(),
                exit_code: -1,
                log: format!("failed to spawn '{}': {}", exe, e),
                duration_ms: start.elapsed().as_millis() as u64,
                passed: false,
            });
        }
    };

    let output = if config.timeout_secs > 0 {
        match tokio::time::timeout(
            std::time::Duration::from_secs(config.timeout_secs),
            child.wait_with_output(),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Ok(CheckOutcome {
                    name: config.name.clone(),
                    exit_code: -1,
                    log: format!(
                        "check '{}' timed out after {} seconds",
                        config.name, config.timeout_secs
                    ),
                    duration_ms: start.elapsed().as_millis() as u64,
                    passed: false,
                });
            }
        }
    } else {
        child.wait_with_output().await?
    };

    let duration_ms = start.elapsed().as_millis() as u64;
    let exit_code = output.status.code().unwrap_or(-1);
    let mut log = String::from_utf8_lossy(&output.stdout).to_string();
    log.push_str(&String::from_utf8_lossy(&output.stderr));

    Ok(CheckOutcome {
        name: config.name.clone(),
        exit_code,
        log,
        duration_ms,
        passed: output.status.success(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::CheckConfig;

    #[tokio::test]
    async fn test_run_simple_command() {
        let dir = tempfile::tempdir().unwrap();
        let config = CheckConfig::custom(
            "echo".to_string(),
            vec!["echo".to_string(), "hello".to_string()],
            60,
        );

        let outcome = run_check(&config, dir.path()).await.expect("run failed");
        assert!(outcome.passed);
        assert_eq!(outcome.exit_code, 0);
        assert!(outcome.log.contains("hello"));
    }

    #[tokio::test]
    async fn test_run_failing_command() {
        let dir = tempfile::tempdir().unwrap();
        let config = CheckConfig::custom("false".to_string(), vec!["false".to_string()], 60);

        let outcome = run_check(&config, dir.path()).await.expect("run failed");
        assert!(!outcome.passed);
        assert_ne!(outcome.exit_code, 0);
    }

    #[tokio::test]
    async fn test_run_missing_executable_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let config = CheckConfig::custom(
            "ghost".to_string(),
            vec!["definitely-not-a-real-binary-xyz".to_string()],
            60,
        );

        let outcome = run_check(&config, dir.path()).await.expect("run failed");
        assert!(!outcome.passed);
        assert_eq!(outcome.exit_code, -1);
        assert!(outcome.log.contains("failed to spawn"));
    }

    #[tokio::test]
    async fn test_run_timeout_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let config = CheckConfig::custom(
            "sleepy".to_string(),
            vec!["sleep".to_string(), "5".to_string()],
            1,
        );

        let outcome = run_check(&config, dir.path()).await.expect("run failed");
        assert!(!outcome.passed);
        assert!(outcome.log.contains("timed out"));
    }
}
