//! Check definitions and configuration.

use serde::{Deserialize, Serialize};

/// Builtin checks used when no check definition file is present.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinCheck {
    /// cargo fmt --all -- --check
    Format,

    /// cargo check --workspace
    TypeCheck,

    /// cargo test --workspace
    Test,
}

impl BuiltinCheck {
    /// Get the check name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinCheck::Format => "format",
            BuiltinCheck::TypeCheck => "typecheck",
            BuiltinCheck::Test => "test",
        }
    }

    /// Get the check's command.
    pub fn command(&self) -> Vec<String> {
        match self {
            BuiltinCheck::Format => vec![
                "cargo".to_string(),
                "fmt".to_string(),
                "--all".to_string(),
                "--".to_string(),
                "--check".to_string(),
            ],
            BuiltinCheck::TypeCheck => vec![
                "cargo".to_string(),
                "check".to_string(),
                "--workspace".to_string(),
            ],
            BuiltinCheck::Test => vec![
                "cargo".to_string(),
                "test".to_string(),
                "--workspace".to_string(),
            ],
        }
    }

    /// The default builtin check order.
    pub fn all() -> [BuiltinCheck; 3] {
        [
            BuiltinCheck::Format,
            BuiltinCheck::TypeCheck,
            BuiltinCheck::Test,
        ]
    }
}

/// Configuration for a single check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckConfig {
    /// Human-readable check name.
    pub name: String,

    /// Command to execute (first element is the executable).
    pub command: Vec<String>,

    /// Timeout in seconds (0 = no timeout).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Whether this check is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_timeout_secs() -> u64 {
    600
}

fn default_enabled() -> bool {
    true
}

impl CheckConfig {
    /// Create a check configuration from a builtin check.
    pub fn from_builtin(check: BuiltinCheck, timeout_secs: u64) -> Self {
        Self {
            name: check.name().to_string(),
            command: check.command(),
            timeout_secs,
            enabled: true,
        }
    }

    /// Create a custom check configuration.
    pub fn custom(name: String, command: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            name,
            command,
            timeout_secs,
            enabled: true,
        }
    }

    /// Disable this check.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}
