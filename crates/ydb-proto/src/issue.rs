use serde::{Deserialize, Serialize};
use std::fmt;

/// A server-reported diagnostic attached to an operation result.
///
/// Issues form a tree: a failed query typically carries one top-level issue
/// per phase with nested issues pointing at the offending position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub code: u32,
    pub severity: u32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<Issue>,
}

impl Issue {
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Issue {
            code,
            severity: 0,
            message: message.into(),
            issues: Vec::new(),
        }
    }
}

/// Renders a list of issues as `{#code message {nested}}` groups.
pub fn write_issues(f: &mut fmt::Formatter<'_>, issues: &[Issue]) -> fmt::Result {
    if issues.is_empty() {
        return Ok(());
    }
    f.write_str(" [")?;
    for issue in issues {
        f.write_str("{")?;
        if issue.code != 0 {
            write!(f, "#{} ", issue.code)?;
        }
        f.write_str(issue.message.trim_end_matches('.'))?;
        write_issues(f, &issue.issues)?;
        f.write_str("}")?;
    }
    f.write_str("]")
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_issues(f, std::slice::from_ref(self))
    }
}
