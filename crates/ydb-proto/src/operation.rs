use crate::issue::{write_issues, Issue};
use crate::rpc::Payload;
use crate::status::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Generic envelope carried by every unary response.
///
/// `ready` is always true for the synchronous operation mode the driver
/// uses; `status` and `issues` describe the outcome, `result` holds the
/// RPC-specific payload when the operation succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub ready: bool,
    pub status: StatusCode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<Issue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Payload>,
}

impl Operation {
    /// Successful envelope around `result`.
    pub fn success(result: Payload) -> Self {
        Operation {
            ready: true,
            status: StatusCode::Success,
            issues: Vec::new(),
            result: Some(result),
        }
    }

    /// Successful envelope with no payload (e.g. DeleteSession).
    pub fn success_empty() -> Self {
        Operation {
            ready: true,
            status: StatusCode::Success,
            issues: Vec::new(),
            result: None,
        }
    }

    /// Failed envelope with the given status and issues.
    pub fn failure(status: StatusCode, issues: Vec<Issue>) -> Self {
        Operation {
            ready: true,
            status,
            issues,
            result: None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "operation {}", self.status)?;
        write_issues(f, &self.issues)
    }
}

/// How the server schedules an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationMode {
    Sync,
    Async,
}

/// Per-request server-side execution bounds.
///
/// `operation_timeout` bounds server work; `cancel_after` bounds it with
/// eager cancellation and must not exceed `operation_timeout`. The
/// end-to-end RPC is additionally bounded by the caller's deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationParams {
    pub mode: OperationMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_timeout: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_after: Option<Duration>,
}

impl OperationParams {
    pub fn sync(operation_timeout: Option<Duration>, cancel_after: Option<Duration>) -> Self {
        // cancel_after <= operation_timeout on the wire
        let cancel_after = match (cancel_after, operation_timeout) {
            (Some(c), Some(t)) => Some(c.min(t)),
            (c, _) => c,
        };
        OperationParams {
            mode: OperationMode::Sync,
            operation_timeout,
            cancel_after,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_after_clamped_to_operation_timeout() {
        let params = OperationParams::sync(
            Some(Duration::from_secs(1)),
            Some(Duration::from_secs(5)),
        );
        assert_eq!(params.cancel_after, Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_failure_display_includes_issues() {
        let op = Operation::failure(
            StatusCode::SchemeError,
            vec![Issue::new(2018, "path not found")],
        );
        assert_eq!(
            op.to_string(),
            "operation SCHEME_ERROR [{#2018 path not found}]"
        );
    }

    #[test]
    fn test_operation_roundtrip() {
        let op = Operation::success_empty();
        let json = serde_json::to_string(&op).unwrap();
        let back: Operation = serde_json::from_str(&json).unwrap();
        assert_eq!(op, back);
    }
}
