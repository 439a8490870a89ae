//! Operation status tracking.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Status of one end-to-end user request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
pub enum OperationStatus {
    /// Request received, pipeline not yet started
    #[default]
    Pending,
    /// Pipeline in flight
    Running,
    /// Pipeline finished with a final artifact
    Success,
    /// Pipeline finished without a final artifact
    Failed,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "Pending",
            OperationStatus::Running => "Running",
            OperationStatus::Success => "Success",
            OperationStatus::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationStatus::Success | OperationStatus::Failed)
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted record for one operation. Last-write-wins; the sequencer
/// is the only writer during a render.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Operation {
    pub operation_id: String,
    pub status: OperationStatus,
    /// Human-readable failure detail, present only for `Failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Operation {
    pub fn new(operation_id: impl Into<String>, status: OperationStatus) -> Self {
        Self {
            operation_id: operation_id.into(),
            status,
            detail: None,
        }
    }

    pub fn failed(operation_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            status: OperationStatus::Failed,
            detail: Some(detail.into()),
        }
    }
}
