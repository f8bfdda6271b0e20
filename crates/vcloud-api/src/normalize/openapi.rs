// OpenAPI JSON error body
//
// { "minorErrorCode": "ACCESS_TO_RESOURCE_IS_FORBIDDEN",
//   "message": "[ 0b8c... ] Either you need some or all of the following rights ...",
//   "stackTrace": "com.vmware.vcloud.api.presentation..." }

use serde::{Deserialize, Serialize};

use super::{DescribeFailure, non_empty};

/// Error returned by the `/cloudapi/` surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenApiError {
    pub minor_error_code: Option<String>,
    pub message: String,
    /// Only present when the server is configured to expose stack traces.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    #[serde(skip)]
    pub(crate) degraded: bool,
}

/// Every field is nullable on the wire.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireError {
    #[serde(default)]
    minor_error_code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    stack_trace: Option<String>,
}

impl OpenApiError {
    pub(crate) fn parse(raw: &[u8]) -> Option<Self> {
        let wire: WireError = serde_json::from_slice(raw).ok()?;
        let minor_error_code = non_empty(wire.minor_error_code.as_deref());
        let message = non_empty(wire.message.as_deref()).or_else(|| minor_error_code.clone())?;

        Some(Self {
            minor_error_code,
            message,
            stack_trace: non_empty(wire.stack_trace.as_deref()),
            degraded: false,
        })
    }

    pub(crate) fn fallback(message: String) -> Self {
        Self {
            minor_error_code: None,
            message,
            stack_trace: None,
            degraded: true,
        }
    }
}

impl DescribeFailure for OpenApiError {
    fn short_description(&self) -> String {
        self.message.clone()
    }

    fn detailed_description(&self) -> String {
        let mut out = match self.minor_error_code {
            Some(ref code) => format!("{code}: {}", self.message),
            None => self.message.clone(),
        };
        if let Some(ref trace) = self.stack_trace {
            out.push_str("\nStack trace:\n");
            out.push_str(trace);
        }
        out
    }
}
