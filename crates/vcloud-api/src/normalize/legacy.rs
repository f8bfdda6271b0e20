// Legacy XML error element
//
// <Error xmlns="http://www.vmware.com/vcloud/v1.5"
//        majorErrorCode="403"
//        minorErrorCode="ACCESS_TO_RESOURCE_IS_FORBIDDEN"
//        message="Forbidden"
//        stackTrace="..."/>

use serde::Serialize;

use super::{DescribeFailure, non_empty};
use crate::xml::XmlDocument;

/// Error returned by the `/api/` surface.
///
/// `majorErrorCode` usually mirrors the HTTP status. Zero is a real,
/// documented code and is kept as `Some(0)`; `None` means the attribute was
/// absent or the body was not an `<Error>` element at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyXmlError {
    pub message: String,
    pub major_error_code: Option<i64>,
    pub minor_error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_specific_error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    #[serde(skip)]
    pub(crate) degraded: bool,
}

impl LegacyXmlError {
    pub(crate) fn parse(raw: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(raw).ok()?;
        let doc = XmlDocument::parse(text).ok()?;
        if doc.root != "Error" {
            return None;
        }

        let attr = |name: &str| non_empty(doc.root_attributes.get(name).map(String::as_str));
        let major_error_code = attr("majorErrorCode").and_then(|v| v.parse::<i64>().ok());
        let minor_error_code = attr("minorErrorCode");

        let message = attr("message")
            .or_else(|| minor_error_code.clone())
            .or_else(|| major_error_code.map(|code| format!("error code {code}")))?;

        Some(Self {
            message,
            major_error_code,
            minor_error_code,
            vendor_specific_error_code: attr("vendorSpecificErrorCode"),
            stack_trace: attr("stackTrace"),
            degraded: false,
        })
    }

    pub(crate) fn fallback(message: String) -> Self {
        Self {
            message,
            major_error_code: None,
            minor_error_code: None,
            vendor_specific_error_code: None,
            stack_trace: None,
            degraded: true,
        }
    }
}

impl DescribeFailure for LegacyXmlError {
    fn short_description(&self) -> String {
        self.message.clone()
    }

    fn detailed_description(&self) -> String {
        let mut out = match (self.major_error_code, self.minor_error_code.as_deref()) {
            (Some(major), Some(minor)) => format!("[{major} {minor}] {}", self.message),
            (Some(major), None) => format!("[{major}] {}", self.message),
            (None, Some(minor)) => format!("[{minor}] {}", self.message),
            (None, None) => self.message.clone(),
        };
        if let Some(ref vendor) = self.vendor_specific_error_code {
            out.push_str(&format!(" (vendor code {vendor})"));
        }
        if let Some(ref trace) = self.stack_trace {
            out.push_str("\nStack trace:\n");
            out.push_str(trace);
        }
        out
    }
}
