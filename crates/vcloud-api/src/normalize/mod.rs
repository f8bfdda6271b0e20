// Error normalization
//
// The control plane reports failures in four unrelated shapes depending on
// which surface answered: OpenAPI JSON, the legacy XML `<Error>` element,
// XML proxied from the network manager, and SOAP faults from the federated
// identity endpoints. Each shape keeps its own type; `NormalizedError` is
// the sum over them and `DescribeFailure` is the contract every caller uses.

mod legacy;
mod nsx;
mod openapi;
mod soap;

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::envelope::ContentShape;

pub use legacy::LegacyXmlError;
pub use nsx::NsxError;
pub use openapi::OpenApiError;
pub use soap::{SoapFault, SOAP_FALLBACK_MESSAGE};

/// Longest fallback message kept from an unparsable body, in characters.
const MAX_FALLBACK_CHARS: usize = 512;

// ── Protocol tag ─────────────────────────────────────────────────────

/// Which wire format a failed response's body follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolTag {
    /// `application/json` errors from `/cloudapi/`.
    OpenApi,
    /// `<Error majorErrorCode=.. minorErrorCode=.. message=../>` from `/api/`.
    LegacyXml,
    /// `<error><errorCode/><details/><moduleName/></error>` from `/network/`.
    NsxProxy,
    /// SOAP 1.2 (or 1.1) faults from the WS-Trust / SAML endpoints.
    SoapFault,
}

impl ProtocolTag {
    /// The content shape responses of this protocol normally carry.
    pub fn native_shape(self) -> ContentShape {
        match self {
            Self::OpenApi => ContentShape::Json,
            Self::LegacyXml | Self::NsxProxy | Self::SoapFault => ContentShape::Xml,
        }
    }
}

impl fmt::Display for ProtocolTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::OpenApi => "OpenAPI",
            Self::LegacyXml => "legacy XML",
            Self::NsxProxy => "NSX proxy",
            Self::SoapFault => "SOAP",
        })
    }
}

// ── Description contract ─────────────────────────────────────────────

/// Uniform way to render a failure regardless of which protocol produced it.
///
/// `short_description` is never empty.
pub trait DescribeFailure {
    /// One-line, human-readable summary.
    fn short_description(&self) -> String;

    /// Summary plus whatever diagnostics the protocol carried: codes,
    /// originating module, stack trace.
    fn detailed_description(&self) -> String;
}

/// Machine-readable code of a normalized error, shaped per protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode<'a> {
    /// OpenAPI `minorErrorCode`.
    Minor(&'a str),
    /// Legacy XML `majorErrorCode` with its `minorErrorCode`.
    Major { major: i64, minor: Option<&'a str> },
    /// NSX `errorCode` (a short string, often numeric).
    Nsx(&'a str),
    /// No code was present (SOAP faults, degraded errors).
    None,
}

// ── NormalizedError ──────────────────────────────────────────────────

/// A failed call, decoded from whichever protocol answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedError {
    OpenApi(OpenApiError),
    LegacyXml(LegacyXmlError),
    NsxProxy(NsxError),
    SoapFault(SoapFault),
}

impl NormalizedError {
    pub fn protocol(&self) -> ProtocolTag {
        match self {
            Self::OpenApi(_) => ProtocolTag::OpenApi,
            Self::LegacyXml(_) => ProtocolTag::LegacyXml,
            Self::NsxProxy(_) => ProtocolTag::NsxProxy,
            Self::SoapFault(_) => ProtocolTag::SoapFault,
        }
    }

    /// The message field as delivered (or the fallback text).
    pub fn message(&self) -> &str {
        match self {
            Self::OpenApi(e) => &e.message,
            Self::LegacyXml(e) => &e.message,
            Self::NsxProxy(e) => &e.details,
            Self::SoapFault(e) => &e.reason,
        }
    }

    pub fn code(&self) -> ErrorCode<'_> {
        match self {
            Self::OpenApi(e) => e
                .minor_error_code
                .as_deref()
                .map_or(ErrorCode::None, ErrorCode::Minor),
            Self::LegacyXml(e) => e.major_error_code.map_or(ErrorCode::None, |major| {
                ErrorCode::Major {
                    major,
                    minor: e.minor_error_code.as_deref(),
                }
            }),
            Self::NsxProxy(e) => e.error_code.as_deref().map_or(ErrorCode::None, ErrorCode::Nsx),
            Self::SoapFault(_) => ErrorCode::None,
        }
    }

    /// Verbose diagnostic (stack trace or SOAP detail), if the server sent one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::OpenApi(e) => e.stack_trace.as_deref(),
            Self::LegacyXml(e) => e.stack_trace.as_deref(),
            Self::NsxProxy(_) => None,
            Self::SoapFault(e) => e.detail.as_deref(),
        }
    }

    /// `true` when the body could not be understood and the message is a fallback.
    pub fn is_degraded(&self) -> bool {
        match self {
            Self::OpenApi(e) => e.degraded,
            Self::LegacyXml(e) => e.degraded,
            Self::NsxProxy(e) => e.degraded,
            Self::SoapFault(e) => e.degraded,
        }
    }

    /// `true` when the server text says the submitted object revision is stale.
    ///
    /// Some surfaces report a stale version stamp with a generic 400 rather than
    /// 409, so the message is the only signal.
    pub fn indicates_stale_version(&self) -> bool {
        const MARKERS: [&str; 3] = [
            "modified by somebody else",
            "object revision",
            "version mismatch",
        ];
        let message = self.message().to_ascii_lowercase();
        MARKERS.iter().any(|m| message.contains(m))
    }
}

impl DescribeFailure for NormalizedError {
    fn short_description(&self) -> String {
        match self {
            Self::OpenApi(e) => e.short_description(),
            Self::LegacyXml(e) => e.short_description(),
            Self::NsxProxy(e) => e.short_description(),
            Self::SoapFault(e) => e.short_description(),
        }
    }

    fn detailed_description(&self) -> String {
        match self {
            Self::OpenApi(e) => e.detailed_description(),
            Self::LegacyXml(e) => e.detailed_description(),
            Self::NsxProxy(e) => e.detailed_description(),
            Self::SoapFault(e) => e.detailed_description(),
        }
    }
}

impl fmt::Display for NormalizedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_description())
    }
}

// ── Dispatch ─────────────────────────────────────────────────────────

/// Normalize a failed call's body according to its protocol.
///
/// Never fails: a body that does not match the protocol's shape becomes a
/// degraded error whose message is the raw text.
pub fn normalize(raw_body: &[u8], protocol: ProtocolTag) -> NormalizedError {
    normalize_response(raw_body, protocol, None)
}

/// Like [`normalize`], but with the HTTP status available for the fallback
/// message when the body is empty or unreadable.
pub fn normalize_response(
    raw_body: &[u8],
    protocol: ProtocolTag,
    status: Option<u16>,
) -> NormalizedError {
    let parsed = match protocol {
        ProtocolTag::OpenApi => OpenApiError::parse(raw_body).map(NormalizedError::OpenApi),
        ProtocolTag::LegacyXml => LegacyXmlError::parse(raw_body).map(NormalizedError::LegacyXml),
        ProtocolTag::NsxProxy => NsxError::parse(raw_body).map(NormalizedError::NsxProxy),
        ProtocolTag::SoapFault => SoapFault::parse(raw_body).map(NormalizedError::SoapFault),
    };

    if let Some(error) = parsed {
        return error;
    }

    let message = fallback_message(raw_body, protocol, status);
    warn!(%protocol, ?status, "error body did not match its protocol, using fallback message");
    match protocol {
        ProtocolTag::OpenApi => NormalizedError::OpenApi(OpenApiError::fallback(message)),
        ProtocolTag::LegacyXml => NormalizedError::LegacyXml(LegacyXmlError::fallback(message)),
        ProtocolTag::NsxProxy => NormalizedError::NsxProxy(NsxError::fallback(message)),
        ProtocolTag::SoapFault => NormalizedError::SoapFault(SoapFault::fallback(message)),
    }
}

/// Best-effort text for a body nobody could parse.
fn fallback_message(raw_body: &[u8], protocol: ProtocolTag, status: Option<u16>) -> String {
    let text = String::from_utf8_lossy(raw_body);
    let text = text.trim();
    if text.chars().any(char::is_alphanumeric) {
        return truncate(text, MAX_FALLBACK_CHARS);
    }

    match (protocol, status) {
        (_, Some(code)) => status_line(code),
        (ProtocolTag::SoapFault, None) => SOAP_FALLBACK_MESSAGE.to_owned(),
        (_, None) => format!("{protocol} request failed with an unreadable error body"),
    }
}

fn status_line(code: u16) -> String {
    match reqwest::StatusCode::from_u16(code)
        .ok()
        .and_then(|s| s.canonical_reason())
    {
        Some(reason) => format!("HTTP {code} {reason}"),
        None => format!("HTTP {code}"),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", text.get(..idx).unwrap_or(text)),
        None => text.to_owned(),
    }
}

/// Trimmed, non-empty text or `None`.
pub(crate) fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}
