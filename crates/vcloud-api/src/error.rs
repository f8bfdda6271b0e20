use thiserror::Error;

use crate::normalize::NormalizedError;
use crate::version::Version;

/// Top-level error type for the `vcloud-api` crate.
///
/// Covers the decode layer (envelopes, elements), failures reported by the
/// server (always carried as a [`NormalizedError`]), the version-stamp
/// discipline, and the transport boundary.
#[derive(Debug, Error)]
pub enum Error {
    // ── Envelope / element decoding ─────────────────────────────────
    /// Pagination scalars could not be parsed. Fatal for that page.
    #[error("Malformed collection envelope: {reason}")]
    MalformedEnvelope { reason: String },

    /// `values` did not match the requested element type.
    #[error("Cannot decode page {page} elements as {element_type}: {reason}")]
    ElementDecode {
        page: u64,
        element_type: &'static str,
        reason: String,
    },

    /// A singleton response body did not match the requested type.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// An outgoing body could not be serialized.
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    // ── Server-reported failures ────────────────────────────────────
    /// Non-success response, normalized from its protocol's error shape.
    #[error("API error (HTTP {status}): {error}")]
    Api {
        status: u16,
        error: Box<NormalizedError>,
    },

    /// The server rejected a mutation because the submitted version stamp is
    /// stale. Re-read the resource and retry.
    #[error("Version conflict (HTTP {status}): {error}")]
    VersionConflict {
        status: u16,
        error: Box<NormalizedError>,
    },

    // ── Version-stamp discipline ────────────────────────────────────
    /// A create carried a version stamp; the server assigns the first one.
    #[error("Refusing to create a resource that already carries version {0}")]
    VersionOnCreate(Version),

    /// The resource's embedded stamp differs from the one it was read at.
    #[error(
        "Version stamp changed since read: read at {}, submitting {}",
        stamp(.read.as_ref()),
        stamp(.embedded.as_ref())
    )]
    VersionMismatch {
        read: Option<Version>,
        embedded: Option<Version>,
    },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS setup (CA bundle, client build) failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// API version cannot be used in an `Accept` header.
    #[error("Invalid API version: {0}")]
    InvalidApiVersion(String),

    /// Bearer token cannot be used as a header value.
    #[error("Invalid bearer token: {0}")]
    InvalidToken(String),
}

fn stamp(version: Option<&Version>) -> String {
    version.map_or_else(|| "none".to_owned(), ToString::to_string)
}

impl Error {
    /// The normalized server error, for `Api` and `VersionConflict`.
    pub fn normalized(&self) -> Option<&NormalizedError> {
        match self {
            Self::Api { error, .. } | Self::VersionConflict { error, .. } => Some(&**error),
            _ => None,
        }
    }

    /// HTTP status of a server-reported failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } | Self::VersionConflict { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Returns `true` if a re-read followed by a retry may succeed.
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Returns `true` if this is a transient transport error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Api { status, .. } => matches!(status, 502..=504),
            _ => false,
        }
    }

    /// Returns `true` for failures of a single page's elements, which a
    /// pagination walk may choose to skip.
    pub fn is_element_decode(&self) -> bool {
        matches!(self, Self::ElementDecode { .. })
    }

    /// Reclassify the rejection of a stamped update. 409, 412 or a
    /// stale-revision message becomes [`Error::VersionConflict`].
    pub(crate) fn into_update_conflict(self) -> Self {
        match self {
            Self::Api { status, error }
                if matches!(status, 409 | 412) || error.indicates_stale_version() =>
            {
                Self::VersionConflict { status, error }
            }
            other => other,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::normalize::{ProtocolTag, normalize};

    #[test]
    fn mismatch_message_renders_missing_stamps() {
        let v: Version = serde_json::from_str(r#"{"version": 4}"#).unwrap();
        let err = Error::VersionMismatch {
            read: None,
            embedded: Some(v),
        };
        assert_eq!(
            err.to_string(),
            "Version stamp changed since read: read at none, submitting 4"
        );
    }

    #[test]
    fn api_error_displays_normalized_message() {
        let err = Error::Api {
            status: 404,
            error: Box::new(normalize(
                br#"{"minorErrorCode":"NOT_FOUND","message":"Gateway not found"}"#,
                ProtocolTag::OpenApi,
            )),
        };
        assert_eq!(err.to_string(), "API error (HTTP 404): Gateway not found");
        assert!(err.is_not_found());
        assert!(!err.is_version_conflict());
        assert!(err.normalized().is_some());
    }

    fn api(status: u16, body: &[u8], protocol: ProtocolTag) -> Error {
        Error::Api {
            status,
            error: Box::new(normalize(body, protocol)),
        }
    }

    #[test]
    fn rejected_update_statuses_become_conflicts() {
        for status in [409, 412] {
            let err = api(
                status,
                br#"{"minorErrorCode":"BUSY_ENTITY","message":"stale"}"#,
                ProtocolTag::OpenApi,
            )
            .into_update_conflict();
            assert!(err.is_version_conflict(), "{status}: {err:?}");
            assert_eq!(err.status(), Some(status));
        }
    }

    #[test]
    fn stale_revision_message_on_400_becomes_a_conflict() {
        let err = api(
            400,
            br#"<Error majorErrorCode="400" minorErrorCode="BAD_REQUEST" message="The object revision does not match the server copy"/>"#,
            ProtocolTag::LegacyXml,
        )
        .into_update_conflict();
        assert!(err.is_version_conflict());
    }

    #[test]
    fn other_update_failures_stay_api_errors() {
        let err = api(
            400,
            br#"{"minorErrorCode":"BAD_REQUEST","message":"Invalid port range"}"#,
            ProtocolTag::OpenApi,
        )
        .into_update_conflict();
        assert!(matches!(err, Error::Api { status: 400, .. }));

        let err = Error::Tls("no".into()).into_update_conflict();
        assert!(matches!(err, Error::Tls(_)));
    }
}
