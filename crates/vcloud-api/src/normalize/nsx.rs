// Network-manager error proxied through `/network/`
//
// <error>
//   <details>Firewall rule 1044 does not exist.</details>
//   <errorCode>100</errorCode>
//   <moduleName>vShield Edge</moduleName>
// </error>

use serde::Serialize;

use super::{DescribeFailure, non_empty};
use crate::xml::XmlDocument;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NsxError {
    pub error_code: Option<String>,
    /// Free text; doubles as the message.
    pub details: String,
    pub module_name: Option<String>,
    #[serde(skip)]
    pub(crate) degraded: bool,
}

impl NsxError {
    pub(crate) fn parse(raw: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(raw).ok()?;
        let doc = XmlDocument::parse(text).ok()?;
        if doc.root != "error" {
            return None;
        }

        let error_code = non_empty(doc.text("error/errorCode"));
        let module_name = non_empty(doc.text("error/moduleName"));
        let details = non_empty(doc.text("error/details"))
            .or_else(|| error_code.as_ref().map(|code| format!("network manager error {code}")))?;

        Some(Self {
            error_code,
            details,
            module_name,
            degraded: false,
        })
    }

    pub(crate) fn fallback(message: String) -> Self {
        Self {
            error_code: None,
            details: message,
            module_name: None,
            degraded: true,
        }
    }
}

impl DescribeFailure for NsxError {
    fn short_description(&self) -> String {
        self.details.clone()
    }

    fn detailed_description(&self) -> String {
        let module = self.module_name.as_deref().unwrap_or("network manager");
        match self.error_code {
            Some(ref code) => format!("{module} error {code}: {}", self.details),
            None => format!("{module}: {}", self.details),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::normalize::{DescribeFailure, ErrorCode, ProtocolTag, normalize};

    #[test]
    fn proxied_error() {
        let body = br"<?xml version='1.0' encoding='UTF-8'?>
            <error>
              <details>Firewall rule 1044 does not exist.</details>
              <errorCode>100</errorCode>
              <moduleName>vShield Edge</moduleName>
            </error>";

        let err = normalize(body, ProtocolTag::NsxProxy);
        assert!(!err.is_degraded());
        assert_eq!(err.short_description(), "Firewall rule 1044 does not exist.");
        assert_eq!(err.code(), ErrorCode::Nsx("100"));
        assert_eq!(
            err.detailed_description(),
            "vShield Edge error 100: Firewall rule 1044 does not exist."
        );
    }

    #[test]
    fn empty_details_use_the_code() {
        let body = b"<error><details/><errorCode>14542</errorCode></error>";
        let err = normalize(body, ProtocolTag::NsxProxy);
        assert_eq!(err.short_description(), "network manager error 14542");
        assert_eq!(
            err.detailed_description(),
            "network manager error 14542: network manager error 14542"
        );
    }

    #[test]
    fn legacy_error_is_not_an_nsx_error() {
        let body = br#"<Error majorErrorCode="500" message="boom"/>"#;
        let err = normalize(body, ProtocolTag::NsxProxy);
        assert!(err.is_degraded());
    }
}
