// SOAP fault from the WS-Trust / SAML token endpoints
//
// <s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope">
//   <s:Body>
//     <s:Fault>
//       <s:Code>
//         <s:Value>s:Sender</s:Value>
//         <s:Subcode><s:Value>a:FailedAuthentication</s:Value></s:Subcode>
//       </s:Code>
//       <s:Reason><s:Text xml:lang="en-US">ID3242: The security token could not be authenticated.</s:Text></s:Reason>
//     </s:Fault>
//   </s:Body>
// </s:Envelope>
//
// SOAP 1.1 faults (`faultcode` / `faultstring` / `detail`) are accepted too.

use serde::Serialize;

use super::{DescribeFailure, non_empty};
use crate::xml::XmlDocument;

/// Message used when a fault carries no usable reason text.
pub const SOAP_FALLBACK_MESSAGE: &str = "authentication request failed";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SoapFault {
    /// First `Fault/Reason/Text`, or the fallback message when empty.
    pub reason: String,
    /// `Fault/Code/Value`, e.g. `s:Sender`.
    pub code: Option<String>,
    /// `Fault/Code/Subcode/Value`, e.g. `a:FailedAuthentication`.
    pub subcode: Option<String>,
    pub detail: Option<String>,
    #[serde(skip)]
    pub(crate) degraded: bool,
}

impl SoapFault {
    pub(crate) fn parse(raw: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(raw).ok()?;
        let doc = XmlDocument::parse(text).ok()?;
        if !doc.has_element("Fault") {
            return None;
        }

        let reason = non_empty(doc.text("Fault/Reason/Text"))
            .or_else(|| non_empty(doc.text("Fault/Reason")))
            .or_else(|| non_empty(doc.text("Fault/faultstring")))
            .unwrap_or_else(|| SOAP_FALLBACK_MESSAGE.to_owned());

        let code = non_empty(doc.text("Fault/Code/Value"))
            .or_else(|| non_empty(doc.text("Fault/faultcode")));
        let subcode = non_empty(doc.text("Fault/Code/Subcode/Value"));
        let detail = doc
            .text_below("Fault/Detail")
            .or_else(|| doc.text_below("Fault/detail"));

        Some(Self {
            reason,
            code,
            subcode,
            detail,
            degraded: false,
        })
    }

    pub(crate) fn fallback(message: String) -> Self {
        Self {
            reason: message,
            code: None,
            subcode: None,
            detail: None,
            degraded: true,
        }
    }
}

impl DescribeFailure for SoapFault {
    fn short_description(&self) -> String {
        self.reason.clone()
    }

    fn detailed_description(&self) -> String {
        let mut out = match (self.code.as_deref(), self.subcode.as_deref()) {
            (Some(code), Some(sub)) => format!("SOAP fault {code} ({sub}): {}", self.reason),
            (Some(code), None) => format!("SOAP fault {code}: {}", self.reason),
            (None, _) => format!("SOAP fault: {}", self.reason),
        };
        if let Some(ref detail) = self.detail {
            out.push_str("\nDetail: ");
            out.push_str(detail);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::normalize::{DescribeFailure, ErrorCode, NormalizedError, ProtocolTag, normalize};

    use super::SOAP_FALLBACK_MESSAGE;

    const FAULT: &[u8] = br#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:a="http://www.w3.org/2005/08/addressing">
      <s:Header><a:Action s:mustUnderstand="1">http://www.w3.org/2005/08/addressing/soap/fault</a:Action></s:Header>
      <s:Body>
        <s:Fault>
          <s:Code>
            <s:Value>s:Sender</s:Value>
            <s:Subcode><s:Value xmlns:a="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd">a:FailedAuthentication</s:Value></s:Subcode>
          </s:Code>
          <s:Reason><s:Text xml:lang="en-US">ID3242: The security token could not be authenticated or authorized.</s:Text></s:Reason>
        </s:Fault>
      </s:Body>
    </s:Envelope>"#;

    #[test]
    fn first_reason_text_wins_over_translations() {
        let fault = br#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"><s:Body><s:Fault>
              <s:Code><s:Value>s:Sender</s:Value></s:Code>
              <s:Reason>
                <s:Text xml:lang="en">Bad token</s:Text>
                <s:Text xml:lang="de">Ungueltiges Token</s:Text>
              </s:Reason>
            </s:Fault></s:Body></s:Envelope>"#;

        let err = normalize(fault, ProtocolTag::SoapFault);
        assert_eq!(err.short_description(), "Bad token");
        assert_eq!(err.detailed_description(), "SOAP fault s:Sender: Bad token");
    }

    #[test]
    fn reason_text_is_the_message() {
        let err = normalize(FAULT, ProtocolTag::SoapFault);
        assert!(!err.is_degraded());
        assert_eq!(
            err.short_description(),
            "ID3242: The security token could not be authenticated or authorized."
        );
        assert_eq!(err.code(), ErrorCode::None);
        assert_eq!(
            err.detailed_description(),
            "SOAP fault s:Sender (a:FailedAuthentication): ID3242: The security token could not be authenticated or authorized."
        );
    }

    #[test]
    fn empty_reason_still_has_a_message() {
        let body = br#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope">
            <s:Body><s:Fault>
              <s:Code><s:Value>s:Receiver</s:Value></s:Code>
              <s:Reason><s:Text xml:lang="en-US"></s:Text></s:Reason>
            </s:Fault></s:Body>
          </s:Envelope>"#;

        let err = normalize(body, ProtocolTag::SoapFault);
        assert!(!err.is_degraded());
        assert_eq!(err.short_description(), SOAP_FALLBACK_MESSAGE);
        match err {
            NormalizedError::SoapFault(ref fault) => assert_eq!(fault.code.as_deref(), Some("s:Receiver")),
            ref other => panic!("expected SOAP fault, got {other:?}"),
        }
    }

    #[test]
    fn soap_11_fault() {
        let body = br#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/">
            <soapenv:Body><soapenv:Fault>
              <faultcode>soapenv:Client</faultcode>
              <faultstring>Invalid SAML assertion</faultstring>
              <detail><reason>token expired</reason></detail>
            </soapenv:Fault></soapenv:Body>
          </soapenv:Envelope>"#;

        let err = normalize(body, ProtocolTag::SoapFault);
        assert_eq!(err.short_description(), "Invalid SAML assertion");
        assert_eq!(err.detail(), Some("token expired"));
    }

    #[test]
    fn envelope_without_fault_is_degraded() {
        let body = br#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"><s:Body/></s:Envelope>"#;
        let err = normalize(body, ProtocolTag::SoapFault);
        assert!(err.is_degraded());
        assert!(!err.short_description().is_empty());
    }
}
