// Raw responses handed over by the HTTP layer
//
// Whatever issued the request, the rest of the crate only needs the status,
// the body, how the body is shaped and which protocol it speaks.

use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::envelope::{ContentShape, Envelope, decode_envelope};
use crate::error::Error;
use crate::normalize::{ProtocolTag, normalize_response};

#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub shape: ContentShape,
    pub protocol: ProtocolTag,
    pub body: Bytes,
}

impl RawResponse {
    /// Drain a `reqwest` response.
    ///
    /// The shape comes from `Content-Type`; anything unrecognised (or a
    /// missing header) is taken to be the protocol's native shape.
    pub async fn from_reqwest(resp: reqwest::Response, protocol: ProtocolTag) -> Result<Self, Error> {
        let status = resp.status().as_u16();
        let shape = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(ContentShape::from_content_type)
            .unwrap_or_else(|| protocol.native_shape());
        let body = resp.bytes().await?;
        debug!(status, ?shape, bytes = body.len(), "received response");
        Ok(Self {
            status,
            shape,
            protocol,
            body,
        })
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Pass a 2xx response through; turn anything else into [`Error::Api`].
    pub fn into_success(self) -> Result<Self, Error> {
        if self.is_success() {
            return Ok(self);
        }

        let error = Box::new(normalize_response(&self.body, self.protocol, Some(self.status)));
        debug!(status = self.status, protocol = %self.protocol, %error, "request failed");
        Err(Error::Api {
            status: self.status,
            error,
        })
    }

    /// Decode the body as a single resource of the response's shape.
    ///
    /// An empty JSON body (`202 Accepted`, `204 No Content`) decodes as
    /// `null`, so `()` and `Option<T>` accept it.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, Error> {
        let result = match self.shape {
            ContentShape::Json if self.body.trim_ascii().is_empty() => {
                serde_json::from_slice(b"null").map_err(|e| e.to_string())
            }
            ContentShape::Json => serde_json::from_slice(&self.body).map_err(|e| e.to_string()),
            ContentShape::Xml => std::str::from_utf8(&self.body)
                .map_err(|e| e.to_string())
                .and_then(|text| quick_xml::de::from_str(text).map_err(|e| e.to_string())),
        };
        result.map_err(|message| {
            let body = String::from_utf8_lossy(&self.body).into_owned();
            let preview: String = body.chars().take(200).collect();
            Error::Deserialization {
                message: format!("{message} (body preview: {preview:?})"),
                body,
            }
        })
    }

    /// Decode the body as a collection envelope.
    pub fn envelope(&self) -> Result<Envelope, Error> {
        decode_envelope(&self.body, self.shape)
    }
}
