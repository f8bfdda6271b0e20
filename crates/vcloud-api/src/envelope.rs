// Paginated collection envelopes
//
// Every list endpoint wraps its payload in the same pagination envelope,
// whatever the element type is:
//
//   { "resultTotal": 3, "pageCount": 1, "page": 1, "pageSize": 25,
//     "associations": [...], "values": [ ... ] }
//
// The legacy query service uses the XML equivalent:
//
//   <QueryResultRecords total="3" pageSize="25" page="1"> <XRecord .../> ... </QueryResultRecords>
//
// Decoding is split in two. `decode_envelope` reads the pagination scalars
// and keeps `values` as an opaque handle; `decode_elements::<T>` turns that
// handle into typed elements once the caller names `T`.

use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use tracing::{debug, warn};

use crate::error::Error;
use crate::model::Reference;
use crate::xml;

// ── Content shape ────────────────────────────────────────────────────

/// Serialization format of a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentShape {
    Json,
    Xml,
}

impl ContentShape {
    /// Classify a `Content-Type` header value.
    ///
    /// Matches vendor types too: `application/vnd.vmware.vcloud.query.records+xml`,
    /// `application/json;version=38.0`, `application/soap+xml`.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if mime.ends_with("json") {
            Some(Self::Json)
        } else if mime.ends_with("xml") {
            Some(Self::Xml)
        } else {
            None
        }
    }
}

// ── Page metadata ────────────────────────────────────────────────────

/// The pagination scalars of one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// Items across all pages.
    pub result_total: u64,
    pub page_count: u64,
    /// 1-based.
    pub page: u64,
    pub page_size: u64,
}

impl PageInfo {
    /// Metadata for `page` of a result set, deriving `pageCount`.
    pub fn for_page(result_total: u64, page: u64, page_size: u64) -> Self {
        let page_count = if page_size == 0 {
            0
        } else {
            result_total.div_ceil(page_size)
        };
        Self {
            result_total,
            page_count,
            page,
            page_size,
        }
    }

    /// `true` when no page follows this one according to `pageCount`.
    pub fn is_last_page(&self) -> bool {
        self.page >= self.page_count
    }
}

// ── Envelope ─────────────────────────────────────────────────────────

/// Undecoded `values`.
#[derive(Debug, Clone)]
enum Payload {
    /// `values` absent or `null`.
    Empty,
    Json(Box<RawValue>),
    /// One markup fragment per record element.
    Xml(Vec<String>),
}

/// One page of a list response with its elements still undecoded.
///
/// Immutable once decoded. Call [`Envelope::elements`] (or
/// [`decode_elements`]) with the element type the request asked for.
#[derive(Debug, Clone)]
pub struct Envelope {
    info: PageInfo,
    associations: Option<Box<RawValue>>,
    values: Payload,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonEnvelope {
    result_total: u64,
    page_count: u64,
    page: u64,
    page_size: u64,
    #[serde(default)]
    associations: Option<Box<RawValue>>,
    #[serde(default)]
    values: Option<Box<RawValue>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonEnvelopeRef<'a, T> {
    result_total: u64,
    page_count: u64,
    page: u64,
    page_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    associations: Option<&'a RawValue>,
    values: &'a [T],
}

impl Envelope {
    pub fn info(&self) -> PageInfo {
        self.info
    }

    pub fn result_total(&self) -> u64 {
        self.info.result_total
    }

    pub fn page_count(&self) -> u64 {
        self.info.page_count
    }

    pub fn page(&self) -> u64 {
        self.info.page
    }

    pub fn page_size(&self) -> u64 {
        self.info.page_size
    }

    /// Endpoint-specific side-channel data, passed through untouched.
    pub fn associations(&self) -> Option<&RawValue> {
        self.associations.as_deref()
    }

    /// Decode `associations` into a caller-chosen type.
    pub fn associations_as<A: DeserializeOwned>(&self) -> Result<Option<A>, Error> {
        self.associations
            .as_deref()
            .map(|raw| {
                serde_json::from_str(raw.get()).map_err(|e| Error::Deserialization {
                    message: format!("associations: {e}"),
                    body: raw.get().to_owned(),
                })
            })
            .transpose()
    }

    pub fn shape(&self) -> Option<ContentShape> {
        match self.values {
            Payload::Empty => None,
            Payload::Json(_) => Some(ContentShape::Json),
            Payload::Xml(_) => Some(ContentShape::Xml),
        }
    }

    /// Number of elements in `values` without decoding them, if `values`
    /// is a sequence at all.
    pub fn element_count(&self) -> Option<usize> {
        match self.values {
            Payload::Empty => Some(0),
            Payload::Json(ref raw) => serde_json::from_str::<Vec<IgnoredAny>>(raw.get())
                .ok()
                .map(|v| v.len()),
            Payload::Xml(ref records) => Some(records.len()),
        }
    }

    pub fn is_last_page(&self) -> bool {
        self.info.is_last_page()
    }

    /// Decode `values` as a sequence of `T`.
    pub fn elements<T: DeserializeOwned>(&self) -> Result<Vec<T>, Error> {
        let elements: Vec<T> = match self.values {
            Payload::Empty => Vec::new(),
            Payload::Json(ref raw) => {
                serde_json::from_str(raw.get()).map_err(|e| self.element_error::<T>(&e))?
            }
            Payload::Xml(ref records) => records
                .iter()
                .map(|record| quick_xml::de::from_str::<T>(record))
                .collect::<Result<_, _>>()
                .map_err(|e| self.element_error::<T>(&e))?,
        };

        let count = u64::try_from(elements.len()).unwrap_or(u64::MAX);
        if self.info.page_size > 0 && count > self.info.page_size {
            warn!(
                page = self.info.page,
                count,
                page_size = self.info.page_size,
                "page holds more elements than its pageSize"
            );
        }
        debug!(page = self.info.page, count, "decoded page elements");
        Ok(elements)
    }

    /// Re-encode this page as JSON around already-decoded `values`.
    pub fn encode_json<T: Serialize>(&self, values: &[T]) -> Result<Vec<u8>, Error> {
        encode_envelope(&self.info, self.associations(), values)
    }

    fn element_error<T>(&self, cause: &dyn std::fmt::Display) -> Error {
        Error::ElementDecode {
            page: self.info.page,
            element_type: std::any::type_name::<T>(),
            reason: cause.to_string(),
        }
    }

    fn check_page_bounds(&self) {
        let PageInfo {
            page, page_count, ..
        } = self.info;
        if page_count > 0 && !(1..=page_count).contains(&page) {
            warn!(page, page_count, "page index outside [1, pageCount]");
        }
    }
}

// ── Decoding ─────────────────────────────────────────────────────────

/// Decode the pagination scalars of a list response, deferring `values`.
///
/// Fails with [`Error::MalformedEnvelope`] when the scalars are missing or
/// not non-negative integers. Nothing else is validated.
pub fn decode_envelope(raw_body: &[u8], shape: ContentShape) -> Result<Envelope, Error> {
    let envelope = match shape {
        ContentShape::Json => decode_json_envelope(raw_body)?,
        ContentShape::Xml => decode_xml_envelope(raw_body)?,
    };
    envelope.check_page_bounds();
    debug!(
        page = envelope.info.page,
        page_count = envelope.info.page_count,
        result_total = envelope.info.result_total,
        "decoded envelope"
    );
    Ok(envelope)
}

/// Decode an envelope's `values` as `T`. Same as [`Envelope::elements`].
pub fn decode_elements<T: DeserializeOwned>(envelope: &Envelope) -> Result<Vec<T>, Error> {
    envelope.elements()
}

fn decode_json_envelope(raw_body: &[u8]) -> Result<Envelope, Error> {
    let wire: JsonEnvelope =
        serde_json::from_slice(raw_body).map_err(|e| Error::MalformedEnvelope {
            reason: e.to_string(),
        })?;

    let values = match wire.values {
        Some(raw) if raw.get() != "null" => Payload::Json(raw),
        _ => Payload::Empty,
    };

    Ok(Envelope {
        info: PageInfo {
            result_total: wire.result_total,
            page_count: wire.page_count,
            page: wire.page,
            page_size: wire.page_size,
        },
        associations: wire.associations.filter(|raw| raw.get() != "null"),
        values,
    })
}

fn decode_xml_envelope(raw_body: &[u8]) -> Result<Envelope, Error> {
    let text = std::str::from_utf8(raw_body).map_err(|e| Error::MalformedEnvelope {
        reason: format!("body is not UTF-8: {e}"),
    })?;
    let doc = xml::scan_query_document(text)
        .map_err(|reason| Error::MalformedEnvelope { reason })?;

    let scalar = |name: &str| -> Result<u64, Error> {
        let raw = doc
            .attributes
            .get(name)
            .ok_or_else(|| Error::MalformedEnvelope {
                reason: format!("missing attribute `{name}`"),
            })?;
        raw.trim().parse().map_err(|e| Error::MalformedEnvelope {
            reason: format!("attribute `{name}`={raw:?}: {e}"),
        })
    };

    let result_total = scalar("total")?;
    let page_size = scalar("pageSize")?;
    let page = scalar("page")?;
    let mut info = PageInfo::for_page(result_total, page, page_size);
    if doc.attributes.contains_key("pageCount") {
        info.page_count = scalar("pageCount")?;
    }

    Ok(Envelope {
        info,
        associations: None,
        values: Payload::Xml(doc.records),
    })
}

/// Serialize a JSON envelope around `values`.
///
/// Used to re-encode decoded pages and to build fixtures for walks.
pub fn encode_envelope<T: Serialize>(
    info: &PageInfo,
    associations: Option<&RawValue>,
    values: &[T],
) -> Result<Vec<u8>, Error> {
    serde_json::to_vec(&JsonEnvelopeRef {
        result_total: info.result_total,
        page_count: info.page_count,
        page: info.page,
        page_size: info.page_size,
        associations,
        values,
    })
    .map_err(|e| Error::Serialization {
        message: e.to_string(),
    })
}

// ── Reference lists ──────────────────────────────────────────────────

/// A page whose `values` are always `{id, name}` pairs, decoded eagerly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceList {
    pub result_total: u64,
    pub page_count: u64,
    pub page: u64,
    pub page_size: u64,
    #[serde(default)]
    pub values: Vec<Reference>,
}

impl ReferenceList {
    pub fn info(&self) -> PageInfo {
        PageInfo {
            result_total: self.result_total,
            page_count: self.page_count,
            page: self.page,
            page_size: self.page_size,
        }
    }
}

/// Decode a reference-list page (JSON only).
pub fn decode_reference_list(raw_body: &[u8]) -> Result<ReferenceList, Error> {
    let envelope = decode_envelope(raw_body, ContentShape::Json)?;
    let values = envelope.elements::<Reference>()?;
    let PageInfo {
        result_total,
        page_count,
        page,
        page_size,
    } = envelope.info();
    Ok(ReferenceList {
        result_total,
        page_count,
        page,
        page_size,
        values,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Gateway {
        id: String,
        name: String,
        #[serde(default)]
        description: Option<String>,
    }

    fn body(value: &serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(value).unwrap()
    }

    #[test]
    fn three_elements_on_one_page() {
        let raw = body(&json!({
            "resultTotal": 3,
            "pageCount": 1,
            "page": 1,
            "pageSize": 25,
            "associations": null,
            "values": [
                { "id": "urn:vcloud:gateway:a", "name": "A" },
                { "id": "urn:vcloud:gateway:b", "name": "B" },
                { "id": "urn:vcloud:gateway:c", "name": "C", "description": "edge" },
            ]
        }));

        let envelope = decode_envelope(&raw, ContentShape::Json).unwrap();
        assert_eq!(envelope.info(), PageInfo::for_page(3, 1, 25));
        assert!(envelope.is_last_page());
        assert_eq!(envelope.element_count(), Some(3));
        assert!(envelope.associations().is_none());

        let gateways: Vec<Gateway> = decode_elements(&envelope).unwrap();
        assert_eq!(gateways.len(), 3);
        assert_eq!(gateways[2].name, "C");
        assert_eq!(gateways[2].description.as_deref(), Some("edge"));
    }

    #[test]
    fn same_envelope_serves_different_element_types() {
        let raw = body(&json!({
            "resultTotal": 1, "pageCount": 1, "page": 1, "pageSize": 10,
            "values": [{ "id": "urn:vcloud:vdc:1", "name": "vdc-1" }]
        }));
        let envelope = decode_envelope(&raw, ContentShape::Json).unwrap();

        let as_refs: Vec<Reference> = envelope.elements().unwrap();
        let as_values: Vec<serde_json::Value> = envelope.elements().unwrap();
        assert_eq!(as_refs[0].name, "vdc-1");
        assert_eq!(as_values[0]["id"], "urn:vcloud:vdc:1");
    }

    #[test]
    fn missing_or_null_values_decode_to_nothing() {
        for raw in [
            body(&json!({"resultTotal": 0, "pageCount": 0, "page": 1, "pageSize": 25})),
            body(&json!({"resultTotal": 0, "pageCount": 0, "page": 1, "pageSize": 25, "values": null})),
        ] {
            let envelope = decode_envelope(&raw, ContentShape::Json).unwrap();
            assert_eq!(envelope.shape(), None);
            assert!(envelope.elements::<Gateway>().unwrap().is_empty());
        }
    }

    #[test]
    fn unparsable_scalars_are_malformed() {
        let cases = [
            json!({"pageCount": 1, "page": 1, "pageSize": 25, "values": []}),
            json!({"resultTotal": -1, "pageCount": 1, "page": 1, "pageSize": 25}),
            json!({"resultTotal": "3", "pageCount": 1, "page": 1, "pageSize": 25}),
            json!([1, 2, 3]),
        ];
        for case in cases {
            let err = decode_envelope(&body(&case), ContentShape::Json).unwrap_err();
            assert!(
                matches!(err, Error::MalformedEnvelope { .. }),
                "{case}: expected MalformedEnvelope, got {err:?}"
            );
        }

        let err = decode_envelope(b"<html>", ContentShape::Json).unwrap_err();
        assert!(matches!(err, Error::MalformedEnvelope { .. }));
    }

    #[test]
    fn element_mismatch_reports_page() {
        let raw = body(&json!({
            "resultTotal": 30, "pageCount": 2, "page": 2, "pageSize": 25,
            "values": [{ "id": 17, "name": "wrong id type" }]
        }));
        let envelope = decode_envelope(&raw, ContentShape::Json).unwrap();

        match envelope.elements::<Gateway>() {
            Err(Error::ElementDecode {
                page,
                element_type,
                ref reason,
            }) => {
                assert_eq!(page, 2);
                assert!(element_type.ends_with("Gateway"));
                assert!(reason.contains("invalid type"), "reason: {reason}");
            }
            other => panic!("expected ElementDecode, got {other:?}"),
        }
    }

    #[test]
    fn non_array_values_fail_at_element_decode_not_envelope_decode() {
        let raw = body(&json!({
            "resultTotal": 1, "pageCount": 1, "page": 1, "pageSize": 25,
            "values": { "id": "x", "name": "y" }
        }));
        let envelope = decode_envelope(&raw, ContentShape::Json).unwrap();
        assert_eq!(envelope.element_count(), None);
        assert!(matches!(
            envelope.elements::<Gateway>(),
            Err(Error::ElementDecode { .. })
        ));
    }

    #[test]
    fn re_encoding_is_stable() {
        let raw = body(&json!({
            "resultTotal": 2, "pageCount": 1, "page": 1, "pageSize": 25,
            "associations": [{ "entityId": "urn:vcloud:gateway:a", "associationId": "grp-1" }],
            "values": [
                { "id": "urn:vcloud:gateway:a", "name": "A" },
                { "id": "urn:vcloud:gateway:b", "name": "B", "description": null },
            ]
        }));

        let first = decode_envelope(&raw, ContentShape::Json).unwrap();
        let first_elements: Vec<Gateway> = first.elements().unwrap();

        let encoded = encode_envelope(&first.info(), first.associations(), &first_elements).unwrap();
        let second = decode_envelope(&encoded, ContentShape::Json).unwrap();
        let second_elements: Vec<Gateway> = second.elements().unwrap();

        assert_eq!(first.info(), second.info());
        assert_eq!(first_elements, second_elements);
        assert_eq!(
            first.associations().map(RawValue::get),
            second.associations().map(RawValue::get)
        );

        let third = second.encode_json(&second_elements).unwrap();
        assert_eq!(encoded, third);
    }

    #[test]
    fn associations_are_passed_through() {
        #[derive(Debug, Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Association {
            entity_id: String,
            association_id: String,
        }

        let raw = body(&json!({
            "resultTotal": 0, "pageCount": 0, "page": 1, "pageSize": 25,
            "associations": [{ "entityId": "urn:vcloud:vm:1", "associationId": "vapp-7" }],
            "values": []
        }));
        let envelope = decode_envelope(&raw, ContentShape::Json).unwrap();
        let associations: Vec<Association> = envelope.associations_as().unwrap().unwrap();
        assert_eq!(associations[0].entity_id, "urn:vcloud:vm:1");
        assert_eq!(associations[0].association_id, "vapp-7");
    }

    // ── XML query envelopes ──────────────────────────────────────────

    #[derive(Debug, PartialEq, Deserialize)]
    struct VdcRecord {
        #[serde(rename = "@name")]
        name: String,
        #[serde(rename = "@href")]
        href: String,
        #[serde(rename = "@isEnabled", default)]
        is_enabled: Option<bool>,
    }

    const QUERY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
        <QueryResultRecords xmlns="http://www.vmware.com/vcloud/v1.5"
                            total="3" pageSize="2" page="1" name="orgVdc"
                            type="application/vnd.vmware.vcloud.query.records+xml">
            <Link rel="nextPage" href="https://vcd.example.com/api/query?type=orgVdc&amp;page=2"/>
            <OrgVdcRecord name="vdc-a" href="https://vcd.example.com/api/vdc/a" isEnabled="true"/>
            <OrgVdcRecord name="vdc-b" href="https://vcd.example.com/api/vdc/b" isEnabled="false"></OrgVdcRecord>
        </QueryResultRecords>"#;

    #[test]
    fn xml_query_envelope() {
        let envelope = decode_envelope(QUERY.as_bytes(), ContentShape::Xml).unwrap();
        assert_eq!(envelope.info(), PageInfo::for_page(3, 1, 2));
        assert_eq!(envelope.page_count(), 2);
        assert!(!envelope.is_last_page());
        assert_eq!(envelope.element_count(), Some(2));

        let records: Vec<VdcRecord> = envelope.elements().unwrap();
        assert_eq!(
            records,
            vec![
                VdcRecord {
                    name: "vdc-a".into(),
                    href: "https://vcd.example.com/api/vdc/a".into(),
                    is_enabled: Some(true),
                },
                VdcRecord {
                    name: "vdc-b".into(),
                    href: "https://vcd.example.com/api/vdc/b".into(),
                    is_enabled: Some(false),
                },
            ]
        );
    }

    #[test]
    fn xml_envelope_without_scalars_is_malformed() {
        let raw = br#"<QueryResultRecords total="3" page="1"/>"#;
        let err = decode_envelope(raw, ContentShape::Xml).unwrap_err();
        assert!(matches!(err, Error::MalformedEnvelope { ref reason } if reason.contains("pageSize")));

        let raw = br#"<QueryResultRecords total="many" pageSize="25" page="1"/>"#;
        assert!(matches!(
            decode_envelope(raw, ContentShape::Xml),
            Err(Error::MalformedEnvelope { .. })
        ));
    }

    #[test]
    fn empty_xml_query() {
        let raw = br#"<QueryResultRecords total="0" pageSize="25" page="1"/>"#;
        let envelope = decode_envelope(raw, ContentShape::Xml).unwrap();
        assert_eq!(envelope.page_count(), 0);
        assert!(envelope.elements::<VdcRecord>().unwrap().is_empty());
    }

    #[test]
    fn reference_list() {
        let raw = body(&json!({
            "resultTotal": 2, "pageCount": 1, "page": 1, "pageSize": 128,
            "values": [
                { "id": "urn:vcloud:org:1", "name": "System" },
                { "id": "urn:vcloud:org:2", "name": "tenant-a" },
            ]
        }));
        let list = decode_reference_list(&raw).unwrap();
        assert_eq!(list.info(), PageInfo::for_page(2, 1, 128));
        assert_eq!(list.values[1], Reference::new("urn:vcloud:org:2", "tenant-a"));
    }

    #[test]
    fn content_types() {
        assert_eq!(
            ContentShape::from_content_type("application/json;version=38.0"),
            Some(ContentShape::Json)
        );
        assert_eq!(
            ContentShape::from_content_type("application/vnd.vmware.vcloud.query.records+xml; charset=UTF-8"),
            Some(ContentShape::Xml)
        );
        assert_eq!(ContentShape::from_content_type("text/html"), None);
    }
}
