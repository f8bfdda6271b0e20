//! Representative leaf resources.
//!
//! OpenAPI types match the JSON bodies under `/cloudapi/1.0.0/edgeGateways/`.
//! Field names use camelCase via `#[serde(rename_all = "camelCase")]`. The
//! legacy `Task` is an XML element and uses quick-xml's `@attribute` names.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::normalize::{LegacyXmlError, NormalizedError};
use crate::version::{Version, Versioned};

// ── References ───────────────────────────────────────────────────────

/// `{id, name}` pointer to another entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    /// URN, e.g. `urn:vcloud:gateway:5d2b...`.
    pub id: String,
    pub name: String,
}

impl Reference {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

// ── Edge gateways ────────────────────────────────────────────────────

/// Edge gateway overview, from `GET /cloudapi/1.0.0/edgeGateways`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeGateway {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub org_vdc: Option<Reference>,
    #[serde(default)]
    pub owner_ref: Option<Reference>,
    #[serde(default)]
    pub org_ref: Option<Reference>,
    /// `REALIZED`, `IN_PROGRESS`, `REALIZATION_FAILED`, ...
    #[serde(default)]
    pub status: Option<String>,
    /// Uplink layout varies by backing; kept as opaque JSON.
    #[serde(default)]
    pub edge_gateway_uplinks: Vec<Value>,
    /// Catch-all for fields not modeled above.
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

// ── NAT ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NatRule {
    /// Assigned by the server on create.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub enabled: bool,
    /// `DNAT`, `SNAT`, `NO_DNAT`, `NO_SNAT`, `REFLEXIVE`.
    #[serde(rename = "type")]
    pub rule_type: String,
    pub external_addresses: String,
    pub internal_addresses: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_port_profile: Option<Reference>,
    #[serde(default)]
    pub logging: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
}

impl Versioned for NatRule {
    fn version(&self) -> Option<Version> {
        self.version
    }

    fn version_mut(&mut self) -> &mut Option<Version> {
        &mut self.version
    }
}

// ── Firewall ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirewallRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub enabled: bool,
    /// `ALLOW`, `DROP`, `REJECT`.
    pub action_value: String,
    /// `IN`, `OUT`, `IN_OUT`.
    pub direction: String,
    /// `IPV4`, `IPV6`, `IPV4_IPV6`.
    pub ip_protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_firewall_groups: Option<Vec<Reference>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_firewall_groups: Option<Vec<Reference>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_port_profiles: Option<Vec<Reference>>,
    #[serde(default)]
    pub logging: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
}

impl Versioned for FirewallRule {
    fn version(&self) -> Option<Version> {
        self.version
    }

    fn version_mut(&mut self) -> &mut Option<Version> {
        &mut self.version
    }
}

// ── IPsec VPN ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalEndpoint {
    pub local_address: String,
    #[serde(default)]
    pub local_networks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEndpoint {
    pub remote_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    #[serde(default)]
    pub remote_networks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpSecTunnel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub enabled: bool,
    pub local_endpoint: LocalEndpoint,
    pub remote_endpoint: RemoteEndpoint,
    /// Write-only on the server side; reads return `null`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_shared_key: Option<String>,
    /// `DEFAULT` or `CUSTOM`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_type: Option<String>,
    #[serde(default)]
    pub logging: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
}

impl Versioned for IpSecTunnel {
    fn version(&self) -> Option<Version> {
        self.version
    }

    fn version_mut(&mut self) -> &mut Option<Version> {
        &mut self.version
    }
}

// ── BGP ──────────────────────────────────────────────────────────────

/// Singleton routing config at `edgeGateways/{id}/routing/bgp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BgpConfig {
    pub enabled: bool,
    #[serde(default)]
    pub ecmp: bool,
    /// Autonomous system number as a string (`"65000"`, or asdot `"1.10"`).
    #[serde(
        rename = "localASNumber",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub local_as_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graceful_restart: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
}

impl Versioned for BgpConfig {
    fn version(&self) -> Option<Version> {
        self.version
    }

    fn version_mut(&mut self) -> &mut Option<Version> {
        &mut self.version
    }
}

// ── Legacy tasks ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
    Queued,
    PreRunning,
    Running,
    Success,
    Error,
    Canceled,
    Aborted,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Success | Self::Error | Self::Canceled | Self::Aborted
        )
    }
}

/// The `<Error>` child of a failed task, same attributes as a legacy error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    #[serde(rename = "@message", default)]
    pub message: Option<String>,
    #[serde(rename = "@majorErrorCode", default)]
    pub major_error_code: Option<i64>,
    #[serde(rename = "@minorErrorCode", default)]
    pub minor_error_code: Option<String>,
    #[serde(rename = "@stackTrace", default)]
    pub stack_trace: Option<String>,
}

/// Legacy `<Task>` returned by asynchronous `/api/` operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    #[serde(rename = "@href")]
    pub href: String,
    #[serde(rename = "@name", default)]
    pub name: Option<String>,
    #[serde(rename = "@status")]
    pub status: TaskStatus,
    #[serde(rename = "@operation", default)]
    pub operation: Option<String>,
    #[serde(rename = "@operationName", default)]
    pub operation_name: Option<String>,
    #[serde(rename = "@startTime", default)]
    pub start_time: Option<String>,
    #[serde(rename = "@endTime", default)]
    pub end_time: Option<String>,
    /// Percent complete, when the server reports it.
    #[serde(rename = "Progress", default)]
    pub progress: Option<u8>,
    #[serde(rename = "Error", default)]
    pub error: Option<TaskError>,
}

impl Task {
    /// The embedded error of a failed task, as a legacy XML error.
    pub fn failure(&self) -> Option<NormalizedError> {
        let error = self.error.as_ref()?;
        let message = error
            .message
            .clone()
            .filter(|m| !m.trim().is_empty())
            .or_else(|| error.minor_error_code.clone())
            .unwrap_or_else(|| {
                format!(
                    "task {} failed",
                    self.operation_name.as_deref().unwrap_or("operation")
                )
            });
        Some(NormalizedError::LegacyXml(LegacyXmlError {
            message,
            major_error_code: error.major_error_code,
            minor_error_code: error.minor_error_code.clone(),
            vendor_specific_error_code: None,
            stack_trace: error.stack_trace.clone(),
            degraded: false,
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::normalize::{DescribeFailure, ErrorCode};

    #[test]
    fn edge_gateway_keeps_unmodeled_fields() {
        let gw: EdgeGateway = serde_json::from_value(json!({
            "id": "urn:vcloud:gateway:5d2b",
            "name": "edge-1",
            "orgVdc": { "id": "urn:vcloud:vdc:1", "name": "vdc-1" },
            "edgeGatewayUplinks": [{ "uplinkName": "tier0" }],
            "distributedRoutingEnabled": true
        }))
        .unwrap();

        assert_eq!(gw.org_vdc, Some(Reference::new("urn:vcloud:vdc:1", "vdc-1")));
        assert_eq!(gw.edge_gateway_uplinks.len(), 1);
        assert_eq!(gw.extra["distributedRoutingEnabled"], json!(true));
    }

    #[test]
    fn nat_rule_create_body_has_no_id_or_version() {
        let rule = NatRule {
            id: None,
            name: "web-dnat".into(),
            description: None,
            enabled: true,
            rule_type: "DNAT".into(),
            external_addresses: "203.0.113.10".into(),
            internal_addresses: "10.0.0.10".into(),
            application_port_profile: None,
            logging: false,
            version: None,
        };
        assert_eq!(
            serde_json::to_value(&rule).unwrap(),
            json!({
                "name": "web-dnat",
                "enabled": true,
                "type": "DNAT",
                "externalAddresses": "203.0.113.10",
                "internalAddresses": "10.0.0.10",
                "logging": false
            })
        );
    }

    #[test]
    fn firewall_rule_round_trips_its_version() {
        let body = json!({
            "id": "fw-1",
            "name": "allow-ssh",
            "enabled": true,
            "actionValue": "ALLOW",
            "direction": "IN",
            "ipProtocol": "IPV4",
            "logging": true,
            "version": { "version": 9 }
        });
        let rule: FirewallRule = serde_json::from_value(body.clone()).unwrap();
        assert_eq!(rule.version().map(Version::get), Some(9));
        assert_eq!(serde_json::to_value(&rule).unwrap(), body);
    }

    #[test]
    fn ipsec_tunnel_decodes_endpoints() {
        let tunnel: IpSecTunnel = serde_json::from_value(json!({
            "id": "t-1",
            "name": "to-dc2",
            "enabled": true,
            "localEndpoint": { "localAddress": "198.51.100.1", "localNetworks": ["10.0.0.0/24"] },
            "remoteEndpoint": { "remoteAddress": "192.0.2.7", "remoteNetworks": ["10.1.0.0/24"] },
            "preSharedKey": null,
            "version": { "version": 2 }
        }))
        .unwrap();
        assert_eq!(tunnel.local_endpoint.local_networks, vec!["10.0.0.0/24"]);
        assert_eq!(tunnel.remote_endpoint.remote_id, None);
        assert_eq!(tunnel.pre_shared_key, None);
        assert_eq!(tunnel.version().map(Version::get), Some(2));
    }

    #[test]
    fn bgp_config_without_version() {
        let bgp: BgpConfig =
            serde_json::from_value(json!({ "enabled": false, "localASNumber": null })).unwrap();
        assert!(!bgp.enabled);
        assert_eq!(bgp.version(), None);
    }

    #[test]
    fn running_task() {
        let xml = r#"<Task href="https://vcd.example.com/api/task/42" name="task" status="running"
                       operationName="vdcUpdateVdc" operation="Updating Virtual Datacenter vdc-1"
                       startTime="2026-03-01T10:00:00.000Z">
                       <Progress>40</Progress>
                     </Task>"#;
        let task: Task = quick_xml::de::from_str(xml).unwrap();
        assert_eq!(task.status, TaskStatus::Running);
        assert!(!task.status.is_terminal());
        assert_eq!(task.progress, Some(40));
        assert!(task.failure().is_none());
    }

    #[test]
    fn failed_task_exposes_a_legacy_error() {
        let xml = r#"<Task href="https://vcd.example.com/api/task/43" status="error" operationName="vappDeploy">
                       <Error majorErrorCode="500" minorErrorCode="INTERNAL_SERVER_ERROR"
                              message="Unable to deploy: insufficient resources"/>
                     </Task>"#;
        let task: Task = quick_xml::de::from_str(xml).unwrap();
        assert!(task.status.is_terminal());

        let failure = task.failure().unwrap();
        assert_eq!(failure.short_description(), "Unable to deploy: insufficient resources");
        assert_eq!(
            failure.code(),
            ErrorCode::Major {
                major: 500,
                minor: Some("INTERNAL_SERVER_ERROR"),
            }
        );
    }
}
