//! PFCP (N4, SMF ↔ UPF) messages, JSON-shaped.
//!
//! One envelope per TS 29.244 session procedure: `{messageType, seid,
//! createPDR[], createFAR[], createQER[], createURR[]}` on the way in,
//! `{messageType, cause, …}` on the way out. Message-type and cause values
//! keep their TS 29.244 numeric codes.

use serde::{Deserialize, Serialize};

pub mod message_type {
    pub const HEARTBEAT_REQUEST: u8 = 1;
    pub const HEARTBEAT_RESPONSE: u8 = 2;
    pub const SESSION_ESTABLISHMENT_REQUEST: u8 = 50;
    pub const SESSION_ESTABLISHMENT_RESPONSE: u8 = 51;
    pub const SESSION_MODIFICATION_REQUEST: u8 = 52;
    pub const SESSION_MODIFICATION_RESPONSE: u8 = 53;
    pub const SESSION_DELETION_REQUEST: u8 = 54;
    pub const SESSION_DELETION_RESPONSE: u8 = 55;
}

pub mod cause {
    pub const REQUEST_ACCEPTED: u8 = 1;
    pub const REQUEST_REJECTED: u8 = 64;
    pub const SESSION_CONTEXT_NOT_FOUND: u8 = 65;
    pub const MANDATORY_IE_MISSING: u8 = 66;
    pub const NO_RESOURCES_AVAILABLE: u8 = 75;
    pub const SYSTEM_FAILURE: u8 = 77;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FTeid {
    #[serde(default)]
    pub v4: bool,
    #[serde(default)]
    pub v6: bool,
    pub teid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv4_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv6_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UeIpAddress {
    #[serde(default)]
    pub v4: bool,
    #[serde(default)]
    pub v6: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv4_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv6_address: Option<String>,
}

/// Packet detection information.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pdi {
    /// `ACCESS` (N3 side) or `CORE` (N6 side).
    pub source_interface: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub f_teid: Option<FTeid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_instance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ue_ip_address: Option<UeIpAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qfi: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OuterHeaderCreation {
    /// E.g. `GTP-U/UDP/IPv4`.
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv4_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv6_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_number: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardingParameters {
    pub destination_interface: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_instance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outer_header_creation: Option<OuterHeaderCreation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePdr {
    pub pdr_id: u32,
    pub precedence: u32,
    pub pdi: Pdi,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outer_header_removal: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub far_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qer_id: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub urr_id: Option<Vec<u32>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFar {
    pub far_id: u32,
    /// `FORWARD`, `DROP` or `BUFFER`.
    pub apply_action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forwarding_parameters: Option<ForwardingParameters>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mbr {
    pub ul_mbr: u64,
    pub dl_mbr: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gbr {
    pub ul_gbr: u64,
    pub dl_gbr: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateStatus {
    #[serde(default = "open")]
    pub ul_gate: String,
    #[serde(default = "open")]
    pub dl_gate: String,
}

fn open() -> String {
    "OPEN".to_owned()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateQer {
    pub qer_id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qfi: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate_status: Option<GateStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mbr: Option<Mbr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gbr: Option<Gbr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub averaging_window: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUrr {
    pub urr_id: u32,
    pub measurement_method: u8,
    pub reporting_triggers: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measurement_period: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_threshold: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEstablishmentRequest {
    #[serde(rename = "messageType")]
    pub message_type: u8,
    /// SMF-side SEID; the UPF allocates its own and returns it.
    pub seid: String,
    #[serde(rename = "nodeId", skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    /// `IPV4`, `IPV6` or `IPV4V6`.
    #[serde(rename = "pdnType", skip_serializing_if = "Option::is_none")]
    pub pdn_type: Option<String>,
    #[serde(rename = "createPDR")]
    pub create_pdr: Vec<CreatePdr>,
    #[serde(rename = "createFAR")]
    pub create_far: Vec<CreateFar>,
    #[serde(rename = "createQER", default, skip_serializing_if = "Option::is_none")]
    pub create_qer: Option<Vec<CreateQer>>,
    #[serde(rename = "createURR", default, skip_serializing_if = "Option::is_none")]
    pub create_urr: Option<Vec<CreateUrr>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocatedUeIpAddresses {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv6_prefix: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpfSeid {
    pub seid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv4_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv6_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedPdr {
    pub pdr_id: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadControlInformation {
    pub load_control_sequence_number: u32,
    pub load_metric: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEstablishmentResponse {
    #[serde(rename = "messageType")]
    pub message_type: u8,
    pub cause: u8,
    #[serde(rename = "upFSeid")]
    pub up_f_seid: UpfSeid,
    #[serde(rename = "allocatedUeIpAddresses")]
    pub allocated_ue_ip_addresses: AllocatedUeIpAddresses,
    #[serde(rename = "createdPdr")]
    pub created_pdr: Vec<CreatedPdr>,
    #[serde(rename = "n3Endpoint", skip_serializing_if = "Option::is_none")]
    pub n3_endpoint: Option<String>,
    #[serde(rename = "loadControlInformation", skip_serializing_if = "Option::is_none")]
    pub load_control_information: Option<LoadControlInformation>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionModificationRequest {
    #[serde(rename = "messageType", default)]
    pub message_type: Option<u8>,
    #[serde(rename = "updatePdr", default)]
    pub update_pdr: Option<Vec<UpdatePdr>>,
    #[serde(rename = "updateFar", default)]
    pub update_far: Option<Vec<UpdateFar>>,
    #[serde(rename = "updateQer", default)]
    pub update_qer: Option<Vec<UpdateQer>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePdr {
    pub pdr_id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precedence: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub far_id: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFar {
    pub far_id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apply_action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forwarding_parameters: Option<ForwardingParameters>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateQer {
    pub qer_id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qfi: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mbr: Option<Mbr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gbr: Option<Gbr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionModificationResponse {
    #[serde(rename = "messageType")]
    pub message_type: u8,
    pub cause: u8,
    #[serde(rename = "modificationsApplied")]
    pub modifications_applied: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDeletionResponse {
    #[serde(rename = "messageType")]
    pub message_type: u8,
    pub cause: u8,
    /// Final traffic counters of the released session.
    #[serde(rename = "finalStatistics", skip_serializing_if = "Option::is_none")]
    pub final_statistics: Option<serde_json::Value>,
}
