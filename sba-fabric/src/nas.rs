//! NAS (N1, UE ↔ AMF) messages, JSON-shaped per TS 24.501.
//!
//! Plain (unciphered) NAS only: the fabric models the message flow, not the
//! security encoding. Field names follow the 5GMM/5GSM IEs they stand for.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::Snssai;

/// Extended protocol discriminator for 5GS mobility management messages.
pub const EPD_5GMM: u8 = 0x7E;

pub mod msg_type {
    pub const REGISTRATION_REQUEST: u8 = 0x41;
    pub const REGISTRATION_ACCEPT: u8 = 0x42;
    pub const REGISTRATION_COMPLETE: u8 = 0x43;
    pub const REGISTRATION_REJECT: u8 = 0x44;
    pub const DEREGISTRATION_REQUEST_UE_ORIGINATING: u8 = 0x45;
    pub const AUTHENTICATION_REQUEST: u8 = 0x56;
    pub const AUTHENTICATION_RESPONSE: u8 = 0x57;
    pub const AUTHENTICATION_REJECT: u8 = 0x58;
    pub const AUTHENTICATION_FAILURE: u8 = 0x59;
    pub const SECURITY_MODE_COMMAND: u8 = 0x5d;
    pub const SECURITY_MODE_COMPLETE: u8 = 0x5e;
    pub const SECURITY_MODE_REJECT: u8 = 0x5f;
    pub const PDU_SESSION_ESTABLISHMENT_REQUEST: u8 = 0xc1;
    pub const PDU_SESSION_ESTABLISHMENT_ACCEPT: u8 = 0xc2;
    pub const PDU_SESSION_ESTABLISHMENT_REJECT: u8 = 0xc3;
}

/// 5GMM causes (TS 24.501 annex A), the subset the fabric emits.
pub mod cause_5gmm {
    pub const ILLEGAL_UE: u8 = 3;
    pub const UE_IDENTITY_CANNOT_BE_DERIVED: u8 = 9;
    pub const PLMN_NOT_ALLOWED: u8 = 11;
    pub const MAC_FAILURE: u8 = 20;
    pub const SYNCH_FAILURE: u8 = 21;
    pub const CONGESTION: u8 = 22;
    pub const SECURITY_MODE_REJECTED: u8 = 24;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NasHeader {
    #[serde(default = "default_epd")]
    pub extended_protocol_discriminator: u8,
    #[serde(default)]
    pub security_header_type: u8,
    pub message_type: u8,
}

fn default_epd() -> u8 {
    EPD_5GMM
}

impl NasHeader {
    pub fn plain(message_type: u8) -> Self {
        NasHeader {
            extended_protocol_discriminator: EPD_5GMM,
            security_header_type: 0,
            message_type,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub header: NasHeader,
    pub ngksi: u8,
    #[serde(default = "default_registration_type")]
    pub registration_type: u8,
    pub suci: String,
    pub ue_security_capability: Value,
    #[serde(default)]
    pub requested_nssai: Option<Vec<Snssai>>,
    #[serde(default)]
    pub last_visited_tai: Option<Value>,
    #[serde(default)]
    pub uplink_data_status: Option<Value>,
    #[serde(default)]
    pub pdu_session_status: Option<Value>,
}

fn default_registration_type() -> u8 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationAccept {
    pub header: NasHeader,
    /// 1 = 5GS services allowed.
    pub registration_result: u8,
    /// The 5G-GUTI.
    pub mobile_identity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tai_list: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_nssai: Option<Vec<Snssai>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected_nssai: Option<Vec<Snssai>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_feature_support: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticationRequest {
    pub header: NasHeader,
    pub ngksi: u8,
    pub abba: String,
    pub authentication_parameter_rand: String,
    pub authentication_parameter_autn: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NasSecurityAlgorithms {
    /// 1 = 128-NEA1.
    #[serde(rename = "typeOfCipheringAlgorithm")]
    pub type_of_ciphering_algorithm: u8,
    /// 1 = 128-NIA1.
    #[serde(rename = "typeOfIntegrityProtectionAlgorithm")]
    pub type_of_integrity_protection_algorithm: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityModeCommand {
    pub header: NasHeader,
    pub selected_nas_security_algorithms: NasSecurityAlgorithms,
    pub ngksi: u8,
    pub replayed_ue_security_capabilities: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imeisv_request: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PduSessionEstablishmentRequest {
    pub header: NasHeader,
    /// Identifies the UE context this session belongs to.
    pub supi: String,
    pub pdu_session_id: u8,
    pub pti: u8,
    #[serde(default = "default_one")]
    pub pdu_session_type: u8,
    #[serde(default = "default_one")]
    pub ssc_mode: u8,
    #[serde(default)]
    pub dnn: Option<String>,
    #[serde(default)]
    pub s_nssai: Option<Snssai>,
    #[serde(default)]
    pub capability_5gsm: Option<Value>,
}

fn default_one() -> u8 {
    1
}
