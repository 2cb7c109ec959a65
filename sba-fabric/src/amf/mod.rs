//! Access management (AMF): the NAS endpoint and the orchestrator of
//! registration, authentication, security mode and PDU-session
//! establishment. Also terminates NGAP toward the gNB.

pub mod api;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Value, json};
use sha2::{Digest as _, Sha256};
use time::OffsetDateTime;
use sba_task::TaskSet;
use uuid::Uuid;

use crate::client::Sbi;
use crate::config::{self, Conf};
use crate::nas::{self, NasHeader, NasSecurityAlgorithms, RegistrationAccept, SecurityModeCommand};
use crate::service::{self, Registration};
use crate::types::{Guami, NfProfile, NfType, PlmnId, Snssai};

pub const SERVING_NETWORK_NAME: &str = "5G:mnc001.mcc001.3gppnetwork.org";

/// Simplified GUAMI encoding used inside the 5G-GUTI.
const GUAMI_HEX: &str = "001010001001";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistrationState {
    Deregistered,
    AuthPending,
    SecPending,
    Registered,
}

#[derive(Debug, Clone, Serialize)]
pub struct SecurityContext {
    pub kseaf: String,
    pub selected_algorithms: NasSecurityAlgorithms,
    pub ngksi: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct UeContext {
    pub supi: String,
    pub suci: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guti: Option<String>,
    pub registration_state: RegistrationState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_context: Option<SecurityContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_nssai: Option<Vec<Snssai>>,
    pub allowed_nssai: Vec<Snssai>,
    pub ue_security_capability: Value,
    /// PDU session id → SMF context id.
    pub pdu_sessions: BTreeMap<u8, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amf_ue_ngap_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ran_ue_ngap_id: Option<u64>,
    #[serde(skip)]
    pub pending_auth_ctx: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imeisv: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub registration_time: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlmnSupportItem {
    pub plmn_id: PlmnId,
    pub snssai_list: Vec<Snssai>,
}

#[derive(Clone)]
pub struct AmfState {
    pub instance_id: Uuid,
    pub sbi: Arc<Sbi>,
    pub guami: Guami,
    pub plmn_support_list: Vec<PlmnSupportItem>,
    pub ue_contexts: Arc<Mutex<HashMap<String, UeContext>>>,
    /// RAN-UE-NGAP-ID → AMF-UE-NGAP-ID bindings from Initial UE Messages.
    pub ngap_bindings: Arc<Mutex<HashMap<u64, u64>>>,
    pub amf_ue_ngap_id_counter: Arc<AtomicU64>,
}

impl AmfState {
    pub fn new(sbi: Arc<Sbi>) -> Self {
        AmfState {
            instance_id: Uuid::new_v4(),
            sbi,
            guami: Guami::home(),
            plmn_support_list: vec![PlmnSupportItem {
                plmn_id: PlmnId::home(),
                snssai_list: vec![
                    Snssai {
                        sst: 1,
                        sd: Some("010203".to_owned()),
                    },
                    Snssai {
                        sst: 2,
                        sd: Some("020304".to_owned()),
                    },
                ],
            }],
            ue_contexts: Arc::new(Mutex::new(HashMap::new())),
            ngap_bindings: Arc::new(Mutex::new(HashMap::new())),
            amf_ue_ngap_id_counter: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn next_amf_ue_ngap_id(&self) -> u64 {
        self.amf_ue_ngap_id_counter.fetch_add(1, Ordering::Relaxed)
    }

    /// Accept each requested S-NSSAI whose SST some served PLMN supports;
    /// no request means the default slice.
    pub fn negotiate_nssai(&self, requested: Option<&[Snssai]>) -> (Vec<Snssai>, Vec<Snssai>) {
        let Some(requested) = requested else {
            return (vec![Snssai::default_slice()], Vec::new());
        };

        let mut allowed = Vec::new();
        let mut rejected = Vec::new();

        for snssai in requested {
            let supported = self
                .plmn_support_list
                .iter()
                .flat_map(|item| &item.snssai_list)
                .any(|served| served.sst == snssai.sst);

            if supported {
                allowed.push(snssai.clone());
            } else {
                rejected.push(snssai.clone());
            }
        }

        (allowed, rejected)
    }

    pub fn create_registration_accept(&self, supi: &str, requested: Option<&[Snssai]>) -> RegistrationAccept {
        let (allowed, rejected) = self.negotiate_nssai(requested);

        RegistrationAccept {
            header: NasHeader::plain(nas::msg_type::REGISTRATION_ACCEPT),
            registration_result: 1,
            mobile_identity: generate_guti(supi),
            tai_list: Some(json!([{
                "typeOfList": "00",
                "numberOfElements": 1,
                "plmnId": { "mcc": "001", "mnc": "01" },
                "tac": "000001"
            }])),
            allowed_nssai: if allowed.is_empty() { None } else { Some(allowed) },
            rejected_nssai: if rejected.is_empty() { None } else { Some(rejected) },
            network_feature_support: Some(json!({
                "ims_vops_3gpp": true,
                "ims_vops_n3gpp": true,
                "emc_3gpp": true,
                "emc_n3gpp": true
            })),
        }
    }

    pub fn create_security_mode_command(&self, ue_security_capability: Value) -> SecurityModeCommand {
        SecurityModeCommand {
            header: NasHeader::plain(nas::msg_type::SECURITY_MODE_COMMAND),
            selected_nas_security_algorithms: NasSecurityAlgorithms {
                type_of_ciphering_algorithm: 1,    // 128-NEA1
                type_of_integrity_protection_algorithm: 1, // 128-NIA1
            },
            ngksi: 1,
            replayed_ue_security_capabilities: ue_security_capability,
            imeisv_request: Some(1),
        }
    }
}

/// 5G-GUTI per TS 23.003: `"4" ‖ GUAMI ‖ 5G-TMSI`, rendered uppercase hex.
/// The TMSI is the first 32 bits of SHA-256 over the IMSI, keeping the id
/// stable across processes.
pub fn generate_guti(supi: &str) -> String {
    let imsi = supi.strip_prefix("imsi-").unwrap_or("001010000000001");

    let digest = Sha256::digest(imsi);
    let tmsi = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);

    format!("4{GUAMI_HEX}{tmsi:08X}")
}

pub async fn run() -> anyhow::Result<()> {
    let conf = Conf::for_port(config::AMF_PORT)?;
    let _logger_guard = sba_log::init(&conf.log_filter)?;

    let sbi = Arc::new(Sbi::new(conf.nrf_url.clone(), NfType::Amf));
    let state = AmfState::new(Arc::clone(&sbi));
    info!(nf.instance_id = %state.instance_id, "AMF starting");

    let mut profile = NfProfile::for_service(
        state.instance_id,
        NfType::Amf,
        "namf-comm",
        "127.0.0.1",
        conf.bind_addr.port(),
    );
    profile.amf_info = Some(json!({
        "amfSetId": "001",
        "amfRegionId": "01",
        "guamiList": [state.guami],
        "taiList": [{ "plmnId": { "mcc": "001", "mnc": "01" }, "tac": "000001" }]
    }));

    let router = api::make_router(state);

    service::serve(
        "sba-amf",
        conf.bind_addr,
        router,
        TaskSet::new(),
        Some(Registration { sbi, profile }),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guti_shape_matches_ts_23003_rendering() {
        let guti = generate_guti("imsi-001010000000001");

        assert_eq!(guti.len(), 21);
        assert!(guti.starts_with('4'));
        assert!(guti.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        // Stable across calls and processes.
        assert_eq!(guti, generate_guti("imsi-001010000000001"));
        assert_ne!(guti, generate_guti("imsi-001010000000002"));
    }

    #[test]
    fn nssai_negotiation_accepts_supported_ssts() {
        let state = AmfState::new(Arc::new(Sbi::new("http://127.0.0.1:8000", NfType::Amf)));

        let requested = vec![
            Snssai {
                sst: 1,
                sd: Some("010203".to_owned()),
            },
            Snssai { sst: 9, sd: None },
        ];

        let (allowed, rejected) = state.negotiate_nssai(Some(&requested));
        assert_eq!(allowed.len(), 1);
        assert_eq!(allowed[0].sst, 1);
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].sst, 9);
    }

    #[test]
    fn empty_request_yields_default_slice() {
        let state = AmfState::new(Arc::new(Sbi::new("http://127.0.0.1:8000", NfType::Amf)));

        let (allowed, rejected) = state.negotiate_nssai(None);
        assert_eq!(allowed, vec![Snssai::default_slice()]);
        assert!(rejected.is_empty());
    }
}
