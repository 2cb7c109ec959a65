//! Subscriber store (UDM): per-SUPI subscription data, long-term
//! authentication material, and the record of which AMF serves each UE.
//!
//! Pre-seeded with a small roster of test subscribers at boot; nothing is
//! persisted.

pub mod api;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::RngCore as _;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sha2::{Digest as _, Sha256};
use time::OffsetDateTime;
use sba_task::TaskSet;
use uuid::Uuid;

use crate::client::Sbi;
use crate::config::{self, Conf};
use crate::service::{self, Registration};
use crate::types::{Guami, NfProfile, NfType};

pub const SEEDED_SUPIS: [&str; 4] = [
    "imsi-001010000000001",
    "imsi-001010000000002",
    "imsi-001010000000003",
    "imsi-001010000000004",
];

/// Long-term authentication material of one subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSubscription {
    pub authentication_method: String,
    /// Hex-encoded permanent key K.
    pub enc_permanent_key: String,
    pub sequence_number: String,
    pub authentication_management_field: String,
    pub algorithm_id: String,
}

/// 5G-AKA vector as produced over N13 (Nudm_UEAuthentication).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthVector {
    pub rand: String,
    pub xres: String,
    pub autn: String,
    pub kausf: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmfRegistration {
    pub amf_instance_id: Uuid,
    pub dereg_callback_uri: String,
    pub guami: Guami,
    #[serde(default)]
    pub rat_type: Option<String>,
    #[serde(default)]
    pub plmn_id: Option<Value>,
    #[serde(default)]
    pub initial_registration_ind: Option<bool>,
    #[serde(default)]
    #[serde(with = "time::serde::rfc3339::option")]
    pub registration_time: Option<OffsetDateTime>,
}

#[derive(Debug, Clone)]
pub struct AmfRegistrationRecord {
    pub registration_id: Uuid,
    pub registration: AmfRegistration,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthEvent {
    pub nf_instance_id: String,
    pub success: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub time_stamp: OffsetDateTime,
    pub auth_type: String,
    pub serving_network_name: String,
}

#[derive(Clone)]
pub struct UdmState {
    pub instance_id: Uuid,
    pub am_data: Arc<Mutex<HashMap<String, Value>>>,
    pub sm_data: Arc<Mutex<HashMap<String, Value>>>,
    pub auth_subscriptions: Arc<Mutex<HashMap<String, AuthSubscription>>>,
    pub amf_registrations: Arc<Mutex<HashMap<String, AmfRegistrationRecord>>>,
    pub auth_events: Arc<Mutex<HashMap<String, Vec<AuthEvent>>>>,
}

impl UdmState {
    pub fn new() -> Self {
        let state = UdmState {
            instance_id: Uuid::new_v4(),
            am_data: Arc::new(Mutex::new(HashMap::new())),
            sm_data: Arc::new(Mutex::new(HashMap::new())),
            auth_subscriptions: Arc::new(Mutex::new(HashMap::new())),
            amf_registrations: Arc::new(Mutex::new(HashMap::new())),
            auth_events: Arc::new(Mutex::new(HashMap::new())),
        };

        state.seed_subscribers();
        state
    }

    fn seed_subscribers(&self) {
        let mut am_data = self.am_data.lock();
        let mut sm_data = self.sm_data.lock();
        let mut auth_subscriptions = self.auth_subscriptions.lock();

        for supi in SEEDED_SUPIS {
            let msisdn = supi.split('-').next_back().unwrap_or_default();

            am_data.insert(
                supi.to_owned(),
                json!({
                    "gpsis": [format!("msisdn-{msisdn}")],
                    "subscribedUeAmbr": { "uplink": "1 Gbps", "downlink": "2 Gbps" },
                    "nssai": {
                        "defaultSingleNssais": [{ "sst": 1, "sd": "010203" }],
                        "singleNssais": [
                            { "sst": 1, "sd": "010203" },
                            { "sst": 2, "sd": "020304" }
                        ]
                    },
                    "ratRestrictions": [],
                    "ueUsageType": 1,
                    "rfspIndex": 1
                }),
            );

            sm_data.insert(
                supi.to_owned(),
                json!({
                    "singleNssai": { "sst": 1, "sd": "010203" },
                    "dnnConfigurations": {
                        "internet": {
                            "pduSessionTypes": {
                                "defaultSessionType": "IPV4",
                                "allowedSessionTypes": ["IPV4", "IPV6", "IPV4V6"]
                            },
                            "sscModes": {
                                "defaultSscMode": "SSC_MODE_1",
                                "allowedSscModes": ["SSC_MODE_1", "SSC_MODE_2"]
                            },
                            "5gQosProfile": {
                                "5qi": 9,
                                "arp": {
                                    "priorityLevel": 8,
                                    "preemptCap": "NOT_PREEMPT",
                                    "preemptVuln": "NOT_PREEMPTABLE"
                                },
                                "priorityLevel": 8
                            },
                            "sessionAmbr": { "uplink": "1 Gbps", "downlink": "2 Gbps" }
                        }
                    }
                }),
            );

            let mut permanent_key = [0u8; 16];
            rand::thread_rng().fill_bytes(&mut permanent_key);

            auth_subscriptions.insert(
                supi.to_owned(),
                AuthSubscription {
                    authentication_method: "5G_AKA".to_owned(),
                    enc_permanent_key: hex::encode(permanent_key),
                    sequence_number: "000000000001".to_owned(),
                    authentication_management_field: "8000".to_owned(),
                    algorithm_id: "milenage".to_owned(),
                },
            );
        }
    }

    /// Derive a 5G-AKA vector by hashing `(K ‖ RAND ‖ tag)`; stands in for
    /// Milenage, which is out of scope.
    pub fn generate_auth_vector(&self, supi: &str, serving_network_name: &str) -> Option<AuthVector> {
        let k = self.auth_subscriptions.lock().get(supi)?.enc_permanent_key.clone();

        let mut rand_bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut rand_bytes);
        let rand = hex::encode(rand_bytes);

        let xres = hex::encode(Sha256::digest(format!("{k}{rand}XRES")))[..16].to_owned();
        let autn = hex::encode(Sha256::digest(format!("{k}{rand}AUTN")))[..32].to_owned();
        let kausf = hex::encode(Sha256::digest(format!("{k}{rand}{serving_network_name}")));

        Some(AuthVector { rand, xres, autn, kausf })
    }
}

impl Default for UdmState {
    fn default() -> Self {
        Self::new()
    }
}

pub async fn run() -> anyhow::Result<()> {
    let conf = Conf::for_port(config::UDM_PORT)?;
    let _logger_guard = sba_log::init(&conf.log_filter)?;

    let state = UdmState::new();
    info!(nf.instance_id = %state.instance_id, "UDM starting");

    let sbi = Arc::new(Sbi::new(conf.nrf_url.clone(), NfType::Udm));
    let mut profile = NfProfile::for_service(
        state.instance_id,
        NfType::Udm,
        "nudm-uecm",
        "127.0.0.1",
        conf.bind_addr.port(),
    );

    // One endpoint, three SBI services.
    if let Some(services) = profile.nf_services.as_mut() {
        let uecm = services[0].clone();
        for name in ["nudm-sdm", "nudm-ueau"] {
            let mut service = uecm.clone();
            service.service_instance_id = format!("{name}-001");
            service.service_name = name.to_owned();
            services.push(service);
        }
    }

    let router = api::make_router(state);

    service::serve(
        "sba-udm",
        conf.bind_addr,
        router,
        TaskSet::new(),
        Some(Registration { sbi, profile }),
    )
    .await
}
