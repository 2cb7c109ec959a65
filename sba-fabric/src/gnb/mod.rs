//! gNB (RAN CP): NGAP peer toward the AMF, RAN UE identifier allocation,
//! handover target behaviour.

pub mod api;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use sba_task::{NfTask, Shutdown, TaskSet};
use serde::Serialize;
use serde_json::{Value, json};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::client::Sbi;
use crate::config::{self, Conf};
use crate::ngap::{Criticality, NgapPdu, procedure};
use crate::service::{self, Registration};
use crate::types::{NfProfile, NfType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UeState {
    Idle,
    Connected,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RanUeContext {
    pub ran_ue_ngap_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amf_ue_ngap_id: Option<u64>,
    pub ue_state: UeState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_context: Option<Value>,
    /// PDU session id → state.
    pub pdu_sessions: BTreeMap<u8, String>,
    pub cell_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub last_activity: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellContext {
    pub nr_cgi: Value,
    pub cell_state: String,
    pub connected_ues: Vec<u64>,
    pub load: u8,
}

#[derive(Clone)]
pub struct GnbState {
    pub instance_id: Uuid,
    pub sbi: Arc<Sbi>,
    pub ue_contexts: Arc<Mutex<HashMap<u64, RanUeContext>>>,
    pub cells: Arc<Mutex<BTreeMap<String, CellContext>>>,
    pub ran_ue_ngap_id_counter: Arc<AtomicU64>,
    pub amf_connected: Arc<AtomicBool>,
    pub heartbeat_failures: Arc<AtomicU32>,
}

pub const DEFAULT_CELL_ID: &str = "000000001";

impl GnbState {
    pub fn new(sbi: Arc<Sbi>) -> Self {
        let state = GnbState {
            instance_id: Uuid::new_v4(),
            sbi,
            ue_contexts: Arc::new(Mutex::new(HashMap::new())),
            cells: Arc::new(Mutex::new(BTreeMap::new())),
            ran_ue_ngap_id_counter: Arc::new(AtomicU64::new(1)),
            amf_connected: Arc::new(AtomicBool::new(false)),
            heartbeat_failures: Arc::new(AtomicU32::new(0)),
        };

        state.cells.lock().insert(
            DEFAULT_CELL_ID.to_owned(),
            CellContext {
                nr_cgi: nr_cgi(),
                cell_state: "ACTIVE".to_owned(),
                connected_ues: Vec::new(),
                load: 0,
            },
        );

        state
    }

    pub fn next_ran_ue_ngap_id(&self) -> u64 {
        self.ran_ue_ngap_id_counter.fetch_add(1, Ordering::Relaxed)
    }

    pub fn new_ue_context(&self) -> u64 {
        let ran_ue_ngap_id = self.next_ran_ue_ngap_id();

        self.ue_contexts.lock().insert(
            ran_ue_ngap_id,
            RanUeContext {
                ran_ue_ngap_id,
                amf_ue_ngap_id: None,
                ue_state: UeState::Idle,
                security_context: None,
                pdu_sessions: BTreeMap::new(),
                cell_id: DEFAULT_CELL_ID.to_owned(),
                last_activity: OffsetDateTime::now_utc(),
            },
        );

        ran_ue_ngap_id
    }

    /// TS 38.413 § 9.2.3.1.
    pub fn create_initial_ue_message(&self, ran_ue_ngap_id: u64, nas_pdu: &str) -> NgapPdu {
        NgapPdu::initiating(
            procedure::INITIAL_UE_MESSAGE,
            Criticality::Ignore,
            json!({
                "RAN-UE-NGAP-ID": ran_ue_ngap_id,
                "NAS-PDU": nas_pdu,
                "UserLocationInformation": {
                    "userLocationInformationNR": {
                        "nR-CGI": nr_cgi(),
                        "tAI": {
                            "pLMNIdentity": { "mcc": "001", "mnc": "01" },
                            "tAC": "000001"
                        }
                    }
                },
                "RRCEstablishmentCause": "mo-Data",
                "UEContextRequest": "requested"
            }),
        )
    }

    /// TS 38.413 § 9.2.6.1.
    pub fn create_ng_setup_request(&self) -> NgapPdu {
        NgapPdu::initiating(
            procedure::NG_SETUP,
            Criticality::Reject,
            json!({
                "GlobalRANNodeID": {
                    "globalGNB-ID": {
                        "pLMNIdentity": { "mcc": "001", "mnc": "01" },
                        "gNB-ID": { "gNB-ID": "000001" }
                    }
                },
                "RANNodeName": "gNB-001",
                "SupportedTAList": [{
                    "tac": "000001",
                    "broadcastPlmnList": [{ "mcc": "001", "mnc": "01" }]
                }],
                "DefaultPagingDRX": "v128",
                "UERetentionInformation": "ues-retained"
            }),
        )
    }

    /// TS 38.413 § 9.2.3.4.
    pub fn create_uplink_nas_transport(&self, ran_ue_ngap_id: u64, amf_ue_ngap_id: u64, nas_pdu: &str) -> NgapPdu {
        NgapPdu::initiating(
            procedure::UPLINK_NAS_TRANSPORT,
            Criticality::Ignore,
            json!({
                "AMF-UE-NGAP-ID": amf_ue_ngap_id,
                "RAN-UE-NGAP-ID": ran_ue_ngap_id,
                "NAS-PDU": nas_pdu,
                "UserLocationInformation": {
                    "userLocationInformationNR": {
                        "nR-CGI": nr_cgi(),
                        "tAI": {
                            "pLMNIdentity": { "mcc": "001", "mnc": "01" },
                            "tAC": "000001"
                        }
                    }
                }
            }),
        )
    }
}

fn nr_cgi() -> Value {
    json!({
        "plmnIdentity": { "mcc": "001", "mnc": "01" },
        // 36-bit NR cell identity.
        "nrCellIdentity": format!("{}{}", "0".repeat(28), "00000001")
    })
}

/// NG Setup toward the AMF, retried until it goes through.
pub struct NgSetupTask {
    pub state: GnbState,
}

impl NfTask for NgSetupTask {
    const NAME: &'static str = "ng setup";

    async fn run(self, mut shutdown: Shutdown) -> anyhow::Result<()> {
        const RETRY_DELAY: Duration = Duration::from_secs(2);
        const MAX_ATTEMPTS: u32 = 30;

        for _ in 0..MAX_ATTEMPTS {
            match try_ng_setup(&self.state).await {
                Ok(()) => {
                    self.state.amf_connected.store(true, Ordering::Relaxed);
                    info!("NG Setup successful with AMF");
                    return Ok(());
                }
                Err(error) => {
                    debug!(%error, "NG Setup attempt failed");
                }
            }

            tokio::select! {
                () = tokio::time::sleep(RETRY_DELAY) => {}
                () = shutdown.requested() => return Ok(()),
            }
        }

        warn!("NG Setup never succeeded; continuing without an AMF association");
        Ok(())
    }
}

async fn try_ng_setup(state: &GnbState) -> Result<(), crate::client::SbiError> {
    let amf_url = state.sbi.peer(NfType::Amf).await?;
    let request = state.create_ng_setup_request();

    let _response: NgapPdu = state
        .sbi
        .post_json(&format!("{amf_url}/ngap/ng-setup"), &request)
        .await?;

    Ok(())
}

/// 60 s AMF heartbeat; two consecutive failures clear the association flag.
pub struct AmfHeartbeatTask {
    pub state: GnbState,
}

impl NfTask for AmfHeartbeatTask {
    const NAME: &'static str = "amf heartbeat";

    async fn run(self, mut shutdown: Shutdown) -> anyhow::Result<()> {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let probe = async {
                        let amf_url = self.state.sbi.peer(NfType::Amf).await?;
                        self.state.sbi.probe(&format!("{amf_url}/health")).await
                    };

                    match probe.await {
                        Ok(()) => {
                            self.state.heartbeat_failures.store(0, Ordering::Relaxed);
                            self.state.amf_connected.store(true, Ordering::Relaxed);
                            trace!("AMF heartbeat ok");
                        }
                        Err(error) => {
                            let failures = self.state.heartbeat_failures.fetch_add(1, Ordering::Relaxed) + 1;
                            warn!(%error, failures, "AMF heartbeat failed");

                            if failures >= 2 {
                                self.state.amf_connected.store(false, Ordering::Relaxed);
                            }
                        }
                    }
                }
                () = shutdown.requested() => break,
            }
        }

        Ok(())
    }
}

pub async fn run() -> anyhow::Result<()> {
    let conf = Conf::for_port(config::GNB_PORT)?;
    let _logger_guard = sba_log::init(&conf.log_filter)?;

    let sbi = Arc::new(Sbi::new(conf.nrf_url.clone(), NfType::Gnb));
    let state = GnbState::new(Arc::clone(&sbi));
    info!(nf.instance_id = %state.instance_id, "gNB starting");

    let profile = NfProfile::for_service(
        state.instance_id,
        NfType::Gnb,
        "ngnodeb-service",
        "127.0.0.1",
        conf.bind_addr.port(),
    );

    let mut tasks = TaskSet::new();
    tasks.spawn(NgSetupTask { state: state.clone() });
    tasks.spawn(AmfHeartbeatTask { state: state.clone() });

    let router = api::make_router(state);

    service::serve(
        "sba-gnb",
        conf.bind_addr,
        router,
        tasks,
        Some(Registration { sbi, profile }),
    )
    .await
}
