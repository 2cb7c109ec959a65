//! CU (centralized unit): F1AP peer toward the DU and RRC message factory.

pub mod api;
pub mod rrc;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use time::OffsetDateTime;
use sba_task::TaskSet;
use uuid::Uuid;

use crate::client::Sbi;
use crate::config::{self, Conf};
use crate::service::{self, Registration};
use crate::types::{NfProfile, NfType};

pub const RRC_VERSION: &str = "16.6.0";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CuUeContext {
    pub gnb_cu_ue_f1ap_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gnb_du_ue_f1ap_id: Option<u64>,
    #[serde(rename = "cRnti", skip_serializing_if = "Option::is_none")]
    pub c_rnti: Option<u64>,
    pub rrc_state: String,
    #[serde(with = "time::serde::rfc3339")]
    pub last_activity: OffsetDateTime,
}

#[derive(Clone)]
pub struct CuState {
    pub instance_id: Uuid,
    pub ue_contexts: Arc<Mutex<HashMap<u64, CuUeContext>>>,
    pub gnb_cu_ue_f1ap_id_counter: Arc<AtomicU64>,
}

impl CuState {
    pub fn new() -> Self {
        CuState {
            instance_id: Uuid::new_v4(),
            ue_contexts: Arc::new(Mutex::new(HashMap::new())),
            gnb_cu_ue_f1ap_id_counter: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn next_cu_ue_f1ap_id(&self) -> u64 {
        self.gnb_cu_ue_f1ap_id_counter.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for CuState {
    fn default() -> Self {
        Self::new()
    }
}

pub async fn run() -> anyhow::Result<()> {
    let conf = Conf::for_port(config::CU_PORT)?;
    let _logger_guard = sba_log::init(&conf.log_filter)?;

    let state = CuState::new();
    info!(nf.instance_id = %state.instance_id, "CU starting");

    let sbi = Arc::new(Sbi::new(conf.nrf_url.clone(), NfType::GnbCu));
    let profile = NfProfile::for_service(
        state.instance_id,
        NfType::GnbCu,
        "ngnb-cu-service",
        "127.0.0.1",
        conf.bind_addr.port(),
    );

    let router = api::make_router(state);

    service::serve(
        "sba-cu",
        conf.bind_addr,
        router,
        TaskSet::new(),
        Some(Registration { sbi, profile }),
    )
    .await
}
