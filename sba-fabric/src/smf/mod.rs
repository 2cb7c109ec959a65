//! Session management (SMF): PDU-session lifecycle, UE IP assignment and
//! N4 signalling toward the UPF.

pub mod api;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use sba_task::TaskSet;
use uuid::Uuid;

use crate::client::Sbi;
use crate::config::{self, Conf};
use crate::service::{self, Registration};
use crate::types::{NfProfile, NfType, Snssai};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Establishing,
    Active,
    Modifying,
    Releasing,
    Released,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub supi: String,
    pub pdu_session_id: u8,
    pub dnn: String,
    pub s_nssai: Snssai,
    pub an_type: String,
    pub pdu_session_type: String,
    pub ssc_mode: String,
    pub ue_ip_address: String,
    pub session_state: SessionState,
    pub smf_seid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upf_seid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n3_endpoint: Option<String>,
}

impl SessionContext {
    /// `"{supi}:{pduSessionId}"`, the canonical session key.
    pub fn key(&self) -> String {
        format!("{}:{}", self.supi, self.pdu_session_id)
    }
}

#[derive(Clone)]
pub struct SmfState {
    pub instance_id: Uuid,
    pub sbi: Arc<Sbi>,
    pub sessions: Arc<Mutex<HashMap<String, SessionContext>>>,
}

impl SmfState {
    pub fn new(sbi: Arc<Sbi>) -> Self {
        SmfState {
            instance_id: Uuid::new_v4(),
            sbi,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

/// Deterministic UE IPv4: `10.<(id % 254) + 1>.0.1`.
pub fn allocate_ue_ip(pdu_session_id: u8) -> String {
    format!("10.{}.0.1", (u32::from(pdu_session_id) % 254) + 1)
}

pub async fn run() -> anyhow::Result<()> {
    let conf = Conf::for_port(config::SMF_PORT)?;
    let _logger_guard = sba_log::init(&conf.log_filter)?;

    let sbi = Arc::new(Sbi::new(conf.nrf_url.clone(), NfType::Smf));
    let state = SmfState::new(Arc::clone(&sbi));
    info!(nf.instance_id = %state.instance_id, "SMF starting");

    let profile = NfProfile::for_service(
        state.instance_id,
        NfType::Smf,
        "nsmf-pdusession",
        "127.0.0.1",
        conf.bind_addr.port(),
    );

    let router = api::make_router(state);

    service::serve(
        "sba-smf",
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
    fn ue_ip_is_deterministic_in_session_id() {
        assert_eq!(allocate_ue_ip(1), "10.2.0.1");
        assert_eq!(allocate_ue_ip(2), "10.3.0.1");
        assert_eq!(allocate_ue_ip(1), "10.2.0.1");
    }
}
