//! DU (distributed unit): MAC/RLC/PDCP/PHY protocol-stack bookkeeping,
//! the 1 ms slot tick and the F1AP face toward the CU.

pub mod api;
pub mod mac;
pub mod pdcp;
pub mod phy;
pub mod rlc;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use sba_task::{NfTask, Shutdown, TaskSet};
use serde::Serialize;
use uuid::Uuid;

use crate::client::Sbi;
use crate::config::{self, Conf};
use crate::service::{self, Registration};
use crate::types::{NfProfile, NfType};
use mac::MacScheduler;
use pdcp::{BearerKind, PdcpEntity};
use phy::{PhyState, ResourceGrid};
use rlc::RlcAmEntity;

/// UE ids whose protocol entities are pre-created at boot.
pub const SEEDED_UE_IDS: [u64; 4] = [1, 2, 3, 4];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuUeContext {
    pub gnb_du_ue_f1ap_id: u64,
    #[serde(rename = "cRnti")]
    pub c_rnti: u64,
    pub rrc_state: String,
    pub mac_state: String,
}

#[derive(Clone)]
pub struct DuState {
    pub instance_id: Uuid,
    pub sbi: Arc<Sbi>,
    pub ue_contexts: Arc<Mutex<HashMap<u64, DuUeContext>>>,
    /// Keyed `am_{ueId}_{bearerId}`.
    pub rlc_entities: Arc<Mutex<HashMap<String, RlcAmEntity>>>,
    /// Keyed `pdcp_{ueId}_{bearerId}`.
    pub pdcp_entities: Arc<Mutex<HashMap<String, PdcpEntity>>>,
    pub mac: Arc<Mutex<MacScheduler>>,
    pub phy: Arc<Mutex<PhyState>>,
    pub latest_grid: Arc<Mutex<Option<ResourceGrid>>>,
    pub gnb_du_ue_f1ap_id_counter: Arc<AtomicU64>,
}

impl DuState {
    pub fn new(sbi: Arc<Sbi>) -> Self {
        let state = DuState {
            instance_id: Uuid::new_v4(),
            sbi,
            ue_contexts: Arc::new(Mutex::new(HashMap::new())),
            rlc_entities: Arc::new(Mutex::new(HashMap::new())),
            pdcp_entities: Arc::new(Mutex::new(HashMap::new())),
            mac: Arc::new(Mutex::new(MacScheduler::new())),
            phy: Arc::new(Mutex::new(PhyState::new())),
            latest_grid: Arc::new(Mutex::new(None)),
            gnb_du_ue_f1ap_id_counter: Arc::new(AtomicU64::new(1)),
        };

        state.seed_protocol_entities();
        state
    }

    /// SRB1/SRB2 over RLC-AM plus PDCP entities (SRB1, SRB2 and DRB5) for
    /// the initial UE pool.
    fn seed_protocol_entities(&self) {
        let mut rlc = self.rlc_entities.lock();
        let mut pdcp = self.pdcp_entities.lock();

        for ue_id in SEEDED_UE_IDS {
            for srb_id in [1u8, 2] {
                rlc.insert(format!("am_{ue_id}_{srb_id}"), RlcAmEntity::new());
                pdcp.insert(format!("pdcp_{ue_id}_{srb_id}"), PdcpEntity::new(BearerKind::Srb, srb_id));
            }
            pdcp.insert(format!("pdcp_{ue_id}_5"), PdcpEntity::new(BearerKind::Drb, 5));
        }
    }

    pub fn next_du_ue_f1ap_id(&self) -> u64 {
        self.gnb_du_ue_f1ap_id_counter.fetch_add(1, Ordering::Relaxed)
    }
}

/// The 1 ms slot tick: advance PHY, regenerate the (reduced) resource grid
/// and run one MAC scheduling round over the connected UEs.
pub struct SlotTask {
    pub state: DuState,
}

impl NfTask for SlotTask {
    const NAME: &'static str = "du slot tick";

    async fn run(self, mut shutdown: Shutdown) -> anyhow::Result<()> {
        let mut interval = tokio::time::interval(Duration::from_millis(1));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let (frame, slot) = self.state.phy.lock().advance_slot();

                    let grid = self.state.phy.lock().generate_grid(frame, slot);
                    *self.state.latest_grid.lock() = Some(grid);

                    let active_ues: Vec<u64> = {
                        let contexts = self.state.ue_contexts.lock();
                        contexts
                            .values()
                            .filter(|ctx| ctx.mac_state == "ACTIVE")
                            .map(|ctx| ctx.gnb_du_ue_f1ap_id)
                            .collect()
                    };

                    let (_ul, _dl) = self.state.mac.lock().schedule(&active_ues);
                }
                () = shutdown.requested() => break,
            }
        }

        Ok(())
    }
}

pub async fn run() -> anyhow::Result<()> {
    let conf = Conf::for_port(config::DU_PORT)?;
    let _logger_guard = sba_log::init(&conf.log_filter)?;

    let sbi = Arc::new(Sbi::new(conf.nrf_url.clone(), NfType::GnbDu));
    let state = DuState::new(Arc::clone(&sbi));
    info!(nf.instance_id = %state.instance_id, "DU starting");

    let profile = NfProfile::for_service(
        state.instance_id,
        NfType::GnbDu,
        "ngnb-du-service",
        "127.0.0.1",
        conf.bind_addr.port(),
    );

    let mut tasks = TaskSet::new();
    tasks.spawn(SlotTask { state: state.clone() });

    let router = api::make_router(state);

    service::serve(
        "sba-du",
        conf.bind_addr,
        router,
        tasks,
        Some(Registration { sbi, profile }),
    )
    .await
}
