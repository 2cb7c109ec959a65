//! Registry (NRF): NF profile store, discovery and bearer-token issuer.
//!
//! Single source of truth for NF addressability. Management and discovery
//! are token-gated; token issuance itself is not (bootstrap), and neither is
//! the legacy surface kept for old clients.

pub mod api;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use parking_lot::Mutex;
use sba_task::TaskSet;
use uuid::Uuid;

use crate::config::{self, Conf};
use crate::service;
use crate::token::TokenSigner;
use crate::types::{NfProfile, SubscriptionData};

#[derive(Clone)]
pub struct NrfState {
    pub instance_id: Uuid,
    pub signer: Arc<TokenSigner>,
    pub profiles: Arc<Mutex<HashMap<Uuid, NfProfile>>>,
    pub subscriptions: Arc<Mutex<HashMap<Uuid, SubscriptionData>>>,
    pub issued_tokens: Arc<AtomicU64>,
}

impl NrfState {
    pub fn new() -> Self {
        let instance_id = Uuid::new_v4();

        NrfState {
            instance_id,
            signer: Arc::new(TokenSigner::new(instance_id)),
            profiles: Arc::new(Mutex::new(HashMap::new())),
            subscriptions: Arc::new(Mutex::new(HashMap::new())),
            issued_tokens: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl Default for NrfState {
    fn default() -> Self {
        Self::new()
    }
}

pub async fn run() -> anyhow::Result<()> {
    let conf = Conf::for_port(config::NRF_PORT)?;
    let _logger_guard = sba_log::init(&conf.log_filter)?;

    let state = NrfState::new();
    info!(nf.instance_id = %state.instance_id, "NRF starting");

    let router = api::make_router(state);

    service::serve("sba-nrf", conf.bind_addr, router, TaskSet::new(), None).await
}
