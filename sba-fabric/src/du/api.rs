use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{DuState, DuUeContext, phy};
use crate::client::SbiError;
use crate::f1ap::{Criticality, F1apPdu, procedure};
use crate::http::HttpError;
use crate::types::NfType;

pub fn make_router(state: DuState) -> Router {
    Router::new()
        .route("/f1ap/f1-setup-response", post(f1_setup_response))
        .route("/f1ap/initial-ul-rrc-message", post(initial_ul_rrc_message))
        .route("/mac/process-pdu", post(process_mac_pdu))
        .route("/mac/harq-feedback", post(harq_feedback))
        .route("/rlc/process-sdu", post(process_rlc_sdu))
        .route("/pdcp/process-sdu", post(process_pdcp_sdu))
        .route("/phy/process-prach", post(process_prach))
        .route("/du/status", get(status))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
}

// ----- F1AP -----

/// TS 38.463 § 9.2.1.2.
async fn f1_setup_response(State(state): State<DuState>, Json(_request): Json<Value>) -> Json<Value> {
    info!("F1 Setup Response sent to CU");

    Json(json!({
        "status": "SUCCESS",
        "gnb_du_id": 1,
        "gnb_du_name": format!("gNB-DU-{}", state.instance_id.simple()),
        "cells_failed_to_be_activated": [],
        "gnb_du_rrc_version": "16.6.0",
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitialUlRrcData {
    #[serde(default = "default_rrc_container")]
    rrc_container: String,
}

fn default_rrc_container() -> String {
    "rrc-setup-request".to_owned()
}

/// TS 38.463 § 9.2.3.3: a UE did random access; allocate the DU-side id and
/// carry its first RRC message to the CU.
async fn initial_ul_rrc_message(
    State(state): State<DuState>,
    Json(data): Json<InitialUlRrcData>,
) -> Result<Json<Value>, HttpError> {
    let gnb_du_ue_f1ap_id = state.next_du_ue_f1ap_id();
    let c_rnti = 0x1000 + gnb_du_ue_f1ap_id;

    state.ue_contexts.lock().insert(
        gnb_du_ue_f1ap_id,
        DuUeContext {
            gnb_du_ue_f1ap_id,
            c_rnti,
            rrc_state: "IDLE".to_owned(),
            mac_state: "ACTIVE".to_owned(),
        },
    );

    let envelope = F1apPdu::initiating(
        procedure::INITIAL_UL_RRC_MESSAGE_TRANSFER,
        Criticality::Ignore,
        json!({
            "gNB-DU-UE-F1AP-ID": gnb_du_ue_f1ap_id,
            "NRCGI": {
                "plmnIdentity": { "mcc": "001", "mnc": "01" },
                "nrCellIdentity": format!("{}{}", "0".repeat(28), "00000001")
            },
            "C-RNTI": c_rnti,
            "RRCContainer": data.rrc_container
        }),
    );

    let cu_url = state.sbi.peer(NfType::GnbCu).await.map_err(SbiError::into_http)?;

    let dl_rrc_message: F1apPdu = state
        .sbi
        .post_json(&format!("{cu_url}/f1ap/initial-ul-rrc-message"), &envelope)
        .await
        .map_err(SbiError::into_http)?;

    info!(gnb_du_ue_f1ap_id, c_rnti, "Initial UL RRC message sent to CU");

    Ok(Json(json!({
        "status": "SUCCESS",
        "gnb_du_ue_f1ap_id": gnb_du_ue_f1ap_id,
        "c_rnti": c_rnti,
        "dl_rrc_message": dl_rrc_message,
    })))
}

// ----- MAC -----

#[derive(Deserialize)]
struct MacPduData {
    ue_id: u64,
    lcid: u8,
    payload: String,
}

/// MAC SDU ingress: the logical channel picks the RLC entity.
async fn process_mac_pdu(
    State(state): State<DuState>,
    Json(data): Json<MacPduData>,
) -> Result<Json<Value>, HttpError> {
    if !state.ue_contexts.lock().contains_key(&data.ue_id) && !super::SEEDED_UE_IDS.contains(&data.ue_id) {
        return Err(HttpError::not_found().msg("UE context not found"));
    }

    let entity_id = format!("am_{}_{}", data.ue_id, data.lcid);
    let mut rlc_entities = state.rlc_entities.lock();
    let entity = rlc_entities
        .get_mut(&entity_id)
        .ok_or_else(|| HttpError::bad_request().msg("RLC entity not found for logical channel"))?;

    let pdu = entity.transmit(data.payload);

    Ok(Json(json!({
        "status": "SUCCESS",
        "rlc_sn": pdu.sn,
        "poll": pdu.p,
        "message": "MAC PDU processed and forwarded to RLC",
    })))
}

#[derive(Deserialize)]
struct HarqFeedbackData {
    ue_id: u64,
    harq_process: u8,
    ack: bool,
}

async fn harq_feedback(State(state): State<DuState>, Json(data): Json<HarqFeedbackData>) -> Json<Value> {
    let outcome = state.mac.lock().harq_feedback(data.ue_id, data.harq_process, data.ack);

    Json(json!({
        "status": "SUCCESS",
        "ue_id": data.ue_id,
        "harq_process": data.harq_process,
        "outcome": outcome,
    }))
}

// ----- RLC -----

#[derive(Deserialize)]
struct RlcSduData {
    ue_id: u64,
    bearer_id: u8,
    sdu: String,
}

async fn process_rlc_sdu(
    State(state): State<DuState>,
    Json(data): Json<RlcSduData>,
) -> Result<Json<Value>, HttpError> {
    let entity_id = format!("am_{}_{}", data.ue_id, data.bearer_id);

    let mut rlc_entities = state.rlc_entities.lock();
    let entity = rlc_entities
        .get_mut(&entity_id)
        .ok_or_else(|| HttpError::not_found().msg("RLC entity not found"))?;

    let pdu = entity.transmit(data.sdu);

    Ok(Json(json!({
        "status": "SUCCESS",
        "rlc_sn": pdu.sn,
        "poll": pdu.p,
        "message": "RLC SDU processed",
    })))
}

// ----- PDCP -----

#[derive(Deserialize)]
struct PdcpSduData {
    ue_id: u64,
    bearer_id: u8,
    sdu: String,
}

async fn process_pdcp_sdu(
    State(state): State<DuState>,
    Json(data): Json<PdcpSduData>,
) -> Result<Json<Value>, HttpError> {
    let entity_id = format!("pdcp_{}_{}", data.ue_id, data.bearer_id);

    let mut pdcp_entities = state.pdcp_entities.lock();
    let entity = pdcp_entities
        .get_mut(&entity_id)
        .ok_or_else(|| HttpError::not_found().msg("PDCP entity not found"))?;

    let pdu = entity.transmit(&data.sdu);

    Ok(Json(json!({
        "status": "SUCCESS",
        "pdcp_sn": pdu.sn,
        "integrity_tag": pdu.integrity_tag,
        "message": "PDCP SDU processed",
    })))
}

// ----- PHY -----

#[derive(Deserialize)]
struct PrachData {
    #[serde(default)]
    preamble_index: u8,
}

async fn process_prach(State(_state): State<DuState>, Json(data): Json<PrachData>) -> Json<Value> {
    let rar = phy::process_prach(data.preamble_index);

    info!(preamble_index = data.preamble_index, "PRACH processed");

    Json(json!({
        "status": "SUCCESS",
        "random_access_response": rar,
        "message": "PRACH processed",
    }))
}

// ----- Health & monitoring -----

async fn status(State(state): State<DuState>) -> Json<Value> {
    let (current_frame, current_slot) = {
        let phy = state.phy.lock();
        (phy.current_frame, phy.current_slot)
    };

    Json(json!({
        "status": "operational",
        "connected_ues": state.ue_contexts.lock().len(),
        "current_frame": current_frame,
        "current_slot": current_slot,
        "rlc_entities": state.rlc_entities.lock().len(),
        "pdcp_entities": state.pdcp_entities.lock().len(),
        "mac_tti": state.mac.lock().current_tti(),
    }))
}

async fn health(State(state): State<DuState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "gNB-DU",
        "version": env!("CARGO_PKG_VERSION"),
        "active_ues": state.ue_contexts.lock().len(),
    }))
}

async fn metrics(State(state): State<DuState>) -> Json<Value> {
    Json(json!({
        "total_ues": state.ue_contexts.lock().len(),
        "rlc_entities": state.rlc_entities.lock().len(),
        "pdcp_entities": state.pdcp_entities.lock().len(),
        "mac_tti": state.mac.lock().current_tti(),
        "slot_grid_present": state.latest_grid.lock().is_some(),
    }))
}
