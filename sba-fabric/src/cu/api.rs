use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use time::OffsetDateTime;

use super::{CuState, CuUeContext, rrc};
use crate::f1ap::{Criticality, F1apPdu, procedure};
use crate::http::HttpError;

pub fn make_router(state: CuState) -> Router {
    Router::new()
        .route("/f1ap/f1-setup-request", post(f1_setup_request))
        .route("/f1ap/initial-ul-rrc-message", post(initial_ul_rrc_message))
        .route("/f1ap/dl-rrc-message-transfer", post(dl_rrc_message_transfer))
        .route("/f1ap/ue-context-setup-response", post(ue_context_setup_response))
        .route("/rrc/create-setup", post(create_rrc_setup))
        .route("/cu/status", get(status))
        .route("/cu/ue-contexts", get(ue_contexts))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// TS 38.463 § 9.2.1.1: construct the F1 Setup Request for the DU.
async fn f1_setup_request(State(_state): State<CuState>) -> Json<Value> {
    let envelope = F1apPdu::initiating(
        procedure::F1_SETUP,
        Criticality::Reject,
        json!({
            "gNB-DU-ID": 1,
            "gNB-DU-Name": "DU-001",
            "ServedCellsToActivateList": [{
                "servedCellInformation": {
                    "nrCgi": {
                        "plmnIdentity": { "mcc": "001", "mnc": "01" },
                        "nrCellIdentity": format!("{}{}", "0".repeat(28), "00000001")
                    },
                    "nrPci": 1,
                    "fiveGsTac": "000001",
                    "servedPlmns": [{ "plmnIdentity": { "mcc": "001", "mnc": "01" } }],
                    "nrMode": "FDD"
                },
                "gnbDuSystemInformation": {
                    "mibMessage": "mib-contents-placeholder",
                    "sib1Message": "sib1-contents-placeholder"
                }
            }],
            "gNB-DU-RRC-Version": {
                "latestRRCVersionEnhanced": super::RRC_VERSION
            }
        }),
    );

    info!("F1 Setup Request created");

    Json(json!({
        "status": "SUCCESS",
        "message": "F1 Setup Request sent to DU",
        "f1apPdu": envelope,
    }))
}

/// TS 38.463 § 9.2.3.3: a UE appeared at the DU; allocate the CU-side F1AP
/// id, answer with an RRCSetup inside a DL RRC Message Transfer.
async fn initial_ul_rrc_message(
    State(state): State<CuState>,
    Json(envelope): Json<F1apPdu>,
) -> Result<Json<F1apPdu>, HttpError> {
    let gnb_du_ue_f1ap_id = envelope
        .ie_u64("gNB-DU-UE-F1AP-ID")
        .ok_or_else(|| HttpError::bad_request().msg("gNB-DU-UE-F1AP-ID is mandatory"))?;
    let c_rnti = envelope.ie_u64("C-RNTI");

    let gnb_cu_ue_f1ap_id = state.next_cu_ue_f1ap_id();

    state.ue_contexts.lock().insert(
        gnb_cu_ue_f1ap_id,
        CuUeContext {
            gnb_cu_ue_f1ap_id,
            gnb_du_ue_f1ap_id: Some(gnb_du_ue_f1ap_id),
            c_rnti,
            rrc_state: "CONNECTED".to_owned(),
            last_activity: OffsetDateTime::now_utc(),
        },
    );

    let rrc_setup = rrc::rrc_setup(1, gnb_du_ue_f1ap_id);

    info!(gnb_cu_ue_f1ap_id, gnb_du_ue_f1ap_id, "RRCSetup issued");

    Ok(Json(F1apPdu::initiating(
        procedure::DL_RRC_MESSAGE_TRANSFER,
        Criticality::Ignore,
        json!({
            "gNB-CU-UE-F1AP-ID": gnb_cu_ue_f1ap_id,
            "gNB-DU-UE-F1AP-ID": gnb_du_ue_f1ap_id,
            "SRBS-ToBeSetup-List": [{
                "SRBS-ToBeSetup-Item": {
                    "SRB-ID": 1,
                    "duplicationActivation": "active"
                }
            }],
            "RRCContainer": rrc_setup.to_string()
        }),
    )))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DlRrcMessageData {
    gnb_cu_ue_f1ap_id: u64,
    rrc_container: String,
}

/// TS 38.463 § 9.2.3.4: CU → DU RRC container relay.
async fn dl_rrc_message_transfer(
    State(state): State<CuState>,
    Json(data): Json<DlRrcMessageData>,
) -> Result<Json<Value>, HttpError> {
    let gnb_du_ue_f1ap_id = {
        let contexts = state.ue_contexts.lock();
        contexts
            .get(&data.gnb_cu_ue_f1ap_id)
            .ok_or_else(|| HttpError::not_found().msg("UE context not found"))?
            .gnb_du_ue_f1ap_id
    };

    let envelope = F1apPdu::initiating(
        procedure::DL_RRC_MESSAGE_TRANSFER,
        Criticality::Ignore,
        json!({
            "gNB-CU-UE-F1AP-ID": data.gnb_cu_ue_f1ap_id,
            "gNB-DU-UE-F1AP-ID": gnb_du_ue_f1ap_id,
            "RRCContainer": data.rrc_container
        }),
    );

    info!(gnb_cu_ue_f1ap_id = data.gnb_cu_ue_f1ap_id, "DL RRC message relayed");

    Ok(Json(json!({
        "status": "SUCCESS",
        "message": "DL RRC Message sent to DU",
        "f1apPdu": envelope,
    })))
}

/// Bind the DU-side id once the DU confirms the UE context.
async fn ue_context_setup_response(
    State(state): State<CuState>,
    Json(envelope): Json<F1apPdu>,
) -> Result<Json<Value>, HttpError> {
    if envelope.successful_outcome.is_none() {
        return Err(HttpError::bad_request().msg("expected a successfulOutcome envelope"));
    }

    let gnb_cu_ue_f1ap_id = envelope
        .ie_u64("gNB-CU-UE-F1AP-ID")
        .ok_or_else(|| HttpError::bad_request().msg("gNB-CU-UE-F1AP-ID is mandatory"))?;
    let gnb_du_ue_f1ap_id = envelope.ie_u64("gNB-DU-UE-F1AP-ID");

    let mut contexts = state.ue_contexts.lock();
    let context = contexts
        .get_mut(&gnb_cu_ue_f1ap_id)
        .ok_or_else(|| HttpError::not_found().msg("UE context not found"))?;

    if context.gnb_du_ue_f1ap_id.is_none() {
        context.gnb_du_ue_f1ap_id = gnb_du_ue_f1ap_id;
    }
    context.rrc_state = "CONNECTED".to_owned();
    context.last_activity = OffsetDateTime::now_utc();

    info!(gnb_cu_ue_f1ap_id, "UE context setup completed");

    Ok(Json(json!({ "status": "SUCCESS", "message": "UE Context Setup Response processed" })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRrcSetupData {
    #[serde(default = "default_transaction_id")]
    rrc_transaction_id: u8,
    gnb_du_ue_f1ap_id: u64,
}

fn default_transaction_id() -> u8 {
    1
}

async fn create_rrc_setup(
    State(_state): State<CuState>,
    Json(data): Json<CreateRrcSetupData>,
) -> Json<Value> {
    let rrc_setup = rrc::rrc_setup(data.rrc_transaction_id, data.gnb_du_ue_f1ap_id);

    Json(json!({
        "status": "SUCCESS",
        "rrcMessage": rrc_setup,
    }))
}

// ----- Health & monitoring -----

async fn status(State(state): State<CuState>) -> Json<Value> {
    Json(json!({
        "status": "operational",
        "connected_ues": state.ue_contexts.lock().len(),
        "rrc_version": super::RRC_VERSION,
    }))
}

async fn ue_contexts(State(state): State<CuState>) -> Json<Value> {
    let contexts = state.ue_contexts.lock();

    let summaries: serde_json::Map<String, Value> = contexts
        .iter()
        .map(|(cu_id, context)| (cu_id.to_string(), json!(context)))
        .collect();

    Json(json!({
        "total_ues": contexts.len(),
        "ue_contexts": summaries,
    }))
}

async fn health(State(state): State<CuState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "gNB-CU",
        "version": env!("CARGO_PKG_VERSION"),
        "active_ues": state.ue_contexts.lock().len(),
    }))
}

async fn metrics(State(state): State<CuState>) -> Json<Value> {
    let contexts = state.ue_contexts.lock();
    let connected = contexts.values().filter(|ctx| ctx.rrc_state == "CONNECTED").count();

    Json(json!({
        "total_ues": contexts.len(),
        "connected_ues": connected,
    }))
}
