use std::sync::atomic::Ordering;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use time::OffsetDateTime;

use super::{GnbState, UeState};
use crate::client::SbiError;
use crate::http::HttpError;
use crate::ngap::{Criticality, NgapPdu, procedure};
use crate::types::NfType;

pub fn make_router(state: GnbState) -> Router {
    Router::new()
        .route("/ngap/initial-ue-message", post(initial_ue_message))
        .route("/ngap/downlink-nas-transport", post(downlink_nas_transport))
        .route("/ngap/ue-context-setup-request", post(ue_context_setup_request))
        .route(
            "/ngap/pdu-session-resource-setup-request",
            post(pdu_session_resource_setup_request),
        )
        .route("/ngap/handover-request", post(handover_request))
        .route("/ngap/uplink-nas-transport", post(uplink_nas_transport))
        // Legacy path kept for old clients.
        .route("/initial_ue_message", post(initial_ue_message))
        .route("/gnb/status", get(status))
        .route("/gnb/ue-contexts", get(ue_contexts))
        .route("/gnb/cell-contexts", get(cell_contexts))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
}

#[derive(Deserialize)]
struct InitialUeMessageData {
    #[serde(default = "default_nas_pdu")]
    nas_pdu: String,
}

fn default_nas_pdu() -> String {
    "default-nas-message".to_owned()
}

/// TS 38.413 § 9.2.3.1: allocate a RAN-UE-NGAP-ID and carry the NAS PDU to
/// the AMF inside an Initial UE Message.
async fn initial_ue_message(
    State(state): State<GnbState>,
    Json(data): Json<InitialUeMessageData>,
) -> Result<Json<Value>, HttpError> {
    let ran_ue_ngap_id = state.new_ue_context();

    let envelope = state.create_initial_ue_message(ran_ue_ngap_id, &data.nas_pdu);

    let amf_url = state.sbi.peer(NfType::Amf).await.map_err(SbiError::into_http)?;

    let amf_response: Value = state
        .sbi
        .post_json(&format!("{amf_url}/ngap/initial-ue-message"), &envelope)
        .await
        .map_err(SbiError::into_http)?;

    let amf_ue_ngap_id = amf_response.get("amfUeNgapId").and_then(Value::as_u64);
    if let Some(amf_id) = amf_ue_ngap_id {
        if let Some(context) = state.ue_contexts.lock().get_mut(&ran_ue_ngap_id) {
            context.amf_ue_ngap_id = Some(amf_id);
        }
    }

    info!(ran_ue_ngap_id, ?amf_ue_ngap_id, "Initial UE message sent to AMF");

    Ok(Json(json!({
        "status": "SUCCESS",
        "ranUeNgapId": ran_ue_ngap_id,
        "amfUeNgapId": amf_ue_ngap_id,
        "message": "Initial UE Message sent to AMF",
    })))
}

/// TS 38.413 § 9.2.3.3: AMF → gNB NAS delivery.
async fn downlink_nas_transport(
    State(state): State<GnbState>,
    Json(envelope): Json<NgapPdu>,
) -> Result<Json<Value>, HttpError> {
    let ran_ue_ngap_id = envelope
        .ie_u64("RAN-UE-NGAP-ID")
        .ok_or_else(|| HttpError::bad_request().msg("RAN-UE-NGAP-ID is mandatory"))?;
    let amf_ue_ngap_id = envelope.ie_u64("AMF-UE-NGAP-ID");
    let nas_pdu = envelope.ie_str("NAS-PDU").unwrap_or_default();

    let mut contexts = state.ue_contexts.lock();
    let context = contexts
        .get_mut(&ran_ue_ngap_id)
        .ok_or_else(|| HttpError::not_found().msg("UE context not found"))?;

    if context.amf_ue_ngap_id.is_none() {
        context.amf_ue_ngap_id = amf_ue_ngap_id;
    }
    context.last_activity = OffsetDateTime::now_utc();

    info!(ran_ue_ngap_id, nas_pdu, "NAS PDU delivered to UE");

    Ok(Json(json!({ "status": "SUCCESS", "message": "NAS message delivered to UE" })))
}

/// TS 38.413 § 9.2.2.1. An unknown RAN-UE-NGAP-ID yields an unsuccessful
/// outcome over HTTP 200: the failure is protocol-level.
async fn ue_context_setup_request(
    State(state): State<GnbState>,
    Json(envelope): Json<NgapPdu>,
) -> Result<Json<NgapPdu>, HttpError> {
    let amf_ue_ngap_id = envelope.ie_u64("AMF-UE-NGAP-ID");
    let Some(ran_ue_ngap_id) = envelope.ie_u64("RAN-UE-NGAP-ID") else {
        return Err(HttpError::bad_request().msg("RAN-UE-NGAP-ID is mandatory"));
    };

    let mut contexts = state.ue_contexts.lock();

    let Some(context) = contexts.get_mut(&ran_ue_ngap_id) else {
        return Ok(Json(NgapPdu::unsuccessful(
            procedure::UE_CONTEXT_SETUP,
            Criticality::Reject,
            json!({
                "AMF-UE-NGAP-ID": amf_ue_ngap_id,
                "RAN-UE-NGAP-ID": ran_ue_ngap_id,
                "Cause": { "radioNetwork": "Unknown-local-UE-NGAP-ID" }
            }),
        )));
    };

    context.amf_ue_ngap_id = amf_ue_ngap_id.or(context.amf_ue_ngap_id);
    context.security_context = Some(json!({
        "securityKey": envelope.ie_str("SecurityKey"),
        "ueSecurityCapabilities": envelope.protocol_ies().and_then(|ies| ies.get("UESecurityCapabilities")),
    }));
    context.ue_state = UeState::Connected;
    context.last_activity = OffsetDateTime::now_utc();

    if let Some(cell) = state.cells.lock().get_mut(&context.cell_id) {
        if !cell.connected_ues.contains(&ran_ue_ngap_id) {
            cell.connected_ues.push(ran_ue_ngap_id);
        }
    }

    info!(ran_ue_ngap_id, "UE context setup complete");

    Ok(Json(NgapPdu::successful(
        procedure::UE_CONTEXT_SETUP,
        Criticality::Reject,
        json!({
            "AMF-UE-NGAP-ID": amf_ue_ngap_id,
            "RAN-UE-NGAP-ID": ran_ue_ngap_id
        }),
    )))
}

/// TS 38.413 § 9.2.1.1: record each PDU session as ACTIVE radio resources.
async fn pdu_session_resource_setup_request(
    State(state): State<GnbState>,
    Json(envelope): Json<NgapPdu>,
) -> Result<Json<NgapPdu>, HttpError> {
    let amf_ue_ngap_id = envelope.ie_u64("AMF-UE-NGAP-ID");
    let Some(ran_ue_ngap_id) = envelope.ie_u64("RAN-UE-NGAP-ID") else {
        return Err(HttpError::bad_request().msg("RAN-UE-NGAP-ID is mandatory"));
    };

    let setup_items: Vec<Value> = envelope
        .protocol_ies()
        .and_then(|ies| ies.get("PDUSessionResourceSetupListSUReq"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut contexts = state.ue_contexts.lock();

    let Some(context) = contexts.get_mut(&ran_ue_ngap_id) else {
        return Ok(Json(NgapPdu::successful(
            procedure::PDU_SESSION_RESOURCE_SETUP,
            Criticality::Reject,
            json!({
                "AMF-UE-NGAP-ID": amf_ue_ngap_id,
                "RAN-UE-NGAP-ID": ran_ue_ngap_id,
                "PDUSessionResourceFailedToSetupListSURes": setup_items
                    .iter()
                    .map(|item| json!({
                        "pduSessionID": item.get("pduSessionID"),
                        "cause": { "radioNetwork": "unknown-local-UE-NGAP-ID" }
                    }))
                    .collect::<Vec<_>>()
            }),
        )));
    };

    let mut setup_response_list = Vec::new();
    for item in &setup_items {
        let Some(pdu_session_id) = item.get("pduSessionID").and_then(Value::as_u64) else {
            continue;
        };

        #[allow(clippy::cast_possible_truncation)]
        context
            .pdu_sessions
            .insert(pdu_session_id as u8, "ACTIVE".to_owned());

        setup_response_list.push(json!({
            "pduSessionID": pdu_session_id,
            "pduSessionResourceSetupResponseTransfer": "successful-setup-response"
        }));
    }

    info!(ran_ue_ngap_id, sessions = setup_response_list.len(), "PDU session resources set up");

    Ok(Json(NgapPdu::successful(
        procedure::PDU_SESSION_RESOURCE_SETUP,
        Criticality::Reject,
        json!({
            "AMF-UE-NGAP-ID": amf_ue_ngap_id,
            "RAN-UE-NGAP-ID": ran_ue_ngap_id,
            "PDUSessionResourceSetupListSURes": setup_response_list
        }),
    )))
}

/// TS 38.413 § 9.2.3.x handover resource allocation: this gNB acts as the
/// target and admits the UE with a fresh RAN-UE-NGAP-ID.
async fn handover_request(
    State(state): State<GnbState>,
    Json(envelope): Json<NgapPdu>,
) -> Result<Json<NgapPdu>, HttpError> {
    let Some(amf_ue_ngap_id) = envelope.ie_u64("AMF-UE-NGAP-ID") else {
        return Ok(Json(NgapPdu::unsuccessful(
            procedure::HANDOVER_PREPARATION_FAILURE,
            Criticality::Reject,
            json!({
                "Cause": { "radioNetwork": "handover-target-not-allowed" }
            }),
        )));
    };

    let target_ran_ue_ngap_id = state.new_ue_context();

    {
        let mut contexts = state.ue_contexts.lock();
        if let Some(context) = contexts.get_mut(&target_ran_ue_ngap_id) {
            context.amf_ue_ngap_id = Some(amf_ue_ngap_id);
            context.ue_state = UeState::Connected;
        }
    }

    info!(amf_ue_ngap_id, target_ran_ue_ngap_id, "Handover request admitted");

    Ok(Json(NgapPdu::successful(
        procedure::HANDOVER_REQUEST_ACK,
        Criticality::Reject,
        json!({
            "AMF-UE-NGAP-ID": amf_ue_ngap_id,
            "RAN-UE-NGAP-ID": target_ran_ue_ngap_id,
            "TargetToSource-TransparentContainer": "handover-command-data"
        }),
    )))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UplinkNasData {
    ran_ue_ngap_id: u64,
    nas_pdu: String,
}

/// TS 38.413 § 9.2.3.4: UE → AMF NAS relay.
async fn uplink_nas_transport(
    State(state): State<GnbState>,
    Json(data): Json<UplinkNasData>,
) -> Result<Json<Value>, HttpError> {
    let amf_ue_ngap_id = {
        let contexts = state.ue_contexts.lock();
        contexts
            .get(&data.ran_ue_ngap_id)
            .and_then(|context| context.amf_ue_ngap_id)
            .ok_or_else(|| HttpError::not_found().msg("UE context not found"))?
    };

    let envelope = state.create_uplink_nas_transport(data.ran_ue_ngap_id, amf_ue_ngap_id, &data.nas_pdu);

    let amf_url = state.sbi.peer(NfType::Amf).await.map_err(SbiError::into_http)?;

    let _response: Value = state
        .sbi
        .post_json(&format!("{amf_url}/ngap/uplink-nas-transport"), &envelope)
        .await
        .map_err(SbiError::into_http)?;

    Ok(Json(json!({ "status": "SUCCESS", "message": "Uplink NAS Transport sent to AMF" })))
}

// ----- Health & monitoring -----

async fn status(State(state): State<GnbState>) -> Json<Value> {
    Json(json!({
        "status": "operational",
        "amf_connected": state.amf_connected.load(Ordering::Relaxed),
        "connected_ues": state.ue_contexts.lock().len(),
        "served_cells": state.cells.lock().len(),
        "global_gnb_id": { "plmnIdentity": { "mcc": "001", "mnc": "01" }, "gnbId": "000001" },
    }))
}

async fn ue_contexts(State(state): State<GnbState>) -> Json<Value> {
    let contexts = state.ue_contexts.lock();

    let summaries: serde_json::Map<String, Value> = contexts
        .iter()
        .map(|(ran_id, context)| (ran_id.to_string(), json!(context)))
        .collect();

    Json(json!({
        "total_ues": contexts.len(),
        "ue_contexts": summaries,
    }))
}

async fn cell_contexts(State(state): State<GnbState>) -> Json<Value> {
    let cells = state.cells.lock();

    Json(json!({
        "total_cells": cells.len(),
        "cell_contexts": *cells,
    }))
}

async fn health(State(state): State<GnbState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "gNodeB",
        "version": env!("CARGO_PKG_VERSION"),
        "ng_connection": state.amf_connected.load(Ordering::Relaxed),
        "active_ues": state.ue_contexts.lock().len(),
    }))
}

async fn metrics(State(state): State<GnbState>) -> Json<Value> {
    let contexts = state.ue_contexts.lock();
    let connected = contexts
        .values()
        .filter(|context| context.ue_state == UeState::Connected)
        .count();
    let total_pdu_sessions: usize = contexts.values().map(|context| context.pdu_sessions.len()).sum();

    Json(json!({
        "total_ues": contexts.len(),
        "connected_ues": connected,
        "idle_ues": contexts.len() - connected,
        "total_pdu_sessions": total_pdu_sessions,
        "served_cells": state.cells.lock().len(),
        "ng_connection_status": state.amf_connected.load(Ordering::Relaxed),
    }))
}
