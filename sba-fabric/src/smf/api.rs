use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{SessionContext, SessionState, SmfState};
use crate::http::HttpError;
use crate::pfcp::{
    self, CreateFar, CreatePdr, CreateQer, ForwardingParameters, Mbr, OuterHeaderCreation, Pdi,
    SessionEstablishmentRequest, SessionEstablishmentResponse, UeIpAddress,
};
use crate::types::{NfType, Snssai};

pub fn make_router(state: SmfState) -> Router {
    Router::new()
        .route("/nsmf-pdusession/v1/sm-contexts", post(create_sm_context))
        .route("/smf/sessions", get(list_sessions))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
}

const MANDATORY_FIELDS: [&str; 5] = ["supi", "pduSessionId", "dnn", "sNssai", "anType"];

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSmContextRequest {
    supi: String,
    pdu_session_id: u8,
    dnn: String,
    s_nssai: Snssai,
    an_type: String,
    #[serde(default = "default_session_type")]
    pdu_session_type: String,
    #[serde(default = "default_ssc_mode")]
    ssc_mode: String,
}

fn default_session_type() -> String {
    "IPV4".to_owned()
}

fn default_ssc_mode() -> String {
    "SSC_MODE_1".to_owned()
}

/// Nsmf_PDUSession Create SM Context (TS 29.502 § 5.2.2.2.1).
async fn create_sm_context(
    State(state): State<SmfState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, HttpError> {
    let missing: Vec<&str> = MANDATORY_FIELDS
        .iter()
        .copied()
        .filter(|field| body.get(field).is_none_or(Value::is_null))
        .collect();
    if !missing.is_empty() {
        warn!(?missing, "Create SM Context rejected");
        return Err(HttpError::bad_request().msg("missing mandatory sm-context fields"));
    }

    let request: CreateSmContextRequest = serde_json::from_value(body)
        .map_err(HttpError::bad_request().with_msg("malformed sm-context payload").err())?;

    info!(
        supi = request.supi,
        pdu_session_id = request.pdu_session_id,
        dnn = request.dnn,
        "Create SM Context request"
    );

    let ue_ip = super::allocate_ue_ip(request.pdu_session_id);
    let smf_seid = format!("smf-seid-{}:{}", request.supi, request.pdu_session_id);

    let mut context = SessionContext {
        supi: request.supi.clone(),
        pdu_session_id: request.pdu_session_id,
        dnn: request.dnn.clone(),
        s_nssai: request.s_nssai.clone(),
        an_type: request.an_type.clone(),
        pdu_session_type: request.pdu_session_type.clone(),
        ssc_mode: request.ssc_mode.clone(),
        ue_ip_address: ue_ip.clone(),
        session_state: SessionState::Establishing,
        smf_seid: smf_seid.clone(),
        upf_seid: None,
        n3_endpoint: None,
    };

    let session_key = context.key();
    state.sessions.lock().insert(session_key.clone(), context.clone());

    let pfcp_response = send_pfcp_establishment(&state, &context).await.map_err(|error| {
        // Leave the half-built context in ESTABLISHING for a later poll to
        // reconcile.
        error!(session = session_key, "PFCP establishment failed");
        error
    })?;

    context.session_state = SessionState::Active;
    context.upf_seid = Some(pfcp_response.up_f_seid.seid.clone());
    context.n3_endpoint = pfcp_response.n3_endpoint.clone();
    state.sessions.lock().insert(session_key.clone(), context);

    info!(session = session_key, ue_ip, "SM context created");

    Ok(Json(json!({
        "status": "CREATED",
        "cause": "PDU_SESSION_ESTABLISHMENT_ACCEPTED",
        "pduSessionId": request.pdu_session_id,
        "ueIpAddress": ue_ip,
        "n2SmInfo": {
            "pduSessionId": request.pdu_session_id,
            "qosFlowSetupRequestList": [{
                "qfi": 9,
                "5qi": 9,
                "priority": 80
            }],
            "n2InfoContent": "base64-encoded-ngap-pdu-session-resource-setup-request"
        },
        "smContext": {
            "contextId": session_key,
            "ueIpAddress": ue_ip
        }
    })))
}

/// N4: PFCP Session Establishment toward the discovered UPF. One uplink PDR
/// anchored on the UE address, one FAR forwarding into the core over GTP-U,
/// one best-effort QER.
async fn send_pfcp_establishment(
    state: &SmfState,
    context: &SessionContext,
) -> Result<SessionEstablishmentResponse, HttpError> {
    let upf_url = state
        .sbi
        .peer(NfType::Upf)
        .await
        .map_err(crate::client::SbiError::into_http)?;

    let pfcp_request = SessionEstablishmentRequest {
        message_type: pfcp::message_type::SESSION_ESTABLISHMENT_REQUEST,
        seid: context.smf_seid.clone(),
        node_id: Some("smf.mnc001.mcc001.3gppnetwork.org".to_owned()),
        pdn_type: Some(context.pdu_session_type.clone()),
        create_pdr: vec![CreatePdr {
            pdr_id: 1,
            precedence: 200,
            pdi: Pdi {
                source_interface: "ACCESS".to_owned(),
                f_teid: None,
                network_instance: Some(context.dnn.clone()),
                ue_ip_address: Some(UeIpAddress {
                    v4: true,
                    v6: false,
                    ipv4_address: Some(context.ue_ip_address.clone()),
                    ipv6_address: None,
                }),
                qfi: Some(9),
            },
            outer_header_removal: None,
            far_id: Some(1),
            qer_id: Some(vec![1]),
            urr_id: None,
        }],
        create_far: vec![CreateFar {
            far_id: 1,
            apply_action: "FORWARD".to_owned(),
            forwarding_parameters: Some(ForwardingParameters {
                destination_interface: "CORE".to_owned(),
                network_instance: Some(context.dnn.clone()),
                outer_header_creation: Some(OuterHeaderCreation {
                    description: "GTP-U/UDP/IPv4".to_owned(),
                    teid: Some("1001".to_owned()),
                    ipv4_address: None,
                    ipv6_address: None,
                    port_number: None,
                }),
            }),
        }],
        create_qer: Some(vec![CreateQer {
            qer_id: 1,
            qfi: Some(9),
            gate_status: None,
            mbr: Some(Mbr {
                ul_mbr: 100_000_000,
                dl_mbr: 100_000_000,
            }),
            gbr: None,
            averaging_window: None,
        }]),
        create_urr: None,
    };

    debug!(smf_seid = context.smf_seid, "Sending PFCP Session Establishment Request");

    state
        .sbi
        .post_json(&format!("{upf_url}/pfcp/v1/sessions"), &pfcp_request)
        .await
        .map_err(crate::client::SbiError::into_http)
}

async fn list_sessions(State(state): State<SmfState>) -> Json<Value> {
    let sessions = state.sessions.lock();

    Json(json!({
        "activeSessions": sessions.len(),
        "sessions": sessions.keys().collect::<Vec<_>>(),
    }))
}

async fn health(State(state): State<SmfState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "SMF",
        "version": env!("CARGO_PKG_VERSION"),
        "active_sessions": state.sessions.lock().len(),
    }))
}

async fn metrics(State(state): State<SmfState>) -> Json<Value> {
    let sessions = state.sessions.lock();
    let active = sessions
        .values()
        .filter(|session| session.session_state == SessionState::Active)
        .count();

    Json(json!({
        "total_sessions": sessions.len(),
        "active_sessions": active,
        "establishing_sessions": sessions.len() - active,
    }))
}
