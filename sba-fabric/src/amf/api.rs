use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{AmfState, RegistrationState, SecurityContext, UeContext};
use crate::ausf::AkaVector;
use crate::client::SbiError;
use crate::http::HttpError;
use crate::nas::{self, AuthenticationRequest, NasHeader, PduSessionEstablishmentRequest, RegistrationRequest};
use crate::ngap::{Criticality, NgapPdu, procedure};
use crate::types::{NfType, Snssai, supi_from_suci};

pub fn make_router(state: AmfState) -> Router {
    Router::new()
        .route("/nas/registration-request", post(registration_request))
        .route("/nas/authentication-response", post(authentication_response))
        .route("/nas/security-mode-complete", post(security_mode_complete))
        .route("/nas/deregistration-request", post(deregistration_request))
        .route(
            "/nas/pdu-session-establishment-request",
            post(pdu_session_establishment_request),
        )
        .route("/ngap/ng-setup", post(ng_setup))
        .route("/ngap/initial-ue-message", post(initial_ue_message))
        .route("/ngap/uplink-nas-transport", post(uplink_nas_transport))
        .route("/amf/status", get(status))
        .route("/amf/ue-contexts", get(ue_contexts))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
}

// ----- outbound AUSF / UDM / SMF payloads -----

#[derive(Deserialize)]
struct AusfChallenge {
    #[serde(rename = "authenticationVector")]
    authentication_vector: AkaVector,
    #[serde(rename = "_links")]
    links: Value,
}

#[derive(Deserialize)]
struct AusfConfirmationResult {
    #[serde(rename = "authResult")]
    auth_result: String,
    #[serde(default)]
    kseaf: Option<String>,
}

/// 5G-AKA initiation over N12 (TS 23.502 § 4.2.2.2.4).
async fn initiate_authentication(state: &AmfState, supi: &str) -> Result<AusfChallenge, SbiError> {
    let ausf_url = state.sbi.peer(NfType::Ausf).await?;

    state
        .sbi
        .post_json(
            &format!("{ausf_url}/nausf-auth/v1/ue-authentications"),
            &json!({
                "supiOrSuci": supi,
                "servingNetworkName": super::SERVING_NETWORK_NAME,
                "resynchronizationInfo": null
            }),
        )
        .await
}

/// AMF registration with the UDM over N8 (TS 29.503).
async fn register_with_udm(state: &AmfState, supi: &str) -> bool {
    let udm_url = match state.sbi.peer(NfType::Udm).await {
        Ok(url) => url,
        Err(error) => {
            warn!(%error, supi, "UDM not reachable for AMF registration");
            return false;
        }
    };

    let registration = json!({
        "amfInstanceId": state.instance_id,
        "deregCallbackUri": format!("http://127.0.0.1:9001/namf-comm/v1/ue-contexts/{supi}/dereg-notify"),
        "guami": state.guami,
        "ratType": "NR",
        "plmnId": { "mcc": "001", "mnc": "01" },
        "initialRegistrationInd": true
    });

    let result: Result<Value, SbiError> = state
        .sbi
        .post_json(
            &format!("{udm_url}/nudm-uecm/v1/{supi}/registrations/amf-3gpp-access"),
            &registration,
        )
        .await;

    match result {
        Ok(_) => true,
        Err(error) => {
            warn!(%error, supi, "UDM registration failed");
            false
        }
    }
}

// ----- NAS: registration -----

/// TS 24.501 § 8.2.7.1. Initial and emergency registrations trigger 5G-AKA;
/// if the AUSF cannot be reached the AMF falls back to a direct accept
/// (simulation mode).
async fn registration_request(
    State(state): State<AmfState>,
    Json(request): Json<RegistrationRequest>,
) -> Result<Json<Value>, HttpError> {
    let supi = supi_from_suci(&request.suci);

    info!(supi, suci = request.suci, "Registration request");

    {
        let mut contexts = state.ue_contexts.lock();
        contexts.insert(
            supi.clone(),
            UeContext {
                supi: supi.clone(),
                suci: request.suci.clone(),
                guti: None,
                registration_state: RegistrationState::AuthPending,
                security_context: None,
                requested_nssai: request.requested_nssai.clone(),
                allowed_nssai: Vec::new(),
                ue_security_capability: request.ue_security_capability.clone(),
                pdu_sessions: std::collections::BTreeMap::new(),
                amf_ue_ngap_id: None,
                ran_ue_ngap_id: None,
                pending_auth_ctx: None,
                imeisv: None,
                registration_time: OffsetDateTime::now_utc(),
            },
        );
    }

    // 1 = initial registration, 3 = emergency registration.
    if matches!(request.registration_type, 1 | 3) {
        match initiate_authentication(&state, &supi).await {
            Ok(challenge) => {
                let auth_ctx_id = auth_ctx_id_from_links(&challenge.links);

                if let Some(context) = state.ue_contexts.lock().get_mut(&supi) {
                    context.pending_auth_ctx = auth_ctx_id;
                }

                let nas_message = AuthenticationRequest {
                    header: NasHeader::plain(nas::msg_type::AUTHENTICATION_REQUEST),
                    ngksi: 1,
                    abba: "0000".to_owned(),
                    authentication_parameter_rand: challenge.authentication_vector.rand.clone(),
                    authentication_parameter_autn: challenge.authentication_vector.autn.clone(),
                };

                return Ok(Json(json!({
                    "status": "AUTHENTICATION_REQUIRED",
                    "nas_message": nas_message,
                    "links": challenge.links,
                })));
            }
            Err(error) => {
                info!(%error, supi, "AUSF unreachable, bypassing authentication");
            }
        }
    }

    // Simplified flow: accept immediately.
    let accept = state.create_registration_accept(&supi, request.requested_nssai.as_deref());
    let guti = accept.mobile_identity.clone();

    {
        let mut contexts = state.ue_contexts.lock();
        if let Some(context) = contexts.get_mut(&supi) {
            context.registration_state = RegistrationState::Registered;
            context.guti = Some(guti.clone());
            context.allowed_nssai = accept.allowed_nssai.clone().unwrap_or_default();
            // No AKA ran; a registered context still carries a security
            // context, with the null algorithms and no anchor key.
            context.security_context = Some(SecurityContext {
                kseaf: String::new(),
                selected_algorithms: crate::nas::NasSecurityAlgorithms {
                    type_of_ciphering_algorithm: 0,    // NEA0
                    type_of_integrity_protection_algorithm: 0, // NIA0
                },
                ngksi: 0,
            });
        }
    }

    let udm_registered = register_with_udm(&state, &supi).await;

    info!(supi, guti, "Registration accepted (authentication bypassed)");

    Ok(Json(json!({
        "status": "REGISTRATION_ACCEPT",
        "nas_message": accept,
        "guti": guti,
        "udm_registered": udm_registered,
    })))
}

/// The confirmation URI is the only place the AUSF exposes the context id.
fn auth_ctx_id_from_links(links: &Value) -> Option<Uuid> {
    let href = links.get("5g-aka")?.get("href")?.as_str()?;
    let id = href
        .strip_suffix("/5g-aka-confirmation")?
        .rsplit('/')
        .next()?;
    id.parse().ok()
}

// ----- NAS: authentication response -----

#[derive(Deserialize)]
struct AuthenticationResponseData {
    supi: String,
    #[serde(rename = "authResponse")]
    auth_response: String,
    #[serde(rename = "authContextId")]
    auth_context_id: Uuid,
}

/// TS 24.501 § 8.2.1.3. The AKA verdict is protocol-level: both outcomes
/// are HTTP 200.
async fn authentication_response(
    State(state): State<AmfState>,
    Json(data): Json<AuthenticationResponseData>,
) -> Result<Json<Value>, HttpError> {
    let ue_security_capability = {
        let contexts = state.ue_contexts.lock();
        let context = contexts
            .get(&data.supi)
            .ok_or_else(|| HttpError::not_found().msg("UE context not found"))?;
        context.ue_security_capability.clone()
    };

    let ausf_url = state
        .sbi
        .peer(NfType::Ausf)
        .await
        .map_err(SbiError::into_http)?;

    let confirmation: AusfConfirmationResult = state
        .sbi
        .put_json(
            &format!(
                "{ausf_url}/nausf-auth/v1/ue-authentications/{}/5g-aka-confirmation",
                data.auth_context_id
            ),
            &json!({ "resStar": data.auth_response }),
        )
        .await
        .map_err(SbiError::into_http)?;

    if confirmation.auth_result == "AUTHENTICATION_SUCCESS" {
        let security_mode_command = state.create_security_mode_command(ue_security_capability);

        {
            let mut contexts = state.ue_contexts.lock();
            if let Some(context) = contexts.get_mut(&data.supi) {
                context.registration_state = RegistrationState::SecPending;
                context.security_context = Some(SecurityContext {
                    kseaf: confirmation.kseaf.unwrap_or_default(),
                    selected_algorithms: security_mode_command.selected_nas_security_algorithms,
                    ngksi: security_mode_command.ngksi,
                });
            }
        }

        info!(supi = data.supi, "Authentication succeeded, security mode command issued");

        Ok(Json(json!({
            "status": "AUTHENTICATION_SUCCESS",
            "nas_message": security_mode_command,
        })))
    } else {
        {
            let mut contexts = state.ue_contexts.lock();
            if let Some(context) = contexts.get_mut(&data.supi) {
                context.registration_state = RegistrationState::Deregistered;
                context.security_context = None;
            }
        }

        warn!(supi = data.supi, "Authentication failed");

        Ok(Json(json!({
            "status": "AUTHENTICATION_FAILURE",
            "cause": nas::cause_5gmm::MAC_FAILURE,
        })))
    }
}

// ----- NAS: security mode complete -----

#[derive(Deserialize)]
struct SecurityModeCompleteData {
    supi: String,
    #[serde(default)]
    imeisv: Option<String>,
}

/// TS 24.501 § 8.2.20.3: finalizes the registration.
async fn security_mode_complete(
    State(state): State<AmfState>,
    Json(data): Json<SecurityModeCompleteData>,
) -> Result<Json<Value>, HttpError> {
    let requested_nssai: Option<Vec<Snssai>> = {
        let contexts = state.ue_contexts.lock();
        let context = contexts
            .get(&data.supi)
            .ok_or_else(|| HttpError::not_found().msg("UE context not found"))?;

        if context.registration_state != RegistrationState::SecPending {
            return Err(HttpError::conflict().msg("security mode complete outside SEC_PENDING"));
        }

        context.requested_nssai.clone()
    };

    let accept = state.create_registration_accept(&data.supi, requested_nssai.as_deref());
    let guti = accept.mobile_identity.clone();

    {
        let mut contexts = state.ue_contexts.lock();
        if let Some(context) = contexts.get_mut(&data.supi) {
            context.registration_state = RegistrationState::Registered;
            context.guti = Some(guti.clone());
            context.allowed_nssai = accept.allowed_nssai.clone().unwrap_or_default();
            context.imeisv = data.imeisv.clone();
        }
    }

    let udm_registered = register_with_udm(&state, &data.supi).await;

    info!(supi = data.supi, guti, "Security mode completed, UE registered");

    Ok(Json(json!({
        "status": "REGISTRATION_COMPLETE",
        "nas_message": accept,
        "guti": guti,
        "udm_registered": udm_registered,
    })))
}

// ----- NAS: deregistration -----

#[derive(Deserialize)]
struct DeregistrationData {
    supi: String,
}

async fn deregistration_request(
    State(state): State<AmfState>,
    Json(data): Json<DeregistrationData>,
) -> Result<Json<Value>, HttpError> {
    {
        let mut contexts = state.ue_contexts.lock();
        let context = contexts
            .get_mut(&data.supi)
            .ok_or_else(|| HttpError::not_found().msg("UE context not found"))?;

        context.registration_state = RegistrationState::Deregistered;
        context.guti = None;
        context.security_context = None;
    }

    // Best effort; the UDM treats a missing registration as already gone.
    if let Ok(udm_url) = state.sbi.peer(NfType::Udm).await {
        let url = format!("{udm_url}/nudm-uecm/v1/{}/registrations/amf-3gpp-access", data.supi);
        if let Err(error) = state.sbi.delete(&url).await {
            debug!(%error, "UDM deregistration failed");
        }
    }

    info!(supi = data.supi, "UE deregistered");

    Ok(Json(json!({ "status": "DEREGISTRATION_ACCEPT" })))
}

// ----- NAS: PDU session establishment -----

/// TS 24.501 § 8.3.1.1: delegate to the SMF, record the session reference.
async fn pdu_session_establishment_request(
    State(state): State<AmfState>,
    Json(request): Json<PduSessionEstablishmentRequest>,
) -> Result<Json<Value>, HttpError> {
    {
        let contexts = state.ue_contexts.lock();
        let context = contexts
            .get(&request.supi)
            .ok_or_else(|| HttpError::not_found().msg("UE context not found"))?;

        if context.registration_state != RegistrationState::Registered {
            return Err(HttpError::conflict().msg("UE is not registered"));
        }
    }

    let smf_url = state.sbi.peer(NfType::Smf).await.map_err(SbiError::into_http)?;

    let sm_context_request = json!({
        "supi": request.supi,
        "pduSessionId": request.pdu_session_id,
        "dnn": request.dnn.clone().unwrap_or_else(|| "internet".to_owned()),
        "sNssai": request.s_nssai.clone().unwrap_or_else(Snssai::default_slice),
        "pduSessionType": pdu_session_type_name(request.pdu_session_type),
        "sscMode": format!("SSC_MODE_{}", request.ssc_mode),
        "anType": "3GPP_ACCESS"
    });

    let sm_context: Value = state
        .sbi
        .post_json(&format!("{smf_url}/nsmf-pdusession/v1/sm-contexts"), &sm_context_request)
        .await
        .map_err(SbiError::into_http)?;

    let context_id = sm_context
        .pointer("/smContext/contextId")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();

    {
        let mut contexts = state.ue_contexts.lock();
        if let Some(context) = contexts.get_mut(&request.supi) {
            context.pdu_sessions.insert(request.pdu_session_id, context_id);
        }
    }

    info!(
        supi = request.supi,
        pdu_session_id = request.pdu_session_id,
        "PDU session established"
    );

    Ok(Json(json!({
        "status": "PDU_SESSION_ESTABLISHMENT_ACCEPT",
        "pdu_session_id": request.pdu_session_id,
        "session_context": sm_context,
    })))
}

fn pdu_session_type_name(value: u8) -> &'static str {
    match value {
        2 => "IPV6",
        3 => "IPV4V6",
        _ => "IPV4",
    }
}

// ----- NGAP peer surface -----

async fn ng_setup(State(state): State<AmfState>, Json(_request): Json<NgapPdu>) -> Json<NgapPdu> {
    info!("NG Setup request accepted");

    Json(NgapPdu::successful(
        procedure::NG_SETUP,
        Criticality::Reject,
        json!({
            "AMFName": "sba-amf",
            "ServedGUAMIList": [state.guami],
            "PLMNSupportList": state.plmn_support_list,
            "RelativeAMFCapacity": 255
        }),
    ))
}

async fn initial_ue_message(
    State(state): State<AmfState>,
    Json(request): Json<NgapPdu>,
) -> Result<Json<Value>, HttpError> {
    let ran_ue_ngap_id = request
        .ie_u64("RAN-UE-NGAP-ID")
        .ok_or_else(|| HttpError::bad_request().msg("RAN-UE-NGAP-ID is mandatory"))?;

    let nas_pdu = request.ie_str("NAS-PDU").unwrap_or_default().to_owned();

    let amf_ue_ngap_id = {
        let mut bindings = state.ngap_bindings.lock();
        match bindings.get(&ran_ue_ngap_id) {
            Some(existing) => *existing,
            None => {
                let allocated = state.next_amf_ue_ngap_id();
                bindings.insert(ran_ue_ngap_id, allocated);
                allocated
            }
        }
    };

    info!(ran_ue_ngap_id, amf_ue_ngap_id, nas_pdu, "Initial UE message received");

    Ok(Json(json!({
        "status": "SUCCESS",
        "amfUeNgapId": amf_ue_ngap_id,
        "ranUeNgapId": ran_ue_ngap_id,
    })))
}

async fn uplink_nas_transport(
    State(state): State<AmfState>,
    Json(request): Json<NgapPdu>,
) -> Result<Json<Value>, HttpError> {
    let ran_ue_ngap_id = request
        .ie_u64("RAN-UE-NGAP-ID")
        .ok_or_else(|| HttpError::bad_request().msg("RAN-UE-NGAP-ID is mandatory"))?;

    if !state.ngap_bindings.lock().contains_key(&ran_ue_ngap_id) {
        return Err(HttpError::not_found().msg("no NGAP binding for RAN-UE-NGAP-ID"));
    }

    debug!(ran_ue_ngap_id, nas_pdu = request.ie_str("NAS-PDU").unwrap_or_default(), "Uplink NAS transport");

    Ok(Json(json!({ "status": "SUCCESS" })))
}

// ----- Health & monitoring -----

async fn status(State(state): State<AmfState>) -> Json<Value> {
    let contexts = state.ue_contexts.lock();
    let registered = contexts
        .values()
        .filter(|ctx| ctx.registration_state == RegistrationState::Registered)
        .count();

    Json(json!({
        "status": "operational",
        "registered_ues": registered,
        "total_ue_contexts": contexts.len(),
        "guami": state.guami,
        "served_plmns": state.plmn_support_list,
    }))
}

async fn ue_contexts(State(state): State<AmfState>) -> Json<Value> {
    let contexts = state.ue_contexts.lock();

    let summaries: serde_json::Map<String, Value> = contexts
        .iter()
        .map(|(supi, ctx)| {
            (
                supi.clone(),
                json!({
                    "supi": ctx.supi,
                    "registration_state": ctx.registration_state,
                    "guti": ctx.guti,
                    "allowed_nssai": ctx.allowed_nssai,
                    "pdu_sessions": ctx.pdu_sessions.len(),
                    "registration_time": ctx.registration_time
                        .format(&time::format_description::well_known::Rfc3339)
                        .unwrap_or_default(),
                }),
            )
        })
        .collect();

    Json(json!({
        "total_ues": contexts.len(),
        "ue_contexts": summaries,
    }))
}

async fn health(State(state): State<AmfState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "AMF",
        "version": env!("CARGO_PKG_VERSION"),
        "registered_ues": state.ue_contexts.lock().len(),
    }))
}

async fn metrics(State(state): State<AmfState>) -> Json<Value> {
    let contexts = state.ue_contexts.lock();

    let mut by_state = std::collections::HashMap::<&'static str, usize>::new();
    for context in contexts.values() {
        let key = match context.registration_state {
            RegistrationState::Deregistered => "DEREGISTERED",
            RegistrationState::AuthPending => "AUTH_PENDING",
            RegistrationState::SecPending => "SEC_PENDING",
            RegistrationState::Registered => "REGISTERED",
        };
        *by_state.entry(key).or_default() += 1;
    }

    let total_pdu_sessions: usize = contexts.values().map(|ctx| ctx.pdu_sessions.len()).sum();

    Json(json!({
        "total_ue_contexts": contexts.len(),
        "contexts_by_state": by_state,
        "total_pdu_sessions": total_pdu_sessions,
        "ngap_bindings": state.ngap_bindings.lock().len(),
    }))
}
