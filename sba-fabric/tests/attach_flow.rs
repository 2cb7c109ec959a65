//! End-to-end UE attach: registration, 5G-AKA, security mode, PDU session.
//!
//! The NFs run as real loopback servers wired to each other through
//! pre-populated peer caches (the registry hop is covered by the registry
//! suite).

#![allow(clippy::unwrap_used)]
#![allow(unused_crate_dependencies)]

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use sba_fabric::amf::{self, AmfState};
use sba_fabric::ausf::{self, AusfState};
use sba_fabric::client::Sbi;
use sba_fabric::smf::{self, SmfState};
use sba_fabric::types::NfType;
use sba_fabric::udm::{self, UdmState};
use sba_fabric::upf::{self, UpfState};
use serde_json::{Value, json};
use sha2::{Digest as _, Sha256};

use common::{json_body, request, spawn};

const DEAD_NRF: &str = "http://127.0.0.1:9";

struct Fabric {
    amf_router: axum::Router,
    smf_router: axum::Router,
    udm_state: UdmState,
    upf_state: UpfState,
}

async fn bring_up_fabric() -> Fabric {
    let udm_state = UdmState::new();
    let udm_url = spawn(udm::api::make_router(udm_state.clone())).await;

    let upf_state = UpfState::new(&sba_fabric::config::UpfPoolConf {
        ipv4_cidr: "192.168.100.0/24".to_owned(),
        ipv6_cidr: "2001:db8:5::/48".to_owned(),
    })
    .unwrap();
    let upf_url = spawn(upf::api::make_router(upf_state.clone())).await;

    let ausf_sbi = Arc::new(Sbi::new(DEAD_NRF, NfType::Ausf));
    ausf_sbi.set_peer(NfType::Udm, udm_url.clone());
    let ausf_state = AusfState::new(ausf_sbi);
    let ausf_url = spawn(ausf::api::make_router(ausf_state)).await;

    let smf_sbi = Arc::new(Sbi::new(DEAD_NRF, NfType::Smf));
    smf_sbi.set_peer(NfType::Upf, upf_url.clone());
    let smf_state = SmfState::new(smf_sbi);
    let smf_router = smf::api::make_router(smf_state);
    let smf_url = spawn(smf_router.clone()).await;

    let amf_sbi = Arc::new(Sbi::new(DEAD_NRF, NfType::Amf));
    amf_sbi.set_peer(NfType::Ausf, ausf_url);
    amf_sbi.set_peer(NfType::Udm, udm_url);
    amf_sbi.set_peer(NfType::Smf, smf_url);
    let amf_state = AmfState::new(amf_sbi);
    let amf_router = amf::api::make_router(amf_state);

    Fabric {
        amf_router,
        smf_router,
        udm_state,
        upf_state,
    }
}

fn registration_request(suci: &str) -> Value {
    json!({
        "header": { "message_type": 0x41 },
        "ngksi": 1,
        "registration_type": 1,
        "suci": suci,
        "ue_security_capability": { "nea": [0, 1, 2], "nia": [0, 1, 2] },
        "requested_nssai": [{ "sst": 1, "sd": "010203" }]
    })
}

fn auth_ctx_id(links: &Value) -> String {
    links["5g-aka"]["href"]
        .as_str()
        .unwrap()
        .strip_suffix("/5g-aka-confirmation")
        .unwrap()
        .rsplit('/')
        .next()
        .unwrap()
        .to_owned()
}

/// Scenario S1 on the UDM-backed path: the "UE" recomputes RES* from its
/// permanent key exactly as the UDM derived XRES.
#[tokio::test]
async fn registration_with_full_5g_aka() {
    let fabric = bring_up_fabric().await;
    let supi = "imsi-001010000000001";

    let response = request(
        &fabric.amf_router,
        "POST",
        "/nas/registration-request",
        Some(registration_request(supi)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let challenge = json_body(response).await;
    assert_eq!(challenge["status"], "AUTHENTICATION_REQUIRED");

    let rand = challenge["nas_message"]["authentication_parameter_rand"].as_str().unwrap();
    let permanent_key = fabric
        .udm_state
        .auth_subscriptions
        .lock()
        .get(supi)
        .unwrap()
        .enc_permanent_key
        .clone();
    let res_star = hex::encode(Sha256::digest(format!("{permanent_key}{rand}XRES")))[..16].to_owned();

    let response = request(
        &fabric.amf_router,
        "POST",
        "/nas/authentication-response",
        Some(json!({
            "supi": supi,
            "authResponse": res_star,
            "authContextId": auth_ctx_id(&challenge["links"]),
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let verdict = json_body(response).await;
    assert_eq!(verdict["status"], "AUTHENTICATION_SUCCESS");
    let algorithms = &verdict["nas_message"]["selected_nas_security_algorithms"];
    assert_eq!(algorithms["typeOfCipheringAlgorithm"], 1);
    assert_eq!(algorithms["typeOfIntegrityProtectionAlgorithm"], 1);

    let response = request(
        &fabric.amf_router,
        "POST",
        "/nas/security-mode-complete",
        Some(json!({ "supi": supi, "imeisv": "3534900698730025" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let complete = json_body(response).await;
    assert_eq!(complete["status"], "REGISTRATION_COMPLETE");
    assert_eq!(complete["udm_registered"], true);

    let guti = complete["guti"].as_str().unwrap();
    assert_eq!(guti.len(), 21);
    assert!(guti.starts_with('4'));
    assert!(guti.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));

    // UE context ends REGISTERED.
    let response = request(&fabric.amf_router, "GET", "/amf/ue-contexts", None).await;
    let contexts = json_body(response).await;
    assert_eq!(contexts["ue_contexts"][supi]["registration_state"], "REGISTERED");

    // Invariant: a REGISTERED AMF context implies a UDM registration record.
    assert!(fabric.udm_state.amf_registrations.lock().contains_key(supi));
}

/// Scenario S1 with a SUCI outside the roster: the AUSF falls back to a
/// local vector whose expected RES* is derivable from the challenge.
#[tokio::test]
async fn registration_with_local_fallback_vector() {
    let fabric = bring_up_fabric().await;
    let suci = "suci-001-01-0000-000000001";
    let supi = "imsi-000000001";

    let response = request(
        &fabric.amf_router,
        "POST",
        "/nas/registration-request",
        Some(registration_request(suci)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let challenge = json_body(response).await;
    assert_eq!(challenge["status"], "AUTHENTICATION_REQUIRED");

    let rand = challenge["nas_message"]["authentication_parameter_rand"].as_str().unwrap();
    let autn = challenge["nas_message"]["authentication_parameter_autn"].as_str().unwrap();
    let res_star = hex::encode(Sha256::digest(format!("{supi}{rand}{autn}")))[..16].to_owned();

    let response = request(
        &fabric.amf_router,
        "POST",
        "/nas/authentication-response",
        Some(json!({
            "supi": supi,
            "authResponse": res_star,
            "authContextId": auth_ctx_id(&challenge["links"]),
        })),
    )
    .await;
    let verdict = json_body(response).await;
    assert_eq!(verdict["status"], "AUTHENTICATION_SUCCESS");

    let response = request(
        &fabric.amf_router,
        "POST",
        "/nas/security-mode-complete",
        Some(json!({ "supi": supi })),
    )
    .await;
    let complete = json_body(response).await;
    assert_eq!(complete["status"], "REGISTRATION_COMPLETE");
}

/// A wrong RES* is a protocol-level failure: HTTP 200, MAC_FAILURE cause,
/// UE back to DEREGISTERED.
#[tokio::test]
async fn wrong_res_star_fails_at_protocol_level() {
    let fabric = bring_up_fabric().await;
    let supi = "imsi-001010000000002";

    let response = request(
        &fabric.amf_router,
        "POST",
        "/nas/registration-request",
        Some(registration_request(supi)),
    )
    .await;
    let challenge = json_body(response).await;
    assert_eq!(challenge["status"], "AUTHENTICATION_REQUIRED");

    let response = request(
        &fabric.amf_router,
        "POST",
        "/nas/authentication-response",
        Some(json!({
            "supi": supi,
            "authResponse": "definitely-not-the-res-star",
            "authContextId": auth_ctx_id(&challenge["links"]),
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let verdict = json_body(response).await;
    assert_eq!(verdict["status"], "AUTHENTICATION_FAILURE");
    assert_eq!(verdict["cause"], 20); // MAC failure

    let response = request(&fabric.amf_router, "GET", "/amf/ue-contexts", None).await;
    let contexts = json_body(response).await;
    assert_eq!(contexts["ue_contexts"][supi]["registration_state"], "DEREGISTERED");
}

/// With no AUSF reachable the AMF bypasses authentication and accepts
/// directly (simulation fallback of scenario S1).
#[tokio::test]
async fn unreachable_ausf_falls_back_to_direct_accept() {
    let udm_state = UdmState::new();
    let udm_url = spawn(udm::api::make_router(udm_state.clone())).await;

    let amf_sbi = Arc::new(Sbi::new(DEAD_NRF, NfType::Amf));
    amf_sbi.set_peer(NfType::Ausf, "http://127.0.0.1:9"); // nothing listens here
    amf_sbi.set_peer(NfType::Udm, udm_url);
    let amf_router = amf::api::make_router(AmfState::new(amf_sbi));

    let response = request(
        &amf_router,
        "POST",
        "/nas/registration-request",
        Some(registration_request("suci-001-01-0000-000000001")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let accept = json_body(response).await;
    assert_eq!(accept["status"], "REGISTRATION_ACCEPT");
    assert_eq!(accept["udm_registered"], true);

    let guti = accept["guti"].as_str().unwrap();
    assert_eq!(guti.len(), 21);
    assert!(guti.starts_with('4'));
}

/// Scenario S2: PDU session up, plus invariant 4 (SMF/UPF SEID linkage).
#[tokio::test]
async fn pdu_session_establishment_links_smf_and_upf() {
    let fabric = bring_up_fabric().await;

    let response = request(
        &fabric.smf_router,
        "POST",
        "/nsmf-pdusession/v1/sm-contexts",
        Some(json!({
            "supi": "imsi-001010000000001",
            "pduSessionId": 1,
            "dnn": "internet",
            "sNssai": { "sst": 1, "sd": "010203" },
            "anType": "3GPP_ACCESS"
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let created = json_body(response).await;

    assert_eq!(created["status"], "CREATED");
    assert_eq!(created["ueIpAddress"], "10.2.0.1");
    assert_eq!(created["n2SmInfo"]["qosFlowSetupRequestList"][0]["qfi"], 9);
    assert_eq!(created["smContext"]["contextId"], "imsi-001010000000001:1");

    // Invariant 4: the UPF holds a PFCP session whose smfSeid matches.
    let upf_sessions = fabric.upf_state.sessions.lock();
    let session = upf_sessions
        .values()
        .find(|session| session.smf_seid == "smf-seid-imsi-001010000000001:1")
        .expect("UPF session for the SMF SEID");
    assert!(session.pdrs.contains_key(&1));
    assert!(session.fars.contains_key(&1));
    assert!(session.qers.contains_key(&1));
}

/// Missing mandatory fields are invalid-argument, not a transport error.
#[tokio::test]
async fn sm_context_without_dnn_is_rejected() {
    let fabric = bring_up_fabric().await;

    let response = request(
        &fabric.smf_router,
        "POST",
        "/nsmf-pdusession/v1/sm-contexts",
        Some(json!({
            "supi": "imsi-001010000000001",
            "pduSessionId": 1,
            "sNssai": { "sst": 1, "sd": "010203" },
            "anType": "3GPP_ACCESS"
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

/// NAS-driven session establishment through the AMF records the session
/// reference in the UE context.
#[tokio::test]
async fn nas_pdu_session_request_goes_through_the_amf() {
    let fabric = bring_up_fabric().await;
    let supi = "imsi-001010000000003";

    // Register on the fallback-free path first.
    let response = request(
        &fabric.amf_router,
        "POST",
        "/nas/registration-request",
        Some(registration_request(supi)),
    )
    .await;
    let challenge = json_body(response).await;

    let rand = challenge["nas_message"]["authentication_parameter_rand"].as_str().unwrap();
    let permanent_key = fabric
        .udm_state
        .auth_subscriptions
        .lock()
        .get(supi)
        .unwrap()
        .enc_permanent_key
        .clone();
    let res_star = hex::encode(Sha256::digest(format!("{permanent_key}{rand}XRES")))[..16].to_owned();

    request(
        &fabric.amf_router,
        "POST",
        "/nas/authentication-response",
        Some(json!({
            "supi": supi,
            "authResponse": res_star,
            "authContextId": auth_ctx_id(&challenge["links"]),
        })),
    )
    .await;
    request(
        &fabric.amf_router,
        "POST",
        "/nas/security-mode-complete",
        Some(json!({ "supi": supi })),
    )
    .await;

    let response = request(
        &fabric.amf_router,
        "POST",
        "/nas/pdu-session-establishment-request",
        Some(json!({
            "header": { "message_type": 0xc1 },
            "supi": supi,
            "pdu_session_id": 2,
            "pti": 1,
            "pdu_session_type": 1,
            "ssc_mode": 1,
            "dnn": "internet"
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let accept = json_body(response).await;
    assert_eq!(accept["status"], "PDU_SESSION_ESTABLISHMENT_ACCEPT");
    assert_eq!(accept["pdu_session_id"], 2);
    assert_eq!(accept["session_context"]["ueIpAddress"], "10.3.0.1");

    let response = request(&fabric.amf_router, "GET", "/amf/ue-contexts", None).await;
    let contexts = json_body(response).await;
    assert_eq!(contexts["ue_contexts"][supi]["pdu_sessions"], 1);
}

/// Session establishment for an unregistered UE is refused.
#[tokio::test]
async fn pdu_session_requires_a_registered_ue() {
    let fabric = bring_up_fabric().await;

    let response = request(
        &fabric.amf_router,
        "POST",
        "/nas/pdu-session-establishment-request",
        Some(json!({
            "header": { "message_type": 0xc1 },
            "supi": "imsi-001010000009999",
            "pdu_session_id": 1,
            "pti": 1
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
