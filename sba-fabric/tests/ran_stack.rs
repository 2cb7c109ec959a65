//! RAN split behaviour: gNB NGAP handling, CU↔DU F1AP, identifier
//! monotonicity.

#![allow(clippy::unwrap_used)]
#![allow(unused_crate_dependencies)]

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use sba_fabric::amf::{self, AmfState};
use sba_fabric::client::Sbi;
use sba_fabric::cu::{self, CuState};
use sba_fabric::du::{self, DuState};
use sba_fabric::gnb::{self, GnbState};
use sba_fabric::types::NfType;
use serde_json::{Value, json};

use common::{json_body, request, spawn};

const DEAD_NRF: &str = "http://127.0.0.1:9";

fn ngap_initiating(procedure_code: u8, ies: Value) -> Value {
    json!({
        "initiatingMessage": {
            "procedureCode": procedure_code,
            "criticality": "ignore",
            "value": { "protocolIEs": ies }
        }
    })
}

async fn gnb_with_amf() -> (axum::Router, GnbState) {
    let amf_sbi = Arc::new(Sbi::new(DEAD_NRF, NfType::Amf));
    let amf_url = spawn(amf::api::make_router(AmfState::new(amf_sbi))).await;

    let gnb_sbi = Arc::new(Sbi::new(DEAD_NRF, NfType::Gnb));
    gnb_sbi.set_peer(NfType::Amf, amf_url);
    let state = GnbState::new(gnb_sbi);

    (gnb::api::make_router(state.clone()), state)
}

#[tokio::test]
async fn initial_ue_message_allocates_monotonic_ids() {
    let (router, _state) = gnb_with_amf().await;

    let mut previous_ran_id = 0;
    let mut previous_amf_id = 0;

    for _ in 0..3 {
        let response = request(
            &router,
            "POST",
            "/ngap/initial-ue-message",
            Some(json!({ "nas_pdu": "registration-request" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;

        let ran_id = body["ranUeNgapId"].as_u64().unwrap();
        let amf_id = body["amfUeNgapId"].as_u64().unwrap();

        assert!(ran_id > previous_ran_id, "RAN-UE-NGAP-ID must be strictly increasing");
        assert!(amf_id > previous_amf_id, "AMF-UE-NGAP-ID must be strictly increasing");
        previous_ran_id = ran_id;
        previous_amf_id = amf_id;
    }
}

#[tokio::test]
async fn ue_context_setup_connects_a_known_ue() {
    let (router, state) = gnb_with_amf().await;

    let response = request(
        &router,
        "POST",
        "/ngap/initial-ue-message",
        Some(json!({ "nas_pdu": "registration-request" })),
    )
    .await;
    let body = json_body(response).await;
    let ran_id = body["ranUeNgapId"].as_u64().unwrap();
    let amf_id = body["amfUeNgapId"].as_u64().unwrap();

    let response = request(
        &router,
        "POST",
        "/ngap/ue-context-setup-request",
        Some(ngap_initiating(
            14,
            json!({
                "AMF-UE-NGAP-ID": amf_id,
                "RAN-UE-NGAP-ID": ran_id,
                "SecurityKey": "a".repeat(64),
                "UESecurityCapabilities": { "nea": [1], "nia": [1] }
            }),
        )),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let outcome = json_body(response).await;
    assert!(outcome["successfulOutcome"].is_object());

    let contexts = state.ue_contexts.lock();
    let context = contexts.get(&ran_id).unwrap();
    assert_eq!(context.amf_ue_ngap_id, Some(amf_id));
    assert!(context.security_context.is_some());
}

/// Protocol-level failure: an unknown RAN-UE-NGAP-ID is an unsuccessful
/// outcome over HTTP 200, not a transport error.
#[tokio::test]
async fn unknown_ue_yields_unsuccessful_outcome() {
    let (router, _state) = gnb_with_amf().await;

    let response = request(
        &router,
        "POST",
        "/ngap/ue-context-setup-request",
        Some(ngap_initiating(
            14,
            json!({ "AMF-UE-NGAP-ID": 99, "RAN-UE-NGAP-ID": 424242 }),
        )),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let outcome = json_body(response).await;
    let cause = &outcome["unsuccessfulOutcome"]["value"]["protocolIEs"]["Cause"];
    assert_eq!(cause["radioNetwork"], "Unknown-local-UE-NGAP-ID");
}

#[tokio::test]
async fn pdu_session_resources_are_recorded() {
    let (router, state) = gnb_with_amf().await;

    let response = request(
        &router,
        "POST",
        "/ngap/initial-ue-message",
        Some(json!({ "nas_pdu": "service-request" })),
    )
    .await;
    let ran_id = json_body(response).await["ranUeNgapId"].as_u64().unwrap();

    let response = request(
        &router,
        "POST",
        "/ngap/pdu-session-resource-setup-request",
        Some(ngap_initiating(
            29,
            json!({
                "AMF-UE-NGAP-ID": 1,
                "RAN-UE-NGAP-ID": ran_id,
                "PDUSessionResourceSetupListSUReq": [
                    { "pduSessionID": 1 },
                    { "pduSessionID": 2 }
                ]
            }),
        )),
    )
    .await;
    let outcome = json_body(response).await;

    let setup_list = &outcome["successfulOutcome"]["value"]["protocolIEs"]["PDUSessionResourceSetupListSURes"];
    assert_eq!(setup_list.as_array().unwrap().len(), 2);

    let contexts = state.ue_contexts.lock();
    assert_eq!(contexts.get(&ran_id).unwrap().pdu_sessions.len(), 2);
}

#[tokio::test]
async fn handover_allocates_a_fresh_target_context() {
    let (router, state) = gnb_with_amf().await;

    let response = request(
        &router,
        "POST",
        "/ngap/handover-request",
        Some(ngap_initiating(1, json!({ "AMF-UE-NGAP-ID": 55, "HandoverType": "intra5gs" }))),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let ack = json_body(response).await;

    let ies = &ack["successfulOutcome"]["value"]["protocolIEs"];
    assert_eq!(ies["AMF-UE-NGAP-ID"], 55);
    assert_eq!(ies["TargetToSource-TransparentContainer"], "handover-command-data");

    let target_ran_id = ies["RAN-UE-NGAP-ID"].as_u64().unwrap();
    let contexts = state.ue_contexts.lock();
    let context = contexts.get(&target_ran_id).unwrap();
    assert_eq!(context.amf_ue_ngap_id, Some(55));

    // Missing AMF id → preparation failure, still HTTP 200.
    drop(contexts);
    let response = request(
        &router,
        "POST",
        "/ngap/handover-request",
        Some(ngap_initiating(1, json!({ "HandoverType": "intra5gs" }))),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let failure = json_body(response).await;
    assert!(failure["unsuccessfulOutcome"].is_object());
}

#[tokio::test]
async fn du_initial_access_flows_through_the_cu() {
    let cu_state = CuState::new();
    let cu_url = spawn(cu::api::make_router(cu_state.clone())).await;

    let du_sbi = Arc::new(Sbi::new(DEAD_NRF, NfType::GnbDu));
    du_sbi.set_peer(NfType::GnbCu, cu_url);
    let du_state = DuState::new(du_sbi);
    let du_router = du::api::make_router(du_state.clone());

    let response = request(
        &du_router,
        "POST",
        "/f1ap/initial-ul-rrc-message",
        Some(json!({ "rrcContainer": "rrc-setup-request" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;

    let du_ue_id = body["gnb_du_ue_f1ap_id"].as_u64().unwrap();
    assert_eq!(body["c_rnti"].as_u64().unwrap(), 0x1000 + du_ue_id);

    // The CU answered with a DL RRC Message Transfer carrying an RRCSetup.
    let dl_rrc = &body["dl_rrc_message"]["initiatingMessage"];
    assert_eq!(dl_rrc["procedureCode"], 8);
    let container = dl_rrc["value"]["protocolIEs"]["RRCContainer"].as_str().unwrap();
    assert!(container.contains("rrcSetup"));

    // CU-side context exists with the DU id already bound.
    let cu_contexts = cu_state.ue_contexts.lock();
    let cu_context = cu_contexts.values().find(|ctx| ctx.gnb_du_ue_f1ap_id == Some(du_ue_id));
    assert!(cu_context.is_some());
    assert_eq!(cu_context.unwrap().rrc_state, "CONNECTED");
}

#[tokio::test]
async fn cu_ue_f1ap_ids_are_monotonic() {
    let cu_state = CuState::new();
    let router = cu::api::make_router(cu_state);

    let mut previous = 0;
    for du_id in [10u64, 11, 12] {
        let response = request(
            &router,
            "POST",
            "/f1ap/initial-ul-rrc-message",
            Some(json!({
                "initiatingMessage": {
                    "procedureCode": 7,
                    "criticality": "ignore",
                    "value": { "protocolIEs": {
                        "gNB-DU-UE-F1AP-ID": du_id,
                        "C-RNTI": 0x1000 + du_id,
                        "RRCContainer": "rrc-setup-request"
                    }}
                }
            })),
        )
        .await;
        let body = json_body(response).await;
        let cu_id = body["initiatingMessage"]["value"]["protocolIEs"]["gNB-CU-UE-F1AP-ID"]
            .as_u64()
            .unwrap();
        assert!(cu_id > previous);
        previous = cu_id;
    }
}

#[tokio::test]
async fn du_protocol_stack_endpoints() {
    let du_sbi = Arc::new(Sbi::new(DEAD_NRF, NfType::GnbDu));
    let du_state = DuState::new(du_sbi);
    let router = du::api::make_router(du_state);

    // RLC via the MAC ingress for a seeded UE/SRB.
    let response = request(
        &router,
        "POST",
        "/mac/process-pdu",
        Some(json!({ "ue_id": 1, "lcid": 1, "payload": "rrc-message" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["rlc_sn"], 0);

    // Consecutive SDUs get consecutive SNs.
    let response = request(
        &router,
        "POST",
        "/rlc/process-sdu",
        Some(json!({ "ue_id": 1, "bearer_id": 1, "sdu": "next" })),
    )
    .await;
    let body = json_body(response).await;
    assert_eq!(body["rlc_sn"], 1);

    // PDCP on the DRB.
    let response = request(
        &router,
        "POST",
        "/pdcp/process-sdu",
        Some(json!({ "ue_id": 2, "bearer_id": 5, "sdu": "user-data" })),
    )
    .await;
    let body = json_body(response).await;
    assert_eq!(body["pdcp_sn"], 0);
    assert!(body["integrity_tag"].is_string());

    // HARQ: three NACKs retransmit, the fourth drops.
    for expected in ["RETRANSMIT", "RETRANSMIT", "RETRANSMIT", "DROPPED"] {
        let response = request(
            &router,
            "POST",
            "/mac/harq-feedback",
            Some(json!({ "ue_id": 1, "harq_process": 1, "ack": false })),
        )
        .await;
        let body = json_body(response).await;
        assert_eq!(body["outcome"], expected);
    }

    // PRACH.
    let response = request(&router, "POST", "/phy/process-prach", Some(json!({ "preamble_index": 7 }))).await;
    let body = json_body(response).await;
    assert_eq!(body["random_access_response"]["temp_c_rnti"], 0x1007);

    // Unknown RLC entity.
    let response = request(
        &router,
        "POST",
        "/rlc/process-sdu",
        Some(json!({ "ue_id": 99, "bearer_id": 1, "sdu": "x" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
