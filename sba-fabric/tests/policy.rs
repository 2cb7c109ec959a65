//! PCF API behaviour: association lifecycle, trigger handling, catalogs.

#![allow(clippy::unwrap_used)]
#![allow(unused_crate_dependencies)]

mod common;

use axum::http::{StatusCode, header};
use sba_fabric::pcf::{PcfState, api};
use serde_json::json;

use common::{json_body, request};

fn sm_policy_context(dnn: &str) -> serde_json::Value {
    json!({
        "supi": "imsi-001010000000001",
        "pduSessionId": 1,
        "pduSessionType": "IPV4",
        "dnn": dnn,
        "notificationUri": "http://127.0.0.1:9005/npcf-callback",
        "accessType": "3GPP_ACCESS",
        "servingNetwork": { "mcc": "001", "mnc": "01" }
    })
}

async fn create_policy(router: &axum::Router, dnn: &str) -> (String, serde_json::Value) {
    let response = request(
        router,
        "POST",
        "/npcf-smpolicycontrol/v1/sm-policies",
        Some(sm_policy_context(dnn)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let location = response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_owned();
    let association_id = location.rsplit('/').next().unwrap().to_owned();

    (association_id, json_body(response).await)
}

#[tokio::test]
async fn internet_policy_has_default_rule_and_triggers() {
    let router = api::make_router(PcfState::new());

    let (_, decision) = create_policy(&router, "internet").await;

    assert!(decision["pccRules"]["rule_internet_default"].is_object());
    assert!(decision["pccRules"].get("rule_video_streaming").is_none());
    assert_eq!(decision["qosDecs"]["qos_internet"]["fiveqi"], 9);
    assert!(decision["revalidationTime"].is_string());

    let triggers = decision["policyCtrlReqTriggers"].as_array().unwrap();
    for expected in ["PLMN_CH", "AC_TY_CH", "UE_IP_CH", "APP_STA", "APP_STO", "QOS_NOTIF"] {
        assert!(triggers.iter().any(|t| t == expected), "missing trigger {expected}");
    }
}

/// Scenario S5: APP_STA installs the app-keyed rule and its QoS.
#[tokio::test]
async fn app_start_installs_the_video_rule() {
    let router = api::make_router(PcfState::new());

    let (association_id, _) = create_policy(&router, "internet").await;

    let response = request(
        &router,
        "PATCH",
        &format!("/npcf-smpolicycontrol/v1/sm-policies/{association_id}"),
        Some(json!({
            "triggers": ["APP_STA"],
            "context_updates": { "app_id": "video_streaming_app" }
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated = json_body(response).await;

    assert!(updated["pccRules"]["rule_video_streaming"].is_object());
    assert_eq!(updated["qosDecs"]["qos_video"]["fiveqi"], 2);
    assert_eq!(updated["qosDecs"]["qos_video"]["gbrDl"], "10 Mbps");
}

#[tokio::test]
async fn unknown_trigger_is_invalid_argument() {
    let router = api::make_router(PcfState::new());

    let (association_id, _) = create_policy(&router, "internet").await;

    let response = request(
        &router,
        "PATCH",
        &format!("/npcf-smpolicycontrol/v1/sm-policies/{association_id}"),
        Some(json!({ "triggers": ["NOT_A_TRIGGER"] })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_association_is_not_found() {
    let router = api::make_router(PcfState::new());

    let id = uuid::Uuid::new_v4();
    let response = request(
        &router,
        "PATCH",
        &format!("/npcf-smpolicycontrol/v1/sm-policies/{id}"),
        Some(json!({ "triggers": ["APP_STA"] })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = request(&router, "GET", &format!("/npcf-smpolicycontrol/v1/sm-policies/{id}"), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn get_patch_delete_lifecycle() {
    let router = api::make_router(PcfState::new());

    let (association_id, created) = create_policy(&router, "ims").await;
    assert!(created["pccRules"]["rule_ims_signalling"].is_object());

    let uri = format!("/npcf-smpolicycontrol/v1/sm-policies/{association_id}");

    let response = request(&router, "GET", &uri, None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = request(&router, "DELETE", &uri, None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = request(&router, "GET", &uri, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn duplicate_catalog_entries_conflict() {
    let router = api::make_router(PcfState::new());

    let rule = json!({
        "pccRuleId": "rule_custom",
        "precedence": 500,
        "refQosData": ["qos_internet"]
    });
    let response = request(&router, "POST", "/pcf/pcc-rules", Some(rule.clone())).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = request(&router, "POST", "/pcf/pcc-rules", Some(rule)).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Seeded QoS ids collide as well.
    let qos = json!({ "qosId": "qos_internet", "fiveqi": 9 });
    let response = request(&router, "POST", "/pcf/qos-data", Some(qos)).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn congestion_notification_caps_best_effort() {
    let router = api::make_router(PcfState::new());

    let (association_id, _) = create_policy(&router, "internet").await;

    let response = request(
        &router,
        "PATCH",
        &format!("/npcf-smpolicycontrol/v1/sm-policies/{association_id}"),
        Some(json!({
            "triggers": ["QOS_NOTIF"],
            "context_updates": { "qos_notification": { "congestion_level": "high" } }
        })),
    )
    .await;
    let updated = json_body(response).await;

    assert_eq!(updated["qosDecs"]["qos_internet"]["maxbrUl"], "500 Kbps");
    assert_eq!(updated["qosDecs"]["qos_internet"]["maxbrDl"], "1 Mbps");
}
