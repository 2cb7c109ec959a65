use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use super::{PccRule, PcfState, PolicyAssociation, PolicyTrigger, QosData, SmPolicyContextData, SmPolicyDecision};
use crate::http::HttpError;

pub fn make_router(state: PcfState) -> Router {
    Router::new()
        .route("/npcf-smpolicycontrol/v1/sm-policies", post(create_sm_policy))
        .route(
            "/npcf-smpolicycontrol/v1/sm-policies/{sm_policy_id}",
            get(get_sm_policy).patch(update_sm_policy).delete(delete_sm_policy),
        )
        .route("/pcf/pcc-rules", get(get_pcc_rules).post(create_pcc_rule))
        .route("/pcf/qos-data", get(get_qos_data).post(create_qos_data))
        .route("/pcf/status", get(status))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
}

// ----- Npcf_SMPolicyControl -----

async fn create_sm_policy(
    State(state): State<PcfState>,
    Json(context): Json<SmPolicyContextData>,
) -> Result<Response, HttpError> {
    let association_id = Uuid::new_v4();

    let decision = state.create_decision(&context);

    state
        .associations
        .lock()
        .insert(association_id, PolicyAssociation { context: context.clone() });
    state.decisions.lock().insert(association_id, decision.clone());

    info!(
        supi = context.supi,
        pdu_session_id = context.pdu_session_id,
        dnn = context.dnn,
        %association_id,
        "SM policy association created"
    );

    let location = format!("/npcf-smpolicycontrol/v1/sm-policies/{association_id}");

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(decision),
    )
        .into_response())
}

async fn get_sm_policy(
    State(state): State<PcfState>,
    Path(sm_policy_id): Path<Uuid>,
) -> Result<Json<SmPolicyDecision>, HttpError> {
    state
        .decisions
        .lock()
        .get(&sm_policy_id)
        .cloned()
        .map(Json)
        .ok_or_else(|| HttpError::not_found().msg("SM policy association not found"))
}

#[derive(Deserialize)]
struct SmPolicyUpdate {
    #[serde(default)]
    triggers: Vec<String>,
    #[serde(default)]
    context_updates: Value,
}

async fn update_sm_policy(
    State(state): State<PcfState>,
    Path(sm_policy_id): Path<Uuid>,
    Json(update): Json<SmPolicyUpdate>,
) -> Result<Json<SmPolicyDecision>, HttpError> {
    let triggers: Vec<PolicyTrigger> = update
        .triggers
        .iter()
        .map(|raw| raw.parse())
        .collect::<Result<_, _>>()
        .map_err(HttpError::bad_request().with_msg("unknown policy control trigger").err())?;

    let mut decisions = state.decisions.lock();
    let decision = decisions
        .get_mut(&sm_policy_id)
        .ok_or_else(|| HttpError::not_found().msg("SM policy association not found"))?;

    state.update_decision(decision, &triggers, &update.context_updates);

    info!(%sm_policy_id, triggers = triggers.len(), "SM policy association updated");

    Ok(Json(decision.clone()))
}

async fn delete_sm_policy(
    State(state): State<PcfState>,
    Path(sm_policy_id): Path<Uuid>,
) -> Result<Json<Value>, HttpError> {
    if state.decisions.lock().remove(&sm_policy_id).is_none() {
        return Err(HttpError::not_found().msg("SM policy association not found"));
    }
    state.associations.lock().remove(&sm_policy_id);

    info!(%sm_policy_id, "SM policy association deleted");

    Ok(Json(json!({ "message": "SM Policy Association deleted successfully" })))
}

// ----- Catalog management -----

async fn get_pcc_rules(State(state): State<PcfState>) -> Json<Value> {
    let rules = state.rule_catalog.lock();

    Json(json!({
        "total_rules": rules.len(),
        "pcc_rules": *rules,
    }))
}

async fn create_pcc_rule(
    State(state): State<PcfState>,
    Json(rule): Json<PccRule>,
) -> Result<Json<Value>, HttpError> {
    let mut rules = state.rule_catalog.lock();

    if rules.contains_key(&rule.pcc_rule_id) {
        return Err(HttpError::conflict().msg("PCC rule already exists"));
    }

    let rule_id = rule.pcc_rule_id.clone();
    rules.insert(rule_id.clone(), rule);

    info!(rule_id, "PCC rule created");

    Ok(Json(json!({ "message": "PCC rule created successfully", "rule_id": rule_id })))
}

async fn get_qos_data(State(state): State<PcfState>) -> Json<Value> {
    let qos = state.qos_catalog.lock();

    Json(json!({
        "total_qos_data": qos.len(),
        "qos_data": *qos,
    }))
}

async fn create_qos_data(
    State(state): State<PcfState>,
    Json(qos): Json<QosData>,
) -> Result<Json<Value>, HttpError> {
    let mut catalog = state.qos_catalog.lock();

    if catalog.contains_key(&qos.qos_id) {
        return Err(HttpError::conflict().msg("QoS data already exists"));
    }

    let qos_id = qos.qos_id.clone();
    catalog.insert(qos_id.clone(), qos);

    info!(qos_id, "QoS data created");

    Ok(Json(json!({ "message": "QoS data created successfully", "qos_id": qos_id })))
}

// ----- Health & monitoring -----

async fn status(State(state): State<PcfState>) -> Json<Value> {
    Json(json!({
        "status": "operational",
        "active_policy_associations": state.associations.lock().len(),
        "sm_policy_decisions": state.decisions.lock().len(),
        "total_pcc_rules": state.rule_catalog.lock().len(),
        "total_qos_data": state.qos_catalog.lock().len(),
        "supported_features": super::SUPPORTED_FEATURES,
    }))
}

async fn health(State(state): State<PcfState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "PCF",
        "version": env!("CARGO_PKG_VERSION"),
        "active_policies": state.associations.lock().len(),
    }))
}

async fn metrics(State(state): State<PcfState>) -> Json<Value> {
    Json(json!({
        "total_policy_associations": state.associations.lock().len(),
        "active_sm_policies": state.decisions.lock().len(),
        "pcc_rules_configured": state.rule_catalog.lock().len(),
        "qos_data_configured": state.qos_catalog.lock().len(),
    }))
}
