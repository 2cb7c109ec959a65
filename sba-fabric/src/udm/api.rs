use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{AmfRegistration, AmfRegistrationRecord, AuthEvent, UdmState};
use crate::http::HttpError;

pub fn make_router(state: UdmState) -> Router {
    Router::new()
        .route(
            "/nudm-uecm/v1/{supi}/registrations/amf-3gpp-access",
            post(amf_registration)
                .get(get_amf_registration)
                .patch(update_amf_registration)
                .delete(amf_deregistration),
        )
        .route("/nudm-sdm/v1/{supi}/am-data", get(get_am_data))
        .route("/nudm-sdm/v1/{supi}/sm-data", get(get_sm_data))
        .route("/nudm-sdm/v1/{supi}/nssai", get(get_nssai))
        .route(
            "/nudm-ueau/v1/{supi}/security-information/generate-auth-data",
            post(generate_auth_data),
        )
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
}

// ----- Nudm_UECM -----

async fn amf_registration(
    State(state): State<UdmState>,
    Path(supi): Path<String>,
    Json(mut registration): Json<AmfRegistration>,
) -> Result<Json<Value>, HttpError> {
    if registration.registration_time.is_none() {
        registration.registration_time = Some(OffsetDateTime::now_utc());
    }

    let record = AmfRegistrationRecord {
        registration_id: Uuid::new_v4(),
        registration: registration.clone(),
    };

    // Re-registration by another AMF replaces the previous one (implicit
    // deregistration of the old serving AMF).
    let previous = state.amf_registrations.lock().insert(supi.clone(), record.clone());
    if let Some(previous) = previous {
        info!(
            supi,
            old_amf = %previous.registration.amf_instance_id,
            new_amf = %registration.amf_instance_id,
            "Serving AMF replaced"
        );
    } else {
        info!(supi, amf = %registration.amf_instance_id, "AMF registered for UE");
    }

    Ok(Json(json!({
        "registrationId": record.registration_id,
        "amfInstanceId": registration.amf_instance_id,
        "deregCallbackUri": registration.dereg_callback_uri,
        "timestamp": OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .map_err(HttpError::internal().err())?,
    })))
}

async fn get_amf_registration(
    State(state): State<UdmState>,
    Path(supi): Path<String>,
) -> Result<Json<AmfRegistration>, HttpError> {
    state
        .amf_registrations
        .lock()
        .get(&supi)
        .map(|record| Json(record.registration.clone()))
        .ok_or_else(|| HttpError::not_found().msg("AMF registration not found"))
}

/// Merge-patch of the stored registration's known fields.
async fn update_amf_registration(
    State(state): State<UdmState>,
    Path(supi): Path<String>,
    Json(update): Json<Value>,
) -> Result<Json<Value>, HttpError> {
    let patch = update
        .as_object()
        .ok_or_else(|| HttpError::bad_request().msg("patch body must be a JSON object"))?
        .clone();

    let mut registrations = state.amf_registrations.lock();
    let record = registrations
        .get_mut(&supi)
        .ok_or_else(|| HttpError::not_found().msg("AMF registration not found"))?;

    let mut as_value =
        serde_json::to_value(&record.registration).map_err(HttpError::internal().err())?;
    if let Some(object) = as_value.as_object_mut() {
        for (key, value) in patch {
            object.insert(key, value);
        }
    }

    record.registration =
        serde_json::from_value(as_value).map_err(HttpError::bad_request().with_msg("invalid field value").err())?;

    Ok(Json(json!({ "message": "AMF registration updated successfully" })))
}

async fn amf_deregistration(State(state): State<UdmState>, Path(supi): Path<String>) -> Json<Value> {
    if state.amf_registrations.lock().remove(&supi).is_some() {
        info!(supi, "AMF deregistered for UE");
    }

    Json(json!({ "message": "AMF deregistration successful" }))
}

// ----- Nudm_SDM -----

#[derive(Deserialize)]
struct SdmQuery {
    #[serde(default)]
    dnn: Option<String>,
    #[serde(default, rename = "plmn-id")]
    _plmn_id: Option<String>,
}

async fn get_am_data(
    State(state): State<UdmState>,
    Path(supi): Path<String>,
) -> Result<Json<Value>, HttpError> {
    state
        .am_data
        .lock()
        .get(&supi)
        .cloned()
        .map(Json)
        .ok_or_else(|| HttpError::not_found().msg("subscription data not found"))
}

async fn get_sm_data(
    State(state): State<UdmState>,
    Path(supi): Path<String>,
    Query(query): Query<SdmQuery>,
) -> Result<Json<Value>, HttpError> {
    let sm_data = state
        .sm_data
        .lock()
        .get(&supi)
        .cloned()
        .ok_or_else(|| HttpError::not_found().msg("SM subscription data not found"))?;

    let Some(dnn) = query.dnn else {
        return Ok(Json(sm_data));
    };

    if dnn.is_empty() {
        return Err(HttpError::bad_request().msg("dnn must not be empty"));
    }

    let configuration = sm_data
        .get("dnnConfigurations")
        .and_then(|configurations| configurations.get(&dnn))
        .cloned()
        .ok_or_else(|| HttpError::not_found().msg("DNN not found"))?;

    Ok(Json(json!({
        "singleNssai": sm_data.get("singleNssai"),
        "dnnConfigurations": { dnn: configuration },
    })))
}

async fn get_nssai(
    State(state): State<UdmState>,
    Path(supi): Path<String>,
) -> Result<Json<Value>, HttpError> {
    let am_data = state
        .am_data
        .lock()
        .get(&supi)
        .cloned()
        .ok_or_else(|| HttpError::not_found().msg("subscription data not found"))?;

    am_data
        .get("nssai")
        .cloned()
        .map(Json)
        .ok_or_else(|| HttpError::not_found().msg("NSSAI data not found"))
}

// ----- Nudm_UEAU -----

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateAuthDataRequest {
    serving_network_name: String,
    #[serde(default)]
    ausf_instance_id: Option<String>,
}

async fn generate_auth_data(
    State(state): State<UdmState>,
    Path(supi): Path<String>,
    Json(request): Json<GenerateAuthDataRequest>,
) -> Result<Json<Value>, HttpError> {
    let vector = state
        .generate_auth_vector(&supi, &request.serving_network_name)
        .ok_or_else(|| HttpError::not_found().msg("authentication subscription not found"))?;

    let event = AuthEvent {
        nf_instance_id: request.ausf_instance_id.unwrap_or_default(),
        success: true,
        time_stamp: OffsetDateTime::now_utc(),
        auth_type: "5G_AKA".to_owned(),
        serving_network_name: request.serving_network_name,
    };
    state.auth_events.lock().entry(supi.clone()).or_default().push(event);

    info!(supi, "Authentication data generated");

    Ok(Json(json!({
        "authenticationVector": vector,
        "supi": supi,
    })))
}

// ----- Health & monitoring -----

async fn health(State(state): State<UdmState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "UDM",
        "version": env!("CARGO_PKG_VERSION"),
        "registered_ues": state.amf_registrations.lock().len(),
    }))
}

async fn metrics(State(state): State<UdmState>) -> Json<Value> {
    let total_auth_events: usize = state.auth_events.lock().values().map(Vec::len).sum();

    Json(json!({
        "total_amf_registrations": state.amf_registrations.lock().len(),
        "total_authentication_events": total_auth_events,
        "subscription_data_entries": state.am_data.lock().len() + state.sm_data.lock().len(),
    }))
}
