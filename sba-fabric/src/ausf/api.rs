use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{AkaVector, AusfState, AuthCtx, AuthStatus};
use crate::http::HttpError;
use crate::types::{NfType, supi_from_suci};
use crate::udm::AuthVector;

pub fn make_router(state: AusfState) -> Router {
    Router::new()
        .route("/nausf-auth/v1/ue-authentications", post(ue_authentications))
        .route(
            "/nausf-auth/v1/ue-authentications/{auth_ctx_id}",
            get(get_authentication_context).delete(delete_authentication_context),
        )
        .route(
            "/nausf-auth/v1/ue-authentications/{auth_ctx_id}/5g-aka-confirmation",
            axum::routing::put(aka_confirmation),
        )
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthenticationRequest {
    supi_or_suci: String,
    serving_network_name: String,
    #[serde(default)]
    resynchronization_info: Option<Value>,
}

#[derive(Serialize)]
struct AuthenticationInfoResult {
    #[serde(rename = "authType")]
    auth_type: &'static str,
    #[serde(rename = "authenticationVector")]
    authentication_vector: AkaVector,
    supi: String,
    #[serde(rename = "_links")]
    links: Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UdmAuthDataRequest<'a> {
    supi: &'a str,
    serving_network_name: &'a str,
    ausf_instance_id: Uuid,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UdmAuthDataResponse {
    authentication_vector: AuthVector,
}

async fn ue_authentications(
    State(state): State<AusfState>,
    Json(request): Json<AuthenticationRequest>,
) -> Result<Json<AuthenticationInfoResult>, HttpError> {
    let supi = supi_from_suci(&request.supi_or_suci);

    if request.resynchronization_info.is_some() {
        debug!(supi, "Resynchronization info ignored (no SQN management in this emulator)");
    }

    let vector = match vector_from_udm(&state, &supi, &request.serving_network_name).await {
        Ok(vector) => vector,
        Err(error) => {
            info!(%error, supi, "UDM unreachable, generating local 5G-AKA vector");
            super::generate_local_vector(&supi)
        }
    };

    let auth_ctx_id = Uuid::new_v4();
    let context = AuthCtx {
        supi: supi.clone(),
        serving_network_name: request.serving_network_name,
        vector: vector.clone(),
        status: AuthStatus::Ongoing,
        kseaf: None,
        created_at: OffsetDateTime::now_utc(),
    };
    state.contexts.lock().insert(auth_ctx_id, context);

    info!(supi, %auth_ctx_id, "5G-AKA authentication challenge issued");

    Ok(Json(AuthenticationInfoResult {
        auth_type: "5G_AKA",
        authentication_vector: vector,
        supi,
        links: json!({
            "5g-aka": {
                "href": format!("/nausf-auth/v1/ue-authentications/{auth_ctx_id}/5g-aka-confirmation")
            }
        }),
    }))
}

/// N13 vector fetch. The UDM derives the expected response; its XRES is the
/// value the UE's RES* is checked against in this emulator.
async fn vector_from_udm(
    state: &AusfState,
    supi: &str,
    serving_network_name: &str,
) -> Result<AkaVector, crate::client::SbiError> {
    let udm_url = state.sbi.peer(NfType::Udm).await?;

    let request = UdmAuthDataRequest {
        supi,
        serving_network_name,
        ausf_instance_id: state.instance_id,
    };

    let response: UdmAuthDataResponse = state
        .sbi
        .post_json(
            &format!("{udm_url}/nudm-ueau/v1/{supi}/security-information/generate-auth-data"),
            &request,
        )
        .await?;

    let AuthVector { rand, xres, autn, kausf } = response.authentication_vector;

    Ok(AkaVector {
        rand,
        autn,
        hxresstar: xres,
        kausf,
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmationData {
    res_star: String,
}

#[derive(Serialize)]
struct ConfirmationDataResponse {
    #[serde(rename = "authResult")]
    auth_result: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    supi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kseaf: Option<String>,
    #[serde(rename = "authenticationVector", skip_serializing_if = "Option::is_none")]
    authentication_vector: Option<AkaVector>,
}

/// Protocol-level outcome: both success and failure are HTTP 200; only an
/// unknown context id is an HTTP error.
async fn aka_confirmation(
    State(state): State<AusfState>,
    Path(auth_ctx_id): Path<Uuid>,
    Json(confirmation): Json<ConfirmationData>,
) -> Result<Json<ConfirmationDataResponse>, HttpError> {
    let mut contexts = state.contexts.lock();

    let context = contexts
        .get_mut(&auth_ctx_id)
        .ok_or_else(|| HttpError::not_found().msg("authentication context not found"))?;

    // Terminal contexts never change status; replay the recorded outcome.
    let verdict = match context.status {
        AuthStatus::Ongoing => {
            if confirmation.res_star == context.vector.hxresstar {
                context.status = AuthStatus::Success;
                context.kseaf = Some(super::derive_kseaf(
                    &context.vector.kausf,
                    &context.serving_network_name,
                ));
                true
            } else {
                context.status = AuthStatus::Failure;
                false
            }
        }
        AuthStatus::Success => true,
        AuthStatus::Failure => false,
    };

    if verdict {
        info!(supi = context.supi, %auth_ctx_id, "5G-AKA authentication succeeded");

        Ok(Json(ConfirmationDataResponse {
            auth_result: "AUTHENTICATION_SUCCESS",
            supi: Some(context.supi.clone()),
            kseaf: context.kseaf.clone(),
            authentication_vector: Some(context.vector.clone()),
        }))
    } else {
        warn!(supi = context.supi, %auth_ctx_id, "5G-AKA authentication failed");

        Ok(Json(ConfirmationDataResponse {
            auth_result: "AUTHENTICATION_FAILURE",
            supi: None,
            kseaf: None,
            authentication_vector: None,
        }))
    }
}

async fn get_authentication_context(
    State(state): State<AusfState>,
    Path(auth_ctx_id): Path<Uuid>,
) -> Result<Json<Value>, HttpError> {
    let contexts = state.contexts.lock();

    let context = contexts
        .get(&auth_ctx_id)
        .ok_or_else(|| HttpError::not_found().msg("authentication context not found"))?;

    Ok(Json(json!({
        "authCtxId": auth_ctx_id,
        "authType": "5G_AKA",
        "status": context.status,
        "supi": context.supi,
        "timestamp": context.created_at
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default(),
    })))
}

async fn delete_authentication_context(
    State(state): State<AusfState>,
    Path(auth_ctx_id): Path<Uuid>,
) -> Result<Json<Value>, HttpError> {
    if state.contexts.lock().remove(&auth_ctx_id).is_none() {
        return Err(HttpError::not_found().msg("authentication context not found"));
    }

    Ok(Json(json!({ "message": "Authentication context deleted" })))
}

async fn health(State(state): State<AusfState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "AUSF",
        "version": env!("CARGO_PKG_VERSION"),
        "active_contexts": state.contexts.lock().len(),
    }))
}

async fn metrics(State(state): State<AusfState>) -> Json<Value> {
    let contexts = state.contexts.lock();
    let total = contexts.len();
    let successful = contexts.values().filter(|ctx| ctx.status == AuthStatus::Success).count();
    let failed = contexts.values().filter(|ctx| ctx.status == AuthStatus::Failure).count();

    Json(json!({
        "total_authentication_contexts": total,
        "successful_authentications": successful,
        "failed_authentications": failed,
    }))
}
