use std::sync::atomic::Ordering;

use axum::extract::{Path, Query, Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use super::NrfState;
use crate::extract::{AccessClaims, Bearer};
use crate::http::HttpError;
use crate::token::{self, Claims};
use crate::types::{NfProfile, NfStatus, NfType, PlmnId, SearchResult, Snssai, SubscriptionData};

pub fn make_router(state: NrfState) -> Router {
    let protected = Router::new()
        .route(
            "/nnrf-nfm/v1/nf-instances/{nf_instance_id}",
            put(register_nf_instance)
                .get(get_nf_instance)
                .patch(update_nf_instance)
                .delete(deregister_nf_instance),
        )
        .route("/nnrf-nfm/v1/subscriptions", post(subscribe_status_changes))
        .route("/nnrf-disc/v1/nf-instances", get(search_nf_instances))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .merge(protected)
        .route("/oauth2/token", post(issue_token))
        .route("/register", post(legacy_register))
        .route("/discover/{nf_type}", get(legacy_discover))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Bearer-token gate for the management and discovery surfaces.
async fn require_token(
    State(state): State<NrfState>,
    bearer: Bearer,
    mut request: Request,
    next: Next,
) -> Result<Response, HttpError> {
    let claims: Claims = state
        .signer
        .verify(&bearer.0)
        .map_err(HttpError::unauthorized().with_msg("invalid or expired token").err())?;

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

// ----- Nnrf_NFManagement -----

async fn register_nf_instance(
    State(state): State<NrfState>,
    Path(nf_instance_id): Path<Uuid>,
    Json(mut profile): Json<NfProfile>,
) -> Result<Json<NfProfile>, HttpError> {
    if profile.nf_instance_id != nf_instance_id {
        return Err(HttpError::bad_request().msg("NF instance id mismatch between URL and profile"));
    }

    if profile.recovery_time.is_none() {
        profile.recovery_time = Some(OffsetDateTime::now_utc());
    }

    state.profiles.lock().insert(nf_instance_id, profile.clone());

    info!(nf.instance_id = %nf_instance_id, nf_type = %profile.nf_type, "NF instance registered");

    Ok(Json(profile))
}

async fn get_nf_instance(
    State(state): State<NrfState>,
    Path(nf_instance_id): Path<Uuid>,
) -> Result<Json<NfProfile>, HttpError> {
    state
        .profiles
        .lock()
        .get(&nf_instance_id)
        .cloned()
        .map(Json)
        .ok_or_else(|| HttpError::not_found().msg("NF instance not found"))
}

#[derive(Deserialize)]
struct PatchOperation {
    op: String,
    path: String,
    value: Value,
}

/// JSON-patch subset: `replace` of `/nfStatus` and `/load`.
async fn update_nf_instance(
    State(state): State<NrfState>,
    Path(nf_instance_id): Path<Uuid>,
    Json(operations): Json<Vec<PatchOperation>>,
) -> Result<Json<Value>, HttpError> {
    let mut profiles = state.profiles.lock();

    let profile = profiles
        .get_mut(&nf_instance_id)
        .ok_or_else(|| HttpError::not_found().msg("NF instance not found"))?;

    for operation in &operations {
        if operation.op != "replace" {
            continue;
        }

        match operation.path.as_str() {
            "/nfStatus" => {
                profile.nf_status = serde_json::from_value(operation.value.clone())
                    .map_err(HttpError::bad_request().with_msg("invalid nfStatus value").err())?;
            }
            "/load" => {
                profile.load = serde_json::from_value(operation.value.clone())
                    .map_err(HttpError::bad_request().with_msg("invalid load value").err())?;
            }
            _ => {}
        }
    }

    info!(nf.instance_id = %nf_instance_id, "NF instance updated");

    Ok(Json(json!({ "message": "NF instance updated successfully" })))
}

async fn deregister_nf_instance(
    State(state): State<NrfState>,
    Path(nf_instance_id): Path<Uuid>,
) -> Result<Json<Value>, HttpError> {
    if state.profiles.lock().remove(&nf_instance_id).is_none() {
        return Err(HttpError::not_found().msg("NF instance not found"));
    }

    info!(nf.instance_id = %nf_instance_id, "NF instance deregistered");

    Ok(Json(json!({ "message": "NF instance deregistered successfully" })))
}

async fn subscribe_status_changes(
    State(state): State<NrfState>,
    Json(mut subscription): Json<SubscriptionData>,
) -> Result<Json<SubscriptionData>, HttpError> {
    let subscription_id = Uuid::new_v4();
    subscription.subscription_id = Some(subscription_id);

    if subscription.validity_time.is_none() {
        subscription.validity_time = Some(OffsetDateTime::now_utc() + Duration::hours(24));
    }

    state.subscriptions.lock().insert(subscription_id, subscription.clone());

    info!(%subscription_id, "NF status subscription created");

    Ok(Json(subscription))
}

// ----- Nnrf_NFDiscovery -----

#[derive(Deserialize)]
struct DiscoveryQuery {
    #[serde(rename = "target-nf-type")]
    target_nf_type: Option<String>,
    #[serde(rename = "requester-nf-type")]
    requester_nf_type: Option<String>,
    /// Comma-separated service names.
    #[serde(rename = "service-names")]
    service_names: Option<String>,
    /// JSON array of S-NSSAIs.
    snssais: Option<String>,
    /// JSON array of PLMN ids.
    #[serde(rename = "plmn-list")]
    plmn_list: Option<String>,
    limit: Option<usize>,
}

async fn search_nf_instances(
    State(state): State<NrfState>,
    claims: AccessClaims,
    Query(query): Query<DiscoveryQuery>,
) -> Result<Json<SearchResult>, HttpError> {
    trace!(client = claims.0.sub, scope = claims.0.scope, "Discovery query");

    let target_nf_type = query
        .target_nf_type
        .as_deref()
        .map(str::parse::<NfType>)
        .transpose()
        .map_err(HttpError::bad_request().with_msg("unknown target-nf-type").err())?;

    let service_names: Option<Vec<&str>> = query
        .service_names
        .as_deref()
        .map(|names| names.split(',').map(str::trim).collect());

    let snssais: Option<Vec<Snssai>> = query
        .snssais
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(HttpError::bad_request().with_msg("snssais is not a valid S-NSSAI array").err())?;

    let plmn_list: Option<Vec<PlmnId>> = query
        .plmn_list
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(HttpError::bad_request().with_msg("plmn-list is not a valid PLMN array").err())?;

    let matches: Vec<NfProfile> = {
        let profiles = state.profiles.lock();

        let mut matches: Vec<NfProfile> = profiles
            .values()
            .filter(|profile| {
                profile_matches(
                    profile,
                    target_nf_type,
                    query.requester_nf_type.as_deref(),
                    service_names.as_deref(),
                    snssais.as_deref(),
                    plmn_list.as_deref(),
                )
            })
            .cloned()
            .collect();

        // Priority ascending, then capacity descending.
        matches.sort_by_key(|profile| (profile.priority.unwrap_or(0), core::cmp::Reverse(profile.capacity.unwrap_or(0))));

        matches
    };

    let matches = match query.limit {
        Some(limit) => matches.into_iter().take(limit).collect(),
        None => matches,
    };

    debug!(count = matches.len(), "NF discovery completed");

    let count = matches.len();

    Ok(Json(SearchResult {
        validity_period: Some(3600),
        nf_instances: matches,
        search_id: Some(Uuid::new_v4()),
        num_nf_inst_complete: Some(count),
        nrf_supported_features: Some("0x1f".to_owned()),
    }))
}

fn profile_matches(
    profile: &NfProfile,
    target_nf_type: Option<NfType>,
    requester_nf_type: Option<&str>,
    service_names: Option<&[&str]>,
    snssais: Option<&[Snssai]>,
    plmn_list: Option<&[PlmnId]>,
) -> bool {
    // Only registered and discoverable instances are returned.
    if profile.nf_status != NfStatus::Registered {
        return false;
    }

    if let Some(target) = target_nf_type {
        if profile.nf_type != target {
            return false;
        }
    }

    if let (Some(requester), Some(allowed)) = (requester_nf_type, profile.allowed_nf_types.as_deref()) {
        if !allowed.iter().any(|nf_type| nf_type == requester) {
            return false;
        }
    }

    if let Some(names) = service_names {
        let offered = profile.nf_services.as_deref().unwrap_or_default();
        if !offered.iter().any(|service| names.contains(&service.service_name.as_str())) {
            return false;
        }
    }

    if let (Some(wanted), Some(supported)) = (snssais, profile.s_nssais.as_deref()) {
        let intersects = wanted
            .iter()
            .any(|w| supported.iter().any(|s| s.sst == w.sst && s.sd == w.sd));
        if !intersects {
            return false;
        }
    }

    if let (Some(wanted), Some(served)) = (plmn_list, profile.plmn_list.as_deref()) {
        let intersects = wanted
            .iter()
            .any(|w| served.iter().any(|s| s.mcc == w.mcc && s.mnc == w.mnc));
        if !intersects {
            return false;
        }
    }

    true
}

// ----- OAuth2 (bootstrap: not itself token-gated) -----

#[derive(Deserialize)]
struct TokenRequest {
    grant_type: String,
    #[serde(default)]
    scope: Option<String>,
    /// Test hook; production clients leave it unset.
    #[serde(default)]
    validity_secs: Option<i64>,
}

#[derive(Serialize)]
struct OAuth2Token {
    access_token: String,
    token_type: &'static str,
    expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
}

async fn issue_token(
    State(state): State<NrfState>,
    Json(request): Json<TokenRequest>,
) -> Result<Json<OAuth2Token>, HttpError> {
    if request.grant_type != "client_credentials" {
        return Err(HttpError::bad_request().msg("unsupported grant type"));
    }

    let client_id = format!("nf-client-{}", &Uuid::new_v4().simple().to_string()[..8]);
    let validity_secs = request.validity_secs.unwrap_or(token::DEFAULT_VALIDITY_SECS);

    let access_token = state.signer.issue(&client_id, request.scope.as_deref(), validity_secs);
    state.issued_tokens.fetch_add(1, Ordering::Relaxed);

    info!(client_id, "Access token generated");

    Ok(Json(OAuth2Token {
        access_token,
        token_type: "bearer",
        expires_in: validity_secs,
        scope: request.scope,
    }))
}

// ----- Legacy surface (kept for old clients, routed to the modern store) -----

#[derive(Deserialize)]
struct LegacyRegistration {
    nf_type: String,
    ip: String,
    port: u16,
}

async fn legacy_register(
    State(state): State<NrfState>,
    Json(registration): Json<LegacyRegistration>,
) -> Result<Json<Value>, HttpError> {
    let nf_type: NfType = registration
        .nf_type
        .parse()
        .map_err(HttpError::bad_request().with_msg("unknown nf_type").err())?;

    let service_name = format!("n{}-service", registration.nf_type.to_lowercase());
    let profile = NfProfile::for_service(
        Uuid::new_v4(),
        nf_type,
        &service_name,
        &registration.ip,
        registration.port,
    );

    state.profiles.lock().insert(profile.nf_instance_id, profile);

    info!(nf_type = %nf_type, "legacy NF registration stored");

    Ok(Json(json!({
        "message": format!("{} registered successfully", registration.nf_type)
    })))
}

async fn legacy_discover(State(state): State<NrfState>, Path(nf_type): Path<String>) -> Json<Value> {
    let wanted = nf_type.parse::<NfType>().ok();

    let profiles = state.profiles.lock();
    let found = profiles.values().find(|profile| Some(profile.nf_type) == wanted);

    match found.and_then(|profile| {
        let endpoint = profile.nf_services.as_deref()?.first()?.ip_end_points.as_deref()?.first()?;
        Some((endpoint.ipv4_address.clone()?, endpoint.port?))
    }) {
        Some((ip, port)) => Json(json!({ "nf_type": nf_type, "ip": ip, "port": port })),
        None => Json(json!({ "message": format!("{nf_type} not found") })),
    }
}

// ----- Health & monitoring -----

async fn health(State(state): State<NrfState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "NRF",
        "version": env!("CARGO_PKG_VERSION"),
        "registered_nfs": state.profiles.lock().len(),
        "active_subscriptions": state.subscriptions.lock().len(),
    }))
}

async fn metrics(State(state): State<NrfState>) -> Json<Value> {
    let mut nf_counts_by_type = std::collections::HashMap::<&'static str, usize>::new();
    for profile in state.profiles.lock().values() {
        *nf_counts_by_type.entry(profile.nf_type.as_str()).or_default() += 1;
    }

    Json(json!({
        "total_registered_nfs": state.profiles.lock().len(),
        "nf_counts_by_type": nf_counts_by_type,
        "active_subscriptions": state.subscriptions.lock().len(),
        "issued_tokens": state.issued_tokens.load(Ordering::Relaxed),
    }))
}
