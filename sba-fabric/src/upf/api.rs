use std::time::Instant;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{Direction, PacketOutcome, UpfState};
use crate::http::HttpError;
use crate::pfcp::{
    self, Mbr, SessionDeletionResponse, SessionEstablishmentRequest, SessionEstablishmentResponse,
    SessionModificationRequest, SessionModificationResponse,
};

pub fn make_router(state: UpfState) -> Router {
    Router::new()
        .route("/pfcp/v1/sessions", post(pfcp_session_establishment))
        .route(
            "/pfcp/v1/sessions/{seid}",
            axum::routing::patch(pfcp_session_modification).delete(pfcp_session_deletion),
        )
        .route("/gtp-u/process-packet", post(process_gtp_packet))
        .route("/ipv6/allocate-prefix", post(allocate_ipv6_prefix))
        .route("/qos/parameters", get(get_qos_parameters))
        .route("/qos/update", post(update_qos_parameters))
        .route("/upf/status", get(status))
        .route("/upf/statistics", get(statistics))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
}

// ----- PFCP (N4) -----

async fn pfcp_session_establishment(
    State(state): State<UpfState>,
    Json(request): Json<SessionEstablishmentRequest>,
) -> Result<Json<SessionEstablishmentResponse>, HttpError> {
    if request.create_pdr.is_empty() {
        return Err(HttpError::bad_request().msg("at least one PDR is mandatory"));
    }

    match state.establish_session(&request) {
        Ok(response) => Ok(Json(response)),
        Err(super::EstablishError::PoolExhausted) => {
            Err(HttpError::resource_exhausted().msg("UE IP pool exhausted"))
        }
    }
}

async fn pfcp_session_modification(
    State(state): State<UpfState>,
    Path(seid): Path<String>,
    Json(request): Json<SessionModificationRequest>,
) -> Result<Json<SessionModificationResponse>, HttpError> {
    let applied = state
        .modify_session(&seid, &request)
        .ok_or_else(|| HttpError::not_found().msg("PFCP session not found"))?;

    info!(upf_seid = seid, modifications = applied.len(), "PFCP session modified");

    Ok(Json(SessionModificationResponse {
        message_type: pfcp::message_type::SESSION_MODIFICATION_RESPONSE,
        cause: pfcp::cause::REQUEST_ACCEPTED,
        modifications_applied: applied,
    }))
}

async fn pfcp_session_deletion(
    State(state): State<UpfState>,
    Path(seid): Path<String>,
) -> Result<Json<SessionDeletionResponse>, HttpError> {
    let final_stats = state
        .delete_session(&seid)
        .ok_or_else(|| HttpError::not_found().msg("PFCP session not found"))?;

    Ok(Json(SessionDeletionResponse {
        message_type: pfcp::message_type::SESSION_DELETION_RESPONSE,
        cause: pfcp::cause::REQUEST_ACCEPTED,
        final_statistics: serde_json::to_value(final_stats).ok(),
    }))
}

// ----- GTP-U -----

#[derive(Deserialize)]
struct GtpHeader {
    #[allow(dead_code)]
    teid: String,
    #[allow(dead_code)]
    #[serde(default)]
    length: Option<u32>,
    #[allow(dead_code)]
    #[serde(default)]
    sequence_number: Option<u32>,
}

#[derive(Deserialize)]
struct GtpPacketRequest {
    tunnel_id: String,
    #[serde(default = "uplink")]
    direction: String,
    #[allow(dead_code)]
    header: GtpHeader,
    payload: String,
}

fn uplink() -> String {
    "uplink".to_owned()
}

#[derive(Serialize)]
struct GtpPacketResponse {
    status: &'static str,
    tunnel_id: String,
    direction: String,
    processed: bool,
}

async fn process_gtp_packet(
    State(state): State<UpfState>,
    Json(packet): Json<GtpPacketRequest>,
) -> Result<Json<GtpPacketResponse>, HttpError> {
    let direction: Direction = packet
        .direction
        .parse()
        .map_err(|()| HttpError::bad_request().msg("direction must be uplink or downlink"))?;

    let outcome = state
        .process_packet(&packet.tunnel_id, direction, packet.payload.len(), Instant::now())
        .ok_or_else(|| HttpError::not_found().msg("GTP tunnel not found"))?;

    let forwarded = outcome == PacketOutcome::Forwarded;

    Ok(Json(GtpPacketResponse {
        status: if forwarded { "SUCCESS" } else { "DROPPED" },
        tunnel_id: packet.tunnel_id,
        direction: packet.direction,
        processed: forwarded,
    }))
}

// ----- IPv6 -----

#[derive(Deserialize)]
struct Ipv6PrefixRequest {
    #[serde(default)]
    ue_id: Option<String>,
    #[allow(dead_code)]
    #[serde(default)]
    prefix_length: Option<u8>,
}

async fn allocate_ipv6_prefix(
    State(state): State<UpfState>,
    Json(request): Json<Ipv6PrefixRequest>,
) -> Result<Json<Value>, HttpError> {
    let allocation = state
        .ipv6_pool
        .lock()
        .allocate()
        .ok_or_else(|| HttpError::resource_exhausted().msg("no IPv6 addresses available"))?;

    Ok(Json(json!({
        "status": "SUCCESS",
        "ue_id": request.ue_id,
        "allocated_prefix": allocation.prefix,
        "allocated_address": allocation.address.to_string(),
    })))
}

// ----- QoS management -----

async fn get_qos_parameters(State(state): State<UpfState>) -> Json<Value> {
    let sessions = state.sessions.lock();

    let mut parameters = serde_json::Map::new();
    for session in sessions.values() {
        for qer in session.qers.values() {
            parameters.insert(
                format!("{}_{}", session.upf_seid, qer.qer_id),
                json!({
                    "qfi": qer.qfi,
                    "maximum_bitrate_ul": qer.mbr.map(|mbr| mbr.ul_mbr),
                    "maximum_bitrate_dl": qer.mbr.map(|mbr| mbr.dl_mbr),
                    "guaranteed_bitrate_ul": qer.gbr.map(|gbr| gbr.ul_gbr),
                    "guaranteed_bitrate_dl": qer.gbr.map(|gbr| gbr.dl_gbr),
                }),
            );
        }
    }

    Json(json!({
        "total_qos_rules": parameters.len(),
        "qos_parameters": parameters,
    }))
}

#[derive(Deserialize)]
struct QosUpdateRequest {
    session_id: String,
    qer_id: u32,
    qos_parameters: QosParameterPatch,
}

#[derive(Deserialize)]
struct QosParameterPatch {
    #[serde(default)]
    maximum_bitrate_ul: Option<u64>,
    #[serde(default)]
    maximum_bitrate_dl: Option<u64>,
}

async fn update_qos_parameters(
    State(state): State<UpfState>,
    Json(update): Json<QosUpdateRequest>,
) -> Result<Json<Value>, HttpError> {
    let (tunnel_ids, mbr) = {
        let mut sessions = state.sessions.lock();
        let session = sessions
            .get_mut(&update.session_id)
            .ok_or_else(|| HttpError::not_found().msg("QoS rule not found"))?;

        let qer = session
            .qers
            .get_mut(&update.qer_id)
            .ok_or_else(|| HttpError::not_found().msg("QoS rule not found"))?;

        let current = qer.mbr.unwrap_or(Mbr { ul_mbr: 0, dl_mbr: 0 });
        let mbr = Mbr {
            ul_mbr: update.qos_parameters.maximum_bitrate_ul.unwrap_or(current.ul_mbr),
            dl_mbr: update.qos_parameters.maximum_bitrate_dl.unwrap_or(current.dl_mbr),
        };
        qer.mbr = Some(mbr);

        (session.tunnels.clone(), mbr)
    };
    let mut buckets = state.buckets.lock();
    for tunnel_id in &tunnel_ids {
        if let Some(bucket) = buckets.get_mut(&(tunnel_id.clone(), Direction::Uplink)) {
            bucket.reconfigure(mbr.ul_mbr);
        }
        if let Some(bucket) = buckets.get_mut(&(tunnel_id.clone(), Direction::Downlink)) {
            bucket.reconfigure(mbr.dl_mbr);
        }
    }

    info!(
        session_id = update.session_id,
        qer_id = update.qer_id,
        "QoS parameters updated"
    );

    Ok(Json(json!({
        "status": "SUCCESS",
        "qos_key": format!("{}_{}", update.session_id, update.qer_id),
    })))
}

// ----- Health & monitoring -----

async fn status(State(state): State<UpfState>) -> Json<Value> {
    Json(json!({
        "status": "operational",
        "active_sessions": state.sessions.lock().len(),
        "active_gtp_tunnels": state.tunnels.lock().len(),
        "allocated_ipv4_addresses": state.ipv4_pool.lock().allocated_count(),
        "allocated_ipv6_addresses": state.ipv6_pool.lock().allocated_count(),
        "queued_packets": state.queues.lock().depth(),
        "ipv4_pool": state.ipv4_pool.lock().cidr(),
        "ipv6_pool": state.ipv6_pool.lock().cidr(),
    }))
}

async fn statistics(State(state): State<UpfState>) -> Json<Value> {
    let session_stats = state.session_stats.lock();

    let mut totals = super::TrafficStats::default();
    for stats in session_stats.values() {
        totals.packets_ul += stats.packets_ul;
        totals.packets_dl += stats.packets_dl;
        totals.bytes_ul += stats.bytes_ul;
        totals.bytes_dl += stats.bytes_dl;
        totals.dropped_packets_ul += stats.dropped_packets_ul;
        totals.dropped_packets_dl += stats.dropped_packets_dl;
    }

    Json(json!({
        "total_sessions": session_stats.len(),
        "total_packets_ul": totals.packets_ul,
        "total_packets_dl": totals.packets_dl,
        "total_bytes_ul": totals.bytes_ul,
        "total_bytes_dl": totals.bytes_dl,
        "total_dropped_ul": totals.dropped_packets_ul,
        "total_dropped_dl": totals.dropped_packets_dl,
        "session_statistics": *session_stats,
    }))
}

async fn health(State(state): State<UpfState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "UPF",
        "version": env!("CARGO_PKG_VERSION"),
        "features": ["IPv6", "Advanced QoS", "GTP-U bookkeeping"],
        "active_sessions": state.sessions.lock().len(),
    }))
}

async fn metrics(State(state): State<UpfState>) -> Json<Value> {
    Json(json!({
        "active_sessions": state.sessions.lock().len(),
        "active_tunnels": state.tunnels.lock().len(),
        "allocated_ipv4": state.ipv4_pool.lock().allocated_count(),
        "allocated_ipv6": state.ipv6_pool.lock().allocated_count(),
        "queued_packets": state.queues.lock().depth(),
    }))
}
