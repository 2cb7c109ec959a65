//! User-plane (UPF): PFCP session store, UE address pools, GTP-U packet
//! bookkeeping and QoS enforcement.
//!
//! The data path is simulated: packets are JSON descriptions and
//! "forwarding" is counter updates, but the PFCP rule store, the address
//! pools and the token-bucket/priority scheduling behave like the real
//! thing.

pub mod api;
pub mod pool;
pub mod qos;

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context as _;
use parking_lot::Mutex;
use sba_task::{NfTask, Shutdown, TaskSet};
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::client::Sbi;
use crate::config::{self, Conf, UpfPoolConf};
use crate::pfcp::{
    self, AllocatedUeIpAddresses, CreateFar, CreatePdr, CreateQer, CreateUrr, CreatedPdr, LoadControlInformation,
    SessionEstablishmentRequest, SessionEstablishmentResponse, SessionModificationRequest, UpfSeid,
};
use crate::service::{self, Registration};
use crate::types::{NfProfile, NfType};
use pool::{Ipv4Pool, Ipv6Pool};
use qos::{PriorityQueues, QueuedPacket, TokenBucket};

/// N3 endpoint this UPF advertises for GTP-U tunnels.
pub const N3_ENDPOINT: &str = "192.168.200.10:2152";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Uplink,
    Downlink,
}

impl Direction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Direction::Uplink => "uplink",
            Direction::Downlink => "downlink",
        }
    }
}

impl FromStr for Direction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uplink" => Ok(Direction::Uplink),
            "downlink" => Ok(Direction::Downlink),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TrafficStats {
    pub packets_ul: u64,
    pub packets_dl: u64,
    pub bytes_ul: u64,
    pub bytes_dl: u64,
    pub dropped_packets_ul: u64,
    pub dropped_packets_dl: u64,
}

impl TrafficStats {
    fn record(&mut self, direction: Direction, bytes: u64) {
        match direction {
            Direction::Uplink => {
                self.packets_ul += 1;
                self.bytes_ul += bytes;
            }
            Direction::Downlink => {
                self.packets_dl += 1;
                self.bytes_dl += bytes;
            }
        }
    }

    fn record_drop(&mut self, direction: Direction) {
        match direction {
            Direction::Uplink => self.dropped_packets_ul += 1,
            Direction::Downlink => self.dropped_packets_dl += 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GtpTunnel {
    pub tunnel_id: String,
    /// Owning PFCP session; QoS lookup resolves QERs through it.
    pub upf_seid: String,
    pub local_teid: String,
    pub local_ipv4: Option<String>,
    pub remote_teid: Option<String>,
    pub remote_ipv4: Option<String>,
    pub state: &'static str,
    pub stats: TrafficStats,
    pub created_at: OffsetDateTime,
    pub last_activity: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct PfcpSession {
    pub upf_seid: String,
    pub smf_seid: String,
    pub node_id: Option<String>,
    pub allocated_ips: AllocatedUeIpAddresses,
    pub pdrs: BTreeMap<u32, CreatePdr>,
    pub fars: BTreeMap<u32, CreateFar>,
    pub qers: BTreeMap<u32, CreateQer>,
    pub urrs: BTreeMap<u32, CreateUrr>,
    pub tunnels: Vec<String>,
    pub created_at: OffsetDateTime,
    pub last_modified: OffsetDateTime,
}

#[derive(Debug)]
pub enum EstablishError {
    /// The requested address family ran out of addresses.
    PoolExhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketOutcome {
    Forwarded,
    Dropped,
}

#[derive(Clone)]
pub struct UpfState {
    pub instance_id: Uuid,
    pub node_id: String,
    pub sessions: Arc<Mutex<HashMap<String, PfcpSession>>>,
    pub tunnels: Arc<Mutex<HashMap<String, GtpTunnel>>>,
    pub session_stats: Arc<Mutex<HashMap<String, TrafficStats>>>,
    pub ipv4_pool: Arc<Mutex<Ipv4Pool>>,
    pub ipv6_pool: Arc<Mutex<Ipv6Pool>>,
    pub buckets: Arc<Mutex<HashMap<(String, Direction), TokenBucket>>>,
    pub queues: Arc<Mutex<PriorityQueues>>,
}

impl UpfState {
    pub fn new(pools: &UpfPoolConf) -> anyhow::Result<Self> {
        Ok(UpfState {
            instance_id: Uuid::new_v4(),
            node_id: "upf.mnc001.mcc001.3gppnetwork.org".to_owned(),
            sessions: Arc::new(Mutex::new(HashMap::new())),
            tunnels: Arc::new(Mutex::new(HashMap::new())),
            session_stats: Arc::new(Mutex::new(HashMap::new())),
            ipv4_pool: Arc::new(Mutex::new(
                Ipv4Pool::new(&pools.ipv4_cidr).context("IPv4 pool")?,
            )),
            ipv6_pool: Arc::new(Mutex::new(
                Ipv6Pool::new(&pools.ipv6_cidr).context("IPv6 pool")?,
            )),
            buckets: Arc::new(Mutex::new(HashMap::new())),
            queues: Arc::new(Mutex::new(PriorityQueues::default())),
        })
    }

    /// PFCP Session Establishment: allocate addresses, record the rule set,
    /// create GTP tunnels for F-TEID-bearing PDRs, arm the QoS buckets.
    pub fn establish_session(
        &self,
        request: &SessionEstablishmentRequest,
    ) -> Result<SessionEstablishmentResponse, EstablishError> {
        let pdn_type = request.pdn_type.as_deref().unwrap_or("IPV4");

        let mut allocated_ips = AllocatedUeIpAddresses {
            ipv4: None,
            ipv6: None,
            ipv6_prefix: None,
        };

        if matches!(pdn_type, "IPV4" | "IPV4V6") {
            let Some(addr) = self.ipv4_pool.lock().allocate() else {
                return Err(EstablishError::PoolExhausted);
            };
            allocated_ips.ipv4 = Some(addr.to_string());
        }

        if matches!(pdn_type, "IPV6" | "IPV4V6") {
            let Some(allocation) = self.ipv6_pool.lock().allocate() else {
                self.rollback_ips(&allocated_ips);
                return Err(EstablishError::PoolExhausted);
            };
            allocated_ips.ipv6 = Some(allocation.address.to_string());
            allocated_ips.ipv6_prefix = Some(allocation.prefix);
        }

        let upf_seid = Uuid::new_v4().to_string();
        let now = OffsetDateTime::now_utc();

        let mut session = PfcpSession {
            upf_seid: upf_seid.clone(),
            smf_seid: request.seid.clone(),
            node_id: request.node_id.clone(),
            allocated_ips: allocated_ips.clone(),
            pdrs: BTreeMap::new(),
            fars: BTreeMap::new(),
            qers: BTreeMap::new(),
            urrs: BTreeMap::new(),
            tunnels: Vec::new(),
            created_at: now,
            last_modified: now,
        };

        for far in &request.create_far {
            session.fars.insert(far.far_id, far.clone());
        }

        let mut new_tunnels = Vec::new();
        for pdr in &request.create_pdr {
            session.pdrs.insert(pdr.pdr_id, pdr.clone());

            let Some(f_teid) = pdr.pdi.f_teid.as_ref() else {
                continue;
            };

            // The companion FAR's outer header creation names the remote
            // tunnel endpoint.
            let far = pdr.far_id.and_then(|far_id| session.fars.get(&far_id));
            let outer = far
                .and_then(|far| far.forwarding_parameters.as_ref())
                .and_then(|params| params.outer_header_creation.as_ref());

            let tunnel_id = Uuid::new_v4().to_string();
            let tunnel = GtpTunnel {
                tunnel_id: tunnel_id.clone(),
                upf_seid: upf_seid.clone(),
                local_teid: f_teid.teid.clone(),
                local_ipv4: f_teid.ipv4_address.clone(),
                remote_teid: outer.and_then(|outer| outer.teid.clone()),
                remote_ipv4: outer.and_then(|outer| outer.ipv4_address.clone()),
                state: "ACTIVE",
                stats: TrafficStats::default(),
                created_at: now,
                last_activity: now,
            };

            session.tunnels.push(tunnel_id.clone());
            new_tunnels.push((tunnel_id, tunnel));
        }

        if let Some(qers) = request.create_qer.as_deref() {
            let mut buckets = self.buckets.lock();
            let bucket_now = Instant::now();

            for qer in qers {
                session.qers.insert(qer.qer_id, qer.clone());

                let Some(mbr) = qer.mbr else {
                    continue;
                };

                for (tunnel_id, _) in &new_tunnels {
                    buckets.insert(
                        (tunnel_id.clone(), Direction::Uplink),
                        TokenBucket::from_mbr_bps(mbr.ul_mbr, bucket_now),
                    );
                    buckets.insert(
                        (tunnel_id.clone(), Direction::Downlink),
                        TokenBucket::from_mbr_bps(mbr.dl_mbr, bucket_now),
                    );
                }
            }
        }

        if let Some(urrs) = request.create_urr.as_deref() {
            for urr in urrs {
                session.urrs.insert(urr.urr_id, urr.clone());
            }
        }

        let created_pdr = request
            .create_pdr
            .iter()
            .map(|pdr| CreatedPdr { pdr_id: pdr.pdr_id })
            .collect();

        {
            let mut tunnels = self.tunnels.lock();
            for (tunnel_id, tunnel) in new_tunnels {
                tunnels.insert(tunnel_id, tunnel);
            }
        }
        self.session_stats.lock().insert(upf_seid.clone(), TrafficStats::default());
        self.sessions.lock().insert(upf_seid.clone(), session);

        info!(upf_seid, smf_seid = request.seid, "PFCP session established");

        Ok(SessionEstablishmentResponse {
            message_type: pfcp::message_type::SESSION_ESTABLISHMENT_RESPONSE,
            cause: pfcp::cause::REQUEST_ACCEPTED,
            up_f_seid: UpfSeid {
                seid: upf_seid,
                ipv4_address: Some("127.0.0.1".to_owned()),
                ipv6_address: None,
            },
            allocated_ue_ip_addresses: allocated_ips,
            created_pdr,
            n3_endpoint: Some(N3_ENDPOINT.to_owned()),
            load_control_information: Some(LoadControlInformation {
                load_control_sequence_number: 1,
                load_metric: 50,
            }),
        })
    }

    fn rollback_ips(&self, allocated: &AllocatedUeIpAddresses) {
        if let Some(addr) = allocated.ipv4.as_deref().and_then(|addr| addr.parse().ok()) {
            self.ipv4_pool.lock().release(addr);
        }
        if let Some(addr) = allocated.ipv6.as_deref().and_then(|addr| addr.parse().ok()) {
            self.ipv6_pool.lock().release(addr);
        }
    }

    /// PFCP Session Modification: apply the update arrays; MBR changes are
    /// reflected into the live token buckets.
    pub fn modify_session(
        &self,
        seid: &str,
        request: &SessionModificationRequest,
    ) -> Option<Vec<String>> {
        let mut sessions = self.sessions.lock();
        let session = sessions.get_mut(seid)?;

        let mut applied = Vec::new();

        for update in request.update_pdr.as_deref().unwrap_or_default() {
            if let Some(pdr) = session.pdrs.get_mut(&update.pdr_id) {
                if let Some(precedence) = update.precedence {
                    pdr.precedence = precedence;
                }
                if let Some(far_id) = update.far_id {
                    pdr.far_id = Some(far_id);
                }
                applied.push(format!("PDR {} updated", update.pdr_id));
            }
        }

        for update in request.update_far.as_deref().unwrap_or_default() {
            if let Some(far) = session.fars.get_mut(&update.far_id) {
                if let Some(action) = update.apply_action.clone() {
                    far.apply_action = action;
                }
                if let Some(params) = update.forwarding_parameters.clone() {
                    far.forwarding_parameters = Some(params);
                }
                applied.push(format!("FAR {} updated", update.far_id));
            }
        }

        for update in request.update_qer.as_deref().unwrap_or_default() {
            if let Some(qer) = session.qers.get_mut(&update.qer_id) {
                if let Some(qfi) = update.qfi {
                    qer.qfi = Some(qfi);
                }
                if let Some(gbr) = update.gbr {
                    qer.gbr = Some(gbr);
                }
                if let Some(mbr) = update.mbr {
                    qer.mbr = Some(mbr);

                    let mut buckets = self.buckets.lock();
                    for tunnel_id in &session.tunnels {
                        if let Some(bucket) = buckets.get_mut(&(tunnel_id.clone(), Direction::Uplink)) {
                            bucket.reconfigure(mbr.ul_mbr);
                        }
                        if let Some(bucket) = buckets.get_mut(&(tunnel_id.clone(), Direction::Downlink)) {
                            bucket.reconfigure(mbr.dl_mbr);
                        }
                    }
                }
                applied.push(format!("QER {} updated", update.qer_id));
            }
        }

        session.last_modified = OffsetDateTime::now_utc();

        Some(applied)
    }

    /// PFCP Session Deletion: release addresses, drop tunnels, buckets and
    /// statistics. Returns the final statistics snapshot.
    pub fn delete_session(&self, seid: &str) -> Option<TrafficStats> {
        let session = self.sessions.lock().remove(seid)?;

        if let Some(addr) = session.allocated_ips.ipv4.as_deref().and_then(|addr| addr.parse().ok()) {
            self.ipv4_pool.lock().release(addr);
        }
        if let Some(addr) = session.allocated_ips.ipv6.as_deref().and_then(|addr| addr.parse().ok()) {
            self.ipv6_pool.lock().release(addr);
        }

        {
            let mut tunnels = self.tunnels.lock();
            let mut buckets = self.buckets.lock();
            for tunnel_id in &session.tunnels {
                tunnels.remove(tunnel_id);
                buckets.remove(&(tunnel_id.clone(), Direction::Uplink));
                buckets.remove(&(tunnel_id.clone(), Direction::Downlink));
            }
        }

        let final_stats = self.session_stats.lock().remove(seid).unwrap_or_default();

        info!(upf_seid = seid, "PFCP session deleted");

        Some(final_stats)
    }

    /// GTP-U processing: counters, token-bucket policing, priority queueing.
    pub fn process_packet(
        &self,
        tunnel_id: &str,
        direction: Direction,
        payload_len: usize,
        now: Instant,
    ) -> Option<PacketOutcome> {
        let upf_seid = {
            let tunnels = self.tunnels.lock();
            tunnels.get(tunnel_id)?.upf_seid.clone()
        };

        let admitted = {
            let mut buckets = self.buckets.lock();
            match buckets.get_mut(&(tunnel_id.to_owned(), direction)) {
                Some(bucket) => bucket.try_consume(payload_len as u64, now),
                // No MBR configured: the bucket is bypassed.
                None => true,
            }
        };

        {
            let mut tunnels = self.tunnels.lock();
            if let Some(tunnel) = tunnels.get_mut(tunnel_id) {
                tunnel.last_activity = OffsetDateTime::now_utc();
                if admitted {
                    tunnel.stats.record(direction, payload_len as u64);
                } else {
                    tunnel.stats.record_drop(direction);
                }
            }
        }

        {
            let mut session_stats = self.session_stats.lock();
            if let Some(stats) = session_stats.get_mut(&upf_seid) {
                if admitted {
                    stats.record(direction, payload_len as u64);
                } else {
                    stats.record_drop(direction);
                }
            }
        }

        if !admitted {
            return Some(PacketOutcome::Dropped);
        }

        // Schedule: enqueue on the tunnel's priority, then serve the most
        // urgent queue.
        let priority = {
            let sessions = self.sessions.lock();
            sessions
                .get(&upf_seid)
                .and_then(|session| session.qers.values().find_map(|qer| qer.qfi))
                .map(qos::priority_for_5qi)
                .unwrap_or(90)
        };

        let mut queues = self.queues.lock();
        queues.enqueue(
            priority,
            QueuedPacket {
                tunnel_id: tunnel_id.to_owned(),
                size: payload_len,
            },
        );
        let _served = queues.drain_next();

        Some(PacketOutcome::Forwarded)
    }
}

/// Logs aggregate traffic statistics once a minute.
pub struct StatisticsTask {
    pub state: UpfState,
}

impl NfTask for StatisticsTask {
    const NAME: &'static str = "upf statistics";

    async fn run(self, mut shutdown: Shutdown) -> anyhow::Result<()> {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let total_sessions = self.state.sessions.lock().len();
                    let total_tunnels = self.state.tunnels.lock().len();
                    let (bytes_ul, bytes_dl) = {
                        let stats = self.state.session_stats.lock();
                        stats.values().fold((0u64, 0u64), |(ul, dl), s| (ul + s.bytes_ul, dl + s.bytes_dl))
                    };

                    info!(
                        sessions = total_sessions,
                        tunnels = total_tunnels,
                        bytes_ul,
                        bytes_dl,
                        "UPF statistics"
                    );
                }
                () = shutdown.requested() => break,
            }
        }

        Ok(())
    }
}

/// Every 30 s: warn about tunnels dropping more than 100 packets in the
/// window, then zero the drop counters.
pub struct QosMonitorTask {
    pub state: UpfState,
}

impl NfTask for QosMonitorTask {
    const NAME: &'static str = "upf qos monitor";

    async fn run(self, mut shutdown: Shutdown) -> anyhow::Result<()> {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(30));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let mut tunnels = self.state.tunnels.lock();
                    for tunnel in tunnels.values_mut() {
                        if tunnel.stats.dropped_packets_ul > 100 || tunnel.stats.dropped_packets_dl > 100 {
                            warn!(
                                tunnel_id = tunnel.tunnel_id,
                                dropped_ul = tunnel.stats.dropped_packets_ul,
                                dropped_dl = tunnel.stats.dropped_packets_dl,
                                "High packet drop rate on tunnel"
                            );
                        }

                        tunnel.stats.dropped_packets_ul = 0;
                        tunnel.stats.dropped_packets_dl = 0;
                    }
                }
                () = shutdown.requested() => break,
            }
        }

        Ok(())
    }
}

pub async fn run() -> anyhow::Result<()> {
    let conf = Conf::for_port(config::UPF_PORT)?;
    let _logger_guard = sba_log::init(&conf.log_filter)?;

    let pools = UpfPoolConf::from_env();
    let state = UpfState::new(&pools)?;
    info!(nf.instance_id = %state.instance_id, ipv4_pool = pools.ipv4_cidr, "UPF starting");

    let sbi = Arc::new(Sbi::new(conf.nrf_url.clone(), NfType::Upf));
    let profile = NfProfile::for_service(
        state.instance_id,
        NfType::Upf,
        "nupf-pdu-session",
        "127.0.0.1",
        conf.bind_addr.port(),
    );

    let mut tasks = TaskSet::new();
    tasks.spawn(StatisticsTask { state: state.clone() });
    tasks.spawn(QosMonitorTask { state: state.clone() });

    let router = api::make_router(state);

    service::serve(
        "sba-upf",
        conf.bind_addr,
        router,
        tasks,
        Some(Registration { sbi, profile }),
    )
    .await
}
