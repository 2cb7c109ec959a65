//! Auth server (AUSF): drives 5G-AKA as a two-step procedure.
//!
//! Step one creates an authentication context and hands the challenge to the
//! AMF; step two confirms the UE's RES* and, on success, derives KSEAF.
//! Vectors come from the UDM over N13; if the UDM is unreachable the AUSF
//! synthesizes a local vector with the same hash construction (test mode).

pub mod api;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::RngCore as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use time::OffsetDateTime;
use sba_task::TaskSet;
use uuid::Uuid;

use crate::client::Sbi;
use crate::config::{self, Conf};
use crate::service::{self, Registration};
use crate::types::{NfProfile, NfType};

/// 5G-AKA vector as sent to the AMF over N12.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AkaVector {
    pub rand: String,
    pub autn: String,
    pub hxresstar: String,
    pub kausf: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthStatus {
    Ongoing,
    Success,
    Failure,
}

#[derive(Debug, Clone)]
pub struct AuthCtx {
    pub supi: String,
    pub serving_network_name: String,
    pub vector: AkaVector,
    pub status: AuthStatus,
    /// Populated on SUCCESS only.
    pub kseaf: Option<String>,
    pub created_at: OffsetDateTime,
}

#[derive(Clone)]
pub struct AusfState {
    pub instance_id: Uuid,
    pub contexts: Arc<Mutex<HashMap<Uuid, AuthCtx>>>,
    pub sbi: Arc<Sbi>,
}

impl AusfState {
    pub fn new(sbi: Arc<Sbi>) -> Self {
        AusfState {
            instance_id: Uuid::new_v4(),
            contexts: Arc::new(Mutex::new(HashMap::new())),
            sbi,
        }
    }
}

/// Local 5G-AKA vector for when the UDM cannot be reached.
pub fn generate_local_vector(supi: &str) -> AkaVector {
    let mut rng = rand::thread_rng();

    let mut rand_bytes = [0u8; 16];
    rng.fill_bytes(&mut rand_bytes);
    let rand = hex::encode(rand_bytes);

    // AUTN = SQN ⊕ AK ‖ AMF ‖ MAC, with random stand-ins for the pieces.
    let mut sqn = [0u8; 6];
    rng.fill_bytes(&mut sqn);
    let mut mac = [0u8; 8];
    rng.fill_bytes(&mut mac);
    let autn = format!("{}8000{}", hex::encode(sqn), hex::encode(mac));

    let hxresstar = hex::encode(Sha256::digest(format!("{supi}{rand}{autn}")))[..16].to_owned();
    let kausf = hex::encode(Sha256::digest(format!("{supi}{rand}KAUSF")));

    AkaVector {
        rand,
        autn,
        hxresstar,
        kausf,
    }
}

/// KSEAF = H(KAUSF ‖ serving network name ‖ "KSEAF").
pub fn derive_kseaf(kausf: &str, serving_network_name: &str) -> String {
    hex::encode(Sha256::digest(format!("{kausf}{serving_network_name}KSEAF")))
}

pub async fn run() -> anyhow::Result<()> {
    let conf = Conf::for_port(config::AUSF_PORT)?;
    let _logger_guard = sba_log::init(&conf.log_filter)?;

    let sbi = Arc::new(Sbi::new(conf.nrf_url.clone(), NfType::Ausf));
    let state = AusfState::new(Arc::clone(&sbi));
    info!(nf.instance_id = %state.instance_id, "AUSF starting");

    let profile = NfProfile::for_service(
        state.instance_id,
        NfType::Ausf,
        "nausf-auth",
        "127.0.0.1",
        conf.bind_addr.port(),
    );

    let router = api::make_router(state);

    service::serve(
        "sba-ausf",
        conf.bind_addr,
        router,
        TaskSet::new(),
        Some(Registration { sbi, profile }),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kseaf_is_reproducible_from_kausf_and_snn() {
        let kausf = "aa".repeat(32);
        let snn = "5G:mnc001.mcc001.3gppnetwork.org";

        let expected = hex::encode(Sha256::digest(format!("{kausf}{snn}KSEAF")));
        assert_eq!(derive_kseaf(&kausf, snn), expected);
    }

    #[test]
    fn local_vector_has_protocol_shapes() {
        let vector = generate_local_vector("imsi-001010000000001");

        assert_eq!(vector.rand.len(), 32);
        assert_eq!(vector.autn.len(), 32);
        assert_eq!(vector.hxresstar.len(), 16);
        assert_eq!(vector.kausf.len(), 64);
        assert_eq!(&vector.autn[12..16], "8000");
    }
}
