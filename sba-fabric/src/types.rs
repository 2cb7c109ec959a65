//! SBI payload types shared across network functions.
//!
//! The shapes follow TS 29.510 naming (camelCase on the wire) but only carry
//! the fields this fabric actually reads. NF-specific info blocks
//! (`amfInfo`, `upfInfo`, …) are kept as opaque JSON so registration
//! payloads round-trip untouched.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NfType {
    Nrf,
    Udm,
    Amf,
    Smf,
    Ausf,
    Nef,
    Pcf,
    Smsf,
    Nssf,
    Udr,
    Lmf,
    Gmlc,
    Upf,
    N3iwf,
    Af,
    Udsf,
    Bsf,
    Chf,
    // RAN nodes are not NFs in TS 29.510, but the fabric routes their
    // addressability through the same registry.
    Gnb,
    GnbCu,
    GnbDu,
}

impl NfType {
    pub const fn as_str(self) -> &'static str {
        match self {
            NfType::Nrf => "NRF",
            NfType::Udm => "UDM",
            NfType::Amf => "AMF",
            NfType::Smf => "SMF",
            NfType::Ausf => "AUSF",
            NfType::Nef => "NEF",
            NfType::Pcf => "PCF",
            NfType::Smsf => "SMSF",
            NfType::Nssf => "NSSF",
            NfType::Udr => "UDR",
            NfType::Lmf => "LMF",
            NfType::Gmlc => "GMLC",
            NfType::Upf => "UPF",
            NfType::N3iwf => "N3IWF",
            NfType::Af => "AF",
            NfType::Udsf => "UDSF",
            NfType::Bsf => "BSF",
            NfType::Chf => "CHF",
            NfType::Gnb => "gNodeB",
            NfType::GnbCu => "gNB-CU",
            NfType::GnbDu => "gNB-DU",
        }
    }
}

impl FromStr for NfType {
    type Err = UnknownNfType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NRF" => Ok(NfType::Nrf),
            "UDM" => Ok(NfType::Udm),
            "AMF" => Ok(NfType::Amf),
            "SMF" => Ok(NfType::Smf),
            "AUSF" => Ok(NfType::Ausf),
            "NEF" => Ok(NfType::Nef),
            "PCF" => Ok(NfType::Pcf),
            "SMSF" => Ok(NfType::Smsf),
            "NSSF" => Ok(NfType::Nssf),
            "UDR" => Ok(NfType::Udr),
            "LMF" => Ok(NfType::Lmf),
            "GMLC" => Ok(NfType::Gmlc),
            "UPF" => Ok(NfType::Upf),
            "N3IWF" => Ok(NfType::N3iwf),
            "AF" => Ok(NfType::Af),
            "UDSF" => Ok(NfType::Udsf),
            "BSF" => Ok(NfType::Bsf),
            "CHF" => Ok(NfType::Chf),
            "gNodeB" => Ok(NfType::Gnb),
            "gNB-CU" => Ok(NfType::GnbCu),
            "gNB-DU" => Ok(NfType::GnbDu),
            unknown => Err(UnknownNfType {
                value: unknown.to_owned(),
            }),
        }
    }
}

impl core::fmt::Display for NfType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Wire representation is the 3GPP spelling, not the Rust variant name.
impl Serialize for NfType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NfType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error as _;
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown NF type: {value}")]
pub struct UnknownNfType {
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlmnId {
    pub mcc: String,
    pub mnc: String,
}

impl PlmnId {
    pub fn home() -> Self {
        PlmnId {
            mcc: "001".to_owned(),
            mnc: "01".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snssai {
    pub sst: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sd: Option<String>,
}

impl Snssai {
    pub fn default_slice() -> Self {
        Snssai {
            sst: 1,
            sd: Some("010203".to_owned()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Guami {
    pub plmn_id: PlmnId,
    pub amf_region_id: String,
    pub amf_set_id: String,
    pub amf_pointer: String,
}

impl Guami {
    pub fn home() -> Self {
        Guami {
            plmn_id: PlmnId::home(),
            amf_region_id: "01".to_owned(),
            amf_set_id: "001".to_owned(),
            amf_pointer: "01".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpEndPoint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv4_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv6_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NfServiceVersion {
    pub api_version_in_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_full_version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NfService {
    pub service_instance_id: String,
    pub service_name: String,
    pub versions: Vec<NfServiceVersion>,
    #[serde(default = "default_scheme")]
    pub scheme: String,
    #[serde(default)]
    pub nf_service_status: NfStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_end_points: Option<Vec<IpEndPoint>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_nf_types: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u16>,
}

fn default_scheme() -> String {
    "http".to_owned()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NfStatus {
    #[default]
    Registered,
    Undiscoverable,
    Suspended,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NfProfile {
    pub nf_instance_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nf_instance_name: Option<String>,
    pub nf_type: NfType,
    #[serde(default)]
    pub nf_status: NfStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heart_beat_timer: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plmn_list: Option<Vec<PlmnId>>,
    #[serde(rename = "sNssais", skip_serializing_if = "Option::is_none")]
    pub s_nssais: Option<Vec<Snssai>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fqdn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv4_addresses: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv6_addresses: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_nf_types: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nf_services: Option<Vec<NfService>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amf_info: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smf_info: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upf_info: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ausf_info: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub udm_info: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pcf_info: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(with = "time::serde::rfc3339::option")]
    #[serde(default)]
    pub recovery_time: Option<OffsetDateTime>,
}

impl NfProfile {
    /// Minimal profile for an NF serving one HTTP endpoint on the loopback.
    pub fn for_service(
        nf_instance_id: Uuid,
        nf_type: NfType,
        service_name: &str,
        ipv4_address: &str,
        port: u16,
    ) -> Self {
        NfProfile {
            nf_instance_id,
            nf_instance_name: None,
            nf_type,
            nf_status: NfStatus::Registered,
            heart_beat_timer: None,
            plmn_list: Some(vec![PlmnId::home()]),
            s_nssais: Some(vec![Snssai::default_slice()]),
            fqdn: None,
            ipv4_addresses: Some(vec![ipv4_address.to_owned()]),
            ipv6_addresses: None,
            allowed_nf_types: None,
            priority: None,
            capacity: None,
            load: None,
            nf_services: Some(vec![NfService {
                service_instance_id: format!("{service_name}-001"),
                service_name: service_name.to_owned(),
                versions: vec![NfServiceVersion {
                    api_version_in_uri: "v1".to_owned(),
                    api_full_version: None,
                }],
                scheme: "http".to_owned(),
                nf_service_status: NfStatus::Registered,
                ip_end_points: Some(vec![IpEndPoint {
                    ipv4_address: Some(ipv4_address.to_owned()),
                    ipv6_address: None,
                    transport: Some("TCP".to_owned()),
                    port: Some(port),
                }]),
                allowed_nf_types: None,
                priority: None,
                capacity: None,
            }]),
            amf_info: None,
            smf_info: None,
            upf_info: None,
            ausf_info: None,
            udm_info: None,
            pcf_info: None,
            recovery_time: None,
        }
    }

    /// First reachable `http://ip:port` this profile advertises.
    pub fn first_endpoint(&self) -> Option<String> {
        let services = self.nf_services.as_deref()?;

        for service in services {
            let Some(endpoints) = service.ip_end_points.as_deref() else {
                continue;
            };

            for endpoint in endpoints {
                let ip = endpoint
                    .ipv4_address
                    .as_deref()
                    .or_else(|| self.ipv4_addresses.as_deref().and_then(|addrs| addrs.first().map(String::as_str)));

                if let (Some(ip), Some(port)) = (ip, endpoint.port) {
                    return Some(format!("{}://{ip}:{port}", service.scheme));
                }
            }
        }

        None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validity_period: Option<u32>,
    pub nf_instances: Vec<NfProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_nf_inst_complete: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nrf_supported_features: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionData {
    pub nf_status_notification_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(with = "time::serde::rfc3339::option")]
    #[serde(default)]
    pub validity_time: Option<OffsetDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub req_notif_events: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nf_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nf_instance_id: Option<Uuid>,
}

/// `suci-…-<digits>` → `imsi-<digits>`, the emulator's deterministic
/// stand-in for ECIES de-concealment. Anything else passes through.
pub fn supi_from_suci(supi_or_suci: &str) -> String {
    match supi_or_suci.strip_prefix("suci-") {
        Some(rest) => match rest.rsplit('-').next() {
            Some(digits) if !digits.is_empty() => format!("imsi-{digits}"),
            _ => supi_or_suci.to_owned(),
        },
        None => supi_or_suci.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suci_deconcealment_takes_trailing_digits() {
        assert_eq!(supi_from_suci("suci-001-01-0000-000000001"), "imsi-000000001");
        assert_eq!(supi_from_suci("imsi-001010000000001"), "imsi-001010000000001");
    }

    #[test]
    fn nf_profile_round_trips_camel_case() {
        let profile = NfProfile::for_service(Uuid::new_v4(), NfType::Ausf, "nausf-auth", "127.0.0.1", 9003);
        let json = serde_json::to_value(&profile).expect("serializable profile");

        assert_eq!(json["nfType"], "AUSF");
        assert_eq!(json["nfStatus"], "REGISTERED");
        assert_eq!(json["nfServices"][0]["serviceName"], "nausf-auth");
        assert_eq!(json["nfServices"][0]["ipEndPoints"][0]["port"], 9003);

        let back: NfProfile = serde_json::from_value(json).expect("deserializable profile");
        assert_eq!(back.first_endpoint().as_deref(), Some("http://127.0.0.1:9003"));
    }

    #[test]
    fn ran_node_types_round_trip() {
        for (ty, wire) in [
            (NfType::Gnb, "gNodeB"),
            (NfType::GnbCu, "gNB-CU"),
            (NfType::GnbDu, "gNB-DU"),
        ] {
            assert_eq!(ty.as_str(), wire);
            assert_eq!(wire.parse::<NfType>().expect("known type"), ty);
        }
    }
}
