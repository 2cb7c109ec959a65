//! Environment-backed configuration.
//!
//! The fabric is deliberately flag-free: every NF binds its canonical
//! loopback port and reaches the registry at its canonical address. The
//! environment overrides below exist for tests (ephemeral ports, shrunken
//! UPF pools) and for running several fabrics side by side.

use std::net::SocketAddr;

use anyhow::Context as _;

pub const DEFAULT_NRF_URL: &str = "http://127.0.0.1:8000";

pub const NRF_PORT: u16 = 8000;
pub const AMF_PORT: u16 = 9001;
pub const UPF_PORT: u16 = 9002;
pub const AUSF_PORT: u16 = 9003;
pub const UDM_PORT: u16 = 9004;
// The source assigns 9002 to both SMF and UPF; two processes cannot share it.
// The UPF keeps 9002, the SMF takes the next free port of the 900x block.
pub const SMF_PORT: u16 = 9005;
pub const PCF_PORT: u16 = 9007;
pub const GNB_PORT: u16 = 38412;
pub const CU_PORT: u16 = 38472;
pub const DU_PORT: u16 = 38473;

#[derive(Debug, Clone)]
pub struct Conf {
    pub bind_addr: SocketAddr,
    pub nrf_url: String,
    pub log_filter: String,
}

impl Conf {
    /// Resolve the configuration for an NF whose canonical port is `default_port`.
    pub fn for_port(default_port: u16) -> anyhow::Result<Self> {
        let bind_addr = match std::env::var("SBA_BIND") {
            Ok(value) => value.parse().context("SBA_BIND is not a valid socket address")?,
            Err(_) => SocketAddr::from(([127, 0, 0, 1], default_port)),
        };

        let nrf_url = std::env::var("SBA_NRF_URL").unwrap_or_else(|_| DEFAULT_NRF_URL.to_owned());

        let log_filter = std::env::var("SBA_LOG").unwrap_or_else(|_| "info".to_owned());

        Ok(Conf {
            bind_addr,
            nrf_url,
            log_filter,
        })
    }
}

/// UPF-only knobs: the address pools handed to PDU sessions.
#[derive(Debug, Clone)]
pub struct UpfPoolConf {
    pub ipv4_cidr: String,
    pub ipv6_cidr: String,
}

impl UpfPoolConf {
    pub fn from_env() -> Self {
        UpfPoolConf {
            ipv4_cidr: std::env::var("SBA_UPF_IPV4_POOL").unwrap_or_else(|_| "192.168.100.0/24".to_owned()),
            // The source writes this pool as 2001:db8:5g::/48, which is not
            // a parseable IPv6 prefix ("g"); the fabric drops the vanity
            // digit.
            ipv6_cidr: std::env::var("SBA_UPF_IPV6_POOL").unwrap_or_else(|_| "2001:db8:5::/48".to_owned()),
        }
    }
}
