//! Control-plane emulator of a 5G Standalone core network plus RAN split.
//!
//! Each 3GPP network function lives in its own module and ships as its own
//! binary (`sba-nrf`, `sba-amf`, …). The functions cooperate over loopback
//! HTTP/JSON shaped after the 3GPP service-based interfaces; they find each
//! other exclusively through the registry (NRF) and keep all state in memory.

#[macro_use]
extern crate tracing;

pub mod client;
pub mod config;
pub mod extract;
pub mod f1ap;
pub mod http;
pub mod nas;
pub mod ngap;
pub mod pfcp;
pub mod service;
pub mod token;
pub mod types;

pub mod amf;
pub mod ausf;
pub mod cu;
pub mod du;
pub mod gnb;
pub mod nrf;
pub mod pcf;
pub mod smf;
pub mod udm;
pub mod upf;
