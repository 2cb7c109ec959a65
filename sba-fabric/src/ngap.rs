//! NGAP (N2, gNB ↔ AMF) message envelopes, JSON-shaped.
//!
//! The fabric does not encode ASN.1/PER; an NGAP PDU is the discriminated
//! envelope `{initiatingMessage | successfulOutcome | unsuccessfulOutcome}`
//! whose `value.protocolIEs` carries the IEs as plain JSON. Unsuccessful
//! outcomes are protocol-level results, delivered over HTTP 200.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// TS 38.413 elementary procedure codes used by the fabric.
pub mod procedure {
    pub const HANDOVER_REQUEST_ACK: u8 = 2;
    pub const HANDOVER_PREPARATION_FAILURE: u8 = 3;
    pub const DOWNLINK_NAS_TRANSPORT: u8 = 4;
    pub const UE_CONTEXT_SETUP: u8 = 14;
    pub const INITIAL_UE_MESSAGE: u8 = 15;
    pub const NG_SETUP: u8 = 21;
    pub const PDU_SESSION_RESOURCE_SETUP: u8 = 29;
    pub const UPLINK_NAS_TRANSPORT: u8 = 46;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criticality {
    Reject,
    Ignore,
    Notify,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NgapMessage {
    #[serde(rename = "procedureCode")]
    pub procedure_code: u8,
    pub criticality: Criticality,
    pub value: NgapValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NgapValue {
    #[serde(rename = "protocolIEs")]
    pub protocol_ies: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NgapPdu {
    #[serde(rename = "initiatingMessage", skip_serializing_if = "Option::is_none")]
    pub initiating_message: Option<NgapMessage>,
    #[serde(rename = "successfulOutcome", skip_serializing_if = "Option::is_none")]
    pub successful_outcome: Option<NgapMessage>,
    #[serde(rename = "unsuccessfulOutcome", skip_serializing_if = "Option::is_none")]
    pub unsuccessful_outcome: Option<NgapMessage>,
}

impl NgapPdu {
    pub fn initiating(procedure_code: u8, criticality: Criticality, protocol_ies: Value) -> Self {
        NgapPdu {
            initiating_message: Some(NgapMessage {
                procedure_code,
                criticality,
                value: NgapValue { protocol_ies },
            }),
            ..Default::default()
        }
    }

    pub fn successful(procedure_code: u8, criticality: Criticality, protocol_ies: Value) -> Self {
        NgapPdu {
            successful_outcome: Some(NgapMessage {
                procedure_code,
                criticality,
                value: NgapValue { protocol_ies },
            }),
            ..Default::default()
        }
    }

    pub fn unsuccessful(procedure_code: u8, criticality: Criticality, protocol_ies: Value) -> Self {
        NgapPdu {
            unsuccessful_outcome: Some(NgapMessage {
                procedure_code,
                criticality,
                value: NgapValue { protocol_ies },
            }),
            ..Default::default()
        }
    }

    /// IEs of whichever message the envelope carries.
    pub fn protocol_ies(&self) -> Option<&Value> {
        self.initiating_message
            .as_ref()
            .or(self.successful_outcome.as_ref())
            .or(self.unsuccessful_outcome.as_ref())
            .map(|message| &message.value.protocol_ies)
    }

    pub fn ie_u64(&self, name: &str) -> Option<u64> {
        self.protocol_ies()?.get(name)?.as_u64()
    }

    pub fn ie_str(&self, name: &str) -> Option<&str> {
        self.protocol_ies()?.get(name)?.as_str()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use serde_json::json;

    use super::*;

    #[test]
    fn envelope_is_discriminated_on_the_wire() {
        let pdu = NgapPdu::initiating(
            procedure::INITIAL_UE_MESSAGE,
            Criticality::Ignore,
            json!({"RAN-UE-NGAP-ID": 7, "NAS-PDU": "registration-request"}),
        );

        let wire = serde_json::to_value(&pdu).unwrap();
        assert_eq!(wire["initiatingMessage"]["procedureCode"], 15);
        assert_eq!(wire["initiatingMessage"]["criticality"], "ignore");
        assert!(wire.get("successfulOutcome").is_none());

        let back: NgapPdu = serde_json::from_value(wire).unwrap();
        assert_eq!(back.ie_u64("RAN-UE-NGAP-ID"), Some(7));
        assert_eq!(back.ie_str("NAS-PDU"), Some("registration-request"));
    }
}
