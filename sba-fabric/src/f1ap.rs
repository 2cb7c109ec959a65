//! F1AP (F1, CU ↔ DU) message envelopes, JSON-shaped.
//!
//! Same conventions as the NGAP envelope: a discriminated
//! `{initiatingMessage | successfulOutcome | unsuccessfulOutcome}` union with
//! `value.protocolIEs` as plain JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use crate::ngap::Criticality;

/// TS 38.463 elementary procedure codes used by the fabric.
pub mod procedure {
    pub const F1_SETUP: u8 = 0;
    pub const UE_CONTEXT_SETUP: u8 = 4;
    pub const INITIAL_UL_RRC_MESSAGE_TRANSFER: u8 = 7;
    pub const DL_RRC_MESSAGE_TRANSFER: u8 = 8;
    pub const UL_RRC_MESSAGE_TRANSFER: u8 = 9;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct F1apMessage {
    #[serde(rename = "procedureCode")]
    pub procedure_code: u8,
    pub criticality: Criticality,
    pub value: F1apValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct F1apValue {
    #[serde(rename = "protocolIEs")]
    pub protocol_ies: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct F1apPdu {
    #[serde(rename = "initiatingMessage", skip_serializing_if = "Option::is_none")]
    pub initiating_message: Option<F1apMessage>,
    #[serde(rename = "successfulOutcome", skip_serializing_if = "Option::is_none")]
    pub successful_outcome: Option<F1apMessage>,
    #[serde(rename = "unsuccessfulOutcome", skip_serializing_if = "Option::is_none")]
    pub unsuccessful_outcome: Option<F1apMessage>,
}

impl F1apPdu {
    pub fn initiating(procedure_code: u8, criticality: Criticality, protocol_ies: Value) -> Self {
        F1apPdu {
            initiating_message: Some(F1apMessage {
                procedure_code,
                criticality,
                value: F1apValue { protocol_ies },
            }),
            ..Default::default()
        }
    }

    pub fn successful(procedure_code: u8, criticality: Criticality, protocol_ies: Value) -> Self {
        F1apPdu {
            successful_outcome: Some(F1apMessage {
                procedure_code,
                criticality,
                value: F1apValue { protocol_ies },
            }),
            ..Default::default()
        }
    }

    pub fn unsuccessful(procedure_code: u8, criticality: Criticality, protocol_ies: Value) -> Self {
        F1apPdu {
            unsuccessful_outcome: Some(F1apMessage {
                procedure_code,
                criticality,
                value: F1apValue { protocol_ies },
            }),
            ..Default::default()
        }
    }

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
