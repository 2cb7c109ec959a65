//! RLC acknowledged mode (TS 38.322), the bookkeeping subset.
//!
//! Transmit maintains VT(S) and the poll-PDU counter; receive maintains the
//! VR(R)/VR(MR) window, buffers out-of-order PDUs and releases SDUs to upper
//! layers strictly in sequence-number order.

use std::collections::BTreeMap;

use serde::Serialize;

/// 12-bit sequence numbers.
pub const SN_MODULUS: u16 = 1 << 12;
/// Receive window size (half the SN space).
pub const WINDOW_SIZE: u16 = SN_MODULUS / 2;
/// Poll bit threshold (pollPDU = p4).
pub const POLL_PDU: u32 = 4;

#[derive(Debug, Clone, Serialize)]
pub struct RlcAmPdu {
    pub sn: u16,
    /// Polling bit: requests a STATUS report from the peer.
    pub p: bool,
    pub payload: String,
}

#[derive(Debug)]
pub struct RlcAmEntity {
    /// VT(S): SN of the next PDU to transmit.
    vt_s: u16,
    /// VR(R): SN of the next in-sequence PDU expected.
    vr_r: u16,
    /// VR(MR): upper edge of the receive window.
    vr_mr: u16,
    tx_window: BTreeMap<u16, RlcAmPdu>,
    rx_buffer: BTreeMap<u16, RlcAmPdu>,
    pdu_without_poll: u32,
}

impl RlcAmEntity {
    pub fn new() -> Self {
        RlcAmEntity {
            vt_s: 0,
            vr_r: 0,
            vr_mr: WINDOW_SIZE,
            tx_window: BTreeMap::new(),
            rx_buffer: BTreeMap::new(),
            pdu_without_poll: 0,
        }
    }

    pub fn vt_s(&self) -> u16 {
        self.vt_s
    }

    pub fn vr_r(&self) -> u16 {
        self.vr_r
    }

    /// TS 38.322 § 5.2.2: assign VT(S), attach the poll bit once enough
    /// PDUs went out unpolled, keep the PDU for retransmission.
    pub fn transmit(&mut self, sdu: impl Into<String>) -> RlcAmPdu {
        let pdu = RlcAmPdu {
            sn: self.vt_s,
            p: self.pdu_without_poll >= POLL_PDU,
            payload: sdu.into(),
        };

        self.tx_window.insert(pdu.sn, pdu.clone());
        self.vt_s = (self.vt_s + 1) % SN_MODULUS;
        self.pdu_without_poll += 1;

        pdu
    }

    /// TS 38.322 § 5.2.3: window check, buffer, then release everything
    /// that became in-sequence. Out-of-window PDUs are discarded.
    pub fn receive(&mut self, pdu: RlcAmPdu) -> Vec<String> {
        if !self.in_receive_window(pdu.sn) {
            return Vec::new();
        }

        self.rx_buffer.entry(pdu.sn).or_insert(pdu);

        let mut delivered = Vec::new();
        while let Some(next) = self.rx_buffer.remove(&self.vr_r) {
            delivered.push(next.payload);
            self.vr_r = (self.vr_r + 1) % SN_MODULUS;
            self.vr_mr = (self.vr_r + WINDOW_SIZE) % SN_MODULUS;
        }

        delivered
    }

    fn in_receive_window(&self, sn: u16) -> bool {
        if self.vr_r <= self.vr_mr {
            self.vr_r <= sn && sn < self.vr_mr
        } else {
            sn >= self.vr_r || sn < self.vr_mr
        }
    }

    pub fn tx_window_len(&self) -> usize {
        self.tx_window.len()
    }
}

impl Default for RlcAmEntity {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn vt_s_increments_per_pdu() {
        let mut entity = RlcAmEntity::new();

        for expected_sn in 0..5u16 {
            let pdu = entity.transmit(format!("sdu-{expected_sn}"));
            assert_eq!(pdu.sn, expected_sn);
        }
        assert_eq!(entity.vt_s(), 5);
        assert_eq!(entity.tx_window_len(), 5);
    }

    #[test]
    fn poll_bit_set_after_four_unpolled_pdus() {
        let mut entity = RlcAmEntity::new();

        let polls: Vec<bool> = (0..6).map(|i| entity.transmit(format!("sdu-{i}")).p).collect();
        assert_eq!(polls, vec![false, false, false, false, true, true]);
    }

    #[test]
    fn out_of_order_delivery_is_reordered() {
        let mut tx = RlcAmEntity::new();
        let mut rx = RlcAmEntity::new();

        let pdus: Vec<RlcAmPdu> = (0..4).map(|i| tx.transmit(format!("sdu-{i}"))).collect();

        assert!(rx.receive(pdus[2].clone()).is_empty());
        assert!(rx.receive(pdus[1].clone()).is_empty());
        assert_eq!(rx.receive(pdus[0].clone()), vec!["sdu-0", "sdu-1", "sdu-2"]);
        assert_eq!(rx.receive(pdus[3].clone()), vec!["sdu-3"]);
    }

    #[test]
    fn duplicate_pdus_deliver_once() {
        let mut tx = RlcAmEntity::new();
        let mut rx = RlcAmEntity::new();

        let pdu = tx.transmit("sdu-0");
        assert_eq!(rx.receive(pdu.clone()), vec!["sdu-0"]);
        assert!(rx.receive(pdu).is_empty(), "duplicate is outside the advanced window");
    }

    proptest! {
        /// SDUs sent with SNs 0..n-1 and delivered in any order come out in
        /// SN order.
        #[test]
        fn in_sequence_delivery_under_any_arrival_order(n in 1usize..64, seed in any::<u64>()) {
            let mut tx = RlcAmEntity::new();
            let mut pdus: Vec<RlcAmPdu> = (0..n).map(|i| tx.transmit(format!("sdu-{i}"))).collect();

            // Deterministic shuffle driven by the seed.
            let mut state = seed;
            for i in (1..pdus.len()).rev() {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let j = (state >> 33) as usize % (i + 1);
                pdus.swap(i, j);
            }

            let mut rx = RlcAmEntity::new();
            let mut delivered = Vec::new();
            for pdu in pdus {
                delivered.extend(rx.receive(pdu));
            }

            let expected: Vec<String> = (0..n).map(|i| format!("sdu-{i}")).collect();
            prop_assert_eq!(delivered, expected);
        }
    }
}
