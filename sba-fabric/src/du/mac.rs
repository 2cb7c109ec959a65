//! MAC scheduler and HARQ bookkeeping (TS 38.321).

use std::collections::HashMap;

use serde::Serialize;

pub const MAX_RETX: u32 = 4;
pub const NUM_HARQ_PROCESSES: u64 = 8;

#[derive(Debug, Clone, Serialize)]
pub struct UlGrant {
    pub ue_id: u64,
    pub start_rb: u64,
    pub num_rb: u32,
    pub mcs: u8,
    pub harq_process: u8,
    pub timing_advance: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct DlAssignment {
    pub ue_id: u64,
    pub start_rb: u64,
    pub num_rb: u32,
    pub mcs: u8,
    pub harq_process: u8,
    pub cce_index: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarqOutcome {
    Acked,
    Retransmit,
    Dropped,
}

#[derive(Debug, Default)]
struct HarqProcess {
    retx_count: u32,
}

#[derive(Debug, Default)]
pub struct MacScheduler {
    current_tti: u64,
    harq_processes: HashMap<(u64, u8), HarqProcess>,
}

impl MacScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_tti(&self) -> u64 {
        self.current_tti
    }

    /// One scheduling round: deterministic RB ranges derived from the UE id,
    /// HARQ process `ueId mod 8`.
    pub fn schedule(&mut self, active_ues: &[u64]) -> (Vec<UlGrant>, Vec<DlAssignment>) {
        self.current_tti += 1;

        let ul_grants = active_ues
            .iter()
            .map(|&ue_id| UlGrant {
                ue_id,
                start_rb: (ue_id * 10) % 100,
                num_rb: 10,
                mcs: 16,
                harq_process: harq_process_for(ue_id),
                timing_advance: 0,
            })
            .collect();

        let dl_assignments = active_ues
            .iter()
            .map(|&ue_id| DlAssignment {
                ue_id,
                start_rb: (ue_id * 12) % 100,
                num_rb: 12,
                mcs: 20,
                harq_process: harq_process_for(ue_id),
                cce_index: harq_process_for(ue_id),
            })
            .collect();

        (ul_grants, dl_assignments)
    }

    /// TS 38.321 § 5.4.1: ACK clears the process; NACK retransmits until
    /// `MAX_RETX`, then the transport block is dropped.
    pub fn harq_feedback(&mut self, ue_id: u64, harq_process: u8, ack: bool) -> HarqOutcome {
        let process = self.harq_processes.entry((ue_id, harq_process)).or_default();

        if ack {
            process.retx_count = 0;
            return HarqOutcome::Acked;
        }

        process.retx_count += 1;
        if process.retx_count >= MAX_RETX {
            process.retx_count = 0;
            HarqOutcome::Dropped
        } else {
            HarqOutcome::Retransmit
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn harq_process_for(ue_id: u64) -> u8 {
    (ue_id % NUM_HARQ_PROCESSES) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grants_are_deterministic_per_ue() {
        let mut scheduler = MacScheduler::new();

        let (ul, dl) = scheduler.schedule(&[1, 2]);
        assert_eq!(ul[0].start_rb, 10);
        assert_eq!(ul[1].start_rb, 20);
        assert_eq!(dl[0].start_rb, 12);
        assert_eq!(dl[1].start_rb, 24);
        assert_eq!(ul[0].harq_process, 1);
        assert_eq!(dl[1].harq_process, 2);
    }

    #[test]
    fn nack_drops_after_max_retransmissions() {
        let mut scheduler = MacScheduler::new();

        assert_eq!(scheduler.harq_feedback(1, 1, false), HarqOutcome::Retransmit);
        assert_eq!(scheduler.harq_feedback(1, 1, false), HarqOutcome::Retransmit);
        assert_eq!(scheduler.harq_feedback(1, 1, false), HarqOutcome::Retransmit);
        assert_eq!(scheduler.harq_feedback(1, 1, false), HarqOutcome::Dropped);
        // Process is clean again after the drop.
        assert_eq!(scheduler.harq_feedback(1, 1, false), HarqOutcome::Retransmit);
    }

    #[test]
    fn ack_resets_the_retransmission_counter() {
        let mut scheduler = MacScheduler::new();

        assert_eq!(scheduler.harq_feedback(2, 0, false), HarqOutcome::Retransmit);
        assert_eq!(scheduler.harq_feedback(2, 0, true), HarqOutcome::Acked);
        assert_eq!(scheduler.harq_feedback(2, 0, false), HarqOutcome::Retransmit);
    }
}
