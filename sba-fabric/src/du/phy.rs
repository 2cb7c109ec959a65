//! PHY bookkeeping (TS 38.201/38.211): slot/frame counters, a reduced
//! resource grid for trace fidelity, and PRACH handling.

use serde::Serialize;
use serde_json::{Value, json};

/// Numerology 1: 30 kHz subcarrier spacing, 20 slots per 10 ms frame,
/// 0.5 ms per slot; the emulator ticks at 1 ms.
pub const NUMEROLOGY: u8 = 1;
pub const SLOTS_PER_FRAME: u8 = 20;
pub const SYMBOLS_PER_SLOT: usize = 14;
pub const SUBCARRIERS_PER_RB: usize = 12;
/// Grid width kept reduced; the carrier nominally has 273 RBs.
pub const GRID_RBS: usize = 100;

#[derive(Debug, Clone, Serialize)]
pub struct ResourceBlock {
    pub rb_index: usize,
    pub modulation: &'static str,
    /// `SYMBOLS_PER_SLOT` symbols of `SUBCARRIERS_PER_RB` IQ samples.
    pub symbols: Vec<Vec<(f32, f32)>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceGrid {
    pub frame: u64,
    pub slot: u8,
    pub resource_blocks: Vec<ResourceBlock>,
}

#[derive(Debug)]
pub struct PhyState {
    pub current_frame: u64,
    pub current_slot: u8,
}

impl PhyState {
    pub fn new() -> Self {
        PhyState {
            current_frame: 0,
            current_slot: 0,
        }
    }

    /// Advance one slot; returns the (frame, slot) just completed.
    pub fn advance_slot(&mut self) -> (u64, u8) {
        let completed = (self.current_frame, self.current_slot);

        self.current_slot = (self.current_slot + 1) % SLOTS_PER_FRAME;
        if self.current_slot == 0 {
            self.current_frame += 1;
        }

        completed
    }

    /// QPSK constellation points on a deterministic parity pattern.
    pub fn generate_grid(&self, frame: u64, slot: u8) -> ResourceGrid {
        const AMPLITUDE: f32 = 0.707;

        let mut resource_blocks = Vec::with_capacity(GRID_RBS);

        for rb_index in 0..GRID_RBS {
            let mut symbols = Vec::with_capacity(SYMBOLS_PER_SLOT);
            for symbol_index in 0..SYMBOLS_PER_SLOT {
                let mut subcarriers = Vec::with_capacity(SUBCARRIERS_PER_RB);
                for sc_index in 0..SUBCARRIERS_PER_RB {
                    let sample = if (symbol_index + sc_index + rb_index) % 2 == 0 {
                        (AMPLITUDE, AMPLITUDE)
                    } else {
                        (-AMPLITUDE, -AMPLITUDE)
                    };
                    subcarriers.push(sample);
                }
                symbols.push(subcarriers);
            }

            resource_blocks.push(ResourceBlock {
                rb_index,
                modulation: "QPSK",
                symbols,
            });
        }

        ResourceGrid {
            frame,
            slot,
            resource_blocks,
        }
    }
}

impl Default for PhyState {
    fn default() -> Self {
        Self::new()
    }
}

/// TS 38.211 § 5.3.2: random access response for a PRACH preamble.
pub fn process_prach(preamble_index: u8) -> Value {
    let temp_c_rnti = 0x1000u32 + u32::from(preamble_index);

    json!({
        "preamble_index": preamble_index,
        "timing_advance": 0,
        "temp_c_rnti": temp_c_rnti,
        "ul_grant": {
            "frequency_hopping": false,
            "mcs": 0,
            "tpc": 0,
            "csi_request": false
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twenty_slots_roll_the_frame() {
        let mut phy = PhyState::new();

        for _ in 0..SLOTS_PER_FRAME {
            phy.advance_slot();
        }
        assert_eq!(phy.current_frame, 1);
        assert_eq!(phy.current_slot, 0);
    }

    #[test]
    fn grid_has_reduced_dimensions() {
        let phy = PhyState::new();
        let grid = phy.generate_grid(0, 3);

        assert_eq!(grid.slot, 3);
        assert_eq!(grid.resource_blocks.len(), GRID_RBS);
        assert_eq!(grid.resource_blocks[0].symbols.len(), SYMBOLS_PER_SLOT);
        assert_eq!(grid.resource_blocks[0].symbols[0].len(), SUBCARRIERS_PER_RB);
    }

    #[test]
    fn prach_maps_preamble_to_temp_c_rnti() {
        let rar = process_prach(5);
        assert_eq!(rar["temp_c_rnti"], 0x1005);
        assert_eq!(rar["timing_advance"], 0);
    }
}
