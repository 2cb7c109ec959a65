//! RRC message construction (TS 38.331), JSON-shaped.

use serde_json::{Value, json};

/// RRCSetup on DL-CCCH: SRB1 over RLC-AM, MAC/PHY cell group config for one
/// FDD cell with 30 kHz subcarrier spacing (numerology 1), PCI 1, band n78.
pub fn rrc_setup(rrc_transaction_id: u8, gnb_du_ue_f1ap_id: u64) -> Value {
    json!({
        "messageType": "DL-CCCH-Message",
        "message": {
            "dl-ccch-msg": {
                "message": {
                    "c1": {
                        "rrcSetup": {
                            "rrc-TransactionIdentifier": rrc_transaction_id,
                            "criticalExtensions": {
                                "rrcSetup": {
                                    "radioBearerConfig": {
                                        "srb-ToAddModList": [{
                                            "srb-Identity": 1,
                                            "rlc-Config": {
                                                "am": {
                                                    "ul-AM-RLC": {
                                                        "sn-FieldLength": "size12",
                                                        "t-PollRetransmit": "ms25",
                                                        "pollPDU": "p4",
                                                        "pollByte": "kB25",
                                                        "maxRetxThreshold": "t4"
                                                    },
                                                    "dl-AM-RLC": {
                                                        "sn-FieldLength": "size12",
                                                        "t-Reassembly": "ms35",
                                                        "t-StatusProhibit": "ms0"
                                                    }
                                                }
                                            }
                                        }]
                                    },
                                    "masterCellGroup": {
                                        "cellGroupId": 0,
                                        "rlc-BearerToAddModList": [{
                                            "logicalChannelIdentity": 1,
                                            "servedRadioBearer": { "srb-Identity": 1 },
                                            "rlc-Config": {
                                                "am": {
                                                    "ul-AM-RLC": { "sn-FieldLength": "size12" },
                                                    "dl-AM-RLC": { "sn-FieldLength": "size12" }
                                                }
                                            }
                                        }],
                                        "mac-CellGroupConfig": {
                                            "drx-Config": {
                                                "drx-onDurationTimer": { "subMilliSeconds": 1 },
                                                "drx-InactivityTimer": "ms1",
                                                "drx-HARQ-RTT-TimerDL": 1,
                                                "drx-HARQ-RTT-TimerUL": 1
                                            }
                                        },
                                        "physicalCellGroupConfig": {
                                            "harq-ACK-SpatialBundlingPUCCH": "enabled",
                                            "harq-ACK-SpatialBundlingPUSCH": "enabled",
                                            "p-NR-FR1": 23
                                        },
                                        "spCellConfig": {
                                            "servCellIndex": 0,
                                            "reconfigurationWithSync": {
                                                "spCellConfigCommon": {
                                                    "physCellId": 1,
                                                    "downlinkConfigCommon": {
                                                        "frequencyInfoDL": {
                                                            "frequencyBandList": [{ "freqBandIndicatorNR": 78 }],
                                                            "absoluteFrequencySSB": 632628
                                                        },
                                                        "initialDownlinkBWP": {
                                                            "genericParameters": {
                                                                "locationAndBandwidth": 14025,
                                                                "subcarrierSpacing": "kHz30"
                                                            }
                                                        }
                                                    },
                                                    "uplinkConfigCommon": {
                                                        "frequencyInfoUL": {
                                                            "frequencyBandList": [{ "freqBandIndicatorNR": 78 }],
                                                            "absoluteFrequencyPointA": 632628
                                                        },
                                                        "initialUplinkBWP": {
                                                            "genericParameters": {
                                                                "locationAndBandwidth": 14025,
                                                                "subcarrierSpacing": "kHz30"
                                                            }
                                                        }
                                                    }
                                                },
                                                "newUE-Identity": gnb_du_ue_f1ap_id,
                                                "t304": "ms1000"
                                            }
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rrc_setup_configures_srb1_over_am() {
        let setup = rrc_setup(1, 7);

        let srb = setup
            .pointer("/message/dl-ccch-msg/message/c1/rrcSetup/criticalExtensions/rrcSetup/radioBearerConfig/srb-ToAddModList/0")
            .expect("SRB1 entry");
        assert_eq!(srb["srb-Identity"], 1);
        assert_eq!(srb["rlc-Config"]["am"]["ul-AM-RLC"]["sn-FieldLength"], "size12");

        let sync = setup
            .pointer("/message/dl-ccch-msg/message/c1/rrcSetup/criticalExtensions/rrcSetup/masterCellGroup/spCellConfig/reconfigurationWithSync")
            .expect("reconfigurationWithSync");
        assert_eq!(sync["newUE-Identity"], 7);
        assert_eq!(sync["spCellConfigCommon"]["physCellId"], 1);
    }
}
