//! Policy (PCF): session-management policy decisions and the PCC/QoS catalog.
//!
//! One `SmPolicyDecision` per PDU session, derived from the DNN and updated
//! in response to policy-control request triggers.

pub mod api;

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::{Duration, OffsetDateTime};
use sba_task::TaskSet;
use uuid::Uuid;

use crate::client::Sbi;
use crate::config::{self, Conf};
use crate::service::{self, Registration};
use crate::types::{NfProfile, NfType};

pub const SUPPORTED_FEATURES: &str = "0x1f";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Arp {
    pub priority_level: u8,
    #[serde(default = "not_preempt")]
    pub pre_emption_capability: String,
    #[serde(default = "not_preemptable")]
    pub pre_emption_vulnerability: String,
}

fn not_preempt() -> String {
    "NOT_PREEMPT".to_owned()
}

fn not_preemptable() -> String {
    "NOT_PREEMPTABLE".to_owned()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QosData {
    #[serde(rename = "qosId")]
    pub qos_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fiveqi: Option<u8>,
    #[serde(rename = "maxbrUl", skip_serializing_if = "Option::is_none")]
    pub maxbr_ul: Option<String>,
    #[serde(rename = "maxbrDl", skip_serializing_if = "Option::is_none")]
    pub maxbr_dl: Option<String>,
    #[serde(rename = "gbrUl", skip_serializing_if = "Option::is_none")]
    pub gbr_ul: Option<String>,
    #[serde(rename = "gbrDl", skip_serializing_if = "Option::is_none")]
    pub gbr_dl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arp: Option<Arp>,
    #[serde(rename = "priorityLevel", skip_serializing_if = "Option::is_none")]
    pub priority_level: Option<u8>,
    #[serde(rename = "averWindow", skip_serializing_if = "Option::is_none")]
    pub aver_window: Option<u32>,
    #[serde(rename = "maxPacketLossRateDl", skip_serializing_if = "Option::is_none")]
    pub max_packet_loss_rate_dl: Option<u16>,
    #[serde(rename = "maxPacketLossRateUl", skip_serializing_if = "Option::is_none")]
    pub max_packet_loss_rate_ul: Option<u16>,
    #[serde(rename = "qosFlowUsage", skip_serializing_if = "Option::is_none")]
    pub qos_flow_usage: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowInformation {
    #[serde(rename = "flowDescription", skip_serializing_if = "Option::is_none")]
    pub flow_description: Option<String>,
    #[serde(rename = "flowDirection", skip_serializing_if = "Option::is_none")]
    pub flow_direction: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PccRule {
    #[serde(rename = "pccRuleId")]
    pub pcc_rule_id: String,
    #[serde(rename = "flowInfos", skip_serializing_if = "Option::is_none")]
    pub flow_infos: Option<Vec<FlowInformation>>,
    #[serde(rename = "appId", skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(rename = "pccRuleStatus", default = "active")]
    pub pcc_rule_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precedence: Option<u16>,
    #[serde(rename = "refQosData", skip_serializing_if = "Option::is_none")]
    pub ref_qos_data: Option<Vec<String>>,
}

fn active() -> String {
    "ACTIVE".to_owned()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyTrigger {
    PlmnCh,
    ResMoRe,
    AcTyCh,
    UeIpCh,
    UeMacCh,
    AnChCor,
    UsRe,
    AppSta,
    AppSto,
    AnInfo,
    CmSesFail,
    PsDaOff,
    DefQosCh,
    SeAmbrCh,
    QosNotif,
    NoCredit,
    RealloOfCredit,
    PraCh,
    SareaCh,
    ScnnCh,
    ReTimeout,
    ResRelease,
    SuccResourceAllo,
    RaiCh,
    RfspCh,
    PccUpd,
}

impl FromStr for PolicyTrigger {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(Value::String(s.to_owned()))
    }
}

/// Triggers armed on every new SM policy association.
pub const DEFAULT_TRIGGERS: [PolicyTrigger; 14] = [
    PolicyTrigger::PlmnCh,
    PolicyTrigger::ResMoRe,
    PolicyTrigger::AcTyCh,
    PolicyTrigger::UeIpCh,
    PolicyTrigger::AnChCor,
    PolicyTrigger::UsRe,
    PolicyTrigger::AppSta,
    PolicyTrigger::AppSto,
    PolicyTrigger::DefQosCh,
    PolicyTrigger::SeAmbrCh,
    PolicyTrigger::QosNotif,
    PolicyTrigger::SuccResourceAllo,
    PolicyTrigger::RaiCh,
    PolicyTrigger::PccUpd,
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmPolicyContextData {
    pub supi: String,
    pub pdu_session_id: u8,
    #[serde(default = "ipv4")]
    pub pdu_session_type: String,
    pub dnn: String,
    #[serde(default)]
    pub notification_uri: Option<String>,
    #[serde(default)]
    pub access_type: Option<String>,
    #[serde(default)]
    pub serving_network: Option<Value>,
    #[serde(default)]
    pub ipv4_address: Option<String>,
    #[serde(default)]
    pub online: Option<bool>,
    #[serde(default)]
    pub offline: Option<bool>,
}

fn ipv4() -> String {
    "IPV4".to_owned()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmPolicyDecision {
    #[serde(rename = "pccRules")]
    pub pcc_rules: BTreeMap<String, PccRule>,
    #[serde(rename = "qosDecs")]
    pub qos_decs: BTreeMap<String, QosData>,
    pub online: bool,
    pub offline: bool,
    #[serde(rename = "policyCtrlReqTriggers")]
    pub policy_ctrl_req_triggers: Vec<PolicyTrigger>,
    #[serde(rename = "revalidationTime", with = "time::serde::rfc3339")]
    pub revalidation_time: OffsetDateTime,
    pub supi: String,
    #[serde(rename = "suppFeat")]
    pub supp_feat: String,
}

#[derive(Debug, Clone)]
pub struct PolicyAssociation {
    pub context: SmPolicyContextData,
}

#[derive(Clone)]
pub struct PcfState {
    pub instance_id: Uuid,
    pub qos_catalog: Arc<Mutex<BTreeMap<String, QosData>>>,
    pub rule_catalog: Arc<Mutex<BTreeMap<String, PccRule>>>,
    pub associations: Arc<Mutex<HashMap<Uuid, PolicyAssociation>>>,
    pub decisions: Arc<Mutex<HashMap<Uuid, SmPolicyDecision>>>,
}

impl PcfState {
    pub fn new() -> Self {
        let state = PcfState {
            instance_id: Uuid::new_v4(),
            qos_catalog: Arc::new(Mutex::new(BTreeMap::new())),
            rule_catalog: Arc::new(Mutex::new(BTreeMap::new())),
            associations: Arc::new(Mutex::new(HashMap::new())),
            decisions: Arc::new(Mutex::new(HashMap::new())),
        };

        state.seed_catalogs();
        state
    }

    fn seed_catalogs(&self) {
        let mut qos = self.qos_catalog.lock();

        qos.insert(
            "qos_internet".to_owned(),
            QosData {
                qos_id: "qos_internet".to_owned(),
                fiveqi: Some(9),
                maxbr_ul: None,
                maxbr_dl: None,
                gbr_ul: None,
                gbr_dl: None,
                arp: Some(Arp {
                    priority_level: 8,
                    pre_emption_capability: not_preempt(),
                    pre_emption_vulnerability: not_preemptable(),
                }),
                priority_level: Some(8),
                aver_window: None,
                max_packet_loss_rate_dl: None,
                max_packet_loss_rate_ul: None,
                qos_flow_usage: None,
            },
        );

        qos.insert(
            "qos_ims".to_owned(),
            QosData {
                qos_id: "qos_ims".to_owned(),
                fiveqi: Some(5),
                maxbr_ul: Some("256 Kbps".to_owned()),
                maxbr_dl: Some("256 Kbps".to_owned()),
                gbr_ul: Some("128 Kbps".to_owned()),
                gbr_dl: Some("128 Kbps".to_owned()),
                arp: Some(Arp {
                    priority_level: 1,
                    pre_emption_capability: "MAY_PREEMPT".to_owned(),
                    pre_emption_vulnerability: not_preemptable(),
                }),
                priority_level: Some(1),
                aver_window: None,
                max_packet_loss_rate_dl: None,
                max_packet_loss_rate_ul: None,
                qos_flow_usage: Some("IMS_SIG".to_owned()),
            },
        );

        qos.insert(
            "qos_video".to_owned(),
            QosData {
                qos_id: "qos_video".to_owned(),
                fiveqi: Some(2),
                maxbr_ul: Some("5 Mbps".to_owned()),
                maxbr_dl: Some("25 Mbps".to_owned()),
                gbr_ul: Some("2 Mbps".to_owned()),
                gbr_dl: Some("10 Mbps".to_owned()),
                arp: Some(Arp {
                    priority_level: 4,
                    pre_emption_capability: not_preempt(),
                    pre_emption_vulnerability: "PREEMPTABLE".to_owned(),
                }),
                priority_level: Some(4),
                aver_window: Some(2000),
                max_packet_loss_rate_dl: Some(1),
                max_packet_loss_rate_ul: Some(1),
                qos_flow_usage: None,
            },
        );

        qos.insert(
            "qos_gaming".to_owned(),
            QosData {
                qos_id: "qos_gaming".to_owned(),
                fiveqi: Some(83),
                maxbr_ul: Some("1 Mbps".to_owned()),
                maxbr_dl: Some("2 Mbps".to_owned()),
                gbr_ul: Some("500 Kbps".to_owned()),
                gbr_dl: Some("1 Mbps".to_owned()),
                arp: Some(Arp {
                    priority_level: 7,
                    pre_emption_capability: not_preempt(),
                    pre_emption_vulnerability: "PREEMPTABLE".to_owned(),
                }),
                priority_level: Some(7),
                aver_window: None,
                max_packet_loss_rate_dl: None,
                max_packet_loss_rate_ul: None,
                qos_flow_usage: None,
            },
        );

        let mut rules = self.rule_catalog.lock();

        rules.insert(
            "rule_internet_default".to_owned(),
            PccRule {
                pcc_rule_id: "rule_internet_default".to_owned(),
                flow_infos: Some(vec![
                    FlowInformation {
                        flow_description: Some("permit out ip from any to assigned".to_owned()),
                        flow_direction: Some("DOWNLINK".to_owned()),
                    },
                    FlowInformation {
                        flow_description: Some("permit in ip from any to assigned".to_owned()),
                        flow_direction: Some("UPLINK".to_owned()),
                    },
                ]),
                app_id: None,
                pcc_rule_status: active(),
                precedence: Some(1000),
                ref_qos_data: Some(vec!["qos_internet".to_owned()]),
            },
        );

        rules.insert(
            "rule_ims_signalling".to_owned(),
            PccRule {
                pcc_rule_id: "rule_ims_signalling".to_owned(),
                flow_infos: Some(vec![FlowInformation {
                    flow_description: Some("permit out 17 from any 5060 to assigned".to_owned()),
                    flow_direction: Some("BIDIRECTIONAL".to_owned()),
                }]),
                app_id: None,
                pcc_rule_status: active(),
                precedence: Some(100),
                ref_qos_data: Some(vec!["qos_ims".to_owned()]),
            },
        );

        rules.insert(
            "rule_video_streaming".to_owned(),
            PccRule {
                pcc_rule_id: "rule_video_streaming".to_owned(),
                flow_infos: Some(vec![FlowInformation {
                    flow_description: Some("permit out tcp from any 80,443 to assigned".to_owned()),
                    flow_direction: Some("DOWNLINK".to_owned()),
                }]),
                app_id: Some("video_streaming_app".to_owned()),
                pcc_rule_status: active(),
                precedence: Some(200),
                ref_qos_data: Some(vec!["qos_video".to_owned()]),
            },
        );

        rules.insert(
            "rule_gaming".to_owned(),
            PccRule {
                pcc_rule_id: "rule_gaming".to_owned(),
                flow_infos: Some(vec![FlowInformation {
                    flow_description: Some("permit out udp from any 7000-8000 to assigned".to_owned()),
                    flow_direction: Some("BIDIRECTIONAL".to_owned()),
                }]),
                app_id: Some("gaming_app".to_owned()),
                pcc_rule_status: active(),
                precedence: Some(300),
                ref_qos_data: Some(vec!["qos_gaming".to_owned()]),
            },
        );
    }

    /// Decision for a new association: always the default internet rule,
    /// plus the DNN-keyed service rule.
    pub fn create_decision(&self, context: &SmPolicyContextData) -> SmPolicyDecision {
        let qos_catalog = self.qos_catalog.lock();
        let rule_catalog = self.rule_catalog.lock();

        let mut pcc_rules = BTreeMap::new();
        let mut qos_decs = BTreeMap::new();

        let mut install = |rule_id: &str, qos_id: &str| {
            if let Some(rule) = rule_catalog.get(rule_id) {
                pcc_rules.insert(rule_id.to_owned(), rule.clone());
            }
            if let Some(qos) = qos_catalog.get(qos_id) {
                qos_decs.insert(qos_id.to_owned(), qos.clone());
            }
        };

        install("rule_internet_default", "qos_internet");

        if context.dnn == "ims" {
            install("rule_ims_signalling", "qos_ims");
        } else if context.dnn.contains("video") {
            install("rule_video_streaming", "qos_video");
        } else if context.dnn.contains("gaming") {
            install("rule_gaming", "qos_gaming");
        }

        SmPolicyDecision {
            pcc_rules,
            qos_decs,
            online: context.online.unwrap_or(true),
            offline: context.offline.unwrap_or(true),
            policy_ctrl_req_triggers: DEFAULT_TRIGGERS.to_vec(),
            revalidation_time: OffsetDateTime::now_utc() + Duration::hours(24),
            supi: context.supi.clone(),
            supp_feat: SUPPORTED_FEATURES.to_owned(),
        }
    }

    /// Apply triggers to an existing decision.
    pub fn update_decision(
        &self,
        decision: &mut SmPolicyDecision,
        triggers: &[PolicyTrigger],
        context_updates: &Value,
    ) {
        for trigger in triggers {
            match trigger {
                PolicyTrigger::ResMoRe => {
                    let Some(requirements) = context_updates.get("qos_requirements") else {
                        continue;
                    };

                    if requirements.get("fiveqi").and_then(Value::as_u64) == Some(1) {
                        decision.qos_decs.insert(
                            "qos_voice".to_owned(),
                            QosData {
                                qos_id: "qos_voice".to_owned(),
                                fiveqi: Some(1),
                                maxbr_ul: None,
                                maxbr_dl: None,
                                gbr_ul: Some("64 Kbps".to_owned()),
                                gbr_dl: Some("64 Kbps".to_owned()),
                                arp: Some(Arp {
                                    priority_level: 2,
                                    pre_emption_capability: not_preempt(),
                                    pre_emption_vulnerability: not_preemptable(),
                                }),
                                priority_level: None,
                                aver_window: None,
                                max_packet_loss_rate_dl: None,
                                max_packet_loss_rate_ul: None,
                                qos_flow_usage: None,
                            },
                        );
                    }
                }
                PolicyTrigger::AppSta => {
                    let Some(app_id) = context_updates.get("app_id").and_then(Value::as_str) else {
                        continue;
                    };

                    let rule_catalog = self.rule_catalog.lock();
                    let qos_catalog = self.qos_catalog.lock();

                    let Some(rule) = rule_catalog
                        .values()
                        .find(|rule| rule.app_id.as_deref() == Some(app_id))
                    else {
                        continue;
                    };

                    for qos_id in rule.ref_qos_data.as_deref().unwrap_or_default() {
                        if let Some(qos) = qos_catalog.get(qos_id) {
                            decision.qos_decs.insert(qos_id.clone(), qos.clone());
                        }
                    }
                    decision.pcc_rules.insert(rule.pcc_rule_id.clone(), rule.clone());
                }
                PolicyTrigger::AppSto => {
                    let Some(app_id) = context_updates.get("app_id").and_then(Value::as_str) else {
                        continue;
                    };

                    let removed: Vec<PccRule> = {
                        let to_remove: Vec<String> = decision
                            .pcc_rules
                            .values()
                            .filter(|rule| rule.app_id.as_deref() == Some(app_id))
                            .map(|rule| rule.pcc_rule_id.clone())
                            .collect();

                        to_remove
                            .iter()
                            .filter_map(|rule_id| decision.pcc_rules.remove(rule_id))
                            .collect()
                    };

                    for rule in removed {
                        for qos_id in rule.ref_qos_data.as_deref().unwrap_or_default() {
                            decision.qos_decs.remove(qos_id);
                        }
                    }
                }
                PolicyTrigger::QosNotif => {
                    let congested = context_updates
                        .get("qos_notification")
                        .and_then(|notification| notification.get("congestion_level"))
                        .and_then(Value::as_str)
                        == Some("high");

                    if congested {
                        // Throttle best-effort flows under congestion.
                        for qos in decision.qos_decs.values_mut() {
                            if qos.fiveqi == Some(9) {
                                qos.maxbr_ul = Some("500 Kbps".to_owned());
                                qos.maxbr_dl = Some("1 Mbps".to_owned());
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        decision.revalidation_time = OffsetDateTime::now_utc() + Duration::hours(24);
    }
}

impl Default for PcfState {
    fn default() -> Self {
        Self::new()
    }
}

pub async fn run() -> anyhow::Result<()> {
    let conf = Conf::for_port(config::PCF_PORT)?;
    let _logger_guard = sba_log::init(&conf.log_filter)?;

    let state = PcfState::new();
    info!(nf.instance_id = %state.instance_id, "PCF starting");

    let sbi = Arc::new(Sbi::new(conf.nrf_url.clone(), NfType::Pcf));
    let profile = NfProfile::for_service(
        state.instance_id,
        NfType::Pcf,
        "npcf-smpolicycontrol",
        "127.0.0.1",
        conf.bind_addr.port(),
    );

    let router = api::make_router(state);

    service::serve(
        "sba-pcf",
        conf.bind_addr,
        router,
        TaskSet::new(),
        Some(Registration { sbi, profile }),
    )
    .await
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn context(dnn: &str) -> SmPolicyContextData {
        SmPolicyContextData {
            supi: "imsi-001010000000001".to_owned(),
            pdu_session_id: 1,
            pdu_session_type: "IPV4".to_owned(),
            dnn: dnn.to_owned(),
            notification_uri: None,
            access_type: None,
            serving_network: None,
            ipv4_address: None,
            online: None,
            offline: None,
        }
    }

    #[test]
    fn internet_session_gets_default_rule_only() {
        let state = PcfState::new();
        let decision = state.create_decision(&context("internet"));

        assert_eq!(decision.pcc_rules.len(), 1);
        assert!(decision.pcc_rules.contains_key("rule_internet_default"));
        assert_eq!(decision.qos_decs["qos_internet"].fiveqi, Some(9));
        assert!(decision.policy_ctrl_req_triggers.contains(&PolicyTrigger::AppSta));
    }

    #[test]
    fn ims_dnn_adds_signalling_rule() {
        let state = PcfState::new();
        let decision = state.create_decision(&context("ims"));

        assert!(decision.pcc_rules.contains_key("rule_ims_signalling"));
        assert_eq!(decision.qos_decs["qos_ims"].fiveqi, Some(5));
    }

    #[test]
    fn video_dnn_adds_streaming_rule() {
        let state = PcfState::new();
        let decision = state.create_decision(&context("video-cdn"));

        assert!(decision.pcc_rules.contains_key("rule_video_streaming"));
        assert_eq!(decision.qos_decs["qos_video"].gbr_dl.as_deref(), Some("10 Mbps"));
    }

    #[test]
    fn decision_is_idempotent_for_equal_contexts() {
        let state = PcfState::new();
        let first = state.create_decision(&context("gaming-arena"));
        let second = state.create_decision(&context("gaming-arena"));

        let first_rules: Vec<&String> = first.pcc_rules.keys().collect();
        let second_rules: Vec<&String> = second.pcc_rules.keys().collect();
        assert_eq!(first_rules, second_rules);
        assert_eq!(
            first.qos_decs.keys().collect::<Vec<_>>(),
            second.qos_decs.keys().collect::<Vec<_>>()
        );
    }

    #[test]
    fn app_start_and_stop_install_and_remove_rule() {
        let state = PcfState::new();
        let mut decision = state.create_decision(&context("internet"));

        state.update_decision(
            &mut decision,
            &[PolicyTrigger::AppSta],
            &serde_json::json!({ "app_id": "video_streaming_app" }),
        );
        assert!(decision.pcc_rules.contains_key("rule_video_streaming"));
        assert!(decision.qos_decs.contains_key("qos_video"));

        state.update_decision(
            &mut decision,
            &[PolicyTrigger::AppSto],
            &serde_json::json!({ "app_id": "video_streaming_app" }),
        );
        assert!(!decision.pcc_rules.contains_key("rule_video_streaming"));
        assert!(!decision.qos_decs.contains_key("qos_video"));
    }

    #[test]
    fn high_congestion_caps_best_effort_bitrates() {
        let state = PcfState::new();
        let mut decision = state.create_decision(&context("internet"));

        state.update_decision(
            &mut decision,
            &[PolicyTrigger::QosNotif],
            &serde_json::json!({ "qos_notification": { "congestion_level": "high" } }),
        );

        let internet = &decision.qos_decs["qos_internet"];
        assert_eq!(internet.maxbr_ul.as_deref(), Some("500 Kbps"));
        assert_eq!(internet.maxbr_dl.as_deref(), Some("1 Mbps"));
    }

    #[test]
    fn rule_references_resolve_in_every_decision() {
        let state = PcfState::new();

        for dnn in ["internet", "ims", "video", "gaming"] {
            let decision = state.create_decision(&context(dnn));
            for rule in decision.pcc_rules.values() {
                for qos_id in rule.ref_qos_data.as_deref().unwrap_or_default() {
                    assert!(decision.qos_decs.contains_key(qos_id), "{dnn}: dangling {qos_id}");
                }
            }
        }
    }
}
