use crate::domain::lifecycle::EndOutcome;
use crate::domain::model::{Campaign, Pledge};
use crate::foundation::{now_nanos, CampaignId, PartyId, TransactionId};
use crate::infrastructure::transport::Protocol;
use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub trait CampaignObserver: Send + Sync {
    fn on_campaign_started(&self, _campaign: &Campaign, _tx_id: &TransactionId) {}
    fn on_pledge_accepted(&self, _pledge: &Pledge, _tx_id: &TransactionId) {}
    fn on_campaign_ended(&self, _campaign_id: &CampaignId, _outcome: EndOutcome, _tx_id: &TransactionId) {}
    fn on_transaction_observed(&self, _sender: &PartyId, _tx_id: &TransactionId) {}
    fn on_protocol_failed(&self, _protocol: Protocol, _counterparty: &PartyId, _reason: &str) {}
}

pub struct NoopObserver;

impl CampaignObserver for NoopObserver {}

pub struct CompositeObserver {
    observers: Vec<Arc<dyn CampaignObserver>>,
}

impl CompositeObserver {
    pub fn new() -> Self {
        Self { observers: Vec::new() }
    }

    pub fn add_observer(&mut self, observer: Arc<dyn CampaignObserver>) {
        self.observers.push(observer);
    }
}

impl Default for CompositeObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl CampaignObserver for CompositeObserver {
    fn on_campaign_started(&self, campaign: &Campaign, tx_id: &TransactionId) {
        trace!("on_campaign_started dispatch observer_count={} campaign_id={}", self.observers.len(), campaign.id.short());
        for observer in &self.observers {
            observer.on_campaign_started(campaign, tx_id);
        }
    }

    fn on_pledge_accepted(&self, pledge: &Pledge, tx_id: &TransactionId) {
        trace!("on_pledge_accepted dispatch observer_count={} pledge_id={}", self.observers.len(), pledge.id.short());
        for observer in &self.observers {
            observer.on_pledge_accepted(pledge, tx_id);
        }
    }

    fn on_campaign_ended(&self, campaign_id: &CampaignId, outcome: EndOutcome, tx_id: &TransactionId) {
        trace!("on_campaign_ended dispatch observer_count={} campaign_id={}", self.observers.len(), campaign_id.short());
        for observer in &self.observers {
            observer.on_campaign_ended(campaign_id, outcome, tx_id);
        }
    }

    fn on_transaction_observed(&self, sender: &PartyId, tx_id: &TransactionId) {
        for observer in &self.observers {
            observer.on_transaction_observed(sender, tx_id);
        }
    }

    fn on_protocol_failed(&self, protocol: Protocol, counterparty: &PartyId, reason: &str) {
        for observer in &self.observers {
            observer.on_protocol_failed(protocol, counterparty, reason);
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    CampaignStarted { campaign_id: String, name: String, target: String, deadline_nanos: u64, tx_id: String, timestamp_ns: u64 },
    PledgeAccepted { campaign_id: String, pledge_id: String, amount: String, tx_id: String, timestamp_ns: u64 },
    CampaignEnded { campaign_id: String, outcome: String, tx_id: String, timestamp_ns: u64 },
    TransactionObserved { sender: String, tx_id: String, timestamp_ns: u64 },
    ProtocolFailed { protocol: String, counterparty: String, reason: String, timestamp_ns: u64 },
}

impl AuditEvent {
    pub fn to_json(&self) -> String {
        match serde_json::to_string(self) {
            Ok(json) => json,
            Err(err) => {
                warn!("audit: failed to serialize audit event error={}", err);
                "{\"type\":\"serialize_failed\"}".to_string()
            }
        }
    }

    fn summary(&self) -> String {
        match self {
            AuditEvent::CampaignStarted { campaign_id, name, target, .. } => format!("campaign {campaign_id} '{name}' started, target {target}"),
            AuditEvent::PledgeAccepted { campaign_id, amount, .. } => format!("pledge of {amount} accepted for campaign {campaign_id}"),
            AuditEvent::CampaignEnded { campaign_id, outcome, .. } => format!("campaign {campaign_id} ended: {outcome}"),
            AuditEvent::TransactionObserved { sender, tx_id, .. } => format!("observed transaction {tx_id} from {sender}"),
            AuditEvent::ProtocolFailed { protocol, counterparty, reason, .. } => format!("{protocol} with {counterparty} failed: {reason}"),
        }
    }
}

/// Emits every lifecycle event as a JSON line plus a one-line human summary.
pub struct AuditObserver;

impl AuditObserver {
    fn emit(&self, event: AuditEvent) {
        debug!(target: "crowdfund::audit::json", "audit event audit_event={}", event.to_json());
        info!(target: "crowdfund::audit::human", "audit summary={}", event.summary());
    }
}

impl CampaignObserver for AuditObserver {
    fn on_campaign_started(&self, campaign: &Campaign, tx_id: &TransactionId) {
        self.emit(AuditEvent::CampaignStarted {
            campaign_id: campaign.id.to_string(),
            name: campaign.name.clone(),
            target: campaign.target.to_string(),
            deadline_nanos: campaign.deadline_nanos,
            tx_id: tx_id.to_string(),
            timestamp_ns: now_nanos(),
        });
    }

    fn on_pledge_accepted(&self, pledge: &Pledge, tx_id: &TransactionId) {
        self.emit(AuditEvent::PledgeAccepted {
            campaign_id: pledge.campaign_id.to_string(),
            pledge_id: pledge.id.to_string(),
            amount: pledge.amount.to_string(),
            tx_id: tx_id.to_string(),
            timestamp_ns: now_nanos(),
        });
    }

    fn on_campaign_ended(&self, campaign_id: &CampaignId, outcome: EndOutcome, tx_id: &TransactionId) {
        let outcome = match outcome {
            EndOutcome::Success => "success",
            EndOutcome::Failure => "failure",
        };
        self.emit(AuditEvent::CampaignEnded {
            campaign_id: campaign_id.to_string(),
            outcome: outcome.to_string(),
            tx_id: tx_id.to_string(),
            timestamp_ns: now_nanos(),
        });
    }

    fn on_transaction_observed(&self, sender: &PartyId, tx_id: &TransactionId) {
        self.emit(AuditEvent::TransactionObserved { sender: sender.to_string(), tx_id: tx_id.to_string(), timestamp_ns: now_nanos() });
    }

    fn on_protocol_failed(&self, protocol: Protocol, counterparty: &PartyId, reason: &str) {
        self.emit(AuditEvent::ProtocolFailed {
            protocol: protocol.to_string(),
            counterparty: counterparty.to_string(),
            reason: reason.to_string(),
            timestamp_ns: now_nanos(),
        });
    }
}
