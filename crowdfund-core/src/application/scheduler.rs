//! Deadline triggers. Every party that records a campaign arms one; only the manager acts on it.

use crate::application::lifecycle::{EndResult, EndTrigger};
use crate::application::node::PartyNode;
use crate::domain::command::{CampaignCommand, Command};
use crate::domain::model::Record;
use crate::domain::transaction::SignedTransaction;
use crate::foundation::{CampaignId, Result};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Spawns [`run_scheduled_end`] on the current runtime.
pub fn schedule_campaign_end(node: Arc<PartyNode>, campaign_id: CampaignId, deadline_nanos: u64) -> JoinHandle<Result<EndResult>> {
    tokio::spawn(run_scheduled_end(node, campaign_id, deadline_nanos))
}

/// Waits until the node clock reaches `deadline_nanos`, then asks the node to end the campaign.
///
/// Sleeps in steps of at most the configured poll interval so a manually advanced clock is noticed.
pub async fn run_scheduled_end(node: Arc<PartyNode>, campaign_id: CampaignId, deadline_nanos: u64) -> Result<EndResult> {
    let poll = Duration::from_millis(node.config().scheduler.poll_interval_ms.max(1));
    loop {
        let now = node.now_nanos();
        if now >= deadline_nanos {
            break;
        }
        tokio::time::sleep(Duration::from_nanos(deadline_nanos - now).min(poll)).await;
    }
    node.end_campaign(campaign_id, EndTrigger::Scheduled).await
}

impl PartyNode {
    pub(crate) fn schedule_started_campaigns(&self, tx: &SignedTransaction) {
        if !self.config.scheduler.enabled || !tx.tx.commands.iter().any(|command| command.command == Command::Campaign(CampaignCommand::Start)) {
            return;
        }
        if Handle::try_current().is_err() {
            warn!("no runtime to arm end trigger party={}", self.party.id);
            return;
        }
        let Some(node) = self.this.upgrade() else {
            return;
        };
        let mut scheduled = match self.lock_scheduled() {
            Ok(scheduled) => scheduled,
            Err(err) => {
                warn!("cannot arm end trigger party={} error={}", self.party.id, err);
                return;
            }
        };

        for campaign in tx.tx.outputs.iter().filter_map(Record::as_campaign) {
            if scheduled.contains_key(&campaign.id) {
                continue;
            }
            let (campaign_id, deadline_nanos) = (campaign.id, campaign.deadline_nanos);
            let node = Arc::clone(&node);
            let handle = tokio::spawn(async move {
                let party = node.party().id.clone();
                match run_scheduled_end(node, campaign_id, deadline_nanos).await {
                    Ok(EndResult::Settled { outcome, transaction }) => {
                        let tx_id = transaction.id().map(|id| id.short()).unwrap_or_default();
                        info!("scheduled end settled party={} campaign_id={} outcome={:?} tx_id={}", party, campaign_id.short(), outcome, tx_id);
                    }
                    Ok(EndResult::Skipped(reason)) => {
                        debug!("scheduled end skipped party={} campaign_id={} reason={:?}", party, campaign_id.short(), reason);
                    }
                    Err(err) => warn!("scheduled end failed party={} campaign_id={} error={}", party, campaign_id.short(), err),
                }
            });
            scheduled.insert(campaign_id, handle);
            debug!("armed end trigger party={} campaign_id={} deadline_nanos={}", self.party.id, campaign_id.short(), deadline_nanos);
        }
    }
}
