//! Campaign lifecycle: starting a campaign, pledging to it, and ending it at the deadline.

use crate::application::node::PartyNode;
use crate::domain::command::{CampaignCommand, Command, PledgeCommand};
use crate::domain::identity::IdentityDisclosure;
use crate::domain::lifecycle::{decide_outcome, EndOutcome};
use crate::domain::model::{Campaign, Pledge, Record};
use crate::domain::transaction::{LedgerTransaction, ResolvedTransaction, SignedTransaction};
use crate::domain::verification::verify;
use crate::foundation::{Amount, AnonymousParty, CampaignId, EscrowError, PartyId, Result};
use crate::infrastructure::transport::{Protocol, Session, SessionMessage};
use log::{debug, info, warn};
use std::collections::BTreeSet;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StartedCampaign {
    pub campaign_id: CampaignId,
    pub transaction: SignedTransaction,
}

/// What asked for a campaign to end.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndTrigger {
    /// The deadline timer. Fires on every party that recorded the campaign.
    Scheduled,
    /// An explicit request by the manager.
    Manual,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    NotManager,
    AlreadyEnded,
    InProgress,
    DeadlineNotReached,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EndResult {
    Settled { outcome: EndOutcome, transaction: SignedTransaction },
    Skipped(SkipReason),
}

impl PartyNode {
    /// Creates a campaign managed by this party and records it.
    pub async fn start_campaign(&self, name: impl Into<String>, target: Amount, deadline_nanos: u64) -> Result<StartedCampaign> {
        let campaign = Campaign::new(name, self.party.clone(), target, deadline_nanos);
        let mut builder = self.builder();
        builder.add_output(Record::Campaign(campaign.clone())).add_command(Command::Campaign(CampaignCommand::Start), [self.party.key]);
        let proposal = builder.build();

        let signed = self.verify_and_sign(&proposal, &self.legal_keys())?;
        let finalized = self.notarise(signed).await?;
        self.record(&finalized)?;
        let tx_id = finalized.id()?;
        info!(
            "campaign started campaign_id={} name={} target={} deadline_nanos={} tx_id={}",
            campaign.id.short(),
            campaign.name,
            campaign.target,
            campaign.deadline_nanos,
            tx_id.short()
        );
        self.observer.on_campaign_started(&campaign, &tx_id);

        if self.config.settlement.broadcast_to_observers {
            let resolved = ResolvedTransaction { transaction: finalized.clone(), inputs: Vec::new() };
            self.broadcast_to_observers(&resolved, &BTreeSet::new()).await;
        }
        Ok(StartedCampaign { campaign_id: campaign.id, transaction: finalized })
    }

    /// Pledges `amount` to a campaign under a fresh confidential key.
    ///
    /// Returns once the manager has recorded the finalized transaction.
    pub async fn make_pledge(&self, amount: Amount, campaign_id: CampaignId, broadcast_to_observers: bool) -> Result<SignedTransaction> {
        if self.store.campaign_status(&campaign_id)?.is_some_and(|status| status.is_terminal()) {
            return Err(EscrowError::CampaignNotActive(campaign_id.short()));
        }
        let (current, campaign) = self.current_campaign(&campaign_id)?;

        let pledger = AnonymousParty { key: self.keys.fresh_key()? };
        self.identities.register_own(&self.party, &pledger)?;
        let pledge = Pledge::new(amount, pledger, campaign.manager.clone(), campaign.id);
        let successor = campaign.with_pledge(&pledge).map_err(|err| EscrowError::PledgeRejected { details: err.to_string() })?;

        let mut builder = self.builder();
        builder
            .add_input(current)
            .add_output(Record::Campaign(successor))
            .add_output(Record::Pledge(pledge.clone()))
            .add_command(Command::Campaign(CampaignCommand::AcceptPledge), [campaign.manager.key])
            .add_command(Command::Pledge(PledgeCommand::Create), [pledger.key, campaign.manager.key]);
        let proposal = builder.build();
        let signed = self
            .verify_and_sign(&proposal, &BTreeSet::from([pledger.key]))
            .map_err(|err| EscrowError::PledgeRejected { details: err.to_string() })?;
        let disclosure = self.keys.disclose(&self.party, &pledger)?;

        let mut session = self.transport.open_session(&campaign.manager.id, Protocol::Pledge).await?;
        let request = SessionMessage::PledgeProposal {
            proposal: ResolvedTransaction { transaction: signed.clone(), inputs: proposal.inputs.clone() },
            disclosure,
            broadcast_to_observers,
        };
        let signatures = match session.send_and_receive(request).await? {
            SessionMessage::Signatures(signatures) => signatures,
            SessionMessage::Rejected { reason } => return Err(EscrowError::PledgeRejected { details: reason }),
            other => {
                session.reject(format!("unexpected {}", other.kind())).await;
                return Err(EscrowError::transport("pledge", format!("unexpected {} from manager", other.kind())));
            }
        };

        let signed = signed.with_signatures(signatures);
        if let Err(err) = signed.verify_required_signatures() {
            session.reject(err.to_string()).await;
            return Err(EscrowError::PledgeRejected { details: err.to_string() });
        }
        let finalized = match self.notarise(signed).await {
            Ok(finalized) => finalized,
            Err(err) => {
                session.reject(err.to_string()).await;
                return Err(err);
            }
        };
        self.record(&finalized)?;
        let tx_id = finalized.id()?;
        info!("pledge finalized campaign_id={} pledge_id={} amount={} tx_id={}", campaign_id.short(), pledge.id.short(), pledge.amount, tx_id.short());
        self.observer.on_pledge_accepted(&pledge, &tx_id);

        let resolved = ResolvedTransaction { transaction: finalized.clone(), inputs: proposal.inputs };
        match session.send_and_receive(SessionMessage::Finalized(resolved)).await {
            Ok(SessionMessage::Recorded { tx_id: acked }) if acked.ct_eq(&tx_id) => {}
            Ok(other) => warn!("manager did not acknowledge pledge tx_id={} reply={}", tx_id.short(), other.kind()),
            Err(err) => warn!("manager did not acknowledge pledge tx_id={} error={}", tx_id.short(), err),
        }
        Ok(finalized)
    }

    /// Manager side of a pledge: check, co-sign, then record the finalized result.
    pub async fn respond_to_pledge(&self, mut session: Session) -> Result<()> {
        let counterparty = session.counterparty().clone();
        let (proposal, disclosure, broadcast) = match session.receive().await? {
            SessionMessage::PledgeProposal { proposal, disclosure, broadcast_to_observers } => (proposal, disclosure, broadcast_to_observers),
            other => {
                session.reject(format!("unexpected {}", other.kind())).await;
                return Err(EscrowError::transport("pledge", format!("unexpected {} from {counterparty}", other.kind())));
            }
        };

        let ledger = match self.check_pledge_proposal(&proposal, &disclosure, &counterparty) {
            Ok(ledger) => ledger,
            Err(err) => {
                session.reject(err.to_string()).await;
                return Err(EscrowError::PledgeRejected { details: err.to_string() });
            }
        };
        let expected_id = ledger.id;
        let signatures = self.keys.sign_transaction(&proposal.transaction, &self.legal_keys())?;
        session.send(SessionMessage::Signatures(signatures)).await?;

        let finalized = match session.receive().await? {
            SessionMessage::Finalized(finalized) => finalized,
            SessionMessage::Rejected { reason } => {
                info!("pledge abandoned by pledger counterparty={} tx_id={} reason={}", counterparty, expected_id.short(), reason);
                return Ok(());
            }
            other => return Err(EscrowError::transport("pledge", format!("unexpected {} from {counterparty}", other.kind()))),
        };
        if !finalized.id()?.ct_eq(&expected_id) {
            session.reject("finalized transaction differs from the signed proposal").await;
            return Err(EscrowError::PledgeRejected { details: format!("finalized transaction differs from {}", expected_id.short()) });
        }
        finalized.transaction.verify_required_signatures()?;
        self.record(&finalized.transaction)?;
        if let Some(pledge) = ledger.pledge_outputs().first() {
            info!("pledge accepted campaign_id={} pledge_id={} amount={} tx_id={}", pledge.campaign_id.short(), pledge.id.short(), pledge.amount, expected_id.short());
            self.observer.on_pledge_accepted(pledge, &expected_id);
        }
        session.send(SessionMessage::Recorded { tx_id: expected_id }).await?;

        if broadcast {
            self.broadcast_to_observers(&finalized, &BTreeSet::from([counterparty])).await;
        }
        Ok(())
    }

    fn check_pledge_proposal(&self, proposal: &ResolvedTransaction, disclosure: &IdentityDisclosure, counterparty: &PartyId) -> Result<LedgerTransaction> {
        if disclosure.party.id != *counterparty {
            return Err(EscrowError::UnknownIdentity(format!("disclosure names {} but session is with {counterparty}", disclosure.party.id)));
        }
        self.identities.register_disclosure(disclosure)?;

        for input in &proposal.inputs {
            if self.store.load(&input.reference)? != input.record {
                return Err(EscrowError::InvalidPledge(format!("input {} does not match the local record", input.reference)));
            }
        }
        let ledger = proposal.ledger()?;
        let campaign = ledger
            .campaign_inputs()
            .first()
            .copied()
            .cloned()
            .ok_or_else(|| EscrowError::InvalidPledge("proposal consumes no campaign".to_string()))?;
        if campaign.manager.id != self.party.id {
            return Err(EscrowError::NotManager { party: self.party.id.to_string(), campaign_id: campaign.id.short() });
        }
        if self.store.campaign_status(&campaign.id)?.is_some_and(|status| status.is_terminal()) {
            return Err(EscrowError::CampaignNotActive(campaign.id.short()));
        }
        verify(&ledger)?;

        let pledger_keys: BTreeSet<_> = ledger.pledge_outputs().iter().map(|pledge| pledge.pledger.key).collect();
        if pledger_keys != BTreeSet::from([disclosure.anonymous.key]) {
            return Err(EscrowError::InvalidPledge("pledger key does not match the disclosed identity".to_string()));
        }
        proposal.transaction.verify_signatures_except(&self.legal_keys())?;
        debug!("pledge proposal accepted counterparty={} tx_id={}", counterparty, ledger.id.short());
        Ok(ledger)
    }

    /// Ends a campaign this party manages, settling with every pledger.
    ///
    /// A scheduled trigger that finds nothing to do returns [`EndResult::Skipped`]; the same
    /// situations are errors when the end was requested explicitly.
    pub async fn end_campaign(&self, campaign_id: CampaignId, trigger: EndTrigger) -> Result<EndResult> {
        let skip_or = |reason: SkipReason, err: EscrowError| match trigger {
            EndTrigger::Scheduled => {
                debug!("scheduled end skipped campaign_id={} reason={:?}", campaign_id.short(), reason);
                Ok(EndResult::Skipped(reason))
            }
            EndTrigger::Manual => Err(err),
        };

        if self.store.campaign_status(&campaign_id)?.is_some_and(|status| status.is_terminal()) {
            return skip_or(SkipReason::AlreadyEnded, EscrowError::CampaignNotActive(campaign_id.short()));
        }
        let (current, campaign) = self.current_campaign(&campaign_id)?;
        if campaign.manager.id != self.party.id {
            return skip_or(SkipReason::NotManager, EscrowError::NotManager { party: self.party.id.to_string(), campaign_id: campaign_id.short() });
        }
        let now = self.now_nanos();
        if now < campaign.deadline_nanos {
            return skip_or(
                SkipReason::DeadlineNotReached,
                EscrowError::InvalidEnd(format!("deadline {} not reached at {}", campaign.deadline_nanos, now)),
            );
        }
        if !self.lock_ending()?.insert(campaign_id) {
            return skip_or(SkipReason::InProgress, EscrowError::CampaignNotActive(campaign_id.short()));
        }

        let outcome = decide_outcome(&campaign);
        let result = match outcome {
            Ok(outcome) => {
                info!(
                    "ending campaign campaign_id={} trigger={:?} outcome={:?} raised={} target={}",
                    campaign_id.short(),
                    trigger,
                    outcome,
                    campaign.raised_so_far,
                    campaign.target
                );
                match self.store.outstanding_pledges(&campaign_id) {
                    Ok(pledges) => self.settle(current, pledges, outcome).await.map(|transaction| (outcome, transaction)),
                    Err(err) => Err(err),
                }
            }
            Err(err) => Err(err),
        };
        self.lock_ending()?.remove(&campaign_id);

        let (outcome, transaction) = result?;
        self.observer.on_campaign_ended(&campaign_id, outcome, &transaction.id()?);
        Ok(EndResult::Settled { outcome, transaction })
    }
}
