//! Settlement of an ended campaign: one atomic transaction across the manager and every pledger.

use crate::application::node::PartyNode;
use crate::application::provenance::collect_dependencies;
use crate::domain::cash_selection::generate_spend;
use crate::domain::command::{CashCommand, Command};
use crate::domain::lifecycle::EndOutcome;
use crate::domain::model::{Pledge, Record, RecordRef, ResolvedRecord};
use crate::domain::settlement::{build_end_transaction, merge_payloads, Outcome, SettlementPayload};
use crate::domain::transaction::{ResolvedTransaction, SignedTransaction, TransactionSignature};
use crate::domain::verification::verify;
use crate::foundation::{Amount, AnonymousParty, EscrowError, PartyId, PublicKey, Result, TransactionId};
use crate::infrastructure::identity::Resolution;
use crate::infrastructure::transport::{Protocol, Session, SessionMessage};
use futures_util::future::{join_all, try_join_all};
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};

/// Pledges held by one well-known party, with the total they owe.
struct PledgerShare {
    party: PartyId,
    total: Amount,
}

impl PartyNode {
    /// Builds, signs, notarises and distributes the end transaction for `campaign`.
    pub(crate) async fn settle(&self, campaign: ResolvedRecord, pledges: Vec<ResolvedRecord>, outcome: EndOutcome) -> Result<SignedTransaction> {
        let shares = self.pledger_shares(&pledges)?;
        let mut sessions = match outcome {
            EndOutcome::Success => {
                try_join_all(shares.iter().map(|share| self.transport.open_session(&share.party, Protocol::Settlement))).await?
            }
            EndOutcome::Failure => self.open_reachable(&shares).await,
        };

        let settled = match outcome {
            EndOutcome::Failure => self.settle_failure(&campaign, &pledges, &mut sessions).await,
            EndOutcome::Success => self.settle_success(&campaign, &pledges, &shares, &mut sessions).await,
        };
        let resolved = match settled {
            Ok(resolved) => resolved,
            Err(err) => {
                let reason = err.to_string();
                join_all(sessions.iter_mut().map(|session| session.reject(reason.clone()))).await;
                return Err(err);
            }
        };
        self.distribute_final(&resolved, &mut sessions).await?;

        if self.config.settlement.broadcast_to_observers {
            let exclude: BTreeSet<PartyId> = shares.into_iter().map(|share| share.party).collect();
            self.broadcast_to_observers(&resolved, &exclude).await;
        }
        Ok(resolved.transaction)
    }

    /// Groups pledges by the party behind each confidential pledger key.
    fn pledger_shares(&self, pledges: &[ResolvedRecord]) -> Result<Vec<PledgerShare>> {
        let mut totals: BTreeMap<PartyId, Amount> = BTreeMap::new();
        for resolved in pledges {
            let pledge = resolved.record.as_pledge().ok_or_else(|| EscrowError::RecordNotFound(format!("pledge at {}", resolved.reference)))?;
            let party = match self.identities.resolve_anonymous(&pledge.pledger)? {
                Resolution::Known(party) => party,
                Resolution::Unknown => return Err(EscrowError::UnknownIdentity(pledge.pledger.key.short())),
            };
            let total = match totals.remove(&party.id) {
                Some(total) => total.checked_add(&pledge.amount)?,
                None => pledge.amount.clone(),
            };
            totals.insert(party.id, total);
        }
        Ok(totals.into_iter().map(|(party, total)| PledgerShare { party, total }).collect())
    }

    /// Cancelling needs no pledger signatures, so pledgers that cannot be reached are only told afterwards if at all.
    async fn open_reachable(&self, shares: &[PledgerShare]) -> Vec<Session> {
        let opened = join_all(shares.iter().map(|share| self.transport.open_session(&share.party, Protocol::Settlement))).await;
        let mut sessions = Vec::with_capacity(opened.len());
        for (share, result) in shares.iter().zip(opened) {
            match result {
                Ok(session) => sessions.push(session),
                Err(err) => warn!("pledger unreachable, cancelling without it counterparty={} owed={} error={}", share.party, share.total, err),
            }
        }
        sessions
    }

    async fn settle_failure(&self, campaign: &ResolvedRecord, pledges: &[ResolvedRecord], sessions: &mut [Session]) -> Result<ResolvedTransaction> {
        let sent = join_all(sessions.iter_mut().map(|session| async move {
            let counterparty = session.counterparty().clone();
            (counterparty, session.send(SessionMessage::Outcome(Outcome::Failure)).await)
        }))
        .await;
        for (counterparty, result) in sent {
            if let Err(err) = result {
                warn!("pledger not told of cancellation counterparty={} error={}", counterparty, err);
            }
        }
        let proposal = build_end_transaction(campaign, pledges, None, None, self.notary.identity().id.clone(), self.now_nanos())?;
        let signed = self.verify_and_sign(&proposal, &self.legal_keys())?;
        let finalized = self.notarise(signed).await?;
        self.record(&finalized)?;
        info!("campaign ended without reaching target campaign_ref={} pledges={} tx_id={}", campaign.reference, pledges.len(), finalized.id()?.short());
        Ok(ResolvedTransaction { transaction: finalized, inputs: proposal.inputs })
    }

    async fn settle_success(
        &self,
        campaign: &ResolvedRecord,
        pledges: &[ResolvedRecord],
        shares: &[PledgerShare],
        sessions: &mut [Session],
    ) -> Result<ResolvedTransaction> {
        let payee = AnonymousParty { key: self.keys.fresh_key()? };
        self.identities.register_own(&self.party, &payee)?;
        let outcome = Outcome::Success { campaign: campaign.clone(), payee };

        let payloads = try_join_all(
            sessions.iter_mut().zip(shares.iter()).map(|(session, share)| collect_payload(session, outcome.clone(), &payee.key, &share.total)),
        )
        .await?;
        for payload in &payloads {
            self.verify_dependencies(&payload.dependencies, &payload.inputs)?;
        }

        let merged = merge_payloads(payloads.iter())?;
        let proposal =
            build_end_transaction(campaign, pledges, Some(payee.key), Some(&merged), self.notary.identity().id.clone(), self.now_nanos())?;
        let signed = self.verify_and_sign(&proposal, &self.legal_keys())?;
        let request = ResolvedTransaction { transaction: signed.clone(), inputs: proposal.inputs.clone() };
        let tx_id = signed.id()?;
        debug!("requesting settlement signatures tx_id={} pledgers={} inputs={}", tx_id.short(), sessions.len(), merged.inputs.len());

        let signatures = try_join_all(
            sessions.iter_mut().zip(payloads.iter()).map(|(session, payload)| request_signatures(session, request.clone(), tx_id, &payload.signing_keys)),
        )
        .await?;
        let signed = signed.with_signatures(signatures.into_iter().flatten());
        signed.verify_required_signatures()?;

        let finalized = self.notarise(signed).await?;
        self.record(&finalized)?;
        info!(
            "campaign settled campaign_ref={} payee={} raised={} pledgers={} tx_id={}",
            campaign.reference,
            payee.key.short(),
            merged.outputs.iter().filter(|cash| cash.owner == payee.key).map(|cash| u128::from(cash.amount.quantity)).sum::<u128>(),
            sessions.len(),
            finalized.id()?.short()
        );
        Ok(ResolvedTransaction { transaction: finalized, inputs: proposal.inputs })
    }

    /// Sends the finalized transaction to every pledger and waits for them to record it.
    async fn distribute_final(&self, resolved: &ResolvedTransaction, sessions: &mut [Session]) -> Result<()> {
        let tx_id = resolved.id()?;
        let results = join_all(sessions.iter_mut().map(|session| async move {
            let counterparty = session.counterparty().clone();
            let reply = session.send_and_receive(SessionMessage::Finalized(resolved.clone())).await;
            (counterparty, reply)
        }))
        .await;
        for (counterparty, reply) in results {
            match reply {
                Ok(SessionMessage::Recorded { tx_id: acked }) if acked.ct_eq(&tx_id) => {}
                Ok(other) => warn!("pledger did not acknowledge settlement counterparty={} tx_id={} reply={}", counterparty, tx_id.short(), other.kind()),
                Err(err) => warn!("pledger did not acknowledge settlement counterparty={} tx_id={} error={}", counterparty, tx_id.short(), err),
            }
        }
        Ok(())
    }

    /// Pledger side of settlement.
    pub async fn respond_to_settlement(&self, mut session: Session) -> Result<()> {
        let counterparty = session.counterparty().clone();
        let outcome = match session.receive().await? {
            SessionMessage::Outcome(outcome) => outcome,
            other => {
                session.reject(format!("unexpected {}", other.kind())).await;
                return Err(EscrowError::transport("settlement", format!("unexpected {} from {counterparty}", other.kind())));
            }
        };

        let (campaign, payee) = match outcome {
            Outcome::Failure => return self.await_final(&mut session, None).await,
            Outcome::Success { campaign, payee } => (campaign, payee),
        };

        let (payload, own_pledges) = match self.build_payload(&campaign, &payee, &counterparty) {
            Ok(built) => built,
            Err(err) => {
                session.reject(err.to_string()).await;
                return Err(err);
            }
        };
        let request = match session.send_and_receive(SessionMessage::SettlementPayload(payload.clone())).await? {
            SessionMessage::SignatureRequest(request) => request,
            SessionMessage::Rejected { reason } => return Err(EscrowError::settlement_rejected(counterparty.to_string(), reason)),
            other => {
                session.reject(format!("unexpected {}", other.kind())).await;
                return Err(EscrowError::transport("settlement", format!("unexpected {} from {counterparty}", other.kind())));
            }
        };

        if let Err(err) = self.check_signature_request(&request, &payload, &campaign.reference, &own_pledges, &counterparty) {
            session.reject(err.to_string()).await;
            return Err(err);
        }
        let signatures = self.keys.sign_transaction(&request.transaction, &payload.signing_keys)?;
        session.send(SessionMessage::Signatures(signatures)).await?;
        self.await_final(&mut session, Some(request.id()?)).await
    }

    /// Selects cash covering this party's outstanding pledges to `campaign`.
    ///
    /// Returns the payload with the references of the pledges it pays for.
    fn build_payload(&self, campaign: &ResolvedRecord, payee: &AnonymousParty, manager: &PartyId) -> Result<(SettlementPayload, Vec<RecordRef>)> {
        let campaign = campaign.record.as_campaign().ok_or_else(|| EscrowError::RecordNotFound(format!("campaign at {}", campaign.reference)))?;
        if campaign.manager.id != *manager {
            return Err(EscrowError::NotManager { party: manager.to_string(), campaign_id: campaign.id.short() });
        }

        let mut owed: Option<Amount> = None;
        let mut own_pledges = Vec::new();
        for resolved in self.store.outstanding_pledges(&campaign.id)? {
            let Some(pledge) = resolved.record.as_pledge() else { continue };
            if !self.is_own_pledge(pledge)? || !campaign.pledge_ids.contains(&pledge.id) {
                continue;
            }
            own_pledges.push(resolved.reference);
            owed = Some(match owed {
                Some(total) => total.checked_add(&pledge.amount)?,
                None => pledge.amount.clone(),
            });
        }
        let owed = owed.ok_or_else(|| EscrowError::RecordNotFound(format!("pledge by {} to campaign {}", self.party.id, campaign.id.short())))?;

        let available = self.store.unconsumed_cash(&self.keys.owned_keys()?)?;
        let change = self.keys.fresh_key()?;
        let plan = generate_spend(&available, &owed, payee.key, change)?;
        let references: Vec<RecordRef> = plan.inputs.iter().map(|input| input.reference).collect();
        let dependencies = collect_dependencies(self.store.as_ref(), &references)?;
        debug!("settlement payload built campaign_id={} owed={} inputs={} dependencies={}", campaign.id.short(), owed, references.len(), dependencies.len());
        Ok((SettlementPayload::from_plan(plan, dependencies), own_pledges))
    }

    fn is_own_pledge(&self, pledge: &Pledge) -> Result<bool> {
        Ok(matches!(self.identities.resolve_anonymous(&pledge.pledger)?, Resolution::Known(party) if party.id == self.party.id))
    }

    /// Only signs a settlement that spends exactly what this party offered and nothing else of its own.
    fn check_signature_request(
        &self,
        request: &ResolvedTransaction,
        payload: &SettlementPayload,
        campaign_ref: &RecordRef,
        own_pledges: &[RecordRef],
        manager: &PartyId,
    ) -> Result<()> {
        let tx = &request.transaction;
        tx.verify_signatures()?;
        let manager_key = self.network.party(manager)?.ok_or_else(|| EscrowError::UnknownIdentity(manager.to_string()))?.key;
        if !tx.signed_by().contains(&manager_key) {
            return Err(EscrowError::MissingSignatures { tx_id: tx.id()?.short(), missing: vec![manager_key.short()] });
        }

        for input in &request.inputs {
            if let Ok(local) = self.store.load(&input.reference) {
                if local != input.record {
                    return Err(EscrowError::InvalidCashMove(format!("input {} does not match the local record", input.reference)));
                }
            }
        }
        if !tx.tx.inputs.contains(campaign_ref) {
            return Err(EscrowError::InvalidEnd(format!("settlement does not consume campaign {campaign_ref}")));
        }
        if !own_pledges.iter().all(|pledge| tx.tx.inputs.contains(pledge)) {
            return Err(EscrowError::InvalidEnd("settlement leaves own pledges outstanding".to_string()));
        }
        if !payload.inputs.iter().all(|input| tx.tx.inputs.contains(&input.reference)) {
            return Err(EscrowError::InvalidCashMove("settlement omits offered cash".to_string()));
        }
        if !payload.outputs.iter().all(|cash| tx.tx.outputs.contains(&Record::Cash(cash.clone()))) {
            return Err(EscrowError::InvalidCashMove("settlement omits offered outputs".to_string()));
        }

        let ledger = request.ledger()?;
        let move_signers: BTreeSet<PublicKey> = ledger
            .commands
            .iter()
            .filter(|command| command.command == Command::Cash(CashCommand::Move))
            .flat_map(|command| command.signers.iter().copied())
            .collect();
        if !payload.signing_keys.is_subset(&move_signers) {
            return Err(EscrowError::InvalidCashMove("move command omits offered signing keys".to_string()));
        }
        let own_requested: BTreeSet<PublicKey> = self.keys.owned_keys()?.intersection(&tx.required_signers()).copied().collect();
        if own_requested != payload.signing_keys {
            return Err(EscrowError::InvalidCashMove("settlement asks for signatures beyond the offered cash".to_string()));
        }
        verify(&ledger)
    }

    /// Waits for the finalized end transaction, records it and acknowledges.
    async fn await_final(&self, session: &mut Session, expected: Option<TransactionId>) -> Result<()> {
        let counterparty = session.counterparty().clone();
        let finalized = match session.receive().await? {
            SessionMessage::Finalized(finalized) => finalized,
            SessionMessage::Rejected { reason } => return Err(EscrowError::settlement_rejected(counterparty.to_string(), reason)),
            other => return Err(EscrowError::transport("settlement", format!("unexpected {} from {counterparty}", other.kind()))),
        };
        let tx_id = finalized.id()?;
        if expected.is_some_and(|expected| !expected.ct_eq(&tx_id)) {
            session.reject("finalized transaction differs from the one signed").await;
            return Err(EscrowError::settlement_rejected(counterparty.to_string(), format!("unexpected final transaction {}", tx_id.short())));
        }
        finalized.transaction.verify_required_signatures()?;
        let ledger = finalized.ledger()?;
        verify(&ledger)?;
        self.record(&finalized.transaction)?;
        if let Some(campaign) = ledger.campaign_inputs().first() {
            let outcome = if ledger.cash_outputs().is_empty() { EndOutcome::Failure } else { EndOutcome::Success };
            info!("settlement recorded campaign_id={} outcome={:?} tx_id={}", campaign.id.short(), outcome, tx_id.short());
            self.observer.on_campaign_ended(&campaign.id, outcome, &tx_id);
        }
        session.send(SessionMessage::Recorded { tx_id }).await
    }
}

async fn collect_payload(session: &mut Session, outcome: Outcome, payee: &PublicKey, owed: &Amount) -> Result<SettlementPayload> {
    let counterparty = session.counterparty().clone();
    let payload = match session.send_and_receive(SessionMessage::Outcome(outcome)).await? {
        SessionMessage::SettlementPayload(payload) => payload,
        SessionMessage::Rejected { reason } => return Err(EscrowError::settlement_rejected(counterparty.to_string(), reason)),
        other => return Err(EscrowError::transport("settlement", format!("unexpected {} from {counterparty}", other.kind()))),
    };

    let paid = payload.paid_to(payee, owed);
    if paid != u128::from(owed.quantity) {
        return Err(EscrowError::settlement_rejected(counterparty.to_string(), format!("payload pays {paid}, pledged {owed}")));
    }
    let owners_covered = payload.inputs.iter().all(|input| input.record.as_cash().is_some_and(|cash| payload.signing_keys.contains(&cash.owner)));
    if !owners_covered {
        return Err(EscrowError::settlement_rejected(counterparty.to_string(), "payload spends cash its keys do not own"));
    }
    Ok(payload)
}

async fn request_signatures(
    session: &mut Session,
    request: ResolvedTransaction,
    tx_id: TransactionId,
    expected: &BTreeSet<PublicKey>,
) -> Result<Vec<TransactionSignature>> {
    let counterparty = session.counterparty().clone();
    let signatures = match session.send_and_receive(SessionMessage::SignatureRequest(request)).await? {
        SessionMessage::Signatures(signatures) => signatures,
        SessionMessage::Rejected { reason } => return Err(EscrowError::settlement_rejected(counterparty.to_string(), reason)),
        other => return Err(EscrowError::transport("settlement", format!("unexpected {} from {counterparty}", other.kind()))),
    };
    let provided: BTreeSet<PublicKey> = signatures.iter().map(|signature| signature.key).collect();
    if provided != *expected || !signatures.iter().all(|signature| signature.key.verify(tx_id.as_ref(), &signature.signature)) {
        return Err(EscrowError::settlement_rejected(counterparty.to_string(), "signatures do not match the offered keys"));
    }
    Ok(signatures)
}
