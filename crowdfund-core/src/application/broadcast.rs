//! Best-effort distribution of finalized transactions to parties outside them.

use crate::application::node::PartyNode;
use crate::domain::transaction::ResolvedTransaction;
use crate::domain::verification::verify;
use crate::foundation::{EscrowError, PartyId, Result};
use crate::infrastructure::transport::{Protocol, Session, SessionMessage};
use futures_util::future::join_all;
use log::{debug, info, warn};
use std::collections::BTreeSet;

impl PartyNode {
    /// Sends `resolved` to every participant other than this party, the excluded parties and
    /// the transaction's own signers. Returns the number of successful deliveries.
    ///
    /// Failures are logged and never undo the transaction.
    pub async fn broadcast_to_observers(&self, resolved: &ResolvedTransaction, exclude: &BTreeSet<PartyId>) -> usize {
        let targets = match self.observer_targets(resolved, exclude) {
            Ok(targets) => targets,
            Err(err) => {
                warn!("broadcast skipped party={} error={}", self.party.id, err);
                return 0;
            }
        };
        let deliveries = join_all(targets.iter().map(|target| async move { (target, self.deliver(target, resolved).await) })).await;

        let mut delivered = 0;
        for (target, result) in deliveries {
            match result {
                Ok(()) => delivered += 1,
                Err(err) => warn!("broadcast delivery failed from={} to={} error={}", self.party.id, target, err),
            }
        }
        debug!("broadcast complete from={} delivered={} targets={}", self.party.id, delivered, targets.len());
        delivered
    }

    fn observer_targets(&self, resolved: &ResolvedTransaction, exclude: &BTreeSet<PartyId>) -> Result<Vec<PartyId>> {
        let signers = resolved.transaction.required_signers();
        Ok(self
            .network
            .participants()?
            .into_iter()
            .filter(|party| party.id != self.party.id && !exclude.contains(&party.id) && !signers.contains(&party.key))
            .map(|party| party.id)
            .collect())
    }

    async fn deliver(&self, target: &PartyId, resolved: &ResolvedTransaction) -> Result<()> {
        let mut session = self.transport.open_session(target, Protocol::Broadcast).await?;
        session.send(SessionMessage::Broadcast(resolved.clone())).await
    }

    /// Receiving side of a broadcast.
    pub async fn record_as_observer(&self, mut session: Session) -> Result<bool> {
        let counterparty = session.counterparty().clone();
        let resolved = match session.receive().await? {
            SessionMessage::Broadcast(resolved) => resolved,
            other => return Err(EscrowError::transport("broadcast", format!("unexpected {} from {counterparty}", other.kind()))),
        };
        let fresh = self.record_observed(&resolved)?;
        if fresh {
            let tx_id = resolved.id()?;
            info!("observed transaction from={} tx_id={}", counterparty, tx_id.short());
            self.observer.on_transaction_observed(&counterparty, &tx_id);
        }
        Ok(fresh)
    }

    /// Checks a transaction this party did not take part in and records it.
    pub fn record_observed(&self, resolved: &ResolvedTransaction) -> Result<bool> {
        for input in &resolved.inputs {
            if let Ok(local) = self.store.load(&input.reference) {
                if local != input.record {
                    return Err(EscrowError::Message(format!("observed input {} does not match the local record", input.reference)));
                }
            }
        }
        resolved.transaction.verify_required_signatures()?;
        verify(&resolved.ledger()?)?;
        self.record(&resolved.transaction)
    }
}
