//! Transaction chains backing records handed between parties.

use crate::application::node::PartyNode;
use crate::domain::model::{RecordRef, ResolvedRecord};
use crate::domain::transaction::SignedTransaction;
use crate::domain::verification::verify;
use crate::foundation::{EscrowError, Result, TransactionId};
use crate::infrastructure::storage::RecordStore;
use log::debug;
use std::collections::{HashMap, HashSet};

/// Every transaction the given records descend from, parents before children.
pub fn collect_dependencies(store: &dyn RecordStore, references: &[RecordRef]) -> Result<Vec<SignedTransaction>> {
    let mut visited = HashSet::new();
    let mut chain = Vec::new();
    for reference in references {
        visit(store, reference.tx_id, &mut visited, &mut chain)?;
    }
    Ok(chain)
}

fn visit(store: &dyn RecordStore, id: TransactionId, visited: &mut HashSet<TransactionId>, chain: &mut Vec<SignedTransaction>) -> Result<()> {
    if !visited.insert(id) {
        return Ok(());
    }
    let tx = store.get_transaction(&id)?.ok_or_else(|| EscrowError::RecordNotFound(format!("transaction {}", id.short())))?;
    for input in &tx.tx.inputs {
        visit(store, input.tx_id, visited, chain)?;
    }
    chain.push(tx);
    Ok(())
}

impl PartyNode {
    /// Checks a received chain and the records it is offered for, then keeps the chain.
    ///
    /// Each transaction must carry every required signature plus the notary's, and pass the
    /// engine against inputs resolved from earlier links or local storage.
    pub fn verify_dependencies(&self, dependencies: &[SignedTransaction], records: &[ResolvedRecord]) -> Result<()> {
        let mut known: HashMap<TransactionId, &SignedTransaction> = HashMap::new();
        for tx in dependencies {
            let id = tx.id()?;
            tx.verify_required_signatures()?;
            let notary = self
                .network
                .party(&tx.tx.notary)?
                .ok_or_else(|| EscrowError::UnknownIdentity(format!("notary {}", tx.tx.notary)))?;
            if !tx.signed_by().contains(&notary.key) {
                return Err(EscrowError::MissingSignatures { tx_id: id.short(), missing: vec![notary.key.short()] });
            }
            let ledger = tx.tx.resolve(|reference| match known.get(&reference.tx_id) {
                Some(parent) => parent
                    .tx
                    .outputs
                    .get(reference.index as usize)
                    .cloned()
                    .ok_or_else(|| EscrowError::RecordNotFound(reference.to_string())),
                None => self.store.load(reference),
            })?;
            verify(&ledger)?;
            known.insert(id, tx);
        }

        for record in records {
            let reference = &record.reference;
            let produced = match known.get(&reference.tx_id) {
                Some(parent) => parent.tx.outputs.get(reference.index as usize).cloned(),
                None => self.store.load(reference).ok(),
            };
            if produced.as_ref() != Some(&record.record) {
                return Err(EscrowError::RecordNotFound(format!("{reference} is not backed by its producing transaction")));
            }
        }

        for tx in dependencies {
            self.store.store_dependency(tx)?;
        }
        debug!("verified dependency chain party={} transactions={} records={}", self.party.id, dependencies.len(), records.len());
        Ok(())
    }
}
