use crate::domain::lifecycle::CampaignStatus;
use crate::domain::model::{Record, RecordKind, RecordRef, ResolvedRecord};
use crate::domain::transaction::{LedgerTransaction, SignedTransaction, WireTransaction};
use crate::foundation::{CampaignId, PublicKey, Result, TransactionId};
use std::collections::BTreeSet;

/// A party's local view of the ledger.
///
/// Only transactions passed to [`RecordStore::record_transaction`] affect which records are
/// considered live; dependencies are kept purely so their outputs can be resolved.
pub trait RecordStore: Send + Sync {
    /// Returns `false` when the transaction was already recorded.
    fn record_transaction(&self, tx: &SignedTransaction) -> Result<bool>;
    fn store_dependency(&self, tx: &SignedTransaction) -> Result<()>;
    fn get_transaction(&self, id: &TransactionId) -> Result<Option<SignedTransaction>>;
    fn is_recorded(&self, id: &TransactionId) -> Result<bool>;
    fn load(&self, reference: &RecordRef) -> Result<Record>;
    fn is_consumed(&self, reference: &RecordRef) -> Result<bool>;
    /// Unconsumed records from recorded transactions that satisfy `predicate`, ordered by reference.
    fn query(&self, predicate: &dyn Fn(&ResolvedRecord) -> bool) -> Result<Vec<ResolvedRecord>>;
    fn campaign_status(&self, id: &CampaignId) -> Result<Option<CampaignStatus>>;

    fn current_campaign(&self, id: &CampaignId) -> Result<Option<ResolvedRecord>> {
        let found = self.query(&|resolved| resolved.record.as_campaign().is_some_and(|campaign| campaign.id == *id))?;
        Ok(found.into_iter().next())
    }

    fn outstanding_pledges(&self, campaign_id: &CampaignId) -> Result<Vec<ResolvedRecord>> {
        self.query(&|resolved| resolved.record.as_pledge().is_some_and(|pledge| pledge.campaign_id == *campaign_id))
    }

    fn unconsumed_cash(&self, owners: &BTreeSet<PublicKey>) -> Result<Vec<ResolvedRecord>> {
        self.query(&|resolved| resolved.record.as_cash().is_some_and(|cash| owners.contains(&cash.owner)))
    }

    fn unconsumed_of_kind(&self, kind: RecordKind) -> Result<Vec<ResolvedRecord>> {
        self.query(&|resolved| resolved.record.kind() == kind)
    }

    fn resolve(&self, tx: &WireTransaction) -> Result<LedgerTransaction> {
        tx.resolve(|reference| self.load(reference))
    }
}
