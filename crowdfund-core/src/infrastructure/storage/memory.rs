use crate::domain::lifecycle::{status_after, validate_transition, CampaignStatus};
use crate::domain::model::{Record, RecordRef, ResolvedRecord};
use crate::domain::transaction::SignedTransaction;
use crate::foundation::{CampaignId, EscrowError, Result, TransactionId};
use crate::infrastructure::storage::RecordStore;
use log::debug;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

struct MemoryInner {
    transactions: HashMap<TransactionId, SignedTransaction>,
    recorded: HashSet<TransactionId>,
    consumed: HashMap<RecordRef, TransactionId>,
    unconsumed: BTreeMap<RecordRef, Record>,
    status: HashMap<CampaignId, CampaignStatus>,
}

impl MemoryInner {
    fn new() -> Self {
        Self {
            transactions: HashMap::new(),
            recorded: HashSet::new(),
            consumed: HashMap::new(),
            unconsumed: BTreeMap::new(),
            status: HashMap::new(),
        }
    }

    fn load(&self, reference: &RecordRef) -> Result<Record> {
        self.transactions
            .get(&reference.tx_id)
            .and_then(|tx| tx.tx.outputs.get(reference.index as usize))
            .cloned()
            .ok_or_else(|| EscrowError::RecordNotFound(reference.to_string()))
    }

    /// Campaign affected by `tx`: from its outputs or, for an end, from whichever consumed campaign
    /// or pledge this store can resolve.
    fn affected_campaign(&self, tx: &SignedTransaction) -> Option<CampaignId> {
        if let Some(campaign) = tx.tx.outputs.iter().find_map(Record::as_campaign) {
            return Some(campaign.id);
        }
        tx.tx.inputs.iter().find_map(|reference| match self.load(reference).ok()? {
            Record::Campaign(campaign) => Some(campaign.id),
            Record::Pledge(pledge) => Some(pledge.campaign_id),
            Record::Cash(_) => None,
        })
    }
}

pub struct MemoryRecordStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(MemoryInner::new())) }
    }

    fn lock_inner(&self) -> Result<MutexGuard<'_, MemoryInner>> {
        self.inner
            .lock()
            .map_err(|_| EscrowError::StorageError { operation: "memory record store lock".to_string(), details: "poisoned".to_string() })
    }
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for MemoryRecordStore {
    fn record_transaction(&self, tx: &SignedTransaction) -> Result<bool> {
        let id = tx.id()?;
        let mut inner = self.lock_inner()?;
        if inner.recorded.contains(&id) {
            return Ok(false);
        }

        let transition = match (status_after(&tx.tx), inner.affected_campaign(tx)) {
            (Some(next), Some(campaign_id)) => {
                if let Some(current) = inner.status.get(&campaign_id).copied() {
                    validate_transition(current, next)?;
                }
                Some((campaign_id, next))
            }
            _ => None,
        };

        for reference in &tx.tx.inputs {
            inner.unconsumed.remove(reference);
            inner.consumed.insert(*reference, id);
        }
        for (index, record) in tx.tx.outputs.iter().enumerate() {
            let reference = RecordRef::new(id, index as u32);
            if !inner.consumed.contains_key(&reference) {
                inner.unconsumed.insert(reference, record.clone());
            }
        }
        if let Some((campaign_id, next)) = transition {
            inner.status.insert(campaign_id, next);
        }
        inner.transactions.insert(id, tx.clone());
        inner.recorded.insert(id);
        debug!("recorded transaction tx_id={} inputs={} outputs={}", id.short(), tx.tx.inputs.len(), tx.tx.outputs.len());
        Ok(true)
    }

    fn store_dependency(&self, tx: &SignedTransaction) -> Result<()> {
        let id = tx.id()?;
        let mut inner = self.lock_inner()?;
        inner.transactions.entry(id).or_insert_with(|| tx.clone());
        Ok(())
    }

    fn get_transaction(&self, id: &TransactionId) -> Result<Option<SignedTransaction>> {
        Ok(self.lock_inner()?.transactions.get(id).cloned())
    }

    fn is_recorded(&self, id: &TransactionId) -> Result<bool> {
        Ok(self.lock_inner()?.recorded.contains(id))
    }

    fn load(&self, reference: &RecordRef) -> Result<Record> {
        self.lock_inner()?.load(reference)
    }

    fn is_consumed(&self, reference: &RecordRef) -> Result<bool> {
        Ok(self.lock_inner()?.consumed.contains_key(reference))
    }

    fn query(&self, predicate: &dyn Fn(&ResolvedRecord) -> bool) -> Result<Vec<ResolvedRecord>> {
        let inner = self.lock_inner()?;
        Ok(inner
            .unconsumed
            .iter()
            .map(|(reference, record)| ResolvedRecord::new(*reference, record.clone()))
            .filter(|resolved| predicate(resolved))
            .collect())
    }

    fn campaign_status(&self, id: &CampaignId) -> Result<Option<CampaignStatus>> {
        Ok(self.lock_inner()?.status.get(id).copied())
    }
}
