//! Ordering service: the single authority that lets a record version be consumed at most once.

use crate::domain::model::RecordRef;
use crate::domain::transaction::{SignedTransaction, TransactionSignature};
use crate::foundation::{Clock, EscrowError, Party, PartyId, Result, TransactionId};
use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey};
use log::{info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConflictingSpend {
    pub record: RecordRef,
    pub consumed_by: TransactionId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NotarisationResult {
    Committed { tx_id: TransactionId, signature: TransactionSignature },
    Rejected(ConflictingSpend),
}

#[async_trait]
pub trait Notary: Send + Sync {
    fn identity(&self) -> &Party;

    /// Commits `tx` if every required signature is present and none of its inputs was consumed before.
    async fn submit(&self, tx: &SignedTransaction) -> Result<NotarisationResult>;
}

pub struct InMemoryNotary {
    party: Party,
    signing_key: SigningKey,
    clock: Arc<dyn Clock>,
    tolerance_nanos: u64,
    consumed: Mutex<HashMap<RecordRef, TransactionId>>,
}

impl InMemoryNotary {
    pub fn new(name: impl Into<PartyId>, seed: [u8; 32], clock: Arc<dyn Clock>, tolerance_nanos: u64) -> Self {
        let signing_key = SigningKey::from_bytes(&seed);
        let party = Party { id: name.into(), key: signing_key.verifying_key().into() };
        Self { party, signing_key, clock, tolerance_nanos, consumed: Mutex::new(HashMap::new()) }
    }

    fn check_timestamp(&self, timestamp_nanos: u64) -> Result<()> {
        let now_nanos = self.clock.now_nanos();
        if now_nanos.abs_diff(timestamp_nanos) > self.tolerance_nanos {
            return Err(EscrowError::TimestampOutOfTolerance { timestamp_nanos, now_nanos, tolerance_nanos: self.tolerance_nanos });
        }
        Ok(())
    }
}

#[async_trait]
impl Notary for InMemoryNotary {
    fn identity(&self) -> &Party {
        &self.party
    }

    async fn submit(&self, tx: &SignedTransaction) -> Result<NotarisationResult> {
        let tx_id = tx.id()?;
        if tx.tx.notary != self.party.id {
            return Err(EscrowError::Message(format!("transaction {} names notary {}, not {}", tx_id.short(), tx.tx.notary, self.party.id)));
        }
        tx.verify_required_signatures()?;
        self.check_timestamp(tx.tx.timestamp_nanos)?;

        let mut consumed = self
            .consumed
            .lock()
            .map_err(|_| EscrowError::StorageError { operation: "notary lock".to_string(), details: "poisoned".to_string() })?;
        if let Some((record, consumed_by)) = tx.tx.inputs.iter().find_map(|input| consumed.get(input).map(|by| (*input, *by))) {
            warn!("notary rejected double spend tx_id={} record={} consumed_by={}", tx_id.short(), record, consumed_by.short());
            return Ok(NotarisationResult::Rejected(ConflictingSpend { record, consumed_by }));
        }
        for input in &tx.tx.inputs {
            consumed.insert(*input, tx_id);
        }
        drop(consumed);

        let signature = TransactionSignature { key: self.party.key, signature: self.signing_key.sign(tx_id.as_ref()).to_bytes().to_vec() };
        info!("notary committed tx_id={} inputs={}", tx_id.short(), tx.tx.inputs.len());
        Ok(NotarisationResult::Committed { tx_id, signature })
    }
}
