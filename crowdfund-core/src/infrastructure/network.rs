//! Directory of well-known parties on the network.

use crate::foundation::{EscrowError, Party, PartyId, PublicKey, Result};
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PartyRole {
    Participant,
    Notary,
    /// Issues cash; takes no part in campaigns and receives no broadcasts.
    Issuer,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkEntry {
    pub party: Party,
    pub role: PartyRole,
}

#[derive(Default)]
pub struct NetworkMap {
    entries: RwLock<BTreeMap<PartyId, NetworkEntry>>,
}

impl NetworkMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<PartyId, NetworkEntry>>> {
        self.entries.read().map_err(|_| EscrowError::StorageError { operation: "network map read".to_string(), details: "poisoned".to_string() })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<PartyId, NetworkEntry>>> {
        self.entries.write().map_err(|_| EscrowError::StorageError { operation: "network map write".to_string(), details: "poisoned".to_string() })
    }

    pub fn register(&self, party: Party, role: PartyRole) -> Result<()> {
        self.write()?.insert(party.id.clone(), NetworkEntry { party, role });
        Ok(())
    }

    pub fn party(&self, id: &PartyId) -> Result<Option<Party>> {
        Ok(self.read()?.get(id).map(|entry| entry.party.clone()))
    }

    pub fn party_for_key(&self, key: &PublicKey) -> Result<Option<Party>> {
        Ok(self.read()?.values().find(|entry| entry.party.key == *key).map(|entry| entry.party.clone()))
    }

    /// Every campaign participant, ordered by id.
    pub fn participants(&self) -> Result<Vec<Party>> {
        Ok(self.read()?.values().filter(|entry| entry.role == PartyRole::Participant).map(|entry| entry.party.clone()).collect())
    }

    pub fn is_notary(&self, id: &PartyId) -> Result<bool> {
        Ok(self.read()?.get(id).is_some_and(|entry| entry.role == PartyRole::Notary))
    }

    pub fn is_issuer(&self, id: &PartyId) -> Result<bool> {
        Ok(self.read()?.get(id).is_some_and(|entry| entry.role == PartyRole::Issuer))
    }
}
