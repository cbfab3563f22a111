//! Resolution of keys to well-known parties.
//!
//! Legal keys resolve through the network map. One-off keys resolve only for parties that hold
//! a verified disclosure, or for the party that generated them.

use crate::domain::identity::IdentityDisclosure;
use crate::foundation::{AnonymousParty, EscrowError, Party, PublicKey, Result};
use crate::infrastructure::network::NetworkMap;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    Known(Party),
    Unknown,
}

impl Resolution {
    pub fn party(&self) -> Option<&Party> {
        match self {
            Resolution::Known(party) => Some(party),
            Resolution::Unknown => None,
        }
    }
}

pub trait IdentityService: Send + Sync {
    fn resolve(&self, key: &PublicKey) -> Result<Resolution>;

    /// Verifies the disclosure and remembers the binding.
    fn register_disclosure(&self, disclosure: &IdentityDisclosure) -> Result<()>;

    /// Remembers a binding for a key this party generated itself.
    fn register_own(&self, party: &Party, anonymous: &AnonymousParty) -> Result<()>;

    fn resolve_anonymous(&self, anonymous: &AnonymousParty) -> Result<Resolution> {
        self.resolve(&anonymous.key)
    }
}

pub struct InMemoryIdentityService {
    network: Arc<NetworkMap>,
    confidential: RwLock<HashMap<PublicKey, Party>>,
}

impl InMemoryIdentityService {
    pub fn new(network: Arc<NetworkMap>) -> Self {
        Self { network, confidential: RwLock::new(HashMap::new()) }
    }

    fn bind(&self, key: PublicKey, party: Party) -> Result<()> {
        let mut confidential = self
            .confidential
            .write()
            .map_err(|_| EscrowError::StorageError { operation: "identity write".to_string(), details: "poisoned".to_string() })?;
        confidential.insert(key, party);
        Ok(())
    }
}

impl IdentityService for InMemoryIdentityService {
    fn resolve(&self, key: &PublicKey) -> Result<Resolution> {
        if let Some(party) = self.network.party_for_key(key)? {
            return Ok(Resolution::Known(party));
        }
        let confidential = self
            .confidential
            .read()
            .map_err(|_| EscrowError::StorageError { operation: "identity read".to_string(), details: "poisoned".to_string() })?;
        Ok(confidential.get(key).cloned().map_or(Resolution::Unknown, Resolution::Known))
    }

    fn register_disclosure(&self, disclosure: &IdentityDisclosure) -> Result<()> {
        disclosure.verify()?;
        // The legal key must be the one the network knows for that name.
        match self.network.party(&disclosure.party.id)? {
            Some(known) if known == disclosure.party => {}
            _ => return Err(EscrowError::UnknownIdentity(disclosure.party.key.short())),
        }
        self.bind(disclosure.anonymous.key, disclosure.party.clone())
    }

    fn register_own(&self, party: &Party, anonymous: &AnonymousParty) -> Result<()> {
        self.bind(anonymous.key, party.clone())
    }
}
