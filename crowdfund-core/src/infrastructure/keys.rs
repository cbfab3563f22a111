//! Signing keys held by a party: one long-lived legal key plus one-off confidential keys.

use crate::domain::identity::IdentityDisclosure;
use crate::domain::transaction::{SignedTransaction, TransactionSignature};
use crate::foundation::{AnonymousParty, EscrowError, Party, PublicKey, Result};
use ed25519_dalek::{Signer, SigningKey};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

pub trait KeyManager: Send + Sync {
    fn legal_key(&self) -> PublicKey;

    /// Generates and retains a new confidential key.
    fn fresh_key(&self) -> Result<PublicKey>;

    fn owned_keys(&self) -> Result<BTreeSet<PublicKey>>;

    fn sign(&self, key: &PublicKey, message: &[u8]) -> Result<Vec<u8>>;

    fn owns(&self, key: &PublicKey) -> Result<bool> {
        Ok(self.owned_keys()?.contains(key))
    }

    /// Signs the transaction id with every key in `keys`.
    fn sign_transaction(&self, tx: &SignedTransaction, keys: &BTreeSet<PublicKey>) -> Result<Vec<TransactionSignature>> {
        let id = tx.id()?;
        keys.iter().map(|key| Ok(TransactionSignature { key: *key, signature: self.sign(key, id.as_ref())? })).collect()
    }

    /// Proves to a chosen counterparty that `anonymous` belongs to `party`.
    fn disclose(&self, party: &Party, anonymous: &AnonymousParty) -> Result<IdentityDisclosure> {
        let message = IdentityDisclosure::binding_message(party, anonymous)?;
        Ok(IdentityDisclosure {
            party: party.clone(),
            anonymous: *anonymous,
            legal_proof: self.sign(&party.key, &message)?,
            anonymous_proof: self.sign(&anonymous.key, &message)?,
        })
    }
}

pub struct LocalKeyManager {
    legal: SigningKey,
    confidential: Mutex<HashMap<PublicKey, SigningKey>>,
}

impl LocalKeyManager {
    pub fn generate() -> Self {
        Self::from_seed(rand::random::<[u8; 32]>())
    }

    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self { legal: SigningKey::from_bytes(&seed), confidential: Mutex::new(HashMap::new()) }
    }

    fn lock_confidential(&self) -> Result<MutexGuard<'_, HashMap<PublicKey, SigningKey>>> {
        self.confidential
            .lock()
            .map_err(|_| EscrowError::CryptoError { operation: "confidential key lock".to_string(), details: "poisoned".to_string() })
    }
}

impl KeyManager for LocalKeyManager {
    fn legal_key(&self) -> PublicKey {
        PublicKey::from(self.legal.verifying_key())
    }

    fn fresh_key(&self) -> Result<PublicKey> {
        let signing = SigningKey::from_bytes(&rand::random::<[u8; 32]>());
        let public = PublicKey::from(signing.verifying_key());
        self.lock_confidential()?.insert(public, signing);
        Ok(public)
    }

    fn owned_keys(&self) -> Result<BTreeSet<PublicKey>> {
        let mut keys: BTreeSet<PublicKey> = self.lock_confidential()?.keys().copied().collect();
        keys.insert(self.legal_key());
        Ok(keys)
    }

    fn sign(&self, key: &PublicKey, message: &[u8]) -> Result<Vec<u8>> {
        if *key == self.legal_key() {
            return Ok(self.legal.sign(message).to_bytes().to_vec());
        }
        let confidential = self.lock_confidential()?;
        let signing = confidential
            .get(key)
            .ok_or_else(|| EscrowError::CryptoError { operation: "sign".to_string(), details: format!("key {} not held", key.short()) })?;
        Ok(signing.sign(message).to_bytes().to_vec())
    }
}
