use crate::foundation::util::encoding::hash_with_domain;
use crate::foundation::{AnonymousParty, EscrowError, Hash32, Party, Result, IDENTITY_PROOF_DOMAIN};
use serde::{Deserialize, Serialize};

/// Binds a one-off key to a well-known party. Sent only to the counterparty that must resolve it.
///
/// Both keys sign the binding: the legal key vouches for the one-off key, and the one-off key
/// proves it is controlled by the same party.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityDisclosure {
    pub party: Party,
    pub anonymous: AnonymousParty,
    pub legal_proof: Vec<u8>,
    pub anonymous_proof: Vec<u8>,
}

impl IdentityDisclosure {
    pub fn binding_message(party: &Party, anonymous: &AnonymousParty) -> Result<Hash32> {
        hash_with_domain(IDENTITY_PROOF_DOMAIN, &(party, anonymous))
    }

    pub fn verify(&self) -> Result<()> {
        let message = Self::binding_message(&self.party, &self.anonymous)?;
        if !self.party.key.verify(&message, &self.legal_proof) {
            return Err(EscrowError::InvalidSignature { key: self.party.key.short() });
        }
        if !self.anonymous.key.verify(&message, &self.anonymous_proof) {
            return Err(EscrowError::InvalidSignature { key: self.anonymous.key.short() });
        }
        Ok(())
    }
}
