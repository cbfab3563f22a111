use crate::foundation::{EscrowError, Result};
use ed25519_dalek::{Signature, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

pub type Hash32 = [u8; 32];

macro_rules! define_id_type {
    (string $name:ident) => {
        #[derive(Clone, Debug, Default, Eq, Hash, PartialEq, PartialOrd, Ord, Deserialize, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &Self::Target {
                self.as_str()
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };

    (hash $name:ident) => {
        #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, PartialOrd, Ord, Deserialize, Serialize)]
        #[serde(transparent)]
        pub struct $name(Hash32);

        impl $name {
            pub const fn new(value: Hash32) -> Self {
                Self(value)
            }

            pub fn random() -> Self {
                Self(rand::random::<Hash32>())
            }

            pub fn as_hash(&self) -> &Hash32 {
                &self.0
            }

            pub fn ct_eq(&self, other: &Self) -> bool {
                use subtle::ConstantTimeEq;
                bool::from(self.0.as_ref().ct_eq(other.0.as_ref()))
            }

            /// First eight hex characters, for log lines.
            pub fn short(&self) -> String {
                hex::encode(&self.0[..4])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                for byte in self.0 {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }

        impl From<Hash32> for $name {
            fn from(value: Hash32) -> Self {
                Self(value)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }
    };
}

define_id_type!(string PartyId);
define_id_type!(hash CampaignId);
define_id_type!(hash PledgeId);
define_id_type!(hash TransactionId);
define_id_type!(hash SessionId);

/// Ed25519 verifying key bytes. Ordering is bytewise so signer sets are stable.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn verifying_key(&self) -> Result<VerifyingKey> {
        Ok(VerifyingKey::from_bytes(&self.0)?)
    }

    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let Ok(key) = self.verifying_key() else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        key.verify_strict(message, &signature).is_ok()
    }

    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl From<VerifyingKey> for PublicKey {
    fn from(key: VerifyingKey) -> Self {
        Self(key.to_bytes())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// ISO-style currency code, e.g. `GBP`.
#[derive(Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Currency(String);

impl Currency {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Quantity of a single currency in its smallest unit.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
pub struct Amount {
    pub quantity: u64,
    pub currency: Currency,
}

impl Amount {
    pub fn new(quantity: u64, currency: Currency) -> Self {
        Self { quantity, currency }
    }

    pub fn zero(currency: Currency) -> Self {
        Self { quantity: 0, currency }
    }

    pub fn is_positive(&self) -> bool {
        self.quantity > 0
    }

    pub fn same_currency(&self, other: &Amount) -> bool {
        self.currency == other.currency
    }

    fn require_same_currency(&self, other: &Amount) -> Result<()> {
        if !self.same_currency(other) {
            return Err(EscrowError::CurrencyMismatch { expected: self.currency.to_string(), actual: other.currency.to_string() });
        }
        Ok(())
    }

    pub fn checked_add(&self, other: &Amount) -> Result<Amount> {
        self.require_same_currency(other)?;
        let quantity = self
            .quantity
            .checked_add(other.quantity)
            .ok_or_else(|| EscrowError::Message(format!("amount overflow adding {} to {}", other, self)))?;
        Ok(Amount::new(quantity, self.currency.clone()))
    }

    pub fn checked_sub(&self, other: &Amount) -> Result<Amount> {
        self.require_same_currency(other)?;
        let quantity = self
            .quantity
            .checked_sub(other.quantity)
            .ok_or_else(|| EscrowError::Message(format!("amount underflow subtracting {} from {}", other, self)))?;
        Ok(Amount::new(quantity, self.currency.clone()))
    }

    pub fn less_than(&self, other: &Amount) -> Result<bool> {
        self.require_same_currency(other)?;
        Ok(self.quantity < other.quantity)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.quantity, self.currency)
    }
}

/// A well-known network participant: a legal name bound to its long-lived key.
#[derive(Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Deserialize, Serialize)]
pub struct Party {
    pub id: PartyId,
    pub key: PublicKey,
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// A participant known only by a one-off key; resolving it to a [`Party`] needs a disclosure.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Deserialize, Serialize)]
pub struct AnonymousParty {
    pub key: PublicKey,
}

impl fmt::Display for AnonymousParty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "anonymous({})", self.key.short())
    }
}
