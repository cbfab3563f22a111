use crate::foundation::{Amount, AnonymousParty, CampaignId, EscrowError, Party, PledgeId, PublicKey, Result, TransactionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A fundraising drive owned by its manager.
///
/// The record is superseded (consumed and re-emitted with `version + 1`) on every accepted
/// pledge and consumed without replacement when the campaign ends.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub version: u64,
    pub name: String,
    pub manager: Party,
    pub target: Amount,
    pub raised_so_far: Amount,
    pub deadline_nanos: u64,
    pub pledge_ids: BTreeSet<PledgeId>,
}

impl Campaign {
    pub fn new(name: impl Into<String>, manager: Party, target: Amount, deadline_nanos: u64) -> Self {
        let raised_so_far = Amount::zero(target.currency.clone());
        Self {
            id: CampaignId::random(),
            version: 0,
            name: name.into(),
            manager,
            target,
            raised_so_far,
            deadline_nanos,
            pledge_ids: BTreeSet::new(),
        }
    }

    pub fn participants(&self) -> Vec<PublicKey> {
        vec![self.manager.key]
    }

    /// Successor record after accepting `pledge`.
    pub fn with_pledge(&self, pledge: &Pledge) -> Result<Campaign> {
        if pledge.campaign_id != self.id {
            return Err(EscrowError::InvalidPledge(format!("pledge references campaign {}, not {}", pledge.campaign_id.short(), self.id.short())));
        }
        let mut next = self.clone();
        next.version = self.version.saturating_add(1);
        next.raised_so_far = self.raised_so_far.checked_add(&pledge.amount)?;
        next.pledge_ids.insert(pledge.id);
        Ok(next)
    }

    pub fn target_reached(&self) -> Result<bool> {
        Ok(!self.raised_so_far.less_than(&self.target)?)
    }
}

/// A commitment by a confidential pledger towards one campaign.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pledge {
    pub id: PledgeId,
    pub amount: Amount,
    pub pledger: AnonymousParty,
    pub manager: Party,
    pub campaign_id: CampaignId,
}

impl Pledge {
    pub fn new(amount: Amount, pledger: AnonymousParty, manager: Party, campaign_id: CampaignId) -> Self {
        Self { id: PledgeId::random(), amount, pledger, manager, campaign_id }
    }

    pub fn participants(&self) -> Vec<PublicKey> {
        vec![self.pledger.key, self.manager.key]
    }
}

/// Fungible value owned by a single key. Conservation is judged per issuer and currency.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cash {
    pub amount: Amount,
    pub owner: PublicKey,
    pub issuer: Party,
}

impl Cash {
    pub fn participants(&self) -> Vec<PublicKey> {
        vec![self.owner]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    Campaign,
    Pledge,
    Cash,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordKind::Campaign => "campaign",
            RecordKind::Pledge => "pledge",
            RecordKind::Cash => "cash",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Record {
    Campaign(Campaign),
    Pledge(Pledge),
    Cash(Cash),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Campaign(_) => RecordKind::Campaign,
            Record::Pledge(_) => RecordKind::Pledge,
            Record::Cash(_) => RecordKind::Cash,
        }
    }

    pub fn participants(&self) -> Vec<PublicKey> {
        match self {
            Record::Campaign(campaign) => campaign.participants(),
            Record::Pledge(pledge) => pledge.participants(),
            Record::Cash(cash) => cash.participants(),
        }
    }

    pub fn as_campaign(&self) -> Option<&Campaign> {
        match self {
            Record::Campaign(campaign) => Some(campaign),
            _ => None,
        }
    }

    pub fn as_pledge(&self) -> Option<&Pledge> {
        match self {
            Record::Pledge(pledge) => Some(pledge),
            _ => None,
        }
    }

    pub fn as_cash(&self) -> Option<&Cash> {
        match self {
            Record::Cash(cash) => Some(cash),
            _ => None,
        }
    }
}

/// Position of a record in the output list of the transaction that produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordRef {
    pub tx_id: TransactionId,
    pub index: u32,
}

impl RecordRef {
    pub fn new(tx_id: TransactionId, index: u32) -> Self {
        Self { tx_id, index }
    }
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_id.short(), self.index)
    }
}

/// A record together with the reference that locates it on the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRecord {
    pub reference: RecordRef,
    pub record: Record,
}

impl ResolvedRecord {
    pub fn new(reference: RecordRef, record: Record) -> Self {
        Self { reference, record }
    }
}
