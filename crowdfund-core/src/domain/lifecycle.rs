use crate::domain::command::{CampaignCommand, Command};
use crate::domain::model::Campaign;
use crate::domain::transaction::WireTransaction;
use crate::foundation::{EscrowError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndOutcome {
    Success,
    Failure,
}

/// Status of a campaign as seen from a party's local records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CampaignStatus {
    Active,
    Ended(EndOutcome),
}

pub const VALID_TRANSITIONS: &[(CampaignStatus, CampaignStatus)] = &[
    (CampaignStatus::Active, CampaignStatus::Active),
    (CampaignStatus::Active, CampaignStatus::Ended(EndOutcome::Success)),
    (CampaignStatus::Active, CampaignStatus::Ended(EndOutcome::Failure)),
];

impl CampaignStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, CampaignStatus::Ended(_))
    }

    pub fn can_transition_to(self, target: CampaignStatus) -> bool {
        VALID_TRANSITIONS.iter().any(|(from, to)| *from == self && *to == target)
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CampaignStatus::Active => f.write_str("active"),
            CampaignStatus::Ended(EndOutcome::Success) => f.write_str("ended(success)"),
            CampaignStatus::Ended(EndOutcome::Failure) => f.write_str("ended(failure)"),
        }
    }
}

pub fn validate_transition(from: CampaignStatus, to: CampaignStatus) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(EscrowError::InvalidStateTransition { from: from.to_string(), to: to.to_string() })
    }
}

/// Success iff the raised amount reached the target.
pub fn decide_outcome(campaign: &Campaign) -> Result<EndOutcome> {
    if campaign.target_reached()? {
        Ok(EndOutcome::Success)
    } else {
        Ok(EndOutcome::Failure)
    }
}

/// Status a transaction moves its campaign into, if it carries a campaign command.
pub fn status_after(tx: &WireTransaction) -> Option<CampaignStatus> {
    tx.commands.iter().find_map(|command| match &command.command {
        Command::Campaign(CampaignCommand::Start | CampaignCommand::AcceptPledge) => Some(CampaignStatus::Active),
        Command::Campaign(CampaignCommand::End { payee: Some(_) }) => Some(CampaignStatus::Ended(EndOutcome::Success)),
        Command::Campaign(CampaignCommand::End { payee: None }) => Some(CampaignStatus::Ended(EndOutcome::Failure)),
        _ => None,
    })
}
