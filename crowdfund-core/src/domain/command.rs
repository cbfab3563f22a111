use crate::domain::model::RecordKind;
use crate::foundation::PublicKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CampaignCommand {
    Start,
    AcceptPledge,
    /// `payee` is the manager's one-off receiving key on success, absent on failure.
    End { payee: Option<PublicKey> },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PledgeCommand {
    Create,
    Cancel,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CashCommand {
    Issue,
    Move,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    Campaign(CampaignCommand),
    Pledge(PledgeCommand),
    Cash(CashCommand),
}

impl Command {
    /// Record kind whose rules govern this command.
    pub fn governs(&self) -> RecordKind {
        match self {
            Command::Campaign(_) => RecordKind::Campaign,
            Command::Pledge(_) => RecordKind::Pledge,
            Command::Cash(_) => RecordKind::Cash,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Campaign(CampaignCommand::Start) => f.write_str("campaign.start"),
            Command::Campaign(CampaignCommand::AcceptPledge) => f.write_str("campaign.accept_pledge"),
            Command::Campaign(CampaignCommand::End { payee: Some(_) }) => f.write_str("campaign.end(success)"),
            Command::Campaign(CampaignCommand::End { payee: None }) => f.write_str("campaign.end(failure)"),
            Command::Pledge(PledgeCommand::Create) => f.write_str("pledge.create"),
            Command::Pledge(PledgeCommand::Cancel) => f.write_str("pledge.cancel"),
            Command::Cash(CashCommand::Issue) => f.write_str("cash.issue"),
            Command::Cash(CashCommand::Move) => f.write_str("cash.move"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandWithSigners {
    pub command: Command,
    pub signers: BTreeSet<PublicKey>,
}

impl CommandWithSigners {
    pub fn new(command: Command, signers: impl IntoIterator<Item = PublicKey>) -> Self {
        Self { command, signers: signers.into_iter().collect() }
    }
}
