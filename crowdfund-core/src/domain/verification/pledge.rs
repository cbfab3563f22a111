use super::{check, signer_set, single_command};
use crate::domain::command::{Command, CommandWithSigners, PledgeCommand};
use crate::domain::model::{Pledge, RecordKind};
use crate::domain::transaction::LedgerTransaction;
use crate::domain::verification::group_records;
use crate::foundation::{EscrowError, Result};

pub(super) fn verify(tx: &LedgerTransaction) -> Result<()> {
    let command = single_command(tx, RecordKind::Pledge)?;
    match &command.command {
        Command::Pledge(PledgeCommand::Create) => verify_create(tx, command),
        Command::Pledge(PledgeCommand::Cancel) => verify_cancel(tx, command),
        other => Err(EscrowError::UnrecognisedCommand(other.to_string())),
    }
}

fn verify_create(tx: &LedgerTransaction, command: &CommandWithSigners) -> Result<()> {
    let fail = EscrowError::InvalidPledge;

    let groups = group_records(&tx.pledge_inputs(), &tx.pledge_outputs(), |pledge: &Pledge| pledge.campaign_id);
    check(groups.len() == 1, fail, "pledges for exactly one campaign may be created")?;
    let group = &groups[0];
    check(group.inputs.is_empty(), fail, "no pledge may be consumed when creating one")?;
    check(group.outputs.len() == 1, fail, "exactly one pledge must be created")?;
    let pledge = group.outputs[0];

    check(pledge.amount.is_positive(), fail, "pledged amount must be positive")?;
    let campaign = tx.campaign_outputs().into_iter().find(|campaign| campaign.id == pledge.campaign_id);
    let Some(campaign) = campaign else {
        return Err(fail("the pledged campaign must be part of the transaction".to_string()));
    };
    check(pledge.manager == campaign.manager, fail, "pledge manager must be the campaign manager")?;
    check(pledge.amount.same_currency(&campaign.target), fail, "pledge currency must match the campaign target")?;
    check(command.signers == signer_set([pledge.pledger.key, pledge.manager.key]), fail, "pledger and manager must both sign")?;
    Ok(())
}

fn verify_cancel(tx: &LedgerTransaction, command: &CommandWithSigners) -> Result<()> {
    let fail = EscrowError::InvalidCancel;

    let groups = group_records(&tx.pledge_inputs(), &tx.pledge_outputs(), |pledge: &Pledge| pledge.id);
    for group in &groups {
        check(group.outputs.is_empty(), fail, "a cancelled pledge must not be re-created")?;
        check(group.inputs.len() == 1, fail, "each pledge may only be cancelled once")?;
    }

    let campaigns = tx.campaign_inputs();
    check(campaigns.len() == 1, fail, "exactly one campaign must be consumed alongside cancelled pledges")?;
    let campaign = campaigns[0];
    check(
        groups.iter().flat_map(|group| group.inputs.iter()).all(|pledge| pledge.campaign_id == campaign.id),
        fail,
        "cancelled pledges must reference the consumed campaign",
    )?;
    check(command.signers.contains(&campaign.manager.key), fail, "the manager must sign the cancellation")?;
    Ok(())
}
