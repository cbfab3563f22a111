use super::{check, signer_set, single_command};
use crate::domain::command::{CampaignCommand, CashCommand, Command, CommandWithSigners, PledgeCommand};
use crate::domain::model::{Campaign, RecordKind};
use crate::domain::transaction::LedgerTransaction;
use crate::domain::verification::group_records;
use crate::foundation::{Amount, CampaignId, EscrowError, PledgeId, PublicKey, Result, MAX_CAMPAIGN_NAME_LENGTH};
use std::collections::BTreeSet;

pub(super) fn verify(tx: &LedgerTransaction) -> Result<()> {
    let command = single_command(tx, RecordKind::Campaign)?;
    match &command.command {
        Command::Campaign(CampaignCommand::Start) => verify_start(tx, command),
        Command::Campaign(CampaignCommand::AcceptPledge) => verify_accept_pledge(tx, command),
        Command::Campaign(CampaignCommand::End { payee }) => verify_end(tx, command, payee.as_ref()),
        other => Err(EscrowError::UnrecognisedCommand(other.to_string())),
    }
}

fn verify_start(tx: &LedgerTransaction, command: &CommandWithSigners) -> Result<()> {
    let fail = EscrowError::InvalidStart;
    check(tx.inputs.is_empty(), fail, "no inputs may be consumed when starting a campaign")?;
    let outputs = tx.campaign_outputs();
    check(tx.outputs.len() == 1 && outputs.len() == 1, fail, "exactly one output, the new campaign, must be produced")?;
    let campaign = outputs[0];

    check(!campaign.name.trim().is_empty(), fail, "campaign name must not be empty")?;
    check(campaign.name.len() <= MAX_CAMPAIGN_NAME_LENGTH, fail, "campaign name is too long")?;
    check(campaign.target.is_positive(), fail, "target must be positive")?;
    check(
        campaign.raised_so_far == Amount::zero(campaign.target.currency.clone()),
        fail,
        "raised amount must start at zero in the target currency",
    )?;
    check(campaign.version == 0, fail, "a new campaign must start at version zero")?;
    check(campaign.pledge_ids.is_empty(), fail, "a new campaign must have no outstanding pledges")?;
    check(campaign.deadline_nanos >= tx.timestamp_nanos, fail, "deadline must not be in the past")?;
    check(command.signers == signer_set([campaign.manager.key]), fail, "only the manager signs the start")?;
    Ok(())
}

fn verify_accept_pledge(tx: &LedgerTransaction, command: &CommandWithSigners) -> Result<()> {
    let fail = EscrowError::InvalidPledge;

    let affected: BTreeSet<CampaignId> = tx
        .campaign_inputs()
        .iter()
        .chain(tx.campaign_outputs().iter())
        .map(|campaign| campaign.id)
        .chain(tx.pledge_inputs().iter().chain(tx.pledge_outputs().iter()).map(|pledge| pledge.campaign_id))
        .collect();
    check(affected.len() == 1, fail, "exactly one campaign may be affected by a pledge")?;

    let groups = group_records(&tx.campaign_inputs(), &tx.campaign_outputs(), |campaign: &Campaign| campaign.id);
    check(groups.len() == 1, fail, "exactly one campaign group must be present")?;
    let group = &groups[0];
    check(group.inputs.len() == 1, fail, "exactly one campaign must be consumed")?;
    check(group.outputs.len() == 1, fail, "exactly one campaign must be produced")?;
    let (input, output) = (group.inputs[0], group.outputs[0]);

    check(tx.pledge_inputs().is_empty(), fail, "no pledge may be consumed when pledging")?;
    let pledges = tx.pledge_outputs();
    check(pledges.len() == 1, fail, "exactly one pledge must be produced")?;
    let pledge = pledges[0];
    check(tx.cash_inputs().is_empty() && tx.cash_outputs().is_empty(), fail, "no cash may move when pledging")?;

    check(output.name == input.name, fail, "campaign name must not change")?;
    check(output.target == input.target, fail, "campaign target must not change")?;
    check(output.deadline_nanos == input.deadline_nanos, fail, "campaign deadline must not change")?;
    check(output.manager == input.manager, fail, "campaign manager must not change")?;
    check(output.version == input.version.saturating_add(1), fail, "campaign version must advance by one")?;

    check(pledge.amount.is_positive(), fail, "pledged amount must be positive")?;
    let delta = output.raised_so_far.checked_sub(&input.raised_so_far).map_err(|_| fail("raised amount must not decrease".to_string()))?;
    check(delta == pledge.amount, fail, "raised amount must grow by exactly the pledged amount")?;

    check(!input.pledge_ids.contains(&pledge.id), fail, "pledge has already been accepted")?;
    let mut expected_ids: BTreeSet<PledgeId> = input.pledge_ids.clone();
    expected_ids.insert(pledge.id);
    check(output.pledge_ids == expected_ids, fail, "outstanding pledges must gain exactly the new pledge")?;

    check(tx.timestamp_nanos < input.deadline_nanos, fail, "pledges are closed once the deadline has passed")?;
    check(command.signers == signer_set([input.manager.key]), fail, "only the manager signs pledge acceptance")?;
    Ok(())
}

fn verify_end(tx: &LedgerTransaction, command: &CommandWithSigners, payee: Option<&PublicKey>) -> Result<()> {
    let fail = EscrowError::InvalidEnd;

    let inputs = tx.campaign_inputs();
    check(inputs.len() == 1, fail, "exactly one campaign must be consumed")?;
    check(tx.campaign_outputs().is_empty(), fail, "no campaign may be produced when ending")?;
    let campaign = inputs[0];

    check(command.signers == signer_set([campaign.manager.key]), fail, "only the manager signs the end")?;
    check(tx.timestamp_nanos >= campaign.deadline_nanos, fail, "a campaign cannot end before its deadline")?;

    let pledges = tx.pledge_inputs();
    check(tx.pledge_outputs().is_empty(), fail, "no pledge may be produced when ending")?;
    check(pledges.iter().all(|pledge| pledge.campaign_id == campaign.id), fail, "every consumed pledge must reference the ending campaign")?;
    let consumed_ids: BTreeSet<PledgeId> = pledges.iter().map(|pledge| pledge.id).collect();
    check(consumed_ids.len() == pledges.len(), fail, "a pledge may only be consumed once")?;
    check(consumed_ids == campaign.pledge_ids, fail, "every outstanding pledge must be consumed")?;

    let mut pledged = Amount::zero(campaign.target.currency.clone());
    for pledge in &pledges {
        pledged = pledged.checked_add(&pledge.amount).map_err(|err| fail(format!("pledge amounts cannot be summed: {err}")))?;
    }
    check(pledged == campaign.raised_so_far, fail, "pledged amounts must total the raised amount")?;
    if !pledges.is_empty() {
        check(tx.has_command(&Command::Pledge(PledgeCommand::Cancel)), fail, "consumed pledges must be cancelled")?;
    }

    let reached = campaign.target_reached().map_err(|err| fail(err.to_string()))?;
    match (reached, payee) {
        (true, Some(payee)) => {
            check(tx.has_command(&Command::Cash(CashCommand::Move)), fail, "a successful end must move cash")?;
            let paid: u128 = tx
                .cash_outputs()
                .iter()
                .filter(|cash| cash.owner == *payee && cash.amount.currency == campaign.target.currency)
                .map(|cash| u128::from(cash.amount.quantity))
                .sum();
            check(paid == u128::from(campaign.raised_so_far.quantity), fail, "cash paid to the payee must equal the raised amount")
        }
        (false, None) => {
            let no_cash = tx.cash_inputs().is_empty() && tx.cash_outputs().is_empty() && tx.commands_for(RecordKind::Cash).is_empty();
            check(no_cash, fail, "a failed campaign must not move cash")
        }
        (true, None) => Err(fail("a successful end must name a payee".to_string())),
        (false, Some(_)) => Err(fail("a failed end must not name a payee".to_string())),
    }
}
