use super::{check, single_command};
use crate::domain::command::{CashCommand, Command, CommandWithSigners};
use crate::domain::model::RecordKind;
use crate::domain::transaction::LedgerTransaction;
use crate::foundation::{Currency, EscrowError, PublicKey, Result};
use std::collections::BTreeMap;

pub(super) fn verify(tx: &LedgerTransaction) -> Result<()> {
    let command = single_command(tx, RecordKind::Cash)?;
    match &command.command {
        Command::Cash(CashCommand::Issue) => verify_issue(tx, command),
        Command::Cash(CashCommand::Move) => verify_move(tx, command),
        other => Err(EscrowError::UnrecognisedCommand(other.to_string())),
    }
}

fn verify_issue(tx: &LedgerTransaction, command: &CommandWithSigners) -> Result<()> {
    let fail = EscrowError::InvalidCashIssue;
    check(tx.cash_inputs().is_empty(), fail, "issuance must not consume cash")?;
    let outputs = tx.cash_outputs();
    check(!outputs.is_empty(), fail, "issuance must produce cash")?;
    check(outputs.iter().all(|cash| cash.amount.is_positive()), fail, "issued amounts must be positive")?;
    check(outputs.iter().all(|cash| command.signers.contains(&cash.issuer.key)), fail, "the issuer must sign the issuance")?;
    Ok(())
}

fn verify_move(tx: &LedgerTransaction, command: &CommandWithSigners) -> Result<()> {
    let fail = EscrowError::InvalidCashMove;
    let inputs = tx.cash_inputs();
    let outputs = tx.cash_outputs();
    check(!inputs.is_empty(), fail, "a move must consume cash")?;
    check(outputs.iter().all(|cash| cash.amount.is_positive()), fail, "cash outputs must be positive")?;

    // (issuer, currency) -> (consumed, produced)
    let mut balances: BTreeMap<(PublicKey, Currency), (u128, u128)> = BTreeMap::new();
    for cash in &inputs {
        balances.entry((cash.issuer.key, cash.amount.currency.clone())).or_default().0 += u128::from(cash.amount.quantity);
    }
    for cash in &outputs {
        balances.entry((cash.issuer.key, cash.amount.currency.clone())).or_default().1 += u128::from(cash.amount.quantity);
    }
    check(balances.values().all(|(consumed, produced)| consumed == produced), fail, "cash must be conserved per issuer and currency")?;
    check(inputs.iter().all(|cash| command.signers.contains(&cash.owner)), fail, "every input owner must sign the move")?;
    Ok(())
}
