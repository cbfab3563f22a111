//! Verification engine: pure judgement of a resolved transaction.
//!
//! Rules are dispatched per record kind present in the transaction. Every party runs the same
//! engine before signing, recording or forwarding, so the outcome depends on nothing but the
//! transaction itself (including its proposal timestamp).

mod campaign;
mod cash;
mod pledge;

pub mod grouping;

use crate::domain::command::CommandWithSigners;
use crate::domain::model::RecordKind;
use crate::domain::transaction::LedgerTransaction;
use crate::foundation::{EscrowError, PublicKey, Result};
use std::collections::BTreeSet;

pub use grouping::{group_records, RecordGroup};

pub fn verify(tx: &LedgerTransaction) -> Result<()> {
    if tx.commands.is_empty() {
        return Err(EscrowError::MissingCommand { kind: "any".to_string() });
    }

    let kinds = tx.record_kinds();
    if kinds.contains(&RecordKind::Campaign) {
        campaign::verify(tx)?;
    }
    if kinds.contains(&RecordKind::Pledge) {
        pledge::verify(tx)?;
    }
    if kinds.contains(&RecordKind::Cash) {
        cash::verify(tx)?;
    }

    // A command whose record kind is absent would otherwise escape every rule set.
    for command in &tx.commands {
        if !kinds.contains(&command.command.governs()) {
            return Err(EscrowError::UnrecognisedCommand(format!("{} governs no record in this transaction", command.command)));
        }
    }
    Ok(())
}

fn single_command(tx: &LedgerTransaction, kind: RecordKind) -> Result<&CommandWithSigners> {
    let commands = tx.commands_for(kind);
    match commands.as_slice() {
        [] => Err(EscrowError::MissingCommand { kind: kind.to_string() }),
        [command] => Ok(command),
        _ => Err(EscrowError::AmbiguousCommand { kind: kind.to_string(), count: commands.len() }),
    }
}

fn check(condition: bool, error: fn(String) -> EscrowError, message: &str) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(error(message.to_string()))
    }
}

fn signer_set(keys: impl IntoIterator<Item = PublicKey>) -> BTreeSet<PublicKey> {
    keys.into_iter().collect()
}
