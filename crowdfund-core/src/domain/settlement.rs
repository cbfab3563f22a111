use crate::domain::cash_selection::SpendPlan;
use crate::domain::command::{CampaignCommand, CashCommand, Command, PledgeCommand};
use crate::domain::model::{Cash, Record, RecordRef, ResolvedRecord};
use crate::domain::transaction::{ResolvedTransaction, SignedTransaction, TransactionBuilder};
use crate::foundation::{Amount, AnonymousParty, EscrowError, PartyId, PublicKey, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// What the manager tells each pledger when a campaign ends.
///
/// On success the final campaign version travels along, since pledgers only hold the
/// version their own pledge produced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Success { campaign: ResolvedRecord, payee: AnonymousParty },
    Failure,
}

/// A pledger's contribution to the settlement transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementPayload {
    pub inputs: Vec<ResolvedRecord>,
    pub outputs: Vec<Cash>,
    pub signing_keys: BTreeSet<PublicKey>,
    /// Transactions that produced `inputs`, parents first.
    pub dependencies: Vec<SignedTransaction>,
}

impl SettlementPayload {
    pub fn from_plan(plan: SpendPlan, dependencies: Vec<SignedTransaction>) -> Self {
        Self { inputs: plan.inputs, outputs: plan.outputs, signing_keys: plan.signing_keys, dependencies }
    }

    pub fn paid_to(&self, payee: &PublicKey, template: &Amount) -> u128 {
        self.outputs
            .iter()
            .filter(|cash| cash.owner == *payee && cash.amount.same_currency(template))
            .map(|cash| u128::from(cash.amount.quantity))
            .sum()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergedSettlement {
    pub inputs: Vec<ResolvedRecord>,
    pub outputs: Vec<Cash>,
    pub signing_keys: BTreeSet<PublicKey>,
}

/// Concatenates payloads into one cash move. Signing keys are the union across pledgers.
pub fn merge_payloads<'a>(payloads: impl IntoIterator<Item = &'a SettlementPayload>) -> Result<MergedSettlement> {
    let mut merged = MergedSettlement::default();
    let mut seen: HashSet<RecordRef> = HashSet::new();
    for payload in payloads {
        for input in &payload.inputs {
            if input.record.as_cash().is_none() {
                return Err(EscrowError::InvalidCashMove(format!("settlement input {} is not cash", input.reference)));
            }
            if !seen.insert(input.reference) {
                return Err(EscrowError::InvalidCashMove(format!("settlement input {} offered twice", input.reference)));
            }
            merged.inputs.push(input.clone());
        }
        merged.outputs.extend(payload.outputs.iter().cloned());
        merged.signing_keys.extend(payload.signing_keys.iter().copied());
    }
    Ok(merged)
}

/// Builds the single transaction that ends a campaign.
///
/// Consumes the campaign and every outstanding pledge. On success `payee` is set and `cash`
/// carries the merged payloads under one move command.
pub fn build_end_transaction(
    campaign: &ResolvedRecord,
    pledges: &[ResolvedRecord],
    payee: Option<PublicKey>,
    cash: Option<&MergedSettlement>,
    notary: PartyId,
    timestamp_nanos: u64,
) -> Result<ResolvedTransaction> {
    let Some(record) = campaign.record.as_campaign() else {
        return Err(EscrowError::RecordNotFound(format!("campaign at {}", campaign.reference)));
    };
    let manager = record.manager.key;

    let mut builder = TransactionBuilder::new(notary, timestamp_nanos);
    builder.add_input(campaign.clone());
    builder.add_inputs(pledges.iter().cloned());
    builder.add_command(Command::Campaign(CampaignCommand::End { payee }), [manager]);
    if !pledges.is_empty() {
        builder.add_command(Command::Pledge(PledgeCommand::Cancel), [manager]);
    }
    if let Some(cash) = cash {
        builder.add_inputs(cash.inputs.iter().cloned());
        for output in &cash.outputs {
            builder.add_output(Record::Cash(output.clone()));
        }
        builder.add_command(Command::Cash(CashCommand::Move), cash.signing_keys.iter().copied());
    }
    Ok(builder.build())
}
