use crate::domain::model::{Cash, ResolvedRecord};
use crate::foundation::{Amount, EscrowError, Party, PublicKey, Result};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

/// Cash to consume and produce for a single payment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpendPlan {
    pub inputs: Vec<ResolvedRecord>,
    pub outputs: Vec<Cash>,
    pub signing_keys: BTreeSet<PublicKey>,
}

/// Selects cash covering `amount` and splits it into a payment to `payee` plus change.
///
/// Largest records are taken first (ties broken by reference) so the plan is deterministic.
/// Outputs are emitted per issuer, which keeps the move conserving value per issuer.
pub fn generate_spend(available: &[ResolvedRecord], amount: &Amount, payee: PublicKey, change_owner: PublicKey) -> Result<SpendPlan> {
    if !amount.is_positive() {
        return Err(EscrowError::InvalidCashMove("spend amount must be positive".to_string()));
    }

    let mut candidates: Vec<(&ResolvedRecord, &Cash)> = available
        .iter()
        .filter_map(|resolved| resolved.record.as_cash().map(|cash| (resolved, cash)))
        .filter(|(_, cash)| cash.amount.same_currency(amount))
        .collect();
    candidates.sort_by_key(|(resolved, cash)| (Reverse(cash.amount.quantity), resolved.reference));

    let mut selected = Vec::new();
    let mut gathered: u64 = 0;
    for (resolved, cash) in candidates.iter().copied() {
        if gathered >= amount.quantity {
            break;
        }
        gathered = gathered.saturating_add(cash.amount.quantity);
        selected.push((resolved, cash));
    }
    if gathered < amount.quantity {
        let available_total = candidates.iter().fold(0u64, |acc, (_, cash)| acc.saturating_add(cash.amount.quantity));
        return Err(EscrowError::InsufficientFunds {
            required: amount.to_string(),
            available: Amount::new(available_total, amount.currency.clone()).to_string(),
        });
    }

    // issuer -> (paid, change)
    let mut split: BTreeMap<Party, (u64, u64)> = BTreeMap::new();
    let mut remaining = amount.quantity;
    for (_, cash) in &selected {
        let pay = cash.amount.quantity.min(remaining);
        remaining -= pay;
        let entry = split.entry(cash.issuer.clone()).or_default();
        entry.0 += pay;
        entry.1 += cash.amount.quantity - pay;
    }

    let mut outputs = Vec::new();
    for (issuer, (paid, change)) in split {
        if paid > 0 {
            outputs.push(Cash { amount: Amount::new(paid, amount.currency.clone()), owner: payee, issuer: issuer.clone() });
        }
        if change > 0 {
            outputs.push(Cash { amount: Amount::new(change, amount.currency.clone()), owner: change_owner, issuer });
        }
    }

    Ok(SpendPlan {
        inputs: selected.iter().map(|(resolved, _)| (*resolved).clone()).collect(),
        outputs,
        signing_keys: selected.iter().map(|(_, cash)| cash.owner).collect(),
    })
}
