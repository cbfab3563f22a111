use crate::fixtures::*;
use crowdfund_core::domain::{
    build_end_transaction, merge_payloads, verify, CampaignCommand, Command, PledgeCommand, Record, SettlementPayload,
};
use crowdfund_core::foundation::{EscrowError, PartyId};
use std::collections::BTreeSet;

fn payload(inputs: Vec<(u64, u8)>, payee: u8, change: Option<(u64, u8)>) -> SettlementPayload {
    let issuer = manager();
    let total: u64 = inputs.iter().map(|(quantity, _)| quantity).sum();
    let change_quantity = change.map_or(0, |(quantity, _)| quantity);
    let mut outputs = vec![cash(total - change_quantity, key(payee), &issuer)];
    if let Some((quantity, owner)) = change {
        outputs.push(cash(quantity, key(owner), &issuer));
    }
    SettlementPayload {
        signing_keys: inputs.iter().map(|(_, owner)| key(*owner)).collect(),
        inputs: inputs.into_iter().map(|(quantity, owner)| resolved(Record::Cash(cash(quantity, key(owner), &issuer)))).collect(),
        outputs,
        dependencies: Vec::new(),
    }
}

#[test]
fn test_merge_payloads_when_disjoint_then_signing_keys_unioned() {
    let first = payload(vec![(600, 60)], 50, None);
    let second = payload(vec![(300, 61), (200, 62)], 50, Some((100, 63)));

    let merged = merge_payloads([&first, &second]).expect("merge");

    assert_eq!(merged.inputs.len(), 3);
    assert_eq!(merged.outputs.len(), 3);
    assert_eq!(merged.signing_keys, BTreeSet::from([key(60), key(61), key(62)]));
}

#[test]
fn test_merge_payloads_when_input_offered_twice_then_invalid_move() {
    let first = payload(vec![(600, 60)], 50, None);
    let mut second = payload(vec![(400, 61)], 50, None);
    second.inputs.push(first.inputs[0].clone());

    let err = merge_payloads([&first, &second]).expect_err("duplicate");
    assert!(matches!(err, EscrowError::InvalidCashMove(_)));
}

#[test]
fn test_merge_payloads_when_input_not_cash_then_invalid_move() {
    let mut offered = payload(vec![(600, 60)], 50, None);
    offered.inputs.push(resolved(Record::Campaign(campaign(10))));

    let err = merge_payloads([&offered]).expect_err("not cash");
    assert!(matches!(err, EscrowError::InvalidCashMove(_)));
}

#[test]
fn test_paid_to_when_change_present_then_counts_payee_only() {
    let offered = payload(vec![(700, 60)], 50, Some((100, 61)));
    assert_eq!(offered.paid_to(&key(50), &gbp(0)), 600);
    assert_eq!(offered.paid_to(&key(50), &usd(0)), 0);
}

#[test]
fn test_build_end_transaction_when_target_reached_then_engine_accepts() {
    let (record, pledges) = pledged_campaign(1000, &[600, 400]);
    let campaign_ref = resolved(Record::Campaign(record.clone()));
    let first = payload(vec![(600, 60)], 50, None);
    let second = payload(vec![(500, 61)], 50, Some((100, 61)));
    let merged = merge_payloads([&first, &second]).expect("merge");

    let proposal =
        build_end_transaction(&campaign_ref, &pledges, Some(key(50)), Some(&merged), PartyId::from(NOTARY_NAME), DEADLINE).expect("build");

    let commands: Vec<&Command> = proposal.transaction.tx.commands.iter().map(|command| &command.command).collect();
    assert!(commands.contains(&&Command::Pledge(PledgeCommand::Cancel)));
    assert_eq!(proposal.transaction.required_signers(), BTreeSet::from([record.manager.key, key(60), key(61)]));
    assert!(verify(&proposal.ledger().expect("ledger")).is_ok());
}

#[test]
fn test_build_end_transaction_when_no_pledges_then_no_cancel_command() {
    let record = campaign(1000);
    let campaign_ref = resolved(Record::Campaign(record.clone()));

    let proposal = build_end_transaction(&campaign_ref, &[], None, None, PartyId::from(NOTARY_NAME), DEADLINE).expect("build");

    let commands: Vec<&Command> = proposal.transaction.tx.commands.iter().map(|command| &command.command).collect();
    assert_eq!(commands, vec![&Command::Campaign(CampaignCommand::End { payee: None })]);
    assert!(verify(&proposal.ledger().expect("ledger")).is_ok());
}

#[test]
fn test_build_end_transaction_when_target_missed_then_failure_verifies() {
    let (record, pledges) = pledged_campaign(1000, &[300, 200]);
    let campaign_ref = resolved(Record::Campaign(record));

    let proposal = build_end_transaction(&campaign_ref, &pledges, None, None, PartyId::from(NOTARY_NAME), DEADLINE).expect("build");

    assert!(proposal.transaction.tx.outputs.is_empty());
    assert!(verify(&proposal.ledger().expect("ledger")).is_ok());
}

#[test]
fn test_build_end_transaction_when_record_not_campaign_then_error() {
    let not_campaign = resolved(Record::Cash(cash(10, key(60), &manager())));
    let err = build_end_transaction(&not_campaign, &[], None, None, PartyId::from(NOTARY_NAME), DEADLINE).expect_err("not campaign");
    assert!(matches!(err, EscrowError::RecordNotFound(_)));
}
