use crate::fixtures::*;
use crowdfund_core::application::{EndResult, EndTrigger, SkipReason};
use crowdfund_core::domain::{CampaignCommand, CampaignStatus, CashCommand, Command, EndOutcome, Record};
use crowdfund_core::foundation::{AnonymousParty, Currency, EscrowError, PartyId, PublicKey};
use crowdfund_core::infrastructure::identity::Resolution;
use crowdfund_core::infrastructure::keys::KeyManager;
use std::collections::BTreeSet;
use std::sync::Arc;

fn gbp_currency() -> Currency {
    Currency::new(CURRENCY)
}

#[tokio::test]
async fn test_campaign_when_single_pledge_meets_target_then_manager_paid() {
    let net = TestNetwork::default_network().await;
    let manager = net.node("PartyA");
    let pledger = net.node("PartyB");
    net.fund("PartyB", gbp(1000)).await;

    let campaign_id = net.start_visible("PartyA", gbp(1000), DEADLINE).await;
    pledger.make_pledge(gbp(1000), campaign_id, true).await.expect("pledge");
    assert_eq!(manager.campaign(&campaign_id).expect("campaign").expect("live").raised_so_far, gbp(1000));

    net.set_time(DEADLINE);
    let result = manager.end_campaign(campaign_id, EndTrigger::Manual).await.expect("end");
    let EndResult::Settled { outcome, transaction } = result else {
        panic!("expected settlement");
    };
    assert_eq!(outcome, EndOutcome::Success);
    assert!(transaction.verify_required_signatures().is_ok());

    assert_eq!(manager.cash_balance(&gbp_currency()).expect("balance"), gbp(1000));
    assert_eq!(pledger.cash_balance(&gbp_currency()).expect("balance"), gbp(0));
    for node in [&manager, &pledger] {
        assert!(node.campaign(&campaign_id).expect("campaign").is_none());
        assert!(node.store().outstanding_pledges(&campaign_id).expect("pledges").is_empty());
        assert_eq!(node.store().campaign_status(&campaign_id).expect("status"), Some(CampaignStatus::Ended(EndOutcome::Success)));
    }
}

#[tokio::test]
async fn test_campaign_when_nobody_pledges_then_ends_in_failure_without_cash() {
    let net = TestNetwork::default_network().await;
    let manager = net.node("PartyA");
    let campaign_id = net.start_visible("PartyA", gbp(1000), T0).await;

    let result = manager.end_campaign(campaign_id, EndTrigger::Manual).await.expect("end");
    let EndResult::Settled { outcome, transaction } = result else {
        panic!("expected settlement");
    };
    assert_eq!(outcome, EndOutcome::Failure);
    assert_eq!(transaction.tx.inputs.len(), 1);
    assert!(transaction.tx.outputs.is_empty());
    assert_eq!(transaction.tx.commands.len(), 1);
    assert_eq!(manager.cash_balance(&gbp_currency()).expect("balance"), gbp(0));
}

#[tokio::test]
async fn test_pledge_when_two_pledgers_race_on_same_version_then_one_double_spends() {
    let net = TestNetwork::default_network().await;
    let campaign_id = net.start_visible("PartyA", gbp(1000), DEADLINE).await;
    let first = net.node("PartyB");
    let second = net.node("PartyC");

    let (left, right) = tokio::join!(first.make_pledge(gbp(300), campaign_id, false), second.make_pledge(gbp(400), campaign_id, false));

    let outcomes = [left.is_ok(), right.is_ok()];
    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1, "exactly one pledge commits");
    let failure = if left.is_ok() { right.expect_err("loser") } else { left.expect_err("loser") };
    assert!(matches!(failure, EscrowError::DoubleSpendConflict { .. }), "unexpected error {failure:?}");

    let raised = net.node("PartyA").campaign(&campaign_id).expect("campaign").expect("live").raised_so_far;
    assert!(raised == gbp(300) || raised == gbp(400));
    assert_eq!(net.node("PartyA").store().outstanding_pledges(&campaign_id).expect("pledges").len(), 1);
}

#[tokio::test]
async fn test_campaign_when_several_pledgers_meet_target_then_change_returned() {
    let net = TestNetwork::default_network().await;
    let manager = net.node("PartyA");
    let (b, c) = (net.node("PartyB"), net.node("PartyC"));
    let b_cash_key = net.fund("PartyB", gbp(1000)).await;
    let c_cash_key = net.fund("PartyC", gbp(500)).await;

    let campaign_id = net.start_visible("PartyA", gbp(1000), DEADLINE).await;
    b.make_pledge(gbp(300), campaign_id, true).await.expect("first pledge");
    b.make_pledge(gbp(300), campaign_id, true).await.expect("second pledge");
    assert!(net.wait_for_version("PartyC", campaign_id, 2).await);
    c.make_pledge(gbp(400), campaign_id, true).await.expect("third pledge");
    assert!(net.wait_for_version("PartyB", campaign_id, 3).await);

    net.set_time(DEADLINE);
    let result = manager.end_campaign(campaign_id, EndTrigger::Manual).await.expect("end");
    let EndResult::Settled { outcome: EndOutcome::Success, transaction } = result else {
        panic!("expected success");
    };

    // Manager plus one cash key per pledger, and the notary.
    assert_eq!(transaction.required_signers().len(), 3);
    assert_eq!(transaction.signatures.len(), 4);
    let move_command = transaction.tx.commands.iter().find(|command| command.command == Command::Cash(CashCommand::Move)).expect("move");
    assert_eq!(move_command.signers, BTreeSet::from([b_cash_key, c_cash_key]));
    let payee = transaction
        .tx
        .commands
        .iter()
        .find_map(|command| match &command.command {
            Command::Campaign(CampaignCommand::End { payee }) => *payee,
            _ => None,
        })
        .expect("payee");
    let paid: u64 = transaction.tx.outputs.iter().filter_map(Record::as_cash).filter(|cash| cash.owner == payee).map(|cash| cash.amount.quantity).sum();
    assert_eq!(paid, 1000);
    assert_eq!(manager.cash_balance(&gbp_currency()).expect("balance"), gbp(1000));
    assert_eq!(b.cash_balance(&gbp_currency()).expect("balance"), gbp(400));
    assert_eq!(c.cash_balance(&gbp_currency()).expect("balance"), gbp(100));
}

#[tokio::test]
async fn test_campaign_when_target_missed_then_pledges_cancelled_and_cash_untouched() {
    let net = TestNetwork::default_network().await;
    let manager = net.node("PartyA");
    let pledger = net.node("PartyB");
    net.fund("PartyB", gbp(500)).await;

    let campaign_id = net.start_visible("PartyA", gbp(1000), DEADLINE).await;
    pledger.make_pledge(gbp(300), campaign_id, true).await.expect("pledge");

    net.set_time(DEADLINE);
    let result = manager.end_campaign(campaign_id, EndTrigger::Manual).await.expect("end");
    let EndResult::Settled { outcome: EndOutcome::Failure, transaction } = result else {
        panic!("expected failure");
    };
    assert_eq!(transaction.tx.inputs.len(), 2);
    assert!(transaction.tx.outputs.is_empty());
    assert_eq!(pledger.cash_balance(&gbp_currency()).expect("balance"), gbp(500));
    assert_eq!(pledger.store().campaign_status(&campaign_id).expect("status"), Some(CampaignStatus::Ended(EndOutcome::Failure)));
    assert!(pledger.store().outstanding_pledges(&campaign_id).expect("pledges").is_empty());
}

#[tokio::test]
async fn test_pledge_when_observed_by_third_party_then_pledger_stays_anonymous() {
    let net = TestNetwork::default_network().await;
    let campaign_id = net.start_visible("PartyA", gbp(1000), DEADLINE).await;
    net.node("PartyB").make_pledge(gbp(250), campaign_id, true).await.expect("pledge");
    assert!(net.wait_for_version("PartyC", campaign_id, 1).await);

    let observer = net.node("PartyC");
    let pledges = observer.store().outstanding_pledges(&campaign_id).expect("pledges");
    assert_eq!(pledges.len(), 1);
    let pledge = pledges[0].record.as_pledge().expect("pledge").clone();
    assert_eq!(observer.identities().resolve_anonymous(&pledge.pledger).expect("resolve"), Resolution::Unknown);

    let resolved = net.node("PartyA").identities().resolve_anonymous(&pledge.pledger).expect("resolve");
    assert_eq!(resolved.party().map(|party| party.id.to_string()), Some("PartyB".to_string()));
}

#[tokio::test]
async fn test_pledge_when_broadcast_declined_then_third_parties_stay_on_old_version() {
    let net = TestNetwork::default_network().await;
    let campaign_id = net.start_visible("PartyA", gbp(1000), DEADLINE).await;
    net.node("PartyB").make_pledge(gbp(250), campaign_id, false).await.expect("pledge");

    assert_eq!(net.node("PartyA").campaign(&campaign_id).expect("campaign").expect("live").version, 1);
    assert_eq!(net.node("PartyB").campaign(&campaign_id).expect("campaign").expect("live").version, 1);
    assert_eq!(net.node("PartyC").campaign(&campaign_id).expect("campaign").expect("live").version, 0);
}

#[tokio::test]
async fn test_end_when_requested_by_non_manager_then_refused() {
    let net = TestNetwork::default_network().await;
    let campaign_id = net.start_visible("PartyA", gbp(1000), DEADLINE).await;
    net.set_time(DEADLINE);
    let outsider = net.node("PartyC");

    let skipped = outsider.end_campaign(campaign_id, EndTrigger::Scheduled).await.expect("scheduled");
    assert_eq!(skipped, EndResult::Skipped(SkipReason::NotManager));
    let err = outsider.end_campaign(campaign_id, EndTrigger::Manual).await.expect_err("manual");
    assert!(matches!(err, EscrowError::NotManager { .. }));
    assert_eq!(outsider.store().campaign_status(&campaign_id).expect("status"), Some(CampaignStatus::Active));
}

#[tokio::test]
async fn test_end_when_deadline_not_reached_then_refused() {
    let net = TestNetwork::default_network().await;
    let manager = net.node("PartyA");
    let campaign_id = net.start_visible("PartyA", gbp(1000), DEADLINE).await;

    let skipped = manager.end_campaign(campaign_id, EndTrigger::Scheduled).await.expect("scheduled");
    assert_eq!(skipped, EndResult::Skipped(SkipReason::DeadlineNotReached));
    let err = manager.end_campaign(campaign_id, EndTrigger::Manual).await.expect_err("manual");
    assert!(matches!(err, EscrowError::InvalidEnd(_)));
}

#[tokio::test]
async fn test_end_when_already_ended_then_second_attempt_refused() {
    let net = TestNetwork::default_network().await;
    let manager = net.node("PartyA");
    let campaign_id = net.start_visible("PartyA", gbp(1000), DEADLINE).await;
    net.set_time(DEADLINE);
    manager.end_campaign(campaign_id, EndTrigger::Manual).await.expect("first end");

    let skipped = manager.end_campaign(campaign_id, EndTrigger::Scheduled).await.expect("scheduled");
    assert_eq!(skipped, EndResult::Skipped(SkipReason::AlreadyEnded));
    let err = manager.end_campaign(campaign_id, EndTrigger::Manual).await.expect_err("manual");
    assert!(matches!(err, EscrowError::CampaignNotActive(_)));
}

#[tokio::test]
async fn test_end_when_triggered_twice_concurrently_then_one_settles() {
    let net = TestNetwork::default_network().await;
    let manager = net.node("PartyA");
    let campaign_id = net.start_visible("PartyA", gbp(1000), DEADLINE).await;
    net.node("PartyB").make_pledge(gbp(100), campaign_id, true).await.expect("pledge");
    net.set_time(DEADLINE);

    let (first, second) =
        tokio::join!(manager.end_campaign(campaign_id, EndTrigger::Scheduled), manager.end_campaign(campaign_id, EndTrigger::Scheduled));
    let results = [first.expect("first"), second.expect("second")];
    let settled = results.iter().filter(|result| matches!(result, EndResult::Settled { .. })).count();
    assert_eq!(settled, 1);
    assert!(results.iter().any(|result| matches!(result, EndResult::Skipped(SkipReason::InProgress | SkipReason::AlreadyEnded))));
}

#[tokio::test]
async fn test_pledge_when_campaign_ended_then_not_active() {
    let net = TestNetwork::default_network().await;
    let campaign_id = net.start_visible("PartyA", gbp(1000), DEADLINE).await;
    let pledger = net.node("PartyB");
    pledger.make_pledge(gbp(100), campaign_id, true).await.expect("pledge");
    net.set_time(DEADLINE);
    net.node("PartyA").end_campaign(campaign_id, EndTrigger::Manual).await.expect("end");

    let err = pledger.make_pledge(gbp(100), campaign_id, true).await.expect_err("ended");
    assert!(matches!(err, EscrowError::CampaignNotActive(_)));
}

#[tokio::test]
async fn test_pledge_when_deadline_passed_then_rejected() {
    let net = TestNetwork::default_network().await;
    let campaign_id = net.start_visible("PartyA", gbp(1000), DEADLINE).await;
    net.set_time(DEADLINE);

    let err = net.node("PartyB").make_pledge(gbp(100), campaign_id, true).await.expect_err("late");
    assert!(matches!(err, EscrowError::PledgeRejected { .. }));
    assert_eq!(net.node("PartyA").campaign(&campaign_id).expect("campaign").expect("live").version, 0);
}

#[tokio::test]
async fn test_pledge_when_campaign_unknown_then_record_not_found() {
    let net = TestNetwork::default_network().await;
    let err = net.node("PartyB").make_pledge(gbp(100), crowdfund_core::foundation::CampaignId::random(), true).await.expect_err("unknown");
    assert!(matches!(err, EscrowError::RecordNotFound(_)));
}

#[tokio::test]
async fn test_end_when_pledger_cannot_pay_then_settlement_rejected_and_campaign_stays_active() {
    let net = TestNetwork::default_network().await;
    let manager = net.node("PartyA");
    let pledger = net.node("PartyB");
    net.fund("PartyB", gbp(200)).await;
    let campaign_id = net.start_visible("PartyA", gbp(1000), DEADLINE).await;
    pledger.make_pledge(gbp(1000), campaign_id, true).await.expect("pledge");
    net.set_time(DEADLINE);

    let err = manager.end_campaign(campaign_id, EndTrigger::Manual).await.expect_err("unfunded");
    assert!(matches!(err, EscrowError::SettlementRejected { .. }), "unexpected error {err:?}");
    assert_eq!(manager.store().campaign_status(&campaign_id).expect("status"), Some(CampaignStatus::Active));
    assert_eq!(pledger.cash_balance(&gbp_currency()).expect("balance"), gbp(200));
}

#[tokio::test]
async fn test_start_when_target_zero_then_invalid_start() {
    let net = TestNetwork::default_network().await;
    let err = net.node("PartyA").start_campaign(CAMPAIGN_NAME, gbp(0), DEADLINE).await.expect_err("zero target");
    assert!(matches!(err, EscrowError::InvalidStart(_)));
}

#[tokio::test]
async fn test_campaign_when_settled_then_pledger_keys_stay_anonymous_to_other_parties() {
    let net = TestNetwork::default_network().await;
    let manager = net.node("PartyA");
    let (b, c) = (net.node("PartyB"), net.node("PartyC"));
    net.fund("PartyB", gbp(800)).await;
    net.fund("PartyC", gbp(500)).await;

    let campaign_id = net.start_visible("PartyA", gbp(1000), DEADLINE).await;
    b.make_pledge(gbp(600), campaign_id, true).await.expect("first pledge");
    assert!(net.wait_for_version("PartyC", campaign_id, 1).await);
    c.make_pledge(gbp(400), campaign_id, true).await.expect("second pledge");
    assert!(net.wait_for_version("PartyD", campaign_id, 2).await);

    net.set_time(DEADLINE);
    let result = manager.end_campaign(campaign_id, EndTrigger::Manual).await.expect("end");
    let EndResult::Settled { outcome: EndOutcome::Success, transaction } = result else {
        panic!("expected success");
    };
    let bystander = net.node("PartyD");
    assert!(
        wait_until(|| {
            let bystander = Arc::clone(&bystander);
            async move { bystander.store().campaign_status(&campaign_id).ok().flatten() == Some(CampaignStatus::Ended(EndOutcome::Success)) }
        })
        .await
    );

    // Cash keys that signed, plus every owner of a cash output.
    let mut settlement_keys = transaction.required_signers();
    settlement_keys.extend(transaction.tx.outputs.iter().filter_map(Record::as_cash).map(|cash| cash.owner));
    let b_keys: BTreeSet<PublicKey> = settlement_keys.intersection(&b.keys().owned_keys().expect("keys")).copied().collect();
    let c_keys: BTreeSet<PublicKey> = settlement_keys.intersection(&c.keys().owned_keys().expect("keys")).copied().collect();
    // Spent cash key and change key each.
    assert_eq!(b_keys.len(), 2);
    assert_eq!(c_keys.len(), 2);

    for (outsider, keys) in [(&bystander, &b_keys), (&bystander, &c_keys), (&c, &b_keys), (&b, &c_keys)] {
        for key in keys {
            let resolution = outsider.identities().resolve_anonymous(&AnonymousParty { key: *key }).expect("resolve");
            assert_eq!(resolution, Resolution::Unknown, "{} resolved {}", outsider.party().id, key.short());
        }
    }

    let recorded = serde_json::to_string(&transaction).expect("serialize");
    for pledger in ["PartyB", "PartyC"] {
        assert!(!recorded.contains(&format!("\"{pledger}\"")), "{pledger} named in the settlement");
        assert!(!settlement_keys.contains(&net.node(pledger).party().key));
    }
    assert!(transaction.tx.outputs.iter().filter_map(Record::as_cash).all(|cash| cash.issuer.id == PartyId::from(ISSUER_NAME)));
}

#[tokio::test]
async fn test_campaign_when_pledger_offline_at_failure_then_campaign_still_cancelled() {
    let net = TestNetwork::default_network().await;
    let manager = net.node("PartyA");
    net.fund("PartyB", gbp(500)).await;
    let campaign_id = net.start_visible("PartyA", gbp(1000), DEADLINE).await;
    net.node("PartyB").make_pledge(gbp(300), campaign_id, true).await.expect("pledge");

    net.hub.disconnect(&PartyId::from("PartyB")).await;
    net.set_time(DEADLINE);
    let result = manager.end_campaign(campaign_id, EndTrigger::Manual).await.expect("end");

    let EndResult::Settled { outcome: EndOutcome::Failure, transaction } = result else {
        panic!("expected failure");
    };
    assert_eq!(transaction.tx.inputs.len(), 2);
    assert_eq!(manager.store().campaign_status(&campaign_id).expect("status"), Some(CampaignStatus::Ended(EndOutcome::Failure)));
    assert!(manager.store().outstanding_pledges(&campaign_id).expect("pledges").is_empty());
}

#[tokio::test]
async fn test_campaign_when_pledger_offline_at_success_then_settlement_fails() {
    let net = TestNetwork::default_network().await;
    let manager = net.node("PartyA");
    net.fund("PartyB", gbp(500)).await;
    let campaign_id = net.start_visible("PartyA", gbp(500), DEADLINE).await;
    net.node("PartyB").make_pledge(gbp(500), campaign_id, true).await.expect("pledge");

    net.hub.disconnect(&PartyId::from("PartyB")).await;
    net.set_time(DEADLINE);

    let err = manager.end_campaign(campaign_id, EndTrigger::Manual).await.expect_err("pledger offline");
    assert!(matches!(err, EscrowError::TransportError { .. }), "unexpected error {err:?}");
    assert_eq!(manager.store().campaign_status(&campaign_id).expect("status"), Some(CampaignStatus::Active));
}
