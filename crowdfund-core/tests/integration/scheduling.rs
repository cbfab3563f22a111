use crate::fixtures::*;
use crowdfund_core::application::{schedule_campaign_end, EndResult, SkipReason};
use crowdfund_core::domain::{CampaignStatus, EndOutcome};
use crowdfund_core::foundation::{CampaignId, Currency};
use std::sync::Arc;

async fn wait_for_status(net: &TestNetwork, party: &str, campaign_id: CampaignId, expected: CampaignStatus) -> bool {
    let node = net.node(party);
    wait_until(|| {
        let node = Arc::clone(&node);
        async move { node.store().campaign_status(&campaign_id).ok().flatten() == Some(expected) }
    })
    .await
}

#[tokio::test]
async fn test_scheduler_when_deadline_passes_then_manager_settles_success() {
    let net = TestNetwork::builder()
        .configure(|config| {
            config.scheduler.enabled = true;
            config.scheduler.poll_interval_ms = 10;
        })
        .build()
        .await;
    net.fund("PartyB", gbp(500)).await;
    let campaign_id = net.start_visible("PartyA", gbp(500), DEADLINE).await;
    net.node("PartyB").make_pledge(gbp(500), campaign_id, true).await.expect("pledge");

    net.set_time(DEADLINE);

    let ended = CampaignStatus::Ended(EndOutcome::Success);
    assert!(wait_for_status(&net, "PartyA", campaign_id, ended).await);
    assert!(wait_for_status(&net, "PartyB", campaign_id, ended).await);
    assert_eq!(net.node("PartyA").cash_balance(&Currency::new(CURRENCY)).expect("balance"), gbp(500));
}

#[tokio::test]
async fn test_scheduler_when_disabled_then_campaign_stays_active() {
    let net = TestNetwork::default_network().await;
    let campaign_id = net.start_visible("PartyA", gbp(500), DEADLINE).await;

    net.set_time(DEADLINE);
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    assert_eq!(net.node("PartyA").store().campaign_status(&campaign_id).expect("status"), Some(CampaignStatus::Active));
}

#[tokio::test]
async fn test_schedule_campaign_end_when_clock_advanced_then_failure_settled() {
    let net = TestNetwork::default_network().await;
    let campaign_id = net.start_visible("PartyA", gbp(500), DEADLINE).await;

    let handle = schedule_campaign_end(net.node("PartyA"), campaign_id, DEADLINE);
    net.set_time(DEADLINE);

    let result = handle.await.expect("join").expect("end");
    let EndResult::Settled { outcome, .. } = result else {
        panic!("expected settlement");
    };
    assert_eq!(outcome, EndOutcome::Failure);
}

#[tokio::test]
async fn test_schedule_campaign_end_when_party_not_manager_then_skipped() {
    let net = TestNetwork::default_network().await;
    let campaign_id = net.start_visible("PartyA", gbp(500), DEADLINE).await;
    net.set_time(DEADLINE);

    let result = schedule_campaign_end(net.node("PartyC"), campaign_id, DEADLINE).await.expect("join").expect("skip");

    assert!(matches!(result, EndResult::Skipped(SkipReason::NotManager)));
    assert_eq!(net.node("PartyA").store().campaign_status(&campaign_id).expect("status"), Some(CampaignStatus::Active));
}
