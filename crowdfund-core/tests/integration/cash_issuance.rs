use crate::fixtures::*;
use crowdfund_core::domain::Record;
use crowdfund_core::foundation::{Currency, EscrowError, PartyId, PublicKey};
use crowdfund_core::infrastructure::keys::KeyManager;

#[tokio::test]
async fn test_request_cash_when_issuer_pays_then_cash_names_issuer_under_fresh_key() {
    let net = TestNetwork::default_network().await;
    let holder = net.node("PartyB");

    let issued = holder.request_cash(&PartyId::from(ISSUER_NAME), gbp(700)).await.expect("issue");

    let cash: Vec<_> = issued.tx.outputs.iter().filter_map(Record::as_cash).collect();
    assert_eq!(cash.len(), 1);
    assert_eq!(cash[0].issuer.id, PartyId::from(ISSUER_NAME));
    assert_ne!(cash[0].owner, holder.party().key);
    assert!(holder.keys().owned_keys().expect("keys").contains(&cash[0].owner));
    assert_eq!(holder.cash_balance(&Currency::new(CURRENCY)).expect("balance"), gbp(700));
    assert_eq!(net.issuer.cash_balance(&Currency::new(CURRENCY)).expect("balance"), gbp(0));
}

#[tokio::test]
async fn test_issue_cash_when_caller_not_issuer_then_invalid_cash_issue() {
    let net = TestNetwork::default_network().await;
    let err = net.node("PartyB").issue_cash(gbp(100), PublicKey::from_bytes([7u8; 32])).await.expect_err("not an issuer");
    assert!(matches!(err, EscrowError::InvalidCashIssue(_)), "unexpected error {err:?}");
}

#[tokio::test]
async fn test_request_cash_when_counterparty_not_issuer_then_unknown_identity() {
    let net = TestNetwork::default_network().await;
    let err = net.node("PartyB").request_cash(&PartyId::from("PartyC"), gbp(100)).await.expect_err("not an issuer");
    assert!(matches!(err, EscrowError::UnknownIdentity(_)), "unexpected error {err:?}");
}

#[tokio::test]
async fn test_request_cash_when_amount_zero_then_issuer_refuses() {
    let net = TestNetwork::default_network().await;
    let holder = net.node("PartyB");
    let err = holder.request_cash(&PartyId::from(ISSUER_NAME), gbp(0)).await.expect_err("zero");
    assert!(matches!(err, EscrowError::InvalidCashIssue(_)), "unexpected error {err:?}");
    assert_eq!(holder.cash_balance(&Currency::new(CURRENCY)).expect("balance"), gbp(0));
}
