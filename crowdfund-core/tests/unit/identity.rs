use crate::fixtures::*;
use crowdfund_core::domain::{CampaignCommand, Command, Record, TransactionBuilder};
use crowdfund_core::foundation::{AnonymousParty, EscrowError, Party, PartyId};
use crowdfund_core::infrastructure::identity::{IdentityService, InMemoryIdentityService, Resolution};
use crowdfund_core::infrastructure::keys::{KeyManager, LocalKeyManager};
use crowdfund_core::infrastructure::network::{NetworkMap, PartyRole};
use std::collections::BTreeSet;
use std::sync::Arc;

struct Member {
    party: Party,
    keys: LocalKeyManager,
}

fn member(network: &NetworkMap, name: &str, seed: u8) -> Member {
    let keys = LocalKeyManager::from_seed([seed; 32]);
    let party = Party { id: PartyId::from(name), key: keys.legal_key() };
    network.register(party.clone(), PartyRole::Participant).expect("register");
    Member { party, keys }
}

#[test]
fn test_resolve_when_legal_key_then_known_from_network() {
    let network = Arc::new(NetworkMap::new());
    let pledger = member(&network, "PartyB", 2);
    let identities = InMemoryIdentityService::new(Arc::clone(&network));

    assert_eq!(identities.resolve(&pledger.party.key).expect("resolve"), Resolution::Known(pledger.party.clone()));
}

#[test]
fn test_resolve_when_confidential_key_without_disclosure_then_unknown() {
    let network = Arc::new(NetworkMap::new());
    let pledger = member(&network, "PartyB", 2);
    let identities = InMemoryIdentityService::new(Arc::clone(&network));
    let anonymous = AnonymousParty { key: pledger.keys.fresh_key().expect("fresh") };

    assert_eq!(identities.resolve_anonymous(&anonymous).expect("resolve"), Resolution::Unknown);
}

#[test]
fn test_register_disclosure_when_valid_then_confidential_key_resolves() {
    let network = Arc::new(NetworkMap::new());
    let pledger = member(&network, "PartyB", 2);
    let identities = InMemoryIdentityService::new(Arc::clone(&network));
    let anonymous = AnonymousParty { key: pledger.keys.fresh_key().expect("fresh") };

    let disclosure = pledger.keys.disclose(&pledger.party, &anonymous).expect("disclose");
    identities.register_disclosure(&disclosure).expect("register");

    assert_eq!(identities.resolve_anonymous(&anonymous).expect("resolve").party(), Some(&pledger.party));
}

#[test]
fn test_register_disclosure_when_party_not_on_network_then_unknown_identity() {
    let network = Arc::new(NetworkMap::new());
    let identities = InMemoryIdentityService::new(Arc::clone(&network));
    let stranger_keys = LocalKeyManager::from_seed([9u8; 32]);
    let stranger = Party { id: PartyId::from("Stranger"), key: stranger_keys.legal_key() };
    let anonymous = AnonymousParty { key: stranger_keys.fresh_key().expect("fresh") };

    let disclosure = stranger_keys.disclose(&stranger, &anonymous).expect("disclose");
    let err = identities.register_disclosure(&disclosure).expect_err("not on network");
    assert!(matches!(err, EscrowError::UnknownIdentity(_)));
}

#[test]
fn test_register_disclosure_when_proof_forged_then_invalid_signature() {
    let network = Arc::new(NetworkMap::new());
    let pledger = member(&network, "PartyB", 2);
    let impostor = member(&network, "PartyC", 3);
    let identities = InMemoryIdentityService::new(Arc::clone(&network));
    let anonymous = AnonymousParty { key: impostor.keys.fresh_key().expect("fresh") };

    // The impostor claims the key for PartyB but can only sign with its own legal key.
    let mut disclosure = impostor.keys.disclose(&impostor.party, &anonymous).expect("disclose");
    disclosure.party = pledger.party.clone();
    let err = identities.register_disclosure(&disclosure).expect_err("forged");
    assert!(matches!(err, EscrowError::InvalidSignature { .. }));
    assert_eq!(identities.resolve_anonymous(&anonymous).expect("resolve"), Resolution::Unknown);
}

#[test]
fn test_register_own_when_generated_locally_then_resolves() {
    let network = Arc::new(NetworkMap::new());
    let manager = member(&network, "PartyA", 1);
    let identities = InMemoryIdentityService::new(Arc::clone(&network));
    let anonymous = AnonymousParty { key: manager.keys.fresh_key().expect("fresh") };

    identities.register_own(&manager.party, &anonymous).expect("register");
    assert_eq!(identities.resolve_anonymous(&anonymous).expect("resolve").party(), Some(&manager.party));
}

#[test]
fn test_verify_signatures_except_when_only_allowed_key_missing_then_ok() {
    let network = NetworkMap::new();
    let manager = member(&network, "PartyA", 1);
    let pledger = member(&network, "PartyB", 2);
    let mut builder = TransactionBuilder::new(PartyId::from(NOTARY_NAME), T0);
    builder
        .add_output(Record::Campaign(campaign(1000)))
        .add_command(Command::Campaign(CampaignCommand::Start), [manager.party.key, pledger.party.key]);
    let unsigned = builder.build().transaction;
    let signed = unsigned.clone().with_signatures(manager.keys.sign_transaction(&unsigned, &BTreeSet::from([manager.party.key])).expect("sign"));

    assert!(signed.verify_signatures_except(&BTreeSet::from([pledger.party.key])).is_ok());
    let err = signed.verify_required_signatures().expect_err("pledger missing");
    assert!(matches!(err, EscrowError::MissingSignatures { .. }));
    assert_eq!(signed.missing_signers(), BTreeSet::from([pledger.party.key]));
}

#[test]
fn test_verify_signatures_when_signature_tampered_then_invalid_signature() {
    let network = NetworkMap::new();
    let manager = member(&network, "PartyA", 1);
    let mut builder = TransactionBuilder::new(PartyId::from(NOTARY_NAME), T0);
    builder.add_output(Record::Campaign(campaign(1000))).add_command(Command::Campaign(CampaignCommand::Start), [manager.party.key]);
    let unsigned = builder.build().transaction;
    let mut signatures = manager.keys.sign_transaction(&unsigned, &BTreeSet::from([manager.party.key])).expect("sign");
    signatures[0].signature[0] ^= 0xff;

    let err = unsigned.with_signatures(signatures).verify_signatures().expect_err("tampered");
    assert!(matches!(err, EscrowError::InvalidSignature { .. }));
}

#[test]
fn test_with_signatures_when_key_signs_twice_then_kept_once() {
    let network = NetworkMap::new();
    let manager = member(&network, "PartyA", 1);
    let mut builder = TransactionBuilder::new(PartyId::from(NOTARY_NAME), T0);
    builder.add_output(Record::Campaign(campaign(1000))).add_command(Command::Campaign(CampaignCommand::Start), [manager.party.key]);
    let unsigned = builder.build().transaction;
    let signatures = manager.keys.sign_transaction(&unsigned, &BTreeSet::from([manager.party.key])).expect("sign");

    let signed = unsigned.with_signatures(signatures.clone()).with_signatures(signatures);
    assert_eq!(signed.signatures.len(), 1);
}

#[test]
fn test_to_ledger_when_inputs_reordered_then_error() {
    let first = resolved(Record::Campaign(campaign(10)));
    let second = resolved(Record::Campaign(campaign(20)));
    let mut builder = TransactionBuilder::new(PartyId::from(NOTARY_NAME), T0);
    builder.add_input(first.clone()).add_input(second.clone()).add_command(Command::Campaign(CampaignCommand::Start), [key(1)]);
    let wire = builder.build().transaction.tx;

    assert!(wire.to_ledger(vec![first.clone(), second.clone()]).is_ok());
    assert!(wire.to_ledger(vec![second, first]).is_err());
}
