use crate::domain::command::{Command, CommandWithSigners};
use crate::domain::model::{Campaign, Cash, Pledge, Record, RecordKind, RecordRef, ResolvedRecord};
use crate::foundation::util::encoding::hash_with_domain;
use crate::foundation::{EscrowError, Hash32, PartyId, PublicKey, Result, TransactionId, TX_ID_DOMAIN};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The signed-over content of a transaction. Its id is a domain-separated hash of every field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireTransaction {
    pub inputs: Vec<RecordRef>,
    pub outputs: Vec<Record>,
    pub commands: Vec<CommandWithSigners>,
    pub notary: PartyId,
    /// Proposal time; the notary refuses timestamps outside its tolerance.
    pub timestamp_nanos: u64,
    pub privacy_salt: Hash32,
}

impl WireTransaction {
    pub fn id(&self) -> Result<TransactionId> {
        Ok(TransactionId::from(hash_with_domain(TX_ID_DOMAIN, self)?))
    }

    pub fn required_signers(&self) -> BTreeSet<PublicKey> {
        self.commands.iter().flat_map(|command| command.signers.iter().copied()).collect()
    }

    pub fn output_refs(&self) -> Result<Vec<ResolvedRecord>> {
        let id = self.id()?;
        Ok(self
            .outputs
            .iter()
            .enumerate()
            .map(|(index, record)| ResolvedRecord::new(RecordRef::new(id, index as u32), record.clone()))
            .collect())
    }

    /// Pairs the wire inputs with their resolved records. The order must match exactly.
    pub fn to_ledger(&self, inputs: Vec<ResolvedRecord>) -> Result<LedgerTransaction> {
        let matches = inputs.len() == self.inputs.len()
            && inputs.iter().zip(self.inputs.iter()).all(|(resolved, reference)| resolved.reference == *reference);
        if !matches {
            return Err(EscrowError::Message("resolved inputs do not match transaction inputs".to_string()));
        }
        Ok(LedgerTransaction {
            id: self.id()?,
            inputs,
            outputs: self.outputs.clone(),
            commands: self.commands.clone(),
            timestamp_nanos: self.timestamp_nanos,
        })
    }

    pub fn resolve(&self, mut lookup: impl FnMut(&RecordRef) -> Result<Record>) -> Result<LedgerTransaction> {
        let mut inputs = Vec::with_capacity(self.inputs.len());
        for reference in &self.inputs {
            inputs.push(ResolvedRecord::new(*reference, lookup(reference)?));
        }
        self.to_ledger(inputs)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSignature {
    pub key: PublicKey,
    pub signature: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub tx: WireTransaction,
    pub signatures: Vec<TransactionSignature>,
}

impl SignedTransaction {
    pub fn new(tx: WireTransaction) -> Self {
        Self { tx, signatures: Vec::new() }
    }

    pub fn id(&self) -> Result<TransactionId> {
        self.tx.id()
    }

    pub fn required_signers(&self) -> BTreeSet<PublicKey> {
        self.tx.required_signers()
    }

    pub fn signed_by(&self) -> BTreeSet<PublicKey> {
        self.signatures.iter().map(|sig| sig.key).collect()
    }

    pub fn missing_signers(&self) -> BTreeSet<PublicKey> {
        let present = self.signed_by();
        self.required_signers().into_iter().filter(|key| !present.contains(key)).collect()
    }

    /// Adds signatures, ignoring keys that already signed.
    pub fn with_signatures(mut self, signatures: impl IntoIterator<Item = TransactionSignature>) -> Self {
        for signature in signatures {
            if !self.signatures.iter().any(|existing| existing.key == signature.key) {
                self.signatures.push(signature);
            }
        }
        self
    }

    /// Every attached signature must be valid over the transaction id.
    pub fn verify_signatures(&self) -> Result<()> {
        let id = self.id()?;
        for sig in &self.signatures {
            if !sig.key.verify(id.as_ref(), &sig.signature) {
                return Err(EscrowError::InvalidSignature { key: sig.key.short() });
            }
        }
        Ok(())
    }

    pub fn verify_signatures_except(&self, allowed_missing: &BTreeSet<PublicKey>) -> Result<()> {
        self.verify_signatures()?;
        let missing: Vec<String> =
            self.missing_signers().iter().filter(|key| !allowed_missing.contains(key)).map(PublicKey::short).collect();
        if !missing.is_empty() {
            return Err(EscrowError::MissingSignatures { tx_id: self.id()?.short(), missing });
        }
        Ok(())
    }

    pub fn verify_required_signatures(&self) -> Result<()> {
        self.verify_signatures_except(&BTreeSet::new())
    }
}

/// A transaction with its inputs resolved, as carried between parties for checking.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedTransaction {
    pub transaction: SignedTransaction,
    pub inputs: Vec<ResolvedRecord>,
}

impl ResolvedTransaction {
    pub fn ledger(&self) -> Result<LedgerTransaction> {
        self.transaction.tx.to_ledger(self.inputs.clone())
    }

    pub fn id(&self) -> Result<TransactionId> {
        self.transaction.id()
    }
}

/// The view the verification engine judges: inputs resolved, nothing external.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerTransaction {
    pub id: TransactionId,
    pub inputs: Vec<ResolvedRecord>,
    pub outputs: Vec<Record>,
    pub commands: Vec<CommandWithSigners>,
    pub timestamp_nanos: u64,
}

impl LedgerTransaction {
    pub fn record_kinds(&self) -> BTreeSet<RecordKind> {
        self.inputs.iter().map(|input| input.record.kind()).chain(self.outputs.iter().map(Record::kind)).collect()
    }

    pub fn commands_for(&self, kind: RecordKind) -> Vec<&CommandWithSigners> {
        self.commands.iter().filter(|command| command.command.governs() == kind).collect()
    }

    pub fn has_command(&self, command: &Command) -> bool {
        self.commands.iter().any(|candidate| candidate.command == *command)
    }

    pub fn campaign_inputs(&self) -> Vec<&Campaign> {
        self.inputs.iter().filter_map(|input| input.record.as_campaign()).collect()
    }

    pub fn campaign_outputs(&self) -> Vec<&Campaign> {
        self.outputs.iter().filter_map(Record::as_campaign).collect()
    }

    pub fn pledge_inputs(&self) -> Vec<&Pledge> {
        self.inputs.iter().filter_map(|input| input.record.as_pledge()).collect()
    }

    pub fn pledge_outputs(&self) -> Vec<&Pledge> {
        self.outputs.iter().filter_map(Record::as_pledge).collect()
    }

    pub fn cash_inputs(&self) -> Vec<&Cash> {
        self.inputs.iter().filter_map(|input| input.record.as_cash()).collect()
    }

    pub fn cash_outputs(&self) -> Vec<&Cash> {
        self.outputs.iter().filter_map(Record::as_cash).collect()
    }
}

pub struct TransactionBuilder {
    inputs: Vec<ResolvedRecord>,
    outputs: Vec<Record>,
    commands: Vec<CommandWithSigners>,
    notary: PartyId,
    timestamp_nanos: u64,
}

impl TransactionBuilder {
    pub fn new(notary: PartyId, timestamp_nanos: u64) -> Self {
        Self { inputs: Vec::new(), outputs: Vec::new(), commands: Vec::new(), notary, timestamp_nanos }
    }

    pub fn add_input(&mut self, input: ResolvedRecord) -> &mut Self {
        self.inputs.push(input);
        self
    }

    pub fn add_inputs(&mut self, inputs: impl IntoIterator<Item = ResolvedRecord>) -> &mut Self {
        self.inputs.extend(inputs);
        self
    }

    pub fn add_output(&mut self, output: Record) -> &mut Self {
        self.outputs.push(output);
        self
    }

    pub fn add_command(&mut self, command: Command, signers: impl IntoIterator<Item = PublicKey>) -> &mut Self {
        self.commands.push(CommandWithSigners::new(command, signers));
        self
    }

    pub fn build(&self) -> ResolvedTransaction {
        let tx = WireTransaction {
            inputs: self.inputs.iter().map(|input| input.reference).collect(),
            outputs: self.outputs.clone(),
            commands: self.commands.clone(),
            notary: self.notary.clone(),
            timestamp_nanos: self.timestamp_nanos,
            privacy_salt: rand::random::<Hash32>(),
        };
        ResolvedTransaction { transaction: SignedTransaction::new(tx), inputs: self.inputs.clone() }
    }
}
