//! Cash issuance and balances.
//!
//! Cash always comes from a party registered as an issuer and is held under a one-off key,
//! so spending it later names neither the holder nor anyone the holder pledged to.

use crate::application::node::PartyNode;
use crate::domain::command::{CashCommand, Command};
use crate::domain::model::{Cash, Record};
use crate::domain::transaction::{ResolvedTransaction, SignedTransaction};
use crate::domain::verification::verify;
use crate::foundation::{Amount, Currency, EscrowError, PartyId, PublicKey, Result};
use crate::infrastructure::transport::{Protocol, Session, SessionMessage};
use log::info;

impl PartyNode {
    /// Issues `amount` to `owner` with this party as issuer. Only issuers may call this.
    pub async fn issue_cash(&self, amount: Amount, owner: PublicKey) -> Result<SignedTransaction> {
        if !self.network.is_issuer(&self.party.id)? {
            return Err(EscrowError::InvalidCashIssue(format!("{} is not registered as an issuer", self.party.id)));
        }
        if !amount.is_positive() {
            return Err(EscrowError::InvalidCashIssue(format!("cannot issue {amount}")));
        }
        let mut builder = self.builder();
        builder
            .add_output(Record::Cash(Cash { amount: amount.clone(), owner, issuer: self.party.clone() }))
            .add_command(Command::Cash(CashCommand::Issue), [self.party.key]);
        let signed = self.verify_and_sign(&builder.build(), &self.legal_keys())?;
        let finalized = self.notarise(signed).await?;
        self.record(&finalized)?;
        info!("cash issued issuer={} amount={} owner={} tx_id={}", self.party.id, amount, owner.short(), finalized.id()?.short());
        Ok(finalized)
    }

    /// Asks `issuer` for `amount` under a fresh confidential key and records the issuance.
    pub async fn request_cash(&self, issuer: &PartyId, amount: Amount) -> Result<SignedTransaction> {
        if !self.network.is_issuer(issuer)? {
            return Err(EscrowError::UnknownIdentity(format!("{issuer} is not a cash issuer")));
        }
        let owner = self.keys.fresh_key()?;
        let mut session = self.transport.open_session(issuer, Protocol::Issuance).await?;
        let issued = match session.send_and_receive(SessionMessage::IssueRequest { amount: amount.clone(), owner }).await? {
            SessionMessage::Finalized(issued) => issued,
            SessionMessage::Rejected { reason } => return Err(EscrowError::InvalidCashIssue(reason)),
            other => {
                session.reject(format!("unexpected {}", other.kind())).await;
                return Err(EscrowError::transport("issuance", format!("unexpected {} from {issuer}", other.kind())));
            }
        };
        if let Err(err) = self.check_issuance(&issued, issuer, &amount, &owner) {
            session.reject(err.to_string()).await;
            return Err(err);
        }

        self.record(&issued.transaction)?;
        let tx_id = issued.id()?;
        info!("cash received issuer={} amount={} owner={} tx_id={}", issuer, amount, owner.short(), tx_id.short());
        session.send(SessionMessage::Recorded { tx_id }).await?;
        Ok(issued.transaction)
    }

    fn check_issuance(&self, issued: &ResolvedTransaction, issuer: &PartyId, amount: &Amount, owner: &PublicKey) -> Result<()> {
        issued.transaction.verify_required_signatures()?;
        let ledger = issued.ledger()?;
        verify(&ledger)?;
        let issuer = self.network.party(issuer)?.ok_or_else(|| EscrowError::UnknownIdentity(issuer.to_string()))?;
        let expected = Cash { amount: amount.clone(), owner: *owner, issuer };
        let outputs = ledger.cash_outputs();
        if ledger.outputs.len() != 1 || outputs.len() != 1 || *outputs[0] != expected {
            return Err(EscrowError::InvalidCashIssue(format!("issuance {} is not the {amount} requested", ledger.id.short())));
        }
        Ok(())
    }

    /// Issuer side of [`PartyNode::request_cash`].
    pub async fn respond_to_issuance(&self, mut session: Session) -> Result<()> {
        let counterparty = session.counterparty().clone();
        let (amount, owner) = match session.receive().await? {
            SessionMessage::IssueRequest { amount, owner } => (amount, owner),
            other => {
                session.reject(format!("unexpected {}", other.kind())).await;
                return Err(EscrowError::transport("issuance", format!("unexpected {} from {counterparty}", other.kind())));
            }
        };
        let issued = match self.issue_cash(amount, owner).await {
            Ok(issued) => issued,
            Err(err) => {
                session.reject(err.to_string()).await;
                return Err(err);
            }
        };

        let tx_id = issued.id()?;
        match session.send_and_receive(SessionMessage::Finalized(ResolvedTransaction { transaction: issued, inputs: Vec::new() })).await? {
            SessionMessage::Recorded { tx_id: acked } if acked.ct_eq(&tx_id) => Ok(()),
            SessionMessage::Rejected { reason } => {
                Err(EscrowError::InvalidCashIssue(format!("{counterparty} refused issuance {}: {reason}", tx_id.short())))
            }
            other => Err(EscrowError::transport("issuance", format!("unexpected {} from {counterparty}", other.kind()))),
        }
    }

    /// Unconsumed cash in `currency` held under any of this party's keys.
    pub fn cash_balance(&self, currency: &Currency) -> Result<Amount> {
        let mut balance = Amount::zero(currency.clone());
        for resolved in self.store.unconsumed_cash(&self.keys.owned_keys()?)? {
            if let Some(cash) = resolved.record.as_cash().filter(|cash| cash.amount.currency == *currency) {
                balance = balance.checked_add(&cash.amount)?;
            }
        }
        Ok(balance)
    }
}
