use crate::domain::identity::IdentityDisclosure;
use crate::domain::settlement::{Outcome, SettlementPayload};
use crate::domain::transaction::{ResolvedTransaction, TransactionSignature};
use crate::foundation::{Amount, Hash32, PartyId, PublicKey, SessionId, TransactionId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocol a session was opened for; selects the responder on the receiving side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    Pledge,
    Settlement,
    Broadcast,
    Issuance,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Protocol::Pledge => "pledge",
            Protocol::Settlement => "settlement",
            Protocol::Broadcast => "broadcast",
            Protocol::Issuance => "issuance",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionMessage {
    /// Pledger to manager: the pledger-signed proposal plus who the pledger really is.
    PledgeProposal { proposal: ResolvedTransaction, disclosure: IdentityDisclosure, broadcast_to_observers: bool },
    Signatures(Vec<TransactionSignature>),
    Outcome(Outcome),
    SettlementPayload(SettlementPayload),
    SignatureRequest(ResolvedTransaction),
    Finalized(ResolvedTransaction),
    Broadcast(ResolvedTransaction),
    /// Acknowledges that a finalized transaction was recorded.
    Recorded { tx_id: TransactionId },
    Rejected { reason: String },
    /// Holder to issuer: issue `amount` to the holder's one-off `owner` key.
    IssueRequest { amount: Amount, owner: PublicKey },
}

impl SessionMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            SessionMessage::PledgeProposal { .. } => "pledge_proposal",
            SessionMessage::Signatures(_) => "signatures",
            SessionMessage::Outcome(_) => "outcome",
            SessionMessage::SettlementPayload(_) => "settlement_payload",
            SessionMessage::SignatureRequest(_) => "signature_request",
            SessionMessage::Finalized(_) => "finalized",
            SessionMessage::Broadcast(_) => "broadcast",
            SessionMessage::Recorded { .. } => "recorded",
            SessionMessage::Rejected { .. } => "rejected",
            SessionMessage::IssueRequest { .. } => "issue_request",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub session_id: SessionId,
    pub sender: PartyId,
    pub seq_no: u64,
    pub timestamp_nanos: u64,
    /// Encoded [`SessionMessage`].
    pub payload: Vec<u8>,
    pub payload_hash: Hash32,
}
