use crate::foundation::util::encoding::{decode, encode};
use crate::foundation::{now_nanos, EscrowError, Hash32, PartyId, Result, SessionId};
use crate::infrastructure::transport::messages::{MessageEnvelope, Protocol, SessionMessage};
use log::trace;
use subtle::ConstantTimeEq;
use tokio::sync::mpsc;

/// One end of a point-to-point, ordered conversation for the lifetime of a protocol instance.
///
/// Dropping a session closes it; the counterparty's next `receive` then fails.
pub struct Session {
    id: SessionId,
    protocol: Protocol,
    local: PartyId,
    counterparty: PartyId,
    outbound: mpsc::Sender<MessageEnvelope>,
    inbound: mpsc::Receiver<MessageEnvelope>,
    seq: u64,
    max_message_bytes: usize,
}

impl Session {
    /// Builds both ends of a fresh session between `initiator` and `responder`.
    pub fn pair(protocol: Protocol, initiator: PartyId, responder: PartyId, capacity: usize, max_message_bytes: usize) -> (Session, Session) {
        let id = SessionId::random();
        let (to_responder, from_initiator) = mpsc::channel(capacity);
        let (to_initiator, from_responder) = mpsc::channel(capacity);
        let initiator_end = Session {
            id,
            protocol,
            local: initiator.clone(),
            counterparty: responder.clone(),
            outbound: to_responder,
            inbound: from_responder,
            seq: 0,
            max_message_bytes,
        };
        let responder_end = Session {
            id,
            protocol,
            local: responder,
            counterparty: initiator,
            outbound: to_initiator,
            inbound: from_initiator,
            seq: 0,
            max_message_bytes,
        };
        (initiator_end, responder_end)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn counterparty(&self) -> &PartyId {
        &self.counterparty
    }

    fn payload_hash(bytes: &[u8]) -> Hash32 {
        *blake3::hash(bytes).as_bytes()
    }

    pub async fn send(&mut self, payload: SessionMessage) -> Result<()> {
        let bytes = encode(&payload)?;
        if bytes.len() > self.max_message_bytes {
            return Err(EscrowError::transport("send", format!("message of {} bytes exceeds limit {}", bytes.len(), self.max_message_bytes)));
        }
        self.seq += 1;
        trace!("session send session_id={} to={} kind={} seq={} bytes={}", self.id.short(), self.counterparty, payload.kind(), self.seq, bytes.len());
        let envelope = MessageEnvelope {
            session_id: self.id,
            sender: self.local.clone(),
            seq_no: self.seq,
            timestamp_nanos: now_nanos(),
            payload_hash: Self::payload_hash(&bytes),
            payload: bytes,
        };
        self.outbound
            .send(envelope)
            .await
            .map_err(|_| EscrowError::transport("send", format!("session {} closed by {}", self.id.short(), self.counterparty)))
    }

    pub async fn receive(&mut self) -> Result<SessionMessage> {
        let envelope = self
            .inbound
            .recv()
            .await
            .ok_or_else(|| EscrowError::transport("receive", format!("session {} closed by {}", self.id.short(), self.counterparty)))?;
        if envelope.session_id != self.id || envelope.sender != self.counterparty {
            return Err(EscrowError::transport("receive", format!("unexpected envelope on session {}", self.id.short())));
        }
        if !bool::from(Self::payload_hash(&envelope.payload).ct_eq(&envelope.payload_hash)) {
            return Err(EscrowError::transport("receive", "payload hash mismatch"));
        }
        let payload: SessionMessage = decode(&envelope.payload)?;
        trace!("session receive session_id={} from={} kind={} seq={}", self.id.short(), envelope.sender, payload.kind(), envelope.seq_no);
        Ok(payload)
    }

    pub async fn send_and_receive(&mut self, payload: SessionMessage) -> Result<SessionMessage> {
        self.send(payload).await?;
        self.receive().await
    }

    /// Tells the counterparty why this side is giving up. Delivery is best effort.
    pub async fn reject(&mut self, reason: impl Into<String>) {
        let _ = self.send(SessionMessage::Rejected { reason: reason.into() }).await;
    }
}
