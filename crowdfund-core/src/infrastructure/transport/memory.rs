use crate::foundation::{EscrowError, PartyId, Result};
use crate::infrastructure::config::TransportConfig;
use crate::infrastructure::transport::messages::Protocol;
use crate::infrastructure::transport::session::Session;
use crate::infrastructure::transport::traits::{IncomingSessions, SessionTransport};
use async_trait::async_trait;
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// In-process switchboard connecting every registered party's inbox.
pub struct MemoryHub {
    inboxes: Mutex<HashMap<PartyId, mpsc::Sender<Session>>>,
    config: TransportConfig,
}

impl MemoryHub {
    pub fn new(config: TransportConfig) -> Self {
        Self { inboxes: Mutex::new(HashMap::new()), config }
    }

    pub async fn register(self: &Arc<Self>, party: PartyId) -> MemoryTransport {
        let (sender, receiver) = mpsc::channel(self.config.inbox_capacity);
        self.inboxes.lock().await.insert(party.clone(), sender);
        MemoryTransport { hub: Arc::clone(self), local: party, incoming: Mutex::new(Some(receiver)) }
    }

    /// Removes a party; sessions opened towards it afterwards fail.
    pub async fn disconnect(&self, party: &PartyId) {
        self.inboxes.lock().await.remove(party);
    }

    async fn inbox(&self, party: &PartyId) -> Option<mpsc::Sender<Session>> {
        self.inboxes.lock().await.get(party).cloned()
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::new(TransportConfig::default())
    }
}

pub struct MemoryTransport {
    hub: Arc<MemoryHub>,
    local: PartyId,
    incoming: Mutex<Option<mpsc::Receiver<Session>>>,
}

#[async_trait]
impl SessionTransport for MemoryTransport {
    fn local_party(&self) -> &PartyId {
        &self.local
    }

    async fn open_session(&self, counterparty: &PartyId, protocol: Protocol) -> Result<Session> {
        let inbox = self
            .hub
            .inbox(counterparty)
            .await
            .ok_or_else(|| EscrowError::transport("open session", format!("party {counterparty} is not reachable")))?;
        let config = &self.hub.config;
        let (local, remote) =
            Session::pair(protocol, self.local.clone(), counterparty.clone(), config.session_channel_capacity, config.max_message_bytes);
        inbox.send(remote).await.map_err(|_| EscrowError::transport("open session", format!("party {counterparty} stopped accepting")))?;
        debug!("opened session session_id={} protocol={} from={} to={}", local.id().short(), protocol, self.local, counterparty);
        Ok(local)
    }

    async fn incoming(&self) -> Result<IncomingSessions> {
        let mut receiver = self
            .incoming
            .lock()
            .await
            .take()
            .ok_or_else(|| EscrowError::transport("incoming", format!("inbound sessions for {} already taken", self.local)))?;
        let stream = async_stream::stream! {
            while let Some(session) = receiver.recv().await {
                yield session;
            }
        };
        Ok(IncomingSessions::new(Box::pin(stream)))
    }
}
