use crate::foundation::{PartyId, Result};
use crate::infrastructure::transport::messages::Protocol;
use crate::infrastructure::transport::session::Session;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;

/// Sessions opened towards this party, in arrival order.
pub struct IncomingSessions {
    inner: BoxStream<'static, Session>,
}

impl IncomingSessions {
    pub fn new(inner: BoxStream<'static, Session>) -> Self {
        Self { inner }
    }

    pub async fn next(&mut self) -> Option<Session> {
        self.inner.next().await
    }
}

#[async_trait]
pub trait SessionTransport: Send + Sync {
    fn local_party(&self) -> &PartyId;

    async fn open_session(&self, counterparty: &PartyId, protocol: Protocol) -> Result<Session>;

    /// Stream of inbound sessions. Can be taken once.
    async fn incoming(&self) -> Result<IncomingSessions>;
}
