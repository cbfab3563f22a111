use crate::application::node::PartyNode;
use crate::foundation::Result;
use crate::infrastructure::transport::{Protocol, Session};
use log::{info, warn};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Accepts inbound sessions until the transport closes, answering each on its own task.
pub async fn run_responder_loop(node: Arc<PartyNode>) -> Result<()> {
    let mut incoming = node.transport().incoming().await?;
    info!("responder loop started party={}", node.party().id);
    while let Some(session) = incoming.next().await {
        let node = Arc::clone(&node);
        tokio::spawn(async move { node.dispatch(session).await });
    }
    info!("responder loop stopped party={}", node.party().id);
    Ok(())
}

pub fn spawn_responder_loop(node: Arc<PartyNode>) -> JoinHandle<Result<()>> {
    tokio::spawn(run_responder_loop(node))
}

impl PartyNode {
    async fn dispatch(&self, session: Session) {
        let protocol = session.protocol();
        let counterparty = session.counterparty().clone();
        let result = match protocol {
            Protocol::Pledge => self.respond_to_pledge(session).await,
            Protocol::Settlement => self.respond_to_settlement(session).await,
            Protocol::Broadcast => self.record_as_observer(session).await.map(|_| ()),
            Protocol::Issuance => self.respond_to_issuance(session).await,
        };
        if let Err(err) = result {
            warn!("responder failed party={} protocol={} counterparty={} error={}", self.party.id, protocol, counterparty, err);
            self.observer.on_protocol_failed(protocol, &counterparty, &err.to_string());
        }
    }
}
