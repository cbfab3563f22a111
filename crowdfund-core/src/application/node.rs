use crate::application::observer::{CampaignObserver, NoopObserver};
use crate::domain::model::{Campaign, ResolvedRecord};
use crate::domain::transaction::{ResolvedTransaction, SignedTransaction, TransactionBuilder};
use crate::domain::verification::verify;
use crate::foundation::{CampaignId, Clock, EscrowError, Party, PartyId, PublicKey, Result};
use crate::infrastructure::config::EscrowConfig;
use crate::infrastructure::identity::IdentityService;
use crate::infrastructure::keys::KeyManager;
use crate::infrastructure::network::NetworkMap;
use crate::infrastructure::notary::{NotarisationResult, Notary};
use crate::infrastructure::storage::RecordStore;
use crate::infrastructure::transport::SessionTransport;
use log::{debug, info};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::task::JoinHandle;

/// Collaborators a node is wired with.
pub struct NodeServices {
    pub keys: Arc<dyn KeyManager>,
    pub store: Arc<dyn RecordStore>,
    pub identities: Arc<dyn IdentityService>,
    pub notary: Arc<dyn Notary>,
    pub transport: Arc<dyn SessionTransport>,
    pub network: Arc<NetworkMap>,
    pub clock: Arc<dyn Clock>,
}

/// One party on the network. Initiates and answers every campaign protocol.
pub struct PartyNode {
    pub(crate) party: Party,
    pub(crate) config: EscrowConfig,
    pub(crate) keys: Arc<dyn KeyManager>,
    pub(crate) store: Arc<dyn RecordStore>,
    pub(crate) identities: Arc<dyn IdentityService>,
    pub(crate) notary: Arc<dyn Notary>,
    pub(crate) transport: Arc<dyn SessionTransport>,
    pub(crate) network: Arc<NetworkMap>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) observer: Arc<dyn CampaignObserver>,
    /// Campaigns this node is currently ending.
    pub(crate) ending: Mutex<HashSet<CampaignId>>,
    pub(crate) scheduled: Mutex<HashMap<CampaignId, JoinHandle<()>>>,
    pub(crate) this: Weak<PartyNode>,
}

impl PartyNode {
    pub fn new(id: impl Into<PartyId>, config: EscrowConfig, services: NodeServices) -> Arc<Self> {
        Self::with_observer(id, config, services, Arc::new(NoopObserver))
    }

    pub fn with_observer(id: impl Into<PartyId>, config: EscrowConfig, services: NodeServices, observer: Arc<dyn CampaignObserver>) -> Arc<Self> {
        let party = Party { id: id.into(), key: services.keys.legal_key() };
        Arc::new_cyclic(|this| Self {
            party,
            config,
            keys: services.keys,
            store: services.store,
            identities: services.identities,
            notary: services.notary,
            transport: services.transport,
            network: services.network,
            clock: services.clock,
            observer,
            ending: Mutex::new(HashSet::new()),
            scheduled: Mutex::new(HashMap::new()),
            this: this.clone(),
        })
    }

    pub fn party(&self) -> &Party {
        &self.party
    }

    pub fn config(&self) -> &EscrowConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn identities(&self) -> &Arc<dyn IdentityService> {
        &self.identities
    }

    pub fn keys(&self) -> &Arc<dyn KeyManager> {
        &self.keys
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn transport(&self) -> &Arc<dyn SessionTransport> {
        &self.transport
    }

    pub fn now_nanos(&self) -> u64 {
        self.clock.now_nanos()
    }

    /// Latest unconsumed version of a campaign as this node knows it.
    pub fn campaign(&self, id: &CampaignId) -> Result<Option<Campaign>> {
        Ok(self.store.current_campaign(id)?.and_then(|resolved| resolved.record.as_campaign().cloned()))
    }

    pub(crate) fn current_campaign(&self, id: &CampaignId) -> Result<(ResolvedRecord, Campaign)> {
        let resolved = self.store.current_campaign(id)?.ok_or_else(|| EscrowError::RecordNotFound(format!("campaign {}", id.short())))?;
        let campaign = resolved
            .record
            .as_campaign()
            .cloned()
            .ok_or_else(|| EscrowError::RecordNotFound(format!("campaign {}", id.short())))?;
        Ok((resolved, campaign))
    }

    pub(crate) fn builder(&self) -> TransactionBuilder {
        TransactionBuilder::new(self.notary.identity().id.clone(), self.now_nanos())
    }

    /// Runs the engine over the proposal and signs it with `keys`.
    pub(crate) fn verify_and_sign(&self, proposal: &ResolvedTransaction, keys: &BTreeSet<PublicKey>) -> Result<SignedTransaction> {
        verify(&proposal.ledger()?)?;
        let signatures = self.keys.sign_transaction(&proposal.transaction, keys)?;
        Ok(proposal.transaction.clone().with_signatures(signatures))
    }

    pub(crate) fn legal_keys(&self) -> BTreeSet<PublicKey> {
        BTreeSet::from([self.party.key])
    }

    /// Submits to the notary and attaches its signature on commit.
    pub(crate) async fn notarise(&self, tx: SignedTransaction) -> Result<SignedTransaction> {
        match self.notary.submit(&tx).await? {
            NotarisationResult::Committed { tx_id, signature } => {
                info!("transaction notarised tx_id={} party={}", tx_id.short(), self.party.id);
                Ok(tx.with_signatures([signature]))
            }
            NotarisationResult::Rejected(conflict) => {
                Err(EscrowError::DoubleSpendConflict { record: conflict.record.to_string(), consumed_by: conflict.consumed_by.short() })
            }
        }
    }

    /// Records a finalized transaction and arms the end-of-campaign trigger for campaigns it starts.
    pub(crate) fn record(&self, tx: &SignedTransaction) -> Result<bool> {
        let fresh = self.store.record_transaction(tx)?;
        if fresh {
            self.schedule_started_campaigns(tx);
        }
        debug!("record transaction party={} tx_id={} fresh={}", self.party.id, tx.id()?.short(), fresh);
        Ok(fresh)
    }

    pub(crate) fn lock_ending(&self) -> Result<MutexGuard<'_, HashSet<CampaignId>>> {
        self.ending.lock().map_err(|_| EscrowError::StorageError { operation: "ending lock".to_string(), details: "poisoned".to_string() })
    }

    pub(crate) fn lock_scheduled(&self) -> Result<MutexGuard<'_, HashMap<CampaignId, JoinHandle<()>>>> {
        self.scheduled
            .lock()
            .map_err(|_| EscrowError::StorageError { operation: "scheduler lock".to_string(), details: "poisoned".to_string() })
    }

    /// Aborts every pending end-of-campaign trigger.
    pub fn shutdown(&self) {
        if let Ok(mut scheduled) = self.lock_scheduled() {
            for (_, handle) in scheduled.drain() {
                handle.abort();
            }
        }
    }
}
