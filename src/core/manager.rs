// Top-level wiring: one TradeManager per bot identity

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::info;

use crate::clients::transport::{Credentials, OfferTransport, SessionProvider};
use crate::config::Config;
use crate::core::classifier::ErrorClassifier;
use crate::core::events::{EventBus, EventRouter, ManagerEvent, TransportEvent};
use crate::core::inventory::{InventoryAggregator, InventoryQuery};
use crate::core::orchestrator::{CreateOffer, TradeOrchestrator};
use crate::core::poller::OfferPoller;
use crate::core::session::{BlobStore, SessionManager};
use crate::core::types::{Identity, Item, Offer};
use crate::error::TradeResult;

pub struct TradeManager {
    config: Config,
    bus: Arc<EventBus>,
    orchestrator: Arc<TradeOrchestrator>,
    session: Arc<SessionManager>,
    inventory: InventoryAggregator,
    steam_is_down: Arc<AtomicBool>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    // Consumed by start().
    events_rx: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    poller: Option<Arc<OfferPoller>>,
    tasks: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for TradeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradeManager").finish_non_exhaustive()
    }
}

impl TradeManager {
    pub fn new(
        config: Config,
        transport: Arc<dyn OfferTransport>,
        provider: Arc<dyn SessionProvider>,
    ) -> TradeResult<Self> {
        config.validate()?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let classifier = ErrorClassifier::new(events_tx.clone());
        let bus = Arc::new(EventBus::new(256));

        let identity = Identity::new(
            config.account.steam_id,
            config.account.identity_secret.clone(),
        );

        let orchestrator = Arc::new(TradeOrchestrator::new(
            Arc::clone(&transport),
            Arc::clone(&provider),
            classifier,
            Arc::clone(&bus),
            identity,
            config.trading.app_id,
            config.retries.clone(),
        ));

        let credentials = Credentials {
            account_name: config.account.account_name.clone(),
            password: config.account.password.clone(),
            shared_secret: config.account.shared_secret.clone(),
        };
        let store = BlobStore::new(&config.data_dir)?;
        let session = Arc::new(SessionManager::new(
            provider,
            credentials,
            config.account.steam_id,
            config.trading.app_id,
            config.trading.context_id,
            store,
        ));

        let inventory = InventoryAggregator::new(
            Arc::clone(&transport),
            config.account.steam_id,
            config.trading.app_id,
            config.trading.context_id,
        );

        let poller = Arc::new(OfferPoller::new(
            transport,
            Arc::clone(&orchestrator),
            events_tx.clone(),
            Duration::from_millis(config.trading.poll_interval_ms),
            Duration::from_millis(config.trading.cancel_time_ms),
            Duration::from_millis(config.trading.pending_cancel_time_ms),
        ));

        Ok(Self {
            config,
            bus,
            orchestrator,
            session,
            inventory,
            steam_is_down: Arc::new(AtomicBool::new(false)),
            events_tx,
            events_rx: Some(events_rx),
            poller: Some(poller),
            tasks: Vec::new(),
        })
    }

    /// Establish the session and spawn the router and poll loops.
    pub async fn start(&mut self) {
        self.session.ensure_session().await;

        if let Some(events_rx) = self.events_rx.take() {
            let router = EventRouter::new(
                Arc::clone(&self.orchestrator),
                Arc::clone(&self.session),
                Arc::clone(&self.bus),
                Arc::clone(&self.steam_is_down),
                self.config.trading.auto_offer_accept,
            );
            self.tasks.push(tokio::spawn(router.run(events_rx)));
        }

        if let Some(poller) = self.poller.take() {
            self.tasks.push(tokio::spawn(poller.run()));
        }

        info!(
            account = %self.config.account.account_name,
            "trade manager started"
        );
    }

    pub async fn create_offer(&self, request: CreateOffer) -> TradeResult<Offer> {
        self.orchestrator.create_offer(request).await
    }

    pub async fn accept_offer(&self, offer: Offer) {
        self.orchestrator.accept_offer(offer).await
    }

    pub async fn cancel_offer(&self, offer: Offer) {
        self.orchestrator.cancel_offer(offer).await
    }

    pub async fn get_received_items(&self, offer: Offer) {
        self.orchestrator.get_received_items(offer).await
    }

    pub async fn load_inventory(&self, query: InventoryQuery) -> TradeResult<Vec<Item>> {
        self.inventory.load_inventory(query).await
    }

    /// Subscribe to outward notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.bus.subscribe()
    }

    /// Subscribe to the received items of one offer id.
    pub fn subscribe_new_items(&self, offer_id: u64) -> mpsc::UnboundedReceiver<Vec<Item>> {
        self.bus.subscribe_new_items(offer_id)
    }

    /// Set on poll failure, cleared on the next poll success.
    pub fn is_steam_down(&self) -> bool {
        self.steam_is_down.load(Ordering::SeqCst)
    }

    /// Inject a transport/session event, e.g. from an external push source.
    pub fn event_sender(&self) -> mpsc::UnboundedSender<TransportEvent> {
        self.events_tx.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for TradeManager {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
