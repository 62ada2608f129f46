// Event bus and router
//
// Transport and session events arrive on an mpsc channel; the router
// translates them into orchestrator actions and outward notifications on a
// broadcast bus, plus per-offer item deliveries for scoped listeners.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::core::orchestrator::TradeOrchestrator;
use crate::core::session::SessionManager;
use crate::core::types::{Item, Offer, OfferState};

/// Events arriving from the offer transport / session layer.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    NewOffer(Offer),
    UnknownOfferSent(Offer),
    ReceivedOfferChanged { offer: Offer, old_state: OfferState },
    SentOfferChanged { offer: Offer, old_state: OfferState },
    PollSuccess,
    PollFailure(String),
    SessionExpired,
}

/// Notifications emitted outward by the manager.
#[derive(Debug, Clone)]
pub enum ManagerEvent {
    NewOffer(Offer),
    ReceivedOfferChanged { offer: Offer, old_state: OfferState },
    SentOfferChanged { offer: Offer, old_state: OfferState },
    NewItems { offer: Offer, items: Vec<Item> },
}

/// Broadcast bus with an additional per-offer-id registry so listeners can
/// wait for the items of one specific offer.
pub struct EventBus {
    tx: broadcast::Sender<ManagerEvent>,
    scoped: Mutex<HashMap<u64, Vec<mpsc::UnboundedSender<Vec<Item>>>>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            scoped: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe to all outward notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.tx.subscribe()
    }

    /// Subscribe to the received items of one offer id.
    pub fn subscribe_new_items(&self, offer_id: u64) -> mpsc::UnboundedReceiver<Vec<Item>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.scoped
            .lock()
            .unwrap()
            .entry(offer_id)
            .or_default()
            .push(tx);
        rx
    }

    pub fn emit(&self, event: ManagerEvent) {
        if let ManagerEvent::NewItems { offer, items } = &event {
            if let Some(offer_id) = offer.id {
                let mut scoped = self.scoped.lock().unwrap();
                if let Some(senders) = scoped.get_mut(&offer_id) {
                    senders.retain(|tx| tx.send(items.clone()).is_ok());
                    if senders.is_empty() {
                        scoped.remove(&offer_id);
                    }
                }
            }
        }

        // A send error just means nobody is listening right now.
        let _ = self.tx.send(event);
    }
}

/// Dispatches transport events to the orchestrator and the outward bus.
pub struct EventRouter {
    orchestrator: Arc<TradeOrchestrator>,
    session: Arc<SessionManager>,
    bus: Arc<EventBus>,
    steam_is_down: Arc<AtomicBool>,
    auto_offer_accept: bool,
}

impl EventRouter {
    pub fn new(
        orchestrator: Arc<TradeOrchestrator>,
        session: Arc<SessionManager>,
        bus: Arc<EventBus>,
        steam_is_down: Arc<AtomicBool>,
        auto_offer_accept: bool,
    ) -> Self {
        Self {
            orchestrator,
            session,
            bus,
            steam_is_down,
            auto_offer_accept,
        }
    }

    /// Consume transport events until the channel closes. Orchestrator
    /// actions are spawned so one slow retry chain never blocks routing.
    pub async fn run(self, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
        while let Some(event) = events.recv().await {
            self.dispatch(event);
        }
        debug!("transport event channel closed, router stopping");
    }

    pub fn dispatch(&self, event: TransportEvent) {
        match event {
            TransportEvent::SessionExpired => {
                info!("session expired, triggering re-authentication");
                let session = Arc::clone(&self.session);
                tokio::spawn(async move {
                    session.handle_session_expired().await;
                });
            }

            TransportEvent::PollSuccess => {
                self.steam_is_down.store(false, Ordering::SeqCst);
            }

            TransportEvent::PollFailure(reason) => {
                warn!("steam is down: {}", reason);
                self.steam_is_down.store(true, Ordering::SeqCst);
            }

            TransportEvent::UnknownOfferSent(offer) => {
                info!(offer_id = ?offer.id, "unknown sent offer detected, canceling");
                let orchestrator = Arc::clone(&self.orchestrator);
                tokio::spawn(async move {
                    orchestrator.cancel_offer(offer).await;
                });
            }

            TransportEvent::NewOffer(offer) => {
                if self.auto_offer_accept {
                    let orchestrator = Arc::clone(&self.orchestrator);
                    tokio::spawn(async move {
                        orchestrator.accept_offer(offer).await;
                    });
                } else {
                    self.bus.emit(ManagerEvent::NewOffer(offer));
                }
            }

            TransportEvent::ReceivedOfferChanged { offer, old_state } => {
                self.bus.emit(ManagerEvent::ReceivedOfferChanged {
                    offer: offer.clone(),
                    old_state,
                });
                self.recover_items(offer, old_state);
            }

            TransportEvent::SentOfferChanged { offer, old_state } => {
                self.bus.emit(ManagerEvent::SentOfferChanged {
                    offer: offer.clone(),
                    old_state,
                });
                self.recover_items(offer, old_state);
            }
        }
    }

    /// Every observed state transition opportunistically attempts item
    /// recovery; the orchestrator no-ops unless the offer was accepted.
    fn recover_items(&self, offer: Offer, old_state: OfferState) {
        debug!(
            offer_id = ?offer.id,
            "offer changed state from {:?} to {:?}",
            old_state,
            offer.state
        );

        let orchestrator = Arc::clone(&self.orchestrator);
        tokio::spawn(async move {
            orchestrator.get_received_items(offer).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Offer;

    fn offer_with_id(id: u64) -> Offer {
        let mut offer = Offer::new(1);
        offer.id = Some(id);
        offer
    }

    #[tokio::test]
    async fn test_scoped_new_items_delivery() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe_new_items(5);

        let items = vec![];
        bus.emit(ManagerEvent::NewItems {
            offer: offer_with_id(5),
            items: items.clone(),
        });

        assert_eq!(rx.recv().await.unwrap(), items);
    }

    #[tokio::test]
    async fn test_scoped_delivery_is_per_offer() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe_new_items(5);

        bus.emit(ManagerEvent::NewItems {
            offer: offer_with_id(6),
            items: vec![],
        });

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_delivery() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(ManagerEvent::NewOffer(offer_with_id(9)));

        match rx.recv().await.unwrap() {
            ManagerEvent::NewOffer(offer) => assert_eq!(offer.id, Some(9)),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
