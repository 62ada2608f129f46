// Offer state polling
//
// Periodically snapshots sent/received offers through the transport, diffs
// against last-known states, and feeds the router. Also cancels sent offers
// that have been pending remotely for too long.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::clients::transport::{OfferSnapshot, OfferTransport};
use crate::core::events::TransportEvent;
use crate::core::orchestrator::TradeOrchestrator;
use crate::core::types::{Offer, OfferState};

pub struct OfferPoller {
    transport: Arc<dyn OfferTransport>,
    orchestrator: Arc<TradeOrchestrator>,
    events: mpsc::UnboundedSender<TransportEvent>,
    poll_interval: Duration,
    /// Sent offers stuck Active longer than this are canceled.
    cancel_time: Duration,
    /// Sent offers stuck CreatedNeedsConfirmation longer than this are
    /// canceled.
    pending_cancel_time: Duration,
    received_states: Mutex<HashMap<u64, OfferState>>,
    /// Unknown sent offers already reported; one event per offer is enough.
    reported_unknown: Mutex<HashSet<u64>>,
    /// Stale offers with a cancel already in flight.
    cancel_pending: Mutex<HashSet<u64>>,
}

impl OfferPoller {
    pub fn new(
        transport: Arc<dyn OfferTransport>,
        orchestrator: Arc<TradeOrchestrator>,
        events: mpsc::UnboundedSender<TransportEvent>,
        poll_interval: Duration,
        cancel_time: Duration,
        pending_cancel_time: Duration,
    ) -> Self {
        Self {
            transport,
            orchestrator,
            events,
            poll_interval,
            cancel_time,
            pending_cancel_time,
            received_states: Mutex::new(HashMap::new()),
            reported_unknown: Mutex::new(HashSet::new()),
            cancel_pending: Mutex::new(HashSet::new()),
        }
    }

    /// Poll until the router side of the event channel goes away.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if self.events.is_closed() {
                debug!("event channel closed, poller stopping");
                return;
            }
            self.poll_once().await;
        }
    }

    pub async fn poll_once(&self) {
        match self.transport.get_offers().await {
            Ok(snapshot) => {
                self.send(TransportEvent::PollSuccess);
                self.diff_sent(&snapshot);
                self.diff_received(&snapshot);
            }
            Err(e) => {
                warn!("offer poll failed: {}", e);
                self.send(TransportEvent::PollFailure(e.to_string()));
            }
        }
    }

    fn diff_sent(&self, snapshot: &OfferSnapshot) {
        for offer in &snapshot.sent {
            let Some(offer_id) = offer.id else { continue };

            match self.orchestrator.tracked_offer(offer_id) {
                Some(known) => {
                    if known.state != offer.state && !known.state.is_terminal() {
                        self.orchestrator.update_tracked(offer_id, offer.state);
                        self.send(TransportEvent::SentOfferChanged {
                            offer: offer.clone(),
                            old_state: known.state,
                        });
                    }
                    self.cancel_if_stale(offer);
                }
                None => {
                    if offer.state.is_terminal() {
                        continue;
                    }
                    if self.reported_unknown.lock().unwrap().insert(offer_id) {
                        info!(offer_id, "sent offer not created by this manager");
                        self.send(TransportEvent::UnknownOfferSent(offer.clone()));
                    }
                }
            }
        }
    }

    fn diff_received(&self, snapshot: &OfferSnapshot) {
        for offer in &snapshot.received {
            let Some(offer_id) = offer.id else { continue };

            let old_state = {
                let mut states = self.received_states.lock().unwrap();
                states.insert(offer_id, offer.state)
            };

            match old_state {
                None => self.send(TransportEvent::NewOffer(offer.clone())),
                Some(old) if old != offer.state => {
                    self.send(TransportEvent::ReceivedOfferChanged {
                        offer: offer.clone(),
                        old_state: old,
                    });
                }
                Some(_) => {}
            }
        }
    }

    /// Cancel sent offers that stayed pending past their deadline.
    fn cancel_if_stale(&self, offer: &Offer) {
        let deadline = match offer.state {
            OfferState::Active => self.cancel_time,
            OfferState::CreatedNeedsConfirmation => self.pending_cancel_time,
            _ => return,
        };

        let age = (Utc::now() - offer.updated_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        if age < deadline {
            return;
        }

        let Some(offer_id) = offer.id else { return };
        if !self.cancel_pending.lock().unwrap().insert(offer_id) {
            return;
        }

        info!(offer_id, "offer pending for {:?}, canceling", age);
        let orchestrator = Arc::clone(&self.orchestrator);
        let offer = offer.clone();
        tokio::spawn(async move {
            orchestrator.cancel_offer(offer).await;
        });
    }

    fn send(&self, event: TransportEvent) {
        if self.events.send(event).is_err() {
            debug!("event router is gone, dropping poll event");
        }
    }
}
