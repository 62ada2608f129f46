// Trade offer lifecycle orchestration
//
// Owns offer creation, confirmation, acceptance/rejection policy and
// received-item recovery, each with its own fixed-delay retry budget.
// Failures go through the error classifier before propagating so session
// loss triggers re-authentication as a side effect.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::clients::transport::{OfferTransport, SessionProvider};
use crate::config::RetriesConfig;
use crate::core::classifier::ErrorClassifier;
use crate::core::events::{EventBus, ManagerEvent};
use crate::core::types::{Identity, Item, Offer, OfferState, extract_trade_token};
use crate::error::{TradeError, TradeResult};
use std::sync::Arc;

/// Request to build and send one offer.
#[derive(Debug, Clone)]
pub struct CreateOffer {
    pub partner: u64,
    pub items_to_receive: Vec<Item>,
    pub items_to_give: Vec<Item>,
    pub trade_url: String,
    /// Query partner escrow status before sending; a non-zero hold delay
    /// fails the request without a send call.
    pub check_escrow: bool,
    pub message: String,
}

pub struct TradeOrchestrator {
    transport: Arc<dyn OfferTransport>,
    session: Arc<dyn SessionProvider>,
    classifier: ErrorClassifier,
    bus: Arc<EventBus>,
    identity: Identity,
    app_id: u32,
    retries: RetriesConfig,
    /// Sent offers this orchestrator knows it created, by remote id. The
    /// poller uses this to tell its own offers from unknown ones.
    tracked: Mutex<HashMap<u64, Offer>>,
}

impl TradeOrchestrator {
    pub fn new(
        transport: Arc<dyn OfferTransport>,
        session: Arc<dyn SessionProvider>,
        classifier: ErrorClassifier,
        bus: Arc<EventBus>,
        identity: Identity,
        app_id: u32,
        retries: RetriesConfig,
    ) -> Self {
        Self {
            transport,
            session,
            classifier,
            bus,
            identity,
            app_id,
            retries,
            tracked: Mutex::new(HashMap::new()),
        }
    }

    /// Build, (optionally) escrow-check, send and confirm an offer.
    ///
    /// The escrow check always precedes the send when requested. If the send
    /// succeeded but confirmation failed, the offer is left tracked as
    /// CreatedNeedsConfirmation for the poll cycle to reconcile, and the
    /// confirmation error propagates.
    pub async fn create_offer(&self, request: CreateOffer) -> TradeResult<Offer> {
        let token = extract_trade_token(&request.trade_url);

        let mut offer = Offer::new(request.partner);
        offer.is_our_offer = true;
        offer.token = token;
        offer.message = request.message;
        offer.items_to_give = request.items_to_give;
        offer.items_to_receive = request.items_to_receive;

        if request.check_escrow {
            let details = self
                .transport
                .get_user_details(&offer)
                .await
                .map_err(|e| self.classified(e))?;

            if details.their_escrow_days != 0 {
                debug!(
                    partner = offer.partner,
                    "partner has {} escrow days, refusing to send",
                    details.their_escrow_days
                );
                return Err(TradeError::Escrow {
                    days: details.their_escrow_days,
                });
            }
        }

        let offer_id = self
            .transport
            .send_offer(&offer)
            .await
            .map_err(|e| self.classified(e))?;

        offer.id = Some(offer_id);
        offer.updated_at = Utc::now();

        if offer.items_to_give.is_empty() {
            // Nothing outbound, no confirmation step.
            offer.state = OfferState::Active;
        } else {
            offer.state = OfferState::CreatedNeedsConfirmation;
            self.track(offer.clone());

            self.session
                .confirm_offer(self.identity.identity_secret(), offer_id)
                .await
                .map_err(|e| self.classified(e))?;

            offer.state = OfferState::Active;
        }

        self.track(offer.clone());
        info!(offer_id, partner = offer.partner, "offer sent");
        Ok(offer)
    }

    /// Fetch the concrete items received through an accepted offer, emitting
    /// `NewItems` (global and per-offer) on success. Fire-and-forget: retry
    /// exhaustion is logged, never surfaced, since no caller is pending.
    pub async fn get_received_items(&self, offer: Offer) {
        if offer.state != OfferState::Accepted {
            debug!(offer_id = ?offer.id, "offer is not accepted, skipping item recovery");
            return;
        }

        if offer.items_to_receive.is_empty() {
            debug!(offer_id = ?offer.id, "offer has no received items");
            return;
        }

        let Some(offer_id) = offer.id else {
            debug!("offer has no remote id, skipping item recovery");
            return;
        };

        let budget = self.retries.received_items;
        let mut attempts = budget.attempts;
        if attempts < 0 {
            warn!(offer_id, "no retry budget for item recovery");
            return;
        }

        loop {
            match self.transport.get_received_items(offer_id).await {
                Ok(items) => {
                    info!(offer_id, count = items.len(), "recovered received items");
                    self.bus.emit(ManagerEvent::NewItems { offer, items });
                    return;
                }
                Err(e) => {
                    self.classifier.classify(&e);
                    attempts -= 1;
                    if attempts < 0 {
                        warn!(offer_id, "item recovery budget exhausted: {}", e);
                        return;
                    }
                    debug!(offer_id, attempts, "item recovery failed, will retry: {}", e);
                    sleep(budget.delay()).await;
                }
            }
        }
    }

    /// Cancel an offer still pending remotely. Exhausting the budget leaves
    /// the offer in unknown status; retrying past that risks side effects, so
    /// it stops and the next poll cycle reconciles.
    pub async fn cancel_offer(&self, offer: Offer) {
        if !matches!(
            offer.state,
            OfferState::Active | OfferState::CreatedNeedsConfirmation
        ) {
            debug!(offer_id = ?offer.id, "offer already resolved, nothing to cancel");
            return;
        }

        let Some(offer_id) = offer.id else {
            debug!("offer was never sent, nothing to cancel");
            return;
        };

        let budget = self.retries.cancel;
        let mut attempts = budget.attempts;
        if attempts < 0 {
            warn!(offer_id, "offer status unknown, not attempting cancel");
            return;
        }

        loop {
            match self.transport.cancel_offer(offer_id).await {
                Ok(()) => {
                    info!(offer_id, "offer canceled");
                    self.update_tracked(offer_id, OfferState::Canceled);
                    return;
                }
                Err(e) => {
                    self.classifier.classify(&e);
                    attempts -= 1;
                    if attempts < 0 {
                        warn!(offer_id, "cancel budget exhausted: {}", e);
                        return;
                    }
                    debug!(offer_id, attempts, "cancel failed, will retry: {}", e);
                    sleep(budget.delay()).await;
                }
            }
        }
    }

    /// Accept a received offer, but only when it costs the bot nothing and
    /// every incoming item belongs to the configured app. Anything else is
    /// routed to `cancel_offer` instead.
    pub async fn accept_offer(&self, offer: Offer) {
        let has_foreign_items = offer
            .items_to_receive
            .iter()
            .any(|item| item.app_id != self.app_id);

        if offer.state != OfferState::Active
            || !offer.items_to_give.is_empty()
            || has_foreign_items
        {
            info!(offer_id = ?offer.id, "offer is not acceptable, canceling instead");
            self.cancel_offer(offer).await;
            return;
        }

        let Some(offer_id) = offer.id else {
            debug!("offer has no remote id, cannot accept");
            return;
        };

        let budget = self.retries.accept;
        let mut attempts = budget.attempts;
        if attempts < 0 {
            warn!(offer_id, "no retry budget to accept offer");
            return;
        }

        loop {
            match self.transport.accept_offer(offer_id, true).await {
                Ok(()) => {
                    info!(offer_id, "offer accepted");
                    return;
                }
                Err(e) => {
                    self.classifier.classify(&e);
                    attempts -= 1;
                    if attempts < 0 {
                        warn!(offer_id, "accept budget exhausted: {}", e);
                        return;
                    }
                    debug!(offer_id, attempts, "accept failed, will retry: {}", e);
                    sleep(budget.delay()).await;
                }
            }
        }
    }

    /// Whether a sent offer id belongs to this orchestrator.
    pub fn is_tracked(&self, offer_id: u64) -> bool {
        self.tracked.lock().unwrap().contains_key(&offer_id)
    }

    pub fn tracked_offer(&self, offer_id: u64) -> Option<Offer> {
        self.tracked.lock().unwrap().get(&offer_id).cloned()
    }

    fn track(&self, offer: Offer) {
        if let Some(id) = offer.id {
            self.tracked.lock().unwrap().insert(id, offer);
        }
    }

    /// Record a remotely observed transition. Terminal states stick: once an
    /// offer terminates, further transitions are ignored.
    pub fn update_tracked(&self, offer_id: u64, state: OfferState) {
        let mut tracked = self.tracked.lock().unwrap();
        if let Some(offer) = tracked.get_mut(&offer_id) {
            if offer.state.is_terminal() {
                debug!(offer_id, "ignoring transition out of terminal state {:?}", offer.state);
                return;
            }
            offer.state = state;
            offer.updated_at = Utc::now();
        }
    }

    fn classified(&self, err: TradeError) -> TradeError {
        self.classifier.classify(&err);
        err
    }
}
