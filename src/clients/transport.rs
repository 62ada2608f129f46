// Trait seams for the external Steam collaborators
//
// The orchestrator talks to Steam only through these traits, so the wire
// layer can be swapped for mocks in tests.

use async_trait::async_trait;

use crate::core::types::{EscrowInfo, Item, Offer, PartitionKey};
use crate::error::TradeResult;

/// Sent + received offers as observed in one poll cycle.
#[derive(Debug, Clone, Default)]
pub struct OfferSnapshot {
    pub sent: Vec<Offer>,
    pub received: Vec<Offer>,
}

/// Performs the actual network calls to create, inspect and resolve trade
/// offers.
#[async_trait]
pub trait OfferTransport: Send + Sync {
    /// Send a freshly built offer; returns the remote offer id on success.
    async fn send_offer(&self, offer: &Offer) -> TradeResult<u64>;

    async fn cancel_offer(&self, offer_id: u64) -> TradeResult<()>;

    /// Accept a received offer. `confirm` requests automatic mobile
    /// confirmation where the remote supports it.
    async fn accept_offer(&self, offer_id: u64, confirm: bool) -> TradeResult<()>;

    /// Escrow details for the partner of an unsent offer.
    async fn get_user_details(&self, offer: &Offer) -> TradeResult<EscrowInfo>;

    /// Concrete items received through an accepted offer.
    async fn get_received_items(&self, offer_id: u64) -> TradeResult<Vec<Item>>;

    /// One inventory partition. `tradable_only` filters untradable entries
    /// remotely.
    async fn load_inventory(
        &self,
        key: PartitionKey,
        tradable_only: bool,
    ) -> TradeResult<Vec<Item>>;

    /// Current sent/received offers, for state polling.
    async fn get_offers(&self) -> TradeResult<OfferSnapshot>;
}

/// Credentials handed to the session provider for a full login. Two-factor
/// code generation is the provider's concern, not ours.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub account_name: String,
    pub password: String,
    pub shared_secret: String,
}

/// Opaque session cookies returned by a successful login.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SessionCookies {
    pub cookies: Vec<String>,
}

/// oAuth blob persisted between runs for cookie-less re-login.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OAuthData {
    pub oauth_token: String,
    pub steam_guard: String,
}

/// Outcome of a login attempt: fresh cookies, plus an oauth blob when the
/// provider issued one.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub cookies: SessionCookies,
    pub oauth: Option<OAuthData>,
}

/// Owns login, cookie refresh and mobile confirmations.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Full credential login.
    async fn login(&self, credentials: &Credentials) -> TradeResult<LoginOutcome>;

    /// Re-login from a persisted oauth blob.
    async fn oauth_login(&self, oauth: &OAuthData) -> TradeResult<SessionCookies>;

    /// Install cookies into the live session.
    async fn set_cookies(&self, cookies: &SessionCookies) -> TradeResult<()>;

    /// Approve a pending offer with a proof derived from the identity secret.
    async fn confirm_offer(&self, identity_secret: &str, offer_id: u64) -> TradeResult<()>;
}
