// Core domain types: identities, items, offers and their state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// A bot or partner account: SteamID64 plus the secret used to produce
/// mobile-confirmation proofs. Immutable after construction.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    pub steam_id: u64,
    identity_secret: String,
}

impl Identity {
    pub fn new(steam_id: u64, identity_secret: impl Into<String>) -> Self {
        Self {
            steam_id,
            identity_secret: identity_secret.into(),
        }
    }

    /// Partner-side identity with no confirmation secret.
    pub fn partner(steam_id: u64) -> Self {
        Self::new(steam_id, "")
    }

    pub fn identity_secret(&self) -> &str {
        &self.identity_secret
    }
}

// Keep the confirmation secret out of logs.
impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("steam_id", &self.steam_id)
            .finish()
    }
}

/// Trade offer states as reported by the remote service (wire codes in
/// parentheses). Once a terminal state is reached no further transitions are
/// accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OfferState {
    Invalid,                   // 1
    Active,                    // 2
    Accepted,                  // 3
    Countered,                 // 4
    Expired,                   // 5
    Canceled,                  // 6
    Declined,                  // 7
    InvalidItems,              // 8
    CreatedNeedsConfirmation,  // 9
    CanceledBySecondFactor,    // 10
    InEscrow,                  // 11
}

impl OfferState {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(OfferState::Invalid),
            2 => Some(OfferState::Active),
            3 => Some(OfferState::Accepted),
            4 => Some(OfferState::Countered),
            5 => Some(OfferState::Expired),
            6 => Some(OfferState::Canceled),
            7 => Some(OfferState::Declined),
            8 => Some(OfferState::InvalidItems),
            9 => Some(OfferState::CreatedNeedsConfirmation),
            10 => Some(OfferState::CanceledBySecondFactor),
            11 => Some(OfferState::InEscrow),
            _ => None,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            OfferState::Invalid => 1,
            OfferState::Active => 2,
            OfferState::Accepted => 3,
            OfferState::Countered => 4,
            OfferState::Expired => 5,
            OfferState::Canceled => 6,
            OfferState::Declined => 7,
            OfferState::InvalidItems => 8,
            OfferState::CreatedNeedsConfirmation => 9,
            OfferState::CanceledBySecondFactor => 10,
            OfferState::InEscrow => 11,
        }
    }

    /// Only Active and CreatedNeedsConfirmation offers are still pending
    /// remotely; everything else is terminal.
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            OfferState::Active | OfferState::CreatedNeedsConfirmation
        )
    }
}

/// One entry in an inventory or offer. Immutable once read; `owner` is
/// tagged during inventory aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub asset_id: u64,
    pub app_id: u32,
    pub context_id: u64,
    pub class_id: u64,
    pub market_hash_name: String,
    pub marketable: bool,
    /// SteamID64 of the owning account, set once resolved from an inventory
    /// load.
    pub owner: Option<u64>,
}

/// One (owner, app, context) inventory namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartitionKey {
    pub steam_id: u64,
    pub app_id: u32,
    pub context_id: u64,
}

/// Escrow details for both sides of a prospective trade.
#[derive(Debug, Clone, Copy, Default)]
pub struct EscrowInfo {
    pub my_escrow_days: u32,
    pub their_escrow_days: u32,
}

/// A proposed exchange between the bot identity and a partner. The remote
/// `id` is assigned only after a successful send.
#[derive(Debug, Clone)]
pub struct Offer {
    pub id: Option<u64>,
    pub partner: u64,
    pub token: Option<String>,
    pub message: String,
    pub items_to_give: Vec<Item>,
    pub items_to_receive: Vec<Item>,
    pub state: OfferState,
    pub is_our_offer: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Offer {
    pub fn new(partner: u64) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            partner,
            token: None,
            message: String::new(),
            items_to_give: Vec::new(),
            items_to_receive: Vec::new(),
            state: OfferState::Invalid,
            is_our_offer: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Confirmation is required exactly when the offer has outbound items and
    /// has been successfully sent.
    pub fn needs_confirmation(&self) -> bool {
        self.id.is_some() && !self.items_to_give.is_empty()
    }
}

/// Extract the access token from a partner trade URL.
///
/// Public trade links omit the `token` parameter, and partners paste all
/// sorts of garbage; anything without a parseable token just leaves the
/// token unset rather than failing the offer.
pub fn extract_trade_token(trade_url: &str) -> Option<String> {
    let url = Url::parse(trade_url).ok()?;

    url.query_pairs()
        .find(|(k, _)| k == "token")
        .map(|(_, v)| v.into_owned())
}
