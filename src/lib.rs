// Steam Trade Bot Library
//
// Trade-offer lifecycle orchestration for a box-opening bot: offer creation,
// mobile confirmation, acceptance/rejection policy, state polling and
// received-item recovery against the Steam Web API.

pub mod clients;
pub mod config;
pub mod core;
pub mod error;

// Re-export core lifecycle types
pub use core::{
    CreateOffer, EventBus, Identity, InventoryAggregator, InventoryQuery, Item, ManagerEvent,
    Offer, OfferState, PartitionKey, TradeManager, TradeOrchestrator, TransportEvent,
};

// Re-export error types
pub use error::{TradeError, TradeResult};

// Re-export client seams
pub use clients::{
    Credentials, OfferSnapshot, OfferTransport, SessionCookies, SessionProvider, SteamWebClient,
};

// Re-export configuration
pub use config::{Config, ConfigError, RetriesConfig, RetryConfig, TradingConfig};
