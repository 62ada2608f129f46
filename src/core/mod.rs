// Core trade-offer lifecycle modules

pub mod classifier;
pub mod events;
pub mod inventory;
pub mod manager;
pub mod orchestrator;
pub mod poller;
pub mod session;
pub mod types;

// Re-export commonly used types
pub use events::{EventBus, ManagerEvent, TransportEvent};
pub use inventory::{InventoryAggregator, InventoryQuery};
pub use manager::TradeManager;
pub use orchestrator::{CreateOffer, TradeOrchestrator};
pub use types::{Identity, Item, Offer, OfferState, PartitionKey};
