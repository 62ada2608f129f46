// Inventory aggregation across (owner, app, context) partitions

use std::sync::Arc;

use futures_util::future::try_join_all;
use tracing::debug;

use crate::clients::transport::OfferTransport;
use crate::core::types::{Item, PartitionKey};
use crate::error::TradeResult;

/// Optional overrides for one aggregate load; unset fields fall back to the
/// bot's configured identity/app/context.
#[derive(Debug, Clone, Default)]
pub struct InventoryQuery {
    pub steam_id: Option<u64>,
    pub app_ids: Option<Vec<u32>>,
    pub context_id: Option<u64>,
}

/// Fans inventory loads out across partitions and merges the results,
/// tagging each item with its owning identity.
pub struct InventoryAggregator {
    transport: Arc<dyn OfferTransport>,
    steam_id: u64,
    app_id: u32,
    context_id: u64,
}

impl InventoryAggregator {
    pub fn new(
        transport: Arc<dyn OfferTransport>,
        steam_id: u64,
        app_id: u32,
        context_id: u64,
    ) -> Self {
        Self {
            transport,
            steam_id,
            app_id,
            context_id,
        }
    }

    /// Load every requested partition in parallel and merge into one flat,
    /// marketable-only sequence. All-or-nothing: if any partition fails the
    /// aggregate fails with that error and partial data is discarded, since a
    /// partial inventory view is unsafe for trade composition.
    pub async fn load_inventory(&self, query: InventoryQuery) -> TradeResult<Vec<Item>> {
        let steam_id = query.steam_id.unwrap_or(self.steam_id);
        let context_id = query.context_id.unwrap_or(self.context_id);
        let app_ids = query.app_ids.unwrap_or_else(|| vec![self.app_id]);

        debug!(steam_id, context_id, partitions = app_ids.len(), "loading inventory");

        let loads = app_ids.into_iter().map(|app_id| {
            let key = PartitionKey {
                steam_id,
                app_id,
                context_id,
            };
            self.transport.load_inventory(key, true)
        });

        let partitions = try_join_all(loads).await?;

        let items = partitions
            .into_iter()
            .flatten()
            .filter(|item| item.marketable)
            .map(|mut item| {
                item.owner = Some(steam_id);
                item
            })
            .collect();

        Ok(items)
    }
}
