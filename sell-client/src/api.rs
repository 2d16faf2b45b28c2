//! The marketplace contract consumed by the orchestrator.

use async_trait::async_trait;

use crate::models::{EarningsSummary, PriceQuote, PublishRequest, PublishedAppsPage};
use crate::Result;

/// Operations the host orchestrator needs from the marketplace backend.
///
/// [`RestClient`](crate::RestClient) is the HTTP implementation; tests substitute
/// in-memory fakes.
#[async_trait]
pub trait MarketplaceApi: Send + Sync {
    /// Quote the US dollar price of `satoshis`.
    async fn quote_bitcoin_price(&self, satoshis: u64) -> Result<PriceQuote>;

    /// Fetch one page (zero-based) of apps published by `publisher`.
    async fn get_published_apps(&self, publisher: &str, page: u32) -> Result<PublishedAppsPage>;

    /// Authenticate with a password, binding payouts to `payout_address`.
    async fn login(&self, payout_address: &str, password: &str) -> Result<()>;

    /// Buffered earnings for the authenticated user.
    async fn get_earnings(&self) -> Result<EarningsSummary>;

    /// Publish a listing. Returns [`ClientError::Conflict`](crate::ClientError::Conflict)
    /// when the listing already exists.
    async fn publish_app(&self, request: &PublishRequest) -> Result<()>;
}
