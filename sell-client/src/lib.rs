//! Marketplace client library for the `sell` host orchestrator.
//!
//! The orchestrator talks to the marketplace backend for four things: the
//! bitcoin exchange rate, the listing of apps this host has already published,
//! the custodial buffer balance, and publishing new listings. All of it goes
//! through the [`MarketplaceApi`] trait so the engine never depends on HTTP
//! details directly.
//!
//! # Example
//!
//! ```rust,no_run
//! use sell_client::{MarketplaceApi, RestClient};
//!
//! # async fn run() -> sell_client::Result<()> {
//! let client = RestClient::new("https://market.example", "alice")?;
//! client.login("1BoatSLRHtKNngkdXEeobR76b53LETtpyT", "hunter2").await?;
//! let page = client.get_published_apps("alice", 0).await?;
//! println!("{} page(s) of published apps", page.total_pages);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod error;
pub mod models;
pub mod rest;

pub use api::MarketplaceApi;
pub use error::ClientError;
pub use models::{AppListing, EarningsSummary, PriceQuote, PublishRequest, PublishedAppsPage};
pub use rest::RestClient;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
