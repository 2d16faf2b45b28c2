//! Wire models exchanged with the marketplace API.

use serde::{Deserialize, Serialize};

/// Exchange-rate quote for an amount of satoshis.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PriceQuote {
    /// Price in US dollars of the quoted amount.
    pub price: f64,
}

/// One page of the published-apps listing for a publisher.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PublishedAppsPage {
    /// Listings on this page.
    #[serde(default)]
    pub results: Vec<AppListing>,

    /// Total number of pages reported by the marketplace.
    #[serde(default)]
    pub total_pages: u32,
}

/// A single published marketplace listing.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AppListing {
    /// Public URL of the app, e.g. `http://10.244.1.5:8080/ping`.
    pub app_url: String,

    /// Listing title, if the marketplace returned one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Earnings held in the custodial buffer for the authenticated user.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EarningsSummary {
    /// Total buffered earnings, in satoshis.
    pub total_earnings: u64,
}

/// Request body for publishing an app listing.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PublishRequest {
    /// Listing title.
    pub title: String,

    /// Public URL the marketplace should route buyers to.
    pub app_url: String,

    /// Short description shown in the directory.
    pub description: String,
}

impl PublishRequest {
    /// Build the listing for a service served at `address` (`host:port`).
    #[must_use]
    pub fn for_service(service: &str, address: &str) -> Self {
        Self {
            title: service.to_string(),
            app_url: format!("http://{address}/{service}"),
            description: format!("{service} service hosted at {address}"),
        }
    }
}

/// Login request body.
#[derive(Clone, Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub payout_address: &'a str,
}

/// Login response body.
#[derive(Clone, Debug, Deserialize)]
pub(crate) struct LoginResponse {
    pub token: String,
}
