//! Deals catalog client
//!
//! Queries the storefront's deals endpoint (`GET /deals/?tags=...`) and maps
//! the WooCommerce-style product JSON into [`Deal`] snapshots. Any failure is
//! recovered here as an empty listing so the caller can always render a
//! response.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Catalog returned HTTP {0}")]
    Status(StatusCode),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// A deal as listed by the catalog backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(deserialize_with = "deserialize_required_price")]
    pub regular_price: Decimal,
    #[serde(default, deserialize_with = "deserialize_optional_price")]
    pub sale_price: Option<Decimal>,
    #[serde(default)]
    pub images: Vec<DealImage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealImage {
    pub src: String,
}

impl Deal {
    /// Sale price when the deal has one, otherwise the regular price
    pub fn effective_price(&self) -> Decimal {
        self.sale_price.unwrap_or(self.regular_price)
    }

    pub fn display_price(&self, currency_symbol: &str) -> String {
        format!("{}{}", currency_symbol, self.effective_price().normalize())
    }

    /// Canonical product page for this deal on the storefront
    pub fn url(&self, storefront_url: &str) -> String {
        format!("{}/product/?p={}/", storefront_url.trim_end_matches('/'), self.id)
    }

    pub fn first_image(&self) -> Option<&DealImage> {
        self.images.first()
    }
}

/// Build the `tags` query value from the extracted facets.
///
/// Present facets are joined with a comma, location first. With neither
/// facet the result is empty and the catalog returns its general listing.
pub fn join_tags(location: Option<&str>, category: Option<&str>) -> String {
    [location, category]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

/// Source of deal listings
#[async_trait]
pub trait DealCatalog: Send + Sync {
    /// Fetch deals matching the comma-joined `tags`. Never fails: backend
    /// errors yield an empty listing.
    async fn fetch_deals(&self, tags: &str) -> Vec<Deal>;
}

/// HTTP client for the storefront's deals endpoint
pub struct CatalogClient {
    base_url: String,
    client: Client,
}

impl CatalogClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, CatalogError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn try_fetch(&self, tags: &str) -> Result<Vec<Deal>, CatalogError> {
        let url = format!("{}/deals/", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("tags", tags)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status(status));
        }

        let body: Value = response.json().await?;
        let entries = match body {
            Value::Array(entries) => entries,
            other => {
                return Err(CatalogError::InvalidResponse(format!(
                    "expected a list of deals, got {}",
                    json_type(&other)
                )))
            }
        };

        // Skip individual malformed entries rather than losing the listing
        let deals = entries
            .into_iter()
            .filter_map(|entry| match serde_json::from_value::<Deal>(entry) {
                Ok(deal) => Some(deal),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping malformed deal entry");
                    None
                }
            })
            .collect();

        Ok(deals)
    }
}

#[async_trait]
impl DealCatalog for CatalogClient {
    async fn fetch_deals(&self, tags: &str) -> Vec<Deal> {
        match self.try_fetch(tags).await {
            Ok(deals) => {
                tracing::debug!(tags, deal_count = deals.len(), "Fetched deals");
                deals
            }
            Err(e) => {
                tracing::warn!(tags, error = %e, "Deal catalog unavailable, returning no deals");
                Vec::new()
            }
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Prices arrive as strings (`"100"`), numbers, `null` or `""` for unset.
fn parse_price(value: Value) -> Result<Option<Decimal>, String> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => Decimal::from_str(s.trim())
            .map(Some)
            .map_err(|e| format!("invalid price {s:?}: {e}")),
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .map(Some)
            .map_err(|e| format!("invalid price {n}: {e}")),
        other => Err(format!("invalid price: {other}")),
    }
}

fn deserialize_optional_price<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    parse_price(value).map_err(de::Error::custom)
}

fn deserialize_required_price<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    parse_price(value)
        .map_err(de::Error::custom)?
        .ok_or_else(|| de::Error::custom("regular_price is required"))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::{extract::Query, http::StatusCode as HttpStatus, routing::get, Json, Router};
    use rust_decimal::prelude::FromPrimitive;
    use std::collections::HashMap;

    pub(crate) fn sample_deal(id: u64, regular: i64, sale: Option<i64>) -> Deal {
        Deal {
            id,
            name: format!("Deal {id}"),
            description: "Two nights for two".to_string(),
            regular_price: Decimal::from(regular),
            sale_price: sale.map(Decimal::from),
            images: vec![DealImage {
                src: format!("https://cdn.example.com/{id}.jpg"),
            }],
        }
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_effective_price() {
        let on_sale = sample_deal(1, 100, Some(80));
        assert_eq!(on_sale.effective_price(), Decimal::from(80));
        assert_eq!(on_sale.display_price("R"), "R80");

        let full_price = sample_deal(2, 100, None);
        assert_eq!(full_price.effective_price(), Decimal::from(100));
        assert_eq!(full_price.display_price("R"), "R100");
    }

    #[test]
    fn test_deal_url() {
        let deal = sample_deal(4821, 100, None);
        assert_eq!(
            deal.url("https://daddysdeals.co.za/"),
            "https://daddysdeals.co.za/product/?p=4821/"
        );
    }

    #[test]
    fn test_join_tags() {
        assert_eq!(join_tags(Some("Cape Town"), Some("electronics")), "Cape Town,electronics");
        assert_eq!(join_tags(Some("Durban"), None), "Durban");
        assert_eq!(join_tags(None, Some("spa")), "spa");
        assert_eq!(join_tags(None, None), "");
        assert_eq!(join_tags(Some("  "), Some("spa")), "spa");
    }

    #[test]
    fn test_parse_woocommerce_deal() {
        let json = r#"{
            "id": 77,
            "name": "Spa Day",
            "description": "<p>Full body massage</p>",
            "regular_price": "1200",
            "sale_price": "",
            "permalink": "https://example.com/spa",
            "images": [{"id": 5, "src": "https://cdn.example.com/spa.jpg"}]
        }"#;

        let deal: Deal = serde_json::from_str(json).unwrap();
        assert_eq!(deal.id, 77);
        assert_eq!(deal.regular_price, Decimal::from(1200));
        assert!(deal.sale_price.is_none());
        assert_eq!(deal.images[0].src, "https://cdn.example.com/spa.jpg");
    }

    #[test]
    fn test_parse_numeric_prices() {
        let json = r#"{"id": 1, "name": "x", "regular_price": 99.5, "sale_price": 49}"#;
        let deal: Deal = serde_json::from_str(json).unwrap();
        assert_eq!(deal.regular_price, Decimal::from_f64(99.5).unwrap());
        assert_eq!(deal.sale_price, Some(Decimal::from(49)));
    }

    #[test]
    fn test_missing_regular_price_rejected() {
        let json = r#"{"id": 1, "name": "x", "regular_price": ""}"#;
        assert!(serde_json::from_str::<Deal>(json).is_err());
    }

    #[tokio::test]
    async fn test_fetch_passes_tags() {
        let router = Router::new().route(
            "/deals/",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                let tags = params.get("tags").cloned().unwrap_or_default();
                Json(serde_json::json!([
                    {"id": 1, "name": tags, "regular_price": "100", "sale_price": "80"},
                    {"id": 2, "name": "broken"}
                ]))
            }),
        );
        let base = serve(router).await;

        let client = CatalogClient::new(base, Duration::from_secs(5)).unwrap();
        let deals = client.fetch_deals("Durban,spa").await;

        assert_eq!(deals.len(), 1);
        assert_eq!(deals[0].name, "Durban,spa");
        assert_eq!(deals[0].effective_price(), Decimal::from(80));
    }

    #[tokio::test]
    async fn test_server_error_yields_empty() {
        let router = Router::new().route("/deals/", get(|| async { HttpStatus::INTERNAL_SERVER_ERROR }));
        let base = serve(router).await;

        let client = CatalogClient::new(base, Duration::from_secs(5)).unwrap();
        assert!(client.fetch_deals("").await.is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_yields_empty() {
        // Bind then drop to get a port nothing listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = CatalogClient::new(format!("http://{}", addr), Duration::from_secs(2)).unwrap();
        assert!(client.fetch_deals("Durban").await.is_empty());
    }

    #[tokio::test]
    async fn test_slow_catalog_times_out_to_empty() {
        let router = Router::new().route(
            "/deals/",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                Json(serde_json::json!([{"id": 1, "name": "late", "regular_price": "10"}]))
            }),
        );
        let base = serve(router).await;

        let client = CatalogClient::new(base, Duration::from_secs(1)).unwrap();
        let started = std::time::Instant::now();
        let err = client.try_fetch("Durban").await.unwrap_err();
        assert!(matches!(err, CatalogError::RequestFailed(ref e) if e.is_timeout()));
        assert!(started.elapsed() < Duration::from_secs(3));

        assert!(client.fetch_deals("Durban").await.is_empty());
    }

    #[tokio::test]
    async fn test_non_list_body_yields_empty() {
        let router = Router::new().route(
            "/deals/",
            get(|| async { Json(serde_json::json!({"code": "rest_no_route"})) }),
        );
        let base = serve(router).await;

        let client = CatalogClient::new(base, Duration::from_secs(5)).unwrap();
        let err = client.try_fetch("").await.unwrap_err();
        assert!(matches!(err, CatalogError::InvalidResponse(_)));
        assert!(client.fetch_deals("").await.is_empty());
    }
}
