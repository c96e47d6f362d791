use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{ApiSettings, Credentials};
use crate::error::SyncError;
use crate::models::{Locale, RawListing};
use crate::upstream::traits::ListingSource;
use crate::upstream::types::ListingsQuery;

const LISTINGS_PATH: &str = "/v2/listings";
const COMPANY_HEADER: &str = "x-company-id";

/// Upstream error bodies are cut to this many characters in error messages
const MAX_ERROR_BODY: usize = 300;

/// HTTP client for the listings provider
pub struct ApiClient {
    client: Client,
    settings: ApiSettings,
}

impl ApiClient {
    /// Create a client. Missing credentials are not an error yet; every
    /// request checks them before going out.
    pub fn new(settings: ApiSettings) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .user_agent(&settings.user_agent)
            .build()
            .map_err(|e| SyncError::config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, settings })
    }

    /// Fetch listings for several locales in one request
    pub async fn fetch_listings_for(&self, locales: &[Locale]) -> Result<Vec<RawListing>, SyncError> {
        let credentials = self.settings.credentials().map_err(|e| {
            warn!("Refusing to call listings API: {}", e);
            e
        })?;
        let headers = build_headers(&credentials, &self.settings.api_key_prefix)?;
        let url = listings_url(credentials.base_url);
        let query = ListingsQuery::new(locales);

        debug!("Fetching URL: {} {:?}", url, query.to_pairs());

        let response = self
            .client
            .get(&url)
            .headers(headers)
            .query(&query.to_pairs())
            .send()
            .await
            .map_err(|e| {
                warn!("Listings request failed: {}", e);
                SyncError::from(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown API error".to_string());
            warn!("Listings API returned status: {}", status);
            let message: String = body.chars().take(MAX_ERROR_BODY).collect();
            return Err(SyncError::transport(Some(status.as_u16()), message));
        }

        let body: Value = response.json().await.map_err(|e| {
            warn!("Listings API sent an unreadable body: {}", e);
            SyncError::transport(Some(status.as_u16()), format!("unreadable body: {e}"))
        })?;

        let listings = parse_listings_body(body)?;
        info!("Fetched {} raw listings for {:?}", listings.len(), locales);
        Ok(listings)
    }
}

#[async_trait]
impl ListingSource for ApiClient {
    async fn fetch_listings(&self, locale: Locale) -> Result<Vec<RawListing>, SyncError> {
        self.fetch_listings_for(&[locale]).await
    }

    fn source_name(&self) -> &'static str {
        "listings-api"
    }
}

/// `{base}/v2/listings`, tolerating a trailing slash on the base
pub fn listings_url(base_url: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), LISTINGS_PATH)
}

/// Headers every listings request carries
pub fn build_headers(credentials: &Credentials<'_>, key_prefix: &str) -> Result<HeaderMap, SyncError> {
    let value = |raw: String, name: &str| {
        HeaderValue::from_str(&raw)
            .map_err(|_| SyncError::config(format!("{name} contains characters not allowed in a header")))
    };

    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(
        HeaderName::from_static(COMPANY_HEADER),
        value(credentials.company_id.to_string(), "company id")?,
    );
    let mut authorization = value(format!("{key_prefix}{}", credentials.api_key), "api key")?;
    authorization.set_sensitive(true);
    headers.insert(AUTHORIZATION, authorization);
    Ok(headers)
}

/// Accepts either a bare JSON array or a `{ "data": [...] }` envelope.
/// Array items that are not objects are skipped.
pub fn parse_listings_body(body: Value) -> Result<Vec<RawListing>, SyncError> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(mut envelope) => match envelope.remove("data") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(SyncError::transport(
                    None,
                    "response object has no `data` array",
                ))
            }
        },
        other => {
            return Err(SyncError::transport(
                None,
                format!("unexpected response type: {}", json_type(&other)),
            ))
        }
    };

    let total = items.len();
    let listings: Vec<RawListing> = items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect();

    if listings.len() < total {
        warn!(
            target: "data_quality",
            "Skipped {} non-object entries in listings response",
            total - listings.len()
        );
    }
    Ok(listings)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
