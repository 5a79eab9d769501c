//! Read-only data-provider ports consulted by validation and enrichment.
//!
//! Each port returns `Ok(None)` for an unknown record and `Err` only when the
//! provider itself could not answer; the engines turn both into structured
//! validation errors or enrichment warnings.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::order::{CustomerId, Money, ProductId};

/// Failure talking to a data provider.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The provider could not be reached or refused the request.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// The provider did not answer in time.
    #[error("provider timed out after {0} ms")]
    Timeout(u64),

    /// The provider answered with something we could not interpret.
    #[error("malformed provider response: {0}")]
    Malformed(String),
}

/// Customer master record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerRecord {
    pub id: CustomerId,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub preferred_delivery_method: String,
    #[serde(default)]
    pub credit_limit: Money,
    #[serde(default)]
    pub current_balance: Money,
    #[serde(default)]
    pub customer_tier: String,
    #[serde(default)]
    pub preferred_products: Vec<ProductId>,
}

/// Catalog product record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    pub unit_price: Money,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub weight: f64,
    #[serde(default)]
    pub weight_unit: String,
    #[serde(default)]
    pub supplier: String,
    #[serde(default)]
    pub lead_time_days: i64,
}

/// Carrier quote for delivering to an address on a date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryQuote {
    pub delivery_method: String,
    pub estimated_cost: Money,
    pub estimated_days: u32,
    pub carrier_name: String,
    pub is_express_available: bool,
    pub express_cost: Money,
}

fn default_true() -> bool {
    true
}

/// Customer lookups used by validation.
#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    async fn find_customer(&self, id: &CustomerId) -> Result<Option<CustomerRecord>, ProviderError>;
}

/// Product lookups used by validation.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn find_product(&self, id: &ProductId) -> Result<Option<ProductRecord>, ProviderError>;
}

/// External enrichment sources.
///
/// The three data sources are independent; enrichment calls them concurrently
/// and tolerates each failing on its own.
#[async_trait]
pub trait ExternalDataService: Send + Sync {
    async fn get_customer_data(
        &self,
        id: &CustomerId,
    ) -> Result<Option<CustomerRecord>, ProviderError>;

    async fn get_product_data(&self, id: &ProductId)
    -> Result<Option<ProductRecord>, ProviderError>;

    async fn get_delivery_data(
        &self,
        address: &str,
        delivery_date: DateTime<Utc>,
    ) -> Result<Option<DeliveryQuote>, ProviderError>;

    async fn validate_address(&self, address: &str) -> Result<bool, ProviderError>;
}
