//! In-process reference data, seeded from JSON.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::order::{CustomerId, Money, ProductId};
use crate::providers::{
    CustomerDirectory, CustomerRecord, DeliveryQuote, ExternalDataService, ProductCatalog,
    ProductRecord, ProviderError,
};

/// Shape of the customer/product part of a seed file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSeed {
    #[serde(default)]
    pub customers: Vec<CustomerRecord>,
    #[serde(default)]
    pub products: Vec<ProductRecord>,
    #[serde(default)]
    pub delivery: Option<DeliveryQuote>,
}

/// Substrings that mark an address as undeliverable.
const INVALID_ADDRESS_PATTERNS: [&str; 4] = ["invalid", "bad", "error", "fail"];

/// Minimum length of an address that can be validated.
const MIN_ADDRESS_LEN: usize = 10;

/// Reference data served from memory.
///
/// Answers all three provider ports, so a single instance backs both the
/// validation and the enrichment engine when no external services are wired.
#[derive(Debug, Clone)]
pub struct StaticCatalog {
    customers: HashMap<CustomerId, CustomerRecord>,
    products: HashMap<ProductId, ProductRecord>,
    delivery: DeliveryQuote,
}

impl Default for StaticCatalog {
    fn default() -> Self {
        Self {
            customers: HashMap::new(),
            products: HashMap::new(),
            delivery: Self::standard_delivery(),
        }
    }
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: CatalogSeed) -> Self {
        let mut catalog = Self::new();
        for customer in seed.customers {
            catalog = catalog.with_customer(customer);
        }
        for product in seed.products {
            catalog = catalog.with_product(product);
        }
        if let Some(delivery) = seed.delivery {
            catalog.delivery = delivery;
        }
        catalog
    }

    pub fn with_customer(mut self, customer: CustomerRecord) -> Self {
        self.customers.insert(customer.id.clone(), customer);
        self
    }

    pub fn with_product(mut self, product: ProductRecord) -> Self {
        self.products.insert(product.id.clone(), product);
        self
    }

    pub fn with_delivery(mut self, delivery: DeliveryQuote) -> Self {
        self.delivery = delivery;
        self
    }

    pub fn customer_count(&self) -> usize {
        self.customers.len()
    }

    pub fn product_count(&self) -> usize {
        self.products.len()
    }

    fn standard_delivery() -> DeliveryQuote {
        DeliveryQuote {
            delivery_method: "Standard".to_string(),
            estimated_cost: Money::from_cents(999),
            estimated_days: 3,
            carrier_name: "Local Courier".to_string(),
            is_express_available: false,
            express_cost: Money::zero(),
        }
    }
}

#[async_trait]
impl CustomerDirectory for StaticCatalog {
    async fn find_customer(&self, id: &CustomerId) -> Result<Option<CustomerRecord>, ProviderError> {
        Ok(self.customers.get(id).cloned())
    }
}

#[async_trait]
impl ProductCatalog for StaticCatalog {
    async fn find_product(&self, id: &ProductId) -> Result<Option<ProductRecord>, ProviderError> {
        Ok(self.products.get(id).cloned())
    }
}

#[async_trait]
impl ExternalDataService for StaticCatalog {
    async fn get_customer_data(
        &self,
        id: &CustomerId,
    ) -> Result<Option<CustomerRecord>, ProviderError> {
        Ok(self.customers.get(id).cloned())
    }

    async fn get_product_data(
        &self,
        id: &ProductId,
    ) -> Result<Option<ProductRecord>, ProviderError> {
        Ok(self.products.get(id).cloned())
    }

    async fn get_delivery_data(
        &self,
        _address: &str,
        _delivery_date: DateTime<Utc>,
    ) -> Result<Option<DeliveryQuote>, ProviderError> {
        Ok(Some(self.delivery.clone()))
    }

    async fn validate_address(&self, address: &str) -> Result<bool, ProviderError> {
        let address = address.trim();
        if address.len() < MIN_ADDRESS_LEN {
            return Ok(false);
        }
        let lowered = address.to_lowercase();
        Ok(!INVALID_ADDRESS_PATTERNS
            .iter()
            .any(|pattern| lowered.contains(pattern)))
    }
}
