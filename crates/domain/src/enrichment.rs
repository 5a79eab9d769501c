//! Best-effort order enrichment from external data sources.
//!
//! Every sub-fetch failure becomes a warning on the result. Only caller
//! cancellation surfaces as an `Err`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, or_cancelled};
use crate::order::{Money, Order, ProductId};
use crate::providers::{ExternalDataService, ProductRecord, ProviderError};

/// Outcome of enriching one order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentResult {
    pub is_successful: bool,
    /// A copy of the input order with contact and product details filled in.
    pub enriched_order: Order,
    #[serde(default)]
    pub enrichment_data: BTreeMap<String, Value>,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub enriched_at: DateTime<Utc>,
}

impl EnrichmentResult {
    fn started(order: &Order) -> Self {
        Self {
            is_successful: true,
            enriched_order: order.clone(),
            enrichment_data: BTreeMap::new(),
            warnings: Vec::new(),
            enriched_at: Utc::now(),
        }
    }

    fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.enrichment_data.insert(key.into(), value.into());
    }

    fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }
}

fn product_key(product_id: &ProductId, field: &str) -> String {
    format!("Product_{product_id}_{field}")
}

/// Augments validated orders with customer, product and delivery data.
pub struct OrderEnricher {
    external: Arc<dyn ExternalDataService>,
}

impl OrderEnricher {
    pub fn new(external: Arc<dyn ExternalDataService>) -> Self {
        Self { external }
    }

    /// Enriches a clone of `order`; the input is never touched.
    #[tracing::instrument(skip(self, order, cancel), fields(order_id = %order.id()))]
    pub async fn enrich(
        &self,
        order: &Order,
        cancel: &CancellationToken,
    ) -> Result<EnrichmentResult> {
        let started = Instant::now();
        let mut result = EnrichmentResult::started(order);

        self.enrich_customer(&mut result, cancel).await?;
        self.enrich_products(&mut result, cancel).await?;
        self.enrich_delivery(&mut result, cancel).await?;

        if let Err(reason) = calculate_totals(&mut result) {
            tracing::error!(%reason, "enrichment failed");
            result.is_successful = false;
            result.warn(format!("Enrichment failed: {reason}"));
        }

        let elapsed = started.elapsed();
        result.insert("EnrichmentDuration", elapsed.as_secs_f64() * 1000.0);
        let fields = enriched_fields(&result);
        result.insert("EnrichedFields", fields);

        let successful = if result.is_successful { "true" } else { "false" };
        metrics::counter!("orders_enriched_total", "successful" => successful).increment(1);
        metrics::histogram!("order_enrichment_duration_seconds").record(elapsed.as_secs_f64());
        tracing::info!(
            successful = result.is_successful,
            warning_count = result.warnings.len(),
            "enrichment completed"
        );

        Ok(result)
    }

    async fn enrich_customer(
        &self,
        result: &mut EnrichmentResult,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let customer_id = result.enriched_order.customer_id().clone();
        let fetched = or_cancelled(
            cancel,
            "enrichment",
            self.external.get_customer_data(&customer_id),
        )
        .await?;

        match fetched {
            Ok(Some(customer)) => {
                result.enriched_order.set_customer_contact(
                    non_empty(customer.email.clone()),
                    non_empty(customer.phone.clone()),
                );
                result.insert("CustomerName", customer.name);
                result.insert("CustomerTier", customer.customer_tier);
                result.insert("CreditLimit", customer.credit_limit.as_decimal());
                result.insert("CurrentBalance", customer.current_balance.as_decimal());
                result.insert("PreferredDeliveryMethod", customer.preferred_delivery_method);
                result.insert("PreferredProducts", json!(customer.preferred_products));

                let order_total = result.enriched_order.total_amount();
                let exposure = customer.current_balance + order_total;
                if exposure.cents() > customer.credit_limit.cents() {
                    result.warn(format!(
                        "Order total {} would exceed customer credit limit",
                        order_total.to_grouped_string()
                    ));
                }
                tracing::debug!(%customer_id, "customer data enriched");
            }
            Ok(None) => {
                result.warn(format!("Customer data not found for customer {customer_id}"));
            }
            Err(err) => {
                tracing::warn!(%customer_id, error = %err, "customer enrichment failed");
                result.warn(format!("Customer data enrichment failed: {err}"));
            }
        }

        Ok(())
    }

    async fn enrich_products(
        &self,
        result: &mut EnrichmentResult,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let product_ids: Vec<ProductId> = result
            .enriched_order
            .items()
            .iter()
            .map(|item| item.product_id.clone())
            .collect();

        let external = &self.external;
        let fetches = product_ids.iter().map(|id| async move {
            let fetched = external.get_product_data(id).await;
            (id, fetched)
        });
        let fetched: Vec<(&ProductId, std::result::Result<Option<ProductRecord>, ProviderError>)> =
            or_cancelled(cancel, "enrichment", join_all(fetches)).await?;

        let days_until_delivery = result
            .enriched_order
            .delivery_date()
            .map(|date| (date - Utc::now()).num_days());

        for (product_id, outcome) in fetched {
            match outcome {
                Ok(Some(product)) => {
                    result.enriched_order.annotate_item(
                        product_id,
                        product.name.clone(),
                        non_empty(product.category.clone()),
                    );
                    result.insert(product_key(product_id, "Description"), product.description);
                    result.insert(product_key(product_id, "Weight"), product.weight);
                    result.insert(product_key(product_id, "WeightUnit"), product.weight_unit);
                    result.insert(product_key(product_id, "Supplier"), product.supplier);
                    result.insert(
                        product_key(product_id, "LeadTimeDays"),
                        product.lead_time_days,
                    );

                    if let Some(days) = days_until_delivery
                        && days < product.lead_time_days
                    {
                        result.warn(format!(
                            "Product {} requires {} days lead time, but delivery is requested in {days} days",
                            product.name, product.lead_time_days
                        ));
                    }
                    tracing::debug!(%product_id, "product data enriched");
                }
                Ok(None) => {
                    result.warn(format!("Product data not found for product {product_id}"));
                }
                Err(err) => {
                    tracing::warn!(%product_id, error = %err, "product enrichment failed");
                    result.warn(format!(
                        "Product data enrichment failed for {product_id}: {err}"
                    ));
                }
            }
        }

        Ok(())
    }

    async fn enrich_delivery(
        &self,
        result: &mut EnrichmentResult,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let (Some(address), Some(date)) = (
            result
                .enriched_order
                .delivery_address()
                .filter(|a| !a.trim().is_empty())
                .map(str::to_string),
            result.enriched_order.delivery_date(),
        ) else {
            return Ok(());
        };

        let fetched = or_cancelled(
            cancel,
            "enrichment",
            self.external.get_delivery_data(&address, date),
        )
        .await?;

        match fetched {
            Ok(Some(quote)) => {
                result.insert("DeliveryMethod", quote.delivery_method);
                result.insert("EstimatedDeliveryCost", quote.estimated_cost.as_decimal());
                result.insert("EstimatedDeliveryDays", quote.estimated_days);
                result.insert("CarrierName", quote.carrier_name);
                result.insert("IsExpressAvailable", quote.is_express_available);
                result.insert("ExpressCost", quote.express_cost.as_decimal());

                let valid = or_cancelled(
                    cancel,
                    "enrichment",
                    self.external.validate_address(&address),
                )
                .await?;
                if !matches!(valid, Ok(true)) {
                    result.warn("Delivery address could not be validated");
                }
            }
            Ok(None) => result.warn("Delivery data could not be retrieved"),
            Err(err) => {
                tracing::warn!(error = %err, "delivery enrichment failed");
                result.warn(format!("Delivery data enrichment failed: {err}"));
            }
        }

        Ok(())
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

fn calculate_totals(result: &mut EnrichmentResult) -> std::result::Result<(), String> {
    let order = &result.enriched_order;

    let subtotal = order
        .items()
        .iter()
        .try_fold(Money::zero(), |acc, item| {
            acc.checked_add(item.unit_price.checked_multiply(item.quantity)?)
        })
        .ok_or_else(|| "order total exceeds the representable range".to_string())?;

    let total_weight: f64 = order
        .items()
        .iter()
        .filter_map(|item| {
            result
                .enrichment_data
                .get(&product_key(&item.product_id, "Weight"))
                .and_then(Value::as_f64)
                .map(|weight| weight * f64::from(item.quantity))
        })
        .sum();

    let mut categories: Vec<Option<&str>> = Vec::new();
    for item in order.items() {
        let category = item.category.as_deref();
        if !categories.contains(&category) {
            categories.push(category);
        }
    }

    let item_count = order.item_count();
    let average_price = if item_count > 0 {
        order
            .items()
            .iter()
            .map(|item| item.unit_price.as_decimal())
            .sum::<f64>()
            / item_count as f64
    } else {
        0.0
    };
    let category_count = categories.len();

    let estimated_total = result
        .enrichment_data
        .get("EstimatedDeliveryCost")
        .and_then(Value::as_f64)
        .map(|cost| (subtotal + Money::from_decimal(cost)).as_decimal());

    result.insert("Subtotal", subtotal.as_decimal());
    result.insert("TotalWeight", total_weight);
    result.insert("CategoryCount", category_count);
    result.insert("ItemCount", item_count);
    result.insert("AverageItemPrice", average_price);
    if let Some(total) = estimated_total {
        result.insert("EstimatedTotal", total);
    }

    Ok(())
}

fn enriched_fields(result: &EnrichmentResult) -> Vec<String> {
    let order = &result.enriched_order;
    let mut fields = Vec::new();

    if order.customer_email().is_some_and(|e| !e.is_empty()) {
        fields.push("CustomerEmail".to_string());
    }
    if order.customer_phone().is_some_and(|p| !p.is_empty()) {
        fields.push("CustomerPhone".to_string());
    }
    for item in order.items() {
        if !item.product_name.is_empty() {
            fields.push(product_key(&item.product_id, "Name"));
        }
        if item.category.as_deref().is_some_and(|c| !c.is_empty()) {
            fields.push(product_key(&item.product_id, "Category"));
        }
    }
    if result.enrichment_data.contains_key("DeliveryMethod") {
        fields.push("DeliveryData".to_string());
    }

    fields
}
