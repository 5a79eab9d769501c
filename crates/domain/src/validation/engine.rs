use std::sync::Arc;
use std::time::Instant;

use chrono::{Datelike, NaiveDate, Utc, Weekday};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use super::{ValidationError, ValidationResult, codes};
use crate::error::{Result, or_cancelled};
use crate::order::{Money, Order};
use crate::providers::{CustomerDirectory, ProductCatalog};

const VALIDATED_BY: &str = "OrderValidator";

/// Limits applied by the business-rule pass.
#[derive(Debug, Clone)]
pub struct ValidationSettings {
    pub max_order_value: Money,
    pub max_items_per_order: usize,
    /// Allowed deviation from the catalog price, in percent.
    pub price_tolerance_percent: i64,
    pub min_business_days: u32,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            max_order_value: Money::from_dollars(100_000),
            max_items_per_order: 100,
            price_tolerance_percent: 5,
            min_business_days: 1,
        }
    }
}

/// Counts weekdays in `[start, end)`; zero when `end` precedes `start`.
pub fn business_days_between(start: NaiveDate, end: NaiveDate) -> u32 {
    if end < start {
        return 0;
    }
    start
        .iter_days()
        .take_while(|day| *day < end)
        .filter(|day| !matches!(day.weekday(), Weekday::Sat | Weekday::Sun))
        .count() as u32
}

/// Checks an order against customer, catalog and business rules.
///
/// Rules run in a fixed order: structure, customer, items, business limits.
/// Every failing rule is reported; nothing short-circuits except an item with
/// no product id, which skips that item's remaining checks.
pub struct OrderValidator {
    customers: Arc<dyn CustomerDirectory>,
    products: Arc<dyn ProductCatalog>,
    settings: ValidationSettings,
}

impl OrderValidator {
    pub fn new(customers: Arc<dyn CustomerDirectory>, products: Arc<dyn ProductCatalog>) -> Self {
        Self::with_settings(customers, products, ValidationSettings::default())
    }

    pub fn with_settings(
        customers: Arc<dyn CustomerDirectory>,
        products: Arc<dyn ProductCatalog>,
        settings: ValidationSettings,
    ) -> Self {
        Self {
            customers,
            products,
            settings,
        }
    }

    pub fn settings(&self) -> &ValidationSettings {
        &self.settings
    }

    /// Validates `order` without mutating it.
    ///
    /// Returns `Err` only if `cancel` fires while a lookup is outstanding.
    #[tracing::instrument(
        skip(self, order, cancel),
        fields(order_id = %order.id(), customer_id = %order.customer_id())
    )]
    pub async fn validate(
        &self,
        order: &Order,
        cancel: &CancellationToken,
    ) -> Result<ValidationResult> {
        let started = Instant::now();
        let today = Utc::now().date_naive();
        let mut result = ValidationResult::started(VALIDATED_BY);

        self.check_structure(order, today, &mut result);
        self.check_customer(order, cancel, &mut result).await?;
        self.check_items(order, cancel, &mut result).await?;

        let Some(total) = checked_total(order) else {
            tracing::error!("order total overflowed during validation");
            metrics::counter!("orders_validated_total", "valid" => "false").increment(1);
            return Ok(ValidationResult::exception(
                VALIDATED_BY,
                "order total exceeds the representable range",
            ));
        };
        self.check_business_rules(order, total, today, &mut result);

        let elapsed = started.elapsed();
        result.validation_data = [
            ("TotalItemCount".to_string(), json!(order.item_count())),
            ("TotalValue".to_string(), json!(total.as_decimal())),
            ("Categories".to_string(), distinct_categories(order)),
            (
                "ValidationDuration".to_string(),
                json!(elapsed.as_secs_f64() * 1000.0),
            ),
        ]
        .into_iter()
        .collect();
        result.is_valid = result.errors.is_empty();

        let valid = if result.is_valid { "true" } else { "false" };
        metrics::counter!("orders_validated_total", "valid" => valid).increment(1);
        metrics::histogram!("order_validation_duration_seconds").record(elapsed.as_secs_f64());
        tracing::info!(
            is_valid = result.is_valid,
            error_count = result.errors.len(),
            "validation completed"
        );

        Ok(result)
    }

    fn check_structure(&self, order: &Order, today: NaiveDate, result: &mut ValidationResult) {
        if order.id().is_empty() {
            result.push(ValidationError::new(
                "Id",
                codes::REQUIRED,
                "Order ID is required",
            ));
        }

        if order.customer_id().is_empty() {
            result.push(ValidationError::new(
                "CustomerId",
                codes::REQUIRED,
                "Customer ID is required",
            ));
        }

        if !order.has_items() {
            result.push(ValidationError::new(
                "Items",
                codes::REQUIRED,
                "Order must contain at least one item",
            ));
        }

        if let Some(delivery) = order.delivery_date()
            && delivery.date_naive() < today
        {
            result.push(
                ValidationError::new(
                    "DeliveryDate",
                    codes::INVALID_DATE,
                    "Delivery date cannot be in the past",
                )
                .with_attempted_value(delivery.to_rfc3339()),
            );
        }
    }

    async fn check_customer(
        &self,
        order: &Order,
        cancel: &CancellationToken,
        result: &mut ValidationResult,
    ) -> Result<()> {
        let customer_id = order.customer_id();
        if customer_id.is_empty() {
            return Ok(());
        }

        let lookup = or_cancelled(
            cancel,
            "validation",
            self.customers.find_customer(customer_id),
        )
        .await?;

        match lookup {
            Ok(None) => result.push(
                ValidationError::new(
                    "CustomerId",
                    codes::CUSTOMER_NOT_FOUND,
                    format!("Customer {customer_id} not found"),
                )
                .with_attempted_value(customer_id.as_str()),
            ),
            Ok(Some(customer)) if !customer.is_active => result.push(
                ValidationError::new(
                    "CustomerId",
                    codes::CUSTOMER_INACTIVE,
                    format!("Customer {customer_id} is not active"),
                )
                .with_attempted_value(customer_id.as_str()),
            ),
            Ok(Some(_)) => {}
            Err(err) => {
                tracing::warn!(%customer_id, error = %err, "customer lookup failed");
                result.push(
                    ValidationError::new(
                        "CustomerId",
                        codes::CUSTOMER_VALIDATION_ERROR,
                        "Unable to validate customer",
                    )
                    .with_context("Error", err.to_string()),
                );
            }
        }

        Ok(())
    }

    async fn check_items(
        &self,
        order: &Order,
        cancel: &CancellationToken,
        result: &mut ValidationResult,
    ) -> Result<()> {
        for (index, item) in order.items().iter().enumerate() {
            let prefix = format!("Items[{index}]");

            if item.product_id.is_empty() {
                result.push(ValidationError::new(
                    format!("{prefix}.ProductId"),
                    codes::REQUIRED,
                    "Product ID is required for all items",
                ));
                continue;
            }

            if item.quantity == 0 {
                result.push(
                    ValidationError::new(
                        format!("{prefix}.Quantity"),
                        codes::INVALID_QUANTITY,
                        "Quantity must be greater than zero",
                    )
                    .with_attempted_value(item.quantity),
                );
            }

            if !item.unit_price.is_positive() {
                result.push(
                    ValidationError::new(
                        format!("{prefix}.UnitPrice"),
                        codes::INVALID_PRICE,
                        "Unit price must be greater than zero",
                    )
                    .with_attempted_value(item.unit_price.as_decimal()),
                );
            }

            let lookup = or_cancelled(
                cancel,
                "validation",
                self.products.find_product(&item.product_id),
            )
            .await?;

            let product_id = &item.product_id;
            match lookup {
                Ok(None) => result.push(
                    ValidationError::new(
                        format!("{prefix}.ProductId"),
                        codes::PRODUCT_NOT_FOUND,
                        format!("Product {product_id} not found"),
                    )
                    .with_attempted_value(product_id.as_str()),
                ),
                Ok(Some(product)) if !product.is_active => result.push(
                    ValidationError::new(
                        format!("{prefix}.ProductId"),
                        codes::PRODUCT_INACTIVE,
                        format!("Product {product_id} is not active"),
                    )
                    .with_attempted_value(product_id.as_str()),
                ),
                Ok(Some(product)) => {
                    let catalog = i128::from(product.unit_price.cents());
                    let difference = (i128::from(item.unit_price.cents()) - catalog).abs();
                    let percent = i128::from(self.settings.price_tolerance_percent);
                    if difference * 100 > catalog * percent {
                        let tolerance = product.unit_price.as_decimal()
                            * self.settings.price_tolerance_percent as f64
                            / 100.0;
                        result.push(
                            ValidationError::new(
                                format!("{prefix}.UnitPrice"),
                                codes::PRICE_MISMATCH,
                                format!(
                                    "Unit price for product {product_id} does not match catalog price"
                                ),
                            )
                            .with_attempted_value(item.unit_price.as_decimal())
                            .with_context("CatalogPrice", product.unit_price.as_decimal())
                            .with_context("Tolerance", tolerance),
                        );
                    }
                }
                Err(err) => {
                    tracing::warn!(%product_id, error = %err, "product lookup failed");
                    result.push(
                        ValidationError::new(
                            format!("{prefix}.ProductId"),
                            codes::PRODUCT_VALIDATION_ERROR,
                            "Unable to validate product",
                        )
                        .with_context("Error", err.to_string()),
                    );
                }
            }
        }

        Ok(())
    }

    fn check_business_rules(
        &self,
        order: &Order,
        total: Money,
        today: NaiveDate,
        result: &mut ValidationResult,
    ) {
        let max_value = self.settings.max_order_value;
        if total.cents() > max_value.cents() {
            result.push(
                ValidationError::new(
                    "TotalAmount",
                    codes::ORDER_VALUE_EXCEEDED,
                    format!(
                        "Order total {} exceeds maximum allowed value of {}",
                        total.to_grouped_string(),
                        max_value.to_grouped_string()
                    ),
                )
                .with_attempted_value(total.as_decimal())
                .with_context("MaxOrderValue", max_value.as_decimal()),
            );
        }

        let max_items = self.settings.max_items_per_order;
        if order.item_count() > max_items {
            result.push(
                ValidationError::new(
                    "Items",
                    codes::TOO_MANY_ITEMS,
                    format!(
                        "Order contains {} items, maximum allowed is {max_items}",
                        order.item_count()
                    ),
                )
                .with_attempted_value(order.item_count())
                .with_context("MaxItems", max_items),
            );
        }

        if let Some(delivery) = order.delivery_date() {
            let min_days = self.settings.min_business_days;
            let business_days = business_days_between(today, delivery.date_naive());
            if business_days < min_days {
                result.push(
                    ValidationError::new(
                        "DeliveryDate",
                        codes::INSUFFICIENT_LEAD_TIME,
                        format!(
                            "Delivery date requires at least {min_days} business day(s) notice"
                        ),
                    )
                    .with_attempted_value(delivery.to_rfc3339())
                    .with_context("MinBusinessDays", min_days)
                    .with_context("BusinessDaysFromNow", business_days),
                );
            }
        }
    }
}

fn checked_total(order: &Order) -> Option<Money> {
    order.items().iter().try_fold(Money::zero(), |acc, item| {
        acc.checked_add(item.unit_price.checked_multiply(item.quantity)?)
    })
}

fn distinct_categories(order: &Order) -> Value {
    let mut seen: Vec<Option<&str>> = Vec::new();
    for item in order.items() {
        let category = item.category.as_deref();
        if !seen.contains(&category) {
            seen.push(category);
        }
    }
    json!(seen)
}
