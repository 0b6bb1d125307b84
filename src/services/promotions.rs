use crate::{
    errors::ServiceError,
    models::{normalize_code, DiscountType, Order, PromoCode},
    store::{Collection, Store},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use utoipa::ToSchema;

/// Largest share of an order a promo code may take off.
const MAX_DISCOUNT_SHARE: Decimal = dec!(0.99);

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidatePromoRequest {
    #[serde(default)]
    pub code: String,
    #[schema(value_type = f64)]
    pub order_total: Option<Decimal>,
}

/// Public view of a promo code returned with a successful validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PromoSummary {
    pub code: String,
    #[schema(value_type = String)]
    pub discount_type: DiscountType,
    #[schema(value_type = f64)]
    pub discount_value: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PromoValidation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promo_code: Option<PromoSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<f64>)]
    pub discount_amount: Option<Decimal>,
}

impl PromoValidation {
    fn rejected(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: Some(message.into()),
            promo_code: None,
            discount_amount: None,
        }
    }
}

/// Cap on any discount: `floor(total * 0.99)`.
pub fn max_discount(order_total: Decimal) -> Decimal {
    (order_total * MAX_DISCOUNT_SHARE).floor().max(Decimal::ZERO)
}

/// Applies the rules of a promo code to an order total. Usage is passed in
/// because it is derived from the orders collection.
pub fn evaluate(
    promo: &PromoCode,
    order_total: Decimal,
    times_used: usize,
    now: DateTime<Utc>,
) -> PromoValidation {
    if order_total <= Decimal::ZERO {
        return PromoValidation::rejected("Order total must be positive");
    }
    if !promo.is_active {
        return PromoValidation::rejected("Promo code is not active");
    }
    if !promo.is_within_window(now) {
        return PromoValidation::rejected("Promo code is expired or not yet valid");
    }
    if let Some(max_uses) = promo.max_uses {
        if times_used >= max_uses as usize {
            return PromoValidation::rejected("Promo code usage limit reached");
        }
    }
    if let Some(min) = promo.min_order_amount {
        if order_total < min {
            return PromoValidation::rejected(format!("Minimum order amount is {min}"));
        }
    }

    let raw = match promo.discount_type {
        DiscountType::Percentage => {
            if promo.discount_value <= Decimal::ZERO || promo.discount_value >= dec!(100) {
                return PromoValidation::rejected("Promo code is malformed");
            }
            order_total * promo.discount_value / dec!(100)
        }
        DiscountType::Fixed => {
            if promo.discount_value <= Decimal::ZERO || promo.discount_value >= order_total {
                return PromoValidation::rejected("Discount exceeds order total");
            }
            promo.discount_value
        }
    };

    let discount = raw.floor().min(max_discount(order_total));
    PromoValidation {
        valid: true,
        message: None,
        promo_code: Some(PromoSummary {
            code: promo.code.clone(),
            discount_type: promo.discount_type,
            discount_value: promo.discount_value,
            description: promo.description.clone(),
        }),
        discount_amount: Some(discount),
    }
}

/// Read-only promo code validation.
#[derive(Clone)]
pub struct PromoService {
    store: Store,
}

impl PromoService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Number of orders that used `code`, compared case-insensitively.
    pub async fn usage_count(&self, code: &str) -> Result<usize, ServiceError> {
        let orders = self.store.scan::<Order>(Collection::Orders).await?;
        Ok(orders
            .iter()
            .filter_map(|order| order.promo_code.as_deref())
            .filter(|used| used.trim().eq_ignore_ascii_case(code))
            .count())
    }

    /// Evaluates `code` against `order_total`. Never mutates state.
    #[instrument(skip(self))]
    pub async fn validate(
        &self,
        code: &str,
        order_total: Option<Decimal>,
    ) -> Result<PromoValidation, ServiceError> {
        let code = normalize_code(code);
        if code.is_empty() {
            return Err(ServiceError::ValidationError("Promo code is required".into()));
        }
        let order_total = order_total
            .filter(|total| *total > Decimal::ZERO)
            .ok_or_else(|| {
                ServiceError::ValidationError("orderTotal must be a positive amount".into())
            })?;

        let Some(promo) = self
            .store
            .get::<PromoCode>(Collection::PromoCodes, &code)
            .await?
        else {
            debug!(code = %code, "Promo code not found");
            return Ok(PromoValidation::rejected("Promo code not found"));
        };

        // scanning orders is only needed for capped codes
        let times_used = match promo.max_uses {
            Some(_) => self.usage_count(&code).await?,
            None => 0,
        };

        let result = evaluate(&promo, order_total, times_used, Utc::now());
        debug!(code = %code, valid = result.valid, "Promo code evaluated");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    fn promo(discount_type: DiscountType, value: Decimal) -> PromoCode {
        PromoCode {
            code: "SAVE10".into(),
            discount_type,
            discount_value: value,
            start_date: None,
            end_date: None,
            max_uses: None,
            min_order_amount: None,
            is_active: true,
            description: None,
        }
    }

    #[test]
    fn rules_are_checked_in_order() {
        let now = Utc::now();
        let mut p = promo(DiscountType::Percentage, dec!(10));
        p.is_active = false;
        p.end_date = Some(now - Duration::days(1));
        assert_eq!(
            evaluate(&p, dec!(1000), 0, now).message.as_deref(),
            Some("Promo code is not active")
        );

        p.is_active = true;
        assert_eq!(
            evaluate(&p, dec!(1000), 0, now).message.as_deref(),
            Some("Promo code is expired or not yet valid")
        );

        p.end_date = None;
        p.max_uses = Some(2);
        assert!(!evaluate(&p, dec!(1000), 2, now).valid);
        assert!(evaluate(&p, dec!(1000), 1, now).valid);
    }

    #[test]
    fn percentage_discount_is_floored() {
        let result = evaluate(
            &promo(DiscountType::Percentage, dec!(15)),
            dec!(999),
            0,
            Utc::now(),
        );
        assert_eq!(result.discount_amount, Some(dec!(149)));
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let now = Utc::now();
        assert_eq!(
            evaluate(&promo(DiscountType::Percentage, dec!(100)), dec!(1000), 0, now)
                .message
                .as_deref(),
            Some("Promo code is malformed")
        );
        assert!(!evaluate(&promo(DiscountType::Percentage, dec!(0)), dec!(1000), 0, now).valid);
        assert!(!evaluate(&promo(DiscountType::Fixed, dec!(1000)), dec!(1000), 0, now).valid);
        assert!(evaluate(&promo(DiscountType::Fixed, dec!(999)), dec!(1000), 0, now).valid);
    }

    #[tokio::test]
    async fn unknown_code_is_reported_not_raised() {
        let service = PromoService::new(Store::in_memory());
        let result = service.validate("nope", Some(dec!(1000))).await.unwrap();
        assert!(!result.valid);
        assert_eq!(result.message.as_deref(), Some("Promo code not found"));
    }

    #[tokio::test]
    async fn missing_or_non_positive_total_is_a_validation_error() {
        let store = Store::in_memory();
        let p = promo(DiscountType::Percentage, dec!(10));
        store.put(Collection::PromoCodes, &p.code, &p).await.unwrap();
        let service = PromoService::new(store);

        for total in [None, Some(Decimal::ZERO), Some(dec!(-1000))] {
            assert!(matches!(
                service.validate("SAVE10", total).await,
                Err(ServiceError::ValidationError(_))
            ));
        }
    }

    #[test]
    fn negative_totals_never_yield_a_discount() {
        let result = evaluate(
            &promo(DiscountType::Percentage, dec!(10)),
            dec!(-1000),
            0,
            Utc::now(),
        );
        assert!(!result.valid);
        assert_eq!(result.discount_amount, None);
    }

    proptest! {
        #[test]
        fn discount_never_exceeds_cap(
            total_cents in -100_000_000i64..100_000_000,
            value_hundredths in 1i64..100_000_000,
            percentage in any::<bool>(),
        ) {
            let total = Decimal::new(total_cents, 2);
            let kind = if percentage { DiscountType::Percentage } else { DiscountType::Fixed };
            let p = promo(kind, Decimal::new(value_hundredths, 2));
            let result = evaluate(&p, total, 0, Utc::now());
            if let Some(discount) = result.discount_amount {
                prop_assert!(discount <= (total * dec!(0.99)).floor());
                prop_assert!(discount >= Decimal::ZERO);
                prop_assert_eq!(discount, discount.floor());
            }
        }
    }
}
