//! Ingress arithmetic for order totals.

use serde::{Deserialize, Serialize};

use super::value_objects::{Money, OrderItem};
use crate::DomainError;

/// Defaults applied when an incoming order omits tax or shipping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPolicy {
    /// Tax as a percentage of the subtotal.
    pub tax_rate_percent: i64,
    pub default_shipping: Money,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            tax_rate_percent: 20,
            default_shipping: Money::from_dollars(10),
        }
    }
}

/// Amounts the producer may set explicitly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PriceOverrides {
    pub tax_amount: Option<Money>,
    pub shipping_cost: Option<Money>,
    pub discount_amount: Option<Money>,
}

/// Monetary fields of an order, consistent by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Totals {
    pub subtotal: Money,
    pub tax_amount: Money,
    pub shipping_cost: Money,
    pub discount_amount: Money,
    pub total_amount: Money,
}

impl PricingPolicy {
    /// Computes every order amount from the item totals.
    ///
    /// `total = subtotal + tax + shipping - discount`. Fails if any step
    /// overflows.
    pub fn totals(&self, items: &[OrderItem], overrides: PriceOverrides) -> Result<Totals, DomainError> {
        let subtotal = Money::checked_sum(items.iter().map(|item| item.total_price))?;
        let tax_amount = match overrides.tax_amount {
            Some(tax) => tax,
            None => subtotal.checked_percent(self.tax_rate_percent)?,
        };
        let shipping_cost = overrides.shipping_cost.unwrap_or(self.default_shipping);
        let discount_amount = overrides.discount_amount.unwrap_or_default();
        let total_amount = subtotal
            .checked_add(tax_amount)?
            .checked_add(shipping_cost)?
            .checked_sub(discount_amount)?;

        Ok(Totals {
            subtotal,
            tax_amount,
            shipping_cost,
            discount_amount,
            total_amount,
        })
    }

    /// Like [`PricingPolicy::totals`], with every step saturating.
    pub(crate) fn saturating_totals(&self, items: &[OrderItem], overrides: PriceOverrides) -> Totals {
        let subtotal: Money = items.iter().map(|item| item.total_price).sum();
        let tax_amount = overrides
            .tax_amount
            .unwrap_or_else(|| subtotal.percent(self.tax_rate_percent));
        let shipping_cost = overrides.shipping_cost.unwrap_or(self.default_shipping);
        let discount_amount = overrides.discount_amount.unwrap_or_default();

        Totals {
            subtotal,
            tax_amount,
            shipping_cost,
            discount_amount,
            total_amount: subtotal + tax_amount + shipping_cost - discount_amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items() -> Vec<OrderItem> {
        vec![
            OrderItem::new("A", "Widget", 2, Money::from_dollars(100)),
            OrderItem::new("B", "Gadget", 1, Money::from_cents(2550)),
        ]
    }

    #[test]
    fn defaults_apply_twenty_percent_tax_and_flat_shipping() {
        let totals = PricingPolicy::default().totals(&items(), PriceOverrides::default())
            .unwrap();

        assert_eq!(totals.subtotal, Money::from_cents(22_550));
        assert_eq!(totals.tax_amount, Money::from_cents(4_510));
        assert_eq!(totals.shipping_cost, Money::from_dollars(10));
        assert_eq!(totals.discount_amount, Money::zero());
        assert_eq!(totals.total_amount, Money::from_cents(28_060));
    }

    #[test]
    fn explicit_amounts_override_defaults() {
        let items = vec![OrderItem::new("A", "Widget", 2, Money::from_dollars(100))];
        let totals = PricingPolicy::default().totals(
            &items,
            PriceOverrides {
                tax_amount: Some(Money::from_dollars(40)),
                shipping_cost: Some(Money::from_dollars(10)),
                discount_amount: Some(Money::from_dollars(5)),
            },
        )
        .unwrap();

        assert_eq!(totals.subtotal, Money::from_dollars(200));
        assert_eq!(totals.total_amount, Money::from_dollars(245));
    }

    #[test]
    fn empty_order_costs_shipping_only() {
        let totals = PricingPolicy::default().totals(&[], PriceOverrides::default()).unwrap();
        assert_eq!(totals.subtotal, Money::zero());
        assert_eq!(totals.total_amount, Money::from_dollars(10));
    }

    #[test]
    fn overflowing_tax_is_rejected() {
        let items = vec![OrderItem::new("A", "Widget", 1, Money::from_cents(i64::MAX / 10))];
        let err = PricingPolicy::default()
            .totals(&items, PriceOverrides::default())
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidAmount(_)));
    }
}
