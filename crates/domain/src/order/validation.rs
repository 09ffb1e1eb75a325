//! Business rules an order must satisfy before inventory is reserved.

use serde::{Deserialize, Serialize};

use super::model::Order;

/// One business rule. Rules are checked in [`ValidationRule::ORDERED`] order
/// and the first failure wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationRule {
    HasItems,
    CustomerEmail,
    ShippingAddress,
    SubtotalMatchesItems,
    PositiveQuantities,
    PositiveTotal,
    TotalMatchesComponents,
}

impl ValidationRule {
    pub const ORDERED: [ValidationRule; 7] = [
        ValidationRule::HasItems,
        ValidationRule::CustomerEmail,
        ValidationRule::ShippingAddress,
        ValidationRule::SubtotalMatchesItems,
        ValidationRule::PositiveQuantities,
        ValidationRule::PositiveTotal,
        ValidationRule::TotalMatchesComponents,
    ];

    /// Returns true if the order satisfies the rule.
    pub fn check(&self, order: &Order) -> bool {
        match self {
            ValidationRule::HasItems => !order.items.is_empty(),
            ValidationRule::CustomerEmail => order.customer_email.contains('@'),
            ValidationRule::ShippingAddress => order
                .shipping_address
                .as_ref()
                .is_some_and(|address| address.has_street()),
            ValidationRule::SubtotalMatchesItems => order
                .items_total()
                .is_ok_and(|total| total == order.subtotal),
            ValidationRule::PositiveQuantities => order.items.iter().all(|item| item.quantity > 0),
            ValidationRule::PositiveTotal => order.total_amount.is_positive(),
            ValidationRule::TotalMatchesComponents => order
                .expected_total()
                .is_ok_and(|total| total == order.total_amount),
        }
    }

    /// Customer-facing reason reported when the rule fails.
    pub fn reason(&self) -> &'static str {
        match self {
            ValidationRule::HasItems => "Order must contain at least one item",
            ValidationRule::CustomerEmail => "Invalid customer email address",
            ValidationRule::ShippingAddress => "Shipping address is required",
            ValidationRule::SubtotalMatchesItems => "Subtotal mismatch",
            ValidationRule::PositiveQuantities => "Invalid item quantity",
            ValidationRule::PositiveTotal => "Total amount must be positive",
            ValidationRule::TotalMatchesComponents => "Total amount mismatch",
        }
    }
}

/// The first rule an order failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationFailure {
    pub rule: ValidationRule,
}

impl ValidationFailure {
    pub fn reason(&self) -> &'static str {
        self.rule.reason()
    }
}

impl std::fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.reason())
    }
}

/// Applies every rule in order, stopping at the first failure.
pub fn validate(order: &Order) -> Result<(), ValidationFailure> {
    match ValidationRule::ORDERED
        .iter()
        .find(|rule| !rule.check(order))
    {
        Some(rule) => Err(ValidationFailure { rule: *rule }),
        None => Ok(()),
    }
}
