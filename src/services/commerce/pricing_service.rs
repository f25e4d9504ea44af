//! Checkout price math: line subtotals, coupon discounts and the conversion
//! to gateway minor units.

use crate::errors::ServiceError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a coupon reduces the order total
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountKind {
    Percentage,
    Fixed,
}

impl DiscountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountKind::Percentage => "percentage",
            DiscountKind::Fixed => "fixed",
        }
    }
}

impl fmt::Display for DiscountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiscountKind {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "percentage" => Ok(DiscountKind::Percentage),
            "fixed" => Ok(DiscountKind::Fixed),
            other => Err(ServiceError::ValidationError(format!(
                "Unknown discount type '{}'",
                other
            ))),
        }
    }
}

/// Discount granted by a redeemed coupon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponTerms {
    pub kind: DiscountKind,
    pub value: Decimal,
}

impl CouponTerms {
    pub fn new(kind: DiscountKind, value: Decimal) -> Self {
        Self { kind, value }
    }

    /// Rejects terms an administrator should not be able to create.
    pub fn validate(&self) -> Result<(), ServiceError> {
        match self.kind {
            DiscountKind::Percentage
                if self.value <= Decimal::ZERO || self.value > Decimal::ONE_HUNDRED =>
            {
                Err(ServiceError::ValidationError(
                    "Percentage discount must be greater than 0 and at most 100".into(),
                ))
            }
            DiscountKind::Fixed if self.value <= Decimal::ZERO => Err(
                ServiceError::ValidationError("Fixed discount must be greater than 0".into()),
            ),
            _ => Ok(()),
        }
    }

    /// Total after this discount, never below zero.
    pub fn apply(&self, total: Decimal) -> Decimal {
        let discounted = match self.kind {
            DiscountKind::Percentage => {
                total * (Decimal::ONE - self.value / Decimal::ONE_HUNDRED)
            }
            DiscountKind::Fixed => total - self.value,
        };
        discounted.max(Decimal::ZERO)
    }
}

/// A cart line priced from the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub product_id: String,
    pub name: String,
    pub image_url: Option<String>,
    pub quantity: i32,
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
}

impl PricedLine {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    #[serde(with = "rust_decimal::serde::float")]
    pub subtotal: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub discount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
    /// `total` in minor currency units, as sent to the gateway
    pub amount_minor: i64,
    pub currency: String,
}

/// `sum(quantity * unit_price)` over the lines.
pub fn subtotal(lines: &[PricedLine]) -> Decimal {
    lines.iter().map(PricedLine::line_total).sum()
}

pub fn apply_discount(total: Decimal, coupon: Option<&CouponTerms>) -> Decimal {
    match coupon {
        Some(terms) => terms.apply(total),
        None => total.max(Decimal::ZERO),
    }
}

/// Converts a major-unit amount to minor units, rounding half away from zero.
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| ServiceError::ValidationError("Amount out of range".into()))
}

/// Prices a cart; fails when the cart is empty or the discounted total is not positive.
pub fn compute_totals(
    lines: &[PricedLine],
    coupon: Option<&CouponTerms>,
    currency: &str,
) -> Result<OrderTotals, ServiceError> {
    if lines.is_empty() {
        return Err(ServiceError::ValidationError("Cart is empty".into()));
    }
    if lines.iter().any(|l| l.quantity <= 0) {
        return Err(ServiceError::ValidationError(
            "Cart quantities must be positive".into(),
        ));
    }

    let subtotal = subtotal(lines);
    let total = apply_discount(subtotal, coupon);
    let amount_minor = to_minor_units(total)?;
    // A total that rounds to zero minor units cannot be charged either.
    if total <= Decimal::ZERO || amount_minor <= 0 {
        return Err(ServiceError::ValidationError(
            "Total price must be greater than zero".into(),
        ));
    }

    Ok(OrderTotals {
        subtotal,
        discount: subtotal - total,
        total,
        amount_minor,
        currency: currency.to_string(),
    })
}
