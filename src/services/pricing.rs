use rust_decimal::{Decimal, RoundingStrategy};

use crate::entities::product;

/// Computes the authoritative unit price for a product at this instant.
///
/// Percentage discount takes precedence when both discount fields are set
/// (policy choice pending product-owner confirmation; keep the precedence
/// decision in this one place). The result is floored at zero and rounded to
/// two decimal places, half-up.
pub fn resolve_unit_price(product: &product::Model) -> Decimal {
    let discounted = if product.discount_percentage > Decimal::ZERO {
        product.price * (Decimal::ONE_HUNDRED - product.discount_percentage)
            / Decimal::ONE_HUNDRED
    } else if product.discount_amount > Decimal::ZERO {
        product.price - product.discount_amount
    } else {
        product.price
    };

    discounted
        .max(Decimal::ZERO)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
