use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

// ============================================================================
// Pricing Calculator
// ============================================================================
//
// Turns (unit price, quantity) lines into order totals.
// Decimal arithmetic only: every stored amount is rounded to cents,
// half-up, and the total is built from the rounded parts so that
// total = subtotal + tax + shipping - discount holds exactly.
//
// ============================================================================

const CURRENCY_DP: u32 = 2;

/// Tax and shipping policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Fraction applied to the subtotal (0.08 = 8%)
    pub tax_rate: Decimal,
    /// Subtotals at or above this ship for free
    pub free_shipping_threshold: Decimal,
    /// Shipping charged below the threshold
    pub flat_shipping_fee: Decimal,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            tax_rate: Decimal::new(8, 2),
            free_shipping_threshold: Decimal::new(50, 0),
            flat_shipping_fee: Decimal::new(999, 2),
        }
    }
}

/// One line to price. The unit price is whatever the caller settled on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceLine {
    pub unit_price: Decimal,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub shipping_amount: Decimal,
    pub discount_amount: Decimal,
    pub total_amount: Decimal,
}

impl OrderTotals {
    /// True when the stored total still equals its parts
    pub fn is_balanced(&self) -> bool {
        self.total_amount
            == self.subtotal + self.tax_amount + self.shipping_amount - self.discount_amount
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PricedOrder {
    /// Line totals, same order as the input
    pub line_totals: Vec<Decimal>,
    pub totals: OrderTotals,
}

#[derive(Debug, Clone, Default)]
pub struct PricingCalculator {
    config: PricingConfig,
}

impl PricingCalculator {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    pub fn line_total(line: &PriceLine) -> Decimal {
        round_currency(line.unit_price * Decimal::from(line.quantity))
    }

    pub fn price<'a, I>(&self, lines: I) -> PricedOrder
    where
        I: IntoIterator<Item = &'a PriceLine>,
    {
        let line_totals: Vec<Decimal> = lines.into_iter().map(Self::line_total).collect();
        let subtotal: Decimal = line_totals.iter().copied().sum();

        let tax_amount = round_currency(subtotal * self.config.tax_rate);
        let shipping_amount = if subtotal >= self.config.free_shipping_threshold {
            Decimal::ZERO
        } else {
            round_currency(self.config.flat_shipping_fee)
        };
        // Coupons are not applied by this service.
        let discount_amount = Decimal::ZERO;
        let total_amount = round_currency(subtotal + tax_amount + shipping_amount - discount_amount);

        PricedOrder {
            line_totals,
            totals: OrderTotals {
                subtotal,
                tax_rate: self.config.tax_rate,
                tax_amount,
                shipping_amount,
                discount_amount,
                total_amount,
            },
        }
    }
}

/// Two decimal places, midpoints rounded up (away from zero)
pub fn round_currency(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(CURRENCY_DP, RoundingStrategy::MidpointAwayFromZero)
}
