use rust_decimal::{Decimal, RoundingStrategy};
use tracing::warn;

use crate::types::PriceBreakdown;

/// Computes itemized prices. Pure and deterministic.
#[derive(Debug, Clone, Copy)]
pub struct PriceCalculator {
    currency_scale: u32,
}

impl Default for PriceCalculator {
    fn default() -> Self {
        Self { currency_scale: 2 }
    }
}

impl PriceCalculator {
    /// Prices a stay.
    ///
    /// `breakfast_rate` is `None` when the campground does not offer breakfast.
    /// The discount applies to the base amount only, and only the total is
    /// rounded (half-up to cents).
    pub fn price(
        &self,
        nightly_rate: Decimal,
        nights: u32,
        breakfast_selected: bool,
        breakfast_rate: Option<Decimal>,
        discount_percentage: Option<u8>,
    ) -> PriceBreakdown {
        let nights = Decimal::from(nights);

        let base_amount = nightly_rate * nights;
        let breakfast_amount = match (breakfast_selected, breakfast_rate) {
            (true, Some(rate)) => rate * nights,
            _ => Decimal::ZERO,
        };
        let discount_amount = discount_percentage
            .map(|pct| base_amount * Decimal::from(pct) / Decimal::ONE_HUNDRED)
            .unwrap_or(Decimal::ZERO);

        let mut total = base_amount + breakfast_amount - discount_amount;
        let mut total_clamped = false;
        if total < Decimal::ZERO {
            warn!(
                "Discount of {} exceeds base {} plus breakfast {}; clamping total to zero",
                discount_amount, base_amount, breakfast_amount
            );
            total = Decimal::ZERO;
            total_clamped = true;
        }

        PriceBreakdown {
            base_amount,
            breakfast_amount,
            discount_amount,
            total_amount: total
                .round_dp_with_strategy(self.currency_scale, RoundingStrategy::MidpointAwayFromZero),
            total_clamped,
        }
    }

    /// Base amount alone; the spend a promotion's minimum is checked against.
    pub fn base_amount(&self, nightly_rate: Decimal, nights: u32) -> Decimal {
        nightly_rate * Decimal::from(nights)
    }
}
