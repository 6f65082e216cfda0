//! Pricing policy
//!
//! Pure, stateless tables for loan-to-value ceilings and administrative fees.
//! All amounts are whole rupiah.

/// LTV ceilings by minimum karat, highest purity first.
const LTV_TIERS: [(u32, u32); 4] = [(24, 85), (22, 80), (18, 75), (16, 70)];
const LTV_FLOOR_PERCENT: u32 = 65;

/// Admin fee tiers keyed by inclusive upper loan bound.
const ADMIN_FEE_TIERS: [(u64, u64); 4] = [
    (1_000_000, 5_500),
    (5_000_000, 11_000),
    (10_000_000, 16_500),
    (50_000_000, 22_000),
];
const ADMIN_FEE_TOP: u64 = 33_000;

pub struct PricingPolicy;

impl PricingPolicy {
    /// Maximum loan-to-value percentage for a purity.
    pub fn max_ltv_percent(karat: u32) -> u32 {
        LTV_TIERS
            .iter()
            .find(|(min_karat, _)| karat >= *min_karat)
            .map(|(_, ltv)| *ltv)
            .unwrap_or(LTV_FLOOR_PERCENT)
    }

    pub fn admin_fee(loan_amount: u64) -> u64 {
        ADMIN_FEE_TIERS
            .iter()
            .find(|(upper, _)| loan_amount <= *upper)
            .map(|(_, fee)| *fee)
            .unwrap_or(ADMIN_FEE_TOP)
    }

    /// Weight times price, rounded to the nearest rupiah.
    pub fn gold_value(weight_grams: f64, price_per_gram: u64) -> u64 {
        let value = (weight_grams * price_per_gram as f64).round();
        if value.is_finite() && value > 0.0 {
            value as u64
        } else {
            0
        }
    }

    /// Floor of `gold_value * ltv / 100`.
    pub fn max_loan(gold_value: u64, ltv_percent: u32) -> u64 {
        let scaled = u128::from(gold_value) * u128::from(ltv_percent.min(100)) / 100;
        scaled as u64
    }

    /// Disbursement after fee; never below zero.
    pub fn net_loan(max_loan: u64, admin_fee: u64) -> u64 {
        max_loan.saturating_sub(admin_fee)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ltv_table() {
        assert_eq!(PricingPolicy::max_ltv_percent(24), 85);
        assert_eq!(PricingPolicy::max_ltv_percent(22), 80);
        assert_eq!(PricingPolicy::max_ltv_percent(18), 75);
        assert_eq!(PricingPolicy::max_ltv_percent(16), 70);
        assert_eq!(PricingPolicy::max_ltv_percent(14), 65);

        // thresholds, not exact matches
        assert_eq!(PricingPolicy::max_ltv_percent(23), 80);
        assert_eq!(PricingPolicy::max_ltv_percent(17), 70);
        assert_eq!(PricingPolicy::max_ltv_percent(30), 85);
        assert_eq!(PricingPolicy::max_ltv_percent(0), 65);
    }

    #[test]
    fn test_admin_fee_boundaries_are_inclusive_upper() {
        assert_eq!(PricingPolicy::admin_fee(0), 5_500);
        assert_eq!(PricingPolicy::admin_fee(1_000_000), 5_500);
        assert_eq!(PricingPolicy::admin_fee(1_000_001), 11_000);
        assert_eq!(PricingPolicy::admin_fee(5_000_000), 11_000);
        assert_eq!(PricingPolicy::admin_fee(5_000_001), 16_500);
        assert_eq!(PricingPolicy::admin_fee(10_000_000), 16_500);
        assert_eq!(PricingPolicy::admin_fee(10_000_001), 22_000);
        assert_eq!(PricingPolicy::admin_fee(50_000_000), 22_000);
        assert_eq!(PricingPolicy::admin_fee(50_000_001), 33_000);
    }

    #[test]
    fn test_admin_fee_monotonic() {
        let mut previous = 0;
        for amount in (0..=60_000_000u64).step_by(250_000) {
            let fee = PricingPolicy::admin_fee(amount);
            assert!(fee >= previous, "fee dropped at {}", amount);
            previous = fee;
        }
    }

    #[test]
    fn test_loan_arithmetic() {
        let value = PricingPolicy::gold_value(12.5, 1_250_000);
        assert_eq!(value, 15_625_000);
        assert_eq!(PricingPolicy::max_loan(value, 80), 12_500_000);
        assert_eq!(PricingPolicy::max_loan(999, 85), 849);
        assert_eq!(PricingPolicy::net_loan(12_500_000, 16_500), 12_483_500);
        assert_eq!(PricingPolicy::net_loan(3_000, 5_500), 0);
    }

    #[test]
    fn test_gold_value_rejects_non_finite() {
        assert_eq!(PricingPolicy::gold_value(f64::NAN, 1_000_000), 0);
        assert_eq!(PricingPolicy::gold_value(-1.0, 1_000_000), 0);
    }
}
