use rust_decimal::{Decimal, RoundingStrategy};

/// Derive a base-asset quantity from a quote notional, rounding down.
///
/// The buyer quantity is floored so the buyer never receives more than paid for.
pub fn quote_to_base_floor(quote: Decimal, price: Decimal, quantity_scale: u32) -> Decimal {
    (quote / price).round_dp_with_strategy(quantity_scale, RoundingStrategy::ToNegativeInfinity)
}

/// Derive the quote cash required to buy a base quantity, rounding up.
pub fn base_to_quote_ceil(base: Decimal, price: Decimal, price_scale: u32) -> Decimal {
    (base * price).round_dp_with_strategy(price_scale, RoundingStrategy::ToPositiveInfinity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_buyer_quantity_floors() {
        struct TestCase {
            quote: Decimal,
            price: Decimal,
            scale: u32,
            expected: Decimal,
        }

        let tests = vec![
            TestCase {
                // TC0: exact division
                quote: dec!(100),
                price: dec!(20000),
                scale: 8,
                expected: dec!(0.005),
            },
            TestCase {
                // TC1: repeating decimal floors
                quote: dec!(100),
                price: dec!(30000),
                scale: 8,
                expected: dec!(0.00333333),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            assert_eq!(
                quote_to_base_floor(test.quote, test.price, test.scale),
                test.expected,
                "TC{index} failed"
            );
        }
    }

    #[test]
    fn test_required_cash_ceils() {
        // 0.00333333 * 30000 = 99.9999, ceils at scale 2 to 100.00
        assert_eq!(
            base_to_quote_ceil(dec!(0.00333333), dec!(30000), 2),
            dec!(100.00)
        );
        // Exact product does not move.
        assert_eq!(base_to_quote_ceil(dec!(0.005), dec!(20000), 2), dec!(100));
    }

    #[test]
    fn test_floor_then_ceil_never_exceeds_budget() {
        let budget = dec!(250);
        let price = dec!(333.33);
        let quantity = quote_to_base_floor(budget, price, 8);
        let cost = base_to_quote_ceil(quantity, price, 8);
        assert!(cost <= budget, "cost {cost} exceeded budget {budget}");
    }
}
