//! Momentum indicators over a rolling price window.
//!
//! The RSI here is the simplified variant the models were trained
//! against: plain sums of gains and losses over the last 14 samples,
//! averaged over the number of samples (not deltas), no smoothing.

use serde::Serialize;

/// Samples considered by the RSI.
pub const RSI_WINDOW: usize = 14;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Indicators {
    /// 0–100.
    pub rsi: f64,
    /// Fractional change between the last two samples.
    pub price_change: f64,
}

impl Default for Indicators {
    /// Neutral reading used when there is not enough history.
    fn default() -> Self {
        Self {
            rsi: 50.0,
            price_change: 0.0,
        }
    }
}

/// Compute indicators for `prices` (most recent last).
pub fn calculate_indicators(prices: &[f64]) -> Indicators {
    if prices.len() < 2 {
        return Indicators::default();
    }

    let window = &prices[prices.len().saturating_sub(RSI_WINDOW)..];
    let (gains, losses) = window
        .windows(2)
        .map(|w| w[1] - w[0])
        .fold((0.0, 0.0), |(g, l), change| {
            if change > 0.0 {
                (g + change, l)
            } else {
                (g, l - change)
            }
        });

    let n = window.len() as f64;
    let avg_gain = gains / n;
    let avg_loss = losses / n;
    let rs = if avg_loss == 0.0 { 100.0 } else { avg_gain / avg_loss };
    let rsi = 100.0 - 100.0 / (1.0 + rs);

    let current = window[window.len() - 1];
    let previous = window[window.len() - 2];
    let price_change = if previous == 0.0 {
        0.0
    } else {
        (current - previous) / previous
    };

    Indicators { rsi, price_change }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_short_history_is_neutral() {
        assert_eq!(calculate_indicators(&[]), Indicators { rsi: 50.0, price_change: 0.0 });
        assert_eq!(calculate_indicators(&[101.5]), Indicators { rsi: 50.0, price_change: 0.0 });
    }

    #[test]
    fn test_strictly_increasing_pushes_rsi_high() {
        let prices: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let ind = calculate_indicators(&prices);
        assert!(ind.price_change > 0.0);
        // No losses: rs pinned at 100.
        assert!((ind.rsi - (100.0 - 100.0 / 101.0)).abs() < 1e-9);
        assert!(ind.rsi > 99.0);
    }

    #[test]
    fn test_linear_decline_rsi_zero() {
        let prices: Vec<f64> = (0..15).map(|i| 100.0 - i as f64).collect();
        let ind = calculate_indicators(&prices);
        assert_eq!(ind.rsi, 0.0);
        assert!((ind.price_change - (-1.0 / 87.0)).abs() < 1e-12);
    }

    #[test]
    fn test_only_last_fourteen_samples_count() {
        // A huge early rally must not leak into the window.
        let mut prices = vec![10.0, 1000.0];
        prices.extend((0..14).map(|i| 100.0 - i as f64));
        let ind = calculate_indicators(&prices);
        assert_eq!(ind.rsi, 0.0);
    }

    #[test]
    fn test_mixed_moves() {
        // Deltas: +2, -1 → gains 2, losses 1 over 3 samples.
        let ind = calculate_indicators(&[100.0, 102.0, 101.0]);
        let rs = (2.0 / 3.0) / (1.0 / 3.0);
        assert!((ind.rsi - (100.0 - 100.0 / (1.0 + rs))).abs() < 1e-9);
        assert!((ind.price_change - (-1.0 / 102.0)).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn prop_rsi_within_bounds(prices in prop::collection::vec(0.0001f64..1.0e6, 0..60)) {
            let ind = calculate_indicators(&prices);
            prop_assert!(ind.rsi >= 0.0 && ind.rsi <= 100.0);
            prop_assert!(ind.price_change.is_finite());
        }
    }
}
