//! Equal-weight capital allocation across the asset universe.

use chrono::{DateTime, Timelike, Utc};
use common::{find_position, Broker, Error, PortfolioConfig, Position, Side};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetAllocation {
    pub symbol: String,
    pub target_capital: f64,
    pub current_capital: f64,
    /// Positive means under-allocated.
    pub difference: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RebalanceOrder {
    pub symbol: String,
    pub side: Side,
    pub qty: f64,
    pub price: f64,
    pub order_id: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RebalanceReport {
    pub buying_power: f64,
    pub target_per_asset: f64,
    pub allocations: Vec<AssetAllocation>,
    pub orders: Vec<RebalanceOrder>,
    /// Symbols that needed an order but had no price.
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PortfolioRebalancer {
    assets: Vec<String>,
    deploy_fraction: f64,
    drift_threshold: f64,
    every_hours: u32,
}

impl PortfolioRebalancer {
    pub fn new(assets: Vec<String>, config: &PortfolioConfig) -> Self {
        Self {
            assets,
            deploy_fraction: config.deploy_fraction,
            drift_threshold: config.drift_threshold,
            every_hours: config.rebalance_every_hours.max(1),
        }
    }

    pub fn target_per_asset(&self, buying_power: f64) -> f64 {
        if self.assets.is_empty() {
            return 0.0;
        }
        buying_power * self.deploy_fraction / self.assets.len() as f64
    }

    /// One allocation per universe symbol, in universe order.
    pub fn compute_allocation(&self, buying_power: f64, positions: &[Position]) -> Vec<AssetAllocation> {
        let target = self.target_per_asset(buying_power);
        self.assets
            .iter()
            .map(|symbol| {
                let current = find_position(positions, symbol)
                    .and_then(|p| p.market_value)
                    .unwrap_or(0.0);
                AssetAllocation {
                    symbol: symbol.clone(),
                    target_capital: target,
                    current_capital: current,
                    difference: target - current,
                }
            })
            .collect()
    }

    pub fn needs_rebalance(&self, alloc: &AssetAllocation) -> bool {
        alloc.difference.abs() > alloc.target_capital * self.drift_threshold
    }

    /// Side and quantity that close the drift at `price`, if any is needed.
    pub fn order_for(&self, alloc: &AssetAllocation, price: f64) -> Option<(Side, f64)> {
        if !self.needs_rebalance(alloc) || price <= 0.0 {
            return None;
        }
        let side = if alloc.difference > 0.0 { Side::Buy } else { Side::Sell };
        Some((side, alloc.difference.abs() / price))
    }

    /// Rebalancing runs on hours that are a multiple of the cadence.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now.hour() % self.every_hours == 0
    }

    /// Read the account, compute allocations and place the corrective
    /// orders. Order failures are recorded in the report per symbol.
    pub async fn rebalance(&self, broker: &dyn Broker) -> Result<RebalanceReport, Error> {
        let account = broker
            .get_account()
            .await
            .map_err(|e| Error::AccountQuery(e.to_string()))?;
        let positions = broker
            .get_positions()
            .await
            .map_err(|e| Error::AccountQuery(e.to_string()))?;

        let allocations = self.compute_allocation(account.buying_power, &positions);
        let mut orders = Vec::new();
        let mut skipped = Vec::new();

        for alloc in &allocations {
            if !self.needs_rebalance(alloc) {
                continue;
            }

            let price = match broker.get_price(&alloc.symbol).await {
                Ok(Some(p)) if p > 0.0 => p,
                Ok(_) => {
                    warn!("Rebalance: no price for {}, skipping", alloc.symbol);
                    skipped.push(alloc.symbol.clone());
                    continue;
                }
                Err(e) => {
                    warn!("Rebalance: price lookup for {} failed: {}", alloc.symbol, e);
                    skipped.push(alloc.symbol.clone());
                    continue;
                }
            };

            let Some((side, qty)) = self.order_for(alloc, price) else {
                continue;
            };

            info!(
                "⚖️ Rebalance {} {} {:.8} @ ${:.2} (target ${:.2}, current ${:.2})",
                side.as_str(),
                alloc.symbol,
                qty,
                price,
                alloc.target_capital,
                alloc.current_capital
            );

            let (order_id, error) = match broker.place_order(&alloc.symbol, qty, side).await {
                Ok(order) => (Some(order.id), None),
                Err(e) => {
                    warn!("Rebalance order for {} failed: {}", alloc.symbol, e);
                    (None, Some(e.to_string()))
                }
            };
            orders.push(RebalanceOrder {
                symbol: alloc.symbol.clone(),
                side,
                qty,
                price,
                order_id,
                error,
            });
        }

        Ok(RebalanceReport {
            buying_power: account.buying_power,
            target_per_asset: self.target_per_asset(account.buying_power),
            allocations,
            orders,
            skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeBroker;
    use chrono::TimeZone;

    fn universe() -> Vec<String> {
        ["BTC/USD", "ETH/USD", "LTC/USD", "BCH/USD", "DOGE/USD"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn rebalancer() -> PortfolioRebalancer {
        PortfolioRebalancer::new(universe(), &PortfolioConfig::default())
    }

    #[test]
    fn test_allocation_and_drift_band() {
        let r = rebalancer();
        let positions = vec![Position {
            symbol: "ETHUSD".into(),
            qty: 0.05,
            avg_entry_price: 3000.0,
            market_value: Some(150.0),
        }];
        let allocs = r.compute_allocation(1000.0, &positions);

        assert_eq!(allocs.len(), 5);
        assert_eq!(allocs[0].symbol, "BTC/USD");
        assert!((allocs[0].target_capital - 160.0).abs() < 1e-9);
        assert!((allocs[0].difference - 160.0).abs() < 1e-9);
        assert!(r.needs_rebalance(&allocs[0]));

        // |160 - 150| = 10 is inside the 16 deadband.
        assert!((allocs[1].current_capital - 150.0).abs() < 1e-9);
        assert!(!r.needs_rebalance(&allocs[1]));
        assert!(r.order_for(&allocs[1], 3000.0).is_none());
    }

    #[test]
    fn test_order_for_direction() {
        let r = rebalancer();
        let (side, qty) = r
            .order_for(
                &AssetAllocation {
                    symbol: "BTC/USD".into(),
                    target_capital: 160.0,
                    current_capital: 0.0,
                    difference: 160.0,
                },
                80.0,
            )
            .unwrap();
        assert_eq!(side, Side::Buy);
        assert!((qty - 2.0).abs() < 1e-12);

        let (side, qty) = r
            .order_for(
                &AssetAllocation {
                    symbol: "BTC/USD".into(),
                    target_capital: 160.0,
                    current_capital: 200.0,
                    difference: -40.0,
                },
                20.0,
            )
            .unwrap();
        assert_eq!(side, Side::Sell);
        assert!((qty - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_is_due_every_sixth_hour() {
        let r = rebalancer();
        let at = |h| Utc.with_ymd_and_hms(2025, 3, 1, h, 15, 0).unwrap();
        assert!(r.is_due(at(0)));
        assert!(r.is_due(at(6)));
        assert!(r.is_due(at(18)));
        assert!(!r.is_due(at(7)));
    }

    #[tokio::test]
    async fn test_rebalance_places_orders_and_skips_unpriced() {
        let broker = FakeBroker::new(1000.0)
            .with_price("BTC/USD", 80.0)
            .with_price("ETH/USD", 3000.0)
            .with_price("LTC/USD", 40.0)
            .with_position("ETH/USD", 0.05, 3000.0, 150.0);
        broker.fail_order("LTC/USD");
        // BCH/USD has no price; DOGE/USD lookup errors.
        broker.fail_price("DOGE/USD");

        let report = rebalancer().rebalance(&broker).await.unwrap();

        assert_eq!(report.allocations.len(), 5);
        assert_eq!(report.skipped, vec!["BCH/USD".to_string(), "DOGE/USD".to_string()]);
        assert_eq!(report.orders.len(), 2);
        assert_eq!(report.orders[0].symbol, "BTC/USD");
        assert!(report.orders[0].order_id.is_some());
        assert_eq!(report.orders[1].symbol, "LTC/USD");
        assert!(report.orders[1].error.is_some());

        let placed = broker.orders();
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].0, "BTC/USD");
        assert!((placed[0].1 - 2.0).abs() < 1e-12);
        assert_eq!(placed[0].2, Side::Buy);
    }

    #[tokio::test]
    async fn test_rebalance_account_failure_is_fatal() {
        let broker = FakeBroker::new(1000.0);
        broker.fail_account(true);
        let err = rebalancer().rebalance(&broker).await.unwrap_err();
        assert!(matches!(err, Error::AccountQuery(_)));
    }
}
