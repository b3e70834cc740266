//! Bounded per-symbol price history.

use std::collections::HashMap;

/// Ordered price samples, oldest evicted first once `capacity` is reached.
#[derive(Debug, Clone)]
pub struct PriceHistory {
    capacity: usize,
    samples: Vec<f64>,
}

impl PriceHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, price: f64) {
        self.samples.push(price);
        if self.samples.len() > self.capacity {
            let excess = self.samples.len() - self.capacity;
            self.samples.drain(..excess);
        }
    }

    /// Samples, most recent last.
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Histories for every tracked symbol, created on first observation.
#[derive(Debug, Clone)]
pub struct PriceHistories {
    capacity: usize,
    by_symbol: HashMap<String, PriceHistory>,
}

impl PriceHistories {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            by_symbol: HashMap::new(),
        }
    }

    /// Append `price` to `symbol`'s history and return the updated window.
    pub fn record(&mut self, symbol: &str, price: f64) -> &[f64] {
        let capacity = self.capacity;
        let history = self
            .by_symbol
            .entry(symbol.to_string())
            .or_insert_with(|| PriceHistory::new(capacity));
        history.push(price);
        history.samples()
    }

    pub fn get(&self, symbol: &str) -> &[f64] {
        self.by_symbol
            .get(symbol)
            .map(PriceHistory::samples)
            .unwrap_or(&[])
    }

    pub fn clear(&mut self) {
        self.by_symbol.clear();
    }
}
