//! The market-data cache: per-symbol last tick and a bounded, newest-first
//! bar history per bar type.

use std::collections::{HashMap, VecDeque};

use core_types::{Bar, BarType, Symbol, Tick};

use crate::error::EngineError;

pub struct MarketDataCache {
    ticks: HashMap<Symbol, Tick>,
    bars: HashMap<BarType, VecDeque<Bar>>,
    bar_capacity: usize,
}

impl MarketDataCache {
    pub fn new(bar_capacity: usize) -> Result<Self, EngineError> {
        if bar_capacity == 0 {
            return Err(EngineError::Precondition(
                "bar_capacity must be positive".to_string(),
            ));
        }
        Ok(Self {
            ticks: HashMap::new(),
            bars: HashMap::new(),
            bar_capacity,
        })
    }

    pub fn handle_tick(&mut self, tick: Tick) {
        self.ticks.insert(tick.symbol.clone(), tick);
    }

    pub fn handle_bar(&mut self, bar_type: BarType, bar: Bar) {
        let history = self
            .bars
            .entry(bar_type)
            .or_insert_with(|| VecDeque::with_capacity(self.bar_capacity));
        history.push_front(bar);
        history.truncate(self.bar_capacity);
    }

    pub fn last_tick(&self, symbol: &Symbol) -> Result<&Tick, EngineError> {
        self.ticks
            .get(symbol)
            .ok_or_else(|| EngineError::Lookup(format!("no tick cached for symbol {}", symbol)))
    }

    pub fn last_bar(&self, bar_type: &BarType) -> Result<&Bar, EngineError> {
        self.bar(bar_type, 0)
    }

    /// Reverse-indexed access: index 0 is the newest bar.
    pub fn bar(&self, bar_type: &BarType, index: usize) -> Result<&Bar, EngineError> {
        let history = self.history(bar_type)?;
        history.get(index).ok_or_else(|| {
            EngineError::Lookup(format!(
                "bar index {} out of range for {} (len {})",
                index,
                bar_type,
                history.len()
            ))
        })
    }

    /// A stable snapshot copy of the bar history, newest first.
    pub fn bars(&self, bar_type: &BarType) -> Result<Vec<Bar>, EngineError> {
        Ok(self.history(bar_type)?.iter().cloned().collect())
    }

    pub fn bar_count(&self, bar_type: &BarType) -> usize {
        self.bars.get(bar_type).map_or(0, |h| h.len())
    }

    pub fn bar_types(&self) -> Vec<BarType> {
        self.bars.keys().cloned().collect()
    }

    /// A per-symbol-code map of the latest bid and ask quotes, for exchange
    /// rate resolution.
    pub fn rate_snapshot(
        &self,
    ) -> (
        HashMap<String, rust_decimal::Decimal>,
        HashMap<String, rust_decimal::Decimal>,
    ) {
        let mut bids = HashMap::new();
        let mut asks = HashMap::new();
        for (symbol, tick) in &self.ticks {
            bids.insert(symbol.code.clone(), tick.bid);
            asks.insert(symbol.code.clone(), tick.ask);
        }
        (bids, asks)
    }

    pub fn reset(&mut self) {
        self.ticks.clear();
        self.bars.clear();
    }

    fn history(&self, bar_type: &BarType) -> Result<&VecDeque<Bar>, EngineError> {
        self.bars
            .get(bar_type)
            .ok_or_else(|| EngineError::Lookup(format!("no bars cached for {}", bar_type)))
    }
}
