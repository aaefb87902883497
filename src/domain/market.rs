use serde::{Deserialize, Serialize};

use crate::error::{Result, ScalpError};

/// OHLCV window for one symbol, oldest bar first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketData {
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
}

/// A single bar, used to build windows
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Bar that opened, closed and traded at `price`
    pub fn flat(price: f64, volume: f64) -> Self {
        Self {
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
        }
    }
}

impl MarketData {
    pub fn from_candles(candles: &[Candle]) -> Self {
        let mut data = MarketData::default();
        for c in candles {
            data.push(*c);
        }
        data
    }

    /// Window built from closes only; open = previous close, high/low = max/min of the two
    pub fn from_closes(closes: &[f64]) -> Self {
        let candles: Vec<Candle> = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                let open = if i == 0 { close } else { closes[i - 1] };
                Candle {
                    open,
                    high: open.max(close),
                    low: open.min(close),
                    close,
                    volume: 1000.0,
                }
            })
            .collect();
        Self::from_candles(&candles)
    }

    pub fn push(&mut self, candle: Candle) {
        self.open.push(candle.open);
        self.high.push(candle.high);
        self.low.push(candle.low);
        self.close.push(candle.close);
        self.volume.push(candle.volume);
    }

    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }

    pub fn latest_close(&self) -> Option<f64> {
        self.close.last().copied()
    }

    pub fn latest_volume(&self) -> Option<f64> {
        self.volume.last().copied()
    }

    /// Reject ragged, empty or non-positive windows before any indicator runs
    pub fn validate(&self) -> Result<()> {
        let n = self.close.len();
        if n == 0 {
            return Err(ScalpError::InvalidMarketData("empty window".to_string()));
        }
        if self.open.len() != n || self.high.len() != n || self.low.len() != n || self.volume.len() != n
        {
            return Err(ScalpError::InvalidMarketData(format!(
                "ragged window: open={} high={} low={} close={} volume={}",
                self.open.len(),
                self.high.len(),
                self.low.len(),
                n,
                self.volume.len()
            )));
        }
        if let Some(bad) = self.close.iter().find(|c| !c.is_finite() || **c <= 0.0) {
            return Err(ScalpError::InvalidMarketData(format!(
                "non-positive close in window: {}",
                bad
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_closes_builds_consistent_window() {
        let data = MarketData::from_closes(&[100.0, 102.0, 101.0]);
        assert_eq!(data.len(), 3);
        assert_eq!(data.open, vec![100.0, 100.0, 102.0]);
        assert_eq!(data.high[1], 102.0);
        assert_eq!(data.low[2], 101.0);
        assert_eq!(data.latest_close(), Some(101.0));
        assert!(data.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_windows() {
        assert!(MarketData::default().validate().is_err());

        let mut ragged = MarketData::from_closes(&[1.0, 2.0]);
        ragged.volume.pop();
        assert!(ragged.validate().is_err());

        let zero = MarketData::from_closes(&[1.0, 0.0]);
        assert!(zero.validate().is_err());
    }
}
