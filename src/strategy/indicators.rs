//! Indicator math over closing/high/low series.
//!
//! Series functions return one value per input bar with `NaN` during warmup;
//! the `latest_*` helpers return `None` until enough bars exist.
//!
//! - RSI and ATR use Wilder smoothing seeded by a simple average
//! - EMA is seeded by the SMA of the first `period` values, alpha = 2/(p+1)
//! - Bollinger uses population standard deviation

/// Simple moving average series
pub fn sma_series(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }

    let mut sum: f64 = values[..period].iter().sum();
    result[period - 1] = sum / period as f64;
    for i in period..n {
        sum += values[i] - values[i - period];
        result[i] = sum / period as f64;
    }
    result
}

/// Exponential moving average series
pub fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let mut ema = values[..period].iter().sum::<f64>() / period as f64;
    result[period - 1] = ema;
    for i in period..n {
        ema = alpha * values[i] + (1.0 - alpha) * ema;
        result[i] = ema;
    }
    result
}

fn wilder_rsi(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

/// RSI series with Wilder smoothing; first value at index `period`
pub fn rsi_series(closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period + 1 {
        return result;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let ch = closes[i] - closes[i - 1];
        if ch > 0.0 {
            avg_gain += ch;
        } else {
            avg_loss -= ch;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    result[period] = wilder_rsi(avg_gain, avg_loss);

    let alpha = 1.0 / period as f64;
    for i in (period + 1)..n {
        let ch = closes[i] - closes[i - 1];
        avg_gain = alpha * ch.max(0.0) + (1.0 - alpha) * avg_gain;
        avg_loss = alpha * (-ch).max(0.0) + (1.0 - alpha) * avg_loss;
        result[i] = wilder_rsi(avg_gain, avg_loss);
    }
    result
}

/// True range per bar; the first bar has no previous close and uses high - low
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    let n = close.len().min(high.len()).min(low.len());
    (0..n)
        .map(|i| {
            let hl = high[i] - low[i];
            if i == 0 {
                hl
            } else {
                let prev = close[i - 1];
                hl.max((high[i] - prev).abs()).max((low[i] - prev).abs())
            }
        })
        .collect()
}

/// ATR series: Wilder-smoothed true range, first value at index `period - 1`
pub fn atr_series(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    let tr = true_range(high, low, close);
    let n = tr.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }

    let mut atr = tr[..period].iter().sum::<f64>() / period as f64;
    result[period - 1] = atr;
    for i in period..n {
        atr = (atr * (period as f64 - 1.0) + tr[i]) / period as f64;
        result[i] = atr;
    }
    result
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Bollinger bands over the last `period` closes
pub fn bollinger(closes: &[f64], period: usize, multiplier: f64) -> Option<BollingerBands> {
    if period == 0 || closes.len() < period {
        return None;
    }
    let window = &closes[closes.len() - period..];
    let mean = window.iter().sum::<f64>() / period as f64;
    let variance = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / period as f64;
    let sd = variance.sqrt();
    Some(BollingerBands {
        upper: mean + multiplier * sd,
        middle: mean,
        lower: mean - multiplier * sd,
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Macd {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// Latest MACD line, signal line and histogram
pub fn macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> Option<Macd> {
    let fast_ema = ema_series(closes, fast);
    let slow_ema = ema_series(closes, slow);

    let line: Vec<f64> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| f - s)
        .filter(|v| !v.is_nan())
        .collect();
    let signal_line = ema_series(&line, signal);

    let macd = *line.last()?;
    let signal = *signal_line.last()?;
    if signal.is_nan() {
        return None;
    }
    Some(Macd {
        macd,
        signal,
        histogram: macd - signal,
    })
}

fn last_defined(series: Vec<f64>) -> Option<f64> {
    series.last().copied().filter(|v| !v.is_nan())
}

pub fn latest_rsi(closes: &[f64], period: usize) -> Option<f64> {
    last_defined(rsi_series(closes, period))
}

pub fn latest_atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Option<f64> {
    last_defined(atr_series(high, low, close, period))
}

pub fn latest_ema(values: &[f64], period: usize) -> Option<f64> {
    last_defined(ema_series(values, period))
}

pub fn latest_sma(values: &[f64], period: usize) -> Option<f64> {
    last_defined(sma_series(values, period))
}

/// Relative change from the close `lookback` bars back to the latest close.
///
/// Compares `close[len - 1]` with `close[len - lookback]`.
pub fn trend_change(closes: &[f64], lookback: usize) -> Option<f64> {
    if lookback == 0 || closes.len() < lookback {
        return None;
    }
    let base = closes[closes.len() - lookback];
    let last = *closes.last()?;
    if base <= 0.0 {
        return None;
    }
    Some((last - base) / base)
}

/// Mean bar-over-bar percentage change across the last `window` changes
pub fn mean_pct_change(closes: &[f64], window: usize) -> Option<f64> {
    if window == 0 || closes.len() < window + 1 {
        return None;
    }
    let tail = &closes[closes.len() - window - 1..];
    let sum: f64 = tail.windows(2).map(|w| (w[1] - w[0]) / w[0]).sum();
    Some(sum / window as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_approx(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() < tol,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn sma_basic() {
        let result = sma_series(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert!(result[1].is_nan());
        assert_approx(result[2], 2.0, 1e-12);
        assert_approx(result[4], 4.0, 1e-12);
    }

    #[test]
    fn ema_seeded_from_sma() {
        let result = ema_series(&[2.0, 4.0, 6.0, 8.0], 3);
        assert_approx(result[2], 4.0, 1e-12);
        // alpha = 0.5: 0.5 * 8 + 0.5 * 4
        assert_approx(result[3], 6.0, 1e-12);
    }

    #[test]
    fn rsi_extremes() {
        let up: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        assert_approx(latest_rsi(&up, 14).unwrap(), 100.0, 1e-9);

        let down: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        assert_approx(latest_rsi(&down, 14).unwrap(), 0.0, 1e-9);

        let flat = vec![100.0; 20];
        assert_approx(latest_rsi(&flat, 14).unwrap(), 50.0, 1e-9);
    }

    #[test]
    fn rsi_mixed_seed() {
        // gains 0.34, losses 0.73 over the seed window
        let closes = [44.0, 44.34, 44.09, 43.61];
        let expected = 100.0 - 100.0 / (1.0 + 0.34 / 0.73);
        assert_approx(latest_rsi(&closes, 3).unwrap(), expected, 1e-9);
        assert!(latest_rsi(&closes[..3], 3).is_none());
    }

    #[test]
    fn atr_constant_range() {
        let high = vec![11.0; 10];
        let low = vec![9.0; 10];
        let close = vec![10.0; 10];
        assert_approx(latest_atr(&high, &low, &close, 5).unwrap(), 2.0, 1e-12);
    }

    #[test]
    fn true_range_uses_gap_from_previous_close() {
        let tr = true_range(&[10.0, 15.0], &[9.0, 14.0], &[9.5, 14.5]);
        assert_approx(tr[0], 1.0, 1e-12);
        // gap up: |15 - 9.5|
        assert_approx(tr[1], 5.5, 1e-12);
    }

    #[test]
    fn bollinger_population_stddev() {
        let closes = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let bands = bollinger(&closes, 8, 2.0).unwrap();
        assert_approx(bands.middle, 5.0, 1e-12);
        assert_approx(bands.upper, 9.0, 1e-12);
        assert_approx(bands.lower, 1.0, 1e-12);
        assert!(bollinger(&closes, 9, 2.0).is_none());
    }

    #[test]
    fn macd_sign_follows_trend() {
        let rising: Vec<f64> = (0..60).map(|i| 100.0 + i as f64 * 0.5).collect();
        let m = macd(&rising, 12, 26, 9).unwrap();
        assert!(m.macd > 0.0);

        let falling: Vec<f64> = (0..60).map(|i| 100.0 - i as f64 * 0.5).collect();
        let m = macd(&falling, 12, 26, 9).unwrap();
        assert!(m.macd < 0.0);

        assert!(macd(&rising[..30], 12, 26, 9).is_none());
    }

    #[test]
    fn macd_histogram_turns_positive_after_reversal() {
        let mut closes: Vec<f64> = (0..50).map(|i| 200.0 - i as f64).collect();
        closes.extend((0..15).map(|i| 151.0 + i as f64 * 3.0));
        let m = macd(&closes, 12, 26, 9).unwrap();
        assert!(m.histogram > 0.0);
    }

    #[test]
    fn trend_change_compares_against_lookback_bar() {
        let mut closes = vec![100.0; 25];
        closes[5] = 100.0;
        *closes.last_mut().unwrap() = 101.5;
        assert_approx(trend_change(&closes, 20).unwrap(), 0.015, 1e-12);
        assert!(trend_change(&closes[..10], 20).is_none());
    }

    #[test]
    fn mean_pct_change_window() {
        let closes = [100.0, 100.0, 110.0, 99.0];
        // changes: 0.0, 0.1, -0.1 over the last 3
        assert_approx(mean_pct_change(&closes, 3).unwrap(), 0.0, 1e-12);
        assert_approx(mean_pct_change(&closes, 1).unwrap(), -0.1, 1e-12);
    }
}
