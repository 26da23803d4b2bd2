//! Indicator math over price slices
//!
//! All functions look at the tail of the slice and return `None` when there
//! is not enough data.

/// Simple moving average of the last `period` values
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let tail = &values[values.len() - period..];
    Some(tail.iter().sum::<f64>() / period as f64)
}

/// Population standard deviation of the last `period` values
pub fn stdev(values: &[f64], period: usize) -> Option<f64> {
    let mean = sma(values, period)?;
    let tail = &values[values.len() - period..];
    let variance = tail.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / period as f64;
    Some(variance.sqrt())
}

/// RSI with Wilder's smoothing.
///
/// The first `period` changes seed the averages with a simple mean; every
/// later change is folded in as `avg = (avg * (period - 1) + x) / period`.
/// Needs at least `period + 1` values.
pub fn rsi_wilder(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period + 1 {
        return None;
    }

    let changes: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();
    let (seed, rest) = changes.split_at(period);

    let mut avg_gain = seed.iter().filter(|c| **c > 0.0).sum::<f64>() / period as f64;
    let mut avg_loss = seed.iter().filter(|c| **c < 0.0).map(|c| c.abs()).sum::<f64>()
        / period as f64;

    let p = period as f64;
    for change in rest {
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        avg_gain = (avg_gain * (p - 1.0) + gain) / p;
        avg_loss = (avg_loss * (p - 1.0) + loss) / p;
    }

    if avg_loss < 1e-12 && avg_gain < 1e-12 {
        return Some(50.0); // No movement = neutral
    }
    if avg_loss < 1e-12 {
        return Some(100.0);
    }
    if avg_gain < 1e-12 {
        return Some(0.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - (100.0 / (1.0 + rs)))
}

/// Bands around the SMA (returns upper, middle, lower)
pub fn bollinger(values: &[f64], period: usize, k: f64) -> Option<(f64, f64, f64)> {
    let mid = sma(values, period)?;
    let sd = stdev(values, period)?;
    Some((mid + k * sd, mid, mid - k * sd))
}

/// Highest and lowest of the `lookback` values preceding the last one
pub fn prior_extremes(values: &[f64], lookback: usize) -> Option<(f64, f64)> {
    if lookback == 0 || values.len() < lookback + 1 {
        return None;
    }
    let end = values.len() - 1;
    let prior = &values[end - lookback..end];
    let high = prior.iter().copied().fold(f64::MIN, f64::max);
    let low = prior.iter().copied().fold(f64::MAX, f64::min);
    Some((high, low))
}

/// Mean absolute bar-to-bar change across the `lookback` values preceding the last one
pub fn prior_mean_abs_change(values: &[f64], lookback: usize) -> Option<f64> {
    if lookback < 2 || values.len() < lookback + 1 {
        return None;
    }
    let end = values.len() - 1;
    let prior = &values[end - lookback..end];
    let total: f64 = prior.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
    Some(total / (lookback - 1) as f64)
}

/// Mean and sample standard deviation
pub fn mean_and_sample_stdev(values: &[f64]) -> Option<(f64, f64)> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some((mean, variance.sqrt()))
}
