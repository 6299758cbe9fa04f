//! Momentum indicator computed locally from closing prices.

/// RSI-style oscillator over the last `period + 1` closes.
///
/// Average gain over average loss magnitude in the window; a window with no
/// losses is defined as 100 (pure uptrend, never triggers oversold). Returns
/// `None` when there is not enough history or the period is degenerate.
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    let mut gains = 0.0;
    let mut losses = 0.0;
    for i in closes.len() - period..closes.len() {
        let diff = closes[i] - closes[i - 1];
        if diff >= 0.0 {
            gains += diff;
        } else {
            losses -= diff;
        }
    }

    let avg_gain = gains / period as f64;
    let avg_loss = losses / period as f64;
    if avg_loss == 0.0 {
        return Some(100.0);
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}
