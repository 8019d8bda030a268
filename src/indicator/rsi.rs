use crate::model::Candle;

/// 상대강도지수 (Wilder 평활)
///
/// 초기 평균 상승/하락폭은 처음 period개 변화량의 산술평균으로 계산하고,
/// 이후는 Wilder 방식으로 지수 평활합니다. 하락폭이 전혀 없으면 100을
/// 반환하며, 데이터가 부족하면 0을 반환합니다.
pub fn rsi<C: Candle>(candles: &[C], period: usize) -> f64 {
    if period == 0 || candles.len() <= period {
        return 0.0;
    }

    let mut gains = 0.0;
    let mut losses = 0.0;
    for i in 1..=period {
        let change = candles[i].close_price() - candles[i - 1].close_price();
        if change > 0.0 {
            gains += change;
        } else {
            losses += -change;
        }
    }

    let mut avg_gain = gains / period as f64;
    let mut avg_loss = losses / period as f64;

    let n = period as f64;
    for i in (period + 1)..candles.len() {
        let change = candles[i].close_price() - candles[i - 1].close_price();
        if change > 0.0 {
            avg_gain = (avg_gain * (n - 1.0) + change) / n;
            avg_loss = (avg_loss * (n - 1.0)) / n;
        } else {
            avg_gain = (avg_gain * (n - 1.0)) / n;
            avg_loss = (avg_loss * (n - 1.0) + (-change)) / n;
        }
    }

    if avg_loss == 0.0 {
        return 100.0;
    }

    let rs = avg_gain / avg_loss;
    100.0 - (100.0 / (1.0 + rs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Kline;

    fn closes_to_klines(closes: &[f64]) -> Vec<Kline> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Kline {
                open_time: i as i64,
                close,
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn test_rsi_all_gains_is_100() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let klines = closes_to_klines(&closes);
        assert!((rsi(&klines, 14) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_rsi_all_losses_is_near_zero() {
        let closes: Vec<f64> = (0..30).map(|i| 130.0 - i as f64).collect();
        let klines = closes_to_klines(&closes);
        assert!(rsi(&klines, 14) < 1.0);
    }

    #[test]
    fn test_rsi_balanced_series_near_50() {
        let closes: Vec<f64> = (0..40)
            .map(|i| if i % 2 == 0 { 100.0 } else { 101.0 })
            .collect();
        let klines = closes_to_klines(&closes);
        let value = rsi(&klines, 14);
        assert!(value > 40.0 && value < 60.0, "rsi={}", value);
    }

    #[test]
    fn test_rsi_insufficient_data() {
        let klines = closes_to_klines(&[1.0; 14]);
        assert_eq!(rsi(&klines, 14), 0.0);
    }
}
