use crate::model::Candle;

/// 단순 이동평균 (최근 period개 종가)
///
/// # Arguments
/// * `candles` - 캔들 윈도우 (오름차순)
/// * `period` - 평균 기간
///
/// # Returns
/// * `f64` - SMA 값, 데이터 부족 시 0
pub fn sma<C: Candle>(candles: &[C], period: usize) -> f64 {
    if period == 0 || candles.len() < period {
        return 0.0;
    }

    let start = candles.len() - period;
    let sum: f64 = candles[start..].iter().map(|c| c.close_price()).sum();
    sum / period as f64
}

/// 지수 이동평균
///
/// 처음 period개 종가의 SMA를 시드로 사용한 뒤
/// 승수 2/(period+1)로 재귀 갱신합니다.
pub fn ema<C: Candle>(candles: &[C], period: usize) -> f64 {
    if period == 0 || candles.len() < period {
        return 0.0;
    }

    let seed: f64 = candles[..period].iter().map(|c| c.close_price()).sum();
    let mut ema = seed / period as f64;

    let multiplier = 2.0 / (period as f64 + 1.0);
    for candle in &candles[period..] {
        ema = (candle.close_price() - ema) * multiplier + ema;
    }

    ema
}

/// MACD 라인 (EMA12 - EMA26)
pub fn macd<C: Candle>(candles: &[C]) -> f64 {
    if candles.len() < 26 {
        return 0.0;
    }

    ema(candles, 12) - ema(candles, 26)
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
                open_time: i as i64 * 60_000,
                close_time: i as i64 * 60_000 + 59_999,
                open: close,
                high: close,
                low: close,
                close,
                volume: 1.0,
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn test_sma_basic() {
        let klines = closes_to_klines(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert!((sma(&klines, 5) - 3.0).abs() < 1e-9);
        assert!((sma(&klines, 2) - 4.5).abs() < 1e-9);
    }

    #[test]
    fn test_sma_insufficient_data() {
        let klines = closes_to_klines(&[1.0, 2.0]);
        assert_eq!(sma(&klines, 3), 0.0);
        assert_eq!(sma(&klines, 0), 0.0);
    }

    #[test]
    fn test_ema_constant_series() {
        let klines = closes_to_klines(&[10.0; 30]);
        assert!((ema(&klines, 20) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_ema_tracks_recent_prices() {
        let mut closes = vec![10.0; 20];
        closes.extend(std::iter::repeat(20.0).take(20));
        let klines = closes_to_klines(&closes);
        let value = ema(&klines, 10);
        assert!(value > 15.0 && value <= 20.0);
    }

    #[test]
    fn test_macd_sign_follows_momentum() {
        let rising: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let klines = closes_to_klines(&rising);
        assert!(macd(&klines) > 0.0);

        let falling: Vec<f64> = (0..60).map(|i| 160.0 - i as f64).collect();
        let klines = closes_to_klines(&falling);
        assert!(macd(&klines) < 0.0);
    }

    #[test]
    fn test_macd_insufficient_data() {
        let klines = closes_to_klines(&[1.0; 25]);
        assert_eq!(macd(&klines), 0.0);
    }
}
