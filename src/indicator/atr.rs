use crate::model::Candle;

/// 평균 실질 변동폭 (Wilder 평활)
///
/// 실질 변동폭은 max(고가-저가, |고가-전종가|, |저가-전종가|)이며,
/// 처음 period개의 산술평균을 시드로 이후 Wilder 방식으로 평활합니다.
pub fn atr<C: Candle>(candles: &[C], period: usize) -> f64 {
    if period == 0 || candles.len() <= period {
        return 0.0;
    }

    let mut true_ranges = vec![0.0; candles.len()];
    for i in 1..candles.len() {
        let high = candles[i].high_price();
        let low = candles[i].low_price();
        let prev_close = candles[i - 1].close_price();

        let tr = (high - low)
            .max((high - prev_close).abs())
            .max((low - prev_close).abs());
        true_ranges[i] = tr;
    }

    let mut atr: f64 = true_ranges[1..=period].iter().sum::<f64>() / period as f64;

    let n = period as f64;
    for tr in &true_ranges[period + 1..] {
        atr = (atr * (n - 1.0) + tr) / n;
    }

    atr
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Kline;

    fn kline(i: i64, high: f64, low: f64, close: f64) -> Kline {
        Kline {
            open_time: i,
            open: close,
            high,
            low,
            close,
            ..Default::default()
        }
    }

    #[test]
    fn test_atr_constant_range() {
        // 모든 캔들이 2포인트 범위로 갭 없이 이어지면 ATR은 2에 수렴
        let klines: Vec<Kline> = (0..30).map(|i| kline(i, 102.0, 100.0, 101.0)).collect();
        assert!((atr(&klines, 14) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_atr_counts_gaps() {
        let mut klines: Vec<Kline> = (0..20).map(|i| kline(i, 101.0, 100.0, 100.5)).collect();
        // 갭 상승 캔들 추가: 전종가 대비 실질 변동폭 확대
        klines.push(kline(20, 111.0, 110.0, 110.5));
        assert!(atr(&klines, 14) > 1.0);
    }

    #[test]
    fn test_atr_insufficient_data() {
        let klines: Vec<Kline> = (0..14).map(|i| kline(i, 101.0, 100.0, 100.5)).collect();
        assert_eq!(atr(&klines, 14), 0.0);
    }
}
