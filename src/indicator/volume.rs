use crate::model::Candle;

/// 지정 구간의 평균 거래량
///
/// 구간은 양끝 포함이며 윈도우 범위로 클램핑됩니다.
pub fn average_volume<C: Candle>(candles: &[C], start: isize, end: isize) -> f64 {
    if candles.is_empty() {
        return 0.0;
    }

    let start = start.max(0) as usize;
    let end = (end.max(0) as usize).min(candles.len() - 1);
    if start > end {
        return 0.0;
    }

    let slice = &candles[start..=end];
    let total: f64 = slice.iter().map(|c| c.volume()).sum();
    total / slice.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Kline;

    fn kline(i: i64, volume: f64) -> Kline {
        Kline {
            open_time: i,
            volume,
            ..Default::default()
        }
    }

    #[test]
    fn test_average_volume_clamps_range() {
        let klines: Vec<Kline> = (0..5).map(|i| kline(i, (i + 1) as f64)).collect();
        // -3..10 → 전체 구간 평균 3
        assert!((average_volume(&klines, -3, 10) - 3.0).abs() < 1e-9);
        assert!((average_volume(&klines, 1, 2) - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_average_volume_empty() {
        let klines: Vec<Kline> = Vec::new();
        assert_eq!(average_volume(&klines, 0, 10), 0.0);
    }
}
