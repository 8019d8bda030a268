use crate::model::Candle;

/// 최소제곱 추세 기울기
///
/// 인덱스를 x축으로 하는 가격 수열의 선형 회귀 기울기를 반환합니다.
pub fn trend_slope(prices: &[f64]) -> f64 {
    let n = prices.len() as f64;
    if prices.len() < 2 {
        return 0.0;
    }

    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xy = 0.0;
    let mut sum_x2 = 0.0;

    for (i, price) in prices.iter().enumerate() {
        let x = i as f64;
        sum_x += x;
        sum_y += price;
        sum_xy += x * price;
        sum_x2 += x * x;
    }

    let denom = n * sum_x2 - sum_x * sum_x;
    if denom == 0.0 {
        return 0.0;
    }

    (n * sum_xy - sum_x * sum_y) / denom
}

/// 선형 회귀 결정계수 R²
///
/// 추세의 선형성을 [0,1] 범위로 반환합니다.
pub fn r_squared(prices: &[f64]) -> f64 {
    let n = prices.len() as f64;
    if prices.len() < 2 {
        return 0.0;
    }

    let slope = trend_slope(prices);

    let mean_y: f64 = prices.iter().sum::<f64>() / n;
    let mean_x = (n - 1.0) / 2.0;
    let intercept = mean_y - slope * mean_x;

    let mut total_ss = 0.0;
    let mut residual_ss = 0.0;
    for (i, actual) in prices.iter().enumerate() {
        let predicted = slope * i as f64 + intercept;
        total_ss += (actual - mean_y).powi(2);
        residual_ss += (actual - predicted).powi(2);
    }

    if total_ss == 0.0 {
        return 0.0;
    }

    (1.0 - residual_ss / total_ss).clamp(0.0, 1.0)
}

/// 종가 수익률의 표준편차 (변동성)
pub fn volatility<C: Candle>(candles: &[C]) -> f64 {
    if candles.len() < 2 {
        return 0.0;
    }

    let changes: Vec<f64> = candles
        .windows(2)
        .map(|w| (w[1].close_price() - w[0].close_price()) / w[0].close_price())
        .collect();

    let mean: f64 = changes.iter().sum::<f64>() / changes.len() as f64;
    let variance: f64 =
        changes.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / changes.len() as f64;

    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Kline;

    #[test]
    fn test_trend_slope_linear_series() {
        let prices: Vec<f64> = (0..10).map(|i| 100.0 + 2.0 * i as f64).collect();
        assert!((trend_slope(&prices) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_r_squared_perfect_line() {
        let prices: Vec<f64> = (0..20).map(|i| 50.0 - 0.5 * i as f64).collect();
        assert!((r_squared(&prices) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_r_squared_flat_series() {
        let prices = vec![10.0; 20];
        assert_eq!(r_squared(&prices), 0.0);
    }

    #[test]
    fn test_volatility_zero_for_constant_closes() {
        let klines: Vec<Kline> = (0..10)
            .map(|i| Kline {
                open_time: i,
                close: 100.0,
                ..Default::default()
            })
            .collect();
        assert_eq!(volatility(&klines), 0.0);
    }
}
