use market_analytics::model::Kline;

/// 4시간 주기 기준 테스트 캔들 생성
pub const BAR_MS: i64 = 4 * 3600 * 1000;

pub fn kline(index: usize, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Kline {
    let open_time = index as i64 * BAR_MS;
    Kline {
        open_time,
        close_time: open_time + BAR_MS - 1,
        open,
        high,
        low,
        close,
        volume,
        quote_volume: volume * close,
        taker_buy_volume: volume / 2.0,
        taker_buy_quote_volume: volume * close / 2.0,
        trades: 100,
    }
}

/// 종가가 단조 상승하는 윈도우 (고저가는 종가 주변 소폭 범위)
pub fn uptrend_klines(count: usize, base_price: f64, step: f64) -> Vec<Kline> {
    (0..count)
        .map(|i| {
            let close = base_price + i as f64 * step;
            let open = close - step / 2.0;
            kline(i, open, close + step * 0.4, open - step * 0.4, close, 1000.0)
        })
        .collect()
}

/// 종가가 단조 하락하는 윈도우
pub fn downtrend_klines(count: usize, base_price: f64, step: f64) -> Vec<Kline> {
    (0..count)
        .map(|i| {
            let close = base_price - i as f64 * step;
            let open = close + step / 2.0;
            kline(i, open, open + step * 0.4, close - step * 0.4, close, 1000.0)
        })
        .collect()
}

/// 좁은 범위를 오가는 횡보 윈도우
pub fn sideways_klines(count: usize, base_price: f64, range: f64) -> Vec<Kline> {
    (0..count)
        .map(|i| {
            let oscillation = (i % 4) as f64 * range / 4.0 - range / 2.0;
            let price = base_price + oscillation;
            kline(
                i,
                price,
                price + range / 8.0,
                price - range / 8.0,
                price,
                1000.0,
            )
        })
        .collect()
}

/// 종가는 상승하지만 주기적으로 스윙 저점을 남기는 상승 지그재그
///
/// 스윙 구조가 필요한 추세선/되돌림 테스트용. 되돌림 깊이는 작게 유지해
/// 공급 구역 패턴(좌측 하락 임펄스)이 생기지 않습니다.
pub fn rising_zigzag_klines(count: usize, base_price: f64, step: f64) -> Vec<Kline> {
    (0..count)
        .map(|i| {
            let close = base_price + i as f64 * step;
            let open = close - step / 2.0;
            // 7캔들마다 깊은 꼬리를 남겨 룩백 5 기준의 스윙 저점을 형성
            let dip = if i % 7 == 3 { step * 7.0 } else { step * 0.4 };
            let spike = if i % 7 == 0 { step * 2.0 } else { step * 0.4 };
            kline(i, open, close + spike, open - dip, close, 1000.0)
        })
        .collect()
}

/// 지정한 (고가, 저가) 경로를 따라가는 윈도우 (종가는 중간값)
pub fn klines_from_path(path: &[(f64, f64)]) -> Vec<Kline> {
    path.iter()
        .enumerate()
        .map(|(i, &(high, low))| {
            let mid = (high + low) / 2.0;
            kline(i, mid, high, low, mid, 1000.0)
        })
        .collect()
}
