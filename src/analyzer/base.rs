use crate::model::Candle;
use serde::{Deserialize, Serialize};

/// 스윙 포인트 유형
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwingType {
    High,
    Low,
}

/// 대칭 룩백 극값 검사로 찾은 스윙 포인트
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwingPoint {
    /// 고점/저점 구분
    pub swing_type: SwingType,
    /// 스윙 가격 (고점이면 고가, 저점이면 저가)
    pub price: f64,
    /// 캔들 시작 시각 (ms epoch)
    pub time: i64,
    /// 윈도우 내 인덱스
    pub index: usize,
    /// 스윙 강도 [0,10]
    pub strength: f64,
    /// 확정 여부 (윈도우 끝에서 충분히 떨어져 있는지)
    pub confirmed: bool,
}

/// 추세선 유형
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendLineType {
    Support,
    Resistance,
}

/// 두 스윙 포인트를 지나는 추세선
///
/// 기울기는 ms당 가격 변화로 표현되며 `price_at`으로 임의 시각의
/// 선상 가격을 구합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendLine {
    pub line_type: TrendLineType,
    /// 추세선을 구성한 스윙 포인트 (계산으로 만든 중앙선은 빈 목록)
    pub points: Vec<SwingPoint>,
    pub slope: f64,
    pub intercept: f64,
    /// 추세선 강도 (터치 수, 기간, 포인트 강도, 각도의 합성)
    pub strength: f64,
    /// 허용 오차 내에서 선에 닿은 스윙 수
    pub touches: usize,
    /// 마지막 터치 시각 (ms epoch)
    pub last_touch: i64,
    /// 돌파 여부
    pub broken: bool,
    /// 돌파 시각 (ms epoch, 미돌파 시 0)
    pub break_time: i64,
}

impl TrendLine {
    /// 두 스윙 포인트를 지나는 추세선을 만듭니다.
    ///
    /// 두 포인트의 시각이 같으면 기울기를 정의할 수 없어 None을 반환합니다.
    pub fn through(p1: &SwingPoint, p2: &SwingPoint, line_type: TrendLineType) -> Option<TrendLine> {
        let time_diff = (p2.time - p1.time) as f64;
        if time_diff == 0.0 {
            return None;
        }

        let slope = (p2.price - p1.price) / time_diff;
        let intercept = p1.price - slope * p1.time as f64;

        Some(TrendLine {
            line_type,
            points: vec![p1.clone(), p2.clone()],
            slope,
            intercept,
            strength: 0.0,
            touches: 2,
            last_touch: p2.time,
            broken: false,
            break_time: 0,
        })
    }

    /// 지정 시각에서의 선상 가격
    pub fn price_at(&self, time: i64) -> f64 {
        self.slope * time as f64 + self.intercept
    }

    /// 추세선의 시간 범위 (일 단위)
    pub fn span_days(&self) -> f64 {
        if self.points.len() < 2 {
            return 0.0;
        }
        let span = self.points[self.points.len() - 1].time - self.points[0].time;
        span as f64 / (24.0 * 3600.0 * 1000.0)
    }
}

/// 지정 인덱스가 스윙 고점인지 검사합니다.
///
/// 좌우 lookback개 캔들의 고가를 모두 엄격히 초과해야 합니다.
pub fn is_swing_high<C: Candle>(candles: &[C], index: usize, lookback: usize) -> bool {
    if index < lookback || index + lookback >= candles.len() {
        return false;
    }

    let current = candles[index].high_price();
    (index - lookback..index)
        .chain(index + 1..=index + lookback)
        .all(|i| candles[i].high_price() < current)
}

/// 지정 인덱스가 스윙 저점인지 검사합니다.
pub fn is_swing_low<C: Candle>(candles: &[C], index: usize, lookback: usize) -> bool {
    if index < lookback || index + lookback >= candles.len() {
        return false;
    }

    let current = candles[index].low_price();
    (index - lookback..index)
        .chain(index + 1..=index + lookback)
        .all(|i| candles[i].low_price() > current)
}

/// 허용 오차 내에서 추세선에 닿은 스윙 수를 셉니다.
///
/// 거리는 포인트 가격 대비 비율로 측정합니다.
pub fn count_line_touches(line: &TrendLine, points: &[SwingPoint], max_distance: f64) -> usize {
    points
        .iter()
        .filter(|point| {
            let expected = line.price_at(point.time);
            let distance = (point.price - expected).abs() / point.price;
            distance <= max_distance
        })
        .count()
}

/// 스윙 목록을 고점/저점으로 분리합니다.
pub fn split_swings(points: &[SwingPoint]) -> (Vec<SwingPoint>, Vec<SwingPoint>) {
    let mut highs = Vec::new();
    let mut lows = Vec::new();
    for point in points {
        match point.swing_type {
            SwingType::High => highs.push(point.clone()),
            SwingType::Low => lows.push(point.clone()),
        }
    }
    (highs, lows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Kline;

    fn kline(i: i64, high: f64, low: f64) -> Kline {
        Kline {
            open_time: i * 1000,
            open: (high + low) / 2.0,
            high,
            low,
            close: (high + low) / 2.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_swing_high_detection() {
        let klines = vec![
            kline(0, 10.0, 9.0),
            kline(1, 11.0, 10.0),
            kline(2, 15.0, 11.0),
            kline(3, 12.0, 10.5),
            kline(4, 11.0, 9.5),
        ];
        assert!(is_swing_high(&klines, 2, 2));
        assert!(!is_swing_high(&klines, 1, 1));
        // 윈도우 경계는 스윙이 될 수 없음
        assert!(!is_swing_high(&klines, 0, 2));
        assert!(!is_swing_high(&klines, 4, 2));
    }

    #[test]
    fn test_trend_line_through_and_price_at() {
        let p1 = SwingPoint {
            swing_type: SwingType::Low,
            price: 100.0,
            time: 0,
            index: 0,
            strength: 1.0,
            confirmed: true,
        };
        let p2 = SwingPoint {
            swing_type: SwingType::Low,
            price: 110.0,
            time: 10_000,
            index: 10,
            strength: 1.0,
            confirmed: true,
        };
        let line = TrendLine::through(&p1, &p2, TrendLineType::Support).unwrap();
        assert!((line.price_at(5_000) - 105.0).abs() < 1e-9);
        assert!((line.price_at(20_000) - 120.0).abs() < 1e-9);
    }

    #[test]
    fn test_count_line_touches() {
        let p1 = SwingPoint {
            swing_type: SwingType::Low,
            price: 100.0,
            time: 0,
            index: 0,
            strength: 1.0,
            confirmed: true,
        };
        let p2 = SwingPoint {
            swing_type: SwingType::Low,
            price: 100.0,
            time: 10_000,
            index: 10,
            strength: 1.0,
            confirmed: true,
        };
        let mut p3 = p2.clone();
        p3.time = 20_000;
        p3.price = 100.5; // 0.5% 거리
        let line = TrendLine::through(&p1, &p2, TrendLineType::Support).unwrap();
        assert_eq!(count_line_touches(&line, &[p1, p2, p3], 0.01), 3);
    }
}
