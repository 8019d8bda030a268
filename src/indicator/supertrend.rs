use crate::indicator::atr::atr;
use crate::model::Candle;
use serde::{Deserialize, Serialize};

/// 슈퍼트렌드 방향
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupertrendDirection {
    Bullish,
    Bearish,
    Sideways,
    Unknown,
}

/// 슈퍼트렌드 계산 결과
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Supertrend {
    /// 추세 방향
    pub direction: SupertrendDirection,
    /// 현재 추세선 가격
    pub current_line: f64,
    /// 상단 밴드 (hl2 + factor*ATR)
    pub upper_line: f64,
    /// 하단 밴드 (hl2 - factor*ATR)
    pub lower_line: f64,
}

impl Supertrend {
    fn unknown() -> Supertrend {
        Supertrend {
            direction: SupertrendDirection::Unknown,
            current_line: 0.0,
            upper_line: 0.0,
            lower_line: 0.0,
        }
    }
}

/// 슈퍼트렌드 지표
///
/// 최신 캔들의 중간가에서 factor*ATR만큼 떨어진 상/하단 밴드를 만들고,
/// 종가가 하단 밴드 위면 상승, 상단 밴드 아래면 하락으로 분류합니다.
pub fn supertrend<C: Candle>(candles: &[C], atr_period: usize, factor: f64) -> Supertrend {
    if candles.len() < atr_period {
        return Supertrend::unknown();
    }

    let atr_value = atr(candles, atr_period);
    if atr_value == 0.0 {
        return Supertrend::unknown();
    }

    let latest = &candles[candles.len() - 1];
    let hl2 = latest.hl2();

    let upper_line = hl2 + factor * atr_value;
    let lower_line = hl2 - factor * atr_value;
    let close = latest.close_price();

    let (direction, current_line) = if close > lower_line {
        (SupertrendDirection::Bullish, lower_line)
    } else if close < upper_line {
        (SupertrendDirection::Bearish, upper_line)
    } else {
        (SupertrendDirection::Sideways, hl2)
    };

    Supertrend {
        direction,
        current_line,
        upper_line,
        lower_line,
    }
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
    fn test_supertrend_bullish_in_range() {
        let klines: Vec<Kline> = (0..30).map(|i| kline(i, 102.0, 100.0, 101.0)).collect();
        let st = supertrend(&klines, 20, 5.0);
        assert_eq!(st.direction, SupertrendDirection::Bullish);
        assert!(st.lower_line < 101.0);
        assert!(st.upper_line > 101.0);
        assert_eq!(st.current_line, st.lower_line);
    }

    #[test]
    fn test_supertrend_insufficient_data() {
        let klines: Vec<Kline> = (0..5).map(|i| kline(i, 102.0, 100.0, 101.0)).collect();
        let st = supertrend(&klines, 20, 5.0);
        assert_eq!(st.direction, SupertrendDirection::Unknown);
    }
}
