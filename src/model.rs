use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display};
use std::str::FromStr;

/// 캔들(봉) 데이터 접근 트레이트
///
/// 분석기는 구체 타입 대신 이 트레이트에 대해 제네릭하게 동작합니다.
/// 모든 가격/수량 필드는 IEEE-754 double이며, 시각은 ms epoch입니다.
pub trait Candle: Clone + Debug + Display + Send + Sync {
    /// 캔들 시작 시각 (ms epoch)
    fn open_time(&self) -> i64;
    /// 캔들 종료 시각 (ms epoch)
    fn close_time(&self) -> i64;
    /// 시가
    fn open_price(&self) -> f64;
    /// 고가
    fn high_price(&self) -> f64;
    /// 저가
    fn low_price(&self) -> f64;
    /// 종가
    fn close_price(&self) -> f64;
    /// 기초 자산 거래량
    fn volume(&self) -> f64;
    /// 호가 자산 거래량
    fn quote_volume(&self) -> f64;
    /// 테이커 매수 기초 거래량
    fn taker_buy_volume(&self) -> f64;
    /// 거래 횟수
    fn trade_count(&self) -> u64;

    /// 시작 시각을 DateTime으로 변환
    fn datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.open_time()).unwrap_or_default()
    }

    /// 중간 가격 (high+low)/2
    fn hl2(&self) -> f64 {
        (self.high_price() + self.low_price()) / 2.0
    }

    /// 양봉 여부
    fn is_bullish(&self) -> bool {
        self.close_price() > self.open_price()
    }
}

/// 거래소 K선 한 개
///
/// REST 백필 응답과 WebSocket 스트림 업데이트가 모두 이 타입으로
/// 정규화됩니다. 윈도우의 마지막 원소는 진행 중 캔들일 수 있습니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    pub open_time: i64,
    pub close_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub quote_volume: f64,
    pub taker_buy_volume: f64,
    pub taker_buy_quote_volume: f64,
    pub trades: u64,
}

impl Display for Kline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Kline(t={}, o={}, h={}, l={}, c={}, v={})",
            self.open_time, self.open, self.high, self.low, self.close, self.volume
        )
    }
}

impl Candle for Kline {
    fn open_time(&self) -> i64 {
        self.open_time
    }
    fn close_time(&self) -> i64 {
        self.close_time
    }
    fn open_price(&self) -> f64 {
        self.open
    }
    fn high_price(&self) -> f64 {
        self.high
    }
    fn low_price(&self) -> f64 {
        self.low
    }
    fn close_price(&self) -> f64 {
        self.close
    }
    fn volume(&self) -> f64 {
        self.volume
    }
    fn quote_volume(&self) -> f64 {
        self.quote_volume
    }
    fn taker_buy_volume(&self) -> f64 {
        self.taker_buy_volume
    }
    fn trade_count(&self) -> u64 {
        self.trades
    }
}

/// 지원하는 캔들 주기
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandleInterval {
    #[serde(rename = "3m")]
    Minute3,
    #[serde(rename = "15m")]
    Minute15,
    #[serde(rename = "30m")]
    Minute30,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "4h")]
    Hour4,
}

impl CandleInterval {
    /// 지원하는 전체 주기 목록
    pub const ALL: [CandleInterval; 5] = [
        CandleInterval::Minute3,
        CandleInterval::Minute15,
        CandleInterval::Minute30,
        CandleInterval::Hour1,
        CandleInterval::Hour4,
    ];

    /// 거래소 스트림/REST 표기 문자열
    pub fn as_str(&self) -> &'static str {
        match self {
            CandleInterval::Minute3 => "3m",
            CandleInterval::Minute15 => "15m",
            CandleInterval::Minute30 => "30m",
            CandleInterval::Hour1 => "1h",
            CandleInterval::Hour4 => "4h",
        }
    }

    /// 주기 길이 (ms)
    pub fn duration_ms(&self) -> i64 {
        match self {
            CandleInterval::Minute3 => 3 * 60 * 1000,
            CandleInterval::Minute15 => 15 * 60 * 1000,
            CandleInterval::Minute30 => 30 * 60 * 1000,
            CandleInterval::Hour1 => 60 * 60 * 1000,
            CandleInterval::Hour4 => 4 * 60 * 60 * 1000,
        }
    }
}

impl Display for CandleInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CandleInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "3m" => Ok(CandleInterval::Minute3),
            "15m" => Ok(CandleInterval::Minute15),
            "30m" => Ok(CandleInterval::Minute30),
            "1h" => Ok(CandleInterval::Hour1),
            "4h" => Ok(CandleInterval::Hour4),
            other => Err(format!("지원하지 않는 캔들 주기: {}", other)),
        }
    }
}

/// 신호가 권고하는 동작
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalAction {
    /// 매수
    Buy,
    /// 매도
    Sell,
    /// 관망
    Hold,
    /// 청산
    Close,
}

impl SignalAction {
    /// 포지션 진입 동작 여부
    pub fn is_entry(&self) -> bool {
        matches!(self, SignalAction::Buy | SignalAction::Sell)
    }
}

impl Display for SignalAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SignalAction::Buy => "buy",
            SignalAction::Sell => "sell",
            SignalAction::Hold => "hold",
            SignalAction::Close => "close",
        };
        f.write_str(name)
    }
}

/// 추세 방향
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Up,
    Down,
    Flat,
}

impl Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TrendDirection::Up => "up",
            TrendDirection::Down => "down",
            TrendDirection::Flat => "flat",
        };
        f.write_str(name)
    }
}

/// 리스크 등급
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        };
        f.write_str(name)
    }
}

/// 심볼을 USDT 무기한 계약 표기로 정규화합니다.
pub fn normalize_symbol(symbol: &str) -> String {
    let upper = symbol.trim().to_uppercase();
    if upper.ends_with("USDT") {
        upper
    } else {
        format!("{}USDT", upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_round_trip() {
        for interval in CandleInterval::ALL {
            assert_eq!(
                interval.as_str().parse::<CandleInterval>().unwrap(),
                interval
            );
        }
        assert!("2m".parse::<CandleInterval>().is_err());
    }

    #[test]
    fn test_normalize_symbol() {
        assert_eq!(normalize_symbol("btc"), "BTCUSDT");
        assert_eq!(normalize_symbol("ETHUSDT"), "ETHUSDT");
        assert_eq!(normalize_symbol(" sol "), "SOLUSDT");
    }

    #[test]
    fn test_interval_serde_uses_wire_names() {
        let json = serde_json::to_string(&CandleInterval::Minute3).unwrap();
        assert_eq!(json, "\"3m\"");
        let back: CandleInterval = serde_json::from_str("\"4h\"").unwrap();
        assert_eq!(back, CandleInterval::Hour4);
    }
}
