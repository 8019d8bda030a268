use crate::feed::FeedError;
use crate::model::Kline;
use serde::Deserialize;

/// 결합 스트림 프레임 외피
///
/// `{"stream":"btcusdt@kline_3m","data":{...}}` 형태에서 stream 이름으로
/// 구독자를 찾고 data 부분만 전달합니다.
#[derive(Debug, Deserialize)]
pub struct CombinedFrame {
    pub stream: String,
    pub data: serde_json::Value,
}

/// K선 스트림 이벤트
#[derive(Debug, Deserialize)]
pub struct KlineEvent {
    /// 이벤트 유형 ("kline")
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "k")]
    pub kline: KlinePayload,
}

/// K선 페이로드 (수치 필드는 문자열로 인코딩됨)
#[derive(Debug, Deserialize)]
pub struct KlinePayload {
    #[serde(rename = "t")]
    pub start_time: i64,
    #[serde(rename = "T")]
    pub close_time: i64,
    #[serde(rename = "i")]
    pub interval: String,
    #[serde(rename = "o")]
    pub open: String,
    #[serde(rename = "h")]
    pub high: String,
    #[serde(rename = "l")]
    pub low: String,
    #[serde(rename = "c")]
    pub close: String,
    #[serde(rename = "v")]
    pub volume: String,
    #[serde(rename = "q")]
    pub quote_volume: String,
    #[serde(rename = "n")]
    pub trades: u64,
    #[serde(rename = "V")]
    pub taker_buy_volume: String,
    #[serde(rename = "Q")]
    pub taker_buy_quote_volume: String,
    /// 캔들 마감 여부 (윈도우 병합에는 사용하지 않음)
    #[serde(rename = "x", default)]
    pub is_closed: bool,
}

impl KlinePayload {
    /// 문자열 수치를 파싱해 캔들로 변환합니다.
    pub fn to_kline(&self) -> Result<Kline, FeedError> {
        Ok(Kline {
            open_time: self.start_time,
            close_time: self.close_time,
            open: parse_price(&self.open)?,
            high: parse_price(&self.high)?,
            low: parse_price(&self.low)?,
            close: parse_price(&self.close)?,
            volume: parse_price(&self.volume)?,
            quote_volume: parse_price(&self.quote_volume)?,
            taker_buy_volume: parse_price(&self.taker_buy_volume)?,
            taker_buy_quote_volume: parse_price(&self.taker_buy_quote_volume)?,
            trades: self.trades,
        })
    }
}

fn parse_price(value: &str) -> Result<f64, FeedError> {
    value
        .parse::<f64>()
        .map_err(|e| FeedError::Decode(format!("수치 파싱 실패 '{}': {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "e": "kline",
        "E": 1672515782136,
        "s": "BTCUSDT",
        "k": {
            "t": 1672515780000,
            "T": 1672515959999,
            "s": "BTCUSDT",
            "i": "3m",
            "f": 100,
            "L": 200,
            "o": "16500.10",
            "c": "16510.50",
            "h": "16512.00",
            "l": "16498.00",
            "v": "120.5",
            "n": 512,
            "x": false,
            "q": "1989000.0",
            "V": "70.2",
            "Q": "1158000.0",
            "B": "0"
        }
    }"#;

    #[test]
    fn test_parse_kline_event() {
        let event: KlineEvent = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(event.event_type, "kline");
        assert_eq!(event.symbol, "BTCUSDT");
        assert_eq!(event.kline.interval, "3m");

        let kline = event.kline.to_kline().unwrap();
        assert_eq!(kline.open_time, 1672515780000);
        assert!((kline.close - 16510.50).abs() < 1e-9);
        assert!((kline.taker_buy_volume - 70.2).abs() < 1e-9);
        assert_eq!(kline.trades, 512);
    }

    #[test]
    fn test_malformed_numeric_is_decode_error() {
        let mut event: KlineEvent = serde_json::from_str(SAMPLE).unwrap();
        event.kline.open = "not-a-number".to_string();
        assert!(matches!(
            event.kline.to_kline(),
            Err(FeedError::Decode(_))
        ));
    }

    #[test]
    fn test_combined_frame_envelope() {
        let raw = format!(r#"{{"stream":"btcusdt@kline_3m","data":{}}}"#, SAMPLE);
        let frame: CombinedFrame = serde_json::from_str(&raw).unwrap();
        assert_eq!(frame.stream, "btcusdt@kline_3m");
        let event: KlineEvent = serde_json::from_value(frame.data).unwrap();
        assert_eq!(event.symbol, "BTCUSDT");
    }
}
