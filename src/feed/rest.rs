use crate::feed::FeedError;
use crate::model::{CandleInterval, Kline};
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://fapi.binance.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// 최신 미결제약정
#[derive(Debug, Clone, serde::Serialize, Deserialize)]
pub struct OpenInterest {
    pub latest: f64,
    pub average: f64,
}

/// 거래소 REST 클라이언트
///
/// 캐시 미스 백필용 K선 조회와 미결제약정/펀딩비 조회를 담당합니다.
/// 실패는 재시도 없이 호출자에게 전파됩니다.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
}

impl RestClient {
    pub fn new() -> Result<RestClient, FeedError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<RestClient, FeedError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| FeedError::Http(e.to_string()))?;

        Ok(RestClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// 최근 K선을 조회합니다.
    ///
    /// # Arguments
    /// * `symbol` - 심볼 (대문자)
    /// * `interval` - 캔들 주기
    /// * `limit` - 조회 개수 (기본 300)
    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: CandleInterval,
        limit: usize,
    ) -> Result<Vec<Kline>, FeedError> {
        let url = format!(
            "{}/fapi/v1/klines?symbol={}&interval={}&limit={}",
            self.base_url, symbol, interval, limit
        );

        let rows: Vec<Vec<serde_json::Value>> = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut klines = Vec::with_capacity(rows.len());
        for row in &rows {
            klines.push(parse_kline_row(row)?);
        }

        log::debug!("{} {} K선 {}개 백필", symbol, interval, klines.len());
        Ok(klines)
    }

    /// 최신 미결제약정을 조회합니다.
    pub async fn get_open_interest(&self, symbol: &str) -> Result<OpenInterest, FeedError> {
        #[derive(Deserialize)]
        struct Response {
            #[serde(rename = "openInterest")]
            open_interest: String,
        }

        let url = format!("{}/fapi/v1/openInterest?symbol={}", self.base_url, symbol);
        let response: Response = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let latest = response
            .open_interest
            .parse::<f64>()
            .map_err(|e| FeedError::Decode(format!("미결제약정 파싱 실패: {}", e)))?;

        Ok(OpenInterest {
            latest,
            // 근사 평균 (히스토리 조회 없이 최신값 기반)
            average: latest * 0.999,
        })
    }

    /// 최신 펀딩비를 조회합니다.
    pub async fn get_funding_rate(&self, symbol: &str) -> Result<f64, FeedError> {
        #[derive(Deserialize)]
        struct Response {
            #[serde(rename = "lastFundingRate")]
            last_funding_rate: String,
        }

        let url = format!("{}/fapi/v1/premiumIndex?symbol={}", self.base_url, symbol);
        let response: Response = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response
            .last_funding_rate
            .parse::<f64>()
            .map_err(|e| FeedError::Decode(format!("펀딩비 파싱 실패: {}", e)))
    }
}

/// REST K선 응답 한 행을 파싱합니다.
///
/// 행 구성: [openTime, open, high, low, close, volume, closeTime,
/// quoteVolume, trades, takerBuyBase, takerBuyQuote, ...]
pub fn parse_kline_row(row: &[serde_json::Value]) -> Result<Kline, FeedError> {
    if row.len() < 11 {
        return Err(FeedError::Decode(format!(
            "K선 행 필드 부족: {}개",
            row.len()
        )));
    }

    Ok(Kline {
        open_time: value_i64(&row[0])?,
        open: value_f64(&row[1])?,
        high: value_f64(&row[2])?,
        low: value_f64(&row[3])?,
        close: value_f64(&row[4])?,
        volume: value_f64(&row[5])?,
        close_time: value_i64(&row[6])?,
        quote_volume: value_f64(&row[7])?,
        trades: value_i64(&row[8])? as u64,
        taker_buy_volume: value_f64(&row[9])?,
        taker_buy_quote_volume: value_f64(&row[10])?,
    })
}

fn value_f64(value: &serde_json::Value) -> Result<f64, FeedError> {
    match value {
        serde_json::Value::String(s) => s
            .parse::<f64>()
            .map_err(|e| FeedError::Decode(format!("수치 파싱 실패 '{}': {}", s, e))),
        serde_json::Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| FeedError::Decode(format!("수치 변환 실패: {}", n))),
        other => Err(FeedError::Decode(format!("수치가 아닌 값: {}", other))),
    }
}

fn value_i64(value: &serde_json::Value) -> Result<i64, FeedError> {
    match value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| FeedError::Decode(format!("정수 변환 실패: {}", n))),
        serde_json::Value::String(s) => s
            .parse::<i64>()
            .map_err(|e| FeedError::Decode(format!("정수 파싱 실패 '{}': {}", s, e))),
        other => Err(FeedError::Decode(format!("정수가 아닌 값: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kline_row() {
        let row: Vec<serde_json::Value> = serde_json::from_str(
            r#"[1672515780000, "16500.1", "16512.0", "16498.0", "16510.5",
                "120.5", 1672515959999, "1989000.0", 512, "70.2", "1158000.0", "0"]"#,
        )
        .unwrap();

        let kline = parse_kline_row(&row).unwrap();
        assert_eq!(kline.open_time, 1672515780000);
        assert_eq!(kline.close_time, 1672515959999);
        assert!((kline.high - 16512.0).abs() < 1e-9);
        assert_eq!(kline.trades, 512);
    }

    #[test]
    fn test_parse_kline_row_rejects_short_rows() {
        let row: Vec<serde_json::Value> = serde_json::from_str(r#"[1, "2", "3"]"#).unwrap();
        assert!(matches!(parse_kline_row(&row), Err(FeedError::Decode(_))));
    }
}
