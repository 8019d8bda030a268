use crate::analyzer::comprehensive_analyzer::{ComprehensiveAnalyzer, ComprehensiveResult};
use crate::feed::monitor::MarketMonitor;
use crate::feed::rest::{OpenInterest, RestClient};
use crate::model::{normalize_symbol, CandleInterval};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 심볼 하나의 시장 스냅샷
///
/// 종합 분석 결과에 현재가/가격 변화율과 파생상품 컨텍스트
/// (미결제약정, 펀딩비)를 붙인 번들입니다. 하위 소비 계층은 이 값을
/// 그대로 직렬화해 사용합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub current_price: f64,
    /// 1시간 가격 변화율 [%]
    pub price_change_1h: f64,
    /// 4시간 가격 변화율 [%]
    pub price_change_4h: f64,
    pub open_interest: Option<OpenInterest>,
    pub funding_rate: f64,
    pub analysis: ComprehensiveResult,
}

/// 심볼 단위 분석 서비스
///
/// 캔들 모니터에서 필요한 주기의 윈도우 스냅샷을 읽어 종합 분석기를
/// 실행합니다. 윈도우가 캐시에 없으면 모니터가 백필과 구독을 수행하므로
/// 첫 호출 이후에는 스트림이 윈도우를 유지합니다.
pub struct AnalysisService {
    monitor: Arc<MarketMonitor>,
    rest: RestClient,
    analyzer: ComprehensiveAnalyzer,
}

impl AnalysisService {
    pub fn new(
        monitor: Arc<MarketMonitor>,
        rest: RestClient,
        analyzer: ComprehensiveAnalyzer,
    ) -> AnalysisService {
        AnalysisService {
            monitor,
            rest,
            analyzer,
        }
    }

    pub fn analyzer(&self) -> &ComprehensiveAnalyzer {
        &self.analyzer
    }

    /// 심볼 하나에 대한 종합 분석을 수행합니다.
    ///
    /// 단기(3m)와 장기(4h) 윈도우를 사용하며, 두 윈도우 중 하나라도
    /// 확보하지 못하면 오류를 반환합니다.
    pub async fn analyze_symbol(&self, symbol: &str) -> Result<ComprehensiveResult> {
        let symbol = normalize_symbol(symbol);

        let short = self
            .monitor
            .get_current_klines(&symbol, CandleInterval::Minute3)
            .await
            .with_context(|| format!("{} 3m 윈도우 확보 실패", symbol))?;
        let long = self
            .monitor
            .get_current_klines(&symbol, CandleInterval::Hour4)
            .await
            .with_context(|| format!("{} 4h 윈도우 확보 실패", symbol))?;

        self.analyzer
            .analyze(&symbol, &short, &long, CandleInterval::Hour4)
    }

    /// 종합 분석에 파생상품 컨텍스트를 더한 스냅샷을 만듭니다.
    ///
    /// 미결제약정/펀딩비 조회 실패는 분석을 중단시키지 않고 기본값으로
    /// 대체됩니다.
    pub async fn market_snapshot(&self, symbol: &str) -> Result<MarketSnapshot> {
        let symbol = normalize_symbol(symbol);
        let analysis = self.analyze_symbol(&symbol).await?;

        let short = self
            .monitor
            .peek_klines(&symbol, CandleInterval::Minute3)
            .await
            .unwrap_or_default();
        let long = self
            .monitor
            .peek_klines(&symbol, CandleInterval::Hour4)
            .await
            .unwrap_or_default();

        let current_price = analysis.current_price;

        // 1시간 변화 = 20개의 3분 캔들 이전 종가 대비
        let price_change_1h = if short.len() >= 21 {
            let past = short[short.len() - 21].close;
            if past > 0.0 {
                (current_price - past) / past * 100.0
            } else {
                0.0
            }
        } else {
            0.0
        };

        // 4시간 변화 = 직전 4시간 캔들 종가 대비
        let price_change_4h = if long.len() >= 2 {
            let past = long[long.len() - 2].close;
            if past > 0.0 {
                (current_price - past) / past * 100.0
            } else {
                0.0
            }
        } else {
            0.0
        };

        let open_interest = match self.rest.get_open_interest(&symbol).await {
            Ok(oi) => Some(oi),
            Err(e) => {
                log::warn!("{} 미결제약정 조회 실패: {}", symbol, e);
                None
            }
        };

        let funding_rate = match self.rest.get_funding_rate(&symbol).await {
            Ok(rate) => rate,
            Err(e) => {
                log::warn!("{} 펀딩비 조회 실패: {}", symbol, e);
                0.0
            }
        };

        Ok(MarketSnapshot {
            symbol,
            current_price,
            price_change_1h,
            price_change_4h,
            open_interest,
            funding_rate,
            analysis,
        })
    }
}
