mod common_test_utils;
use common_test_utils::*;

use market_analytics::analyzer::comprehensive_analyzer::ComprehensiveAnalyzer;
use market_analytics::feed::{CombinedStreamClient, MarketMonitor, RestClient};
use market_analytics::model::CandleInterval;
use market_analytics::service::AnalysisService;
use std::sync::Arc;

fn offline_service() -> (Arc<MarketMonitor>, AnalysisService) {
    let rest = RestClient::with_base_url("http://127.0.0.1:9").expect("클라이언트 생성");
    let stream = Arc::new(CombinedStreamClient::new());
    let monitor = Arc::new(MarketMonitor::new(rest.clone(), stream));
    let service = AnalysisService::new(Arc::clone(&monitor), rest, ComprehensiveAnalyzer::new());
    (monitor, service)
}

#[tokio::test]
async fn test_analyze_symbol_uses_cached_windows() {
    let (monitor, service) = offline_service();

    monitor
        .seed_klines("BTCUSDT", CandleInterval::Minute3, uptrend_klines(60, 100.0, 0.2))
        .await;
    monitor
        .seed_klines(
            "BTCUSDT",
            CandleInterval::Hour4,
            rising_zigzag_klines(120, 100.0, 1.0),
        )
        .await;

    let result = service.analyze_symbol("btc").await.expect("분석 성공");
    assert_eq!(result.symbol, "BTCUSDT");
    assert!(result.current_price > 0.0);
    assert!(result.dow_theory.is_some());

    // 신호 집합 불변식: 정렬, 상한
    for pair in result.unified_signals.windows(2) {
        assert!(pair[0].confidence >= pair[1].confidence);
    }
}

#[tokio::test]
async fn test_analyze_symbol_fails_without_any_window() {
    let (_monitor, service) = offline_service();
    // 캐시도 REST도 없는 심볼은 오류
    assert!(service.analyze_symbol("DOGEUSDT").await.is_err());
}
