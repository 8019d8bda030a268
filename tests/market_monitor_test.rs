mod common_test_utils;
use common_test_utils::*;

use market_analytics::feed::{CombinedStreamClient, MarketMonitor, RestClient};
use market_analytics::model::CandleInterval;
use std::sync::Arc;

fn offline_monitor() -> Arc<MarketMonitor> {
    // 닫힌 포트로 향하는 REST: 캐시 미스 시 빠르게 실패
    let rest = RestClient::with_base_url("http://127.0.0.1:9").expect("클라이언트 생성");
    let stream = Arc::new(CombinedStreamClient::new());
    Arc::new(MarketMonitor::new(rest, stream))
}

#[tokio::test]
async fn test_cache_hit_returns_seeded_window() {
    let monitor = offline_monitor();
    monitor
        .seed_klines("btc", CandleInterval::Minute3, uptrend_klines(300, 100.0, 0.1))
        .await;

    // 심볼 정규화: btc → BTCUSDT
    let snapshot = monitor
        .get_current_klines("btc", CandleInterval::Minute3)
        .await
        .expect("캐시 적중");

    assert_eq!(snapshot.len(), 300);
    for pair in snapshot.windows(2) {
        assert!(pair[0].open_time < pair[1].open_time);
    }
}

#[tokio::test]
async fn test_cache_miss_without_rest_fails() {
    let monitor = offline_monitor();
    let result = monitor
        .get_current_klines("SOLUSDT", CandleInterval::Hour1)
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_stream_update_overwrites_in_progress_candle() {
    let monitor = offline_monitor();
    monitor
        .seed_klines("BTCUSDT", CandleInterval::Minute3, uptrend_klines(50, 100.0, 0.1))
        .await;

    let before = monitor
        .peek_klines("BTCUSDT", CandleInterval::Minute3)
        .await
        .expect("윈도우");
    let tail = before.last().unwrap().clone();

    // 같은 시작 시각의 업데이트는 말단 캔들을 교체
    let mut update = tail.clone();
    update.close = tail.close + 5.0;
    update.high = update.high.max(update.close);
    monitor
        .process_kline_update("BTCUSDT", CandleInterval::Minute3, update)
        .await;

    let after = monitor
        .peek_klines("BTCUSDT", CandleInterval::Minute3)
        .await
        .expect("윈도우");
    assert_eq!(after.len(), before.len());
    assert_eq!(after.last().unwrap().close, tail.close + 5.0);
}

#[tokio::test]
async fn test_new_candle_appends_and_respects_capacity() {
    let monitor = offline_monitor();
    monitor
        .seed_klines("BTCUSDT", CandleInterval::Minute3, uptrend_klines(300, 100.0, 0.1))
        .await;

    let before = monitor
        .peek_klines("BTCUSDT", CandleInterval::Minute3)
        .await
        .expect("윈도우");
    let tail_time = before.last().unwrap().open_time;
    let oldest_time = before.first().unwrap().open_time;

    let mut next = before.last().unwrap().clone();
    next.open_time = tail_time + BAR_MS;
    next.close_time = next.open_time + BAR_MS - 1;
    monitor
        .process_kline_update("BTCUSDT", CandleInterval::Minute3, next)
        .await;

    let after = monitor
        .peek_klines("BTCUSDT", CandleInterval::Minute3)
        .await
        .expect("윈도우");

    // 용량 유지: 새 캔들이 붙고 가장 오래된 캔들이 제거됨
    assert_eq!(after.len(), 300);
    assert_eq!(after.last().unwrap().open_time, tail_time + BAR_MS);
    assert!(after.first().unwrap().open_time > oldest_time);
}

#[tokio::test]
async fn test_intervals_are_independent() {
    let monitor = offline_monitor();
    monitor
        .seed_klines("BTCUSDT", CandleInterval::Minute3, uptrend_klines(10, 100.0, 0.1))
        .await;

    assert!(monitor
        .peek_klines("BTCUSDT", CandleInterval::Minute3)
        .await
        .is_some());
    assert!(monitor
        .peek_klines("BTCUSDT", CandleInterval::Hour4)
        .await
        .is_none());
}
