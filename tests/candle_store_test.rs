mod common_test_utils;
use common_test_utils::*;

use market_analytics::candle_store::CandleStore;
use market_analytics::model::Kline;

#[test]
fn test_window_stays_strictly_monotonic() {
    let mut store: CandleStore<Kline> = CandleStore::new(Vec::new(), 100);

    // 순서가 섞인 스트림 업데이트
    for index in [5usize, 1, 9, 3, 3, 7, 9, 2, 8] {
        store.merge(kline(index, 100.0, 101.0, 99.0, 100.0, 10.0));
    }

    let times: Vec<i64> = store.items().iter().map(|c| c.open_time).collect();
    for pair in times.windows(2) {
        assert!(pair[0] < pair[1], "open_time이 엄격히 증가해야 함: {:?}", times);
    }
}

#[test]
fn test_window_never_exceeds_capacity() {
    let mut store: CandleStore<Kline> = CandleStore::new(Vec::new(), 10);
    for index in 0..50usize {
        store.merge(kline(index, 100.0, 101.0, 99.0, 100.0, 10.0));
        assert!(store.len() <= 10);
    }
    assert_eq!(store.len(), 10);
    // 가장 오래된 캔들부터 제거됨
    assert_eq!(store.oldest().unwrap().open_time, 40 * BAR_MS);
}

#[test]
fn test_merge_same_candle_twice_is_noop() {
    let mut store = CandleStore::new(uptrend_klines(20, 100.0, 1.0), 50);
    let update = kline(19, 118.0, 121.0, 117.0, 120.5, 55.0);

    store.merge(update.clone());
    let after_first = store.snapshot();

    store.merge(update);
    assert_eq!(store.snapshot(), after_first);
}

#[test]
fn test_in_progress_tail_is_overwritten() {
    let mut store = CandleStore::new(uptrend_klines(20, 100.0, 1.0), 50);
    let tail_time = store.latest().unwrap().open_time;

    let mut update = kline(19, 118.0, 125.0, 117.0, 124.0, 99.0);
    update.open_time = tail_time;

    store.merge(update);
    assert_eq!(store.len(), 20);
    assert_eq!(store.latest().unwrap().close, 124.0);
    assert_eq!(store.latest_price(), Some(124.0));
}
