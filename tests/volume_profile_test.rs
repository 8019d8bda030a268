mod common_test_utils;
use common_test_utils::*;

use market_analytics::analyzer::volume_profile_analyzer::VolumeProfileAnalyzer;
use market_analytics::model::Kline;

/// 90~110을 고르게 덮는 캔들 + 100에 고정된 고거래량 캔들
fn spiked_profile_klines() -> Vec<Kline> {
    let mut klines = Vec::new();
    for i in 0..20usize {
        // 전체 범위를 덮는 분산 캔들 (각 30 거래량)
        klines.push(kline(i, 100.0, 110.0, 90.0, 100.0, 30.0));
    }
    for i in 20..30usize {
        // 정확히 100에 고정된 캔들 (각 40 거래량, 총량의 40%)
        klines.push(kline(i, 100.0, 100.0, 100.0, 100.0, 40.0));
    }
    klines
}

#[test]
fn test_poc_has_maximum_volume_percent() {
    let analyzer = VolumeProfileAnalyzer::new();
    let profile = analyzer.analyze(&spiked_profile_klines()).expect("프로파일");

    let poc = profile.poc.as_ref().expect("POC");
    for level in &profile.levels {
        assert!(
            level.volume_percent <= poc.volume_percent + 1e-9,
            "POC보다 큰 빈 발견: {} > {}",
            level.volume_percent,
            poc.volume_percent
        );
    }
    assert!(poc.is_poc);
}

#[test]
fn test_single_spike_becomes_poc_at_100() {
    let analyzer = VolumeProfileAnalyzer::new();
    let profile = analyzer.analyze(&spiked_profile_klines()).expect("프로파일");

    let poc = profile.poc.as_ref().expect("POC");
    assert!((poc.price - 100.0).abs() < 0.06, "poc={}", poc.price);

    // 스파이크 빈 주변으로 가치 영역이 확장되고 집중도 > 1
    assert!(profile.val <= poc.price && poc.price <= profile.vah);
    assert!(profile.value_area.concentration > 1.0);
}

#[test]
fn test_value_area_coverage_and_membership() {
    let analyzer = VolumeProfileAnalyzer::new();
    let profile = analyzer.analyze(&spiked_profile_klines()).expect("프로파일");

    // 커버리지: 영역 누적 거래량 >= 70% (반올림 오차 허용)
    assert!(
        profile.value_area.volume_percent >= 70.0 - 0.5,
        "coverage={}",
        profile.value_area.volume_percent
    );

    // 가치 영역 소속은 정확히 [VAL, VAH] 구간과 일치
    for level in &profile.levels {
        let expected = level.price >= profile.val && level.price <= profile.vah;
        assert_eq!(level.in_value_area, expected, "price={}", level.price);
    }

    // 영역 내 거래량 비율 합이 보고된 커버리지와 일치
    let in_area_percent: f64 = profile
        .levels
        .iter()
        .filter(|l| l.in_value_area)
        .map(|l| l.volume_percent)
        .sum();
    assert!((in_area_percent - profile.value_area.volume_percent).abs() < 0.5);
}

#[test]
fn test_rising_window_has_buy_dominance() {
    let analyzer = VolumeProfileAnalyzer::new();
    let profile = analyzer
        .analyze(&uptrend_klines(60, 100.0, 1.0))
        .expect("프로파일");

    assert!(
        profile.stats.buy_sell_ratio > 1.0,
        "ratio={}",
        profile.stats.buy_sell_ratio
    );
}

#[test]
fn test_falling_window_has_sell_dominance() {
    let analyzer = VolumeProfileAnalyzer::new();
    let profile = analyzer
        .analyze(&downtrend_klines(60, 200.0, 1.0))
        .expect("프로파일");

    assert!(
        profile.stats.buy_sell_ratio < 1.0,
        "ratio={}",
        profile.stats.buy_sell_ratio
    );
}

#[test]
fn test_empty_window_returns_none() {
    let analyzer = VolumeProfileAnalyzer::new();
    let empty: Vec<Kline> = Vec::new();
    assert!(analyzer.analyze(&empty).is_none());
}

#[test]
fn test_signals_reference_window_levels() {
    let analyzer = VolumeProfileAnalyzer::new();
    let klines = spiked_profile_klines();
    let profile = analyzer.analyze(&klines).expect("프로파일");
    let now_ms = klines.last().unwrap().close_time;

    // POC 바로 위 가격: POC 테스트 신호가 나와야 함
    let signals = analyzer.generate_signals(&profile, 100.2, now_ms);
    assert!(!signals.is_empty());
    for signal in &signals {
        assert!(signal.confidence >= 0.0 && signal.confidence <= 100.0);
        assert_eq!(signal.timestamp, now_ms);
    }
}
