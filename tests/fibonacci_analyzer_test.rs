mod common_test_utils;
use common_test_utils::*;

use market_analytics::analyzer::fibonacci_analyzer::{FibLevelKind, FibonacciAnalyzer};
use market_analytics::model::{Kline, TrendDirection};

/// 스윙 저점 10/20, 고점 15/26을 갖는 W자형 윈도우
fn w_shape_klines() -> Vec<Kline> {
    let mut path = Vec::new();
    for i in 0..40usize {
        let f = if i <= 10 {
            120.0 - 2.0 * i as f64
        } else if i <= 15 {
            100.0 + 2.2 * (i - 10) as f64
        } else if i <= 20 {
            111.0 - 1.9 * (i - 15) as f64
        } else if i <= 26 {
            101.5 + 2.5 * (i - 20) as f64
        } else if i <= 32 {
            116.5 - 1.0 * (i - 26) as f64
        } else {
            110.5 + 0.5 * (i - 32) as f64
        };
        path.push((f + 1.0, f - 1.0));
    }
    klines_from_path(&path)
}

#[test]
fn test_small_window_returns_empty_data() {
    let analyzer = FibonacciAnalyzer::new();
    let data = analyzer.analyze(&uptrend_klines(5, 100.0, 1.0));
    assert!(data.retracements.is_empty());
    assert!(data.golden_pocket.is_none());
}

#[test]
fn test_bullish_retracement_between_second_low_and_next_high() {
    let analyzer = FibonacciAnalyzer::new();
    let data = analyzer.analyze(&w_shape_klines());

    let retracement = data
        .retracements
        .iter()
        .find(|r| r.start_point.index == 20 && r.end_point.index == 26)
        .expect("저점 20 → 고점 26 되돌림이 있어야 함");

    assert_eq!(retracement.trend, TrendDirection::Up);
    assert!(retracement.active);
    assert_eq!(retracement.levels.len(), analyzer.config().ratios.len());
    assert!(retracement.strength > 0.0);
}

#[test]
fn test_golden_ratio_flag_matches_ratio_set() {
    let analyzer = FibonacciAnalyzer::new();
    let data = analyzer.analyze(&w_shape_klines());

    for retracement in &data.retracements {
        for level in &retracement.levels {
            let expected = (level.ratio - 0.618).abs() < 1e-9 || (level.ratio - 0.382).abs() < 1e-9;
            assert_eq!(
                level.is_golden_ratio, expected,
                "ratio {} 골든 플래그 불일치",
                level.ratio
            );
            assert_eq!(level.kind, FibLevelKind::Retracement);
        }
    }
}

#[test]
fn test_retracement_levels_project_towards_start() {
    let analyzer = FibonacciAnalyzer::new();
    let data = analyzer.analyze(&w_shape_klines());

    let retracement = data
        .retracements
        .iter()
        .find(|r| r.start_point.index == 20 && r.end_point.index == 26)
        .expect("되돌림");

    // 상승 되돌림: 비율이 커질수록 레벨 가격은 끝점에서 시작점 쪽으로 내려감
    let price_618 = retracement
        .levels
        .iter()
        .find(|l| (l.ratio - 0.618).abs() < 1e-9)
        .map(|l| l.price)
        .expect("0.618 레벨");
    let price_382 = retracement
        .levels
        .iter()
        .find(|l| (l.ratio - 0.382).abs() < 1e-9)
        .map(|l| l.price)
        .expect("0.382 레벨");

    assert!(price_618 < price_382);
    assert!(price_618 < retracement.end_point.price);
    assert!(price_618 > retracement.start_point.price - 1e-9);
}

#[test]
fn test_extensions_built_from_swing_triples() {
    let analyzer = FibonacciAnalyzer::new();
    let data = analyzer.analyze(&w_shape_klines());

    assert!(!data.extensions.is_empty());
    for extension in &data.extensions {
        assert_eq!(extension.levels.len(), 4);
        for level in &extension.levels {
            assert_eq!(level.kind, FibLevelKind::Extension);
        }
        assert!(extension.confidence > 0.0 && extension.confidence <= 1.0);
    }
}

#[test]
fn test_golden_pocket_range_is_valid() {
    let analyzer = FibonacciAnalyzer::new();
    let data = analyzer.analyze(&w_shape_klines());

    let pocket = data.golden_pocket.expect("골든 포켓");
    assert!(pocket.price_range.low < pocket.price_range.high);
    assert!(
        (pocket.center_price - (pocket.price_range.low + pocket.price_range.high) / 2.0).abs()
            < 1e-9
    );
    assert!(pocket.strength >= 0.0 && pocket.strength <= 100.0);
}

#[test]
fn test_clusters_group_at_least_two_levels() {
    let analyzer = FibonacciAnalyzer::new();
    let data = analyzer.analyze(&w_shape_klines());

    for cluster in &data.clusters {
        assert!(cluster.level_count >= 2);
        assert_eq!(cluster.sources.len(), cluster.level_count);
        assert!(cluster.price_range.low <= cluster.center_price);
        assert!(cluster.center_price <= cluster.price_range.high);
        assert!(cluster.importance <= 100.0);
    }
}

#[test]
fn test_statistics_count_active_retracements() {
    let analyzer = FibonacciAnalyzer::new();
    let data = analyzer.analyze(&w_shape_klines());

    assert_eq!(data.statistics.total_retracements, data.retracements.len());
    let active = data.retracements.iter().filter(|r| r.active).count();
    assert_eq!(data.statistics.active_retracements, active);
}
