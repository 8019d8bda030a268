mod common_test_utils;
use common_test_utils::*;

use market_analytics::analyzer::fvg_analyzer::{FvgAnalyzer, FvgConfig, FvgStatus, FvgType};
use market_analytics::model::{Kline, SignalAction};

fn wide_gap_config() -> FvgConfig {
    FvgConfig {
        max_gap_percent: 0.15,
        ..FvgConfig::default()
    }
}

/// 3캔들 상승 갭: c0.high=110 < c2.low=120 → 갭 [110, 120]
fn bullish_gap_klines() -> Vec<Kline> {
    vec![
        kline(0, 102.0, 110.0, 100.0, 108.0, 1000.0),
        kline(1, 109.0, 122.0, 108.0, 120.0, 1500.0),
        kline(2, 121.0, 130.0, 120.0, 126.0, 1200.0),
    ]
}

#[test]
fn test_three_candle_bullish_gap_is_fresh() {
    let analyzer = FvgAnalyzer::with_config(wide_gap_config());
    let data = analyzer.analyze(&bullish_gap_klines()).expect("FVG 데이터");

    assert_eq!(data.bullish_fvgs.len(), 1);
    assert!(data.bearish_fvgs.is_empty());

    let gap = &data.bullish_fvgs[0];
    assert_eq!(gap.fvg_type, FvgType::Bullish);
    assert!((gap.lower_bound - 110.0).abs() < 1e-9);
    assert!((gap.upper_bound - 120.0).abs() < 1e-9);
    assert_eq!(gap.status, FvgStatus::Fresh);
    assert_eq!(gap.touch_count, 0);
    assert_eq!(gap.fill_progress, 0.0);
    assert!(gap.strength > 0.0);
    assert!(gap.active);
}

#[test]
fn test_fill_progress_reaches_80_percent_and_fills() {
    let mut klines = bullish_gap_klines();
    // 갭 안쪽 112까지 파고드는 캔들: 침투 8 / 폭 10 = 80%
    klines.push(kline(3, 118.0, 121.0, 112.0, 115.0, 1000.0));

    let analyzer = FvgAnalyzer::with_config(wide_gap_config());
    let data = analyzer.analyze(&klines).expect("FVG 데이터");

    let gap = &data.bullish_fvgs[0];
    assert!((gap.fill_progress - 80.0).abs() < 1e-6, "fill={}", gap.fill_progress);
    // 기본 임계 80%에 도달 → 채움 완료
    assert_eq!(gap.status, FvgStatus::Filled);
    assert!(gap.filled);
    assert!(!gap.active);
    assert!(data.active_fvgs.is_empty());
}

#[test]
fn test_partial_fill_below_threshold() {
    let mut klines = bullish_gap_klines();
    // 침투 6.5 / 폭 10 = 65% → 부분 채움
    klines.push(kline(3, 118.0, 121.0, 113.5, 116.0, 1000.0));

    let analyzer = FvgAnalyzer::with_config(wide_gap_config());
    let data = analyzer.analyze(&klines).expect("FVG 데이터");

    let gap = &data.bullish_fvgs[0];
    assert!((gap.fill_progress - 65.0).abs() < 1e-6);
    assert_eq!(gap.status, FvgStatus::PartialFill);
    assert!(gap.partial_fill);
    assert!(!gap.filled);
    assert!(gap.active);
}

#[test]
fn test_emitted_gaps_satisfy_definition() {
    // 갭이 여럿 생기도록 계단형 상승/하락 혼합 윈도우 구성
    let mut path = Vec::new();
    for i in 0..30usize {
        let f = match i % 6 {
            0 => 100.0,
            1 => 104.0,
            2 => 112.0,
            3 => 110.0,
            4 => 102.0,
            _ => 96.0,
        } + (i / 6) as f64 * 2.0;
        path.push((f + 1.5, f - 1.5));
    }
    let klines = klines_from_path(&path);

    let analyzer = FvgAnalyzer::with_config(wide_gap_config());
    let Some(data) = analyzer.analyze(&klines) else {
        return;
    };

    for gap in &data.bullish_fvgs {
        assert!(
            gap.origin.previous_candle.high < gap.origin.next_candle.low,
            "상승 FVG 정의 위반: {}",
            gap.id
        );
        assert!(gap.upper_bound > gap.lower_bound);
    }
    for gap in &data.bearish_fvgs {
        assert!(
            gap.origin.previous_candle.low > gap.origin.next_candle.high,
            "하락 FVG 정의 위반: {}",
            gap.id
        );
        assert!(gap.upper_bound > gap.lower_bound);
    }
}

#[test]
fn test_reaction_signal_inside_gap() {
    let mut klines = bullish_gap_klines();
    // 가격이 갭 안으로 되돌아온 상태 (종가 116)
    klines.push(kline(3, 119.0, 121.0, 114.0, 116.0, 1000.0));

    let analyzer = FvgAnalyzer::with_config(wide_gap_config());
    let data = analyzer.analyze(&klines).expect("FVG 데이터");
    let now_ms = klines.last().unwrap().close_time;

    let signals = analyzer.generate_signals(&data, 116.0, now_ms);
    let reaction = signals.first().expect("반응 신호");

    assert_eq!(reaction.action, SignalAction::Buy);
    assert!(reaction.stop_loss < reaction.entry);
    assert!(reaction.entry < reaction.take_profit);
    assert!(reaction.risk_reward > 0.0);
    assert!(data.fvg_by_id(&reaction.fvg_id).is_some());
}

#[test]
fn test_too_small_window_returns_none() {
    let analyzer = FvgAnalyzer::new();
    let klines = uptrend_klines(2, 100.0, 1.0);
    assert!(analyzer.analyze(&klines).is_none());
}
