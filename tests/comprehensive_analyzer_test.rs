mod common_test_utils;
use common_test_utils::*;

use market_analytics::analyzer::comprehensive_analyzer::ComprehensiveAnalyzer;
use market_analytics::model::{CandleInterval, Kline, SignalAction};

#[test]
fn test_no_candles_is_an_error() {
    let analyzer = ComprehensiveAnalyzer::new();
    let empty: Vec<Kline> = Vec::new();
    let result = analyzer.analyze("BTCUSDT", &empty, &empty, CandleInterval::Hour4);
    assert!(result.is_err());
}

#[test]
fn test_result_bundle_is_complete() {
    let analyzer = ComprehensiveAnalyzer::new();
    let short = uptrend_klines(60, 100.0, 0.2);
    let long = rising_zigzag_klines(120, 100.0, 1.0);

    let result = analyzer
        .analyze("BTCUSDT", &short, &long, CandleInterval::Hour4)
        .expect("분석 성공");

    assert_eq!(result.symbol, "BTCUSDT");
    assert!(result.current_price > 0.0);
    assert!(result.dow_theory.is_some());
    assert!(result.channel_analysis.is_some());
    assert!(result.volume_profile.is_some());
    assert!(result.supply_demand.is_some());
    assert!(result.fair_value_gaps.is_some());
    assert!(result.fibonacci.is_some());

    // 분석 시각은 윈도우 말단에서 파생
    assert_eq!(result.timestamp, long.last().unwrap().close_time);
}

#[test]
fn test_unified_signals_sorted_and_bounded() {
    let analyzer = ComprehensiveAnalyzer::new();
    let short = uptrend_klines(60, 100.0, 0.2);
    let long = rising_zigzag_klines(120, 100.0, 1.0);

    let result = analyzer
        .analyze("ETHUSDT", &short, &long, CandleInterval::Hour4)
        .expect("분석 성공");

    assert!(result.unified_signals.len() <= analyzer.config().max_signals);
    for pair in result.unified_signals.windows(2) {
        assert!(pair[0].confidence >= pair[1].confidence);
    }

    for signal in &result.unified_signals {
        assert!(signal.confidence >= analyzer.config().min_confidence);
        assert!(!signal.sources.is_empty());

        // 진입 신호는 보호선 순서와 최소 손익비를 만족
        match signal.action {
            SignalAction::Buy => {
                assert!(signal.stop_loss < signal.entry);
                assert!(signal.entry < signal.take_profit);
                assert!(signal.risk_reward >= analyzer.config().min_risk_reward);
            }
            SignalAction::Sell => {
                assert!(signal.take_profit < signal.entry);
                assert!(signal.entry < signal.stop_loss);
                assert!(signal.risk_reward >= analyzer.config().min_risk_reward);
            }
            _ => {}
        }
    }
}

#[test]
fn test_market_structure_includes_volume_profile_levels() {
    let analyzer = ComprehensiveAnalyzer::new();
    let short = uptrend_klines(60, 100.0, 0.2);
    let long = rising_zigzag_klines(120, 100.0, 1.0);

    let result = analyzer
        .analyze("BTCUSDT", &short, &long, CandleInterval::Hour4)
        .expect("분석 성공");

    let structure = &result.market_structure;
    let summary = structure.volume_profile.as_ref().expect("VP 요약");
    assert!(summary.vah >= summary.val);

    // POC/VAH/VAL 관건 가격이 포함됨
    use market_analytics::analyzer::comprehensive_analyzer::KeyLevelSource;
    let sources: Vec<KeyLevelSource> = structure.key_levels.iter().map(|l| l.source).collect();
    assert!(sources.contains(&KeyLevelSource::VpPoc));
    assert!(sources.contains(&KeyLevelSource::VpVah));
    assert!(sources.contains(&KeyLevelSource::VpVal));
}

#[test]
fn test_risk_assessment_fractions_in_range() {
    let analyzer = ComprehensiveAnalyzer::new();
    let short = uptrend_klines(60, 100.0, 0.2);
    let long = sideways_klines(120, 100.0, 4.0);

    let result = analyzer
        .analyze("BTCUSDT", &short, &long, CandleInterval::Hour4)
        .expect("분석 성공");

    let risk = &result.risk_assessment;
    assert!(risk.recommended_risk > 0.0 && risk.recommended_risk <= 1.0);
    assert!(risk.max_position_fraction > 0.0 && risk.max_position_fraction <= 1.0);
    assert!(risk.recommended_risk <= risk.max_position_fraction);
}

#[test]
fn test_trading_advice_follows_top_signal() {
    let analyzer = ComprehensiveAnalyzer::new();
    let short = uptrend_klines(60, 100.0, 0.2);
    let long = rising_zigzag_klines(120, 100.0, 1.0);

    let result = analyzer
        .analyze("BTCUSDT", &short, &long, CandleInterval::Hour4)
        .expect("분석 성공");

    let advice = &result.trading_advice;
    match result.unified_signals.first() {
        Some(primary) => {
            assert_eq!(advice.overall_action, primary.action);
            assert!(!advice.reasoning_points.is_empty());
        }
        None => {
            assert_eq!(advice.overall_action, SignalAction::Hold);
        }
    }
}

#[test]
fn test_disabled_analyzers_leave_slots_empty() {
    use market_analytics::analyzer::comprehensive_analyzer::ComprehensiveConfig;

    let config = ComprehensiveConfig {
        enable_fvg: false,
        enable_fibonacci: false,
        ..ComprehensiveConfig::default()
    };
    let analyzer = ComprehensiveAnalyzer::with_config(config);

    let short = uptrend_klines(60, 100.0, 0.2);
    let long = rising_zigzag_klines(120, 100.0, 1.0);
    let result = analyzer
        .analyze("BTCUSDT", &short, &long, CandleInterval::Hour4)
        .expect("분석 성공");

    assert!(result.fair_value_gaps.is_none());
    assert!(result.fibonacci.is_none());
    // 나머지 분석기는 그대로 수행
    assert!(result.dow_theory.is_some());
    assert!(result.volume_profile.is_some());
}
