mod common_test_utils;
use common_test_utils::*;

use market_analytics::analyzer::base::{SwingType, TrendLineType};
use market_analytics::analyzer::dow_analyzer::{DowAnalyzer, DowConfig};
use market_analytics::model::{Candle, Kline, SignalAction, TrendDirection};

/// 피크/밸리가 뚜렷한 W자형 윈도우 (스윙 저점 10, 20 / 고점 15, 26)
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

fn permissive_config() -> DowConfig {
    let mut config = DowConfig::default();
    config.swing.min_strength = 0.0;
    config
}

#[test]
fn test_insufficient_data_returns_hold_with_zero_confidence() {
    let analyzer = DowAnalyzer::new();
    let short = uptrend_klines(5, 100.0, 0.1);
    let long = uptrend_klines(5, 100.0, 1.0);

    let data = analyzer.analyze(&short, &long, 104.0);

    assert!(data.swing_points.is_empty());
    assert!(data.trend_lines.is_empty());
    assert!(data.channel.is_none());
    assert!(data.trend_strength.is_none());

    let signal = data.trading_signal.expect("홀드 신호가 있어야 함");
    assert_eq!(signal.action, SignalAction::Hold);
    assert_eq!(signal.confidence, 0.0);
}

#[test]
fn test_rising_window_reports_uptrend() {
    let analyzer = DowAnalyzer::new();
    let short = uptrend_klines(60, 100.0, 0.2);
    let long = rising_zigzag_klines(120, 100.0, 1.0);
    let current_price = long.last().unwrap().close_price();

    let data = analyzer.analyze(&short, &long, current_price);

    let strength = data.trend_strength.expect("추세 강도가 있어야 함");
    assert_eq!(strength.direction, TrendDirection::Up);
    assert!(strength.momentum > 0.0);
    assert!(strength.consistency > 50.0, "consistency={}", strength.consistency);

    // 스윙 저점들을 잇는 지지 추세선이 최소 하나 존재
    assert!(data
        .trend_lines
        .iter()
        .any(|line| line.line_type == TrendLineType::Support));

    let signal = data.trading_signal.expect("신호가 있어야 함");
    if signal.action.is_entry() {
        assert!(signal.risk_reward > 0.0);
    }
}

#[test]
fn test_w_shape_confirms_swing_lows_and_resistance_line() {
    let analyzer = DowAnalyzer::with_config(permissive_config());
    let long = w_shape_klines();

    let swings = analyzer.identify_swing_points(&long);

    let confirmed_lows: Vec<_> = swings
        .iter()
        .filter(|p| p.swing_type == SwingType::Low && p.confirmed)
        .collect();
    assert!(confirmed_lows.len() >= 2, "확정 스윙 저점 {}개", confirmed_lows.len());
    assert!(confirmed_lows.iter().any(|p| p.index == 10));
    assert!(confirmed_lows.iter().any(|p| p.index == 20));

    let lines = analyzer.calculate_trend_lines(&long, &swings);
    assert!(lines
        .iter()
        .any(|line| line.line_type == TrendLineType::Resistance));
}

#[test]
fn test_swing_symmetry_under_price_mirror() {
    let analyzer = DowAnalyzer::with_config(permissive_config());
    let original = w_shape_klines();

    // 가격 축 반사: high' = K - low, low' = K - high
    let mirror_axis = 300.0;
    let mirrored: Vec<Kline> = original
        .iter()
        .map(|c| Kline {
            open: mirror_axis - c.open,
            high: mirror_axis - c.low,
            low: mirror_axis - c.high,
            close: mirror_axis - c.close,
            ..c.clone()
        })
        .collect();

    let original_swings = analyzer.identify_swing_points(&original);
    let mirrored_swings = analyzer.identify_swing_points(&mirrored);

    let original_high_indices: Vec<usize> = original_swings
        .iter()
        .filter(|p| p.swing_type == SwingType::High)
        .map(|p| p.index)
        .collect();
    let mirrored_low_indices: Vec<usize> = mirrored_swings
        .iter()
        .filter(|p| p.swing_type == SwingType::Low)
        .map(|p| p.index)
        .collect();

    assert_eq!(original_high_indices, mirrored_low_indices);

    let original_low_indices: Vec<usize> = original_swings
        .iter()
        .filter(|p| p.swing_type == SwingType::Low)
        .map(|p| p.index)
        .collect();
    let mirrored_high_indices: Vec<usize> = mirrored_swings
        .iter()
        .filter(|p| p.swing_type == SwingType::High)
        .map(|p| p.index)
        .collect();

    assert_eq!(original_low_indices, mirrored_high_indices);
}

#[test]
fn test_trading_signal_risk_reward_ordering() {
    let analyzer = DowAnalyzer::new();
    let short = uptrend_klines(60, 100.0, 0.2);
    let long = rising_zigzag_klines(120, 100.0, 1.0);
    let current_price = long.last().unwrap().close_price();

    let data = analyzer.analyze(&short, &long, current_price);
    let signal = data.trading_signal.expect("신호가 있어야 함");

    match signal.action {
        SignalAction::Buy => {
            assert!(signal.stop_loss < signal.entry);
            assert!(signal.entry < signal.take_profit);
        }
        SignalAction::Sell => {
            assert!(signal.take_profit < signal.entry);
            assert!(signal.entry < signal.stop_loss);
        }
        _ => {}
    }
}
