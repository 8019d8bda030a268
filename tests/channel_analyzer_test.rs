mod common_test_utils;
use common_test_utils::*;

use market_analytics::analyzer::channel_analyzer::ChannelAnalyzer;
use market_analytics::model::Candle;

#[test]
fn test_short_window_reports_reason() {
    let analyzer = ChannelAnalyzer::new();
    let klines = uptrend_klines(20, 100.0, 1.0);

    let data = analyzer.analyze(&klines, klines.last().unwrap().close_price());
    assert!(data.active_channel.is_none());
    assert!(!data.analysis.is_empty());
}

#[test]
fn test_one_sided_swings_cannot_form_channel() {
    let analyzer = ChannelAnalyzer::new();
    // 스윙 저점만 있는 상승 윈도우: 지지선만 생기고 채널은 불가
    let klines = rising_zigzag_klines(120, 100.0, 1.0);

    let data = analyzer.analyze(&klines, klines.last().unwrap().close_price());
    assert!(data.active_channel.is_none());
    assert!(!data.analysis.is_empty());
}

#[test]
fn test_accepted_channel_meets_quality_threshold() {
    let analyzer = ChannelAnalyzer::new();
    // 진폭이 큰 규칙적 파동: 고점/저점 스윙이 모두 생기는 윈도우
    let mut path = Vec::new();
    for i in 0..300usize {
        let phase = (i % 24) as f64 / 24.0 * std::f64::consts::TAU;
        let f = 100.0 + 4.0 * phase.sin() + i as f64 * 0.02;
        path.push((f + 0.3, f - 0.3));
    }
    let klines = klines_from_path(&path);

    let data = analyzer.analyze(&klines, klines.last().unwrap().close_price());

    if let Some(channel) = &data.active_channel {
        assert!(channel.quality >= analyzer.config().quality_threshold);
        assert!(channel.width >= analyzer.config().min_channel_width);
        assert!(channel.width <= analyzer.config().max_channel_width);
        assert!(data.current_position.is_some());
        assert!((0.0..=1.0).contains(&data.price_ratio));
    } else {
        // 채널이 없으면 사유가 기록되어야 함
        assert!(!data.analysis.is_empty());
    }
}
