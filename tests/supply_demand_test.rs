mod common_test_utils;
use common_test_utils::*;

use market_analytics::analyzer::supply_demand_analyzer::{
    PatternType, SupplyDemandAnalyzer, ZoneStatus, ZoneType,
};
use market_analytics::model::{Candle, Kline, SignalAction};

/// 상승 임펄스 → 베이스 → 하락 임펄스 (rally-base-drop 공급 구역)
///
/// 패턴이 윈도우 말미에 위치해 시간 만료에 걸리지 않습니다.
fn rally_base_drop_klines() -> Vec<Kline> {
    let mut path = Vec::new();
    for i in 0..40usize {
        let f = if i < 23 {
            95.0
        } else if i <= 27 {
            95.0 + (i - 22) as f64 // 96 → 100 상승 임펄스
        } else if i <= 34 {
            100.0 // 베이스
        } else {
            100.0 - (i - 34) as f64 // 99 → 95 하락 임펄스
        };
        let spread = if (23..=34).contains(&i) { 0.5 } else { 0.4 };
        path.push((f + spread, f - spread));
    }
    klines_from_path(&path)
}

#[test]
fn test_rally_base_drop_creates_supply_zone() {
    let analyzer = SupplyDemandAnalyzer::new();
    let data = analyzer.analyze(&rally_base_drop_klines());

    let zone = data
        .supply_zones
        .iter()
        .find(|z| z.origin.pattern == PatternType::RallyBaseDropOb)
        .expect("rally-base-drop 공급 구역이 있어야 함");

    assert_eq!(zone.zone_type, ZoneType::Supply);
    assert!(zone.upper_bound > zone.lower_bound);
    assert!(zone.lower_bound > 99.0 && zone.upper_bound < 101.0);
    assert!(zone.origin.confirmation);
    assert!(zone.strength > 0.0);
    assert_ne!(zone.status, ZoneStatus::Expired);
    assert_ne!(zone.status, ZoneStatus::Broken);
}

#[test]
fn test_retained_zones_do_not_overlap() {
    let analyzer = SupplyDemandAnalyzer::new();
    let data = analyzer.analyze(&rally_base_drop_klines());

    let all_zones: Vec<_> = data
        .supply_zones
        .iter()
        .chain(data.demand_zones.iter())
        .collect();

    for (i, zone1) in all_zones.iter().enumerate() {
        assert!(zone1.upper_bound > zone1.lower_bound, "{}", zone1.id);
        for zone2 in all_zones.iter().skip(i + 1) {
            let separated =
                zone1.upper_bound < zone2.lower_bound || zone2.upper_bound < zone1.lower_bound;
            assert!(separated, "{}와 {}가 겹침", zone1.id, zone2.id);
        }
    }
}

#[test]
fn test_monotonic_rise_has_no_supply_zones() {
    let analyzer = SupplyDemandAnalyzer::new();
    let data = analyzer.analyze(&rising_zigzag_klines(120, 100.0, 1.0));

    assert!(
        data.supply_zones.is_empty(),
        "상승 윈도우에 공급 구역이 없어야 함: {:?}",
        data.supply_zones.iter().map(|z| &z.id).collect::<Vec<_>>()
    );
}

#[test]
fn test_zone_breaks_when_price_clears_it() {
    let mut klines = rally_base_drop_klines();
    // 구역 상단(1% 임계)을 넘는 강한 상승 마감
    let last_index = klines.len();
    for i in 0..3usize {
        klines.push(kline(last_index + i, 102.0, 104.0, 101.5, 103.0, 1000.0));
    }

    let analyzer = SupplyDemandAnalyzer::new();
    let data = analyzer.analyze(&klines);

    if let Some(zone) = data
        .supply_zones
        .iter()
        .find(|z| z.origin.pattern == PatternType::RallyBaseDropOb)
    {
        assert_eq!(zone.status, ZoneStatus::Broken);
        assert!(zone.broken);
        assert!(!zone.active);
    }
}

#[test]
fn test_bounce_signal_inside_supply_zone() {
    let analyzer = SupplyDemandAnalyzer::new();
    let klines = rally_base_drop_klines();
    let data = analyzer.analyze(&klines);
    let now_ms = klines.last().unwrap().close_time();

    let zone = data
        .active_zones
        .iter()
        .find(|z| z.zone_type == ZoneType::Supply)
        .expect("활성 공급 구역");

    let inside_price = zone.center_price;
    let signals = analyzer.generate_signals(&data, inside_price, now_ms);

    let bounce = signals
        .iter()
        .find(|s| s.zone_id == zone.id)
        .expect("구역 반등 신호");
    assert_eq!(bounce.action, SignalAction::Sell);
    assert!(bounce.risk_reward > 0.0);
    assert!(bounce.confidence > 0.0);

    // 신뢰도 내림차순 정렬
    for pair in signals.windows(2) {
        assert!(pair[0].confidence >= pair[1].confidence);
    }
}

#[test]
fn test_fresh_zone_width_is_never_zero() {
    // 급락 + 거래량 급증으로 프레시 공급 구역 유도
    let mut path = Vec::new();
    for i in 0..30usize {
        let f = if i < 20 { 100.0 } else { 100.0 - (i - 19) as f64 * 1.2 };
        path.push((f + 0.3, f - 0.3));
    }
    let mut klines = klines_from_path(&path);
    for kline in klines.iter_mut().skip(20) {
        kline.volume = 5000.0; // 평균 대비 급증
    }

    let analyzer = SupplyDemandAnalyzer::new();
    let data = analyzer.analyze(&klines);

    for zone in data.supply_zones.iter().chain(data.demand_zones.iter()) {
        assert!(
            zone.width >= analyzer.config().min_zone_width,
            "{} 폭 {}",
            zone.id,
            zone.width
        );
    }
}
