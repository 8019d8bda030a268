use crate::model::{Candle, SignalAction};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// 공급/수요 구역 분석 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SdConfig {
    /// 임펄스 최소 비율 (5캔들 누적)
    pub min_impulse_percent: f64,
    /// 베이스 최소 범위 비율
    pub min_base_percent: f64,
    /// 베이스 최대 범위 비율
    pub max_base_percent: f64,
    /// 프레시 구역 거래량 배수
    pub min_volume_factor: f64,
    /// 구역 최대 수명 (시간)
    pub max_zone_age_hours: i64,
    /// 약화 판정 터치 수
    pub max_touch_count: usize,
    /// 돌파 판정 비율
    pub breakout_threshold: f64,
    /// 반응 확인 캔들 수
    pub confirmation_bars: usize,
    /// 반응 검증 사용 여부
    pub enable_validation: bool,
    /// 활성 구역 채택 기준 (0~1, 강도 100 기준으로 환산)
    pub quality_threshold: f64,
    /// 구역 최소 폭 (프레시 구역의 0폭 방지, 1틱)
    pub min_zone_width: f64,
}

impl Default for SdConfig {
    fn default() -> SdConfig {
        SdConfig {
            min_impulse_percent: 0.02,
            min_base_percent: 0.005,
            max_base_percent: 0.03,
            min_volume_factor: 1.5,
            max_zone_age_hours: 50,
            max_touch_count: 3,
            breakout_threshold: 0.01,
            confirmation_bars: 2,
            enable_validation: true,
            quality_threshold: 0.6,
            min_zone_width: 0.01,
        }
    }
}

impl SdConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.min_impulse_percent <= 0.0 {
            return Err("min_impulse_percent는 양수여야 합니다".to_string());
        }
        if self.min_base_percent >= self.max_base_percent {
            return Err("베이스 범위 설정이 올바르지 않습니다".to_string());
        }
        if self.min_zone_width <= 0.0 {
            return Err("min_zone_width는 양수여야 합니다".to_string());
        }
        Ok(())
    }
}

/// 구역 유형
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneType {
    Supply,
    Demand,
}

/// 구역 기원 패턴
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    /// 하락-베이스-하락 (공급)
    DropBaseDrop,
    /// 상승-베이스-상승 (수요)
    RallyBaseRally,
    /// 상승-베이스-하락 (오더 블록, 공급)
    RallyBaseDropOb,
    /// 하락-베이스-상승 (오더 블록, 수요)
    DropBaseRallyOb,
    FreshSupply,
    FreshDemand,
}

/// 구역 품질 등급
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneQuality {
    Strong,
    Good,
    Moderate,
    Weak,
}

/// 구역 상태 (fresh → tested → weakened → broken|expired 단방향)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneStatus {
    Fresh,
    Tested,
    Weakened,
    Broken,
    Expired,
}

/// 테스트 후 가격 행동 분류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceAction {
    StrongBullish,
    Bullish,
    Sideways,
    Bearish,
    StrongBearish,
    Unknown,
}

/// 구역 기원 정보
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneOrigin {
    /// 기원 캔들 인덱스 (패턴 중심)
    pub kline_index: usize,
    pub pattern: PatternType,
    /// 임펄스 이동 비율
    pub impulse_move: f64,
    pub impulse_volume: f64,
    /// 양측 임펄스가 검증된 패턴인지 여부
    pub confirmation: bool,
}

/// 구역 내부 거래량 분포
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZoneVolumeProfile {
    pub total_volume: f64,
    pub buy_volume: f64,
    pub sell_volume: f64,
    pub volume_at_origin: f64,
    /// 매수/매도 비율
    pub volume_imbalance: f64,
}

/// 구역 반응 검증 정보
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneValidation {
    pub has_reaction: bool,
    pub reaction_strength: f64,
    pub time_in_zone: i64,
    pub volume_at_test: f64,
    pub price_action: PriceAction,
}

impl ZoneValidation {
    fn none() -> ZoneValidation {
        ZoneValidation {
            has_reaction: false,
            reaction_strength: 0.0,
            time_in_zone: 0,
            volume_at_test: 0.0,
            price_action: PriceAction::Unknown,
        }
    }
}

/// 공급/수요 구역
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplyDemandZone {
    pub id: String,
    pub zone_type: ZoneType,
    pub upper_bound: f64,
    pub lower_bound: f64,
    pub center_price: f64,
    pub width: f64,
    /// 하단 대비 폭 비율 [0,100]
    pub width_percent: f64,
    pub origin: ZoneOrigin,
    /// 강도 [0,100]
    pub strength: f64,
    pub quality: ZoneQuality,
    pub status: ZoneStatus,
    pub touch_count: usize,
    pub last_touch: i64,
    pub creation_time: i64,
    pub volume: f64,
    pub volume_profile: ZoneVolumeProfile,
    pub validation: Option<ZoneValidation>,
    pub active: bool,
    pub broken: bool,
    pub break_time: i64,
}

impl SupplyDemandZone {
    /// 가격 구간이 이 구역과 겹치는지 확인
    pub fn intersects_range(&self, high: f64, low: f64) -> bool {
        !(high < self.lower_bound || low > self.upper_bound)
    }

    /// 가격이 구역 내부에 있는지 확인
    pub fn contains(&self, price: f64) -> bool {
        price >= self.lower_bound && price <= self.upper_bound
    }

    fn overlaps(&self, other: &SupplyDemandZone) -> bool {
        !(self.upper_bound < other.lower_bound || other.upper_bound < self.lower_bound)
    }
}

/// 구역 집계 통계
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SdStatistics {
    pub total_supply_zones: usize,
    pub total_demand_zones: usize,
    pub active_supply_zones: usize,
    pub active_demand_zones: usize,
    pub avg_zone_strength: f64,
    pub avg_zone_width: f64,
    /// 반응이 확인된 구역 비율 [0,100]
    pub success_rate: f64,
    pub breakout_rate: f64,
    pub reaction_rate: f64,
}

/// 공급/수요 분석 결과
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplyDemandData {
    pub supply_zones: Vec<SupplyDemandZone>,
    pub demand_zones: Vec<SupplyDemandZone>,
    pub active_zones: Vec<SupplyDemandZone>,
    pub statistics: SdStatistics,
    /// 분석 기준 시각 (윈도우 마지막 캔들 종료 시각)
    pub last_analysis: i64,
}

impl SupplyDemandData {
    /// id로 구역을 찾습니다 (신호의 zone_id 역참조용).
    pub fn zone_by_id(&self, id: &str) -> Option<&SupplyDemandZone> {
        self.supply_zones
            .iter()
            .chain(self.demand_zones.iter())
            .find(|z| z.id == id)
    }
}

/// 공급/수요 신호 유형
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SdSignalKind {
    ZoneEntry,
    ZoneBounce,
    ZoneBreakout,
    ZoneRetest,
    FreshZone,
}

/// 공급/수요 신호 (구역은 id로 참조)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SdSignal {
    pub kind: SdSignalKind,
    pub zone_id: String,
    pub current_price: f64,
    pub action: SignalAction,
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub risk_reward: f64,
    pub confidence: f64,
    pub strength: f64,
    pub description: String,
    pub timestamp: i64,
}

/// 공급/수요 구역 분석기
#[derive(Debug, Clone)]
pub struct SupplyDemandAnalyzer {
    config: SdConfig,
}

impl Display for SupplyDemandAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SupplyDemandAnalyzer {{ impulse: {}, breakout: {} }}",
            self.config.min_impulse_percent, self.config.breakout_threshold
        )
    }
}

impl SupplyDemandAnalyzer {
    pub fn new() -> SupplyDemandAnalyzer {
        SupplyDemandAnalyzer {
            config: SdConfig::default(),
        }
    }

    pub fn with_config(config: SdConfig) -> SupplyDemandAnalyzer {
        SupplyDemandAnalyzer { config }
    }

    pub fn config(&self) -> &SdConfig {
        &self.config
    }

    /// 윈도우에서 공급/수요 구역을 식별하고 수명 주기를 갱신합니다.
    pub fn analyze<C: Candle>(&self, candles: &[C]) -> SupplyDemandData {
        let last_analysis = candles.last().map(|c| c.close_time()).unwrap_or(0);

        if candles.len() < 10 {
            return SupplyDemandData {
                supply_zones: Vec::new(),
                demand_zones: Vec::new(),
                active_zones: Vec::new(),
                statistics: SdStatistics::default(),
                last_analysis,
            };
        }

        let mut zones = Vec::new();
        for i in 5..candles.len() - 5 {
            if let Some(zone) = self.identify_pattern_zone(candles, i, PatternType::DropBaseDrop) {
                zones.push(zone);
            }
            if let Some(zone) = self.identify_pattern_zone(candles, i, PatternType::RallyBaseRally) {
                zones.push(zone);
            }
            if let Some(zone) = self.identify_pattern_zone(candles, i, PatternType::RallyBaseDropOb)
            {
                zones.push(zone);
            }
            if let Some(zone) = self.identify_pattern_zone(candles, i, PatternType::DropBaseRallyOb)
            {
                zones.push(zone);
            }
        }
        for i in 3..candles.len().saturating_sub(3) {
            if let Some(zone) = self.identify_fresh_zone(candles, i, ZoneType::Supply) {
                zones.push(zone);
            }
            if let Some(zone) = self.identify_fresh_zone(candles, i, ZoneType::Demand) {
                zones.push(zone);
            }
        }

        for zone in &mut zones {
            self.calculate_zone_strength(zone, candles);
            self.assess_zone_quality(zone);
        }

        // 겹치는 구역은 강도가 높은 쪽만 남김
        let mut zones = filter_overlapping_zones(zones);

        self.update_zone_statuses(&mut zones, candles);

        let mut active_zones: Vec<SupplyDemandZone> = zones
            .iter()
            .filter(|z| z.active && z.strength >= self.config.quality_threshold * 100.0)
            .cloned()
            .collect();

        // 패턴 탐지가 빈약하면 윈도우 고저점 기반의 기본 구역으로 보충
        if active_zones.len() < 2 {
            for zone in self.identify_basic_zones(candles) {
                if zones.iter().any(|existing| zone.overlaps(existing)) {
                    continue;
                }
                if zone.active {
                    active_zones.push(zone.clone());
                }
                zones.push(zone);
            }
        }

        let mut supply_zones = Vec::new();
        let mut demand_zones = Vec::new();
        for zone in zones {
            match zone.zone_type {
                ZoneType::Supply => supply_zones.push(zone),
                ZoneType::Demand => demand_zones.push(zone),
            }
        }

        let statistics = calculate_statistics(&supply_zones, &demand_zones, &active_zones);

        SupplyDemandData {
            supply_zones,
            demand_zones,
            active_zones,
            statistics,
            last_analysis,
        }
    }

    /// 베이스 전후 임펄스 방향으로 네 가지 3단 패턴을 검사합니다.
    fn identify_pattern_zone<C: Candle>(
        &self,
        candles: &[C],
        center: usize,
        pattern: PatternType,
    ) -> Option<SupplyDemandZone> {
        let (left_rally, right_rally, zone_type) = match pattern {
            PatternType::DropBaseDrop => (false, false, ZoneType::Supply),
            PatternType::RallyBaseRally => (true, true, ZoneType::Demand),
            PatternType::RallyBaseDropOb => (true, false, ZoneType::Supply),
            PatternType::DropBaseRallyOb => (false, true, ZoneType::Demand),
            _ => return None,
        };

        let (base_start, base_end) = self.find_base_area(candles, center)?;

        if !self.validate_left_move(candles, base_start, left_rally) {
            return None;
        }
        if !self.validate_right_move(candles, base_end, right_rally) {
            return None;
        }

        let high = highest_high(candles, base_start, base_end);
        let low = lowest_low(candles, base_start, base_end);

        let volume_profile = self.zone_volume_profile(candles, base_start, base_end);
        let id_prefix = match (zone_type, pattern) {
            (ZoneType::Supply, PatternType::RallyBaseDropOb) => "supply_ob",
            (ZoneType::Supply, _) => "supply",
            (ZoneType::Demand, PatternType::DropBaseRallyOb) => "demand_ob",
            (ZoneType::Demand, _) => "demand",
        };

        Some(SupplyDemandZone {
            id: format!("{}_{}_{}", id_prefix, base_start, base_end),
            zone_type,
            upper_bound: high,
            lower_bound: low,
            center_price: (high + low) / 2.0,
            width: high - low,
            width_percent: (high - low) / low * 100.0,
            origin: ZoneOrigin {
                kline_index: center,
                pattern,
                impulse_move: self.impulse_move(candles, base_end, right_rally),
                impulse_volume: impulse_volume(candles, base_end),
                confirmation: true,
            },
            strength: 0.0,
            quality: ZoneQuality::Weak,
            status: ZoneStatus::Fresh,
            touch_count: 0,
            last_touch: 0,
            creation_time: candles[center].open_time(),
            volume: volume_profile.total_volume,
            volume_profile,
            validation: None,
            active: true,
            broken: false,
            break_time: 0,
        })
    }

    /// 단일 캔들 조건의 프레시 공급/수요 구역
    fn identify_fresh_zone<C: Candle>(
        &self,
        candles: &[C],
        index: usize,
        zone_type: ZoneType,
    ) -> Option<SupplyDemandZone> {
        if index < 3 || index + 3 >= candles.len() {
            return None;
        }

        let price_change = (candles[index].close_price() - candles[index - 3].close_price())
            / candles[index - 3].close_price();

        match zone_type {
            ZoneType::Supply if price_change > -self.config.min_impulse_percent => return None,
            ZoneType::Demand if price_change < self.config.min_impulse_percent => return None,
            _ => {}
        }

        let avg_volume = average_volume(candles, index.saturating_sub(10), index);
        if candles[index].volume() < avg_volume * self.config.min_volume_factor {
            return None;
        }

        // 방향에 따라 인접 캔들 경계를 사용. 역전될 수 있으므로 최소 폭으로 클램핑
        let (mut high, mut low, pattern, prefix) = match zone_type {
            ZoneType::Supply => (
                candles[index - 1].high_price(),
                candles[index].low_price(),
                PatternType::FreshSupply,
                "fresh_supply",
            ),
            ZoneType::Demand => (
                candles[index].high_price(),
                candles[index - 1].low_price(),
                PatternType::FreshDemand,
                "fresh_demand",
            ),
        };

        if high < low {
            std::mem::swap(&mut high, &mut low);
        }
        if high - low < self.config.min_zone_width {
            high = low + self.config.min_zone_width;
        }

        Some(SupplyDemandZone {
            id: format!("{}_{}", prefix, index),
            zone_type,
            upper_bound: high,
            lower_bound: low,
            center_price: (high + low) / 2.0,
            width: high - low,
            width_percent: (high - low) / low * 100.0,
            origin: ZoneOrigin {
                kline_index: index,
                pattern,
                impulse_move: price_change.abs(),
                impulse_volume: candles[index].volume(),
                confirmation: false,
            },
            strength: 0.0,
            quality: ZoneQuality::Weak,
            status: ZoneStatus::Fresh,
            touch_count: 0,
            last_touch: 0,
            creation_time: candles[index].open_time(),
            volume: candles[index].volume(),
            volume_profile: ZoneVolumeProfile::default(),
            validation: None,
            active: true,
            broken: false,
            break_time: 0,
        })
    }

    /// 중심 ±3 캔들의 고저 범위가 베이스 조건을 만족하는지 확인
    fn find_base_area<C: Candle>(&self, candles: &[C], center: usize) -> Option<(usize, usize)> {
        let start = center.saturating_sub(3);
        let end = (center + 3).min(candles.len() - 1);

        let high = highest_high(candles, start, end);
        let low = lowest_low(candles, start, end);
        if low <= 0.0 {
            return None;
        }

        let range_percent = (high - low) / low;
        if range_percent < self.config.min_base_percent
            || range_percent > self.config.max_base_percent
        {
            return None;
        }

        Some((start, end))
    }

    /// 베이스 시작 전 5캔들 누적 수익률 검증
    fn validate_left_move<C: Candle>(&self, candles: &[C], base_start: usize, is_rally: bool) -> bool {
        if base_start < 5 {
            return false;
        }

        let start_price = candles[base_start - 5].close_price();
        let end_price = candles[base_start].close_price();
        let change = (end_price - start_price) / start_price;

        if is_rally {
            change > self.config.min_impulse_percent
        } else {
            change < -self.config.min_impulse_percent
        }
    }

    /// 베이스 종료 후 5캔들 누적 수익률 검증
    fn validate_right_move<C: Candle>(&self, candles: &[C], base_end: usize, is_rally: bool) -> bool {
        if base_end + 5 >= candles.len() {
            return false;
        }

        let start_price = candles[base_end].close_price();
        let end_price = candles[base_end + 5].close_price();
        let change = (end_price - start_price) / start_price;

        if is_rally {
            change > self.config.min_impulse_percent
        } else {
            change < -self.config.min_impulse_percent
        }
    }

    /// 임펄스 구간의 극단값까지의 이동 비율
    fn impulse_move<C: Candle>(&self, candles: &[C], start_index: usize, is_rally: bool) -> f64 {
        if start_index + 5 >= candles.len() {
            return 0.0;
        }

        let start_price = candles[start_index].close_price();
        let end = (start_index + 5).min(candles.len() - 1);

        if is_rally {
            let extreme = candles[start_index..=end]
                .iter()
                .map(|c| c.high_price())
                .fold(candles[end].close_price(), f64::max);
            (extreme - start_price) / start_price
        } else {
            let extreme = candles[start_index..=end]
                .iter()
                .map(|c| c.low_price())
                .fold(candles[end].close_price(), f64::min);
            (start_price - extreme) / start_price
        }
    }

    /// 베이스 구간의 거래량 분포 (양봉 0.7/0.3, 음봉 0.3/0.7 분할)
    fn zone_volume_profile<C: Candle>(
        &self,
        candles: &[C],
        start: usize,
        end: usize,
    ) -> ZoneVolumeProfile {
        let mut total = 0.0;
        let mut buy = 0.0;
        let mut sell = 0.0;

        for candle in &candles[start..=end.min(candles.len() - 1)] {
            let volume = candle.volume();
            total += volume;
            if candle.is_bullish() {
                buy += volume * 0.7;
                sell += volume * 0.3;
            } else {
                buy += volume * 0.3;
                sell += volume * 0.7;
            }
        }

        let imbalance = if sell > 0.0 { buy / sell } else { 0.0 };
        let bars = (end - start + 1) as f64;

        ZoneVolumeProfile {
            total_volume: total,
            buy_volume: buy,
            sell_volume: sell,
            volume_at_origin: total / bars,
            volume_imbalance: imbalance,
        }
    }

    /// 강도: 임펄스 50 + 거래량 비율(상한 5) 10 + 좁은 폭 가점 + 패턴 가점
    fn calculate_zone_strength<C: Candle>(&self, zone: &mut SupplyDemandZone, candles: &[C]) {
        let mut strength = zone.origin.impulse_move * 50.0;

        let avg_volume = average_volume(candles, 0, candles.len() - 1);
        if avg_volume > 0.0 {
            let volume_ratio = zone.volume / avg_volume;
            strength += volume_ratio.min(5.0) * 10.0;
        }

        if zone.width_percent > 0.0 {
            strength += (5.0 / zone.width_percent) * 5.0;
        }

        strength += match zone.origin.pattern {
            PatternType::DropBaseDrop | PatternType::RallyBaseRally => 15.0,
            PatternType::RallyBaseDropOb | PatternType::DropBaseRallyOb => 12.0,
            PatternType::FreshSupply | PatternType::FreshDemand => 8.0,
        };

        zone.strength = strength.min(100.0);
    }

    /// 품질: 강도에 거래량 불균형/확정 가점을 더해 등급화
    fn assess_zone_quality(&self, zone: &mut SupplyDemandZone) {
        let mut score = zone.strength;

        if zone.volume_profile.total_volume > 0.0 {
            if zone.zone_type == ZoneType::Supply && zone.volume_profile.volume_imbalance < 0.8 {
                score += 10.0;
            } else if zone.zone_type == ZoneType::Demand
                && zone.volume_profile.volume_imbalance > 1.2
            {
                score += 10.0;
            }
        }

        if zone.origin.confirmation {
            score += 5.0;
        }

        zone.quality = if score >= 80.0 {
            ZoneQuality::Strong
        } else if score >= 65.0 {
            ZoneQuality::Good
        } else if score >= 50.0 {
            ZoneQuality::Moderate
        } else {
            ZoneQuality::Weak
        };
    }

    /// 윈도우 말단 기준으로 구역 수명 주기를 갱신합니다.
    fn update_zone_statuses<C: Candle>(&self, zones: &mut [SupplyDemandZone], candles: &[C]) {
        let Some(last) = candles.last() else {
            return;
        };
        let current_time = last.open_time();
        let current_price = last.close_price();

        for zone in zones.iter_mut() {
            let age_hours = (current_time - zone.creation_time) / (3600 * 1000);
            if age_hours > self.config.max_zone_age_hours {
                zone.status = ZoneStatus::Expired;
                zone.active = false;
                continue;
            }

            if self.is_zone_broken(zone, current_price) {
                zone.status = ZoneStatus::Broken;
                zone.broken = true;
                zone.active = false;
                zone.break_time = current_time;
                continue;
            }

            let touch_count = count_zone_touches(zone, candles);
            zone.touch_count = touch_count;

            if touch_count > self.config.max_touch_count {
                zone.status = ZoneStatus::Weakened;
            } else if touch_count > 0 {
                zone.status = ZoneStatus::Tested;
                zone.last_touch = current_time;
            }

            if self.config.enable_validation {
                zone.validation = Some(self.validate_zone_reaction(zone, candles));
            }
        }
    }

    /// 구역을 무력화하는 방향으로 임계 비율 이상 이탈했는지 확인
    fn is_zone_broken(&self, zone: &SupplyDemandZone, current_price: f64) -> bool {
        let threshold = self.config.breakout_threshold;
        match zone.zone_type {
            ZoneType::Supply => current_price > zone.upper_bound * (1.0 + threshold),
            ZoneType::Demand => current_price < zone.lower_bound * (1.0 - threshold),
        }
    }

    /// 최근 테스트 이후 3캔들의 방향성 반응을 검증합니다.
    fn validate_zone_reaction<C: Candle>(
        &self,
        zone: &SupplyDemandZone,
        candles: &[C],
    ) -> ZoneValidation {
        let mut test_index = None;
        for i in (zone.origin.kline_index + 1..candles.len()).rev() {
            if zone.intersects_range(candles[i].high_price(), candles[i].low_price()) {
                test_index = Some(i);
                break;
            }
        }

        let Some(test_index) = test_index else {
            return ZoneValidation::none();
        };

        let reaction_bars = 3.min(candles.len().saturating_sub(test_index + 1));
        if reaction_bars == 0 {
            return ZoneValidation::none();
        }

        let test_price = candles[test_index].close_price();
        let reaction_price = candles[test_index + reaction_bars].close_price();
        let reaction_strength = (reaction_price - test_price).abs() / test_price;

        let has_reaction = match zone.zone_type {
            ZoneType::Supply => reaction_price < test_price && reaction_strength > 0.01,
            ZoneType::Demand => reaction_price > test_price && reaction_strength > 0.01,
        };

        ZoneValidation {
            has_reaction,
            reaction_strength,
            time_in_zone: candles[test_index + reaction_bars].open_time()
                - candles[test_index].open_time(),
            volume_at_test: candles[test_index].volume(),
            price_action: classify_price_action(candles, test_index, test_index + reaction_bars),
        }
    }

    /// 최근 20캔들의 고저점으로 기본 구역 한 쌍을 만듭니다.
    fn identify_basic_zones<C: Candle>(&self, candles: &[C]) -> Vec<SupplyDemandZone> {
        let mut zones = Vec::new();
        if candles.len() < 20 {
            return zones;
        }

        let start = candles.len() - 20;
        let mut highest_index = start;
        let mut lowest_index = start;
        for i in start..candles.len() {
            if candles[i].high_price() > candles[highest_index].high_price() {
                highest_index = i;
            }
            if candles[i].low_price() < candles[lowest_index].low_price() {
                lowest_index = i;
            }
        }

        if highest_index > start + 2 && highest_index < candles.len() - 2 {
            zones.push(self.basic_zone(candles, highest_index, ZoneType::Supply));
        }
        if lowest_index > start + 2 && lowest_index < candles.len() - 2 {
            zones.push(self.basic_zone(candles, lowest_index, ZoneType::Demand));
        }

        zones
    }

    fn basic_zone<C: Candle>(
        &self,
        candles: &[C],
        index: usize,
        zone_type: ZoneType,
    ) -> SupplyDemandZone {
        // 인접 캔들까지 포함해 경계 확장
        let start = index.saturating_sub(1);
        let end = (index + 1).min(candles.len() - 1);
        let upper = highest_high(candles, start, end);
        let lower = lowest_low(candles, start, end);

        let (pattern, prefix) = match zone_type {
            ZoneType::Supply => (PatternType::FreshSupply, "basic_supply"),
            ZoneType::Demand => (PatternType::FreshDemand, "basic_demand"),
        };

        SupplyDemandZone {
            id: format!("{}_{}", prefix, index),
            zone_type,
            upper_bound: upper,
            lower_bound: lower,
            center_price: (upper + lower) / 2.0,
            width: upper - lower,
            width_percent: (upper - lower) / lower * 100.0,
            origin: ZoneOrigin {
                kline_index: index,
                pattern,
                impulse_move: 0.015,
                impulse_volume: candles[index].volume(),
                confirmation: false,
            },
            strength: 60.0,
            quality: ZoneQuality::Moderate,
            status: ZoneStatus::Fresh,
            touch_count: 0,
            last_touch: 0,
            creation_time: candles[index].open_time(),
            volume: candles[index].volume(),
            volume_profile: ZoneVolumeProfile::default(),
            validation: None,
            active: true,
            broken: false,
            break_time: 0,
        }
    }

    /// 활성 구역과 현재 가격으로 신호를 생성합니다 (신뢰도 내림차순).
    pub fn generate_signals(
        &self,
        data: &SupplyDemandData,
        current_price: f64,
        now_ms: i64,
    ) -> Vec<SdSignal> {
        let mut signals = Vec::new();

        for zone in &data.active_zones {
            if let Some(signal) = self.zone_signal(zone, current_price, now_ms) {
                signals.push(signal);
            }
        }

        if let Some(signal) = self.fresh_zone_signal(data, current_price, now_ms) {
            signals.push(signal);
        }

        signals.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        signals
    }

    fn zone_signal(
        &self,
        zone: &SupplyDemandZone,
        current_price: f64,
        now_ms: i64,
    ) -> Option<SdSignal> {
        let distance = distance_to_zone(zone, current_price);
        if distance > 0.05 {
            return None;
        }

        if zone.contains(current_price) {
            self.bounce_signal(zone, current_price, now_ms)
        } else {
            self.entry_signal(zone, current_price, now_ms, distance)
        }
    }

    /// 구역 내부 반등 신호
    fn bounce_signal(
        &self,
        zone: &SupplyDemandZone,
        current_price: f64,
        now_ms: i64,
    ) -> Option<SdSignal> {
        let (action, entry, stop_loss, take_profit, description) = match zone.zone_type {
            ZoneType::Supply => (
                SignalAction::Sell,
                current_price,
                zone.upper_bound * 1.01,
                current_price - zone.width * 2.0,
                format!(
                    "inside supply zone {:.2}-{:.2}, expecting drop",
                    zone.lower_bound, zone.upper_bound
                ),
            ),
            ZoneType::Demand => (
                SignalAction::Buy,
                current_price,
                zone.lower_bound * 0.99,
                current_price + zone.width * 2.0,
                format!(
                    "inside demand zone {:.2}-{:.2}, expecting bounce",
                    zone.lower_bound, zone.upper_bound
                ),
            ),
        };

        let risk = (entry - stop_loss).abs();
        let reward = (take_profit - entry).abs();
        let risk_reward = if risk > 0.0 { reward / risk } else { 0.0 };

        let mut confidence = zone.strength * 0.8;
        if zone.quality == ZoneQuality::Strong {
            confidence += 10.0;
        }
        if zone.status == ZoneStatus::Fresh {
            confidence += 5.0;
        }

        Some(SdSignal {
            kind: SdSignalKind::ZoneBounce,
            zone_id: zone.id.clone(),
            current_price,
            action,
            entry,
            stop_loss,
            take_profit,
            risk_reward,
            confidence: confidence.min(100.0),
            strength: zone.strength,
            description,
            timestamp: now_ms,
        })
    }

    /// 구역 재진입 대기 신호 (올바른 쪽에 있을 때만)
    fn entry_signal(
        &self,
        zone: &SupplyDemandZone,
        current_price: f64,
        now_ms: i64,
        distance: f64,
    ) -> Option<SdSignal> {
        let (action, entry, stop_loss, take_profit, description) = match zone.zone_type {
            ZoneType::Supply => {
                if current_price <= zone.upper_bound {
                    return None;
                }
                (
                    SignalAction::Sell,
                    zone.upper_bound,
                    zone.upper_bound * 1.02,
                    zone.lower_bound,
                    format!("waiting for retest of supply zone {:.2}", zone.upper_bound),
                )
            }
            ZoneType::Demand => {
                if current_price >= zone.lower_bound {
                    return None;
                }
                (
                    SignalAction::Buy,
                    zone.lower_bound,
                    zone.lower_bound * 0.98,
                    zone.upper_bound,
                    format!("waiting for retest of demand zone {:.2}", zone.lower_bound),
                )
            }
        };

        let risk = (entry - stop_loss).abs();
        let reward = (take_profit - entry).abs();
        let risk_reward = if risk > 0.0 { reward / risk } else { 0.0 };

        let mut confidence = zone.strength * (1.0 - distance / 0.05) * 0.7;
        if zone.quality == ZoneQuality::Strong {
            confidence += 8.0;
        }

        Some(SdSignal {
            kind: SdSignalKind::ZoneEntry,
            zone_id: zone.id.clone(),
            current_price,
            action,
            entry,
            stop_loss,
            take_profit,
            risk_reward,
            confidence: confidence.min(100.0),
            strength: zone.strength,
            description,
            timestamp: now_ms,
        })
    }

    /// 최근 생성된 고품질 프레시 구역 근접(3%) 신호
    fn fresh_zone_signal(
        &self,
        data: &SupplyDemandData,
        current_price: f64,
        now_ms: i64,
    ) -> Option<SdSignal> {
        let fresh_zone = data
            .active_zones
            .iter()
            .filter(|zone| {
                matches!(
                    zone.origin.pattern,
                    PatternType::FreshSupply | PatternType::FreshDemand
                ) && zone.status == ZoneStatus::Fresh
                    && zone.quality != ZoneQuality::Weak
            })
            .max_by_key(|zone| zone.creation_time)?;

        let distance = distance_to_zone(fresh_zone, current_price);
        if distance > 0.03 {
            return None;
        }

        let (action, entry, stop_loss, take_profit, description) = match fresh_zone.zone_type {
            ZoneType::Supply => (
                SignalAction::Sell,
                fresh_zone.center_price,
                fresh_zone.upper_bound * 1.015,
                current_price - fresh_zone.width * 1.5,
                format!("fresh supply zone at {:.2}", fresh_zone.center_price),
            ),
            ZoneType::Demand => (
                SignalAction::Buy,
                fresh_zone.center_price,
                fresh_zone.lower_bound * 0.985,
                current_price + fresh_zone.width * 1.5,
                format!("fresh demand zone at {:.2}", fresh_zone.center_price),
            ),
        };

        let risk = (entry - stop_loss).abs();
        let reward = (take_profit - entry).abs();
        let risk_reward = if risk > 0.0 { reward / risk } else { 0.0 };

        Some(SdSignal {
            kind: SdSignalKind::FreshZone,
            zone_id: fresh_zone.id.clone(),
            current_price,
            action,
            entry,
            stop_loss,
            take_profit,
            risk_reward,
            confidence: (fresh_zone.strength * 0.9 + 15.0).min(100.0),
            strength: fresh_zone.strength,
            description,
            timestamp: now_ms,
        })
    }

    /// 현재 가격에서 가까운 활성 구역을 거리순으로 반환합니다.
    pub fn find_nearest_zones<'a>(
        &self,
        data: &'a SupplyDemandData,
        current_price: f64,
        max_distance: f64,
    ) -> Vec<&'a SupplyDemandZone> {
        let mut zones: Vec<&SupplyDemandZone> = data
            .active_zones
            .iter()
            .filter(|zone| distance_to_zone(zone, current_price) <= max_distance)
            .collect();

        zones.sort_by(|a, b| {
            distance_to_zone(a, current_price).total_cmp(&distance_to_zone(b, current_price))
        });
        zones
    }

    /// 강도순 상위 구역
    pub fn strongest_zones<'a>(
        &self,
        data: &'a SupplyDemandData,
        count: usize,
    ) -> Vec<&'a SupplyDemandZone> {
        let mut zones: Vec<&SupplyDemandZone> = data.active_zones.iter().collect();
        zones.sort_by(|a, b| b.strength.total_cmp(&a.strength));
        zones.truncate(count);
        zones
    }
}

impl Default for SupplyDemandAnalyzer {
    fn default() -> SupplyDemandAnalyzer {
        SupplyDemandAnalyzer::new()
    }
}

fn highest_high<C: Candle>(candles: &[C], start: usize, end: usize) -> f64 {
    candles[start..=end.min(candles.len() - 1)]
        .iter()
        .map(|c| c.high_price())
        .fold(f64::MIN, f64::max)
}

fn lowest_low<C: Candle>(candles: &[C], start: usize, end: usize) -> f64 {
    candles[start..=end.min(candles.len() - 1)]
        .iter()
        .map(|c| c.low_price())
        .fold(f64::MAX, f64::min)
}

fn average_volume<C: Candle>(candles: &[C], start: usize, end: usize) -> f64 {
    let end = end.min(candles.len() - 1);
    if start > end {
        return 0.0;
    }
    let slice = &candles[start..=end];
    slice.iter().map(|c| c.volume()).sum::<f64>() / slice.len() as f64
}

fn impulse_volume<C: Candle>(candles: &[C], start_index: usize) -> f64 {
    if start_index + 5 >= candles.len() {
        return 0.0;
    }
    candles[start_index..=(start_index + 5).min(candles.len() - 1)]
        .iter()
        .map(|c| c.volume())
        .sum()
}

/// 기원 이후 캔들 중 구역과 교차한 수
fn count_zone_touches<C: Candle>(zone: &SupplyDemandZone, candles: &[C]) -> usize {
    candles
        .iter()
        .skip(zone.origin.kline_index + 1)
        .filter(|c| zone.intersects_range(c.high_price(), c.low_price()))
        .count()
}

/// 강도 내림차순으로 훑으며 겹치는 구역을 제거합니다.
fn filter_overlapping_zones(mut zones: Vec<SupplyDemandZone>) -> Vec<SupplyDemandZone> {
    if zones.len() <= 1 {
        return zones;
    }

    zones.sort_by(|a, b| b.strength.total_cmp(&a.strength));

    let mut filtered: Vec<SupplyDemandZone> = Vec::new();
    for zone in zones {
        if !filtered.iter().any(|existing| zone.overlaps(existing)) {
            filtered.push(zone);
        }
    }

    filtered
}

fn distance_to_zone(zone: &SupplyDemandZone, current_price: f64) -> f64 {
    if zone.contains(current_price) {
        return 0.0;
    }

    if current_price > zone.upper_bound {
        (current_price - zone.upper_bound) / zone.upper_bound
    } else {
        (zone.lower_bound - current_price) / zone.lower_bound
    }
}

fn classify_price_action<C: Candle>(candles: &[C], start: usize, end: usize) -> PriceAction {
    if start >= end || end >= candles.len() {
        return PriceAction::Unknown;
    }

    let start_price = candles[start].close_price();
    let end_price = candles[end].close_price();
    let change = (end_price - start_price) / start_price;

    if change > 0.02 {
        PriceAction::StrongBullish
    } else if change > 0.01 {
        PriceAction::Bullish
    } else if change < -0.02 {
        PriceAction::StrongBearish
    } else if change < -0.01 {
        PriceAction::Bearish
    } else {
        PriceAction::Sideways
    }
}

fn calculate_statistics(
    supply_zones: &[SupplyDemandZone],
    demand_zones: &[SupplyDemandZone],
    active_zones: &[SupplyDemandZone],
) -> SdStatistics {
    let mut stats = SdStatistics {
        total_supply_zones: supply_zones.len(),
        total_demand_zones: demand_zones.len(),
        ..SdStatistics::default()
    };

    for zone in active_zones {
        match zone.zone_type {
            ZoneType::Supply => stats.active_supply_zones += 1,
            ZoneType::Demand => stats.active_demand_zones += 1,
        }
    }

    if !active_zones.is_empty() {
        stats.avg_zone_strength =
            active_zones.iter().map(|z| z.strength).sum::<f64>() / active_zones.len() as f64;
        stats.avg_zone_width =
            active_zones.iter().map(|z| z.width_percent).sum::<f64>() / active_zones.len() as f64;
    }

    let total = supply_zones.len() + demand_zones.len();
    if total > 0 {
        let mut success = 0usize;
        let mut breakout = 0usize;

        for zone in supply_zones.iter().chain(demand_zones.iter()) {
            if zone
                .validation
                .as_ref()
                .map(|v| v.has_reaction)
                .unwrap_or(false)
            {
                success += 1;
            }
            if zone.broken {
                breakout += 1;
            }
        }

        stats.success_rate = success as f64 / total as f64 * 100.0;
        stats.breakout_rate = breakout as f64 / total as f64 * 100.0;
        stats.reaction_rate = stats.success_rate;
    }

    stats
}
